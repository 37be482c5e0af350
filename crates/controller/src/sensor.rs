//! Analog probe sampling: pH with outlier rejection and averaging, light as
//! a single scaled read.
//!
//! A pH reading is the mean of up to [`PH_SAMPLES`] raw conversions that
//! survive three filters:
//!
//! 1. rail / noise-floor check on the raw value (disconnected or saturated
//!    probe),
//! 2. plausible probe voltage (0.5–4.5 V),
//! 3. physical pH range after calibration (0–14).
//!
//! With fewer than [`MIN_VALID_PH_SAMPLES`] survivors the reading is `None`
//! rather than an average of two noisy points.

use crate::calibration::CalibrationTable;
use crate::hal::{AnalogChannel, AnalogInput, Clock};
use crate::{MIN_VALID_PH_SAMPLES, PH_SAMPLES, PH_SETTLE_MS};

/// Probe output voltage at pH 7.
const NEUTRAL_VOLTS: f32 = 2.5;
/// Probe slope: volts per pH unit (falling voltage = rising pH).
const VOLTS_PER_PH: f32 = 0.18;
const NEUTRAL_PH: f32 = 7.0;

const MIN_PROBE_VOLTS: f32 = 0.5;
const MAX_PROBE_VOLTS: f32 = 4.5;

const MIN_PH: f32 = 0.0;
const MAX_PH: f32 = 14.0;

// ---------------------------------------------------------------------------
// Converter characteristics
// ---------------------------------------------------------------------------

/// How raw counts map to volts for a particular converter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogSpec {
    /// Voltage that produces `max_raw`.
    pub reference_volts: f32,
    /// Full-scale count (also the upper rail).
    pub max_raw: u16,
    /// Counts below this are treated as a floating input.
    pub noise_floor: u16,
}

impl AnalogSpec {
    /// 10-bit converter on a 5 V reference (AVR-style boards).
    pub const TEN_BIT_5V: Self = Self {
        reference_volts: 5.0,
        max_raw: 1023,
        noise_floor: 100,
    };

    pub fn volts(&self, raw: u16) -> f32 {
        f32::from(raw) * self.reference_volts / f32::from(self.max_raw)
    }

    /// Raw count that reads back as `volts` (rounded, clamped to range).
    pub fn raw_for_volts(&self, volts: f32) -> u16 {
        let raw = (volts / self.reference_volts * f32::from(self.max_raw)).round();
        raw.clamp(0.0, f32::from(self.max_raw)) as u16
    }

    fn is_rail(&self, raw: u16) -> bool {
        raw == 0 || raw == self.max_raw || raw < self.noise_floor
    }
}

impl Default for AnalogSpec {
    fn default() -> Self {
        Self::TEN_BIT_5V
    }
}

/// Probe voltage → pH for a channel with calibration `factor`.
pub fn ph_from_volts(volts: f32, factor: f32) -> f32 {
    NEUTRAL_PH + ((NEUTRAL_VOLTS - volts) / VOLTS_PER_PH) * factor
}

/// Inverse of [`ph_from_volts`] for an uncalibrated (factor 1.0) probe.
pub fn volts_for_ph(ph: f32) -> f32 {
    NEUTRAL_VOLTS - (ph - NEUTRAL_PH) * VOLTS_PER_PH
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

pub struct SensorReader<A> {
    input: A,
    adc: AnalogSpec,
}

impl<A: AnalogInput> SensorReader<A> {
    pub fn new(input: A, adc: AnalogSpec) -> Self {
        Self { input, adc }
    }

    pub fn input_mut(&mut self) -> &mut A {
        &mut self.input
    }

    /// Averaged, filtered pH for channel `index`, or `None` when too few
    /// samples survive (or the channel does not exist).
    ///
    /// Waits [`PH_SETTLE_MS`] after every conversion.
    pub fn read_ph<const N: usize>(
        &mut self,
        index: usize,
        table: &CalibrationTable<N>,
        clock: &mut impl Clock,
    ) -> Option<f32> {
        if index >= N {
            return None;
        }
        let factor = table.factor(index);

        let mut sum = 0.0_f32;
        let mut valid = 0_usize;

        for _ in 0..PH_SAMPLES {
            let sample = self.input.read_raw(AnalogChannel::Ph(index));
            clock.delay_ms(PH_SETTLE_MS);

            let raw = match sample {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::trace!(channel = index, "ph sample read failed: {e}");
                    continue;
                }
            };
            if self.adc.is_rail(raw) {
                continue;
            }

            let volts = self.adc.volts(raw);
            if !(MIN_PROBE_VOLTS..=MAX_PROBE_VOLTS).contains(&volts) {
                continue;
            }

            let ph = ph_from_volts(volts, factor);
            if (MIN_PH..=MAX_PH).contains(&ph) {
                sum += ph;
                valid += 1;
            }
        }

        if valid < MIN_VALID_PH_SAMPLES {
            tracing::debug!(channel = index, valid, "ph reading invalid");
            return None;
        }
        Some(sum / valid as f32)
    }

    /// Light level as a 0–100 percentage of full scale.  A failed
    /// conversion reads as 0.
    pub fn read_light(&mut self) -> f32 {
        match self.input.read_raw(AnalogChannel::Light) {
            Ok(raw) => {
                (f32::from(raw) * 100.0 / f32::from(self.adc.max_raw)).clamp(0.0, 100.0)
            }
            Err(e) => {
                tracing::warn!("light read failed: {e}");
                0.0
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
