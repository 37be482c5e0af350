//! Per-channel pH calibration: the in-memory factor table, its persistent
//! image, and the single-point routine that derives a new factor from a
//! probe sitting in a buffer solution of known pH.

use anyhow::Result;

use crate::hal::{AnalogInput, ByteStore, Clock};
use crate::sensor::SensorReader;
use crate::{CALIBRATION_READINGS, CALIBRATION_SPACING_MS, PH_CHANNELS};

/// Factor applied when a channel has never been calibrated.
pub const NEUTRAL_FACTOR: f32 = 1.0;

const FACTOR_SIZE: usize = std::mem::size_of::<f32>();

// ---------------------------------------------------------------------------
// Factor table
// ---------------------------------------------------------------------------

/// Calibration factors indexed by pH channel.  Every entry is finite and
/// positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationTable<const N: usize = PH_CHANNELS> {
    factors: [f32; N],
}

impl<const N: usize> Default for CalibrationTable<N> {
    fn default() -> Self {
        Self {
            factors: [NEUTRAL_FACTOR; N],
        }
    }
}

impl<const N: usize> CalibrationTable<N> {
    /// Build a table, replacing unusable entries with [`NEUTRAL_FACTOR`].
    pub fn from_factors(factors: [f32; N]) -> Self {
        Self {
            factors: factors.map(sanitize),
        }
    }

    /// Factor for `index`; neutral for channels outside the table.
    pub fn factor(&self, index: usize) -> f32 {
        self.factors.get(index).copied().unwrap_or(NEUTRAL_FACTOR)
    }

    pub fn factors(&self) -> &[f32; N] {
        &self.factors
    }

    fn set(&mut self, index: usize, factor: f32) {
        self.factors[index] = sanitize(factor);
    }
}

/// NaN, infinite, zero and negative factors mean "never calibrated".
fn sanitize(factor: f32) -> f32 {
    if factor.is_finite() && factor > 0.0 {
        factor
    } else {
        NEUTRAL_FACTOR
    }
}

// ---------------------------------------------------------------------------
// Persistent image
// ---------------------------------------------------------------------------

/// Calibration factors stored as little-endian `f32`s, one per channel,
/// contiguous from `base`.
pub struct CalibrationStore<S> {
    store: S,
    base: usize,
}

impl<S: ByteStore> CalibrationStore<S> {
    pub fn new(store: S, base: usize) -> Self {
        Self { store, base }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    fn offset(&self, index: usize) -> usize {
        self.base + index * FACTOR_SIZE
    }

    /// Read every channel.  Unreadable or unusable entries come back as the
    /// neutral factor; the store itself is left untouched.
    pub fn load<const N: usize>(&mut self) -> CalibrationTable<N> {
        let mut table = CalibrationTable::<N>::default();
        for index in 0..N {
            let mut buf = [0u8; FACTOR_SIZE];
            match self.store.read_bytes(self.offset(index), &mut buf) {
                Ok(()) => table.set(index, f32::from_le_bytes(buf)),
                Err(e) => {
                    tracing::warn!(channel = index, "calibration read failed: {e}");
                }
            }
        }
        tracing::info!(factors = ?table.factors(), "calibration loaded");
        table
    }

    /// Write every channel, calibrated or not.
    pub fn save<const N: usize>(&mut self, table: &CalibrationTable<N>) -> Result<()> {
        for (index, factor) in table.factors().iter().enumerate() {
            let offset = self.offset(index);
            self.store.write_bytes(offset, &factor.to_le_bytes())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Calibration routine
// ---------------------------------------------------------------------------

/// Result of one calibration request.  Only used for local diagnostics; the
/// host is never told.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationOutcome {
    Applied { factor: f32 },
    UnknownChannel,
    TargetOutOfRange,
    InsufficientReadings { valid: usize },
    ZeroAverage,
}

/// Derive and persist a new factor for `index` so that the probe, currently
/// sitting in a buffer of pH `target_ph`, reads `target_ph`.
///
/// Takes [`CALIBRATION_READINGS`] full pH readings [`CALIBRATION_SPACING_MS`]
/// apart and needs at least half of them to be valid.
pub fn calibrate<A, S, const N: usize>(
    reader: &mut SensorReader<A>,
    table: &mut CalibrationTable<N>,
    store: &mut CalibrationStore<S>,
    clock: &mut impl Clock,
    index: usize,
    target_ph: f32,
) -> CalibrationOutcome
where
    A: AnalogInput,
    S: ByteStore,
{
    if index >= N {
        return CalibrationOutcome::UnknownChannel;
    }
    if !(target_ph > 0.0 && target_ph <= 14.0) {
        return CalibrationOutcome::TargetOutOfRange;
    }

    let mut sum = 0.0_f32;
    let mut valid = 0_usize;
    for _ in 0..CALIBRATION_READINGS {
        if let Some(ph) = reader.read_ph(index, table, clock) {
            sum += ph;
            valid += 1;
        }
        clock.delay_ms(CALIBRATION_SPACING_MS);
    }

    if valid < CALIBRATION_READINGS / 2 {
        return CalibrationOutcome::InsufficientReadings { valid };
    }

    let average = sum / valid as f32;
    if average == 0.0 {
        return CalibrationOutcome::ZeroAverage;
    }

    let factor = target_ph / average;
    table.set(index, factor);
    if let Err(e) = store.save(table) {
        tracing::error!(channel = index, "calibration persist failed: {e}");
    }
    CalibrationOutcome::Applied {
        factor: table.factor(index),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::AnalogChannel;
    use crate::sensor::{volts_for_ph, AnalogSpec};
    use crate::testing::{FakeClock, MemStore, ScriptedAnalog};

    fn store_with(factors: &[f32]) -> MemStore {
        let mut mem = MemStore::new(64);
        for (i, f) in factors.iter().enumerate() {
            mem.bytes[i * 4..i * 4 + 4].copy_from_slice(&f.to_le_bytes());
        }
        mem
    }

    fn reader_at_volts(channel: usize, volts: f32) -> SensorReader<ScriptedAnalog> {
        let mut analog = ScriptedAnalog::new();
        analog.set_default(
            AnalogChannel::Ph(channel),
            AnalogSpec::TEN_BIT_5V.raw_for_volts(volts),
        );
        SensorReader::new(analog, AnalogSpec::TEN_BIT_5V)
    }

    // -- Table ----------------------------------------------------------------

    #[test]
    fn table_defaults_to_neutral() {
        let table = CalibrationTable::<3>::default();
        assert_eq!(table.factors(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn table_replaces_unusable_factors() {
        let table =
            CalibrationTable::<5>::from_factors([f32::NAN, -2.0, 0.0, f32::INFINITY, 1.25]);
        assert_eq!(table.factors(), &[1.0, 1.0, 1.0, 1.0, 1.25]);
    }

    #[test]
    fn factor_outside_table_is_neutral() {
        let table = CalibrationTable::<2>::from_factors([2.0, 3.0]);
        assert_eq!(table.factor(7), 1.0);
    }

    // -- Store ----------------------------------------------------------------

    #[test]
    fn load_reads_stored_factors() {
        let mut cal = CalibrationStore::new(store_with(&[1.1, 0.9, 1.0, 2.0, 0.5]), 0);
        let table = cal.load::<5>();
        assert_eq!(table.factors(), &[1.1, 0.9, 1.0, 2.0, 0.5]);
    }

    #[test]
    fn load_of_blank_store_is_neutral_and_does_not_write() {
        // A fresh EEPROM reads 0xFF..., which is a NaN.
        let mut cal = CalibrationStore::new(MemStore::new(64), 0);
        let table = cal.load::<5>();
        assert_eq!(table, CalibrationTable::default());
        assert_eq!(cal.inner().writes, 0);
        assert!(cal.inner().bytes.iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn load_replaces_nan_and_non_positive_values() {
        let mut cal =
            CalibrationStore::new(store_with(&[f32::NAN, 0.0, -1.0, 1.5, f32::NEG_INFINITY]), 0);
        let table = cal.load::<5>();
        assert_eq!(table.factors(), &[1.0, 1.0, 1.0, 1.5, 1.0]);
        assert_eq!(cal.inner().writes, 0);
    }

    #[test]
    fn load_read_failure_falls_back_to_neutral() {
        let mut mem = store_with(&[2.0, 2.0]);
        mem.fail_reads = true;
        let mut cal = CalibrationStore::new(mem, 0);
        assert_eq!(cal.load::<2>().factors(), &[1.0, 1.0]);
    }

    #[test]
    fn save_writes_every_channel_at_its_offset() {
        let mut cal = CalibrationStore::new(MemStore::new(64), 8);
        cal.save(&CalibrationTable::<3>::from_factors([1.5, 1.0, 0.75]))
            .unwrap();

        let bytes = &cal.inner().bytes;
        assert_eq!(&bytes[8..12], &1.5_f32.to_le_bytes());
        assert_eq!(&bytes[12..16], &1.0_f32.to_le_bytes());
        assert_eq!(&bytes[16..20], &0.75_f32.to_le_bytes());
        assert!(bytes[..8].iter().all(|b| *b == 0xFF));
    }

    // -- Calibration routine --------------------------------------------------

    #[test]
    fn calibrating_a_true_probe_yields_unit_factor_and_persists() {
        let mut reader = reader_at_volts(0, 2.5);
        let mut table = CalibrationTable::<PH_CHANNELS>::default();
        let mut store = CalibrationStore::new(MemStore::new(64), 0);
        let mut clock = FakeClock::new();

        let outcome = calibrate(&mut reader, &mut table, &mut store, &mut clock, 0, 7.0);

        let CalibrationOutcome::Applied { factor } = outcome else {
            panic!("expected calibration to apply, got {outcome:?}");
        };
        // 2.5 V lands on raw 512, which reads a hair under 7.
        assert!((factor - 1.0).abs() < 0.01, "factor = {factor}");
        assert_eq!(table.factor(0), factor);
        assert_eq!(store.inner().bytes[0..4], factor.to_le_bytes());
        // One full-table save: a write per channel.
        assert_eq!(store.inner().writes, PH_CHANNELS);
    }

    #[test]
    fn calibration_factor_is_target_over_average() {
        // Probe reads ~8.0; buffer is really 6.0.
        let mut reader = reader_at_volts(2, volts_for_ph(8.0));
        let mut table = CalibrationTable::<PH_CHANNELS>::default();
        let mut store = CalibrationStore::new(MemStore::new(64), 0);
        let mut clock = FakeClock::new();

        let outcome = calibrate(&mut reader, &mut table, &mut store, &mut clock, 2, 6.0);
        let CalibrationOutcome::Applied { factor } = outcome else {
            panic!("expected calibration to apply, got {outcome:?}");
        };
        assert!((factor - 0.75).abs() < 0.01, "factor = {factor}");
        assert_eq!(table.factor(0), 1.0);
    }

    #[test]
    fn calibration_spaces_readings() {
        let mut reader = reader_at_volts(0, 2.5);
        let mut table = CalibrationTable::<PH_CHANNELS>::default();
        let mut store = CalibrationStore::new(MemStore::new(64), 0);
        let mut clock = FakeClock::new();

        calibrate(&mut reader, &mut table, &mut store, &mut clock, 0, 7.0);

        // Ten readings of ten settled samples each, plus the spacing.
        let per_reading = 10 * 10 + u64::from(CALIBRATION_SPACING_MS);
        assert_eq!(clock.now, CALIBRATION_READINGS as u64 * per_reading);
    }

    #[test]
    fn too_few_valid_readings_leave_table_unchanged() {
        let mut analog = ScriptedAnalog::new();
        let good = AnalogSpec::TEN_BIT_5V.raw_for_volts(2.5);
        // Four good readings (ten samples each), then a dead probe.
        analog.push(AnalogChannel::Ph(1), &[good; 40]);
        analog.set_default(AnalogChannel::Ph(1), 0);
        let mut reader = SensorReader::new(analog, AnalogSpec::TEN_BIT_5V);
        let mut table = CalibrationTable::<PH_CHANNELS>::default();
        let mut store = CalibrationStore::new(MemStore::new(64), 0);
        let mut clock = FakeClock::new();

        let outcome = calibrate(&mut reader, &mut table, &mut store, &mut clock, 1, 7.0);

        assert_eq!(outcome, CalibrationOutcome::InsufficientReadings { valid: 4 });
        assert_eq!(table, CalibrationTable::default());
        assert_eq!(store.inner().writes, 0);
    }

    #[test]
    fn exactly_half_valid_readings_is_enough() {
        let mut analog = ScriptedAnalog::new();
        let good = AnalogSpec::TEN_BIT_5V.raw_for_volts(2.5);
        analog.push(AnalogChannel::Ph(1), &[good; 50]);
        analog.set_default(AnalogChannel::Ph(1), 0);
        let mut reader = SensorReader::new(analog, AnalogSpec::TEN_BIT_5V);
        let mut table = CalibrationTable::<PH_CHANNELS>::default();
        let mut store = CalibrationStore::new(MemStore::new(64), 0);
        let mut clock = FakeClock::new();

        let outcome = calibrate(&mut reader, &mut table, &mut store, &mut clock, 1, 7.0);
        assert!(matches!(outcome, CalibrationOutcome::Applied { .. }));
    }

    #[test]
    fn bad_arguments_are_ignored_without_sampling() {
        let mut reader = reader_at_volts(0, 2.5);
        let mut table = CalibrationTable::<PH_CHANNELS>::default();
        let mut store = CalibrationStore::new(MemStore::new(64), 0);
        let mut clock = FakeClock::new();

        for (index, target) in [(PH_CHANNELS, 7.0), (0, 0.0), (0, -3.0), (0, 14.5), (0, f32::NAN)] {
            let outcome = calibrate(&mut reader, &mut table, &mut store, &mut clock, index, target);
            assert!(
                !matches!(outcome, CalibrationOutcome::Applied { .. }),
                "index={index} target={target}"
            );
        }
        assert_eq!(clock.now, 0);
        assert_eq!(store.inner().writes, 0);
        assert_eq!(table, CalibrationTable::default());
    }

    #[test]
    fn target_of_fourteen_is_accepted() {
        let mut reader = reader_at_volts(0, volts_for_ph(10.0));
        let mut table = CalibrationTable::<PH_CHANNELS>::default();
        let mut store = CalibrationStore::new(MemStore::new(64), 0);
        let mut clock = FakeClock::new();

        let outcome = calibrate(&mut reader, &mut table, &mut store, &mut clock, 0, 14.0);
        assert!(matches!(outcome, CalibrationOutcome::Applied { .. }));
    }

    #[test]
    fn persist_failure_keeps_in_memory_factor() {
        let mut reader = reader_at_volts(0, volts_for_ph(8.0));
        let mut table = CalibrationTable::<PH_CHANNELS>::default();
        let mut mem = MemStore::new(64);
        mem.fail_writes = true;
        let mut store = CalibrationStore::new(mem, 0);
        let mut clock = FakeClock::new();

        let outcome = calibrate(&mut reader, &mut table, &mut store, &mut clock, 0, 6.0);
        assert!(matches!(outcome, CalibrationOutcome::Applied { .. }));
        assert!((table.factor(0) - 0.75).abs() < 0.01);
    }
}
