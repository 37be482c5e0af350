//! The cooperative control cycle.
//!
//! ```text
//! tick ──▶ [≥ SAMPLE_INTERVAL since last sample?] ──yes──▶ sample ─▶ encode ─▶ send
//!   │
//!   └────▶ while ≥ 2 bytes inbound: read frame ─▶ decode ─▶ dispatch
//!                                                              ├─ ToggleRelay  ─▶ RelayBank
//!                                                              └─ CalibratePh  ─▶ calibrate + persist
//! ```
//!
//! Nothing in here fails: every error degrades to "skip this step, keep
//! ticking".

use crate::calibration::{self, CalibrationStore, CalibrationTable};
use crate::codec::{self, FrameError, SensorSnapshot};
use crate::command::Command;
use crate::hal::{AnalogInput, ByteStore, Climate, ClimateSensor, Clock, OutputPins, Transport};
use crate::relay::RelayBank;
use crate::sensor::SensorReader;
use crate::{PH_CHANNELS, SAMPLE_INTERVAL_MS};

/// What one tick did.  Only used for driver-side logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub sampled: bool,
    pub sent: bool,
    pub frames: usize,
    pub commands: usize,
}

pub struct Controller<A, O, E, S, T, K> {
    reader: SensorReader<A>,
    relays: RelayBank<O>,
    climate: E,
    store: CalibrationStore<S>,
    calibration: CalibrationTable,
    transport: T,
    clock: K,
    last_sample_ms: u64,
}

impl<A, O, E, S, T, K> Controller<A, O, E, S, T, K>
where
    A: AnalogInput,
    O: OutputPins,
    E: ClimateSensor,
    S: ByteStore,
    T: Transport,
    K: Clock,
{
    /// Assemble the controller.  This is the one place calibration is read
    /// from the store.
    pub fn new(
        reader: SensorReader<A>,
        relays: RelayBank<O>,
        climate: E,
        mut store: CalibrationStore<S>,
        transport: T,
        clock: K,
    ) -> Self {
        let calibration = store.load();
        Self {
            reader,
            relays,
            climate,
            store,
            calibration,
            transport,
            clock,
            last_sample_ms: 0,
        }
    }

    pub fn relays(&self) -> &RelayBank<O> {
        &self.relays
    }

    pub fn relays_mut(&mut self) -> &mut RelayBank<O> {
        &mut self.relays
    }

    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    pub fn store(&self) -> &CalibrationStore<S> {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn reader_mut(&mut self) -> &mut SensorReader<A> {
        &mut self.reader
    }

    pub fn climate_mut(&mut self) -> &mut E {
        &mut self.climate
    }

    pub fn clock_mut(&mut self) -> &mut K {
        &mut self.clock
    }

    /// Run one pass of the cycle to completion.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let now = self.clock.now_ms();
        if now.wrapping_sub(self.last_sample_ms) >= SAMPLE_INTERVAL_MS {
            // Advance first so a failed send is not retried every tick.
            self.last_sample_ms = now;
            report.sampled = true;

            let snapshot = self.sample();
            report.sent = self.send(&snapshot);
        }

        while self.transport.available() >= 2 {
            report.frames += 1;
            match self.next_command() {
                Ok(command) => {
                    report.commands += 1;
                    self.dispatch(command);
                }
                Err(FrameError::Stalled) => {
                    tracing::warn!("inbound link stalled, retrying next tick");
                    break;
                }
                Err(e) => tracing::debug!("inbound frame dropped: {e}"),
            }
        }

        report
    }

    /// Read every sensor once.
    pub fn sample(&mut self) -> SensorSnapshot {
        let climate = self.climate.read().unwrap_or_else(|e| {
            tracing::warn!("climate read failed: {e}");
            Climate {
                temperature: f32::NAN,
                humidity: f32::NAN,
            }
        });
        let light_level = self.reader.read_light();

        let mut ph_levels = [None; PH_CHANNELS];
        for (index, slot) in ph_levels.iter_mut().enumerate() {
            *slot = self
                .reader
                .read_ph(index, &self.calibration, &mut self.clock);
        }

        SensorSnapshot {
            temperature: climate.temperature,
            humidity: climate.humidity,
            light_level,
            ph_levels,
            relay_states: self.relays.states(),
        }
    }

    fn send(&mut self, snapshot: &SensorSnapshot) -> bool {
        let frame = match codec::encode_telemetry_frame(snapshot) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("telemetry skipped: {e}");
                return false;
            }
        };
        match self.transport.write_all(&frame) {
            Ok(()) => {
                tracing::trace!(bytes = frame.len(), "telemetry sent");
                true
            }
            Err(e) => {
                tracing::warn!("telemetry write failed: {e}");
                false
            }
        }
    }

    fn next_command(&mut self) -> Result<Command, FrameError> {
        let payload = codec::read_command_payload(&mut self.transport)?;
        codec::decode_command(&payload)
    }

    fn dispatch(&mut self, command: Command) {
        tracing::debug!(?command, "command received");
        match command {
            Command::ToggleRelay { index } => {
                let now = self.clock.now_ms();
                self.relays.toggle(as_index(index), now);
            }
            Command::CalibratePh { index, target } => {
                let outcome = calibration::calibrate(
                    &mut self.reader,
                    &mut self.calibration,
                    &mut self.store,
                    &mut self.clock,
                    as_index(index),
                    target,
                );
                tracing::info!(index, target, ?outcome, "calibration request handled");
            }
            Command::Unknown { kind } => {
                tracing::debug!(kind, "unknown command ignored");
            }
        }
    }
}

fn as_index(index: u32) -> usize {
    usize::try_from(index).unwrap_or(usize::MAX)
}

// ===========================================================================
// Tests
// ===========================================================================
