//! Hydroponics rig controller core.
//!
//! One cooperative [`Controller::tick`] samples the pH probes, light sensor
//! and climate sensor once per [`SAMPLE_INTERVAL_MS`], ships the snapshot to
//! the host as a marker-delimited frame, and drains inbound command frames
//! (relay toggles, pH calibration).  Every piece of hardware is reached
//! through the traits in [`hal`], so the whole cycle runs on a host under
//! test with fakes.

pub mod calibration;
pub mod codec;
pub mod command;
pub mod controller;
pub mod hal;
pub mod relay;
pub mod sensor;

#[cfg(test)]
pub(crate) mod testing;

pub use calibration::{CalibrationOutcome, CalibrationStore, CalibrationTable};
pub use codec::{FrameError, SensorSnapshot, TelemetryScanner};
pub use command::Command;
pub use controller::{Controller, TickReport};
pub use relay::RelayBank;
pub use sensor::{AnalogSpec, SensorReader};

// ---------------------------------------------------------------------------
// Build-time sizing and timing
// ---------------------------------------------------------------------------

/// Number of pH probes wired to the rig.
pub const PH_CHANNELS: usize = 5;

/// Number of relay outputs on the actuator bank.
pub const RELAY_COUNT: usize = 5;

/// Telemetry period.
pub const SAMPLE_INTERVAL_MS: u64 = 1000;

/// Raw samples averaged into one pH reading.
pub const PH_SAMPLES: usize = 10;

/// Settling time for the analog front end between raw pH samples.
pub const PH_SETTLE_MS: u32 = 10;

/// Fewer surviving samples than this and the reading is invalid.
pub const MIN_VALID_PH_SAMPLES: usize = 3;

/// Minimum spacing between two accepted toggles anywhere on the bank.
pub const RELAY_GUARD_MS: u64 = 100;

/// Full pH readings taken by one calibration run.
pub const CALIBRATION_READINGS: usize = 10;

/// Delay between calibration readings.
pub const CALIBRATION_SPACING_MS: u32 = 100;

/// Largest payload accepted or produced on the serial link.
pub const MAX_PAYLOAD: usize = 128;

/// Byte offset of channel 0's calibration factor in the persistent store.
pub const CALIBRATION_BASE_OFFSET: usize = 0;
