//! Collaborator seams: everything the controller needs from the board.
//!
//! Implementations live in the driver crate (Raspberry Pi peripherals or
//! the simulator) and in this crate's test fakes.

use anyhow::Result;

/// Which analog input to sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalogChannel {
    /// pH probe by channel index.
    Ph(usize),
    /// Light-dependent resistor divider.
    Light,
}

/// Raw analog-to-digital conversion.
pub trait AnalogInput {
    /// One single-shot conversion.  Values are in the converter's native
    /// range (see [`crate::sensor::AnalogSpec`]).
    fn read_raw(&mut self, channel: AnalogChannel) -> Result<u16>;
}

/// Digital output lines driving the relay coils.
pub trait OutputPins {
    /// Drive line `index` high (`true`) or low (`false`).
    fn set_level(&mut self, index: usize, high: bool);
}

/// Combined temperature / relative humidity reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    pub temperature: f32,
    pub humidity: f32,
}

/// Temperature/humidity sensor driver.
pub trait ClimateSensor {
    fn read(&mut self) -> Result<Climate>;
}

/// Persistent byte-addressed storage (EEPROM or an image of one).
pub trait ByteStore {
    /// Fill `buf` from `offset`.  Unwritten regions read back as `0xFF`.
    fn read_bytes(&mut self, offset: usize, buf: &mut [u8]) -> Result<()>;
    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()>;
}

/// Point-to-point serial link to the host.
pub trait Transport {
    /// Bytes that can be read right now without waiting.
    fn available(&mut self) -> usize;

    /// Read up to `buf.len()` bytes that are already buffered.  Never waits
    /// for more; returns the count copied.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write the whole buffer.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Millisecond time source plus the blocking settling delay.
pub trait Clock {
    /// Milliseconds since boot.  May wrap; consumers use wrapping math.
    fn now_ms(&self) -> u64;

    /// Busy-wait for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}
