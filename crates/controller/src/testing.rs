//! In-memory fakes for the [`crate::hal`] traits.

use std::collections::{HashMap, VecDeque};

use anyhow::{bail, ensure, Result};

use crate::hal::{
    AnalogChannel, AnalogInput, ByteStore, Climate, ClimateSensor, Clock, OutputPins, Transport,
};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Manually driven clock; delays advance it instantly.
#[derive(Debug, Default)]
pub struct FakeClock {
    pub now: u64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now = self.now.wrapping_add(u64::from(ms));
    }
}

// ---------------------------------------------------------------------------
// Analog
// ---------------------------------------------------------------------------

/// Per-channel queue of raw values, falling back to a fixed default (0 when
/// unset) once the queue runs dry.
#[derive(Debug, Default)]
pub struct ScriptedAnalog {
    queued: HashMap<AnalogChannel, VecDeque<u16>>,
    defaults: HashMap<AnalogChannel, u16>,
    failures: HashMap<AnalogChannel, usize>,
    reads: HashMap<AnalogChannel, usize>,
}

impl ScriptedAnalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default(&mut self, channel: AnalogChannel, raw: u16) {
        self.defaults.insert(channel, raw);
    }

    pub fn push(&mut self, channel: AnalogChannel, raws: &[u16]) {
        self.queued
            .entry(channel)
            .or_default()
            .extend(raws.iter().copied());
    }

    /// Make the next `n` conversions on `channel` fail.
    pub fn fail_next(&mut self, channel: AnalogChannel, n: usize) {
        *self.failures.entry(channel).or_default() += n;
    }

    pub fn reads(&self, channel: AnalogChannel) -> usize {
        self.reads.get(&channel).copied().unwrap_or(0)
    }
}

impl AnalogInput for ScriptedAnalog {
    fn read_raw(&mut self, channel: AnalogChannel) -> Result<u16> {
        *self.reads.entry(channel).or_default() += 1;

        if let Some(left) = self.failures.get_mut(&channel) {
            if *left > 0 {
                *left -= 1;
                bail!("scripted conversion failure on {channel:?}");
            }
        }
        if let Some(raw) = self.queued.get_mut(&channel).and_then(VecDeque::pop_front) {
            return Ok(raw);
        }
        Ok(self.defaults.get(&channel).copied().unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// Relay lines
// ---------------------------------------------------------------------------

/// Remembers the last level written to each line.
#[derive(Debug, Default)]
pub struct RecordingPins {
    levels: HashMap<usize, bool>,
    pub writes: Vec<(usize, bool)>,
}

impl RecordingPins {
    pub fn level(&self, index: usize) -> Option<bool> {
        self.levels.get(&index).copied()
    }
}

impl OutputPins for RecordingPins {
    fn set_level(&mut self, index: usize, high: bool) {
        self.levels.insert(index, high);
        self.writes.push((index, high));
    }
}

// ---------------------------------------------------------------------------
// Climate
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FixedClimate {
    pub reading: Climate,
    pub fail: bool,
}

impl FixedClimate {
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            reading: Climate {
                temperature,
                humidity,
            },
            fail: false,
        }
    }
}

impl ClimateSensor for FixedClimate {
    fn read(&mut self) -> Result<Climate> {
        ensure!(!self.fail, "climate sensor timed out");
        Ok(self.reading)
    }
}

// ---------------------------------------------------------------------------
// Persistent store
// ---------------------------------------------------------------------------

/// Erased EEPROM image of a fixed size.
#[derive(Debug)]
pub struct MemStore {
    pub bytes: Vec<u8>,
    pub writes: usize,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl MemStore {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0xFF; size],
            writes: 0,
            fail_reads: false,
            fail_writes: false,
        }
    }
}

impl ByteStore for MemStore {
    fn read_bytes(&mut self, offset: usize, buf: &mut [u8]) -> Result<()> {
        ensure!(!self.fail_reads, "scripted read failure");
        let Some(src) = self.bytes.get(offset..offset + buf.len()) else {
            bail!("read of {} bytes at {offset} past end", buf.len());
        };
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        ensure!(!self.fail_writes, "scripted write failure");
        let Some(dst) = self.bytes.get_mut(offset..offset + bytes.len()) else {
            bail!("write of {} bytes at {offset} past end", bytes.len());
        };
        dst.copy_from_slice(bytes);
        self.writes += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serial link
// ---------------------------------------------------------------------------

/// Inbound bytes are whatever the test injects; outbound bytes pile up in
/// `outbound`.  With `stall_reads` set, pending bytes are reported but
/// `read` yields nothing, like a UART whose driver is erroring.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    inbound: VecDeque<u8>,
    pub outbound: Vec<u8>,
    pub fail_writes: bool,
    pub stall_reads: bool,
}

impl LoopbackTransport {
    pub fn inject(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }
}

impl Transport for LoopbackTransport {
    fn available(&mut self) -> usize {
        self.inbound.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        if self.stall_reads {
            return 0;
        }
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        n
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        ensure!(!self.fail_writes, "link down");
        self.outbound.extend_from_slice(bytes);
        Ok(())
    }
}
