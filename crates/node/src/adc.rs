//! ADS1115 16-bit ADC driver over I2C for the pH probes and light sensor.
//!
//! Reads single-ended channels at PGA ±6.144 V, 128 SPS, single-shot mode,
//! so a probe swinging 0–5 V stays in range.  Conversions are rescaled to
//! the 10-bit / 5 V counts the controller's filters are tuned for.  Several
//! converters may share the bus (ADDR pin → 0x48–0x4B).

#[cfg(feature = "hw")]
use std::collections::HashMap;
#[cfg(feature = "hw")]
use std::{thread, time::Duration};

#[cfg(feature = "hw")]
use anyhow::{Context, Result};
#[cfg(feature = "hw")]
use hydro_controller::hal::{AnalogChannel, AnalogInput};
use hydro_controller::AnalogSpec;
#[cfg(feature = "hw")]
use rppal::i2c::I2c;

#[cfg(feature = "hw")]
use crate::config::{AnalogConfig, AnalogInputEntry};

// ── ADS1115 register addresses ──────────────────────────────────────────────

/// Conversion result register (read-only, 16-bit signed).
#[cfg(feature = "hw")]
const REG_CONVERSION: u8 = 0x00;
/// Configuration register (read/write).
#[cfg(feature = "hw")]
const REG_CONFIG: u8 = 0x01;

// ── Config register bit fields ──────────────────────────────────────────────
//
// Layout (MSB first):
//   [15]    OS       (write 1 to start single-shot conversion)
//   [14:12] MUX      input multiplexer (channel selection)
//   [11:9]  PGA      programmable gain amplifier
//   [8]     MODE     0 = continuous, 1 = single-shot
//   [7:5]   DR       data rate
//   [4]     COMP_MODE
//   [3]     COMP_POL
//   [2]     COMP_LAT
//   [1:0]   COMP_QUE (11 = comparator off)

/// Bits common to all channel reads:
///   OS=1 (start), PGA=000 (±6.144 V), MODE=1 (single-shot),
///   DR=100 (128 SPS), COMP_QUE=11 (comparator off).
const CONFIG_BASE: u16 = 0b1_000_000_1_100_0_0_0_11;

/// MUX values for single-ended reads (AINx vs GND).
const MUX_SHIFT: u8 = 12;
const MUX_SINGLE_ENDED: [u16; 4] = [0b100, 0b101, 0b110, 0b111];

/// Full-scale voltage at PGA=000.
const FULL_SCALE_VOLTS: f32 = 6.144;
/// Largest positive conversion result.
const FULL_SCALE_COUNTS: f32 = 32767.0;

/// Conversion time at 128 SPS is ~7.8 ms.
#[cfg(feature = "hw")]
const CONVERSION_WAIT: Duration = Duration::from_millis(9);

/// Bit 15 of the config register: conversion-ready flag when read.
#[cfg(feature = "hw")]
const OS_READY_BIT: u16 = 1 << 15;

/// Build the config register value for a single-ended read on `channel`.
#[cfg_attr(not(feature = "hw"), allow(dead_code))]
fn config_for_channel(channel: u8) -> u16 {
    CONFIG_BASE | (MUX_SINGLE_ENDED[usize::from(channel & 0b11)] << MUX_SHIFT)
}

/// Conversion result → volts.  Negative results (ground noise on a
/// single-ended input) read as 0 V.
fn conversion_volts(raw: i16) -> f32 {
    f32::from(raw.max(0)) * FULL_SCALE_VOLTS / FULL_SCALE_COUNTS
}

/// Conversion result → the 10-bit / 5 V counts the filters expect.
#[cfg_attr(not(feature = "hw"), allow(dead_code))]
fn ten_bit_counts(raw: i16) -> u16 {
    AnalogSpec::TEN_BIT_5V.raw_for_volts(conversion_volts(raw))
}

// ── Driver ──────────────────────────────────────────────────────────────────

/// Every ADS1115 the rig uses, behind one [`AnalogInput`].
#[cfg(feature = "hw")]
pub struct Ads1115Bank {
    i2c: I2c,
    selected: Option<u16>,
    inputs: HashMap<AnalogChannel, AnalogInputEntry>,
}

#[cfg(feature = "hw")]
impl Ads1115Bank {
    /// Open I2C bus 1.  `analog` must already be validated.
    pub fn new(analog: &AnalogConfig) -> Result<Self> {
        let mut inputs = HashMap::new();
        for (index, entry) in analog.ph.iter().enumerate() {
            inputs.insert(AnalogChannel::Ph(index), *entry);
        }
        inputs.insert(AnalogChannel::Light, analog.light);

        let i2c = I2c::new().context("failed to open I2C bus")?;

        tracing::info!(
            ph = ?analog.ph.iter().map(ToString::to_string).collect::<Vec<_>>(),
            light = %analog.light,
            "ads1115 bank initialised"
        );

        Ok(Self {
            i2c,
            selected: None,
            inputs,
        })
    }

    fn select(&mut self, addr: u16) -> Result<()> {
        if self.selected != Some(addr) {
            self.i2c
                .set_slave_address(addr)
                .with_context(|| format!("failed to select ADS1115 at 0x{addr:02x}"))?;
            self.selected = Some(addr);
        }
        Ok(())
    }

    /// Perform a single-shot read, returning the raw 16-bit signed value.
    fn read_conversion(&mut self, entry: AnalogInputEntry) -> Result<i16> {
        self.select(entry.addr)?;
        self.i2c
            .block_write(REG_CONFIG, &config_for_channel(entry.channel).to_be_bytes())?;

        thread::sleep(CONVERSION_WAIT);

        // Normally one wait is enough at 128 SPS.
        for _ in 0..3 {
            let mut buf = [0u8; 2];
            self.i2c.block_read(REG_CONFIG, &mut buf)?;
            if u16::from_be_bytes(buf) & OS_READY_BIT != 0 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        let mut buf = [0u8; 2];
        self.i2c.block_read(REG_CONVERSION, &mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }
}

#[cfg(feature = "hw")]
impl AnalogInput for Ads1115Bank {
    fn read_raw(&mut self, channel: AnalogChannel) -> Result<u16> {
        let entry = *self
            .inputs
            .get(&channel)
            .with_context(|| format!("{channel:?} is not wired"))?;
        let raw = self
            .read_conversion(entry)
            .with_context(|| format!("ads1115 read failed on {entry}"))?;
        Ok(ten_bit_counts(raw))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
