//! Relay output lines. The `hw` feature gates the real rppal driver;
//! without it, a mock implementation logs line changes.
//!
//! Polarity is decided by the controller (the board is active-low), so
//! both variants simply drive the level they are given.

use anyhow::Result;
use hydro_controller::hal::OutputPins;

#[cfg(feature = "hw")]
use anyhow::Context;
#[cfg(feature = "hw")]
use rppal::gpio::{Gpio, OutputPin};

// ---------------------------------------------------------------------------
// Real GPIO relay board (requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "hw")]
pub struct RelayBoard {
    pins: Vec<OutputPin>, // relay index -> GPIO line
}

#[cfg(feature = "hw")]
impl RelayBoard {
    pub fn new(bcm_pins: &[u8]) -> Result<Self> {
        let gpio = Gpio::new().context("failed to open GPIO")?;
        let mut pins = Vec::with_capacity(bcm_pins.len());

        for &bcm in bcm_pins {
            // Claim the line already HIGH so an active-low relay never
            // clicks on during startup.
            let pin = gpio
                .get(bcm)
                .with_context(|| format!("failed to claim gpio {bcm}"))?
                .into_output_high();
            pins.push(pin);
        }

        tracing::info!(pins = ?bcm_pins, "relay board initialised");
        Ok(Self { pins })
    }
}

#[cfg(feature = "hw")]
impl OutputPins for RelayBoard {
    fn set_level(&mut self, index: usize, high: bool) {
        if let Some(pin) = self.pins.get_mut(index) {
            if high {
                pin.set_high()
            } else {
                pin.set_low()
            }
            tracing::debug!(relay = index, high, "relay line set");
        } else {
            tracing::warn!(relay = index, "no gpio line for relay");
        }
    }
}

// ---------------------------------------------------------------------------
// Mock relay board (development, no hardware)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "hw"))]
pub struct RelayBoard {
    pub(super) pins: Vec<u8>,
    pub(super) levels: Vec<Option<bool>>, // None until first driven
}

#[cfg(not(feature = "hw"))]
impl RelayBoard {
    pub fn new(bcm_pins: &[u8]) -> Result<Self> {
        for (index, pin) in bcm_pins.iter().enumerate() {
            tracing::info!(relay = index, gpio = pin, "[mock-gpio] registered relay (not wired)");
        }
        Ok(Self {
            pins: bcm_pins.to_vec(),
            levels: vec![None; bcm_pins.len()],
        })
    }
}

#[cfg(not(feature = "hw"))]
impl OutputPins for RelayBoard {
    fn set_level(&mut self, index: usize, high: bool) {
        let Some(level) = self.levels.get_mut(index) else {
            tracing::warn!(relay = index, "[mock-gpio] unknown relay");
            return;
        };
        if *level != Some(high) {
            *level = Some(high);
            tracing::info!(
                relay = index,
                gpio = self.pins[index],
                "[mock-gpio] line {}",
                if high { "HIGH" } else { "LOW" }
            );
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
