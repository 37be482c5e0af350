//! TOML config file loading and validation for the node: serial link,
//! relay wiring, analog input wiring, climate sensor and calibration image.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

use hydro_controller::{PH_CHANNELS, RELAY_COUNT};

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    pub relays: RelayConfig,
    pub analog: AnalogConfig,
    #[serde(default)]
    pub climate: ClimateConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

#[derive(Debug, Deserialize)]
pub struct SerialConfig {
    pub device: String,
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/serial0".into(),
            baud: 115_200,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    /// BCM pin per relay, in relay index order.
    pub gpio_pins: Vec<i64>,
}

/// One ADS1115 single-ended input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct AnalogInputEntry {
    pub addr: u16,
    pub channel: u8,
}

impl fmt::Display for AnalogInputEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}/AIN{}", self.addr, self.channel)
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalogConfig {
    /// One entry per pH probe, in channel index order.
    pub ph: Vec<AnalogInputEntry>,
    pub light: AnalogInputEntry,
}

#[derive(Debug, Deserialize)]
pub struct ClimateConfig {
    /// sysfs directory of the DHT11 IIO device.
    pub iio_device: String,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            iio_device: "/sys/bus/iio/devices/iio:device0".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Flat file standing in for the EEPROM.
    pub calibration_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            calibration_path: "calibration.bin".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub scenario: Scenario,
}

/// Simulator profiles.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Probes sit near their set points with light noise.
    #[default]
    Stable,
    /// Heavy noise, frequent rail spikes, flaky climate sensor.
    Noisy,
    /// Like `Stable`, but the last pH probe is unplugged.
    Disconnected,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => write!(f, "stable"),
            Self::Noisy => write!(f, "noisy"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

// ---------------------------------------------------------------------------
// Hardware whitelists
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 28+ are not exposed on the standard header.
const VALID_GPIO_PINS: &[i64] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

/// ADS1115 I2C addresses selectable with the ADDR pin.
const ADS1115_ADDRS: std::ops::RangeInclusive<u16> = 0x48..=0x4B;

/// Highest single-ended ADS1115 input (AIN0-AIN3).
const ADS1115_MAX_CHANNEL: u8 = 3;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_serial(&mut errors);
        self.validate_relays(&mut errors);
        self.validate_analog(&mut errors);
        self.validate_paths(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_serial(&self, errors: &mut Vec<String>) {
        if self.serial.device.trim().is_empty() {
            errors.push("serial: device is empty".into());
        }
        if self.serial.baud == 0 {
            errors.push("serial: baud must be positive".into());
        }
    }

    fn validate_relays(&self, errors: &mut Vec<String>) {
        let pins = &self.relays.gpio_pins;
        if pins.len() != RELAY_COUNT {
            errors.push(format!(
                "relays: expected {RELAY_COUNT} gpio_pins, got {}",
                pins.len()
            ));
        }

        let mut seen: HashSet<i64> = HashSet::new();
        for (i, pin) in pins.iter().enumerate() {
            if !VALID_GPIO_PINS.contains(pin) {
                errors.push(format!(
                    "relay {i}: gpio pin {pin} is not a valid BCM GPIO pin (allowed: 2-27)"
                ));
            } else if !seen.insert(*pin) {
                errors.push(format!(
                    "relay {i}: gpio pin {pin} is already used by another relay"
                ));
            }
        }
    }

    fn validate_analog(&self, errors: &mut Vec<String>) {
        if self.analog.ph.len() != PH_CHANNELS {
            errors.push(format!(
                "analog: expected {PH_CHANNELS} ph inputs, got {}",
                self.analog.ph.len()
            ));
        }

        let inputs = self
            .analog
            .ph
            .iter()
            .enumerate()
            .map(|(i, e)| (format!("ph[{i}]"), e))
            .chain(std::iter::once(("light".to_string(), &self.analog.light)));

        let mut seen: HashSet<AnalogInputEntry> = HashSet::new();
        for (name, entry) in inputs {
            // ── Address / channel range ────────────────────────
            if !ADS1115_ADDRS.contains(&entry.addr) {
                errors.push(format!(
                    "analog {name}: address 0x{:02x} is not an ADS1115 address (0x48-0x4b)",
                    entry.addr
                ));
            }
            if entry.channel > ADS1115_MAX_CHANNEL {
                errors.push(format!(
                    "analog {name}: channel {} out of range (0-{ADS1115_MAX_CHANNEL})",
                    entry.channel
                ));
            }

            // ── Uniqueness ─────────────────────────────────────
            if !seen.insert(*entry) {
                errors.push(format!("analog {name}: input {entry} is already in use"));
            }
        }
    }

    fn validate_paths(&self, errors: &mut Vec<String>) {
        if self.climate.iio_device.trim().is_empty() {
            errors.push("climate: iio_device is empty".into());
        }
        if self.storage.calibration_path.trim().is_empty() {
            errors.push("storage: calibration_path is empty".into());
        }
    }

    /// Relay pins narrowed to the width rppal takes.  Only meaningful after
    /// [`Config::validate`] has passed.
    pub fn relay_pins(&self) -> Vec<u8> {
        self.relays
            .gpio_pins
            .iter()
            .filter_map(|p| u8::try_from(*p).ok())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;

    tracing::info!(
        path,
        serial = %config.serial.device,
        scenario = %config.sim.scenario,
        "config loaded"
    );
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
