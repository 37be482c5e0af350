//! DHT11 through the Linux IIO driver (`dtoverlay=dht11`).
//!
//! The kernel exposes the last conversion as milli-units in sysfs; a read
//! that times out on the one-wire bus surfaces as an I/O error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hydro_controller::hal::{Climate, ClimateSensor};

const TEMPERATURE_FILE: &str = "in_temp_input";
const HUMIDITY_FILE: &str = "in_humidityrelative_input";

pub struct IioClimate {
    dir: PathBuf,
}

impl IioClimate {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        tracing::info!(device = %dir.display(), "dht11 via iio");
        Self { dir }
    }
}

fn read_milli(path: &Path) -> Result<f32> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_milli(&text).with_context(|| format!("unexpected contents in {}", path.display()))
}

/// `"23000\n"` → `23.0`.
fn parse_milli(text: &str) -> Result<f32> {
    let milli: i32 = text.trim().parse()?;
    Ok(milli as f32 / 1000.0)
}

impl ClimateSensor for IioClimate {
    fn read(&mut self) -> Result<Climate> {
        Ok(Climate {
            temperature: read_milli(&self.dir.join(TEMPERATURE_FILE))?,
            humidity: read_milli(&self.dir.join(HUMIDITY_FILE))?,
        })
    }
}
