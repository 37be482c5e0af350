//! Stateful probe simulator for running the node without a rig.
//!
//! Models what the controller's filters have to cope with:
//! - Temporal coherence via random walk with mean reversion
//! - Per-probe set point and slope offsets
//! - Per-conversion electronic noise
//! - Occasional rail spikes (loose connector, ground bounce)
//! - Unplugged probes floating under the noise floor
//! - Diurnal (day/night) light and temperature cycles
//! - Climate sensor timeouts

use anyhow::{ensure, Result};
use hydro_controller::hal::{AnalogChannel, AnalogInput, Climate, ClimateSensor};
use hydro_controller::sensor::volts_for_ph;
use hydro_controller::AnalogSpec;

use crate::config::Scenario;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

/// Sample from N(mean, sigma).
fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

/// Position in the day/night cycle, -1.0 (midnight) to 1.0 (midday).
fn diurnal_phase(period_s: f64) -> f64 {
    let now_s = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    (2.0 * std::f64::consts::PI * now_s / period_s).sin()
}

// ---------------------------------------------------------------------------
// Scenario parameters
// ---------------------------------------------------------------------------

struct Profile {
    /// Random walk step of the true pH per conversion.
    walk_sigma: f64,
    mean_reversion: f64,
    /// Electronic noise in 10-bit counts.
    noise_sigma: f64,
    /// Chance a conversion hits a rail.
    spike_prob: f32,
    /// Chance a climate read times out.
    climate_fail_prob: f32,
}

impl Profile {
    fn for_scenario(scenario: Scenario) -> Self {
        match scenario {
            Scenario::Stable | Scenario::Disconnected => Self {
                walk_sigma: 0.002,
                mean_reversion: 0.01,
                noise_sigma: 1.5,
                spike_prob: 0.005,
                climate_fail_prob: 0.0,
            },
            Scenario::Noisy => Self {
                walk_sigma: 0.01,
                mean_reversion: 0.01,
                noise_sigma: 12.0,
                spike_prob: 0.15,
                climate_fail_prob: 0.2,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Analog probes
// ---------------------------------------------------------------------------

/// Internal state for a single simulated pH probe.
struct ProbeState {
    /// Current true pH of the solution around the probe.
    ph: f64,
    /// pH the reservoir is dosed toward.
    set_point: f64,
    /// Probe slope error; ~1.0 for a healthy probe.
    slope: f64,
    unplugged: bool,
}

/// Simulated pH probes plus light sensor, producing 10-bit / 5 V counts.
pub struct ProbeSim {
    probes: Vec<ProbeState>,
    profile: Profile,
    adc: AnalogSpec,
    diurnal_period_s: f64,
}

impl ProbeSim {
    /// `diurnal_period_s` controls the day/night cycle length.  Use 600
    /// (10 min) for fast dev iteration or 86400 for real-time.
    pub fn new(scenario: Scenario, probe_count: usize, diurnal_period_s: f64) -> Self {
        let probes = (0..probe_count)
            .map(|i| {
                // Leafy greens like 5.5–6.5.
                let set_point = gaussian(6.0, 0.25).clamp(5.0, 7.0);
                ProbeState {
                    ph: set_point,
                    set_point,
                    slope: gaussian(1.0, 0.04).clamp(0.85, 1.15),
                    unplugged: scenario == Scenario::Disconnected && i + 1 == probe_count,
                }
            })
            .collect();

        Self {
            probes,
            profile: Profile::for_scenario(scenario),
            adc: AnalogSpec::TEN_BIT_5V,
            diurnal_period_s,
        }
    }

    /// True pH of probe `index`'s solution, before probe error and noise.
    pub fn true_ph(&self, index: usize) -> Option<f64> {
        self.probes.get(index).map(|p| p.ph)
    }

    fn sample_ph(&mut self, index: usize) -> Result<u16> {
        let max = f64::from(self.adc.max_raw);
        let profile = &self.profile;
        let Some(probe) = self.probes.get_mut(index) else {
            anyhow::bail!("no simulated probe {index}");
        };

        if probe.unplugged {
            // Floating input: picks up a few tens of counts of hum.
            return Ok(fastrand::u16(0..60));
        }

        let pull = profile.mean_reversion * (probe.set_point - probe.ph);
        probe.ph = (probe.ph + pull + gaussian(0.0, profile.walk_sigma)).clamp(0.0, 14.0);

        if fastrand::f32() < profile.spike_prob {
            return Ok(if fastrand::bool() { 0 } else { self.adc.max_raw });
        }

        // Slope error scales the distance from neutral.
        let apparent = 7.0 + (probe.ph - 7.0) * probe.slope;
        let ideal = f64::from(self.adc.raw_for_volts(volts_for_ph(apparent as f32)));
        let raw = gaussian(ideal, profile.noise_sigma).round().clamp(0.0, max);
        Ok(raw as u16)
    }

    fn sample_light(&self) -> u16 {
        // Lights on for the top half of the cycle.
        let phase = diurnal_phase(self.diurnal_period_s);
        let level = if phase > 0.0 { 0.55 + 0.3 * phase } else { 0.02 };
        let max = f64::from(self.adc.max_raw);
        gaussian(level * max, self.profile.noise_sigma)
            .round()
            .clamp(0.0, max) as u16
    }
}

impl AnalogInput for ProbeSim {
    fn read_raw(&mut self, channel: AnalogChannel) -> Result<u16> {
        match channel {
            AnalogChannel::Ph(index) => self.sample_ph(index),
            AnalogChannel::Light => Ok(self.sample_light()),
        }
    }
}

// ---------------------------------------------------------------------------
// Climate
// ---------------------------------------------------------------------------

/// Simulated DHT11: grow tent at ~23 °C / 60 % RH, warmer and drier while
/// the lights are on.
pub struct SimClimate {
    fail_prob: f32,
    diurnal_period_s: f64,
}

impl SimClimate {
    pub fn new(scenario: Scenario, diurnal_period_s: f64) -> Self {
        Self {
            fail_prob: Profile::for_scenario(scenario).climate_fail_prob,
            diurnal_period_s,
        }
    }
}

impl ClimateSensor for SimClimate {
    fn read(&mut self) -> Result<Climate> {
        ensure!(
            fastrand::f32() >= self.fail_prob,
            "simulated DHT11 timeout"
        );
        let phase = diurnal_phase(self.diurnal_period_s);
        // DHT11 resolution is 1 unit.
        Ok(Climate {
            temperature: gaussian(23.0 + 3.0 * phase, 0.4).round() as f32,
            humidity: gaussian(60.0 - 8.0 * phase, 1.0).round().clamp(20.0, 90.0) as f32,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================
