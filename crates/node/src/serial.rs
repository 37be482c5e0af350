//! Serial link to the host.
//!
//! With `hw` this is the Pi's UART.  Otherwise the host is simulated in
//! process: telemetry frames are reassembled and logged, and command frames
//! come from lines typed on stdin.

use anyhow::{bail, Context, Result};
use hydro_controller::hal::Transport;

#[cfg(feature = "hw")]
use rppal::uart::{Parity, Uart};
#[cfg(feature = "hw")]
use std::time::Duration;

#[cfg(not(feature = "hw"))]
use hydro_controller::codec::encode_command_frame;
#[cfg(not(feature = "hw"))]
use hydro_controller::{Command, TelemetryScanner};
#[cfg(not(feature = "hw"))]
use std::sync::mpsc::{self, Receiver};

// ---------------------------------------------------------------------------
// UART (production)
// ---------------------------------------------------------------------------

#[cfg(feature = "hw")]
pub struct UartLink {
    uart: Uart,
}

#[cfg(feature = "hw")]
impl UartLink {
    /// Open `device` 8N1.  Reads never wait for data; writes block until
    /// the whole frame is queued.
    pub fn open(device: &str, baud: u32) -> Result<Self> {
        let mut uart = Uart::with_path(device, baud, Parity::None, 8, 1)
            .with_context(|| format!("failed to open {device}"))?;
        uart.set_read_mode(0, Duration::ZERO)
            .context("failed to make UART reads non-blocking")?;
        uart.set_write_mode(true)
            .context("failed to make UART writes blocking")?;
        tracing::info!(device, baud, "uart opened");
        Ok(Self { uart })
    }
}

#[cfg(feature = "hw")]
impl Transport for UartLink {
    fn available(&mut self) -> usize {
        self.uart.input_len().unwrap_or_else(|e| {
            tracing::warn!("uart input_len failed: {e}");
            0
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.uart.read(buf).unwrap_or_else(|e| {
            tracing::warn!("uart read failed: {e}");
            0
        })
    }

    fn write_all(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let n = self.uart.write(bytes).context("uart write failed")?;
            if n == 0 {
                bail!("uart accepted no bytes");
            }
            bytes = &bytes[n..];
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Simulated host (development)
// ---------------------------------------------------------------------------

/// Device end of an in-process link whose other end is a pretend host.
#[cfg(not(feature = "hw"))]
pub struct SimLink {
    inbound: Vec<u8>,
    commands: Receiver<Vec<u8>>,
    scanner: TelemetryScanner,
    frames_seen: usize,
}

#[cfg(not(feature = "hw"))]
impl SimLink {
    /// Link fed by command frames arriving on `commands`.
    pub fn new(commands: Receiver<Vec<u8>>) -> Self {
        Self {
            inbound: Vec::new(),
            commands,
            scanner: TelemetryScanner::new(),
            frames_seen: 0,
        }
    }

    /// Link fed by lines typed on stdin (see [`parse_command_line`]).
    pub fn from_stdin() -> Self {
        let (tx, rx) = mpsc::channel();
        // A plain thread: a pending stdin read must not hold up shutdown.
        std::thread::spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command_line(&line) {
                    Ok(cmd) => {
                        tracing::info!(target: "host", ?cmd, "sending command");
                        if tx.send(encode_command_frame(&cmd)).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(target: "host", "{e:#}"),
                }
            }
        });
        tracing::info!(
            target: "host",
            "simulated host ready: type `toggle <relay>` or `calibrate <probe> <ph>`"
        );
        Self::new(rx)
    }

    /// Telemetry frames the host has decoded so far.
    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    fn pump(&mut self) {
        while let Ok(frame) = self.commands.try_recv() {
            self.inbound.extend_from_slice(&frame);
        }
    }
}

#[cfg(not(feature = "hw"))]
impl Transport for SimLink {
    fn available(&mut self) -> usize {
        self.pump();
        self.inbound.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.inbound.len());
        buf[..n].copy_from_slice(&self.inbound[..n]);
        self.inbound.drain(..n);
        n
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.scanner.push(bytes);
        while let Some(frame) = self.scanner.next_frame() {
            match frame {
                Ok(s) => {
                    self.frames_seen += 1;
                    tracing::info!(
                        target: "host",
                        temperature = s.temperature,
                        humidity = s.humidity,
                        light = format_args!("{:.1}", s.light_level),
                        ph = ?s.ph_levels.map(|p| p.map(|v| (v * 100.0).round() / 100.0)),
                        relays = ?s.relay_states,
                        "telemetry"
                    );
                }
                Err(e) => tracing::warn!(target: "host", "dropped telemetry frame: {e}"),
            }
        }
        Ok(())
    }
}

/// Parse one line of host input.
///
/// ```text
/// toggle <relay>
/// calibrate <probe> <ph>
/// ```
#[cfg(not(feature = "hw"))]
pub fn parse_command_line(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default().to_ascii_lowercase();
    let args: Vec<&str> = words.collect();

    let cmd = match (verb.as_str(), args.as_slice()) {
        ("toggle", [index]) => Command::ToggleRelay {
            index: index
                .parse()
                .with_context(|| format!("invalid relay index {index:?}"))?,
        },
        ("calibrate", [index, target]) => Command::CalibratePh {
            index: index
                .parse()
                .with_context(|| format!("invalid probe index {index:?}"))?,
            target: target
                .parse()
                .with_context(|| format!("invalid pH value {target:?}"))?,
        },
        _ => bail!("unrecognised command {line:?}: expected `toggle <relay>` or `calibrate <probe> <ph>`"),
    };
    Ok(cmd)
}

// ===========================================================================
// Tests
// ===========================================================================
