//! Serial framing and protobuf payloads.
//!
//! Device → host (telemetry):
//!
//! ```text
//! FF FE | len:u16 LE | SensorData payload | FD FC
//! ```
//!
//! Host → device (commands) carries only the length prefix:
//!
//! ```text
//! len:u16 LE | Command payload
//! ```
//!
//! Inbound frames have no markers, so once a bad length prefix has been
//! consumed the reader cannot tell where the next frame starts.  The host
//! on the other end depends on this exact format, so it is kept as is.
//! Reads never wait either: a frame that arrives split across two polls
//! loses its head, and its tail is then taken as the next length prefix.

use prost::Message as _;
use thiserror::Error;

use crate::command::Command;
use crate::hal::Transport;
use crate::{MAX_PAYLOAD, PH_CHANNELS, RELAY_COUNT};

pub const START_MARKER: [u8; 2] = [0xFF, 0xFE];
pub const END_MARKER: [u8; 2] = [0xFD, 0xFC];

const LEN_PREFIX: usize = 2;
const HEADER_LEN: usize = START_MARKER.len() + LEN_PREFIX;

/// What the host sees in a pH slot when the channel had no valid reading.
pub const INVALID_PH: f32 = -1.0;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("payload of {len} bytes exceeds the {max}-byte limit", max = MAX_PAYLOAD)]
    PayloadTooLarge { len: usize },
    #[error("frame truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("link reported pending bytes but yielded none")]
    Stalled,
    #[error("frame does not end with FD FC")]
    BadEndMarker,
    #[error("expected {expected} {field}, got {got}")]
    FieldCount {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("payload decode failed: {0}")]
    Decode(#[from] prost::DecodeError),
}

// ---------------------------------------------------------------------------
// Wire schema
// ---------------------------------------------------------------------------

/// Protobuf messages shared with the host.
pub mod wire {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SensorData {
        #[prost(float, tag = "1")]
        pub temperature: f32,
        #[prost(float, tag = "2")]
        pub humidity: f32,
        #[prost(float, tag = "3")]
        pub light_level: f32,
        #[prost(float, repeated, tag = "4")]
        pub ph_levels: Vec<f32>,
        #[prost(bool, repeated, tag = "5")]
        pub relay_states: Vec<bool>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum CommandType {
        ToggleRelay = 0,
        CalibratePh = 1,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Command {
        #[prost(enumeration = "CommandType", tag = "1")]
        pub r#type: i32,
        #[prost(uint32, tag = "2")]
        pub relay_index: u32,
        #[prost(uint32, tag = "3")]
        pub ph_sensor_index: u32,
        #[prost(float, tag = "4")]
        pub ph_calibration_value: f32,
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One sampling tick's worth of readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSnapshot {
    /// Degrees Celsius; NaN when the climate sensor did not answer.
    pub temperature: f32,
    /// Percent relative humidity; NaN when the climate sensor did not answer.
    pub humidity: f32,
    /// 0–100.
    pub light_level: f32,
    pub ph_levels: [Option<f32>; PH_CHANNELS],
    pub relay_states: [bool; RELAY_COUNT],
}

impl From<&SensorSnapshot> for wire::SensorData {
    fn from(s: &SensorSnapshot) -> Self {
        Self {
            temperature: s.temperature,
            humidity: s.humidity,
            light_level: s.light_level,
            ph_levels: s
                .ph_levels
                .iter()
                .map(|ph| ph.unwrap_or(INVALID_PH))
                .collect(),
            relay_states: s.relay_states.to_vec(),
        }
    }
}

impl TryFrom<wire::SensorData> for SensorSnapshot {
    type Error = FrameError;

    fn try_from(msg: wire::SensorData) -> Result<Self, Self::Error> {
        let ph: [f32; PH_CHANNELS] =
            msg.ph_levels
                .as_slice()
                .try_into()
                .map_err(|_| FrameError::FieldCount {
                    field: "ph_levels",
                    expected: PH_CHANNELS,
                    got: msg.ph_levels.len(),
                })?;
        let relay_states: [bool; RELAY_COUNT] = msg
            .relay_states
            .as_slice()
            .try_into()
            .map_err(|_| FrameError::FieldCount {
                field: "relay_states",
                expected: RELAY_COUNT,
                got: msg.relay_states.len(),
            })?;

        Ok(Self {
            temperature: msg.temperature,
            humidity: msg.humidity,
            light_level: msg.light_level,
            ph_levels: ph.map(|v| (v >= 0.0).then_some(v)),
            relay_states,
        })
    }
}

// ---------------------------------------------------------------------------
// Outbound (device → host)
// ---------------------------------------------------------------------------

/// Build a complete telemetry frame.  Nothing is produced when the payload
/// would not fit, so a caller never writes half a frame.
pub fn encode_telemetry_frame(snapshot: &SensorSnapshot) -> Result<Vec<u8>, FrameError> {
    let payload = wire::SensorData::from(snapshot).encode_to_vec();
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge { len: payload.len() });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + END_MARKER.len());
    frame.extend_from_slice(&START_MARKER);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&END_MARKER);
    Ok(frame)
}

pub fn decode_telemetry_payload(payload: &[u8]) -> Result<SensorSnapshot, FrameError> {
    SensorSnapshot::try_from(wire::SensorData::decode(payload)?)
}

// ---------------------------------------------------------------------------
// Inbound (host → device)
// ---------------------------------------------------------------------------

/// Pull one length-prefixed command payload off the link.
///
/// Bytes consumed before a failure stay consumed: an oversized prefix costs
/// two bytes, a short payload costs everything that was buffered.
pub fn read_command_payload(transport: &mut impl Transport) -> Result<Vec<u8>, FrameError> {
    let mut prefix = [0u8; LEN_PREFIX];
    let got = transport.read(&mut prefix);
    if got == 0 {
        return Err(FrameError::Stalled);
    }
    if got < LEN_PREFIX {
        return Err(FrameError::Truncated {
            expected: LEN_PREFIX,
            got,
        });
    }

    let declared = usize::from(u16::from_le_bytes(prefix));
    if declared > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge { len: declared });
    }

    let mut payload = vec![0u8; declared];
    let got = transport.read(&mut payload);
    if got < declared {
        return Err(FrameError::Truncated {
            expected: declared,
            got,
        });
    }
    Ok(payload)
}

pub fn decode_command(payload: &[u8]) -> Result<Command, FrameError> {
    Ok(Command::from(wire::Command::decode(payload)?))
}

/// Host-side counterpart of [`read_command_payload`] + [`decode_command`].
pub fn encode_command_frame(command: &Command) -> Vec<u8> {
    let payload = wire::Command::from(command).encode_to_vec();
    let mut frame = Vec::with_capacity(LEN_PREFIX + payload.len());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame
}

// ---------------------------------------------------------------------------
// Host-side telemetry reassembly
// ---------------------------------------------------------------------------

/// Reassembles telemetry frames from an arbitrary byte stream, hunting for
/// the start marker and dropping anything that does not end in `FD FC`.
#[derive(Debug, Default)]
pub struct TelemetryScanner {
    buf: Vec<u8>,
}

impl TelemetryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes held while waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Next frame in the stream.  `None` means more bytes are needed; an
    /// `Err` reports a frame that was found and dropped.
    pub fn next_frame(&mut self) -> Option<Result<SensorSnapshot, FrameError>> {
        match self.buf.windows(2).position(|w| w == START_MARKER) {
            Some(0) => {}
            Some(pos) => {
                self.buf.drain(..pos);
            }
            None => {
                // Keep a trailing FF: it may be the first half of a marker.
                let keep = usize::from(self.buf.last() == Some(&START_MARKER[0]));
                let cut = self.buf.len() - keep;
                self.buf.drain(..cut);
                return None;
            }
        }

        if self.buf.len() < HEADER_LEN {
            return None;
        }
        let len = usize::from(u16::from_le_bytes([self.buf[2], self.buf[3]]));
        if len > MAX_PAYLOAD {
            self.buf.drain(..1);
            return Some(Err(FrameError::PayloadTooLarge { len }));
        }

        let total = HEADER_LEN + len + END_MARKER.len();
        if self.buf.len() < total {
            return None;
        }
        if self.buf[HEADER_LEN + len..total] != END_MARKER {
            // Skip this marker and look for the next one.
            self.buf.drain(..1);
            return Some(Err(FrameError::BadEndMarker));
        }

        let result = decode_telemetry_payload(&self.buf[HEADER_LEN..HEADER_LEN + len]);
        self.buf.drain(..total);
        Some(result)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
