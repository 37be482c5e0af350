//! Host commands as a closed set, with a catch-all for kinds this firmware
//! does not know.

use crate::codec::wire;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    ToggleRelay { index: u32 },
    CalibratePh { index: u32, target: f32 },
    /// A command type added on the host side after this build.  Ignored.
    Unknown { kind: i32 },
}

impl From<wire::Command> for Command {
    fn from(msg: wire::Command) -> Self {
        match wire::CommandType::try_from(msg.r#type) {
            Ok(wire::CommandType::ToggleRelay) => Self::ToggleRelay {
                index: msg.relay_index,
            },
            Ok(wire::CommandType::CalibratePh) => Self::CalibratePh {
                index: msg.ph_sensor_index,
                target: msg.ph_calibration_value,
            },
            Err(_) => Self::Unknown { kind: msg.r#type },
        }
    }
}

impl From<&Command> for wire::Command {
    fn from(cmd: &Command) -> Self {
        match *cmd {
            Command::ToggleRelay { index } => Self {
                r#type: wire::CommandType::ToggleRelay as i32,
                relay_index: index,
                ..Default::default()
            },
            Command::CalibratePh { index, target } => Self {
                r#type: wire::CommandType::CalibratePh as i32,
                ph_sensor_index: index,
                ph_calibration_value: target,
                ..Default::default()
            },
            Command::Unknown { kind } => Self {
                r#type: kind,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_uses_relay_index_only() {
        let msg = wire::Command {
            r#type: wire::CommandType::ToggleRelay as i32,
            relay_index: 4,
            ph_sensor_index: 9,
            ph_calibration_value: 3.0,
        };
        assert_eq!(Command::from(msg), Command::ToggleRelay { index: 4 });
    }

    #[test]
    fn calibrate_uses_sensor_fields() {
        let msg = wire::Command {
            r#type: wire::CommandType::CalibratePh as i32,
            relay_index: 1,
            ph_sensor_index: 2,
            ph_calibration_value: 4.01,
        };
        assert_eq!(
            Command::from(msg),
            Command::CalibratePh {
                index: 2,
                target: 4.01
            }
        );
    }

    #[test]
    fn unrecognised_type_is_kept_as_unknown() {
        let msg = wire::Command {
            r#type: 7,
            ..Default::default()
        };
        assert_eq!(Command::from(msg), Command::Unknown { kind: 7 });
    }

    #[test]
    fn empty_payload_is_a_toggle_of_relay_zero() {
        // proto3 omits zero values, so TOGGLE_RELAY index 0 encodes to nothing.
        let cmd = crate::codec::decode_command(&[]).unwrap();
        assert_eq!(cmd, Command::ToggleRelay { index: 0 });
    }
}
