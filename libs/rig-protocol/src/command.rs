//! Stepper motor command codec
//!
//! The drive controllers sit behind a LAN-to-485 bridge and accept Modbus RTU
//! "write single register" requests:
//!
//! ```text
//! [address(1)][0x06][register(2)][value(2)][CRC16(2), low byte first]
//! ```
//!
//! | Operation   | Register | Value              |
//! |-------------|----------|--------------------|
//! | direction   | 0x0000 forward / 0x0001 reverse | 0x0001 (run) |
//! | stop        | 0x0002   | 0x0001             |
//! | speed       | 0x0005   | speed              |
//! | pulse count | 0x0007   | pulses (0 = run until stopped) |

use serde::{Deserialize, Serialize};

use crate::crc::{append_crc, crc16};
use crate::error::{ProtocolError, Result};
use crate::frame::decode_hex;

/// Modbus function code: write single register
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

pub const REG_DIRECTION_FORWARD: u16 = 0x0000;
pub const REG_DIRECTION_REVERSE: u16 = 0x0001;
pub const REG_STOP: u16 = 0x0002;
pub const REG_SPEED: u16 = 0x0005;
pub const REG_PULSE_COUNT: u16 = 0x0007;

/// Value written to the direction and stop registers
const RUN_FLAG: u16 = 0x0001;

/// Full frame length: address + function + register + value + CRC
pub const COMMAND_FRAME_LEN: usize = 8;

/// Rotation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn from_forward(forward: bool) -> Self {
        if forward {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }

    pub fn is_forward(self) -> bool {
        matches!(self, Direction::Forward)
    }
}

/// Motor operation carried by one command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorOp {
    PulseCount(u16),
    Direction(Direction),
    Speed(u16),
    Stop,
}

impl MotorOp {
    fn register(self) -> u16 {
        match self {
            MotorOp::PulseCount(_) => REG_PULSE_COUNT,
            MotorOp::Direction(Direction::Forward) => REG_DIRECTION_FORWARD,
            MotorOp::Direction(Direction::Reverse) => REG_DIRECTION_REVERSE,
            MotorOp::Speed(_) => REG_SPEED,
            MotorOp::Stop => REG_STOP,
        }
    }

    fn value(self) -> u16 {
        match self {
            MotorOp::PulseCount(pulses) => pulses,
            MotorOp::Speed(speed) => speed,
            MotorOp::Direction(_) | MotorOp::Stop => RUN_FLAG,
        }
    }

    fn from_register(register: u16, value: u16) -> Result<Self> {
        match register {
            REG_PULSE_COUNT => Ok(MotorOp::PulseCount(value)),
            REG_SPEED => Ok(MotorOp::Speed(value)),
            REG_DIRECTION_FORWARD if value == RUN_FLAG => {
                Ok(MotorOp::Direction(Direction::Forward))
            },
            REG_DIRECTION_REVERSE if value == RUN_FLAG => {
                Ok(MotorOp::Direction(Direction::Reverse))
            },
            REG_STOP if value == RUN_FLAG => Ok(MotorOp::Stop),
            _ => Err(ProtocolError::Unsupported(format!(
                "register 0x{register:04X} value 0x{value:04X}"
            ))),
        }
    }
}

/// One addressed motor command. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorCommand {
    address: u8,
    op: MotorOp,
}

impl MotorCommand {
    pub fn new(address: u8, op: MotorOp) -> Self {
        Self { address, op }
    }

    pub fn pulse_count(address: u8, pulses: u16) -> Self {
        Self::new(address, MotorOp::PulseCount(pulses))
    }

    pub fn direction(address: u8, direction: Direction) -> Self {
        Self::new(address, MotorOp::Direction(direction))
    }

    pub fn speed(address: u8, speed: u16) -> Self {
        Self::new(address, MotorOp::Speed(speed))
    }

    pub fn stop(address: u8) -> Self {
        Self::new(address, MotorOp::Stop)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn op(&self) -> MotorOp {
        self.op
    }

    /// Encode to wire bytes, CRC included
    pub fn to_bytes(&self) -> Vec<u8> {
        let reg = self.op.register().to_be_bytes();
        let val = self.op.value().to_be_bytes();
        build_command(
            self.address,
            &[FC_WRITE_SINGLE_REGISTER, reg[0], reg[1]],
            &val,
        )
    }

    /// Encode as compact uppercase hex, e.g. `010600070000380B`
    pub fn to_hex(&self) -> String {
        self.to_bytes().iter().map(|b| format!("{b:02X}")).collect()
    }

    /// Parse a command frame (e.g. the drive's echo of a write request)
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() != COMMAND_FRAME_LEN {
            return Err(ProtocolError::FrameTooShort {
                expected: COMMAND_FRAME_LEN,
                actual: frame.len(),
            });
        }

        let body = &frame[..COMMAND_FRAME_LEN - 2];
        let received = u16::from_le_bytes([frame[6], frame[7]]);
        let expected = crc16(body);
        if received != expected {
            return Err(ProtocolError::CrcMismatch { expected, received });
        }

        if body[1] != FC_WRITE_SINGLE_REGISTER {
            return Err(ProtocolError::Unsupported(format!(
                "function code 0x{:02X}",
                body[1]
            )));
        }

        let register = u16::from_be_bytes([body[2], body[3]]);
        let value = u16::from_be_bytes([body[4], body[5]]);
        Ok(Self::new(body[0], MotorOp::from_register(register, value)?))
    }

    /// Parse hex text (spaces allowed)
    pub fn parse_hex(hex: &str) -> Result<Self> {
        Self::parse(&decode_hex(hex)?)
    }
}

/// Narrow a requested value to its 16-bit register
pub fn register_value(field: &str, value: u32) -> Result<u16> {
    u16::try_from(value).map_err(|_| {
        ProtocolError::OutOfRange(format!("{field} {value} exceeds 0x{:04X}", u16::MAX))
    })
}

/// Assemble `[address][opcode][payload][CRC16]`
pub fn build_command(address: u8, opcode: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + opcode.len() + payload.len() + 2);
    frame.push(address);
    frame.extend_from_slice(opcode);
    frame.extend_from_slice(payload);
    append_crc(&mut frame);
    frame
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_pulse_count_frame() {
        assert_eq!(MotorCommand::pulse_count(1, 0).to_hex(), "010600070000380B");
        assert_eq!(MotorCommand::pulse_count(2, 0).to_hex(), "0206000700003838");
        assert_eq!(MotorCommand::pulse_count(3, 800).to_hex(), "03060007032038C1");
    }

    #[test]
    fn test_direction_frames() {
        assert_eq!(
            MotorCommand::direction(2, Direction::Forward).to_hex(),
            "0206000000014839"
        );
        assert_eq!(
            MotorCommand::direction(2, Direction::Reverse).to_hex(),
            "02060001000119F9"
        );
    }

    #[test]
    fn test_speed_and_stop_frames() {
        assert_eq!(MotorCommand::speed(2, 50).to_hex(), "020600050032182D");
        assert_eq!(MotorCommand::speed(2, 499).to_hex(), "0206000501F3D82D");
        assert_eq!(MotorCommand::stop(2).to_hex(), "020600020001E9F9");
    }

    #[test]
    fn test_build_command_layout() {
        let frame = build_command(0x01, &[0x06, 0x00, 0x07], &[0x00, 0x00]);
        assert_eq!(frame, vec![0x01, 0x06, 0x00, 0x07, 0x00, 0x00, 0x38, 0x0B]);
    }

    #[test]
    fn test_parse_echo() {
        let cmd = MotorCommand::parse_hex("02 06 00 02 00 01 E9 F9").unwrap();
        assert_eq!(cmd, MotorCommand::stop(2));

        let cmd = MotorCommand::parse_hex("03060007032038C1").unwrap();
        assert_eq!(cmd.address(), 3);
        assert_eq!(cmd.op(), MotorOp::PulseCount(800));
    }

    #[test]
    fn test_parse_rejects_bad_crc() {
        let err = MotorCommand::parse_hex("020600020001E9F8").unwrap_err();
        assert!(matches!(err, ProtocolError::CrcMismatch { .. }));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let err = MotorCommand::parse_hex("02060002").unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooShort { .. }));
    }

    #[test]
    fn test_parse_rejects_unknown_register() {
        let frame = build_command(0x02, &[0x06, 0x00, 0x09], &[0x00, 0x01]);
        assert!(matches!(
            MotorCommand::parse(&frame),
            Err(ProtocolError::Unsupported(_))
        ));
    }

    #[test]
    fn test_register_value_bounds() {
        assert_eq!(register_value("pulses", 800).unwrap(), 800);
        assert_eq!(register_value("pulses", 65535).unwrap(), u16::MAX);
        assert_eq!(
            register_value("pulses", 65536),
            Err(ProtocolError::OutOfRange(
                "pulses 65536 exceeds 0xFFFF".to_string()
            ))
        );
    }

    #[test]
    fn test_direction_from_forward() {
        assert_eq!(Direction::from_forward(true), Direction::Forward);
        assert!(!Direction::from_forward(false).is_forward());
    }
}
