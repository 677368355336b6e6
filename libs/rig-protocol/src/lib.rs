//! Rig wire protocol
//!
//! Pure, I/O-free building blocks for talking to the devices on the rig:
//! - hex rendering and frame classification of raw TCP chunks
//! - CRC16 (Modbus RTU polynomial)
//! - Modbus-style stepper motor commands sent through the LAN/485 bridge
//! - decoding of the IO board's packed status frame into pin levels
//!
//! # Architecture
//!
//! ```text
//! rig-protocol
//!     ├── frame   (to_hex / classify / decode_hex)
//!     ├── crc     (crc16, append_crc)
//!     ├── command (MotorCommand, MotorOp, Direction)
//!     └── sensor  (decode_status_frame, PinLevels, pin map)
//! ```
//!
//! The gateway service (`rigsrv`) owns sockets, state and timing; nothing in
//! this crate blocks or allocates beyond the returned values.

pub mod command;
pub mod crc;
pub mod error;
pub mod frame;
pub mod sensor;

pub use command::{register_value, Direction, MotorCommand, MotorOp};
pub use crc::{append_crc, crc16, crc16_hex};
pub use error::{ProtocolError, Result};
pub use frame::{classify, decode_hex, to_hex, FrameKind};
pub use sensor::{decode_status_frame, pins, PinLevels, NOT_INITIALIZED, SENSOR_RESET_COMMAND};
