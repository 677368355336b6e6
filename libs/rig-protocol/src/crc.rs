//! CRC16 (Modbus RTU)
//!
//! Polynomial 0xA001 (reflected 0x8005), initial value 0xFFFF. On the wire the
//! checksum is appended low byte first.

use std::fmt::Write;

/// Calculate CRC16 checksum (Modbus RTU standard)
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;

    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

/// Checksum rendered the way it travels: 4 uppercase hex chars, low byte first
pub fn crc16_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(4);
    for byte in crc16(data).to_le_bytes() {
        let _ = write!(&mut out, "{:02X}", byte);
    }
    out
}

/// Append the checksum to a frame in wire order
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}
