//! IO board status frame decoding
//!
//! The IO board reports its 32 digital inputs (X1..X32) in a frame such as
//!
//! ```text
//! 48 3A 01 41 | 15 04 00 00 00 00 00 00 | D5 45 44
//! header      | 8 nibble groups         | trailer
//! ```
//!
//! Group `g` (token `4 + g`) carries pins `4g+1 ..= 4g+4`. The board does not
//! use a linear bit layout: the second character encodes the first two pins of
//! the group and the first character the last two, through the fixed table
//! below.

use std::fmt;

use crate::error::{ProtocolError, Result};

/// Number of monitored digital inputs
pub const PIN_COUNT: usize = 32;

/// Number of nibble groups in a status frame
pub const GROUP_COUNT: usize = 8;

/// Token index of the first nibble group
pub const FIRST_GROUP_TOKEN: usize = 4;

/// Rendering of a snapshot that has never been received
pub const NOT_INITIALIZED: &str = "NOT_INITIALIZED";

/// Frame that asks the IO board to reset and start reporting
pub const SENSOR_RESET_COMMAND: &str = "48 3A 01 52 00 00 00 00 00 00 00 00 D5 45 44";

/// Semantic roles of the first pins (0-based index into `PinLevels`)
pub mod pins {
    pub const TURNTABLE_HOME: usize = 0;
    pub const BOWL_PRESENT: usize = 1;
    pub const BOWL_LOWER_LIMIT: usize = 2;
    pub const BOWL_UPPER_LIMIT: usize = 3;
}

/// Character -> (lower pin, upper pin) of the pair it encodes.
/// Only `1`, `4` and `5` report a high level.
const PAIR_TABLE: [(bool, bool); 16] = [
    (false, false), // 0
    (true, false),  // 1
    (false, false), // 2
    (false, false), // 3
    (false, true),  // 4
    (true, true),   // 5
    (false, false), // 6
    (false, false), // 7
    (false, false), // 8
    (false, false), // 9
    (false, false), // A
    (false, false), // B
    (false, false), // C
    (false, false), // D
    (false, false), // E
    (false, false), // F
];

/// Ordered pin levels, index 0 = X1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinLevels(Vec<bool>);

impl PinLevels {
    pub fn new(levels: Vec<bool>) -> Self {
        Self(levels)
    }

    /// Level of a pin; pins outside the frame read as low
    pub fn is_high(&self, pin: usize) -> bool {
        self.0.get(pin).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    /// Pins whose level differs from `previous`, as (pin, new level)
    pub fn changes_from(&self, previous: &PinLevels) -> Vec<(usize, bool)> {
        self.0
            .iter()
            .enumerate()
            .filter(|(i, level)| previous.is_high(*i) != **level)
            .map(|(i, level)| (i, *level))
            .collect()
    }
}

/// Comma-joined `1`/`0` rendering, e.g. `1,0,0,1,...`
impl fmt::Display for PinLevels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, level) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(if *level { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Decode a space-separated hex status frame into 32 pin levels.
///
/// Fails without a partial result if the frame is short or any group token is
/// not exactly two hex characters.
pub fn decode_status_frame(frame: &str) -> Result<PinLevels> {
    let tokens: Vec<&str> = frame.split_whitespace().collect();
    let needed = FIRST_GROUP_TOKEN + GROUP_COUNT;
    if tokens.len() < needed {
        return Err(ProtocolError::FrameTooShort {
            expected: needed,
            actual: tokens.len(),
        });
    }

    let mut levels = Vec::with_capacity(PIN_COUNT);
    for (group, token) in tokens[FIRST_GROUP_TOKEN..needed].iter().enumerate() {
        let malformed = || ProtocolError::MalformedNibble {
            group,
            token: (*token).to_string(),
        };

        let mut chars = token.chars();
        let (Some(first), Some(second), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(malformed());
        };
        let high_pair = first.to_digit(16).ok_or_else(malformed)?;
        let low_pair = second.to_digit(16).ok_or_else(malformed)?;

        let (a, b) = PAIR_TABLE[low_pair as usize];
        let (c, d) = PAIR_TABLE[high_pair as usize];
        levels.extend_from_slice(&[a, b, c, d]);
    }

    Ok(PinLevels(levels))
}
