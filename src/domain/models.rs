use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of controller slots, shared with the rest of the input system.
pub const MAX_PADS: usize = 4;

/// A 6-byte Bluetooth device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// The address bytes in reverse order, which is the PIN material the
    /// supported pads expect during press-to-sync pairing.
    pub fn reversed(&self) -> [u8; 6] {
        let mut out = self.0;
        out.reverse();
        out
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Hat switch direction bits as stored per slot.
pub mod hat {
    pub const UP: u8 = 0x01;
    pub const DOWN: u8 = 0x02;
    pub const LEFT: u8 = 0x04;
    pub const RIGHT: u8 = 0x08;
}

/// One decoded input frame for a pad slot: a button bitmask, four signed
/// axis values and hat direction bits. This is the unit the generic joypad
/// layer reads back out of the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PadSample {
    pub buttons: u32,
    pub axes: [i16; 4],
    pub hat: u8,
}

/// Rumble motor selector. The supported pads drive a single motor, so both
/// variants map onto it; the distinction is kept for drivers that have two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RumbleEffect {
    Strong,
    Weak,
}
