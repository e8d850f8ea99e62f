//! Core state types shared across the stack

use crate::source::{ByteSource, MultiPartTable};
use crate::wire::Direction;

/// Where the device is in its enumeration lifecycle (USB 2.0 s9.1).
///
/// Only the stack itself moves the device between states: bus events
/// (reset, suspend) and the standard SET_ADDRESS / SET_CONFIGURATION
/// requests.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum DeviceState {
    Detached,
    Attached,
    Powered,
    Waiting,
    Addressing,
    Addressed,
    Configured,
}

/// Which phase of a control transfer endpoint zero is in.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum CtrlState {
    Idle,
    Wait,
    DataTx,
    DataRx,
    StatusTx,
    StatusRx,
}

/// A packed endpoint address: number in the low nibble, direction in
/// bit 7, exactly as in bEndpointAddress on the wire.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct EndpointAddr(u8);

impl EndpointAddr {
    pub const fn new(number: u8, direction: Direction) -> Self {
        let dir = match direction {
            Direction::In => 0x80,
            Direction::Out => 0,
        };
        Self(dir | (number & 0x0F))
    }

    pub fn number(&self) -> u8 {
        self.0 & 0x0F
    }

    pub fn direction(&self) -> Direction {
        if (self.0 & 0x80) != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn set_number(&mut self, number: u8) {
        self.0 = (self.0 & 0xF0) | (number & 0x0F);
    }

    pub fn set_direction(&mut self, direction: Direction) {
        let dir = match direction {
            Direction::In => 0x80,
            Direction::Out => 0,
        };
        self.0 = (self.0 & 0x7F) | dir;
    }
}

/// What a request handler wants sent back to the host.
///
/// `Unhandled` lets the next handler have a look; if nobody claims the
/// request the stack stalls endpoint zero, which is also what `Stall`
/// does directly.
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
pub enum Answer {
    /// Reply with `length` bytes read from `src` (clamped to the
    /// host's wLength).
    Data { src: ByteSource, length: u16 },
    /// Reply with the concatenation of a multi-part table.
    Parts(&'static MultiPartTable),
    /// Acknowledge with an empty data packet.
    ZeroLength,
    /// Not this handler's request.
    Unhandled,
    /// Actively refuse the request.
    Stall,
}

impl Answer {
    pub fn is_unhandled(&self) -> bool {
        matches!(self, Answer::Unhandled)
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/types.rs"]
mod tests;
