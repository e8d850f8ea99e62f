//! Per-endpoint transfer status blocks
//!
//! Each endpoint direction has one status block describing the transfer
//! in progress: a cursor into the data, a countdown of bytes left, and
//! the arming/stall flags the control engine steers with. The blocks
//! are plain state; the movement of bytes lives in
//! [`UsbStack::read_ep`]/[`UsbStack::write_ep`].
//!
//! [`UsbStack::read_ep`]: crate::stack::UsbStack::read_ep
//! [`UsbStack::write_ep`]: crate::stack::UsbStack::write_ep

use crate::source::{ByteSource, MultiPartTable};

/// Transmit-side (IN) status for one endpoint.
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, Default)]
pub struct EpStatusIn {
    /// Cursor into the data being sent. `None` both before arming and
    /// for a multi-part transfer that has not sent its first byte yet
    /// (the engine starts it at the first part).
    pub(crate) source: Option<ByteSource>,
    /// Bytes remaining; zero means the transfer is complete.
    pub(crate) transfer_count: u16,
    /// Which part of `parts` the cursor is inside.
    pub(crate) part_number: u8,
    pub(crate) parts: Option<&'static MultiPartTable>,
    pub(crate) needs_arming: bool,
    pub(crate) stall: bool,
    pub(crate) is_multi_part: bool,
    /// The reply was cut short by the host's wLength.
    pub(crate) terminated: bool,
}

impl EpStatusIn {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Bytes still to be transmitted.
    pub fn transfer_count(&self) -> u16 {
        self.transfer_count
    }

    /// Whether the next IN token must be answered with data.
    pub fn needs_arming(&self) -> bool {
        self.needs_arming
    }

    pub fn is_stalled(&self) -> bool {
        self.stall
    }

    pub fn is_multi_part(&self) -> bool {
        self.is_multi_part
    }

    /// Whether the in-progress reply was truncated to the host's
    /// requested length. Of interest to peripherals that decide between
    /// a short packet and a zero-length terminator.
    pub fn transfer_terminated(&self) -> bool {
        self.terminated
    }
}

/// Receive-side (OUT) status for one endpoint.
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
pub struct EpStatusOut {
    /// Cursor into the destination buffer; null when nothing is armed.
    pub(crate) buffer: *mut u8,
    /// Bytes still expected; zero means the transfer is complete.
    pub(crate) transfer_count: u16,
    pub(crate) needs_arming: bool,
    pub(crate) stall: bool,
}

// SAFETY: the buffer cursor is only dereferenced inside the USB ISR,
// the stack's single execution context.
unsafe impl Send for EpStatusOut {}

impl Default for EpStatusOut {
    fn default() -> Self {
        Self {
            buffer: core::ptr::null_mut(),
            transfer_count: 0,
            needs_arming: false,
            stall: false,
        }
    }
}

impl EpStatusOut {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Bytes still expected from the host.
    pub fn transfer_count(&self) -> u16 {
        self.transfer_count
    }

    pub fn needs_arming(&self) -> bool {
        self.needs_arming
    }

    pub fn is_stalled(&self) -> bool {
        self.stall
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/endpoint.rs"]
mod tests;
