//! Domain-tagged byte sources and multi-part descriptor tables
//!
//! Descriptor data can live in SRAM or, on Harvard-architecture parts,
//! in program flash that plain pointer dereferences cannot reach. A
//! [`ByteSource`] is a cursor over either kind of memory; it advances
//! uniformly and the platform's [`DeviceController`] supplies the
//! domain-appropriate fetch when the bytes are actually moved.
//!
//! [`DeviceController`]: crate::device_controller::DeviceController

/// Which memory domain a [`ByteSource`] points into.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Memory {
    Sram,
    Flash,
}

/// A read cursor over descriptor or reply data.
///
/// The referenced bytes must stay valid and unmodified for as long as a
/// transfer using the source is armed; the stack only dereferences them
/// from inside the USB interrupt.
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ByteSource {
    addr: *const u8,
    memory: Memory,
}

// SAFETY: a ByteSource is only ever dereferenced inside the USB ISR,
// which is the stack's single execution context.
unsafe impl Send for ByteSource {}
// SAFETY: as above; shared references never read through the pointer.
unsafe impl Sync for ByteSource {}

impl ByteSource {
    /// A source over bytes in ordinary memory.
    pub const fn sram(data: &'static [u8]) -> Self {
        Self {
            addr: data.as_ptr(),
            memory: Memory::Sram,
        }
    }

    /// A source over bytes in program flash, to be fetched with the
    /// platform's program-memory read primitive.
    pub const fn flash(addr: *const u8) -> Self {
        Self {
            addr,
            memory: Memory::Flash,
        }
    }

    /// A source from a raw address.
    ///
    /// # Safety
    ///
    /// `addr` must point to at least as many readable bytes as will be
    /// transferred, and they must remain valid and unmodified while any
    /// transfer using this source is armed.
    pub const unsafe fn from_raw(addr: *const u8, memory: Memory) -> Self {
        Self { addr, memory }
    }

    pub fn addr(&self) -> *const u8 {
        self.addr
    }

    pub fn memory(&self) -> Memory {
        self.memory
    }

    /// View the next `len` bytes as a slice.
    ///
    /// For HAL implementations and test doubles on von Neumann targets,
    /// where flash is plain memory.
    ///
    /// # Safety
    ///
    /// The cursor must have at least `len` valid bytes left, directly
    /// addressable (which a flash source on a Harvard part is not).
    pub unsafe fn as_slice(&self, len: usize) -> &[u8] {
        core::slice::from_raw_parts(self.addr, len)
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.addr = self.addr.wrapping_add(n);
    }

    /// Byte distance from `origin`, which must be an earlier cursor
    /// over the same region.
    pub(crate) fn offset_from(&self, origin: &ByteSource) -> usize {
        (self.addr as usize) - (origin.addr as usize)
    }
}

/// One fragment of a multi-part descriptor.
///
/// Configuration descriptors are transmitted as the concatenation of
/// the configuration header, interface, endpoint and class descriptors;
/// keeping the fragments separate lets each be defined (and reused)
/// individually. Strings are stored the same way.
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
pub struct DescriptorPart {
    pub data: ByteSource,
    pub length: u8,
}

impl DescriptorPart {
    /// A part covering a whole static byte slice.
    pub const fn sram(data: &'static [u8]) -> Self {
        Self {
            data: ByteSource::sram(data),
            length: data.len() as u8,
        }
    }

    /// A part covering `length` bytes of program flash.
    pub const fn flash(addr: *const u8, length: u8) -> Self {
        Self {
            data: ByteSource::flash(addr),
            length,
        }
    }
}

/// An ordered table of descriptor fragments transmitted back-to-back.
///
/// The on-wire byte stream of a multi-part transmission is exactly the
/// concatenation of each part's bytes in order, however the transfer is
/// split into packets.
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
pub struct MultiPartTable {
    parts: &'static [DescriptorPart],
}

impl MultiPartTable {
    pub const fn new(parts: &'static [DescriptorPart]) -> Self {
        Self { parts }
    }

    pub fn part(&self, n: u8) -> &DescriptorPart {
        &self.parts[n as usize]
    }

    pub fn count(&self) -> u8 {
        self.parts.len() as u8
    }

    pub fn parts(&self) -> &'static [DescriptorPart] {
        self.parts
    }

    /// Total transmitted length: the sum of every part's length.
    pub fn total_length(&self) -> u16 {
        self.parts.iter().map(|p| p.length as u16).sum()
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/source.rs"]
mod tests;
