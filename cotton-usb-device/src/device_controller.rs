//! The hardware abstraction the stack drives
//!
//! One implementation of [`DeviceController`] exists per USB peripheral
//! (STM32 USBFS, nRF USBD, AVR XMEGA, DWC2, ...), out of tree. The
//! trait captures the endpoint hardware operations the portable engine
//! needs and nothing about register layouts.
//!
//! Every operation is infallible: at this layer hardware either works
//! or the bus-level protocol (stalls, timeouts at the host) takes over.

use crate::source::ByteSource;
use crate::wire::EndpointDescriptor;

/// Which endpoints a reset sweep covers.
///
/// A bus reset tears down everything; SET_CONFIGURATION only resets the
/// user endpoints and leaves the control endpoint alone.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum EpReset {
    All,
    User,
}

/// A read-and-clear snapshot of the peripheral's interrupt state.
///
/// Taking the snapshot acknowledges everything it reports, including
/// endpoint completions on endpoints the stack then ignores (which is
/// how stray completions get cleared while the device is still in the
/// powered-but-unreset states).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, Default)]
pub struct IrqStatus {
    /// Bus reset seen.
    pub reset: bool,
    /// Bus idle for 3ms, host wants us asleep.
    pub suspend: bool,
    /// Resume signalling seen (and the wakeup interrupt is enabled).
    pub resume: bool,
    /// Start-of-frame marker (1ms at full speed).
    pub sof: bool,
    /// Per-endpoint OUT-completion bits: bit n set means endpoint n has
    /// received a packet (for endpoint zero this includes SETUP).
    pub rx_pending: u16,
    /// Per-endpoint IN-completion bits: bit n set means endpoint n has
    /// finished transmitting its armed packet.
    pub tx_pending: u16,
}

/// Abstract endpoint hardware operations.
///
/// Data-phase handshake packets (the zero-length status stages the
/// hardware completes by itself on most peripherals) must not be
/// reported as `rx_pending` events on endpoint zero; the engine treats
/// an OUT completion in its idle state as a fresh SETUP.
pub trait DeviceController {
    /// Packet buffer size of the control endpoint, and the granularity
    /// multi-packet control transfers are split at.
    const EP_BUFFER_SIZE: u16 = 64;

    /// Connect the D+ pull-up and enable bus-event interrupts.
    fn attach(&mut self);

    /// Disconnect the pull-up and quiesce the peripheral.
    fn detach(&mut self);

    /// Latch the device address into the address register.
    fn set_address(&mut self, address: u8);

    /// Read back the device address register.
    fn address(&self) -> u8;

    /// Bus reset housekeeping: reinitialise endpoint zero as the
    /// default control endpoint and enable transfer interrupts.
    fn bus_reset(&mut self);

    /// Return endpoints to their unconfigured state. `EpReset::User`
    /// spares endpoint zero.
    fn reset_endpoints(&mut self, which: EpReset);

    /// Program a non-control endpoint's type and packet buffer from its
    /// descriptor, during SET_CONFIGURATION.
    fn configure_endpoint(&mut self, descriptor: &EndpointDescriptor);

    /// Assert protocol STALL on an endpoint. Hardware clears the stall
    /// condition on endpoint zero when the next SETUP arrives.
    fn stall(&mut self, ep: u8);

    /// Snapshot and acknowledge the pending interrupt causes.
    fn irq_status(&mut self) -> IrqStatus;

    /// Bytes waiting in the endpoint's receive buffer.
    fn rx_available(&self, ep: u8) -> u16;

    /// Whether a received packet is waiting to be read.
    fn rx_ready(&self, ep: u8) -> bool;

    /// Whether a previously armed transmission is still in flight.
    fn tx_busy(&self, ep: u8) -> bool;

    /// Move bytes out of the endpoint's receive buffer.
    fn read_fifo(&mut self, ep: u8, dst: &mut [u8]);

    /// Acknowledge the received packet and re-open the endpoint for the
    /// host's next OUT. `end_of_transfer` is set when this packet
    /// completed the expected data (some peripherals want a data-end
    /// indication on the control endpoint at that point).
    fn rx_complete(&mut self, ep: u8, end_of_transfer: bool);

    /// Append `len` bytes from `src` to the packet being staged for
    /// transmission.
    ///
    /// The fetch must honour `src`'s memory domain. A transmit engine
    /// whose FIFO is addressed in 16- or 32-bit words must buffer stray
    /// bytes across calls, so that successive sources concatenate
    /// byte-exactly on the wire.
    fn write_fifo(&mut self, ep: u8, src: ByteSource, len: u16);

    /// Hand the staged packet of `len` bytes (possibly zero) to the
    /// hardware for the host's next IN.
    fn arm_tx(&mut self, ep: u8, len: u16);

    /// Cancel an armed transmission.
    fn flush_tx(&mut self, ep: u8);

    /// Drop into bus suspend / low-power state.
    fn suspend(&mut self);

    /// Leave bus suspend.
    fn resume(&mut self);

    /// Copy bytes from a descriptor source into RAM.
    ///
    /// The default suits von Neumann parts where flash is directly
    /// addressable; Harvard parts must override it to use their
    /// program-memory read instruction for `Memory::Flash` sources.
    fn read_source(&self, src: ByteSource, dst: &mut [u8]) {
        // SAFETY: sources are armed with at least as many valid bytes
        // as any reader consumes, per ByteSource's contract.
        unsafe {
            core::ptr::copy_nonoverlapping(src.addr(), dst.as_mut_ptr(), dst.len());
        }
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/device_controller.rs"]
mod tests;
