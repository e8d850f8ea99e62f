//! Test doubles for the [`DeviceController`] trait
//!
//! `MockDeviceController` is the usual mockall expectation-driven mock.
//! [`FakeController`] is a small scripted fake that behaves like a
//! well-mannered peripheral: tests play the host by queueing SETUP and
//! OUT packets and flagging IN completions, then look at the byte
//! stream the stack armed.

use crate::device_controller::{DeviceController, EpReset, IrqStatus};
use crate::source::ByteSource;
use crate::wire::EndpointDescriptor;
use mockall::mock;

mock! {
    pub DeviceControllerInner {
        pub fn attach(&mut self);
        pub fn detach(&mut self);
        pub fn set_address(&mut self, address: u8);
        pub fn address(&self) -> u8;
        pub fn bus_reset(&mut self);
        pub fn reset_endpoints(&mut self, which: EpReset);
        pub fn configure_endpoint(&mut self, descriptor: &EndpointDescriptor);
        pub fn stall(&mut self, ep: u8);
        pub fn irq_status(&mut self) -> IrqStatus;
        pub fn rx_available(&self, ep: u8) -> u16;
        pub fn rx_ready(&self, ep: u8) -> bool;
        pub fn tx_busy(&self, ep: u8) -> bool;
        pub fn read_fifo(&mut self, ep: u8, dst: &mut [u8]);
        pub fn rx_complete(&mut self, ep: u8, end_of_transfer: bool);
        pub fn write_fifo(&mut self, ep: u8, src: ByteSource, len: u16);
        pub fn arm_tx(&mut self, ep: u8, len: u16);
        pub fn flush_tx(&mut self, ep: u8);
        pub fn suspend(&mut self);
        pub fn resume(&mut self);
    }
}

pub struct MockDeviceController {
    pub inner: MockDeviceControllerInner,
}

impl Default for MockDeviceController {
    fn default() -> Self {
        Self {
            inner: MockDeviceControllerInner::new(),
        }
    }
}

impl DeviceController for MockDeviceController {
    fn attach(&mut self) {
        self.inner.attach();
    }

    fn detach(&mut self) {
        self.inner.detach();
    }

    fn set_address(&mut self, address: u8) {
        self.inner.set_address(address);
    }

    fn address(&self) -> u8 {
        self.inner.address()
    }

    fn bus_reset(&mut self) {
        self.inner.bus_reset();
    }

    fn reset_endpoints(&mut self, which: EpReset) {
        self.inner.reset_endpoints(which);
    }

    fn configure_endpoint(&mut self, descriptor: &EndpointDescriptor) {
        self.inner.configure_endpoint(descriptor);
    }

    fn stall(&mut self, ep: u8) {
        self.inner.stall(ep);
    }

    fn irq_status(&mut self) -> IrqStatus {
        self.inner.irq_status()
    }

    fn rx_available(&self, ep: u8) -> u16 {
        self.inner.rx_available(ep)
    }

    fn rx_ready(&self, ep: u8) -> bool {
        self.inner.rx_ready(ep)
    }

    fn tx_busy(&self, ep: u8) -> bool {
        self.inner.tx_busy(ep)
    }

    fn read_fifo(&mut self, ep: u8, dst: &mut [u8]) {
        self.inner.read_fifo(ep, dst);
    }

    fn rx_complete(&mut self, ep: u8, end_of_transfer: bool) {
        self.inner.rx_complete(ep, end_of_transfer);
    }

    fn write_fifo(&mut self, ep: u8, src: ByteSource, len: u16) {
        self.inner.write_fifo(ep, src, len);
    }

    fn arm_tx(&mut self, ep: u8, len: u16) {
        self.inner.arm_tx(ep, len);
    }

    fn flush_tx(&mut self, ep: u8) {
        self.inner.flush_tx(ep);
    }

    fn suspend(&mut self) {
        self.inner.suspend();
    }

    fn resume(&mut self) {
        self.inner.resume();
    }
}

const FAKE_ENDPOINTS: usize = 16;

/// A scripted peripheral: FIFOs are `Vec`s, interrupt causes are queued
/// by the test, and every packet the stack arms is kept for inspection.
///
/// `BUF` is the control-endpoint buffer size, so packetisation
/// behaviour can be tested with something smaller than 64.
pub struct FakeController<const BUF: u16 = 64> {
    /// Interrupt causes delivered (and cleared) by the next
    /// `irq_status()`.
    pub events: IrqStatus,
    /// Received-packet contents per endpoint, consumed by `read_fifo`
    /// and dropped at `rx_complete`.
    pub rx: [Vec<u8>; FAKE_ENDPOINTS],
    staged: [Vec<u8>; FAKE_ENDPOINTS],
    /// Every armed IN packet, in order, per endpoint.
    pub sent: [Vec<Vec<u8>>; FAKE_ENDPOINTS],
    pub address: u8,
    pub attached: bool,
    pub suspended: bool,
    pub stalled: [bool; FAKE_ENDPOINTS],
    pub configured_endpoints: Vec<EndpointDescriptor>,
    pub resets: Vec<EpReset>,
    pub bus_resets: usize,
    pub rx_completes: Vec<(u8, bool)>,
    pub flushed: Vec<u8>,
}

impl<const BUF: u16> Default for FakeController<BUF> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BUF: u16> FakeController<BUF> {
    pub fn new() -> Self {
        Self {
            events: IrqStatus::default(),
            rx: core::array::from_fn(|_| Vec::new()),
            staged: core::array::from_fn(|_| Vec::new()),
            sent: core::array::from_fn(|_| Vec::new()),
            address: 0,
            attached: false,
            suspended: false,
            stalled: [false; FAKE_ENDPOINTS],
            configured_endpoints: Vec::new(),
            resets: Vec::new(),
            bus_resets: 0,
            rx_completes: Vec::new(),
            flushed: Vec::new(),
        }
    }

    /// Host action: put a SETUP packet in the EP0 FIFO and raise its
    /// receive completion.
    pub fn give_setup(&mut self, bytes: &[u8]) {
        self.rx[0] = bytes.to_vec();
        self.events.rx_pending |= 1;
    }

    /// Host action: deliver an OUT data packet on `ep`.
    pub fn give_out(&mut self, ep: u8, data: &[u8]) {
        self.rx[ep as usize] = data.to_vec();
        self.events.rx_pending |= 1 << ep;
    }

    /// Host action: acknowledge the armed IN packet on `ep`.
    pub fn complete_in(&mut self, ep: u8) {
        self.events.tx_pending |= 1 << ep;
    }

    pub fn signal_reset(&mut self) {
        self.events.reset = true;
    }

    pub fn signal_sof(&mut self) {
        self.events.sof = true;
    }

    pub fn signal_suspend(&mut self) {
        self.events.suspend = true;
    }

    pub fn signal_resume(&mut self) {
        self.events.resume = true;
    }

    /// The concatenation of everything armed on `ep` so far.
    pub fn sent_bytes(&self, ep: u8) -> Vec<u8> {
        self.sent[ep as usize].concat()
    }
}

impl<const BUF: u16> DeviceController for FakeController<BUF> {
    const EP_BUFFER_SIZE: u16 = BUF;

    fn attach(&mut self) {
        self.attached = true;
    }

    fn detach(&mut self) {
        self.attached = false;
    }

    fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    fn address(&self) -> u8 {
        self.address
    }

    fn bus_reset(&mut self) {
        self.bus_resets += 1;
    }

    fn reset_endpoints(&mut self, which: EpReset) {
        self.resets.push(which);
        for (ep, stalled) in self.stalled.iter_mut().enumerate() {
            if which == EpReset::All || ep != 0 {
                *stalled = false;
            }
        }
    }

    fn configure_endpoint(&mut self, descriptor: &EndpointDescriptor) {
        self.configured_endpoints.push(*descriptor);
    }

    fn stall(&mut self, ep: u8) {
        self.stalled[ep as usize] = true;
    }

    fn irq_status(&mut self) -> IrqStatus {
        core::mem::take(&mut self.events)
    }

    fn rx_available(&self, ep: u8) -> u16 {
        self.rx[ep as usize].len() as u16
    }

    fn rx_ready(&self, ep: u8) -> bool {
        !self.rx[ep as usize].is_empty()
    }

    fn tx_busy(&self, _ep: u8) -> bool {
        false
    }

    fn read_fifo(&mut self, ep: u8, dst: &mut [u8]) {
        let fifo = &mut self.rx[ep as usize];
        let n = dst.len().min(fifo.len());
        dst[..n].copy_from_slice(&fifo[..n]);
        fifo.drain(..n);
    }

    fn rx_complete(&mut self, ep: u8, end_of_transfer: bool) {
        self.rx_completes.push((ep, end_of_transfer));
        // Acknowledging the packet discards whatever was not read.
        self.rx[ep as usize].clear();
    }

    fn write_fifo(&mut self, ep: u8, src: ByteSource, len: u16) {
        // SAFETY: on the test host all sources are plain memory with at
        // least `len` valid bytes.
        let bytes = unsafe { src.as_slice(len as usize) };
        self.staged[ep as usize].extend_from_slice(bytes);
    }

    fn arm_tx(&mut self, ep: u8, len: u16) {
        let packet = core::mem::take(&mut self.staged[ep as usize]);
        assert_eq!(packet.len(), len as usize);
        self.sent[ep as usize].push(packet);
    }

    fn flush_tx(&mut self, ep: u8) {
        self.flushed.push(ep);
        self.staged[ep as usize].clear();
    }

    fn suspend(&mut self) {
        self.suspended = true;
    }

    fn resume(&mut self) {
        self.suspended = false;
    }
}
