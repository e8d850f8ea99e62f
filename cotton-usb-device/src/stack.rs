//! The device stack proper
//!
//! [`UsbStack`] owns the controller, the enumeration state machine, the
//! per-endpoint transfer engine and the handler registry. It is sized
//! at build time by three const parameters, mirroring how much table
//! space the target firmware wants to pay for:
//!
//! - `CONFIGS` — number of configurations,
//! - `INTERFACES` — number of interfaces per configuration,
//! - `ENDPOINTS` — number of endpoints *including* endpoint zero.
//!
//! There is exactly one logical executor: the platform's USB interrupt,
//! which calls [`UsbStack::handle_irq`]. Nothing here blocks, and all
//! state transitions happen inside that call. Registration calls from
//! firmware must be serialised against the ISR, typically by doing them
//! before [`UsbStack::attach`] or inside a critical section.

use crate::debug;
use crate::descriptors::DescriptorSet;
use crate::device_controller::{DeviceController, EpReset};
use crate::endpoint::{EpStatusIn, EpStatusOut};
use crate::source::ByteSource;
use crate::types::{Answer, CtrlState, DeviceState, EndpointAddr};
use crate::wire::{Direction, SetupPacket};

/// A data-endpoint lifecycle or packet hook.
pub type EndpointCallback<DC, const C: usize, const I: usize, const N: usize> =
    fn(&mut UsbStack<DC, C, I, N>, u8);

/// A class control-request handler, tried in interface order for any
/// SETUP the standard-request handler leaves unhandled. Receives the
/// zero-based wire interface number it was registered for.
pub type ControlHandler<DC, const C: usize, const I: usize, const N: usize> =
    fn(&mut UsbStack<DC, C, I, N>, u8, SetupPacket) -> Answer;

/// An alternate-setting handler: `(interface, alt_setting) -> accepted`.
pub type AltModeHandler<DC, const C: usize, const I: usize, const N: usize> =
    fn(&mut UsbStack<DC, C, I, N>, u8, u8) -> bool;

/// A start-of-frame hook, called once per SOF (1ms at full speed).
pub type SofHandler = fn();

/// A deferred control-transfer callback (see
/// [`UsbStack::set_data_callback`] and
/// [`UsbStack::set_status_callback`]).
pub type CtrlCallback<DC, const C: usize, const I: usize, const N: usize> =
    fn(&mut UsbStack<DC, C, I, N>);

/// Data-endpoint handlers: all hooks optional, the empty handler is a
/// no-op so the lifecycle sweeps need no special cases.
pub struct Handler<DC, const C: usize, const I: usize, const N: usize> {
    /// Called when the endpoint's configuration becomes active.
    pub init: Option<EndpointCallback<DC, C, I, N>>,
    /// Called when the endpoint's configuration is torn down.
    pub deinit: Option<EndpointCallback<DC, C, I, N>>,
    /// Called for each completed packet on the endpoint.
    pub handle_packet: Option<EndpointCallback<DC, C, I, N>>,
}

impl<DC, const C: usize, const I: usize, const N: usize> Handler<DC, C, I, N> {
    pub const EMPTY: Self = Self {
        init: None,
        deinit: None,
        handle_packet: None,
    };

    pub fn is_empty(&self) -> bool {
        self.init.is_none() && self.deinit.is_none() && self.handle_packet.is_none()
    }
}

impl<DC, const C: usize, const I: usize, const N: usize> Clone for Handler<DC, C, I, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<DC, const C: usize, const I: usize, const N: usize> Copy for Handler<DC, C, I, N> {}

impl<DC, const C: usize, const I: usize, const N: usize> Default for Handler<DC, C, I, N> {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A USB device stack over one controller.
///
/// See the [module documentation](self) for the concurrency model and
/// the meaning of the const parameters.
pub struct UsbStack<DC, const CONFIGS: usize, const INTERFACES: usize, const ENDPOINTS: usize> {
    pub(crate) controller: DC,
    pub(crate) descriptors: DescriptorSet,
    pub(crate) state: DeviceState,
    pub(crate) ctrl_state: CtrlState,
    pub(crate) suspended: bool,
    /// The active configuration value; zero means unconfigured.
    pub(crate) active_config: u8,
    /// The SETUP packet being serviced.
    pub(crate) packet: SetupPacket,
    /// The endpoint and direction of the event being serviced.
    pub(crate) current: EndpointAddr,
    /// Scratch for the two-byte GET_STATUS reply.
    pub(crate) status_response: [u8; 2],
    pub(crate) ep_in: [EpStatusIn; ENDPOINTS],
    pub(crate) ep_out: [EpStatusOut; ENDPOINTS],
    // Handler tables. Data handlers are keyed (config-1, endpoint-1);
    // the last endpoint slot of each row is unused padding, since const
    // generics cannot express ENDPOINTS-1.
    in_handlers: [[Handler<DC, CONFIGS, INTERFACES, ENDPOINTS>; ENDPOINTS]; CONFIGS],
    out_handlers: [[Handler<DC, CONFIGS, INTERFACES, ENDPOINTS>; ENDPOINTS]; CONFIGS],
    pub(crate) control_handlers:
        [[Option<ControlHandler<DC, CONFIGS, INTERFACES, ENDPOINTS>>; INTERFACES]; CONFIGS],
    pub(crate) alt_mode_handlers:
        [[Option<AltModeHandler<DC, CONFIGS, INTERFACES, ENDPOINTS>>; INTERFACES]; CONFIGS],
    sof_handlers: [Option<SofHandler>; INTERFACES],
    /// Current alternate setting per (config-1, interface).
    pub(crate) alternate_modes: [[u8; INTERFACES]; CONFIGS],
    pub(crate) data_callback: Option<CtrlCallback<DC, CONFIGS, INTERFACES, ENDPOINTS>>,
    pub(crate) status_callback: Option<CtrlCallback<DC, CONFIGS, INTERFACES, ENDPOINTS>>,
}

impl<DC: DeviceController, const CONFIGS: usize, const INTERFACES: usize, const ENDPOINTS: usize>
    UsbStack<DC, CONFIGS, INTERFACES, ENDPOINTS>
{
    /// Create a stack over `controller`, in the detached state.
    ///
    /// The descriptor tables' configuration count should match
    /// `CONFIGS`; extra configurations are unreachable and missing ones
    /// make SET_CONFIGURATION stall.
    pub fn new(controller: DC, descriptors: DescriptorSet) -> Self {
        Self {
            controller,
            descriptors,
            state: DeviceState::Detached,
            ctrl_state: CtrlState::Idle,
            suspended: false,
            active_config: 0,
            packet: SetupPacket::default(),
            current: EndpointAddr::default(),
            status_response: [0; 2],
            ep_in: [EpStatusIn::default(); ENDPOINTS],
            ep_out: [EpStatusOut::default(); ENDPOINTS],
            in_handlers: [[Handler::EMPTY; ENDPOINTS]; CONFIGS],
            out_handlers: [[Handler::EMPTY; ENDPOINTS]; CONFIGS],
            control_handlers: [[None; INTERFACES]; CONFIGS],
            alt_mode_handlers: [[None; INTERFACES]; CONFIGS],
            sof_handlers: [None; INTERFACES],
            alternate_modes: [[0; INTERFACES]; CONFIGS],
            data_callback: None,
            status_callback: None,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn active_config(&self) -> u8 {
        self.active_config
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn controller(&self) -> &DC {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut DC {
        &mut self.controller
    }

    pub fn ep_in_status(&self, ep: u8) -> &EpStatusIn {
        &self.ep_in[ep as usize]
    }

    pub fn ep_out_status(&self, ep: u8) -> &EpStatusOut {
        &self.ep_out[ep as usize]
    }

    /// Whether a received packet is waiting on the endpoint.
    pub fn rx_ready(&self, ep: u8) -> bool {
        self.controller.rx_ready(ep)
    }

    /// Whether the endpoint still has an armed transmission in flight.
    pub fn tx_busy(&self, ep: u8) -> bool {
        self.controller.tx_busy(ep)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Assert the D+ pull-up and start answering the bus.
    ///
    /// Register handlers before calling this (or with the USB interrupt
    /// masked): the tables are otherwise only touched from the ISR.
    pub fn attach(&mut self) {
        self.active_config = 0;
        self.controller.set_address(0);
        self.controller.attach();
        self.state = DeviceState::Attached;
    }

    /// Drop off the bus and tear down the active configuration.
    pub fn detach(&mut self) {
        self.controller.detach();
        self.deinit_handlers();
        self.active_config = 0;
        self.state = DeviceState::Detached;
    }

    fn reset(&mut self) {
        debug::println!("usb: bus reset");
        self.reset_eps(EpReset::All);
        self.controller.bus_reset();
        self.controller.set_address(0);
        self.ctrl_state = CtrlState::Idle;
        self.state = DeviceState::Attached;
    }

    pub(crate) fn reset_eps(&mut self, which: EpReset) {
        for ep in 0..ENDPOINTS {
            if which == EpReset::User && ep == 0 {
                continue;
            }
            self.ep_in[ep].reset();
            self.ep_out[ep].reset();
        }
        self.controller.reset_endpoints(which);
    }

    fn bus_wakeup(&mut self) {
        self.suspended = false;
        self.controller.resume();
    }

    fn bus_suspend(&mut self) {
        debug::println!("usb: suspend");
        self.suspended = true;
        self.controller.suspend();
    }

    // ------------------------------------------------------------------
    // Interrupt entrypoint
    // ------------------------------------------------------------------

    /// Service the USB peripheral. Call from the platform's USB ISR.
    ///
    /// ```no_run
    /// use core::cell::RefCell;
    /// use cotton_usb_device::mocks::FakeController;
    /// use cotton_usb_device::UsbStack;
    /// use critical_section::Mutex;
    ///
    /// static STACK: Mutex<RefCell<Option<UsbStack<FakeController, 1, 1, 2>>>> =
    ///     Mutex::new(RefCell::new(None));
    ///
    /// fn usb_interrupt() {
    ///     critical_section::with(|cs| {
    ///         if let Some(stack) = STACK.borrow_ref_mut(cs).as_mut() {
    ///             stack.handle_irq();
    ///         }
    ///     });
    /// }
    /// ```
    pub fn handle_irq(&mut self) {
        let status = self.controller.irq_status();

        if self.state == DeviceState::Attached {
            self.state = DeviceState::Powered;
        }

        if status.resume {
            self.bus_wakeup();
        } else if self.suspended {
            // Nothing below matters until the bus wakes us again; on
            // parts where suspend does not inhibit further interrupts
            // this is what keeps us quiescent.
            return;
        }

        if status.reset {
            self.reset();
            self.state = DeviceState::Waiting;
            return;
        }

        if status.suspend {
            self.bus_suspend();
        }

        if matches!(
            self.state,
            DeviceState::Detached | DeviceState::Attached | DeviceState::Powered
        ) {
            // Not yet reset by the host; irq_status() has already
            // acknowledged whatever stray endpoint completions there were.
            return;
        }

        if status.sof {
            for interface in 0..INTERFACES {
                if let Some(handler) = self.sof_handlers[interface] {
                    handler();
                }
            }
        }

        for ep in 0..ENDPOINTS as u8 {
            if status.tx_pending & (1 << ep) != 0 {
                self.current = EndpointAddr::new(ep, Direction::In);
                self.dispatch_endpoint(ep, Direction::In);
            }
            if status.rx_pending & (1 << ep) != 0 {
                self.current = EndpointAddr::new(ep, Direction::Out);
                self.dispatch_endpoint(ep, Direction::Out);
            }
        }
    }

    fn dispatch_endpoint(&mut self, ep: u8, direction: Direction) {
        if ep == 0 {
            self.handle_control_packet();
        } else {
            let handler = self.handler_for(EndpointAddr::new(ep, direction), self.active_config);
            if let Some(handle_packet) = handler.handle_packet {
                handle_packet(self, ep);
            }
        }
    }

    // ------------------------------------------------------------------
    // Handler registry
    // ------------------------------------------------------------------

    /// Register data-endpoint hooks for `ep` under configuration
    /// `config` (1-based). Out-of-range indices are ignored: callers
    /// are compile-time-known firmware, not untrusted input.
    pub fn register_handler(
        &mut self,
        ep: EndpointAddr,
        config: u8,
        handler: Handler<DC, CONFIGS, INTERFACES, ENDPOINTS>,
    ) {
        let number = ep.number() as usize;
        let config = config as usize;
        if number == 0 || number >= ENDPOINTS || config == 0 || config > CONFIGS {
            return;
        }
        match ep.direction() {
            Direction::In => self.in_handlers[config - 1][number - 1] = handler,
            Direction::Out => self.out_handlers[config - 1][number - 1] = handler,
        }
    }

    /// Clear the data-endpoint hooks for `ep` under `config`.
    pub fn unregister_handler(&mut self, ep: EndpointAddr, config: u8) {
        self.register_handler(ep, config, Handler::EMPTY);
    }

    /// The hooks registered for `ep` under `config`, or the empty
    /// handler for anything out of range (endpoint zero included: its
    /// traffic goes through the control engine, not this table).
    pub fn handler_for(
        &self,
        ep: EndpointAddr,
        config: u8,
    ) -> Handler<DC, CONFIGS, INTERFACES, ENDPOINTS> {
        let number = ep.number() as usize;
        let config = config as usize;
        if number == 0 || number >= ENDPOINTS || config == 0 || config > CONFIGS {
            return Handler::EMPTY;
        }
        match ep.direction() {
            Direction::In => self.in_handlers[config - 1][number - 1],
            Direction::Out => self.out_handlers[config - 1][number - 1],
        }
    }

    /// Register a class control-request handler on interface slot
    /// `interface` (1-based) under `config` (1-based). The handler is
    /// called with the zero-based wire interface number, `interface - 1`.
    pub fn register_control_handler(
        &mut self,
        interface: u8,
        config: u8,
        handler: ControlHandler<DC, CONFIGS, INTERFACES, ENDPOINTS>,
    ) {
        let interface = interface as usize;
        let config = config as usize;
        if interface == 0 || interface > INTERFACES || config == 0 || config > CONFIGS {
            return;
        }
        self.control_handlers[config - 1][interface - 1] = Some(handler);
    }

    pub fn unregister_control_handler(&mut self, interface: u8, config: u8) {
        let interface = interface as usize;
        let config = config as usize;
        if interface == 0 || interface > INTERFACES || config == 0 || config > CONFIGS {
            return;
        }
        self.control_handlers[config - 1][interface - 1] = None;
    }

    /// Register an alternate-setting handler on interface slot
    /// `interface` (1-based) under `config`; consulted by
    /// SET_INTERFACE before the new setting is accepted.
    pub fn register_alt_mode_handler(
        &mut self,
        interface: u8,
        config: u8,
        handler: AltModeHandler<DC, CONFIGS, INTERFACES, ENDPOINTS>,
    ) {
        let interface = interface as usize;
        let config = config as usize;
        if interface == 0 || interface > INTERFACES || config == 0 || config > CONFIGS {
            return;
        }
        self.alt_mode_handlers[config - 1][interface - 1] = Some(handler);
    }

    pub fn unregister_alt_mode_handler(&mut self, interface: u8, config: u8) {
        let interface = interface as usize;
        let config = config as usize;
        if interface == 0 || interface > INTERFACES || config == 0 || config > CONFIGS {
            return;
        }
        self.alt_mode_handlers[config - 1][interface - 1] = None;
    }

    /// Register a start-of-frame hook for `interface` (zero-based wire
    /// number; SOF hooks are not per-configuration).
    pub fn register_sof_handler(&mut self, interface: u8, handler: SofHandler) {
        if (interface as usize) < INTERFACES {
            self.sof_handlers[interface as usize] = Some(handler);
        }
    }

    pub fn unregister_sof_handler(&mut self, interface: u8) {
        if (interface as usize) < INTERFACES {
            self.sof_handlers[interface as usize] = None;
        }
    }

    /// Run the `init` hook of every handler in the active
    /// configuration. No-op while unconfigured.
    pub fn init_handlers(&mut self) {
        if self.active_config == 0 {
            return;
        }
        let config = (self.active_config - 1) as usize;
        for slot in 0..ENDPOINTS - 1 {
            // slot + 1 is the endpoint the handler is registered on
            if let Some(init) = self.in_handlers[config][slot].init {
                init(self, (slot + 1) as u8);
            }
            if let Some(init) = self.out_handlers[config][slot].init {
                init(self, (slot + 1) as u8);
            }
        }
    }

    /// Run the `deinit` hook of every handler in the active
    /// configuration. No-op while unconfigured.
    pub fn deinit_handlers(&mut self) {
        if self.active_config == 0 {
            return;
        }
        let config = (self.active_config - 1) as usize;
        for slot in 0..ENDPOINTS - 1 {
            if let Some(deinit) = self.in_handlers[config][slot].deinit {
                deinit(self, (slot + 1) as u8);
            }
            if let Some(deinit) = self.out_handlers[config][slot].deinit {
                deinit(self, (slot + 1) as u8);
            }
        }
    }

    // ------------------------------------------------------------------
    // Endpoint transfer engine
    // ------------------------------------------------------------------

    /// Arm endpoint `ep` to transmit `length` bytes from `src` on the
    /// host's next IN tokens.
    pub fn arm_in(&mut self, ep: u8, src: ByteSource, length: u16) {
        let status = &mut self.ep_in[ep as usize];
        status.source = Some(src);
        status.transfer_count = length;
        status.part_number = 0;
        status.parts = None;
        status.needs_arming = true;
        status.stall = false;
        status.is_multi_part = false;
        status.terminated = false;
    }

    /// Arm endpoint `ep` to receive `length` bytes into `buffer`.
    ///
    /// # Safety
    ///
    /// `buffer` must stay valid and writable for `length` bytes until
    /// the transfer completes or the endpoint is reset, and nothing
    /// else may touch those bytes meanwhile.
    pub unsafe fn arm_out(&mut self, ep: u8, buffer: *mut u8, length: u16) {
        let status = &mut self.ep_out[ep as usize];
        status.buffer = buffer;
        status.transfer_count = length;
        status.needs_arming = true;
        status.stall = false;
    }

    /// Drain a received packet into the armed OUT buffer.
    ///
    /// Moves `min(rx_available, transfer_count)` bytes — never more
    /// than the transfer asked for, however much the FIFO holds — and
    /// acknowledges the packet to hardware. Returns true once the whole
    /// transfer has arrived.
    pub fn read_ep(&mut self, ep: u8) -> bool {
        let available = self.controller.rx_available(ep);
        let status = &mut self.ep_out[ep as usize];
        let count = available.min(status.transfer_count);
        if count > 0 && !status.buffer.is_null() {
            // SAFETY: the armed buffer has at least transfer_count
            // writable bytes left, and count never exceeds that.
            let dst = unsafe { core::slice::from_raw_parts_mut(status.buffer, count as usize) };
            self.controller.read_fifo(ep, dst);
            status.buffer = status.buffer.wrapping_add(count as usize);
        }
        status.transfer_count -= count;
        let complete = status.transfer_count == 0;
        let end = complete && !(ep == 0 && self.ctrl_state == CtrlState::StatusRx);
        self.controller.rx_complete(ep, end);
        complete
    }

    /// Stage and arm the next packet of the endpoint's IN transfer.
    ///
    /// Sends `min(transfer_count, EP_BUFFER_SIZE)` bytes — a zero-length
    /// packet if the transfer has nothing (left) to say — streaming
    /// from the single source or walking the multi-part table. Returns
    /// true once the whole transfer has been handed to hardware.
    pub fn write_ep(&mut self, ep: u8) -> bool {
        let status = &mut self.ep_in[ep as usize];
        let send = status.transfer_count.min(DC::EP_BUFFER_SIZE);
        status.transfer_count -= send;

        if !status.is_multi_part {
            if let Some(src) = status.source.as_mut() {
                if send > 0 {
                    self.controller.write_fifo(ep, *src, send);
                    src.advance(send as usize);
                }
            }
        } else if let Some(parts) = status.parts {
            let mut cursor = status.source.unwrap_or_else(|| parts.part(0).data);
            let mut remaining = send;
            while remaining > 0 {
                let part = *parts.part(status.part_number);
                let offset = cursor.offset_from(&part.data) as u16;
                let amount = (part.length as u16 - offset).min(remaining);
                if amount > 0 {
                    self.controller.write_fifo(ep, cursor, amount);
                    cursor.advance(amount as usize);
                    remaining -= amount;
                }
                // Step into the next part once this one is exhausted
                if cursor.offset_from(&part.data) == part.length as usize
                    && status.part_number + 1 < parts.count()
                {
                    status.part_number += 1;
                    cursor = parts.part(status.part_number).data;
                }
            }
            status.source = Some(cursor);
            if status.transfer_count == 0 {
                status.is_multi_part = false;
            }
        }

        self.controller.arm_tx(ep, send);
        status.transfer_count == 0
    }

    /// Install a one-shot hook run when the control transfer's OUT data
    /// phase completes, before the status stage is armed. Cleared by
    /// the next SETUP.
    pub fn set_data_callback(&mut self, callback: CtrlCallback<DC, CONFIGS, INTERFACES, ENDPOINTS>) {
        self.data_callback = Some(callback);
    }

    /// Install a one-shot hook run once the zero-length status IN of
    /// the current control transfer has been acknowledged by the host.
    /// Cleared by the next SETUP.
    pub fn set_status_callback(
        &mut self,
        callback: CtrlCallback<DC, CONFIGS, INTERFACES, ENDPOINTS>,
    ) {
        self.status_callback = Some(callback);
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/stack.rs"]
mod tests;
