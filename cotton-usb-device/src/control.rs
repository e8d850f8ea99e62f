//! The endpoint-zero control protocol engine
//!
//! SETUP parsing, the standard chapter-9 request handler, delegation to
//! class control handlers, and the data/status phase sequencing.

use crate::debug;
use crate::device_controller::{DeviceController, EpReset};
use crate::source::{ByteSource, Memory};
use crate::stack::UsbStack;
use crate::types::{Answer, CtrlState, DeviceState};
use crate::wire::{
    DescriptorType, Direction, Recipient, RequestKind, SetupPacket, StandardRequest,
};

impl<DC: DeviceController, const CONFIGS: usize, const INTERFACES: usize, const ENDPOINTS: usize>
    UsbStack<DC, CONFIGS, INTERFACES, ENDPOINTS>
{
    /// Service a completed packet on endpoint zero.
    ///
    /// An OUT completion with the engine idle is a fresh SETUP; other
    /// OUT completions belong to a data or status phase in progress,
    /// and IN completions advance the transmit side.
    pub(crate) fn handle_control_packet(&mut self) {
        if self.current.direction() == Direction::Out {
            if self.ctrl_state == CtrlState::Idle {
                self.handle_setup_packet();
            } else {
                self.handle_out_packet();
            }
        } else {
            self.handle_in_packet();
        }
    }

    fn handle_setup_packet(&mut self) {
        // Pull the eight SETUP bytes through the ordinary receive path.
        let mut bytes = [0u8; 8];
        {
            let status = &mut self.ep_out[0];
            status.buffer = bytes.as_mut_ptr();
            status.transfer_count = bytes.len() as u16;
        }
        if !self.read_ep(0) {
            // Truncated SETUP: nothing sensible to do but refuse it.
            self.ep_out[0].reset();
            self.controller.stall(0);
            return;
        }
        self.ep_out[0].buffer = core::ptr::null_mut();
        self.packet = SetupPacket::parse(&bytes);

        // A fresh transfer: forget any leftover reply state, including
        // a multi-part transmission the host walked away from.
        self.ctrl_state = CtrlState::Wait;
        self.ep_in[0].reset();
        let out0 = &mut self.ep_out[0];
        out0.needs_arming = false;
        out0.stall = false;
        out0.transfer_count = 0;
        self.data_callback = None;
        self.status_callback = None;

        // Standard requests are ours; class and vendor requests belong
        // to whoever registered for them. (The code points overlap, so
        // a class request must never fall into the standard table.)
        let mut answer = if self.packet.request_kind() == RequestKind::Standard {
            self.handle_standard_request()
        } else {
            Answer::Unhandled
        };

        if answer.is_unhandled() && self.active_config != 0 {
            let config = (self.active_config - 1) as usize;
            for interface in 0..INTERFACES {
                if let Some(handler) = self.control_handlers[config][interface] {
                    let packet = self.packet;
                    let candidate = handler(self, interface as u8, packet);
                    if !candidate.is_unhandled() {
                        answer = candidate;
                        break;
                    }
                }
            }
        }

        let (arm, stall, source, parts, length) = match answer {
            Answer::Data { src, length } => (true, false, Some(src), None, length),
            Answer::Parts(table) => (true, false, None, Some(table), table.total_length()),
            Answer::ZeroLength => (true, false, None, None, 0),
            Answer::Unhandled | Answer::Stall => {
                debug::println!(
                    "usb: request {}/{} refused",
                    self.packet.bmRequestType,
                    self.packet.bRequest
                );
                (false, true, None, None, 0)
            }
        };

        let status = &mut self.ep_in[0];
        status.needs_arming = arm;
        status.stall = stall;
        status.source = source;
        if let Some(table) = parts {
            status.is_multi_part = true;
            status.part_number = 0;
            status.parts = Some(table);
        }
        status.transfer_count = length.min(self.packet.wLength);
        status.terminated = length > self.packet.wLength;

        self.complete_setup_packet();
    }

    fn complete_setup_packet(&mut self) {
        if self.ep_out[0].needs_arming {
            // The handler wants a data phase from the host first; any
            // recorded status reply waits until that data is in.
            // <SETUP[0]><OUT[1]><OUT[0]>...<IN[1]>
            self.ctrl_state = CtrlState::DataRx;
        } else if !self.ep_in[0].needs_arming {
            if self.ep_in[0].stall {
                // <SETUP[0]><STALL>
                self.controller.stall(0);
                self.ctrl_state = CtrlState::Idle;
            }
        } else {
            if self.packet.direction() == Direction::In {
                // <SETUP[0]><IN[1]><IN[0]>...<OUT[1]>
                self.ctrl_state = CtrlState::DataTx;
            } else {
                // Just a quick acknowledgement: <SETUP[0]><IN[1]>
                self.ctrl_state = CtrlState::StatusTx;
            }
            if self.write_ep(0) {
                self.ctrl_state = if self.ctrl_state == CtrlState::DataTx {
                    CtrlState::StatusRx
                } else {
                    CtrlState::Idle
                };
            }
        }
    }

    fn handle_out_packet(&mut self) {
        if self.ctrl_state == CtrlState::DataRx {
            if self.read_ep(0) {
                // All the data is in; let the requester look at it,
                // then arm the zero-length status acknowledgement.
                if let Some(callback) = self.data_callback.take() {
                    callback(self);
                }
                self.ctrl_state = CtrlState::StatusTx;
                self.write_ep(0);
            }
        } else {
            // Status phase done.
            self.ctrl_state = CtrlState::Idle;
        }
    }

    fn handle_in_packet(&mut self) {
        if self.state == DeviceState::Addressing {
            // The zero-length status stage of a SET_ADDRESS has just
            // gone out, and the host has acknowledged it: this is the
            // one moment the address may change hands.
            let (low, high) = self.packet.address();
            if self.packet.request_kind() != RequestKind::Standard
                || self.packet.bRequest != StandardRequest::SetAddress as u8
                || high != 0
            {
                self.controller.set_address(0);
                self.state = DeviceState::Waiting;
            } else {
                debug::println!("usb: address {}", low);
                self.controller.set_address(low);
                self.state = DeviceState::Addressed;
            }
        }

        if self.ctrl_state == CtrlState::DataTx {
            if self.write_ep(0) {
                self.ctrl_state = CtrlState::Idle;
            }
        } else {
            // Status-stage completion (or a stray IN).
            self.ctrl_state = CtrlState::Idle;
            if let Some(callback) = self.status_callback.take() {
                callback(self);
            }
        }
    }

    // ------------------------------------------------------------------
    // Standard requests
    // ------------------------------------------------------------------

    fn handle_standard_request(&mut self) -> Answer {
        let Ok(request) = StandardRequest::try_from(self.packet.bRequest) else {
            return Answer::Unhandled;
        };

        match request {
            StandardRequest::SetAddress => {
                // Reply first, latch later: the hardware address only
                // changes on the status-stage completion interrupt.
                self.state = DeviceState::Addressing;
                Answer::ZeroLength
            }
            // We do not support setting descriptors.
            StandardRequest::SetDescriptor => Answer::Stall,
            StandardRequest::GetDescriptor => self.handle_get_descriptor(),
            StandardRequest::SetConfiguration => {
                if self.handle_set_configuration() {
                    Answer::ZeroLength
                } else {
                    Answer::Stall
                }
            }
            StandardRequest::GetConfiguration => Answer::Data {
                // SAFETY: replies only ever read inside the ISR, while
                // the stack (and so this field) stays put.
                src: unsafe {
                    ByteSource::from_raw(&self.active_config as *const u8, Memory::Sram)
                },
                length: 1,
            },
            StandardRequest::GetStatus => self.handle_get_status(),
            StandardRequest::GetInterface => {
                let interface = self.packet.wIndex as usize;
                if interface < INTERFACES
                    && self.packet.wLength == 1
                    && self.packet.wValue == 0
                    && self.active_config != 0
                {
                    let config = (self.active_config - 1) as usize;
                    Answer::Data {
                        // SAFETY: as for GET_CONFIGURATION above.
                        src: unsafe {
                            ByteSource::from_raw(
                                &self.alternate_modes[config][interface] as *const u8,
                                Memory::Sram,
                            )
                        },
                        length: 1,
                    }
                } else {
                    Answer::Stall
                }
            }
            StandardRequest::SetInterface => self.handle_set_interface(),
            // Only meaningful for isochronous endpoints, which the
            // control engine has no business with.
            StandardRequest::SynchFrame => Answer::Stall,
            StandardRequest::ClearFeature | StandardRequest::SetFeature => Answer::Unhandled,
        }
    }

    fn handle_get_status(&mut self) -> Answer {
        match self.packet.recipient() {
            // We are bus-powered and don't support remote wakeup;
            // interface status is all-zeros by definition.
            Recipient::Device | Recipient::Interface => {
                self.status_response = [0, 0];
                Answer::Data {
                    // SAFETY: replies only ever read inside the ISR,
                    // while the stack stays put.
                    src: unsafe {
                        ByteSource::from_raw(self.status_response.as_ptr(), Memory::Sram)
                    },
                    length: 2,
                }
            }
            // TODO: report endpoint halt status once the controller
            // trait grows a query for it.
            _ => Answer::Stall,
        }
    }

    fn handle_get_descriptor(&mut self) -> Answer {
        if self.packet.direction() == Direction::Out {
            return Answer::Unhandled;
        }
        let (index, dtype) = self.packet.descriptor();
        let Ok(dtype) = DescriptorType::try_from(dtype) else {
            return Answer::Unhandled;
        };

        match dtype {
            DescriptorType::Device => Answer::Data {
                src: self.descriptors.device.data,
                length: self.descriptors.device.length as u16,
            },
            // Full speed only: no other-speed information to offer.
            DescriptorType::DeviceQualifier => Answer::Stall,
            DescriptorType::Configuration => {
                let configurations = self.descriptors.configurations;
                match configurations.get(index as usize) {
                    Some(table) => Answer::Parts(table),
                    None => Answer::Unhandled,
                }
            }
            DescriptorType::Interface => {
                match self.descriptors.interfaces.get(index as usize) {
                    Some(part) => Answer::Data {
                        src: part.data,
                        length: part.length as u16,
                    },
                    None => Answer::Unhandled,
                }
            }
            DescriptorType::Endpoint => match self.descriptors.endpoints.get(index as usize) {
                Some(part) => Answer::Data {
                    src: part.data,
                    length: part.length as u16,
                },
                None => Answer::Unhandled,
            },
            DescriptorType::String => {
                if index == 0 {
                    Answer::Data {
                        src: self.descriptors.language_ids.data,
                        length: self.descriptors.language_ids.length as u16,
                    }
                } else {
                    let strings = self.descriptors.strings;
                    match strings.get(index as usize - 1) {
                        Some(table) => Answer::Parts(table),
                        None => Answer::Unhandled,
                    }
                }
            }
            _ => Answer::Unhandled,
        }
    }

    fn handle_set_interface(&mut self) -> Answer {
        let interface = self.packet.wIndex as usize;
        if interface >= INTERFACES
            || self.packet.wLength != 0
            || self.packet.wValue >= 0x100
            || self.active_config == 0
        {
            return Answer::Stall;
        }
        let config = (self.active_config - 1) as usize;
        let alt_setting = self.packet.wValue as u8;
        if let Some(handler) = self.alt_mode_handlers[config][interface] {
            if !handler(self, interface as u8, alt_setting) {
                return Answer::Stall;
            }
        }
        self.alternate_modes[config][interface] = alt_setting;
        Answer::ZeroLength
    }

    fn handle_set_configuration(&mut self) -> bool {
        self.reset_eps(EpReset::User);
        // The outgoing configuration's handlers get their goodbye
        // before active_config moves on.
        self.deinit_handlers();

        let config = self.packet.configuration();
        if config as usize > CONFIGS {
            return false;
        }
        self.active_config = config;

        if config == 0 {
            self.state = DeviceState::Addressed;
            return true;
        }

        // Program every endpoint the configuration names. Each part of
        // the table is one descriptor; the type byte sits second.
        let table = self.descriptors.configurations[config as usize - 1];
        for part in table.parts() {
            let mut header = [0u8; 2];
            self.controller.read_source(part.data, &mut header);
            if header[1] == DescriptorType::Endpoint as u8 {
                let mut raw = [0u8; 7];
                self.controller.read_source(part.data, &mut raw);
                let descriptor = bytemuck::pod_read_unaligned(&raw);
                self.controller.configure_endpoint(&descriptor);
            }
        }

        self.init_handlers();
        self.state = DeviceState::Configured;
        debug::println!("usb: configuration {}", config);
        true
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/control.rs"]
mod tests;
