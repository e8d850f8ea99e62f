//! The DFU class state machine and flash programming loop
//!
//! One DFU function per device: the driver's state lives in a single
//! interrupt-masked cell, because every entry point — control requests,
//! the data-phase completion, the start-of-frame tick — runs from the
//! USB interrupt.

use core::cell::RefCell;

use cotton_usb_device::device_controller::DeviceController;
use cotton_usb_device::source::{ByteSource, Memory};
use cotton_usb_device::stack::UsbStack;
use cotton_usb_device::types::Answer;
use cotton_usb_device::wire::{Recipient, RequestKind, SetupPacket};
use critical_section::Mutex;

use crate::debug;

/// Size of the staging buffer, and so the biggest DNLOAD or UPLOAD
/// block the driver will accept (wTransferSize in the DFU functional
/// descriptor should say the same).
pub const FLASH_BUFFER_SIZE: usize = 1024;

/// DFU class requests (DFU 1.1 section 3).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum DfuRequest {
    Detach = 0,
    Download = 1,
    Upload = 2,
    GetStatus = 3,
    ClearStatus = 4,
    GetState = 5,
    Abort = 6,
}

/// DFU device states (DFU 1.1 appendix A).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DfuState {
    ApplicationIdle = 0,
    ApplicationDetach = 1,
    DfuIdle = 2,
    DownloadSync = 3,
    DownloadBusy = 4,
    DownloadIdle = 5,
    ManifestSync = 6,
    Manifest = 7,
    ManifestWaitReset = 8,
    UploadIdle = 9,
    Error = 10,
}

/// DFU status codes (DFU 1.1 section 6.1.2).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DfuStatus {
    Ok = 0,
    ErrTarget = 1,
    ErrFile = 2,
    ErrWrite = 3,
    ErrErase = 4,
    ErrCheckErased = 5,
    ErrProgram = 6,
    ErrVerify = 7,
    ErrAddress = 8,
    ErrNotDone = 9,
    ErrFirmware = 10,
    ErrVendor = 11,
    ErrUsbReset = 12,
    ErrPowerOnReset = 13,
    ErrUnknown = 14,
    ErrStalledPacket = 15,
}

/// The six-byte DFU_GETSTATUS reply (DFU 1.1 section 6.1.2).
#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
pub struct GetStatusResponse {
    pub status: u8,
    /// Minimum milliseconds before the host should poll again.
    pub poll_timeout: [u8; 3],
    pub state: u8,
    /// Index of a status description string; we don't provide one.
    pub string: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for GetStatusResponse {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for GetStatusResponse {}

const _: () = assert!(core::mem::size_of::<GetStatusResponse>() == 6);

/// An address window within flash the host may program, selected by
/// alternate setting: alt-setting `k` selects zone `k`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Zone {
    pub start: usize,
    pub end: usize,
}

/// Flash access supplied by user firmware.
///
/// `erase` and `write` may start the operation and return immediately;
/// the driver polls `busy` from the SOF tick and never issues a new
/// operation while one is in flight. `reboot` must not return.
#[derive(Copy, Clone)]
pub struct FlashOps {
    pub reboot: fn() -> !,
    pub erase: fn(usize),
    /// `write(addr, data)`; `data.len()` never exceeds
    /// [`FlashParams::write_size`].
    pub write: fn(usize, &[u8]),
    pub read: fn(usize, &mut [u8]),
    pub busy: fn() -> bool,
}

/// Flash geometry.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
pub struct FlashParams {
    /// Bytes covered by one erase operation.
    pub erase_size: usize,
    /// Most bytes one write operation accepts.
    pub write_size: usize,
}

#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq, Default)]
enum FlashOp {
    #[default]
    Idle,
    Erase,
    Write,
}

#[derive(Copy, Clone, Default)]
struct FlashState {
    op: FlashOp,
    read_addr: usize,
    erase_addr: usize,
    write_addr: usize,
    end_addr: usize,
    offset: usize,
    byte_count: usize,
}

struct DfuContext {
    state: DfuState,
    status: DfuStatus,
    zones: &'static [Zone],
    ops: Option<FlashOps>,
    params: FlashParams,
    flash: FlashState,
    buffer: [u8; FLASH_BUFFER_SIZE],
    reply: GetStatusResponse,
}

const POLL_TIMEOUT_MS: u8 = 1;

impl DfuContext {
    const fn new() -> Self {
        Self {
            state: DfuState::ApplicationIdle,
            status: DfuStatus::Ok,
            zones: &[],
            ops: None,
            params: FlashParams {
                erase_size: 0,
                write_size: 0,
            },
            flash: FlashState {
                op: FlashOp::Idle,
                read_addr: 0,
                erase_addr: 0,
                write_addr: 0,
                end_addr: 0,
                offset: 0,
                byte_count: 0,
            },
            buffer: [0; FLASH_BUFFER_SIZE],
            reply: GetStatusResponse {
                status: 0,
                poll_timeout: [POLL_TIMEOUT_MS, 0, 0],
                state: 0,
                string: 0,
            },
        }
    }

    fn refresh_reply(&mut self) {
        self.reply = GetStatusResponse {
            status: self.status as u8,
            poll_timeout: [POLL_TIMEOUT_MS, 0, 0],
            state: self.state as u8,
            string: 0,
        };
    }
}

static CONTEXT: Mutex<RefCell<DfuContext>> = Mutex::new(RefCell::new(DfuContext::new()));

/// Install the DFU function on interface slot `interface` (1-based)
/// under configuration `config`.
///
/// Starts the driver afresh in `ApplicationIdle`; call [`detached`]
/// afterwards if this firmware image just rebooted because of a DFU
/// detach and should come up ready for transfers.
pub fn register_handlers<
    DC: DeviceController,
    const C: usize,
    const I: usize,
    const N: usize,
>(
    stack: &mut UsbStack<DC, C, I, N>,
    zones: &'static [Zone],
    ops: FlashOps,
    params: FlashParams,
    interface: u8,
    config: u8,
) {
    critical_section::with(|cs| {
        let mut dfu = CONTEXT.borrow_ref_mut(cs);
        *dfu = DfuContext::new();
        dfu.zones = zones;
        dfu.ops = Some(ops);
        dfu.params = params;
    });
    stack.register_control_handler(interface, config, handle_dfu_request);
    stack.register_alt_mode_handler(interface, config, handle_set_interface);
}

/// Tell the driver whether this image is running because of a DFU
/// detach-and-reboot. If so the state machine starts in `DfuIdle`,
/// ready for transfers, instead of `ApplicationIdle`.
pub fn detached(state: bool) {
    critical_section::with(|cs| {
        let mut dfu = CONTEXT.borrow_ref_mut(cs);
        dfu.state = if state {
            DfuState::DfuIdle
        } else {
            DfuState::ApplicationIdle
        };
    });
}

/// The flash programming loop, run once per start-of-frame while a
/// zone is selected.
///
/// Erases ahead of the pending block, then writes it out, one
/// operation per millisecond tick at most, yielding whenever the flash
/// hardware is still busy.
pub fn tick() {
    critical_section::with(|cs| {
        let mut dfu = CONTEXT.borrow_ref_mut(cs);
        let Some(ops) = dfu.ops else {
            return;
        };
        if dfu.flash.op == FlashOp::Idle || (ops.busy)() {
            return;
        }

        if dfu.flash.op == FlashOp::Erase {
            if dfu.flash.erase_addr < dfu.flash.write_addr + dfu.flash.byte_count {
                let addr = dfu.flash.erase_addr;
                (ops.erase)(addr);
                dfu.flash.erase_addr += dfu.params.erase_size;
            } else if dfu.flash.write_addr + dfu.flash.byte_count <= dfu.flash.end_addr {
                dfu.flash.op = FlashOp::Write;
            }
        }

        if dfu.flash.op == FlashOp::Write && dfu.state == DfuState::DownloadBusy {
            if dfu.flash.offset == dfu.flash.byte_count {
                dfu.flash.op = FlashOp::Idle;
                dfu.state = DfuState::DownloadSync;
                debug::println!("dfu: block written");
            } else {
                let count =
                    (dfu.flash.byte_count - dfu.flash.offset).min(dfu.params.write_size);
                let addr = dfu.flash.write_addr;
                let offset = dfu.flash.offset;
                (ops.write)(addr, &dfu.buffer[offset..offset + count]);
                dfu.flash.write_addr += count;
                dfu.flash.offset += count;
            }
        }
    });
}

/// Alternate-setting hook: selects the flash zone to operate on and
/// starts the SOF-clocked flash loop on this interface.
fn handle_set_interface<DC: DeviceController, const C: usize, const I: usize, const N: usize>(
    stack: &mut UsbStack<DC, C, I, N>,
    interface: u8,
    alt_setting: u8,
) -> bool {
    stack.unregister_sof_handler(interface);
    let selected = critical_section::with(|cs| {
        let mut dfu = CONTEXT.borrow_ref_mut(cs);
        let Some(zone) = dfu.zones.get(alt_setting as usize).copied() else {
            return false;
        };
        dfu.flash = FlashState {
            op: FlashOp::Idle,
            read_addr: zone.start,
            erase_addr: zone.start,
            write_addr: zone.start,
            end_addr: zone.end,
            offset: 0,
            byte_count: 0,
        };
        dfu.state = DfuState::DfuIdle;
        debug::println!("dfu: zone {}", alt_setting);
        true
    });
    if selected {
        stack.register_sof_handler(interface, tick);
    }
    selected
}

fn download_step_done<DC: DeviceController, const C: usize, const I: usize, const N: usize>(
    _stack: &mut UsbStack<DC, C, I, N>,
) {
    // The block's payload has landed in the staging buffer; the tick
    // loop may write it as soon as the erase frontier allows.
    critical_section::with(|cs| {
        CONTEXT.borrow_ref_mut(cs).state = DfuState::DownloadBusy;
    });
}

fn finish_detach<DC: DeviceController, const C: usize, const I: usize, const N: usize>(
    stack: &mut UsbStack<DC, C, I, N>,
) {
    stack.detach();
    critical_section::with(|cs| {
        let mut dfu = CONTEXT.borrow_ref_mut(cs);
        dfu.state = DfuState::ApplicationDetach;
        if let Some(ops) = dfu.ops {
            (ops.reboot)();
        }
    });
}

fn handle_download<DC: DeviceController, const C: usize, const I: usize, const N: usize>(
    dfu: &mut DfuContext,
    stack: &mut UsbStack<DC, C, I, N>,
    packet: &SetupPacket,
) -> Answer {
    if packet.wLength == 0 {
        // End of image: the host has sent everything.
        dfu.state = DfuState::ManifestSync;
        return Answer::ZeroLength;
    }

    let length = packet.wLength as usize;
    if length > FLASH_BUFFER_SIZE || dfu.flash.erase_addr + length > dfu.flash.end_addr {
        dfu.state = DfuState::Error;
        dfu.status = DfuStatus::ErrAddress;
        return Answer::Stall;
    }

    dfu.flash.op = FlashOp::Erase;
    dfu.flash.offset = 0;
    dfu.flash.byte_count = length;

    // SAFETY: the staging buffer lives in a static and is only touched
    // from the ISR; the armed transfer is done with it before any
    // other request can reuse it.
    unsafe {
        stack.arm_out(0, dfu.buffer.as_mut_ptr(), packet.wLength);
    }
    stack.set_data_callback(download_step_done);
    Answer::ZeroLength
}

/// The DFU control-request handler.
fn handle_dfu_request<DC: DeviceController, const C: usize, const I: usize, const N: usize>(
    stack: &mut UsbStack<DC, C, I, N>,
    interface: u8,
    packet: SetupPacket,
) -> Answer {
    if packet.recipient() != Recipient::Interface
        || packet.request_kind() != RequestKind::Class
        || packet.wIndex != interface as u16
    {
        return Answer::Unhandled;
    }
    let Ok(request) = DfuRequest::try_from(packet.bRequest) else {
        return Answer::Unhandled;
    };

    critical_section::with(|cs| {
        let mut dfu = CONTEXT.borrow_ref_mut(cs);
        match request {
            DfuRequest::Detach => {
                // Drop off the bus and reboot, but only once the host
                // has collected the acknowledgement.
                stack.set_status_callback(finish_detach);
                Answer::ZeroLength
            }
            DfuRequest::Download => handle_download(&mut dfu, stack, &packet),
            DfuRequest::Upload => {
                let length = packet.wLength as usize;
                if length > FLASH_BUFFER_SIZE
                    || dfu.flash.read_addr + length > dfu.flash.end_addr
                {
                    return Answer::Stall;
                }
                let Some(ops) = dfu.ops else {
                    return Answer::Stall;
                };
                let addr = dfu.flash.read_addr;
                (ops.read)(addr, &mut dfu.buffer[..length]);
                dfu.flash.read_addr += length;
                Answer::Data {
                    // SAFETY: the staging buffer lives in a static and
                    // holds still until the reply has gone out.
                    src: unsafe { ByteSource::from_raw(dfu.buffer.as_ptr(), Memory::Sram) },
                    length: packet.wLength,
                }
            }
            DfuRequest::GetStatus => {
                dfu.state = match dfu.state {
                    DfuState::DownloadSync => DfuState::DownloadIdle,
                    DfuState::ManifestSync => DfuState::Manifest,
                    DfuState::Manifest => DfuState::DfuIdle,
                    state => state,
                };
                dfu.refresh_reply();
                Answer::Data {
                    // SAFETY: the reply lives in a static, refreshed
                    // only by the next DFU request.
                    src: unsafe {
                        ByteSource::from_raw(
                            bytemuck::bytes_of(&dfu.reply).as_ptr(),
                            Memory::Sram,
                        )
                    },
                    length: core::mem::size_of::<GetStatusResponse>() as u16,
                }
            }
            DfuRequest::ClearStatus => {
                if dfu.state == DfuState::Error {
                    dfu.state = DfuState::DfuIdle;
                    dfu.status = DfuStatus::Ok;
                }
                Answer::ZeroLength
            }
            DfuRequest::GetState => {
                dfu.refresh_reply();
                Answer::Data {
                    // SAFETY: as for GET_STATUS above.
                    src: unsafe {
                        ByteSource::from_raw(&dfu.reply.state as *const u8, Memory::Sram)
                    },
                    length: 1,
                }
            }
            DfuRequest::Abort => {
                dfu.state = DfuState::DfuIdle;
                Answer::ZeroLength
            }
        }
    })
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/dfu.rs"]
mod tests;
