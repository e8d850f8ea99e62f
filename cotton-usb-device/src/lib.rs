#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod control;
mod debug;
pub mod descriptors;
pub mod device_controller;
pub mod endpoint;
#[cfg(feature = "std")]
pub mod mocks;
pub mod source;
pub mod stack;
pub mod types;
pub mod wire;

pub use descriptors::DescriptorSet;
pub use device_controller::{DeviceController, EpReset, IrqStatus};
pub use source::{ByteSource, DescriptorPart, Memory, MultiPartTable};
pub use stack::{Handler, UsbStack};
pub use types::{Answer, CtrlState, DeviceState, EndpointAddr};
pub use wire::{Direction, SetupPacket};
