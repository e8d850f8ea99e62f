#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod debug;
pub mod dfu;

pub use dfu::{
    detached, register_handlers, tick, DfuRequest, DfuState, DfuStatus, FlashOps, FlashParams,
    GetStatusResponse, Zone, FLASH_BUFFER_SIZE,
};
