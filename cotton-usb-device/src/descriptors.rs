//! The descriptor tables user firmware supplies
//!
//! All tables are `'static` and read-only; on segmented-memory parts
//! they can live in program flash, in which case their
//! [`ByteSource`](crate::source::ByteSource)s carry the flash tag and
//! the platform's program-memory read primitive is used to fetch them.

use crate::source::{DescriptorPart, MultiPartTable};

/// Everything the stack needs to answer GET_DESCRIPTOR.
///
/// - `device` is the 18-byte device descriptor.
/// - `configurations` has one multi-part table per configuration, each
///   the concatenation of that configuration's header, interface,
///   endpoint and class descriptors; `SET_CONFIGURATION` also walks it
///   to program the endpoint hardware.
/// - `interfaces` and `endpoints` answer the (rarely used) direct
///   interface- and endpoint-descriptor requests; their lengths are
///   independent of the interface and endpoint counts.
/// - `language_ids` is string descriptor zero; `strings[k]` answers
///   string index `k + 1`.
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
pub struct DescriptorSet {
    pub device: DescriptorPart,
    pub configurations: &'static [MultiPartTable],
    pub interfaces: &'static [DescriptorPart],
    pub endpoints: &'static [DescriptorPart],
    pub strings: &'static [MultiPartTable],
    pub language_ids: DescriptorPart,
}
