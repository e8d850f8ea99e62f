//! USB wire formats: SETUP packets, standard requests, descriptors
//!
//! Everything in this module is defined by the USB 2.0 specification,
//! chapter 9, and is byte-exact with what travels on the bus.

/// A SETUP packet as received on the default control endpoint.
///
/// Every control transfer opens with eight bytes of this format (some
/// are then followed by IN or OUT data packets, but others are not).
/// The format of this packet (and the un-Rust-like names of its fields)
/// are defined in the USB 2.0 specification, section 9.3.
///
/// On the device side these arrive from the host; the stack parses them
/// with [`SetupPacket::parse`] and routes them through the standard
/// request handler and then any registered class control handlers.
#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, Default, PartialEq, Eq)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-2
pub struct SetupPacket {
    /// The type and specific target of the request.
    pub bmRequestType: u8,
    /// The particular request.
    pub bRequest: u8,
    /// A parameter to the request.
    pub wValue: u16,
    /// A second parameter to the request.
    pub wIndex: u16,
    /// The length of the subsequent IN or OUT data phase; can be zero
    /// if the setup packet itself contains all the required
    /// information.
    pub wLength: u16,
}

impl SetupPacket {
    /// Decode the eight bytes of a SETUP transaction.
    ///
    /// The multi-byte fields are little-endian on the wire (USB 2.0
    /// s9.3), whatever the CPU byte order.
    pub fn parse(bytes: &[u8; 8]) -> Self {
        Self {
            bmRequestType: bytes[0],
            bRequest: bytes[1],
            wValue: u16::from_le_bytes([bytes[2], bytes[3]]),
            wIndex: u16::from_le_bytes([bytes[4], bytes[5]]),
            wLength: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    /// Who the request is aimed at (bmRequestType bits 4..0).
    pub fn recipient(&self) -> Recipient {
        match self.bmRequestType & 0x1F {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            _ => Recipient::Other,
        }
    }

    /// Standard, class or vendor request (bmRequestType bits 6..5).
    pub fn request_kind(&self) -> RequestKind {
        match self.bmRequestType & 0x60 {
            STANDARD_REQUEST => RequestKind::Standard,
            CLASS_REQUEST => RequestKind::Class,
            VENDOR_REQUEST => RequestKind::Vendor,
            _ => RequestKind::Reserved,
        }
    }

    /// Direction of the data phase, if any (bmRequestType bit 7).
    pub fn direction(&self) -> Direction {
        if (self.bmRequestType & DEVICE_TO_HOST) != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    /// wValue viewed as a GET_DESCRIPTOR parameter: (index, type).
    pub fn descriptor(&self) -> (u8, u8) {
        let [index, dtype] = self.wValue.to_le_bytes();
        (index, dtype)
    }

    /// wValue viewed as a SET_ADDRESS parameter: (low, high).
    ///
    /// The high byte must be zero for a conformant request; addresses
    /// are seven bits.
    pub fn address(&self) -> (u8, u8) {
        let [low, high] = self.wValue.to_le_bytes();
        (low, high)
    }

    /// wValue viewed as a SET_CONFIGURATION parameter.
    pub fn configuration(&self) -> u8 {
        self.wValue.to_le_bytes()[0]
    }
}

// For bmRequestType (USB 2.0 table 9-2)
pub const DEVICE_TO_HOST: u8 = 0x80;
pub const HOST_TO_DEVICE: u8 = 0;
pub const STANDARD_REQUEST: u8 = 0;
pub const CLASS_REQUEST: u8 = 0x20;
pub const VENDOR_REQUEST: u8 = 0x40;
pub const RECIPIENT_DEVICE: u8 = 0;
pub const RECIPIENT_INTERFACE: u8 = 1;
pub const RECIPIENT_ENDPOINT: u8 = 2;
pub const RECIPIENT_OTHER: u8 = 3;

/// The recipient field of a SETUP packet (USB 2.0 table 9-2).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// The type field of a SETUP packet (USB 2.0 table 9-2).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// Packet direction, always from the device's point of view: IN is
/// device-to-host, OUT is host-to-device.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Standard request codes (USB 2.0 table 9-4).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum StandardRequest {
    GetStatus = 0,
    ClearFeature = 1,
    SetFeature = 3,
    SetAddress = 5,
    GetDescriptor = 6,
    SetDescriptor = 7,
    GetConfiguration = 8,
    SetConfiguration = 9,
    GetInterface = 10,
    SetInterface = 11,
    SynchFrame = 12,
}

/// Descriptor type codes (USB 2.0 table 9-5).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum DescriptorType {
    Device = 1,
    Configuration = 2,
    String = 3,
    Interface = 4,
    Endpoint = 5,
    DeviceQualifier = 6,
    OtherSpeedConfiguration = 7,
    InterfacePower = 8,
}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-8
pub struct DeviceDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bcdUSB: [u8; 2],
    pub bDeviceClass: u8,
    pub bDeviceSubClass: u8,
    pub bDeviceProtocol: u8,
    pub bMaxPacketSize0: u8,

    pub idVendor: [u8; 2],
    pub idProduct: [u8; 2],
    pub bcdDevice: [u8; 2],
    pub iManufacturer: u8,
    pub iProduct: u8,
    pub iSerialNumber: u8,
    pub bNumConfigurations: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for DeviceDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for DeviceDescriptor {}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-10
pub struct ConfigurationDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub wTotalLength: [u8; 2],
    pub bNumInterfaces: u8,
    pub bConfigurationValue: u8,
    pub iConfiguration: u8,
    pub bmAttributes: u8,
    pub bMaxPower: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for ConfigurationDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for ConfigurationDescriptor {}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-12
pub struct InterfaceDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bInterfaceNumber: u8,
    pub bAlternateSetting: u8,
    pub bNumEndpoints: u8,
    pub bInterfaceClass: u8,
    pub bInterfaceSubClass: u8,
    pub bInterfaceProtocol: u8,
    pub iInterface: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for InterfaceDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for InterfaceDescriptor {}

#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-13
pub struct EndpointDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bEndpointAddress: u8,
    pub bmAttributes: u8,
    pub wMaxPacketSize: [u8; 2],
    pub bInterval: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for EndpointDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for EndpointDescriptor {}

impl EndpointDescriptor {
    /// The endpoint number, without the direction bit.
    pub fn number(&self) -> u8 {
        self.bEndpointAddress & 0x0F
    }

    /// The direction encoded in bEndpointAddress bit 7.
    pub fn direction(&self) -> Direction {
        if (self.bEndpointAddress & DEVICE_TO_HOST) != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    /// wMaxPacketSize as a host-order integer.
    pub fn max_packet_size(&self) -> u16 {
        u16::from_le_bytes(self.wMaxPacketSize)
    }
}

/// A string descriptor zero carrying a single language ID.
///
/// String index 0 is special: rather than text it lists the language
/// IDs the other strings are available in (USB 2.0 s9.6.7). One
/// language is enough for almost every device; 0x0409 is US English.
#[repr(C)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone)]
#[allow(non_snake_case)]
pub struct StringLangIdDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub wLANGID: [u8; 2],
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for StringLangIdDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for StringLangIdDescriptor {}

impl StringLangIdDescriptor {
    pub const fn new(lang_id: u16) -> Self {
        Self {
            bLength: 4,
            bDescriptorType: DescriptorType::String as u8,
            wLANGID: lang_id.to_le_bytes(),
        }
    }
}

/// Endpoint transfer types (bmAttributes bits 1..0).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum EndpointType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/wire.rs"]
mod tests;
