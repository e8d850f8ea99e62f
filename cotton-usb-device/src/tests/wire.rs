use super::*;

#[test]
fn parse_get_descriptor() {
    // GET_DESCRIPTOR(device), 18 bytes
    let p = SetupPacket::parse(&[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]);
    assert_eq!(p.bmRequestType, 0x80);
    assert_eq!(p.bRequest, 6);
    assert_eq!(p.wValue, 0x0100);
    assert_eq!(p.wIndex, 0);
    assert_eq!(p.wLength, 18);
    assert_eq!(p.direction(), Direction::In);
    assert_eq!(p.request_kind(), RequestKind::Standard);
    assert_eq!(p.recipient(), Recipient::Device);
    assert_eq!(p.descriptor(), (0, 1));
}

#[test]
fn parse_is_little_endian() {
    let p = SetupPacket::parse(&[0x21, 0x01, 0x34, 0x12, 0x78, 0x56, 0xBC, 0x9A]);
    assert_eq!(p.wValue, 0x1234);
    assert_eq!(p.wIndex, 0x5678);
    assert_eq!(p.wLength, 0x9ABC);
}

#[test]
fn class_interface_request() {
    // DFU_DNLOAD-shaped request
    let p = SetupPacket::parse(&[0x21, 0x01, 0x00, 0x00, 0x00, 0x00, 0x20, 0x00]);
    assert_eq!(p.request_kind(), RequestKind::Class);
    assert_eq!(p.recipient(), Recipient::Interface);
    assert_eq!(p.direction(), Direction::Out);
}

#[test]
fn vendor_and_reserved_kinds() {
    let p = SetupPacket::parse(&[0x41, 0x99, 0, 0, 0, 0, 0, 0]);
    assert_eq!(p.request_kind(), RequestKind::Vendor);
    let p = SetupPacket::parse(&[0x63, 0x00, 0, 0, 0, 0, 0, 0]);
    assert_eq!(p.request_kind(), RequestKind::Reserved);
    assert_eq!(p.recipient(), Recipient::Other);
}

#[test]
fn address_views() {
    let p = SetupPacket::parse(&[0x00, 0x05, 0x07, 0x00, 0, 0, 0, 0]);
    assert_eq!(p.address(), (7, 0));
    assert_eq!(p.configuration(), 7);
}

#[test]
fn standard_request_codes() {
    assert_eq!(StandardRequest::try_from(5), Ok(StandardRequest::SetAddress));
    assert_eq!(StandardRequest::try_from(9), Ok(StandardRequest::SetConfiguration));
    assert!(StandardRequest::try_from(2).is_err());
    assert!(StandardRequest::try_from(0x99).is_err());
}

#[test]
fn descriptor_type_codes() {
    assert_eq!(DescriptorType::try_from(1), Ok(DescriptorType::Device));
    assert_eq!(DescriptorType::try_from(5), Ok(DescriptorType::Endpoint));
    assert!(DescriptorType::try_from(0).is_err());
    assert!(DescriptorType::try_from(0x29).is_err());
}

#[test]
fn endpoint_descriptor_views() {
    let e = EndpointDescriptor {
        bLength: 7,
        bDescriptorType: DescriptorType::Endpoint as u8,
        bEndpointAddress: 0x81,
        bmAttributes: 2,
        wMaxPacketSize: 64u16.to_le_bytes(),
        bInterval: 0,
    };
    assert_eq!(e.number(), 1);
    assert_eq!(e.direction(), Direction::In);
    assert_eq!(e.max_packet_size(), 64);

    let bytes = bytemuck::bytes_of(&e);
    assert_eq!(bytes.len(), 7);
    assert_eq!(bytes[2], 0x81);
    let back: EndpointDescriptor = bytemuck::pod_read_unaligned(bytes);
    assert_eq!(back.bEndpointAddress, 0x81);
}

#[test]
fn device_descriptor_is_18_bytes() {
    assert_eq!(core::mem::size_of::<DeviceDescriptor>(), 18);
    assert_eq!(core::mem::size_of::<ConfigurationDescriptor>(), 9);
    assert_eq!(core::mem::size_of::<InterfaceDescriptor>(), 9);
    assert_eq!(core::mem::size_of::<EndpointDescriptor>(), 7);
}

#[test]
fn lang_id_descriptor() {
    let d = StringLangIdDescriptor::new(0x0409);
    let bytes = bytemuck::bytes_of(&d);
    assert_eq!(bytes, &[4, 3, 0x09, 0x04]);
}
