use super::*;

#[test]
fn endpoint_addr_packs() {
    let ep = EndpointAddr::new(3, Direction::In);
    assert_eq!(ep.number(), 3);
    assert_eq!(ep.direction(), Direction::In);

    let ep = EndpointAddr::new(1, Direction::Out);
    assert_eq!(ep.number(), 1);
    assert_eq!(ep.direction(), Direction::Out);
}

#[test]
fn endpoint_addr_masks_number() {
    let ep = EndpointAddr::new(0x1F, Direction::Out);
    assert_eq!(ep.number(), 0x0F);
}

#[test]
fn endpoint_addr_setters_read_then_mask() {
    let mut ep = EndpointAddr::new(2, Direction::In);
    ep.set_number(5);
    assert_eq!(ep.number(), 5);
    assert_eq!(ep.direction(), Direction::In);
    ep.set_direction(Direction::Out);
    assert_eq!(ep.number(), 5);
    assert_eq!(ep.direction(), Direction::Out);
}

#[test]
fn default_endpoint_addr_is_ep0_out() {
    let ep = EndpointAddr::default();
    assert_eq!(ep.number(), 0);
    assert_eq!(ep.direction(), Direction::Out);
}

#[test]
fn unhandled_answers() {
    assert!(Answer::Unhandled.is_unhandled());
    assert!(!Answer::ZeroLength.is_unhandled());
    assert!(!Answer::Stall.is_unhandled());
}
