use super::*;
use crate::mocks::{FakeController, MockDeviceController};
use crate::source::{DescriptorPart, MultiPartTable};
use crate::types::DeviceState;
use mockall::predicate;
use std::sync::atomic::{AtomicUsize, Ordering};

static DEVICE: [u8; 18] = [
    18, 1, 0x00, 0x02, 0, 0, 0, 64, 0x34, 0x12, 0x78, 0x56, 0x00, 0x01, 1, 2, 3, 1,
];
static CONFIG: [u8; 9] = [9, 2, 25, 0, 1, 1, 0, 0x80, 50];
static INTERFACE: [u8; 9] = [9, 4, 0, 0, 1, 0xFE, 1, 2, 0];
static ENDPOINT: [u8; 7] = [7, 5, 0x81, 2, 64, 0, 0];
static CONFIG_PARTS: [DescriptorPart; 3] = [
    DescriptorPart::sram(&CONFIG),
    DescriptorPart::sram(&INTERFACE),
    DescriptorPart::sram(&ENDPOINT),
];
static CONFIGURATIONS: [MultiPartTable; 1] = [MultiPartTable::new(&CONFIG_PARTS)];
static LANG_IDS: [u8; 4] = [4, 3, 0x09, 0x04];

fn descriptor_set() -> DescriptorSet {
    DescriptorSet {
        device: DescriptorPart::sram(&DEVICE),
        configurations: &CONFIGURATIONS,
        interfaces: &[],
        endpoints: &[],
        strings: &[],
        language_ids: DescriptorPart::sram(&LANG_IDS),
    }
}

type TestStack = UsbStack<FakeController, 1, 2, 3>;

fn attached_stack() -> TestStack {
    let mut stack: TestStack = UsbStack::new(FakeController::new(), descriptor_set());
    stack.attach();
    stack.controller_mut().signal_reset();
    stack.handle_irq();
    stack
}

fn send_setup(stack: &mut TestStack, bytes: [u8; 8]) {
    stack.controller_mut().give_setup(&bytes);
    stack.handle_irq();
}

fn noop_packet(_stack: &mut TestStack, _ep: u8) {}

const NOOP_HANDLER: Handler<FakeController, 1, 2, 3> = Handler {
    init: None,
    deinit: None,
    handle_packet: Some(noop_packet),
};

// ----------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------

#[test]
fn register_then_unregister_leaves_slot_empty() {
    let mut stack: TestStack = UsbStack::new(FakeController::new(), descriptor_set());
    let ep = EndpointAddr::new(1, Direction::In);
    stack.register_handler(ep, 1, NOOP_HANDLER);
    assert!(!stack.handler_for(ep, 1).is_empty());
    stack.unregister_handler(ep, 1);
    assert!(stack.handler_for(ep, 1).is_empty());
}

#[test]
fn in_and_out_slots_are_distinct() {
    let mut stack: TestStack = UsbStack::new(FakeController::new(), descriptor_set());
    stack.register_handler(EndpointAddr::new(1, Direction::In), 1, NOOP_HANDLER);
    assert!(stack
        .handler_for(EndpointAddr::new(1, Direction::Out), 1)
        .is_empty());
    assert!(!stack
        .handler_for(EndpointAddr::new(1, Direction::In), 1)
        .is_empty());
}

#[test]
fn out_of_range_registration_is_ignored() {
    let mut stack: TestStack = UsbStack::new(FakeController::new(), descriptor_set());
    // Endpoint zero belongs to the control engine
    stack.register_handler(EndpointAddr::new(0, Direction::In), 1, NOOP_HANDLER);
    // Endpoint count is 3, so 3 is one past the end
    stack.register_handler(EndpointAddr::new(3, Direction::In), 1, NOOP_HANDLER);
    // Configurations are 1-based
    stack.register_handler(EndpointAddr::new(1, Direction::In), 0, NOOP_HANDLER);
    stack.register_handler(EndpointAddr::new(1, Direction::In), 2, NOOP_HANDLER);
    assert!(stack
        .handler_for(EndpointAddr::new(1, Direction::In), 1)
        .is_empty());
    assert!(stack
        .handler_for(EndpointAddr::new(3, Direction::In), 1)
        .is_empty());
    assert!(stack
        .handler_for(EndpointAddr::new(1, Direction::In), 0)
        .is_empty());
}

#[test]
fn sof_registration_bounds() {
    fn sof() {}
    let mut stack: TestStack = UsbStack::new(FakeController::new(), descriptor_set());
    // Interfaces are zero-based here: 0 and 1 exist, 2 does not
    stack.register_sof_handler(2, sof);
    stack.register_sof_handler(0, sof);
    stack.unregister_sof_handler(0);
    stack.unregister_sof_handler(9);
}

// ----------------------------------------------------------------------
// Device state machine
// ----------------------------------------------------------------------

#[test]
fn attach_then_reset_reaches_waiting() {
    let mut stack: TestStack = UsbStack::new(FakeController::new(), descriptor_set());
    assert_eq!(stack.state(), DeviceState::Detached);
    stack.attach();
    assert_eq!(stack.state(), DeviceState::Attached);
    assert!(stack.controller().attached);
    stack.controller_mut().signal_reset();
    stack.handle_irq();
    assert_eq!(stack.state(), DeviceState::Waiting);
    assert_eq!(stack.controller().bus_resets, 1);
    assert_eq!(stack.controller().address, 0);
}

#[test]
fn irq_before_reset_only_promotes_to_powered() {
    let mut stack: TestStack = UsbStack::new(FakeController::new(), descriptor_set());
    stack.attach();
    // A stray endpoint completion before any bus reset
    stack.controller_mut().events.rx_pending = 1;
    stack.handle_irq();
    assert_eq!(stack.state(), DeviceState::Powered);
    assert!(stack.controller().sent[0].is_empty());
    assert!(!stack.controller().stalled[0]);
}

#[test]
fn suspend_quiesces_until_resume() {
    let mut stack = attached_stack();
    stack.controller_mut().signal_suspend();
    stack.handle_irq();
    assert!(stack.is_suspended());
    assert!(stack.controller().suspended);

    // Traffic while suspended is ignored
    send_setup(&mut stack, [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]);
    assert!(stack.controller().sent[0].is_empty());

    stack.controller_mut().signal_resume();
    stack.handle_irq();
    assert!(!stack.is_suspended());
    send_setup(&mut stack, [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]);
    assert_eq!(stack.controller().sent_bytes(0), DEVICE.to_vec());
}

#[test]
fn detach_tears_down_configuration() {
    let mut stack = attached_stack();
    send_setup(&mut stack, [0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(stack.active_config(), 1);
    stack.detach();
    assert_eq!(stack.state(), DeviceState::Detached);
    assert_eq!(stack.active_config(), 0);
    assert!(!stack.controller().attached);
}

static SOFS: AtomicUsize = AtomicUsize::new(0);

#[test]
fn sof_fans_out_once_enumerable() {
    fn sof() {
        SOFS.fetch_add(1, Ordering::SeqCst);
    }

    let mut stack: TestStack = UsbStack::new(FakeController::new(), descriptor_set());
    stack.register_sof_handler(0, sof);
    stack.attach();

    // Before the bus reset, SOFs are not interesting
    stack.controller_mut().signal_sof();
    stack.handle_irq();
    assert_eq!(SOFS.load(Ordering::SeqCst), 0);

    stack.controller_mut().signal_reset();
    stack.handle_irq();
    stack.controller_mut().signal_sof();
    stack.handle_irq();
    assert_eq!(SOFS.load(Ordering::SeqCst), 1);

    stack.unregister_sof_handler(0);
    stack.controller_mut().signal_sof();
    stack.handle_irq();
    assert_eq!(SOFS.load(Ordering::SeqCst), 1);
}

static PACKETS: AtomicUsize = AtomicUsize::new(0);

#[test]
fn data_packets_reach_the_registered_handler() {
    fn on_packet(stack: &mut TestStack, ep: u8) {
        assert_eq!(ep, 1);
        assert!(stack.rx_ready(1));
        PACKETS.fetch_add(1, Ordering::SeqCst);
    }

    let mut stack = attached_stack();
    stack.register_handler(
        EndpointAddr::new(1, Direction::Out),
        1,
        Handler {
            init: None,
            deinit: None,
            handle_packet: Some(on_packet),
        },
    );
    send_setup(&mut stack, [0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);

    stack.controller_mut().give_out(1, &[1, 2, 3]);
    stack.handle_irq();
    assert_eq!(PACKETS.load(Ordering::SeqCst), 1);

    // No handler on the IN side: the completion is dropped on the floor
    stack.controller_mut().complete_in(1);
    stack.handle_irq();
    assert_eq!(PACKETS.load(Ordering::SeqCst), 1);
}

// ----------------------------------------------------------------------
// Handler lifecycle across SET_CONFIGURATION
// ----------------------------------------------------------------------

static INITS: AtomicUsize = AtomicUsize::new(0);
static DEINITS: AtomicUsize = AtomicUsize::new(0);

#[test]
fn set_configuration_twice_reinits_but_registry_unchanged() {
    fn init(_stack: &mut TestStack, ep: u8) {
        assert_eq!(ep, 1);
        INITS.fetch_add(1, Ordering::SeqCst);
    }
    fn deinit(_stack: &mut TestStack, ep: u8) {
        assert_eq!(ep, 1);
        DEINITS.fetch_add(1, Ordering::SeqCst);
    }

    let mut stack = attached_stack();
    let ep = EndpointAddr::new(1, Direction::In);
    stack.register_handler(
        ep,
        1,
        Handler {
            init: Some(init),
            deinit: Some(deinit),
            handle_packet: None,
        },
    );

    send_setup(&mut stack, [0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(stack.state(), DeviceState::Configured);
    assert_eq!(INITS.load(Ordering::SeqCst), 1);
    assert_eq!(DEINITS.load(Ordering::SeqCst), 0);

    send_setup(&mut stack, [0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(INITS.load(Ordering::SeqCst), 2);
    assert_eq!(DEINITS.load(Ordering::SeqCst), 1);
    assert!(!stack.handler_for(ep, 1).is_empty());
    assert_eq!(stack.active_config(), 1);
}

#[test]
fn set_configuration_programs_endpoints() {
    let mut stack = attached_stack();
    send_setup(&mut stack, [0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
    let configured = &stack.controller().configured_endpoints;
    assert_eq!(configured.len(), 1);
    assert_eq!(configured[0].bEndpointAddress, 0x81);
    assert_eq!(configured[0].max_packet_size(), 64);
    // User endpoints were reset but endpoint zero was spared
    assert_eq!(stack.controller().resets.last(), Some(&EpReset::User));
}

// ----------------------------------------------------------------------
// Mock-driven passthroughs
// ----------------------------------------------------------------------

#[test]
fn attach_asserts_pullup_at_address_zero() {
    let mut controller = MockDeviceController::default();
    controller
        .inner
        .expect_set_address()
        .with(predicate::eq(0u8))
        .times(1)
        .return_const(());
    controller.inner.expect_attach().times(1).return_const(());

    let mut stack: UsbStack<MockDeviceController, 1, 1, 2> =
        UsbStack::new(controller, descriptor_set());
    stack.attach();
    assert_eq!(stack.state(), DeviceState::Attached);
}

#[test]
fn detach_releases_pullup() {
    let mut controller = MockDeviceController::default();
    controller.inner.expect_detach().times(1).return_const(());

    let mut stack: UsbStack<MockDeviceController, 1, 1, 2> =
        UsbStack::new(controller, descriptor_set());
    stack.detach();
    assert_eq!(stack.state(), DeviceState::Detached);
}
