use super::*;
use crate::mocks::FakeController;

#[test]
fn irq_status_default_is_quiet() {
    let status = IrqStatus::default();
    assert!(!status.reset);
    assert!(!status.suspend);
    assert!(!status.resume);
    assert!(!status.sof);
    assert_eq!(status.rx_pending, 0);
    assert_eq!(status.tx_pending, 0);
}

#[test]
fn default_read_source_copies_sram() {
    static DATA: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];
    let controller = FakeController::<64>::new();
    let mut out = [0u8; 4];
    controller.read_source(ByteSource::sram(&DATA), &mut out);
    assert_eq!(out, DATA);
}

#[test]
fn irq_status_is_read_and_clear() {
    let mut controller = FakeController::<64>::new();
    controller.signal_reset();
    controller.signal_sof();
    let status = controller.irq_status();
    assert!(status.reset);
    assert!(status.sof);
    let status = controller.irq_status();
    assert!(!status.reset);
    assert!(!status.sof);
}
