mod common;

use common::{boot, va};
use kernel_vmem::info::PAGE_FAULT_VECTOR;
use kernel_vmem::{FatalError, SystemState, TrapFrame, VmmError};

fn trap(err_code: u32, eip: u32) -> TrapFrame {
    TrapFrame {
        int_no: u32::from(PAGE_FAULT_VECTOR),
        err_code,
        eip,
        ..TrapFrame::default()
    }
}

#[test]
fn user_write_to_unmapped_page_is_reported() {
    let (mut mm, registry) = boot();
    mm.hardware_mut().cr2 = va(0xDEAD_0000);

    let handler = registry.handler(PAGE_FAULT_VECTOR).unwrap();
    let fatal = handler(&mut mm, &trap(0b110, 0x0010_2ABC));

    assert_eq!(
        mm.diagnostics(),
        "Page fault! ( not-present write user-mode ) at 0xDEAD0000\nEIP was 0x00102ABC\n"
    );
    let FatalError::Faulted(report) = fatal else {
        panic!("expected a fault report, got {fatal:?}");
    };
    assert_eq!(report.address, va(0xDEAD_0000));
    assert_eq!(report.eip, 0x0010_2ABC);
    assert_eq!(report.cause.explain(), "Non-present page (page not mapped)");
}

#[test]
fn protection_fault_lists_no_flags() {
    let (mut mm, registry) = boot();
    mm.hardware_mut().cr2 = va(0x0000_1000);

    let handler = registry.handler(PAGE_FAULT_VECTOR).unwrap();
    handler(&mut mm, &trap(0b001, 0xC000_0010));

    assert_eq!(
        mm.diagnostics(),
        "Page fault! ( ) at 0x00001000\nEIP was 0xC0000010\n"
    );
}

#[test]
fn reserved_and_instruction_fetch_bits_are_named() {
    let (mut mm, registry) = boot();
    mm.hardware_mut().cr2 = va(0x0804_8000);

    let handler = registry.handler(PAGE_FAULT_VECTOR).unwrap();
    handler(&mut mm, &trap(0b1_1001, 0x0804_8000));

    assert_eq!(
        mm.diagnostics(),
        "Page fault! ( reserved instruction-fetch ) at 0x08048000\nEIP was 0x08048000\n"
    );
}

#[test]
fn fault_halts_the_system() {
    let (mut mm, registry) = boot();
    mm.hardware_mut().cr2 = va(0xDEAD_0000);
    let handler = registry.handler(PAGE_FAULT_VECTOR).unwrap();
    let fatal = handler(&mut mm, &trap(0b100, 0x1000));

    assert!(mm.is_halted());
    assert_eq!(mm.state(), &SystemState::Halted(fatal));
    assert!(!mm.hardware().interrupts_enabled);

    let current = mm.active_space().unwrap();
    assert_eq!(
        mm.map_page(current, va(0x4000_0000), false, true),
        Err(VmmError::Halted(fatal))
    );
    assert_eq!(mm.clone_space(current), Err(VmmError::Halted(fatal)));
    assert_eq!(mm.diagnostics().lines().count(), 2);
}
