mod common;

use common::{SimMachine, TestHeap, boot, try_boot, va};
use kernel_vmem::addresses::PhysicalFrame;
use kernel_vmem::{
    AllocError, FatalError, FrameExhausted, MemoryManager, PagingConfig, TableAllocError, VmmError,
};

fn exhaustion_site(err: VmmError) -> (AllocError, &'static str) {
    match err {
        VmmError::Halted(FatalError::Exhausted { cause, file, .. }) => (cause, file),
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[test]
fn bootstrap_runs_out_of_frames() {
    let mut heap = TestHeap::new();
    let mut machine = SimMachine::new();
    let mut diagnostics = String::new();
    // 256 frames cannot cover the identity map of the first 1 MiB and more.
    let config = PagingConfig {
        phys_memory_size: 0x0010_0000,
        ..PagingConfig::default()
    };

    let err = try_boot(config, &mut heap, &mut machine, &mut diagnostics).unwrap_err();
    let (cause, file) = exhaustion_site(err);

    assert_eq!(cause, AllocError::Frame(FrameExhausted));
    assert!(file.ends_with("bootstrap.rs"), "{file}");
    assert!(diagnostics.starts_with("PANIC(No free frames!) at "));
    assert!(diagnostics.contains("bootstrap.rs:"));
    assert_eq!(diagnostics.lines().count(), 1);
    assert!(!machine.interrupts_enabled);
    assert!(!machine.paging);
    assert_eq!(machine.cr3, None);
}

#[test]
fn bootstrap_runs_out_of_heap_for_tables() {
    let mut heap = TestHeap::with_budget(2);
    let mut machine = SimMachine::new();
    let mut diagnostics = String::new();

    let err = try_boot(PagingConfig::default(), &mut heap, &mut machine, &mut diagnostics)
        .unwrap_err();
    let (cause, _) = exhaustion_site(err);

    assert_eq!(cause, AllocError::Table(TableAllocError::OutOfMemory));
    assert!(diagnostics.starts_with("PANIC(out of memory (paging structure)) at "));
    assert!(!machine.interrupts_enabled);
}

#[test]
fn no_memory_for_the_kernel_directory() {
    let mut heap = TestHeap::with_budget(0);
    let mut machine = SimMachine::new();
    let mut diagnostics = String::new();

    let err = try_boot(PagingConfig::default(), &mut heap, &mut machine, &mut diagnostics)
        .unwrap_err();
    let (cause, file) = exhaustion_site(err);
    assert_eq!(cause, AllocError::Table(TableAllocError::OutOfMemory));
    assert!(file.ends_with("bootstrap.rs"), "{file}");
}

#[test]
fn running_out_of_frames_after_boot_halts() {
    let (mut mm, _) = boot();
    let current = mm.active_space().unwrap();
    let free = mm.frames().free_count();

    let mut mapped = 0;
    let err = loop {
        match mm.map_page(current, va(0x4000_0000 + mapped * 0x1000), false, true) {
            Ok(_) => mapped += 1,
            Err(err) => break err,
        }
    };

    assert_eq!(mapped, free);
    assert_eq!(mm.frames().free_count(), 0);
    let (cause, file) = exhaustion_site(err);
    assert_eq!(cause, AllocError::Frame(FrameExhausted));
    assert!(file.ends_with("exhaustion.rs"), "{file}");
    assert!(mm.diagnostics().starts_with("PANIC(No free frames!) at "));

    let VmmError::Halted(fatal) = err else {
        unreachable!()
    };
    assert_eq!(mm.clone_space(current), Err(err));
    assert_eq!(mm.switch_to(mm.kernel_space()), Err(VmmError::Halted(fatal)));
    assert_eq!(mm.diagnostics().lines().count(), 1);
}

#[test]
fn released_frames_are_reused_lowest_first() {
    let (mut mm, _) = boot();
    let current = mm.active_space().unwrap();

    let a = mm.map_page(current, va(0x4000_0000), false, true).unwrap();
    let b = mm.map_page(current, va(0x4000_1000), false, true).unwrap();
    let frame_a = mm.entry(a).unwrap().frame().unwrap();
    let frame_b = mm.entry(b).unwrap().frame().unwrap();
    assert_eq!(frame_b.index(), frame_a.index() + 1);

    mm.release(a).unwrap();
    assert_eq!(mm.entry(a).unwrap().frame(), None);
    assert!(mm.entry(a).unwrap().present());

    let c = mm.map_page(current, va(0x4000_2000), false, true).unwrap();
    assert_eq!(mm.entry(c).unwrap().frame(), Some(frame_a));
}

#[test]
fn allocating_an_already_backed_page_keeps_its_frame() {
    let (mut mm, _) = boot();
    let current = mm.active_space().unwrap();
    let page = mm.map_page(current, va(0x4000_0000), false, true).unwrap();
    let frame = mm.entry(page).unwrap().frame();
    let used = mm.frames().used_count();

    mm.allocate_for(page, true, false).unwrap();
    assert_eq!(mm.entry(page).unwrap().frame(), frame);
    assert!(mm.entry(page).unwrap().writable());
    assert_eq!(mm.frames().used_count(), used);
}

#[test]
fn resolve_without_create_leaves_directory_alone() {
    let (mut mm, _) = boot();
    let current = mm.active_space().unwrap();
    let tables = mm.space(current).unwrap().table_count();

    assert_eq!(mm.resolve_entry(current, va(0x8000_0000), false), Ok(None));
    assert_eq!(mm.space(current).unwrap().table_count(), tables);
    assert_eq!(
        mm.allocate_for(
            kernel_vmem::PageRef {
                space: current,
                page: va(0x8000_0000).page(),
            },
            false,
            true,
        ),
        Err(VmmError::NoTable(va(0x8000_0000)))
    );
}

#[test]
fn frame_zero_is_never_handed_out() {
    let mut mm = MemoryManager::new(
        PagingConfig::default(),
        TestHeap::new(),
        SimMachine::new(),
        String::new(),
    )
    .unwrap();
    let kernel = mm.kernel_space();
    assert!(mm.frames().is_used(PhysicalFrame::from_index(0)));
    assert_eq!(mm.frames().used_count(), 1);

    let page = mm.map_page(kernel, va(0x4000_0000), true, true).unwrap();
    let first = mm.entry(page).unwrap();
    assert_eq!(first.frame(), Some(PhysicalFrame::from_index(1)));

    mm.allocate_for(page, false, false).unwrap();
    assert_eq!(mm.entry(page).unwrap(), first);
    assert_eq!(mm.frames().used_count(), 2);
}
