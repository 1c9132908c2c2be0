//! # Paging Bootstrap
//!
//! [`initialise_paging`] runs once, early, while the CPU still executes with
//! paging off and the kernel heap does not exist yet. It:
//!
//! 1. sizes the frame bitmap from the configured physical memory;
//! 2. creates the kernel directory;
//! 3. creates (but does not back) the page tables of the kernel heap;
//! 4. identity-maps low memory, from the second page up to one page past
//!    the placement end;
//! 5. backs the initial kernel heap with frames;
//! 6. installs the page-fault handler;
//! 7. switches to the kernel directory, enabling paging;
//! 8. creates the kernel heap;
//! 9. clones the kernel directory and switches to the clone.
//!
//! Creating the heap tables before the identity map matters: those tables come
//! from the placement allocator, so they must already exist when the identity
//! map decides how far low memory extends.

use crate::addresses::VirtualAddress;
use crate::config::PagingConfig;
use crate::error::{FatalError, VmmError};
use crate::fault::TrapFrame;
use crate::info::{FRAME_SIZE, PAGE_FAULT_VECTOR};
use crate::manager::MemoryManager;
use crate::{HeapRegion, KernelHeap, PagingHardware};
use core::fmt;
use log::info;

/// Handler invoked by the interrupt dispatcher for a registered vector.
pub type TrapHandler<M> = fn(&mut M, &TrapFrame) -> FatalError;

/// The interrupt dispatch table, as far as paging is concerned.
pub trait InterruptRegistry<M> {
    /// Route interrupt `vector` to `handler`.
    fn register_interrupt_handler(&mut self, vector: u8, handler: TrapHandler<M>);
}

/// Build the kernel address space, enable paging and switch to a clone of
/// the kernel directory.
///
/// # Errors
/// Every failure is fatal: the returned [`VmmError::Halted`] carries the
/// reason, which has already been written to `diagnostics`. Nothing is rolled
/// back. Exhaustion is reported at the bootstrap step that ran out.
pub fn initialise_paging<H, P, D, R>(
    config: PagingConfig,
    heap: H,
    hardware: P,
    diagnostics: D,
    registry: &mut R,
) -> Result<MemoryManager<H, P, D>, VmmError>
where
    H: KernelHeap,
    P: PagingHardware,
    D: fmt::Write,
    R: InterruptRegistry<MemoryManager<H, P, D>> + ?Sized,
{
    let mut mm = MemoryManager::new(config, heap, hardware, diagnostics)?;
    let kernel = mm.kernel_space();

    for va in pages(config.heap_start, config.heap_end()) {
        mm.ensure_entry(kernel, va)?;
    }

    // Page 0 stays unmapped: frame 0 is reserved. Each new identity table
    // moves the placement end, so re-check it on every iteration.
    let mut address = FRAME_SIZE;
    while address < mm.heap().placement_end().as_u32() + FRAME_SIZE {
        mm.map_page(kernel, VirtualAddress::new(address), true, false)?;
        address += FRAME_SIZE;
    }
    info!("identity mapped {:#010x} bytes of low memory", address);

    for va in pages(config.heap_start, config.heap_end()) {
        mm.map_page(kernel, va, true, false)?;
    }

    registry.register_interrupt_handler(
        PAGE_FAULT_VECTOR,
        MemoryManager::<H, P, D>::handle_page_fault,
    );
    info!("Finished registering handler");

    mm.switch_to(kernel)?;

    mm.heap_mut().create_heap(HeapRegion {
        start: config.heap_start,
        end: config.heap_end(),
        max: config.heap_max,
        supervisor: false,
        read_only: false,
    });

    info!("About to clone directory...");
    let current = mm.clone_space(kernel)?;
    info!("Clone complete");

    mm.switch_to(current)?;
    info!("Enabled paging");

    Ok(mm)
}

/// Page-aligned addresses in `[start, end)`.
fn pages(start: VirtualAddress, end: VirtualAddress) -> impl Iterator<Item = VirtualAddress> {
    (start.as_u32()..end.as_u32())
        .step_by(FRAME_SIZE as usize)
        .map(VirtualAddress::new)
}
