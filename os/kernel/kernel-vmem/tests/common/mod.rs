//! Host-side doubles of the paging seams.

#![allow(dead_code)]

use kernel_vmem::addresses::{PhysicalAddress, PhysicalFrame, VirtualAddress};
use kernel_vmem::{
    HeapRegion, InterruptRegistry, KernelHeap, MemoryManager, PagingConfig, PagingHardware,
    PhysAllocation, TrapHandler, VmmError, initialise_paging,
};
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::collections::HashMap;
use std::ptr::NonNull;

/// Where the placement allocator starts handing out memory (end of the
/// kernel image).
pub const PLACEMENT_BASE: u32 = 0x0010_0000;

/// Physical window the heap hands out after `create_heap`.
pub const HEAP_WINDOW: u32 = 0x00E0_0000;

const PAGE: usize = 4096;

/// Page-aligned host memory posing as the kernel heap.
///
/// Physical addresses come from a placement cursor until `create_heap`, and
/// from [`HEAP_WINDOW`] afterwards.
#[derive(Debug)]
pub struct TestHeap {
    placement: u32,
    window: u32,
    region: Option<HeapRegion>,
    live: Vec<(NonNull<u8>, usize)>,
    budget: Option<usize>,
    freed: Vec<PhysicalAddress>,
}

impl TestHeap {
    pub fn new() -> Self {
        Self {
            placement: PLACEMENT_BASE,
            window: HEAP_WINDOW,
            region: None,
            live: Vec::new(),
            budget: None,
            freed: Vec::new(),
        }
    }

    /// Fail every allocation after the first `allocations`.
    pub fn with_budget(allocations: usize) -> Self {
        let mut heap = Self::new();
        heap.budget = Some(allocations);
        heap
    }

    pub fn region(&self) -> Option<HeapRegion> {
        self.region
    }

    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    pub fn freed(&self) -> &[PhysicalAddress] {
        &self.freed
    }

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size.next_multiple_of(PAGE), PAGE).unwrap()
    }
}

impl KernelHeap for TestHeap {
    fn alloc_page_aligned(&mut self, size: usize) -> Option<PhysAllocation> {
        if let Some(budget) = self.budget.as_mut() {
            *budget = budget.checked_sub(1)?;
        }

        let layout = Self::layout(size);
        let virt = NonNull::new(unsafe { alloc_zeroed(layout) })?;
        let advance = u32::try_from(layout.size()).unwrap();
        let cursor = if self.region.is_some() {
            &mut self.window
        } else {
            &mut self.placement
        };
        let phys = PhysicalAddress::new(*cursor);
        *cursor += advance;

        self.live.push((virt, size));
        Some(PhysAllocation { virt, phys })
    }

    unsafe fn free_page_aligned(&mut self, allocation: PhysAllocation, size: usize) {
        let position = self
            .live
            .iter()
            .position(|(p, _)| *p == allocation.virt)
            .expect("freeing an unknown allocation");
        self.live.swap_remove(position);
        self.freed.push(allocation.phys);
        unsafe { dealloc(allocation.virt.as_ptr(), Self::layout(size)) };
    }

    fn placement_end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.placement)
    }

    fn create_heap(&mut self, region: HeapRegion) {
        assert!(self.region.is_none(), "heap created twice");
        self.region = Some(region);
    }
}

impl Drop for TestHeap {
    fn drop(&mut self) {
        for (p, size) in self.live.drain(..) {
            unsafe { dealloc(p.as_ptr(), Self::layout(size)) };
        }
    }
}

/// A CPU with control registers and sparse physical RAM.
#[derive(Debug)]
pub struct SimMachine {
    pub cr3: Option<PhysicalAddress>,
    pub cr3_history: Vec<PhysicalAddress>,
    pub paging: bool,
    pub interrupts_enabled: bool,
    pub cr2: VirtualAddress,
    pub copies: Vec<(PhysicalFrame, PhysicalFrame)>,
    ram: HashMap<u32, Box<[u8; PAGE]>>,
}

impl SimMachine {
    pub fn new() -> Self {
        Self {
            cr3: None,
            cr3_history: Vec::new(),
            paging: false,
            interrupts_enabled: true,
            cr2: VirtualAddress::zero(),
            copies: Vec::new(),
            ram: HashMap::new(),
        }
    }

    pub fn fill_frame(&mut self, frame: PhysicalFrame, byte: u8) {
        self.ram.insert(frame.index(), Box::new([byte; PAGE]));
    }

    /// Frame contents; never-written frames read as zero.
    pub fn frame(&self, frame: PhysicalFrame) -> [u8; PAGE] {
        self.ram.get(&frame.index()).map_or([0; PAGE], |f| **f)
    }
}

impl PagingHardware for SimMachine {
    unsafe fn load_page_directory(&mut self, directory: PhysicalAddress) {
        self.cr3 = Some(directory);
        self.cr3_history.push(directory);
    }

    unsafe fn enable_paging(&mut self) {
        assert!(self.cr3.is_some(), "paging enabled without a directory");
        self.paging = true;
    }

    fn fault_address(&self) -> VirtualAddress {
        self.cr2
    }

    fn disable_interrupts(&mut self) {
        self.interrupts_enabled = false;
    }

    unsafe fn copy_page_physical(&mut self, src: PhysicalFrame, dst: PhysicalFrame) {
        let contents = Box::new(self.frame(src));
        self.ram.insert(dst.index(), contents);
        self.copies.push((src, dst));
    }
}

/// Interrupt table that remembers what was installed.
pub struct RecordingRegistry<M> {
    pub handlers: Vec<(u8, TrapHandler<M>)>,
}

impl<M> Default for RecordingRegistry<M> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<M> RecordingRegistry<M> {
    pub fn handler(&self, vector: u8) -> Option<TrapHandler<M>> {
        self.handlers
            .iter()
            .rev()
            .find(|(v, _)| *v == vector)
            .map(|(_, h)| *h)
    }
}

impl<M> InterruptRegistry<M> for RecordingRegistry<M> {
    fn register_interrupt_handler(&mut self, vector: u8, handler: TrapHandler<M>) {
        self.handlers.push((vector, handler));
    }
}

pub type TestManager = MemoryManager<TestHeap, SimMachine, String>;

pub fn va(v: u32) -> VirtualAddress {
    VirtualAddress::new(v)
}

/// A manager over borrowed doubles, so they survive a failed bootstrap.
pub type BorrowedManager<'a> = MemoryManager<&'a mut TestHeap, &'a mut SimMachine, &'a mut String>;

pub fn try_boot<'a>(
    config: PagingConfig,
    heap: &'a mut TestHeap,
    machine: &'a mut SimMachine,
    diagnostics: &'a mut String,
) -> Result<BorrowedManager<'a>, VmmError> {
    let mut registry = RecordingRegistry::default();
    initialise_paging(config, heap, machine, diagnostics, &mut registry)
}

/// Boot with the default layout; panics if bootstrap fails.
pub fn boot() -> (TestManager, RecordingRegistry<TestManager>) {
    let mut registry = RecordingRegistry::default();
    let mm = initialise_paging(
        PagingConfig::default(),
        TestHeap::new(),
        SimMachine::new(),
        String::new(),
        &mut registry,
    )
    .expect("bootstrap failed");
    (mm, registry)
}
