//! # Virtual Memory Support
//!
//! The virtual-memory subsystem of a small 32-bit x86 kernel: a bitmap frame
//! allocator, two-level page directories per address space, address-space
//! switching, cloning for process creation, and page-fault reporting.
//!
//! ## What you get
//! - A [`FrameBitmap`] tracking every physical frame as used or free.
//! - Hardware-layout [`PageDirectory`] / [`PageTable`] / [`PtEntry`] types.
//! - An [`AddressSpace`] pairing a hardware directory with the software view
//!   of its tables (owned or shared with the kernel).
//! - A [`MemoryManager`] owning all of the above plus the active space.
//! - [`initialise_paging`] building the kernel directory and turning paging on.
//! - [`MemoryManager::handle_page_fault`] decoding a `#PF` trap.
//!
//! ## 32-bit Virtual Address → Physical Address Walk
//!
//! Without PAE, each 32-bit virtual address is divided into three fields:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//! ```
//!
//! ```text
//!  CR3 ──► Page Directory ──► Page Table ──► 4 KiB frame
//!          (1024 × PDE)       (1024 × PTE)
//!               │                  │
//!               │                  └───► PTE: frame index << 12 | flags
//!               └──────────────────────► PDE: table phys | 0x7
//! ```
//!
//! Each page table covers 4 MiB; a full directory covers the whole 4 GiB.
//!
//! ## Hardware seams
//!
//! Everything the subsystem needs from the outside world is behind a trait so
//! the logic runs unchanged on a host:
//!
//! | Trait | Provides |
//! |:------|:---------|
//! | [`KernelHeap`] | page-aligned memory with known physical address, placement end, heap creation |
//! | [`PagingHardware`] | CR3 load, CR0.PG, CR2, `cli`, physical frame copy |
//! | [`InterruptRegistry`] | installing the page-fault handler |
//! | [`core::fmt::Write`] | the diagnostic sink fatal reports are written to |
//!
//! On a real 32-bit target the [`x86`] module binds [`PagingHardware`] to the
//! control registers and uses the QEMU debug console as diagnostic sink.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

extern crate alloc;

pub mod address_space;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod fault;
pub mod frame_bitmap;
pub mod manager;
pub mod page_table;
#[cfg(target_arch = "x86")]
pub mod x86;

pub use kernel_memory_addresses as addresses;

/// Re-export constants as info module.
pub use kernel_info::memory as info;

pub use crate::address_space::{AddressSpace, TableRef, TableSlot};
pub use crate::bootstrap::{InterruptRegistry, TrapHandler, initialise_paging};
pub use crate::config::PagingConfig;
pub use crate::error::{
    AllocError, ConfigError, DestroyError, FatalError, FrameExhausted, TableAllocError, VmmError,
};
pub use crate::fault::{FaultCause, FaultReport, PageFaultError, TrapFrame};
pub use crate::frame_bitmap::FrameBitmap;
pub use crate::manager::{MemoryManager, PageRef, SpaceId, SystemState};
pub use crate::page_table::{PageDirectory, PageTable, PdEntry, PtEntry};

use crate::addresses::{PhysicalAddress, PhysicalFrame, VirtualAddress};
use core::ptr::NonNull;

/// A page-aligned block handed out by the [`KernelHeap`], with both of its
/// addresses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PhysAllocation {
    /// Where the kernel can read and write the block.
    pub virt: NonNull<u8>,
    /// Where the block lives in physical memory (what the MMU sees).
    pub phys: PhysicalAddress,
}

/// Parameters of the paged kernel heap created during bootstrap.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HeapRegion {
    pub start: VirtualAddress,
    pub end: VirtualAddress,
    pub max: VirtualAddress,
    /// Whether heap pages are restricted to ring 0.
    pub supervisor: bool,
    /// Whether heap pages are mapped read-only.
    pub read_only: bool,
}

/// The kernel's memory allocator, as seen by the paging code.
///
/// Before [`create_heap`](Self::create_heap) is called this is the early
/// placement allocator; afterwards it is the paged kernel heap. Either way the
/// paging code only needs page-aligned blocks whose physical address is known.
pub trait KernelHeap {
    /// Allocate `size` bytes aligned to 4 KiB.
    ///
    /// Returns `None` when out of memory. The contents are unspecified.
    fn alloc_page_aligned(&mut self, size: usize) -> Option<PhysAllocation>;

    /// Return a block from [`alloc_page_aligned`](Self::alloc_page_aligned).
    ///
    /// # Safety
    /// `allocation` and `size` must match an earlier allocation that has not
    /// been freed, and the block must no longer be referenced.
    unsafe fn free_page_aligned(&mut self, allocation: PhysAllocation, size: usize);

    /// First physical address not yet consumed by the placement allocator.
    ///
    /// Moves forward whenever the placement allocator hands out memory.
    fn placement_end(&self) -> PhysicalAddress;

    /// Switch from placement allocation to a heap over `region`.
    fn create_heap(&mut self, region: HeapRegion);
}

/// Privileged CPU operations the paging code depends on.
pub trait PagingHardware {
    /// Load CR3 with the physical address of a page directory.
    ///
    /// # Safety
    /// `directory` must be the physical address of a valid page directory
    /// that maps the currently executing code and stack.
    unsafe fn load_page_directory(&mut self, directory: PhysicalAddress);

    /// Set CR0.PG.
    ///
    /// # Safety
    /// CR3 must already hold a valid page directory.
    unsafe fn enable_paging(&mut self);

    /// The faulting linear address of the most recent page fault (CR2).
    fn fault_address(&self) -> VirtualAddress;

    /// Mask maskable interrupts (`cli`).
    fn disable_interrupts(&mut self);

    /// Copy the 4 KiB contents of frame `src` into frame `dst`.
    ///
    /// # Safety
    /// Both frames must be valid physical memory and `dst` must not be in use
    /// by anything else.
    unsafe fn copy_page_physical(&mut self, src: PhysicalFrame, dst: PhysicalFrame);
}

impl<T: KernelHeap + ?Sized> KernelHeap for &mut T {
    #[inline]
    fn alloc_page_aligned(&mut self, size: usize) -> Option<PhysAllocation> {
        (**self).alloc_page_aligned(size)
    }

    #[inline]
    unsafe fn free_page_aligned(&mut self, allocation: PhysAllocation, size: usize) {
        unsafe { (**self).free_page_aligned(allocation, size) }
    }

    #[inline]
    fn placement_end(&self) -> PhysicalAddress {
        (**self).placement_end()
    }

    #[inline]
    fn create_heap(&mut self, region: HeapRegion) {
        (**self).create_heap(region);
    }
}

impl<T: PagingHardware + ?Sized> PagingHardware for &mut T {
    #[inline]
    unsafe fn load_page_directory(&mut self, directory: PhysicalAddress) {
        unsafe { (**self).load_page_directory(directory) }
    }

    #[inline]
    unsafe fn enable_paging(&mut self) {
        unsafe { (**self).enable_paging() }
    }

    #[inline]
    fn fault_address(&self) -> VirtualAddress {
        (**self).fault_address()
    }

    #[inline]
    fn disable_interrupts(&mut self) {
        (**self).disable_interrupts();
    }

    #[inline]
    unsafe fn copy_page_physical(&mut self, src: PhysicalFrame, dst: PhysicalFrame) {
        unsafe { (**self).copy_page_physical(src, dst) }
    }
}
