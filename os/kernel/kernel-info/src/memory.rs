//! # Memory Layout

use kernel_memory_addresses::{VirtualAddress, is_frame_aligned};

/// Size of the physical memory region managed by the frame allocator.
pub const PHYS_MEMORY_SIZE: u32 = 0x0100_0000; // 16 MiB

/// Size of one physical frame / virtual page.
pub const FRAME_SIZE: u32 = kernel_memory_addresses::FRAME_SIZE;

/// Number of physical frames tracked by the frame allocator.
pub const FRAME_COUNT: u32 = PHYS_MEMORY_SIZE / FRAME_SIZE;

/// First virtual address of the kernel heap.
pub const KERNEL_HEAP_START: u32 = 0xC000_0000;

/// Size of the kernel heap region that is backed by frames at bootstrap.
pub const KERNEL_HEAP_INITIAL_SIZE: u32 = 0x0010_0000; // 1 MiB

/// Highest address the kernel heap may grow to.
pub const KERNEL_HEAP_MAX: u32 = 0xCFFF_F000;

/// Interrupt vector of the page-fault exception (`#PF`).
pub const PAGE_FAULT_VECTOR: u8 = 14;

/// Typed view of [`KERNEL_HEAP_START`].
pub const KERNEL_HEAP_START_VA: VirtualAddress = VirtualAddress::new(KERNEL_HEAP_START);

/// Value OR-ed into a page-directory slot next to a table's physical address:
/// present, writable, user-accessible.
pub const DIRECTORY_SLOT_FLAGS: u32 = 0x7;

const _: () = {
    assert!(PHYS_MEMORY_SIZE > 0);
    assert!(is_frame_aligned(PHYS_MEMORY_SIZE));
    assert!(is_frame_aligned(KERNEL_HEAP_START));
    assert!(is_frame_aligned(KERNEL_HEAP_INITIAL_SIZE));
    assert!(is_frame_aligned(KERNEL_HEAP_MAX));
    assert!(KERNEL_HEAP_START + KERNEL_HEAP_INITIAL_SIZE <= KERNEL_HEAP_MAX);
    // The heap must not overlap the identity-mapped physical range.
    assert!(KERNEL_HEAP_START >= PHYS_MEMORY_SIZE);
};
