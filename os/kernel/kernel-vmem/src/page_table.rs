//! # 32-bit Paging Structures
//!
//! Hardware-layout models of the two paging levels used without PAE:
//!
//! - [`pd`]: the page directory (1024 slots, each pointing at a page table).
//! - [`pt`]: the page table (1024 entries, each mapping one 4 KiB frame).
//!
//! Both are 4 KiB-aligned arrays of 32-bit entries and can be handed to the
//! MMU as-is.

use crate::KernelHeap;
use crate::addresses::{PhysicalAddress, VirtualAddress};
use crate::error::TableAllocError;
use core::ptr::NonNull;

pub mod pd;
pub mod pt;

pub use pd::{PageDirectory, PdEntry, TableIndex};
pub use pt::{EntryIndex, PageTable, PtEntry};

/// Number of slots in a page directory and of entries in a page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Split a virtual address into its directory slot and table entry.
///
/// `page = va / 4096`, `slot = page / 1024`, `entry = page % 1024`.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (TableIndex, EntryIndex) {
    (TableIndex::from(va), EntryIndex::from(va))
}

/// A page-sized paging structure the MMU reads directly.
///
/// # Safety
/// Implementors must be exactly 4096 bytes, 4096-aligned, and valid when
/// every byte is zero (zero meaning "nothing mapped").
pub unsafe trait PagingStructure: Sized {}

// SAFETY: both are `repr(C, align(4096))` arrays of 1024 transparent `u32`s.
unsafe impl PagingStructure for PageTable {}
// SAFETY: see above.
unsafe impl PagingStructure for PageDirectory {}

const _: () = {
    assert!(size_of::<PageTable>() == 4096);
    assert!(align_of::<PageTable>() == 4096);
    assert!(size_of::<PageDirectory>() == 4096);
    assert!(align_of::<PageDirectory>() == 4096);
};

/// Allocate a zeroed paging structure from the kernel heap.
///
/// Returns the writable pointer and the physical address the MMU will see.
pub(crate) fn alloc_zeroed<T: PagingStructure, H: KernelHeap + ?Sized>(
    heap: &mut H,
) -> Result<(NonNull<T>, PhysicalAddress), TableAllocError> {
    let allocation = heap
        .alloc_page_aligned(size_of::<T>())
        .ok_or(TableAllocError::OutOfMemory)?;
    debug_assert!(allocation.phys.is_aligned(), "paging structure not page aligned");
    debug_assert_eq!(allocation.virt.as_ptr() as usize % 4096, 0);

    let ptr = allocation.virt.cast::<T>();
    // SAFETY: the heap handed out `size_of::<T>()` writable, page-aligned
    // bytes; all-zero is a valid `T` per `PagingStructure`.
    unsafe {
        ptr.as_ptr().write_bytes(0, 1);
    }
    Ok((ptr, allocation.phys))
}

/// Return a paging structure obtained from [`alloc_zeroed`] to the heap.
///
/// # Safety
/// `ptr`/`phys` must come from a single earlier [`alloc_zeroed`] call on the
/// same heap, and nothing may reference the structure afterwards.
pub(crate) unsafe fn free<T: PagingStructure, H: KernelHeap + ?Sized>(
    heap: &mut H,
    ptr: NonNull<T>,
    phys: PhysicalAddress,
) {
    let allocation = crate::PhysAllocation {
        virt: ptr.cast(),
        phys,
    };
    unsafe { heap.free_page_aligned(allocation, size_of::<T>()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_follows_page_number() {
        let (t, e) = split_indices(VirtualAddress::new(0xC000_0000));
        assert_eq!(t.as_usize(), 768);
        assert_eq!(e.as_usize(), 0);

        let (t, e) = split_indices(VirtualAddress::new(0x0040_3FFF));
        assert_eq!(t.as_usize(), 1);
        assert_eq!(e.as_usize(), 3);

        let (t, e) = split_indices(VirtualAddress::new(0xFFFF_FFFF));
        assert_eq!(t.as_usize(), 1023);
        assert_eq!(e.as_usize(), 1023);
    }
}
