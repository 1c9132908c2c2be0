//! # Address Space (32-bit, directory-rooted)
//!
//! An [`AddressSpace`] is one page directory plus the software view of the
//! page tables it references. The hardware directory only knows each table's
//! *physical* address; the software slots remember where the kernel can reach
//! the table and whether the table belongs to this space or is borrowed from
//! the kernel directory.
//!
//! ## Highlights
//!
//! - [`AddressSpace::resolve_entry`] finds the entry for a virtual address,
//!   optionally creating the page table first. It is the only place where
//!   tables are added to a directory.
//! - [`AddressSpace::translate`] walks both levels to a physical address.
//! - Cloning shares every table the kernel directory also has at the same
//!   slot and deep-copies the rest, frame contents included.
//!
//! ## Ownership
//!
//! Hardware-visible structures (the directory and its tables) come from the
//! [`KernelHeap`] because the MMU needs their physical addresses. A table
//! tagged [`TableSlot::SharedWithKernel`] is owned by the kernel directory and
//! is never freed through another space.

use crate::addresses::{PhysicalAddress, VirtualAddress};
use crate::error::{AllocError, TableAllocError};
use crate::frame_bitmap::FrameBitmap;
use crate::page_table::{
    self, ENTRIES_PER_TABLE, PageDirectory, PageTable, PdEntry, PtEntry, TableIndex,
    split_indices,
};
use crate::{KernelHeap, PagingHardware};
use alloc::boxed::Box;
use alloc::vec;
use core::fmt;
use core::ptr::NonNull;
use log::{debug, info};

/// A page table together with its physical address.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TableRef {
    table: NonNull<PageTable>,
    phys: PhysicalAddress,
}

impl TableRef {
    /// Physical address of the table, as stored in the directory.
    #[inline]
    #[must_use]
    pub const fn phys(self) -> PhysicalAddress {
        self.phys
    }

    /// Where the kernel reaches the table.
    #[inline]
    #[must_use]
    pub const fn as_ptr(self) -> *const PageTable {
        self.table.as_ptr()
    }

    /// Whether both refer to the very same table.
    #[inline]
    #[must_use]
    pub fn same_table(self, other: Self) -> bool {
        core::ptr::eq(self.as_ptr(), other.as_ptr())
    }
}

/// Software view of one populated directory slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TableSlot {
    /// The table belongs to this address space.
    Owned(TableRef),
    /// The table is the kernel directory's table at the same slot.
    SharedWithKernel(TableRef),
}

impl TableSlot {
    #[inline]
    #[must_use]
    pub const fn table(self) -> TableRef {
        match self {
            Self::Owned(t) | Self::SharedWithKernel(t) => t,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_shared(self) -> bool {
        matches!(self, Self::SharedWithKernel(_))
    }
}

/// One page directory and the page tables it references.
pub struct AddressSpace {
    directory: NonNull<PageDirectory>,
    directory_phys: PhysicalAddress,
    slots: Box<[Option<TableSlot>]>,
}

impl AddressSpace {
    /// Allocate an empty address space (zeroed directory, no tables).
    ///
    /// # Errors
    /// The heap could not provide the directory.
    pub(crate) fn new<H: KernelHeap + ?Sized>(heap: &mut H) -> Result<Self, TableAllocError> {
        let (directory, directory_phys) = page_table::alloc_zeroed::<PageDirectory, H>(heap)?;
        Ok(Self {
            directory,
            directory_phys,
            slots: vec![None; ENTRIES_PER_TABLE].into_boxed_slice(),
        })
    }

    /// Physical address of the directory; the value loaded into CR3.
    #[inline]
    #[must_use]
    pub const fn directory_physical(&self) -> PhysicalAddress {
        self.directory_phys
    }

    /// Where the kernel reaches the directory.
    #[inline]
    #[must_use]
    pub const fn directory_ptr(&self) -> *const PageDirectory {
        self.directory.as_ptr()
    }

    /// The hardware directory.
    #[inline]
    #[must_use]
    pub const fn directory(&self) -> &PageDirectory {
        // SAFETY: the directory was allocated for this space and lives until
        // `destroy` consumes it.
        unsafe { self.directory.as_ref() }
    }

    /// The table referenced by slot `index`, if any.
    #[inline]
    #[must_use]
    pub fn slot(&self, index: TableIndex) -> Option<TableSlot> {
        self.slots[index.as_usize()]
    }

    /// Number of populated directory slots.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Iterate over all populated slots.
    pub fn tables(&self) -> impl Iterator<Item = (TableIndex, TableSlot)> + '_ {
        TableIndex::all().filter_map(|i| self.slot(i).map(|s| (i, s)))
    }

    /// The page table at slot `index`, if any.
    #[must_use]
    pub fn table(&self, index: TableIndex) -> Option<&PageTable> {
        let table = self.slot(index)?.table();
        // SAFETY: tables referenced by a slot stay allocated while the slot
        // exists; shared tables outlive every space that borrows them.
        Some(unsafe { &*table.as_ptr() })
    }

    /// Copy of the entry for `va`, if its page table exists.
    #[must_use]
    pub fn entry(&self, va: VirtualAddress) -> Option<PtEntry> {
        let (t, e) = split_indices(va);
        Some(self.table(t)?.get(e))
    }

    /// The entry for `va`, if its page table exists.
    #[must_use]
    pub fn entry_mut(&mut self, va: VirtualAddress) -> Option<&mut PtEntry> {
        let (t, e) = split_indices(va);
        let table = self.slot(t)?.table();
        // SAFETY: as in `table`; `&mut self` keeps the entry exclusive for
        // the duration of the borrow.
        let table = unsafe { &mut *table.table.as_ptr() };
        Some(table.entry_mut(e))
    }

    /// Find the entry for `va`, creating its page table if `create` is set.
    ///
    /// Returns `Ok(None)` only when the table is missing and `create` is
    /// false. A new table is zeroed and linked as `phys | 0x7`.
    ///
    /// # Errors
    /// The heap could not provide a new table.
    pub fn resolve_entry<H: KernelHeap + ?Sized>(
        &mut self,
        heap: &mut H,
        va: VirtualAddress,
        create: bool,
    ) -> Result<Option<&mut PtEntry>, TableAllocError> {
        let (t, _) = split_indices(va);
        if self.slot(t).is_none() {
            if !create {
                return Ok(None);
            }
            let (table, phys) = page_table::alloc_zeroed::<PageTable, H>(heap)?;
            debug!("new page table for {} at {phys}", t.base());
            self.install(t, TableSlot::Owned(TableRef { table, phys }));
        }
        Ok(self.entry_mut(va))
    }

    /// Whether `va` falls into a table borrowed from the kernel directory.
    #[must_use]
    pub fn is_shared_at(&self, va: VirtualAddress) -> bool {
        let (t, _) = split_indices(va);
        self.slot(t).is_some_and(TableSlot::is_shared)
    }

    /// Translate `va` to a physical address, if mapped.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let frame = self.entry(va)?.frame()?;
        Some(frame.join(va.offset()))
    }

    fn install(&mut self, index: TableIndex, slot: TableSlot) {
        self.slots[index.as_usize()] = Some(slot);
        // SAFETY: see `directory`; `&mut self` makes the access exclusive.
        let directory = unsafe { self.directory.as_mut() };
        directory.set(index, PdEntry::for_table(slot.table().phys()));
    }

    /// Produce a clone of `source`.
    ///
    /// Slots whose table is the kernel's table at the same slot are shared;
    /// every other table is deep-copied with a fresh frame per mapped entry.
    ///
    /// # Errors
    /// Running out of heap or frames part way leaves the partial copy behind.
    pub(crate) fn clone_from<H, P>(
        source: &Self,
        kernel: &Self,
        frames: &mut FrameBitmap,
        heap: &mut H,
        hardware: &mut P,
    ) -> Result<Self, AllocError>
    where
        H: KernelHeap + ?Sized,
        P: PagingHardware + ?Sized,
    {
        let mut clone = Self::new(heap)?;
        info!("Physical location of new directory is {}", clone.directory_phys);

        for (index, slot) in source.tables() {
            let table = slot.table();
            let from_kernel = kernel
                .slot(index)
                .is_some_and(|k| k.table().same_table(table));

            let slot = if from_kernel {
                TableSlot::SharedWithKernel(table)
            } else {
                TableSlot::Owned(Self::clone_table(table, frames, heap, hardware)?)
            };
            clone.install(index, slot);
        }

        Ok(clone)
    }

    fn clone_table<H, P>(
        source: TableRef,
        frames: &mut FrameBitmap,
        heap: &mut H,
        hardware: &mut P,
    ) -> Result<TableRef, AllocError>
    where
        H: KernelHeap + ?Sized,
        P: PagingHardware + ?Sized,
    {
        let (table, phys) = page_table::alloc_zeroed::<PageTable, H>(heap)?;
        debug!("copying page table at {} to {phys}", source.phys);

        // SAFETY: `source` is a live table of the source space and `table`
        // is a fresh allocation, so the two never alias.
        let (from, to) = unsafe { (&*source.as_ptr(), &mut *table.as_ptr()) };

        for (src, dst) in from.entries().iter().zip(to.entries_mut().iter_mut()) {
            let Some(src_frame) = src.frame() else {
                continue;
            };
            frames.allocate_for(dst, false, false)?;
            dst.copy_access_flags(*src);
            if let Some(dst_frame) = dst.frame() {
                // SAFETY: `src_frame` is mapped by the source space and
                // `dst_frame` was just taken from the bitmap.
                unsafe { hardware.copy_page_physical(src_frame, dst_frame) };
            }
        }

        Ok(TableRef { table, phys })
    }

    /// Free every frame and table this space owns, then the directory.
    ///
    /// Tables shared with the kernel are left untouched.
    ///
    /// # Safety
    /// The directory must not be loaded in CR3 and no other space may own
    /// any of this space's tables.
    pub(crate) unsafe fn destroy<H: KernelHeap + ?Sized>(
        self,
        frames: &mut FrameBitmap,
        heap: &mut H,
    ) {
        for slot in self.slots.iter().flatten() {
            let TableSlot::Owned(table) = *slot else {
                continue;
            };
            // SAFETY: owned by this space, which is being consumed.
            let entries = unsafe { &mut *table.table.as_ptr() };
            for entry in entries.entries_mut() {
                frames.release(entry);
            }
            unsafe { page_table::free(heap, table.table, table.phys) };
        }
        unsafe { page_table::free(heap, self.directory, self.directory_phys) };
    }
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("directory", &self.directory)
            .field("directory_phys", &self.directory_phys)
            .field("tables", &self.table_count())
            .finish()
    }
}
