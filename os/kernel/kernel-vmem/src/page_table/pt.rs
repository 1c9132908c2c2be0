//! # Page Table (second level)
//!
//! - [`EntryIndex`]: index type for VA bits `[21:12]`.
//! - [`PtEntry`]: a page table entry mapping one 4 KiB frame.
//! - [`PageTable`]: a 4 KiB-aligned array of 1024 entries, covering 4 MiB.
//!
//! ## Semantics
//!
//! An entry whose frame index is `0` is treated as **unmapped** regardless of
//! its other bits. This is how the frame allocator and the clone logic decide
//! whether an entry owns a frame.

use crate::addresses::{PhysicalFrame, VirtualAddress};
use crate::page_table::ENTRIES_PER_TABLE;
use bitfield_struct::bitfield;

/// Index into a page table (derived from VA bits `[21:12]`).
///
/// Range is `0..1024` (checked in debug builds).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EntryIndex(u16);

impl EntryIndex {
    /// Extract the table entry index from a virtual address.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(((va.as_u32() >> 12) & 0x3FF) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES_PER_TABLE);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// A single page table entry (PTE).
///
/// Reference: Intel SDM Vol. 3A, "32-Bit Paging", Table 4-6.
#[doc(alias = "PTE")]
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PtEntry {
    /// **Present** (bit 0).
    pub present: bool,

    /// **Read/Write** (bit 1): writes allowed if set.
    pub writable: bool,

    /// **User/Supervisor** (bit 2): ring 3 may access if set.
    pub user: bool,

    /// **Page Write-Through** (bit 3).
    pub write_through: bool,

    /// **Page Cache Disable** (bit 4).
    pub cache_disabled: bool,

    /// **Accessed** (bit 5): set by the CPU on first access.
    pub accessed: bool,

    /// **Dirty** (bit 6): set by the CPU on first write.
    pub dirty: bool,

    /// **PAT** (bit 7).
    pub pat: bool,

    /// **Global** (bit 8): survives CR3 reloads when CR4.PGE is set.
    pub global: bool,

    /// **OS-available** (bits 9..11): ignored by hardware.
    #[bits(3)]
    pub available: u8,

    /// **Frame index** (bits 12..31): physical frame base >> 12.
    #[bits(20)]
    pub frame_index: u32,
}

impl PtEntry {
    /// A zero (unmapped) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new()
    }

    /// Whether the entry names a frame, i.e. has a nonzero frame index.
    #[inline]
    #[must_use]
    pub const fn is_mapped(self) -> bool {
        self.frame_index() != 0
    }

    /// The mapped frame, if any.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> Option<PhysicalFrame> {
        if self.is_mapped() {
            Some(PhysicalFrame::from_index(self.frame_index()))
        } else {
            None
        }
    }

    /// Copy `present`, `writable`, `user`, `accessed` and `dirty` from `src`.
    ///
    /// The frame index and every other bit of `self` are left untouched.
    #[inline]
    pub const fn copy_access_flags(&mut self, src: Self) {
        self.set_present(src.present());
        self.set_writable(src.writable());
        self.set_user(src.user());
        self.set_accessed(src.accessed());
        self.set_dirty(src.dirty());
    }
}

/// A page table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PtEntry; ENTRIES_PER_TABLE],
}

impl PageTable {
    /// Create a fully zeroed page table.
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PtEntry::zero(); ENTRIES_PER_TABLE],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: EntryIndex) -> PtEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: EntryIndex, e: PtEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    pub const fn entry_mut(&mut self, i: EntryIndex) -> &mut PtEntry {
        &mut self.entries[i.as_usize()]
    }

    /// All entries in index order.
    #[inline]
    #[must_use]
    pub const fn entries(&self) -> &[PtEntry; ENTRIES_PER_TABLE] {
        &self.entries
    }

    #[inline]
    pub const fn entries_mut(&mut self) -> &mut [PtEntry; ENTRIES_PER_TABLE] {
        &mut self.entries
    }

    /// Number of entries that name a frame.
    #[must_use]
    pub fn mapped_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_mapped()).count()
    }
}
