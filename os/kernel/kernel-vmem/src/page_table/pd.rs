//! # Page Directory (first level)
//!
//! The hardware half of an address space: 1024 slots, each holding the
//! physical address of a page table plus access bits. CR3 points here.

use crate::addresses::{PhysicalAddress, VirtualAddress};
use crate::page_table::ENTRIES_PER_TABLE;
use bitfield_struct::bitfield;
use kernel_info::memory::DIRECTORY_SLOT_FLAGS;

/// Index into the page directory (derived from VA bits `[31:22]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    /// Extract the directory slot from a virtual address.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new((va.as_u32() >> 22) as u16)
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

    /// First virtual address covered by this slot.
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new((self.0 as u32) << 22)
    }

    /// Iterate over all 1024 slots in ascending order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn all() -> impl Iterator<Item = Self> {
        (0..ENTRIES_PER_TABLE as u16).map(Self)
    }
}

/// A page directory entry (PDE) pointing at a 4 KiB page table.
#[doc(alias = "PDE")]
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PdEntry {
    /// **Present** (bit 0).
    pub present: bool,

    /// **Read/Write** (bit 1).
    pub writable: bool,

    /// **User/Supervisor** (bit 2).
    pub user: bool,

    /// **Page Write-Through** (bit 3).
    pub write_through: bool,

    /// **Page Cache Disable** (bit 4).
    pub cache_disabled: bool,

    /// **Accessed** (bit 5).
    pub accessed: bool,

    /// (bit 6): ignored.
    #[bits(1)]
    __ignored_6: u8,

    /// **Page Size** (bit 7): must be 0, no 4 MiB pages here.
    #[bits(1)]
    __ps_must_be_0: u8,

    /// (bit 8): ignored.
    #[bits(1)]
    __ignored_8: u8,

    /// **OS-available** (bits 9..11).
    #[bits(3)]
    pub available: u8,

    /// **Page table base** (bits 12..31): table physical address >> 12.
    #[bits(20)]
    table_base_4k: u32,
}

impl PdEntry {
    /// Slot value for a page table at `table_phys`: `phys | 0x7`.
    #[inline]
    #[must_use]
    pub const fn for_table(table_phys: PhysicalAddress) -> Self {
        debug_assert!(table_phys.is_aligned());
        Self::from_bits(table_phys.as_u32() | DIRECTORY_SLOT_FLAGS)
    }

    /// Physical address of the referenced page table.
    #[inline]
    #[must_use]
    pub const fn table_phys(self) -> PhysicalAddress {
        PhysicalAddress::new(self.table_base_4k() << 12)
    }
}

/// The hardware page directory: 1024 slots, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PdEntry; ENTRIES_PER_TABLE],
}

impl PageDirectory {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PdEntry::new(); ENTRIES_PER_TABLE],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PdEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }
}
