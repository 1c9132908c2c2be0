#[cfg(all(feature = "asm", target_arch = "x86"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;

/// CR0 as seen by 32-bit protected-mode code.
///
/// Only `PE`, `WP` and `PG` matter for paging; the remaining control bits
/// are modeled so that a read-modify-write cycle preserves them.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct Cr0 {
    /// Bit 0: Protection Enable (PE). Must be set before `PG`.
    pub pe_protection_enable: bool,

    /// Bit 1: Monitor Coprocessor (MP).
    pub mp_monitor_coprocessor: bool,

    /// Bit 2: Emulation (EM). No x87 present when set.
    pub em_emulation: bool,

    /// Bit 3: Task Switched (TS).
    pub ts_task_switched: bool,

    /// Bit 4: Extension Type (ET). Hardwired to 1 on anything newer than a 386.
    pub et_extension_type: bool,

    /// Bit 5: Numeric Error (NE).
    pub ne_numeric_error: bool,

    #[bits(10)]
    __reserved_6_15: u16,

    /// Bit 16: Write Protect (WP).
    ///
    /// When clear, ring 0 may write to read-only pages.
    pub wp_write_protect: bool,

    #[bits(1)]
    __reserved_17: bool,

    /// Bit 18: Alignment Mask (AM).
    pub am_alignment_mask: bool,

    #[bits(10)]
    __reserved_19_28: u16,

    /// Bit 29: Not-Write-Through (NW).
    pub nw_not_write_through: bool,

    /// Bit 30: Cache Disable (CD).
    pub cd_cache_disable: bool,

    /// Bit 31: Paging (PG).
    ///
    /// Once set, every memory access is translated through the page directory
    /// in CR3.
    pub pg_paging: bool,
}

impl Cr0 {
    /// Raw mask of the `PG` bit.
    pub const PAGING_BIT: u32 = 1 << 31;

    /// Copy of `self` with paging switched on or off; all other bits untouched.
    #[inline]
    #[must_use]
    pub const fn with_paging(self, enabled: bool) -> Self {
        self.with_pg_paging(enabled)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl LoadRegisterUnsafe for Cr0 {
    unsafe fn load_unsafe() -> Self {
        let mut cr0: u32;
        unsafe {
            core::arch::asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr0)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl StoreRegisterUnsafe for Cr0 {
    unsafe fn store_unsafe(self) {
        let cr0 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
        }
    }
}
