use crate::{FRAME_SHIFT, FRAME_SIZE, VirtualAddress};
use core::fmt;

/// A 4 KiB virtual page, identified by its page number (`address / 4096`).
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let page = VirtualAddress::new(0xC000_0FFF).page();
/// assert_eq!(page.number(), 0xC0000);
/// assert_eq!(page.base(), VirtualAddress::new(0xC000_0000));
/// assert_eq!(page.next().map(VirtualPage::number), Some(0xC0001));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(u32);

impl VirtualPage {
    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self(addr.as_u32() >> FRAME_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn from_number(number: u32) -> Self {
        debug_assert!(number < (1 << (32 - FRAME_SHIFT)));
        Self(number)
    }

    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.0 * FRAME_SIZE)
    }

    /// The following page, if the address space has one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        if self.0 < (1 << (32 - FRAME_SHIFT)) - 1 {
            Some(Self(self.0 + 1))
        } else {
            None
        }
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage(0x{:08X})", self.base().as_u32())
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.base(), f)
    }
}

impl TryFrom<VirtualAddress> for VirtualPage {
    type Error = ();

    #[inline]
    fn try_from(va: VirtualAddress) -> Result<Self, ()> {
        if va.is_aligned() {
            Ok(va.page())
        } else {
            Err(())
        }
    }
}
