use crate::{FRAME_SHIFT, FRAME_SIZE, OFFSET_MASK, PhysicalAddress};
use core::fmt;

/// A 4 KiB physical frame, identified by its frame index.
///
/// The frame index is the unit the frame allocator tracks. The physical base
/// address is only ever derived as `index * FRAME_SIZE`.
///
/// ### Invariants
/// - `index < 2^20`, so that [`base`](Self::base) fits into 32 bits
///   (checked in debug builds).
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let frame = PhysicalFrame::from_index(3);
/// assert_eq!(frame.base(), PhysicalAddress::new(0x3000));
/// assert_eq!(PhysicalFrame::containing(PhysicalAddress::new(0x3FFF)), frame);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalFrame(u32);

impl PhysicalFrame {
    /// Largest representable frame index (20 bits).
    pub const MAX_INDEX: u32 = (1 << (32 - FRAME_SHIFT)) - 1;

    #[inline]
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        debug_assert!(index <= Self::MAX_INDEX);
        Self(index)
    }

    /// Frame that contains `addr` (aligns down to the frame boundary).
    #[inline]
    #[must_use]
    pub const fn containing(addr: PhysicalAddress) -> Self {
        Self(addr.as_u32() >> FRAME_SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Physical address of the first byte of the frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 * FRAME_SIZE)
    }

    /// Combine the frame base with an in-frame byte offset.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u32) -> PhysicalAddress {
        debug_assert!(offset <= OFFSET_MASK);
        PhysicalAddress::new(self.base().as_u32() | (offset & OFFSET_MASK))
    }
}

impl fmt::Debug for PhysicalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalFrame(#{} @ 0x{:08X})", self.0, self.base().as_u32())
    }
}

impl fmt::Display for PhysicalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
