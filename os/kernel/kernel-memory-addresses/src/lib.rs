//! # Virtual and Physical Memory Address Types (32-bit x86)
//!
//! Strongly typed wrappers for raw addresses, physical frames and virtual
//! pages used by the paging code.
//!
//! ## Overview
//!
//! Protected-mode x86 without PAE has a flat 32-bit physical and a flat 32-bit
//! virtual address space, both carved into 4 KiB units:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A byte address in physical memory (RAM or MMIO). |
//! | [`VirtualAddress`] | A byte address as seen by code running with paging enabled. |
//! | [`PhysicalFrame`] | A 4 KiB physical frame, named by its **index** (`address / 4096`). |
//! | [`VirtualPage`] | A 4 KiB virtual page, named by its **page number** (`address / 4096`). |
//!
//! Frames are never named by address anywhere in the paging code: the physical
//! base of a frame is always derived as `index * FRAME_SIZE`.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xC000_1234);
//! let page = va.page();
//! assert_eq!(page.base().as_u32(), 0xC000_1000);
//! assert_eq!(va.offset(), 0x234);
//!
//! let frame = PhysicalFrame::from_index(0x42);
//! assert_eq!(frame.base().as_u32(), 0x42_000);
//! assert_eq!(frame.join(va.offset()).as_u32(), 0x42_234);
//! ```
//!
//! ## Design Notes
//!
//! - All types are `#[repr(transparent)]` over `u32` and implement `Copy`,
//!   `Eq`, `Ord` and `Hash`.
//! - Conversions between the address kinds are explicit; there is no
//!   `From<VirtualAddress> for PhysicalAddress`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod physical_address;
mod physical_frame;
mod virtual_address;
mod virtual_page;

pub use physical_address::PhysicalAddress;
pub use physical_frame::PhysicalFrame;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

/// Size of a physical frame and of a virtual page, in bytes.
pub const FRAME_SIZE: u32 = 0x1000;

/// `log2(FRAME_SIZE)`: number of low address bits forming the in-page offset.
pub const FRAME_SHIFT: u32 = 12;

/// Mask selecting the in-page offset of an address.
pub const OFFSET_MASK: u32 = FRAME_SIZE - 1;

const _: () = {
    assert!(1 << FRAME_SHIFT == FRAME_SIZE);
};

/// Whether `x` lies on a frame boundary.
#[inline(always)]
#[must_use]
pub const fn is_frame_aligned(x: u32) -> bool {
    x & OFFSET_MASK == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_alignment() {
        assert!(is_frame_aligned(0));
        assert!(is_frame_aligned(0xC000_0000));
        assert!(!is_frame_aligned(0xC000_0004));
    }

    #[test]
    fn page_and_frame_agree_on_offsets() {
        let va = VirtualAddress::new(0x0040_3ABC);
        let page = va.page();
        assert_eq!(page.number(), 0x403);
        assert_eq!(page.base().as_u32() + va.offset(), va.as_u32());

        let pa = PhysicalAddress::new(0x0012_3456);
        let frame = pa.frame();
        assert_eq!(frame.index(), 0x123);
        assert_eq!(frame.join(pa.offset()), pa);
    }
}
