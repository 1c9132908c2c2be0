//! # Physical Frame Bitmap
//!
//! One bit per 4 KiB frame of physical memory, packed into 32-bit words:
//! bit `i % 32` of word `i / 32` is set when frame `i` is in use. The bitmap
//! is sized once and is the only record of which frames are taken.
//!
//! Allocation always picks the **lowest** free frame. During bootstrap this is
//! what makes the low-memory identity map come out as frame `i` for page `i`.

use crate::addresses::PhysicalFrame;
use crate::error::FrameExhausted;
use crate::page_table::PtEntry;
use alloc::boxed::Box;
use alloc::vec;
use log::trace;

const BITS_PER_WORD: u32 = u32::BITS;

/// Used/free state of every physical frame.
pub struct FrameBitmap {
    words: Box<[u32]>,
    frames: u32,
    used: u32,
}

impl FrameBitmap {
    /// A bitmap tracking `frames` frames, all free.
    #[must_use]
    pub fn new(frames: u32) -> Self {
        let words = vec![0u32; frames.div_ceil(BITS_PER_WORD) as usize].into_boxed_slice();
        Self {
            words,
            frames,
            used: 0,
        }
    }

    #[inline]
    const fn locate(frame: PhysicalFrame) -> (usize, u32) {
        let index = frame.index();
        ((index / BITS_PER_WORD) as usize, 1 << (index % BITS_PER_WORD))
    }

    #[inline]
    const fn in_range(&self, frame: PhysicalFrame) -> bool {
        frame.index() < self.frames
    }

    /// Mark `frame` as in use. Idempotent; frames outside the tracked range
    /// are ignored.
    pub fn mark_used(&mut self, frame: PhysicalFrame) {
        debug_assert!(self.in_range(frame), "frame {frame} outside of tracked memory");
        if !self.in_range(frame) {
            return;
        }
        let (word, mask) = Self::locate(frame);
        if self.words[word] & mask == 0 {
            self.words[word] |= mask;
            self.used += 1;
        }
    }

    /// Mark `frame` as free. Idempotent; frames outside the tracked range
    /// are ignored.
    pub fn mark_free(&mut self, frame: PhysicalFrame) {
        debug_assert!(self.in_range(frame), "frame {frame} outside of tracked memory");
        if !self.in_range(frame) {
            return;
        }
        let (word, mask) = Self::locate(frame);
        if self.words[word] & mask != 0 {
            self.words[word] &= !mask;
            self.used -= 1;
        }
    }

    #[must_use]
    pub fn is_used(&self, frame: PhysicalFrame) -> bool {
        if !self.in_range(frame) {
            return false;
        }
        let (word, mask) = Self::locate(frame);
        self.words[word] & mask != 0
    }

    /// The lowest free frame, or `None` when every frame is in use.
    #[must_use]
    pub fn find_first_free(&self) -> Option<PhysicalFrame> {
        let (word, bits) = self
            .words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != u32::MAX)?;

        #[allow(clippy::cast_possible_truncation)]
        let index = word as u32 * BITS_PER_WORD + (!bits).trailing_zeros();

        // Bits past the last frame in the final word are never handed out.
        (index < self.frames).then(|| PhysicalFrame::from_index(index))
    }

    /// Back `entry` with a fresh frame.
    ///
    /// Does nothing if the entry already names a frame. Otherwise takes the
    /// lowest free frame and sets `present`, `writable = is_writable` and
    /// `user = !is_kernel`.
    ///
    /// # Errors
    /// [`FrameExhausted`] if no frame is free; `entry` is left unchanged.
    pub fn allocate_for(
        &mut self,
        entry: &mut PtEntry,
        is_kernel: bool,
        is_writable: bool,
    ) -> Result<(), FrameExhausted> {
        if entry.is_mapped() {
            return Ok(());
        }

        let frame = self.find_first_free().ok_or(FrameExhausted)?;
        self.mark_used(frame);
        trace!("allocated frame {frame}");

        entry.set_present(true);
        entry.set_writable(is_writable);
        entry.set_user(!is_kernel);
        entry.set_frame_index(frame.index());
        Ok(())
    }

    /// Return the frame behind `entry` to the pool.
    ///
    /// Clears only the frame index; the other flags stay as they are. Does
    /// nothing if the entry has no frame.
    pub fn release(&mut self, entry: &mut PtEntry) {
        let Some(frame) = entry.frame() else {
            return;
        };
        self.mark_free(frame);
        entry.set_frame_index(0);
        trace!("released frame {frame}");
    }

    /// Number of frames tracked.
    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> u32 {
        self.frames
    }

    /// Number of frames currently in use.
    #[inline]
    #[must_use]
    pub const fn used_count(&self) -> u32 {
        self.used
    }

    #[inline]
    #[must_use]
    pub const fn free_count(&self) -> u32 {
        self.frames - self.used
    }
}

impl core::fmt::Debug for FrameBitmap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameBitmap")
            .field("frames", &self.frames)
            .field("used", &self.used)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(i: u32) -> PhysicalFrame {
        PhysicalFrame::from_index(i)
    }

    #[test]
    fn mark_and_test_every_frame() {
        let mut bitmap = FrameBitmap::new(100);
        for i in 0..100 {
            assert!(!bitmap.is_used(frame(i)));
            bitmap.mark_used(frame(i));
            assert!(bitmap.is_used(frame(i)));
            bitmap.mark_free(frame(i));
            assert!(!bitmap.is_used(frame(i)));
        }
        assert_eq!(bitmap.used_count(), 0);
    }

    #[test]
    fn marking_is_idempotent() {
        let mut bitmap = FrameBitmap::new(8);
        bitmap.mark_used(frame(3));
        bitmap.mark_used(frame(3));
        assert_eq!(bitmap.used_count(), 1);
        bitmap.mark_free(frame(3));
        bitmap.mark_free(frame(3));
        assert_eq!(bitmap.used_count(), 0);
    }

    #[test]
    fn first_free_is_lowest_clear_bit() {
        let mut bitmap = FrameBitmap::new(64);
        for i in 0..3 {
            bitmap.mark_used(frame(i));
        }
        assert_eq!(bitmap.find_first_free(), Some(frame(3)));

        bitmap.mark_free(frame(1));
        assert_eq!(bitmap.find_first_free(), Some(frame(1)));
    }

    #[test]
    fn first_free_crosses_word_boundaries() {
        let mut bitmap = FrameBitmap::new(96);
        for i in 0..40 {
            bitmap.mark_used(frame(i));
        }
        assert_eq!(bitmap.find_first_free(), Some(frame(40)));
    }

    #[test]
    fn exhaustion_is_none() {
        let mut bitmap = FrameBitmap::new(32);
        for i in 0..32 {
            bitmap.mark_used(frame(i));
        }
        assert_eq!(bitmap.find_first_free(), None);
        assert_eq!(bitmap.free_count(), 0);
    }

    #[test]
    fn tail_bits_are_never_returned() {
        // 33 frames need two words; only bit 0 of the second word is real.
        let mut bitmap = FrameBitmap::new(33);
        assert_eq!(bitmap.frame_count(), 33);
        for i in 0..33 {
            bitmap.mark_used(frame(i));
        }
        assert_eq!(bitmap.find_first_free(), None);
    }

    #[test]
    fn allocate_for_sets_flags() {
        let mut bitmap = FrameBitmap::new(16);
        bitmap.mark_used(frame(0));

        let mut entry = PtEntry::zero();
        bitmap.allocate_for(&mut entry, false, true).unwrap();
        assert!(entry.present());
        assert!(entry.writable());
        assert!(entry.user());
        assert_eq!(entry.frame_index(), 1);
        assert!(bitmap.is_used(frame(1)));
    }

    #[test]
    fn allocate_for_twice_keeps_first_frame() {
        let mut bitmap = FrameBitmap::new(16);
        bitmap.mark_used(frame(0));

        let mut entry = PtEntry::zero();
        bitmap.allocate_for(&mut entry, true, false).unwrap();
        let first = entry;
        bitmap.allocate_for(&mut entry, false, true).unwrap();

        assert_eq!(entry, first);
        assert!(!entry.user());
        assert!(!entry.writable());
        assert_eq!(bitmap.used_count(), 2);
    }

    #[test]
    fn allocate_for_on_full_bitmap_fails_without_touching_entry() {
        let mut bitmap = FrameBitmap::new(4);
        for i in 0..4 {
            bitmap.mark_used(frame(i));
        }
        let mut entry = PtEntry::zero();
        assert_eq!(bitmap.allocate_for(&mut entry, true, true), Err(FrameExhausted));
        assert_eq!(entry, PtEntry::zero());
    }

    #[test]
    fn release_clears_only_frame_index() {
        let mut bitmap = FrameBitmap::new(16);
        bitmap.mark_used(frame(0));
        let mut entry = PtEntry::zero();
        bitmap.allocate_for(&mut entry, false, true).unwrap();

        bitmap.release(&mut entry);
        assert!(!bitmap.is_used(frame(1)));
        assert_eq!(entry.frame_index(), 0);
        assert!(entry.present());
        assert!(entry.writable());
        assert!(entry.user());
    }

    #[test]
    fn release_of_unmapped_entry_is_a_no_op() {
        let mut bitmap = FrameBitmap::new(16);
        bitmap.mark_used(frame(0));
        let mut entry = PtEntry::new().with_present(true);
        bitmap.release(&mut entry);
        assert!(bitmap.is_used(frame(0)));
        assert_eq!(bitmap.used_count(), 1);
        assert!(entry.present());
    }
}
