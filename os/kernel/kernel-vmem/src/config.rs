//! Runtime paging configuration.

use crate::addresses::{VirtualAddress, is_frame_aligned};
use crate::error::ConfigError;
use crate::info;

/// Sizes and ranges the bootstrap sequence works with.
///
/// [`Default`] yields the layout from [`kernel_info::memory`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PagingConfig {
    /// Bytes of physical memory tracked by the frame bitmap.
    pub phys_memory_size: u32,
    /// First address of the kernel heap.
    pub heap_start: VirtualAddress,
    /// Bytes of the heap backed by frames at bootstrap.
    pub heap_initial_size: u32,
    /// Highest address the heap may grow to.
    pub heap_max: VirtualAddress,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            phys_memory_size: info::PHYS_MEMORY_SIZE,
            heap_start: info::KERNEL_HEAP_START_VA,
            heap_initial_size: info::KERNEL_HEAP_INITIAL_SIZE,
            heap_max: VirtualAddress::new(info::KERNEL_HEAP_MAX),
        }
    }
}

impl PagingConfig {
    /// Number of frames the bitmap tracks.
    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> u32 {
        self.phys_memory_size / info::FRAME_SIZE
    }

    /// One past the last byte of the initially backed heap.
    #[inline]
    #[must_use]
    pub const fn heap_end(&self) -> VirtualAddress {
        VirtualAddress::new(self.heap_start.as_u32() + self.heap_initial_size)
    }

    /// Check that all sizes are page granular and the heap range is ordered.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.phys_memory_size == 0 || !is_frame_aligned(self.phys_memory_size) {
            return Err(ConfigError::PhysicalMemorySize(self.phys_memory_size));
        }
        if !self.heap_start.is_aligned() {
            return Err(ConfigError::UnalignedHeap(self.heap_start));
        }
        if !self.heap_max.is_aligned() {
            return Err(ConfigError::UnalignedHeap(self.heap_max));
        }
        if self.heap_initial_size == 0 || !is_frame_aligned(self.heap_initial_size) {
            return Err(ConfigError::HeapRange);
        }
        match self.heap_start.checked_add(self.heap_initial_size) {
            Some(end) if end.as_u32() <= self.heap_max.as_u32() => Ok(()),
            _ => Err(ConfigError::HeapRange),
        }
    }
}
