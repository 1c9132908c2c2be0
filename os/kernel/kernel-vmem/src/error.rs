//! Error types of the paging code.
//!
//! Two layers: the low-level allocation failures ([`FrameExhausted`],
//! [`TableAllocError`]) returned by the bitmap and the address-space
//! primitives, and the [`FatalError`] the [`MemoryManager`](crate::MemoryManager)
//! turns them into before halting.

use crate::addresses::VirtualAddress;
use crate::fault::FaultReport;
use crate::manager::SpaceId;
use core::panic::Location;

/// Every frame of physical memory is in use.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("No free frames!")]
pub struct FrameExhausted;

/// The kernel heap could not provide memory for a paging structure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableAllocError {
    #[error("out of memory (paging structure)")]
    OutOfMemory,
}

/// Either kind of allocation failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error(transparent)]
    Frame(#[from] FrameExhausted),
    #[error(transparent)]
    Table(#[from] TableAllocError),
}

/// A condition the system cannot recover from.
///
/// The `Display` form is exactly what gets written to the diagnostic sink.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalError {
    /// Out of frames or out of memory for a paging structure.
    #[error("PANIC({cause}) at {file}:{line}")]
    Exhausted {
        cause: AllocError,
        file: &'static str,
        line: u32,
    },
    /// A page fault was taken.
    #[error("{0}")]
    Faulted(FaultReport),
}

impl FatalError {
    /// Exhaustion attributed to the source location `at`.
    #[must_use]
    pub fn exhausted(cause: impl Into<AllocError>, at: &'static Location<'static>) -> Self {
        Self::Exhausted {
            cause: cause.into(),
            file: at.file(),
            line: at.line(),
        }
    }
}

/// Invalid [`PagingConfig`](crate::PagingConfig).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("physical memory size must be a nonzero multiple of 4096, got {0:#x}")]
    PhysicalMemorySize(u32),
    #[error("kernel heap bound {0} is not page aligned")]
    UnalignedHeap(VirtualAddress),
    #[error("kernel heap range is empty or exceeds its maximum")]
    HeapRange,
}

/// Errors of [`MemoryManager`](crate::MemoryManager) operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmmError {
    /// The system halted, either just now or earlier.
    #[error("system halted: {0}")]
    Halted(FatalError),
    #[error("no address space {0}")]
    NoSuchSpace(SpaceId),
    #[error("no page table covers {0}")]
    NoTable(VirtualAddress),
    /// The entry lives in a kernel table this space only borrows.
    #[error("{0} is in a page table shared with the kernel")]
    SharedTable(VirtualAddress),
    #[error("invalid paging configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Errors of [`MemoryManager::destroy_space`](crate::MemoryManager::destroy_space).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DestroyError {
    #[error("the kernel address space cannot be destroyed")]
    KernelSpace,
    #[error("address space {0} is active")]
    ActiveSpace(SpaceId),
    #[error(transparent)]
    Vmm(#[from] VmmError),
}
