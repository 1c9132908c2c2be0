//! # Memory Manager
//!
//! The [`MemoryManager`] owns every piece of paging state: the frame bitmap,
//! all address spaces (the kernel's first), the active space, and the
//! hardware and heap seams. All mutation goes through `&mut self`, which is
//! the whole locking story on a single core.
//!
//! ## Lifecycle
//!
//! ```text
//! Running ──(page fault)──► Faulted ──► Halted
//!    │                                    ▲
//!    └──(out of frames / heap)────────────┘
//! ```
//!
//! Once halted, interrupts are off, the reason has been written to the
//! diagnostic sink, and every mutating operation fails with
//! [`VmmError::Halted`]. On real hardware the caller then spins forever.

use crate::address_space::AddressSpace;
use crate::addresses::{PhysicalAddress, PhysicalFrame, VirtualAddress, VirtualPage};
use crate::config::PagingConfig;
use crate::error::{DestroyError, FatalError, VmmError};
use crate::fault::{FaultReport, TrapFrame};
use crate::frame_bitmap::FrameBitmap;
use crate::page_table::PtEntry;
use crate::{KernelHeap, PagingHardware};
use alloc::vec::Vec;
use core::fmt;
use core::panic::Location;
use log::{error, info};

/// Handle of an address space owned by a [`MemoryManager`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SpaceId(usize);

impl SpaceId {
    /// The kernel address space, created by [`MemoryManager::new`].
    pub const KERNEL: Self = Self(0);
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A resolved page table entry: the page within a given address space.
///
/// Obtained from [`MemoryManager::resolve_entry`]; stays valid as long as
/// the address space exists.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageRef {
    pub space: SpaceId,
    pub page: VirtualPage,
}

/// Where the system is in its lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SystemState {
    Running,
    /// A page fault was taken and is being reported.
    Faulted(FaultReport),
    Halted(FatalError),
}

/// Owner of all paging state.
pub struct MemoryManager<H, P, D> {
    frames: FrameBitmap,
    spaces: Vec<Option<AddressSpace>>,
    active: Option<SpaceId>,
    heap: H,
    hardware: P,
    diagnostics: D,
    state: SystemState,
}

impl<H, P, D> MemoryManager<H, P, D>
where
    H: KernelHeap,
    P: PagingHardware,
    D: fmt::Write,
{
    /// Size the frame bitmap, reserve frame 0 and create the empty kernel
    /// directory.
    ///
    /// # Errors
    /// - [`VmmError::InvalidConfig`] if `config` does not validate.
    /// - [`VmmError::Halted`] if the heap cannot provide the kernel directory.
    #[track_caller]
    pub fn new(
        config: PagingConfig,
        heap: H,
        hardware: P,
        diagnostics: D,
    ) -> Result<Self, VmmError> {
        let caller = Location::caller();
        config.validate()?;

        let mut frames = FrameBitmap::new(config.frame_count());
        // Frame index 0 reads as "unmapped", so frame 0 is never handed out.
        frames.mark_used(PhysicalFrame::from_index(0));

        let mut manager = Self {
            frames,
            spaces: Vec::new(),
            active: None,
            heap,
            hardware,
            diagnostics,
            state: SystemState::Running,
        };
        info!(
            "tracking {} frames ({:#x} bytes of physical memory)",
            config.frame_count(),
            config.phys_memory_size
        );

        match AddressSpace::new(&mut manager.heap) {
            Ok(kernel) => {
                info!("kernel directory at {}", kernel.directory_physical());
                manager.spaces.push(Some(kernel));
                Ok(manager)
            }
            Err(e) => Err(manager.halt(FatalError::exhausted(e, caller))),
        }
    }

    /// Find the entry for `va` in `space`, creating its page table if
    /// `create` is set.
    ///
    /// Returns `Ok(None)` only when the table is missing and `create` is false.
    ///
    /// # Errors
    /// - [`VmmError::NoSuchSpace`] for an unknown handle.
    /// - [`VmmError::Halted`] if the system is halted, or halts because no
    ///   memory is left for a new table.
    #[track_caller]
    pub fn resolve_entry(
        &mut self,
        space: SpaceId,
        va: VirtualAddress,
        create: bool,
    ) -> Result<Option<PageRef>, VmmError> {
        let caller = Location::caller();
        self.ensure_running()?;
        let target = Self::space_slot(&mut self.spaces, space)?;
        let resolved = target
            .resolve_entry(&mut self.heap, va, create)
            .map(|entry| entry.is_some());
        match resolved {
            Ok(true) => Ok(Some(PageRef {
                space,
                page: va.page(),
            })),
            Ok(false) => Ok(None),
            Err(e) => Err(self.halt(FatalError::exhausted(e, caller))),
        }
    }

    /// Current value of a resolved entry.
    #[must_use]
    pub fn entry(&self, page: PageRef) -> Option<PtEntry> {
        self.space(page.space)?.entry(page.page.base())
    }

    /// Back `page` with a fresh frame; a no-op if it already has one.
    ///
    /// Sets `present`, `writable = is_writable` and `user = !is_kernel`.
    ///
    /// # Errors
    /// - [`VmmError::Halted`] if no frame is free; the reported location is
    ///   the caller's.
    /// - [`VmmError::SharedTable`] if `page` is in a kernel table and the
    ///   space is not the kernel's.
    #[track_caller]
    pub fn allocate_for(
        &mut self,
        page: PageRef,
        is_kernel: bool,
        is_writable: bool,
    ) -> Result<(), VmmError> {
        let caller = Location::caller();
        self.ensure_running()?;
        let entry = Self::private_entry(&mut self.spaces, page)?;
        match self.frames.allocate_for(entry, is_kernel, is_writable) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.halt(FatalError::exhausted(e, caller))),
        }
    }

    /// Return the frame behind `page` to the bitmap.
    ///
    /// Only the frame index is cleared. Does nothing for an unbacked page.
    ///
    /// # Errors
    /// [`VmmError::Halted`] once halted, an unknown space or table, or
    /// [`VmmError::SharedTable`] as for [`allocate_for`](Self::allocate_for).
    pub fn release(&mut self, page: PageRef) -> Result<(), VmmError> {
        self.ensure_running()?;
        let entry = Self::private_entry(&mut self.spaces, page)?;
        self.frames.release(entry);
        Ok(())
    }

    /// Resolve (creating the table if needed) and back `va` in one step.
    ///
    /// # Errors
    /// See [`resolve_entry`](Self::resolve_entry) and
    /// [`allocate_for`](Self::allocate_for).
    #[track_caller]
    pub fn map_page(
        &mut self,
        space: SpaceId,
        va: VirtualAddress,
        is_kernel: bool,
        is_writable: bool,
    ) -> Result<PageRef, VmmError> {
        let page = self.ensure_entry(space, va)?;
        self.allocate_for(page, is_kernel, is_writable)?;
        Ok(page)
    }

    /// [`resolve_entry`](Self::resolve_entry) with `create` set.
    #[track_caller]
    pub(crate) fn ensure_entry(
        &mut self,
        space: SpaceId,
        va: VirtualAddress,
    ) -> Result<PageRef, VmmError> {
        self.resolve_entry(space, va, true)?
            .ok_or(VmmError::NoTable(va))
    }

    /// Make `space` the active address space: load CR3 with its directory and
    /// set CR0.PG.
    ///
    /// # Errors
    /// [`VmmError::Halted`] once halted, or an unknown space.
    pub fn switch_to(&mut self, space: SpaceId) -> Result<(), VmmError> {
        self.ensure_running()?;
        let target = self.space(space).ok_or(VmmError::NoSuchSpace(space))?;
        let phys = target.directory_physical();
        info!("Switching paging directory to {:p}", target.directory_ptr());
        info!("Physical address is {phys}");

        self.active = Some(space);
        // SAFETY: the directory belongs to a live address space, and every
        // space shares the kernel's identity map of the running code.
        unsafe {
            self.hardware.load_page_directory(phys);
            self.hardware.enable_paging();
        }
        Ok(())
    }

    /// Create a new address space as a copy of `source`.
    ///
    /// Tables that are the kernel's own tables are shared; everything else is
    /// copied frame by frame.
    ///
    /// # Errors
    /// [`VmmError::Halted`] if frames or heap run out part way.
    #[track_caller]
    pub fn clone_space(&mut self, source: SpaceId) -> Result<SpaceId, VmmError> {
        let caller = Location::caller();
        self.ensure_running()?;

        let src = Self::lookup(&self.spaces, source)?;
        let kernel = Self::lookup(&self.spaces, SpaceId::KERNEL)?;
        info!("Cloning address space {source} (directory {})", src.directory_physical());

        let result = AddressSpace::clone_from(
            src,
            kernel,
            &mut self.frames,
            &mut self.heap,
            &mut self.hardware,
        );

        match result {
            Ok(clone) => {
                let id = self.insert_space(clone);
                info!("Clone complete: address space {id}");
                Ok(id)
            }
            Err(e) => Err(self.halt(FatalError::exhausted(e, caller))),
        }
    }

    /// Tear down a cloned address space, returning its private frames and
    /// tables. Tables shared with the kernel are left alone.
    ///
    /// # Errors
    /// The kernel space and the active space cannot be destroyed.
    pub fn destroy_space(&mut self, space: SpaceId) -> Result<(), DestroyError> {
        self.ensure_running()?;
        if space == SpaceId::KERNEL {
            return Err(DestroyError::KernelSpace);
        }
        if self.active == Some(space) {
            return Err(DestroyError::ActiveSpace(space));
        }
        let target = self
            .spaces
            .get_mut(space.0)
            .and_then(Option::take)
            .ok_or(VmmError::NoSuchSpace(space))?;

        info!("Destroying address space {space}");
        // SAFETY: not active, and owned tables are never referenced by
        // another space (only kernel tables are shared).
        unsafe { target.destroy(&mut self.frames, &mut self.heap) };
        Ok(())
    }

    /// Translate `va` through `space`.
    #[must_use]
    pub fn translate(&self, space: SpaceId, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.space(space)?.translate(va)
    }

    /// Report a page fault and halt.
    ///
    /// Reads the faulting address from CR2 and decodes the error code in
    /// `frame`. Returns the resulting fatal error; the caller must not resume
    /// the faulting context.
    pub fn handle_page_fault(&mut self, frame: &TrapFrame) -> FatalError {
        let report = FaultReport::new(self.hardware.fault_address(), frame);
        self.state = SystemState::Faulted(report);
        error!("{}", report.cause.explain());
        let fatal = FatalError::Faulted(report);
        self.halt(fatal);
        fatal
    }

    /// Enter the halted state: interrupts off, diagnostic out.
    fn halt(&mut self, fatal: FatalError) -> VmmError {
        self.hardware.disable_interrupts();
        error!("{fatal}");
        // The sink is the last resort; nothing to do if it fails too.
        let _ = writeln!(self.diagnostics, "{fatal}");
        self.state = SystemState::Halted(fatal);
        VmmError::Halted(fatal)
    }

    fn ensure_running(&self) -> Result<(), VmmError> {
        match self.state {
            SystemState::Halted(fatal) => Err(VmmError::Halted(fatal)),
            SystemState::Faulted(report) => Err(VmmError::Halted(FatalError::Faulted(report))),
            SystemState::Running => Ok(()),
        }
    }

    fn insert_space(&mut self, space: AddressSpace) -> SpaceId {
        self.spaces.push(Some(space));
        SpaceId(self.spaces.len() - 1)
    }

    fn lookup(spaces: &[Option<AddressSpace>], id: SpaceId) -> Result<&AddressSpace, VmmError> {
        spaces
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(VmmError::NoSuchSpace(id))
    }

    /// The entry behind `page`, unless it sits in a table another space
    /// only borrows from the kernel.
    fn private_entry(
        spaces: &mut [Option<AddressSpace>],
        page: PageRef,
    ) -> Result<&mut PtEntry, VmmError> {
        let space = Self::space_slot(spaces, page.space)?;
        let va = page.page.base();
        if page.space != SpaceId::KERNEL && space.is_shared_at(va) {
            return Err(VmmError::SharedTable(va));
        }
        space.entry_mut(va).ok_or(VmmError::NoTable(va))
    }

    fn space_slot(
        spaces: &mut [Option<AddressSpace>],
        id: SpaceId,
    ) -> Result<&mut AddressSpace, VmmError> {
        spaces
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(VmmError::NoSuchSpace(id))
    }
}

impl<H, P, D> MemoryManager<H, P, D> {
    /// The address space built at bootstrap.
    #[inline]
    #[must_use]
    pub const fn kernel_space(&self) -> SpaceId {
        SpaceId::KERNEL
    }

    /// The space last passed to `switch_to`, if any.
    #[inline]
    #[must_use]
    pub const fn active_space(&self) -> Option<SpaceId> {
        self.active
    }

    #[must_use]
    pub fn space(&self, id: SpaceId) -> Option<&AddressSpace> {
        self.spaces.get(id.0).and_then(Option::as_ref)
    }

    /// Number of live address spaces, the kernel's included.
    #[must_use]
    pub fn space_count(&self) -> usize {
        self.spaces.iter().flatten().count()
    }

    #[inline]
    #[must_use]
    pub const fn frames(&self) -> &FrameBitmap {
        &self.frames
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> &SystemState {
        &self.state
    }

    #[inline]
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        matches!(self.state, SystemState::Halted(_))
    }

    #[inline]
    #[must_use]
    pub const fn heap(&self) -> &H {
        &self.heap
    }

    #[inline]
    pub const fn heap_mut(&mut self) -> &mut H {
        &mut self.heap
    }

    #[inline]
    #[must_use]
    pub const fn hardware(&self) -> &P {
        &self.hardware
    }

    #[inline]
    pub const fn hardware_mut(&mut self) -> &mut P {
        &mut self.hardware
    }

    #[inline]
    #[must_use]
    pub const fn diagnostics(&self) -> &D {
        &self.diagnostics
    }
}

impl<H, P, D> fmt::Debug for MemoryManager<H, P, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryManager")
            .field("frames", &self.frames)
            .field("spaces", &self.space_count())
            .field("active", &self.active)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
