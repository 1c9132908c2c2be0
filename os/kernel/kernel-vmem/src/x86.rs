//! # Real-Target Bindings (32-bit x86)
//!
//! [`X86Paging`] implements [`PagingHardware`] on the actual control
//! registers, and the QEMU debug console serves as diagnostic sink. Kernel
//! glue typically looks like:
//!
//! ```ignore
//! let mut mm = kernel_vmem::x86::initialise_paging_or_halt(placement_heap, &mut idt);
//! // ... and from the #PF stub:
//! kernel_vmem::x86::page_fault_trap(&mut mm, &frame);
//! ```

use crate::addresses::{PhysicalAddress, PhysicalFrame, VirtualAddress};
use crate::bootstrap::{InterruptRegistry, initialise_paging};
use crate::config::PagingConfig;
use crate::fault::TrapFrame;
use crate::manager::MemoryManager;
use crate::{KernelHeap, PagingHardware};
use kernel_qemu::QemuSink;
use kernel_registers::cr0::Cr0;
use kernel_registers::cr2::Cr2;
use kernel_registers::cr3::Cr3;
use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

/// The memory manager as wired up on real hardware.
pub type KernelMemoryManager<H> = MemoryManager<H, X86Paging, QemuSink>;

/// [`PagingHardware`] backed by CR0/CR2/CR3.
#[derive(Debug, Default, Copy, Clone)]
pub struct X86Paging;

impl PagingHardware for X86Paging {
    unsafe fn load_page_directory(&mut self, directory: PhysicalAddress) {
        unsafe { Cr3::from_directory_phys(directory, false, false).store_unsafe() }
    }

    unsafe fn enable_paging(&mut self) {
        unsafe {
            let cr0 = Cr0::load_unsafe();
            cr0.with_paging(true).store_unsafe();
        }
    }

    fn fault_address(&self) -> VirtualAddress {
        // SAFETY: ring 0; reading CR2 has no side effects.
        unsafe { Cr2::load_unsafe() }.fault_address()
    }

    fn disable_interrupts(&mut self) {
        unsafe {
            core::arch::asm!("cli", options(nomem, nostack));
        }
    }

    /// Copies with paging briefly disabled, so both frames are addressed
    /// physically. Interrupts are masked for the duration.
    unsafe fn copy_page_physical(&mut self, src: PhysicalFrame, dst: PhysicalFrame) {
        let src = src.base().as_u32();
        let dst = dst.base().as_u32();
        unsafe {
            core::arch::asm!(
                "pushfd",
                "cli",
                "mov {tmp}, cr0",
                "and {tmp}, 0x7fffffff",
                "mov cr0, {tmp}",
                "2:",
                "mov {tmp}, [{src}]",
                "mov [{dst}], {tmp}",
                "add {src}, 4",
                "add {dst}, 4",
                "dec {count}",
                "jnz 2b",
                "mov {tmp}, cr0",
                "or {tmp}, 0x80000000",
                "mov cr0, {tmp}",
                "popfd",
                tmp = out(reg) _,
                src = inout(reg) src => _,
                dst = inout(reg) dst => _,
                count = inout(reg) 1024u32 => _,
            );
        }
    }
}

/// Disable interrupts and stop the CPU for good.
pub fn halt_forever() -> ! {
    loop {
        unsafe {
            core::arch::asm!("cli", "hlt", options(nomem, nostack));
        }
    }
}

/// Run the bootstrap sequence with the default layout; halt on failure.
pub fn initialise_paging_or_halt<H, R>(heap: H, registry: &mut R) -> KernelMemoryManager<H>
where
    H: KernelHeap,
    R: InterruptRegistry<KernelMemoryManager<H>> + ?Sized,
{
    match initialise_paging(PagingConfig::default(), heap, X86Paging, QemuSink, registry) {
        Ok(mm) => mm,
        Err(_) => halt_forever(),
    }
}

/// Entry point for the `#PF` stub: report and never return.
pub fn page_fault_trap<H: KernelHeap>(mm: &mut KernelMemoryManager<H>, frame: &TrapFrame) -> ! {
    mm.handle_page_fault(frame);
    halt_forever()
}
