//! # Page Fault Decoding
//!
//! Everything the `#PF` handler needs: the trap frame pushed by the common
//! interrupt stub, a bitfield model of the error code, and the report written
//! before the system halts.
//!
//! No page fault is recoverable here. There is no demand paging and no
//! copy-on-write, so a fault always means a kernel or program bug.

use crate::addresses::VirtualAddress;
use bitfield_struct::bitfield;
use core::fmt;

/// Register snapshot pushed by the interrupt entry stub, in push order.
///
/// `int_no` and `err_code` are pushed by the per-vector stub; `eip` through
/// `ss` by the CPU (`useresp`/`ss` only on a privilege change).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TrapFrame {
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub int_no: u32,
    pub err_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub useresp: u32,
    pub ss: u32,
}

/// Page-fault error code layout (32-bit protected mode).
///
/// Reference: Intel SDM Vol. 3A, §6.15 "Page-Fault Exception (#PF)".
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageFaultError {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read, 1 = write.
    pub write: bool, // bit 1

    /// 0 = supervisor, 1 = user mode (CPL 3).
    pub user: bool, // bit 2

    /// 1 = reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    /// 1 = instruction fetch.
    pub instruction_fetch: bool, // bit 4

    #[bits(27)]
    __: u32,
}

/// Bit 0 of the `#PF` error code: set when the page was present.
const PRESENT_BIT: u32 = 1;

/// The decoded reasons of a page fault.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct FaultCause {
    /// The page was not present (error bit 0 clear).
    pub not_present: bool,
    /// The access was a write.
    pub write: bool,
    /// The CPU was in user mode.
    pub user_mode: bool,
    /// A reserved bit was set in a paging entry.
    pub reserved: bool,
    /// The access was an instruction fetch.
    pub instruction_fetch: bool,
}

impl FaultCause {
    /// Decode a cause bitmask with one bit per fact: bit 0 not-present,
    /// bit 1 write, bit 2 user-mode, bit 3 reserved, bit 4 instruction fetch.
    ///
    /// This differs from the hardware error code only in bit 0, which the CPU
    /// sets for a *present* page. Use [`from_error_code`](Self::from_error_code)
    /// for the raw value pushed by a `#PF`.
    #[must_use]
    pub const fn decode(cause: u32) -> Self {
        Self::from_error_code(cause ^ PRESENT_BIT)
    }

    /// Decode the raw `#PF` error code pushed by the CPU.
    #[must_use]
    pub const fn from_error_code(err_code: u32) -> Self {
        let bits = PageFaultError::from_bits(err_code);
        Self {
            not_present: !bits.present(),
            write: bits.write(),
            user_mode: bits.user(),
            reserved: bits.reserved_bit(),
            instruction_fetch: bits.instruction_fetch(),
        }
    }

    /// One-line human explanation of the most likely cause.
    #[must_use]
    pub const fn explain(&self) -> &'static str {
        if self.reserved {
            "Reserved bit set in a paging entry"
        } else if self.not_present {
            "Non-present page (page not mapped)"
        } else if self.instruction_fetch {
            "Instruction fetch from a protected page"
        } else if self.write {
            if self.user_mode {
                "User-mode write to a read-only or supervisor page"
            } else {
                "Kernel write to a read-only page"
            }
        } else if self.user_mode {
            "User-mode read of a supervisor page"
        } else {
            "Read access to protected page"
        }
    }

    fn flags(&self) -> impl Iterator<Item = &'static str> {
        [
            (self.not_present, "not-present"),
            (self.write, "write"),
            (self.user_mode, "user-mode"),
            (self.reserved, "reserved"),
            (self.instruction_fetch, "instruction-fetch"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
    }
}

/// What the page-fault handler reports before halting.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FaultReport {
    /// The faulting address (CR2).
    pub address: VirtualAddress,
    pub cause: FaultCause,
    /// Instruction pointer of the faulting instruction.
    pub eip: u32,
}

impl FaultReport {
    /// Combine the faulting address with the error code and EIP of `frame`.
    #[must_use]
    pub const fn new(address: VirtualAddress, frame: &TrapFrame) -> Self {
        Self {
            address,
            cause: FaultCause::from_error_code(frame.err_code),
            eip: frame.eip,
        }
    }
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Page fault! ( ")?;
        for flag in self.cause.flags() {
            write!(f, "{flag} ")?;
        }
        write!(f, ") at {}\nEIP was 0x{:08X}", self.address, self.eip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn write_bit_alone_is_a_write() {
        let cause = FaultCause::decode(0b10);
        assert_eq!(
            cause,
            FaultCause {
                write: true,
                ..FaultCause::default()
            }
        );
    }

    #[test]
    fn cause_bits_map_one_to_one() {
        let cause = FaultCause::decode(0b1_1111);
        assert!(cause.not_present && cause.write && cause.user_mode);
        assert!(cause.reserved && cause.instruction_fetch);
        assert_eq!(FaultCause::decode(0), FaultCause::default());
    }

    #[test]
    fn error_code_bit_0_clear_means_not_present() {
        let cause = FaultCause::from_error_code(0);
        assert!(cause.not_present);
        assert!(!cause.write && !cause.user_mode && !cause.reserved && !cause.instruction_fetch);
        assert_eq!(cause.explain(), "Non-present page (page not mapped)");

        let write = FaultCause::from_error_code(0b10);
        assert!(write.not_present && write.write);
    }

    #[test]
    fn error_code_with_all_bits_is_a_protection_fault() {
        let cause = FaultCause::from_error_code(0b1_1111);
        assert!(!cause.not_present);
        assert!(cause.write && cause.user_mode && cause.reserved && cause.instruction_fetch);
        assert_eq!(FaultCause::from_error_code(0b1_1111), FaultCause::decode(0b1_1110));
    }

    #[test]
    fn report_format() {
        let frame = TrapFrame {
            err_code: 0b110,
            eip: 0x0010_2ABC,
            int_no: 14,
            ..TrapFrame::default()
        };
        let report = FaultReport::new(VirtualAddress::new(0xDEAD_0000), &frame);
        assert_eq!(
            report.to_string(),
            "Page fault! ( not-present write user-mode ) at 0xDEAD0000\nEIP was 0x00102ABC"
        );
    }

    #[test]
    fn trap_frame_layout() {
        assert_eq!(size_of::<TrapFrame>(), 16 * 4);
        assert_eq!(core::mem::offset_of!(TrapFrame, err_code), 10 * 4);
        assert_eq!(core::mem::offset_of!(TrapFrame, eip), 11 * 4);
    }
}
