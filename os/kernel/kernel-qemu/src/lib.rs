//! # QEMU Debug Console Output
//!
//! Diagnostic output for a kernel running under QEMU, written byte by byte to
//! the ISA debug console port (`0x402`). Start QEMU with `-debugcon stdio` (or
//! `-debugcon file:debug.log`) to see it on the host.
//!
//! ```text
//! log::info!(..) ──► QemuLogger ──┐
//!                                 ├──► QemuSink (fmt::Write) ──► out 0x402
//! qemu_trace!(..) ────────────────┘
//! ```
//!
//! - [`QemuLogger`] implements [`log::Log`] so the rest of the kernel only
//!   talks to the `log` facade.
//! - [`QemuSink`] implements [`core::fmt::Write`] and can be handed to any
//!   code that wants a raw diagnostic sink (the paging code writes its fatal
//!   reports to one).
//! - [`qemu_trace!`] formats straight into the sink without going through
//!   `log`, which is useful before the logger is installed.
//!
//! ## Features
//!
//! `enabled` (default) compiles the port writes in. Without it, or when not
//! building for x86, every write is a silent no-op.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::{LevelFilter, info};
//!
//! static LOGGER: QemuLogger = QemuLogger::new(LevelFilter::Debug);
//!
//! LOGGER.init().ok();
//! info!("paging enabled");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::QemuLogger;
pub use qemu_fmt::QemuSink;

#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// The port number for QEMU's debug port.
    pub const QEMU_DEBUG_PORT: u16 = 0x402;

    /// Write a single byte to QEMU's debug port.
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn dbg_putc(c: u8) {
        #[cfg(all(
            feature = "enabled",
            any(target_arch = "x86", target_arch = "x86_64")
        ))]
        unsafe {
            outb(QEMU_DEBUG_PORT, c);
        }

        #[cfg(not(all(
            feature = "enabled",
            any(target_arch = "x86", target_arch = "x86_64")
        )))]
        let _ = c;
    }

    #[cfg(all(
        feature = "enabled",
        any(target_arch = "x86", target_arch = "x86_64")
    ))]
    #[allow(clippy::inline_always)]
    #[inline(always)]
    unsafe fn outb(port: u16, val: u8) {
        unsafe {
            core::arch::asm!(
            "out dx, al",
            in("dx") port,
            in("al") val,
            options(nomem, nostack, preserves_flags)
            );
        }
    }

    /// A [`fmt::Write`] sink backed by the QEMU debug port.
    ///
    /// Requires ring 0; on real hardware the port is unused and writes vanish.
    #[derive(Debug, Default, Copy, Clone)]
    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for b in s.bytes() {
                dbg_putc(b);
            }
            Ok(())
        }

        #[inline]
        fn write_char(&mut self, c: char) -> fmt::Result {
            let mut buf = [0u8; 4];
            let s = c.encode_utf8(&mut buf);
            self.write_str(s)
        }
    }

    #[doc(hidden)]
    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best-effort; the sink itself never fails.
        let _ = fmt::write(&mut QemuSink, args);
    }
}

/// Write formatted text straight to the QEMU debug port.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
