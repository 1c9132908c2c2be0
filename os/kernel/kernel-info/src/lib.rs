//! # Kernel Memory Layout Constants
//!
//! The single source of truth for the fixed layout the paging code is built
//! against: how much physical memory is managed, where the kernel heap lives
//! in the virtual address space, and which interrupt vector carries page
//! faults.
//!
//! ## Virtual Address Space Layout
//!
//! ```text
//! Virtual Address Space Layout (32-bit):
//!
//! 0x0000_0000     ┌─────────────────────────────────┐
//!                 │   Identity-mapped low memory    │
//!                 │ (kernel image + placement area) │
//!                 ├─────────────────────────────────┤ placement end
//!                 │                                 │
//!                 │     Unmapped / process space    │
//!                 │                                 │
//! KERNEL_HEAP_START ├───────────────────────────────┤ 0xC000_0000
//!                 │  Kernel heap (initial 1 MiB,    │
//!                 │  backed at bootstrap)           │
//!                 ├─────────────────────────────────┤ + KERNEL_HEAP_INITIAL_SIZE
//!                 │  Kernel heap growth area        │
//! KERNEL_HEAP_MAX ├─────────────────────────────────┤ 0xCFFF_F000
//!                 │           Unused                │
//! 0xFFFF_FFFF     └─────────────────────────────────┘
//! ```
//!
//! Every address space shares the page tables covering the kernel heap with
//! the kernel directory, so heap allocations made in one address space are
//! visible from all of them.
//!
//! ## Physical Memory
//!
//! Physical memory is assumed to be a single contiguous region of
//! [`PHYS_MEMORY_SIZE`](memory::PHYS_MEMORY_SIZE) bytes starting at address 0.
//! The frame allocator tracks it in [`FRAME_SIZE`](memory::FRAME_SIZE) units.
//!
//! All constants are checked against each other at compile time.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
