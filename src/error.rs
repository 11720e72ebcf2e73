//! Error taxonomy for the emulation core.
//!
//! Recoverable conditions (open-bus reads, out-of-range bank selects) are
//! absorbed silently by the component that hits them and never reach this
//! module; it exists for the small set of conditions a host actually needs
//! to react to.

use thiserror::Error;

/// A snapshot of CPU state taken at the moment execution halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuSnapshot {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub p: u8,
}

/// Errors surfaced by the running emulator core, as opposed to ROM loading.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The CPU fetched an opcode with no entry in the dispatch table.
    #[error("CPU halted on unimplemented opcode ${opcode:02X} at ${pc:04X}")]
    CpuHalt { opcode: u8, pc: u16, snapshot: CpuSnapshot },
}
