//! Mapper implementations for NES cartridges
//!
//! The NES uses various memory mappers to expand the capabilities of the hardware.
//! This module provides implementations for mappers 000-004, which cover a large
//! percentage of the NES game library.

mod mapper000; // NROM
mod mapper001; // MMC1
mod mapper002; // UxROM
mod mapper003; // CNROM
mod mapper004; // MMC3
mod mapper005; // AxROM

pub use mapper000::Mapper000;
pub use mapper001::Mapper001;
pub use mapper002::Mapper002;
pub use mapper003::Mapper003;
pub use mapper004::Mapper004;
pub use mapper005::Mapper005;

use crate::cartridge::{Mirroring, CartridgeTrait};

/// Trait for NES mappers
pub trait Mapper: CartridgeTrait {
    /// Read from PRG ROM/RAM
    fn read_prg(&self, addr: u16) -> u8;

    /// Write to PRG ROM/RAM. `cpu_cycle` is the CPU's total elapsed-cycle
    /// count at the time of the write; mappers that need to debounce rapid
    /// writes (MMC1's serial shift register ignores a second write arriving
    /// less than two CPU cycles after the first) use it, everyone else
    /// ignores it.
    fn write_prg(&mut self, addr: u16, value: u8, cpu_cycle: u64);

    /// Read from CHR ROM/RAM
    fn read_chr(&self, addr: u16) -> u8;

    /// Write to CHR ROM/RAM
    fn write_chr(&mut self, addr: u16, value: u8);

    /// Get the current mirroring mode
    fn mirroring(&self) -> Mirroring;

    /// Check if an IRQ has been triggered
    fn irq_triggered(&self) -> bool {
        false
    }

    /// Acknowledge an IRQ
    fn acknowledge_irq(&mut self) {}

    /// Observe a PPU-side address-bus transition (every nametable,
    /// attribute, and pattern fetch the PPU performs). `ppu_cycle` is the
    /// PPU's total elapsed-dot count, used by mappers that clock an IRQ
    /// counter off the A12 address line (bit 12) to debounce spurious
    /// edges caused by sprite-pattern fetches during rendering.
    fn on_ppu_addr(&mut self, _addr: u16, _ppu_cycle: u64) {}

    /// Reset the mapper to its initial state
    fn reset(&mut self);

    /// Serialize bank-select/IRQ-counter register state (not ROM contents,
    /// which never change, but PRG RAM is included where present) for
    /// snapshotting via [`crate::registry::Snapshot`]. Mappers with no
    /// mutable state beyond ROM contents leave this at the default empty
    /// encoding.
    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Restore state previously produced by `save_state`. A short or empty
    /// `bytes` is ignored rather than panicking, so restoring a snapshot
    /// captured before a mapper gained new persistent state is a no-op
    /// instead of a crash.
    fn load_state(&mut self, _bytes: &[u8]) {}
}

/// Create a new mapper instance based on mapper number.
///
/// Returns `None` for mapper numbers this crate doesn't implement; the
/// caller (`Cartridge::new`) turns that into `ROMParseError::UnsupportedMapper`
/// rather than panicking, since an unsupported mapper is an ordinary
/// collaborator-facing error, not an internal bug.
pub fn create_mapper(
    mapper_number: u8,
    prg_rom: Vec<u8>,
    chr_rom: Vec<u8>,
    prg_ram: Vec<u8>,
    chr_ram_size: usize,
    mirroring: Mirroring,
) -> Option<Box<dyn Mapper>> {
    match mapper_number {
        0 => Some(Box::new(Mapper000::new(prg_rom, chr_rom, chr_ram_size, mirroring))),
        1 => Some(Box::new(Mapper001::new(prg_rom, chr_rom, prg_ram, mirroring))),
        2 => Some(Box::new(Mapper002::new(prg_rom, chr_rom, chr_ram_size, mirroring))),
        3 => Some(Box::new(Mapper003::new(prg_rom, chr_rom, chr_ram_size, mirroring))),
        4 => Some(Box::new(Mapper004::new(prg_rom, chr_rom, prg_ram, mirroring))),
        7 => Some(Box::new(Mapper005::new(prg_rom, chr_rom, chr_ram_size))),
        _ => None,
    }
}