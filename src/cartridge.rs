//! NES cartridge implementation
//!
//! This module handles cartridge memory: PRG ROM/RAM and CHR ROM/RAM banking
//! through a mapper. Parsing an iNES/NES 2.0 file into the fields below is a
//! collaborator's job (the host binary that loads a ROM file); this crate
//! only needs an already-decoded [`CartridgeImage`] to build a [`Cartridge`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use log::info;
use thiserror::Error;
use serde::{Serialize, Deserialize};

use crate::mappers::Mapper;
use crate::mappers::create_mapper;
use crate::registry::{Snapshot, StateId};

/// Errors that can occur when constructing a cartridge from a decoded image.
#[derive(Error, Debug)]
pub enum ROMParseError {
    #[error("Invalid iNES header")]
    InvalidHeader,

    #[error("Unsupported mapper: {0}")]
    UnsupportedMapper(u8),

    #[error("Invalid ROM size")]
    InvalidRomSize,
}

/// Mirroring modes for the NES
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mirroring {
    /// Horizontal mirroring (vertical arrangement of nametables)
    Horizontal,

    /// Vertical mirroring (horizontal arrangement of nametables)
    Vertical,

    /// Four-screen mirroring (no mirroring)
    FourScreen,

    /// Single-screen mirroring, lower bank
    SingleScreenLower,

    /// Single-screen mirroring, upper bank
    SingleScreenUpper,
}

/// A fully decoded cartridge image, ready to hand to [`Cartridge::new`].
///
/// Building one of these from an iNES/NES 2.0 byte stream is out of scope
/// for this crate (see `SPEC_FULL.md` appendix D); a `#[cfg(test)]`-only
/// helper exists below purely so unit tests can exercise real mapper code
/// without duplicating a byte-for-byte parser.
#[derive(Debug, Clone)]
pub struct CartridgeImage {
    pub mapper_number: u8,
    pub prg_rom: Vec<u8>,
    pub chr_rom: Vec<u8>,
    pub prg_ram_size: usize,
    pub chr_ram_size: usize,
    pub mirroring: Mirroring,
    pub has_battery: bool,
    pub is_pal: bool,
}

/// Represents an NES cartridge
pub struct Cartridge {
    /// Mapper implementation
    mapper: Rc<RefCell<Box<dyn Mapper>>>,

    /// Mirroring mode (from header, may be overridden by mapper)
    mirroring: Mirroring,

    /// Whether battery-backed RAM is present
    has_battery: bool,

    /// Whether NTSC or PAL is used
    is_pal: bool,

    /// PRG ROM size in bytes
    prg_rom_size: usize,

    /// CHR ROM size in bytes
    chr_rom_size: usize,

    /// PRG RAM size in bytes
    prg_ram_size: usize,

    /// Mapper number
    mapper_number: u8,
}

impl Cartridge {
    /// Build a cartridge from an already-decoded image.
    pub fn new(image: CartridgeImage) -> Result<Self, ROMParseError> {
        if image.prg_rom.is_empty() {
            return Err(ROMParseError::InvalidRomSize);
        }

        let prg_rom_size = image.prg_rom.len();
        let chr_rom_size = image.chr_rom.len();
        let prg_ram = vec![0; image.prg_ram_size];

        let mapper_impl = create_mapper(
            image.mapper_number,
            image.prg_rom,
            image.chr_rom,
            prg_ram,
            image.chr_ram_size,
            image.mirroring,
        )
        .ok_or(ROMParseError::UnsupportedMapper(image.mapper_number))?;

        info!(
            "Loaded cartridge - Mapper: {}, PRG ROM: {}KB, CHR: {}KB, Mirroring: {:?}, Battery: {}, TV System: {}",
            image.mapper_number,
            prg_rom_size / 1024,
            if chr_rom_size == 0 { image.chr_ram_size } else { chr_rom_size } / 1024,
            image.mirroring,
            image.has_battery,
            if image.is_pal { "PAL" } else { "NTSC" }
        );

        Ok(Cartridge {
            mapper: Rc::new(RefCell::new(mapper_impl)),
            mirroring: image.mirroring,
            has_battery: image.has_battery,
            is_pal: image.is_pal,
            prg_rom_size,
            chr_rom_size,
            prg_ram_size: image.prg_ram_size,
            mapper_number: image.mapper_number,
        })
    }

    /// Read a byte from the cartridge (CPU space)
    pub fn read(&self, addr: u16) -> u8 {
        self.mapper.borrow().read_prg(addr)
    }

    /// Write a byte to the cartridge (CPU space). `cpu_cycle` is the CPU's
    /// total elapsed-cycle count, passed through for mappers (MMC1) that
    /// debounce rapid consecutive writes.
    pub fn write(&self, addr: u16, value: u8, cpu_cycle: u64) {
        self.mapper.borrow_mut().write_prg(addr, value, cpu_cycle);
    }

    /// Read a byte from the CHR ROM/RAM (PPU space)
    pub fn read_chr(&self, addr: u16) -> u8 {
        self.mapper.borrow().read_chr(addr)
    }

    /// Write a byte to the CHR ROM/RAM (PPU space)
    pub fn write_chr(&self, addr: u16, value: u8) {
        self.mapper.borrow_mut().write_chr(addr, value);
    }

    /// Get the current mirroring mode (may be overridden by mapper)
    pub fn get_mirroring(&self) -> Mirroring {
        self.mapper.borrow().mirroring()
    }

    /// Check if the mapper has triggered an IRQ
    pub fn irq_triggered(&self) -> bool {
        self.mapper.borrow().irq_triggered()
    }

    /// Acknowledge an IRQ
    pub fn acknowledge_irq(&self) {
        self.mapper.borrow_mut().acknowledge_irq();
    }

    /// Forward a PPU-side address-bus transition to the mapper (A12-edge
    /// IRQ counters and similar).
    pub fn on_ppu_addr(&self, addr: u16, ppu_cycle: u64) {
        self.mapper.borrow_mut().on_ppu_addr(addr, ppu_cycle);
    }

    /// Get the mapper number
    pub fn mapper_number(&self) -> u8 {
        self.mapper_number
    }

    pub fn prg_rom_size(&self) -> usize {
        self.prg_rom_size
    }

    pub fn chr_rom_size(&self) -> usize {
        self.chr_rom_size
    }

    pub fn prg_ram_size(&self) -> usize {
        self.prg_ram_size
    }

    pub fn has_battery(&self) -> bool {
        self.has_battery
    }

    pub fn is_pal(&self) -> bool {
        self.is_pal
    }

    /// Reset the mapper to its power-on state
    pub fn reset(&self) {
        self.mapper.borrow_mut().reset();
    }

    /// Save the cartridge RAM to a byte vector (for battery-backed RAM).
    ///
    /// Actually persisting this to disk is the host's job; this only hands
    /// back the bytes.
    pub fn save_ram(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Load the cartridge RAM from a byte vector (for battery-backed RAM)
    pub fn load_ram(&self, data: &[u8]) {
        self.mapper.borrow_mut().load_ram(data);
    }
}

/// Delegates to the mapper's own register/IRQ-counter/PRG-RAM encoding —
/// ROM contents never change so they're not part of the blob.
impl Snapshot for Cartridge {
    fn state_id(&self) -> StateId {
        StateId::Cartridge
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.mapper.borrow().save_state()
    }

    fn load_bytes(&mut self, bytes: &[u8]) {
        self.mapper.borrow_mut().load_state(bytes);
    }
}

impl fmt::Debug for Cartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cartridge")
            .field("mapper", &self.mapper_number)
            .field("mirroring", &self.mirroring)
            .field("prg_rom_size", &self.prg_rom_size)
            .field("chr_rom_size", &self.chr_rom_size)
            .field("prg_ram_size", &self.prg_ram_size)
            .field("has_battery", &self.has_battery)
            .field("is_pal", &self.is_pal)
            .finish()
    }
}

pub trait CartridgeTrait {
    /// Load save RAM data
    fn load_ram(&mut self, _data: &[u8]) {
        // Default implementation does nothing
        // Override this in mappers that support save RAM
    }
}

/// Minimal iNES byte-stream decoder, test-only.
///
/// This exists so unit tests elsewhere in the crate can build a
/// [`CartridgeImage`] from a raw byte buffer without reimplementing mapper
/// logic by hand; it is deliberately not `pub` outside `#[cfg(test)]` and
/// does not handle trainers or NES 2.0 extensions; a real front-end ships
/// its own parser.
#[cfg(test)]
pub(crate) mod ines_test_support {
    use super::*;

    const INES_HEADER_SIZE: usize = 16;
    const PRG_ROM_BANK_SIZE: usize = 16 * 1024;
    const CHR_BANK_SIZE: usize = 8 * 1024;

    pub fn decode(data: &[u8]) -> Result<CartridgeImage, ROMParseError> {
        if data.len() < INES_HEADER_SIZE || data[0..4] != [0x4E, 0x45, 0x53, 0x1A] {
            return Err(ROMParseError::InvalidHeader);
        }

        let prg_rom_size = data[4] as usize * PRG_ROM_BANK_SIZE;
        let chr_rom_size = data[5] as usize * CHR_BANK_SIZE;

        let flags6 = data[6];
        let flags7 = data[7];
        let flags9 = data[9];

        let mirroring = if (flags6 & 0x08) != 0 {
            Mirroring::FourScreen
        } else if (flags6 & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        let has_battery = (flags6 & 0x02) != 0;
        let has_trainer = (flags6 & 0x04) != 0;

        let mapper_low = (flags6 >> 4) & 0x0F;
        let mapper_high = flags7 & 0xF0;
        let mapper_number = mapper_high | mapper_low;

        let is_pal = (flags9 & 0x01) != 0;

        let prg_ram_size = if data[8] == 0 { 8 * 1024 } else { data[8] as usize * 8 * 1024 };

        let trainer_size = if has_trainer { 512 } else { 0 };
        let expected_size = INES_HEADER_SIZE + trainer_size + prg_rom_size + chr_rom_size;
        if data.len() < expected_size {
            return Err(ROMParseError::InvalidRomSize);
        }

        let prg_rom_start = INES_HEADER_SIZE + trainer_size;
        let prg_rom_end = prg_rom_start + prg_rom_size;
        let prg_rom = data[prg_rom_start..prg_rom_end].to_vec();

        let chr_rom = if chr_rom_size == 0 {
            Vec::new()
        } else {
            let chr_rom_start = prg_rom_end;
            let chr_rom_end = chr_rom_start + chr_rom_size;
            data[chr_rom_start..chr_rom_end].to_vec()
        };

        let chr_ram_size = if chr_rom_size == 0 { 8 * 1024 } else { 0 };

        Ok(CartridgeImage {
            mapper_number,
            prg_rom,
            chr_rom,
            prg_ram_size,
            chr_ram_size,
            mirroring,
            has_battery,
            is_pal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nrom_image(prg_banks: u8) -> CartridgeImage {
        CartridgeImage {
            mapper_number: 0,
            prg_rom: vec![0u8; prg_banks as usize * 16 * 1024],
            chr_rom: vec![0u8; 8 * 1024],
            prg_ram_size: 0,
            chr_ram_size: 0,
            mirroring: Mirroring::Horizontal,
            has_battery: false,
            is_pal: false,
        }
    }

    #[test]
    fn builds_nrom_cartridge() {
        let cart = Cartridge::new(nrom_image(2)).expect("valid image");
        assert_eq!(cart.mapper_number(), 0);
        assert_eq!(cart.get_mirroring(), Mirroring::Horizontal);
    }

    #[test]
    fn rejects_unsupported_mapper() {
        let mut image = nrom_image(2);
        image.mapper_number = 200;
        let err = Cartridge::new(image).unwrap_err();
        assert!(matches!(err, ROMParseError::UnsupportedMapper(200)));
    }

    #[test]
    fn rejects_empty_prg_rom() {
        let mut image = nrom_image(2);
        image.prg_rom.clear();
        let err = Cartridge::new(image).unwrap_err();
        assert!(matches!(err, ROMParseError::InvalidRomSize));
    }

    #[test]
    fn decodes_minimal_ines_header() {
        let mut bytes = vec![0u8; 16 + 16 * 1024 + 8 * 1024];
        bytes[0..4].copy_from_slice(&[0x4E, 0x45, 0x53, 0x1A]);
        bytes[4] = 1; // 1x16KB PRG
        bytes[5] = 1; // 1x8KB CHR
        let image = ines_test_support::decode(&bytes).expect("decodes");
        assert_eq!(image.prg_rom.len(), 16 * 1024);
        assert_eq!(image.chr_rom.len(), 8 * 1024);
        assert_eq!(image.mapper_number, 0);
    }
}
