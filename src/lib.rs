//! Cycle-accurate NES emulation core.
//!
//! This crate is the emulation engine only: CPU, PPU, APU, clock/scheduler,
//! mapper family and cartridge plumbing. Loading an iNES file, driving a
//! window/audio device, and parsing CLI arguments are host concerns — see
//! [`frontend`] for the narrow capability traits a host implements instead
//! of this crate owning any of that.

pub mod apu;
pub mod apu_tables;
pub mod bus;
pub mod cartridge;
pub mod clock;
pub mod config;
pub mod controller;
pub mod cpu;
pub mod error;
pub mod frontend;
pub mod mappers;
pub mod nes;
pub mod ppu;
pub mod registry;

pub use bus::Bus;
pub use cartridge::{Cartridge, CartridgeImage, ROMParseError};
pub use config::SystemConfig;
pub use cpu::Cpu;
pub use error::CoreError;
pub use nes::Nes;
