//! `nes_core_demo` — a small headless driver for the emulation core.
//!
//! This is not the CLI front-end spec.md §1/§6 name as an external
//! collaborator (that would own SDL2 video/audio/input and a real iNES
//! parser); it exists so the core can be exercised outside `cargo test`,
//! the way a teacher repo's `main.rs` gives a human something to run. It
//! loads a raw iNES file with its own tiny header reader (see `DESIGN.md`'s
//! Open Question decision on why this doesn't reuse the crate's
//! `#[cfg(test)]`-only decoder), runs the cartridge for a fixed number of
//! frames against `NullVideoSink`/`NullAudioSink`, and prints the final CPU
//! state.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use nes_core::cartridge::{Cartridge, CartridgeImage, Mirroring, ROMParseError};
use nes_core::config::SystemConfig;
use nes_core::frontend::{NullAudioSink, NullVideoSink};
use nes_core::nes::Nes;
use nes_core::ppu::TVSystem;

const INES_HEADER_SIZE: usize = 16;
const PRG_BANK_SIZE: usize = 16 * 1024;
const CHR_BANK_SIZE: usize = 8 * 1024;

#[derive(Parser, Debug)]
#[command(name = "nes_core_demo", about = "Headless driver for nes_core")]
struct Args {
    /// Path to an iNES (.nes) ROM image.
    rom: PathBuf,

    /// Number of frames to run before reporting final CPU state.
    #[arg(short, long, default_value_t = 60)]
    frames: u64,

    /// Force PAL timing instead of NTSC.
    #[arg(long)]
    pal: bool,
}

/// Decode the subset of the iNES header this demo needs. A real front-end
/// would also handle NES 2.0 extensions and trainers beyond loading them
/// into work RAM; this demo only needs enough to build a `CartridgeImage`.
fn decode_ines(data: &[u8]) -> Result<CartridgeImage, ROMParseError> {
    if data.len() < INES_HEADER_SIZE || data[0..4] != [0x4E, 0x45, 0x53, 0x1A] {
        return Err(ROMParseError::InvalidHeader);
    }

    let prg_rom_size = data[4] as usize * PRG_BANK_SIZE;
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
    let mapper_number = (flags7 & 0xF0) | ((flags6 >> 4) & 0x0F);
    let is_pal = (flags9 & 0x01) != 0;
    let prg_ram_size = if data[8] == 0 { 8 * 1024 } else { data[8] as usize * 8 * 1024 };

    let trainer_size = if has_trainer { 512 } else { 0 };
    let expected_size = INES_HEADER_SIZE + trainer_size + prg_rom_size + chr_rom_size;
    if data.len() < expected_size {
        return Err(ROMParseError::InvalidRomSize);
    }

    let prg_start = INES_HEADER_SIZE + trainer_size;
    let prg_rom = data[prg_start..prg_start + prg_rom_size].to_vec();
    let chr_rom = if chr_rom_size == 0 {
        Vec::new()
    } else {
        let chr_start = prg_start + prg_rom_size;
        data[chr_start..chr_start + chr_rom_size].to_vec()
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

fn run(args: Args) -> Result<(), String> {
    let data = fs::read(&args.rom).map_err(|e| format!("reading {}: {e}", args.rom.display()))?;
    let image = decode_ines(&data).map_err(|e| format!("parsing {}: {e}", args.rom.display()))?;
    info!(
        "{}: mapper {}, PRG {}KB, CHR {}KB, {:?}",
        args.rom.display(),
        image.mapper_number,
        image.prg_rom.len() / 1024,
        image.chr_rom.len().max(image.chr_ram_size) / 1024,
        image.mirroring,
    );

    let cartridge = Cartridge::new(image).map_err(|e| format!("building cartridge: {e}"))?;
    let config = SystemConfig {
        tv_system: if args.pal { TVSystem::PAL } else { TVSystem::NTSC },
        ..SystemConfig::default()
    };
    let mut nes = Nes::new(cartridge, &config);

    let mut video = NullVideoSink;
    let mut audio = NullAudioSink;
    for frame in 0..args.frames {
        if let Err(e) = nes.step_frame(&mut video, &mut audio) {
            error!("halted during frame {frame}: {e}");
            return Err(e.to_string());
        }
    }

    let cpu = nes.cpu();
    info!(
        "ran {} frames; PC=${:04X} A=${:02X} X=${:02X} Y=${:02X} SP=${:02X} P=${:02X}",
        args.frames, cpu.pc, cpu.a, cpu.x, cpu.y, cpu.sp, cpu.p
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
