//! System bus: CPU/PPU address-space routing and the owning aggregate for
//! every subsystem.
//!
//! Grounded on spec.md §2's "Bus (~2%)" component and the Design Notes'
//! redesign flag to replace the source's scattered global memory-manager
//! registrations with a single explicit aggregate owning its subsystems by
//! value, rather than the teacher's `memory.rs` (a `MemoryBus` holding raw
//! register-byte arrays with no actual wiring to `Ppu`/`Apu` state — see
//! `DESIGN.md`). Master-clock division ratios are grounded on spec.md §5's
//! NTSC/PAL/Dendy table (CPU÷12/PPU÷4, CPU÷16/PPU÷5, CPU÷15/PPU÷5).

use crate::apu::Apu;
use crate::cartridge::Cartridge;
use crate::config::SystemConfig;
use crate::controller::Controller;
use crate::frontend::{AudioSink, VideoSink};
use crate::ppu::{Ppu, TVSystem};

const RAM_SIZE: usize = 2048;

/// One in-flight OAM DMA copy, started by a `$4014` write.
struct OamDma {
    page: u8,
    index: u16,
}

/// Owns every NES subsystem and routes CPU/PPU address-space accesses
/// between them.
pub struct Bus {
    ram: [u8; RAM_SIZE],
    pub ppu: Ppu,
    pub apu: Apu,
    pub cartridge: Cartridge,
    pub controller1: Controller,
    pub controller2: Controller,
    controller2_connected: bool,

    /// Last byte placed on the CPU data bus, returned by reads from
    /// unmapped/write-only addresses (open-bus behavior).
    open_bus: u8,

    /// Total elapsed master-clock ticks, used to derive how many PPU dots
    /// (and eventually APU cycles) a CPU cycle advance is worth without
    /// accumulating rounding error on PAL's non-integer CPU:PPU ratio.
    master_cycle: u64,
    cpu_divisor: u64,
    ppu_divisor: u64,

    /// Total CPU cycles elapsed, handed to the cartridge on PRG writes
    /// (MMC1's write debounce) and usable for diagnostics.
    cpu_cycle: u64,

    oam_dma: Option<OamDma>,
    oam_dma_cycle_parity: bool,

    /// CPU cycles stolen by DMC sample fetches this step, accumulated here
    /// since the fetch happens mid-instruction (inside `advance_cpu_cycle`)
    /// but can only be charged to the CPU at the next instruction boundary,
    /// same as the OAM DMA stall above.
    dmc_stall_cycles: u32,
}

impl Bus {
    pub fn new(cartridge: Cartridge, config: &SystemConfig) -> Self {
        let (cpu_divisor, ppu_divisor) = match config.tv_system {
            TVSystem::NTSC => (12, 4),
            TVSystem::PAL => (16, 5),
            TVSystem::Dendy => (15, 5),
        };

        Bus {
            ram: [0; RAM_SIZE],
            ppu: Ppu::new(config.tv_system),
            apu: Apu::new(config.tv_system),
            cartridge,
            controller1: Controller::new(),
            controller2: Controller::new(),
            controller2_connected: config.controller2_connected,
            open_bus: 0,
            master_cycle: 0,
            cpu_divisor,
            ppu_divisor,
            cpu_cycle: 0,
            oam_dma: None,
            oam_dma_cycle_parity: false,
            dmc_stall_cycles: 0,
        }
    }

    pub fn reset(&mut self) {
        self.ram = [0; RAM_SIZE];
        self.ppu.reset();
        self.apu.reset();
        self.cartridge.reset();
        self.controller1.reset();
        self.controller2.reset();
        self.open_bus = 0;
        self.master_cycle = 0;
        self.cpu_cycle = 0;
        self.oam_dma = None;
        self.dmc_stall_cycles = 0;
    }

    pub fn cpu_cycle(&self) -> u64 {
        self.cpu_cycle
    }

    /// Total frames the PPU has completed, used by `Nes::step_frame` to
    /// detect a frame boundary.
    pub fn ppu_frame_count(&self) -> u64 {
        self.ppu.frame()
    }

    /// The 2 KiB of internal work RAM, for snapshotting.
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Restore work RAM previously captured with `ram`.
    pub fn load_ram(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(self.ram.len());
        self.ram[..len].copy_from_slice(&bytes[..len]);
    }

    /// The CPU's `IRQ` line: level, OR-wired from every producer that can
    /// assert it (APU frame sequencer, DMC sample-empty, mapper IRQ
    /// counters). The CPU polls this once per instruction boundary rather
    /// than edge-detecting it, matching real 6502 behavior.
    pub fn irq_line(&self) -> bool {
        self.apu.irq_line() || self.cartridge.irq_triggered()
    }

    /// CPU-space read. Bumps the open-bus latch for every address that
    /// actually drives the bus (PPU/APU registers leave unreadable bits as
    /// whatever was last on the bus, which several test ROMs rely on).
    pub fn cpu_read(&mut self, addr: u16) -> u8 {
        let value = match addr {
            0x0000..=0x1FFF => self.ram[(addr as usize) & 0x07FF],
            0x2000..=0x3FFF => self.ppu.read_register(addr & 0x2007, &self.cartridge, self.open_bus),
            0x4000..=0x4013 | 0x4015 => self.apu.read_register(addr),
            0x4014 => self.open_bus,
            0x4016 => (self.open_bus & 0xE0) | (self.controller1.read() & 0x01),
            0x4017 => {
                if self.controller2_connected {
                    (self.open_bus & 0xE0) | (self.controller2.read() & 0x01)
                } else {
                    self.open_bus & 0xE0
                }
            }
            0x4018..=0x401F => self.open_bus, // APU/IO test mode, not emulated
            0x4020..=0xFFFF => self.cartridge.read(addr),
        };
        self.open_bus = value;
        value
    }

    /// CPU-space write. Returns `true` if the write itself raises an NMI
    /// edge (a `$2000` write that raises NMI-enable while VBlank is already
    /// set fires immediately rather than waiting for the PPU to reach the
    /// next VBlank dot; see `Ppu::write_register`).
    pub fn cpu_write(&mut self, addr: u16, value: u8) -> bool {
        self.open_bus = value;
        match addr {
            0x0000..=0x1FFF => {
                self.ram[(addr as usize) & 0x07FF] = value;
                false
            }
            0x2000..=0x3FFF => self.ppu.write_register(addr & 0x2007, value, &self.cartridge),
            0x4000..=0x4013 | 0x4015 | 0x4017 => {
                self.apu.write_register(addr, value);
                false
            }
            0x4014 => {
                self.oam_dma = Some(OamDma { page: value, index: 0 });
                false
            }
            0x4016 => {
                self.controller1.write(value);
                self.controller2.write(value);
                false
            }
            0x4018..=0x401F => false,
            0x4020..=0xFFFF => {
                self.cartridge.write(addr, value, self.cpu_cycle);
                false
            }
        }
    }

    pub fn oam_dma_pending(&self) -> bool {
        self.oam_dma.is_some()
    }

    /// Copy one byte of a pending OAM DMA transfer. Returns `true` once the
    /// transfer has finished. The caller is responsible for charging the
    /// CPU the correct number of stall cycles (513, or 514 starting on an
    /// odd CPU cycle) — this only moves the bytes.
    pub fn service_oam_dma_byte(&mut self) -> bool {
        let Some(dma) = &mut self.oam_dma else { return true };
        let addr = (dma.page as u16) << 8 | dma.index;
        let byte = self.cpu_read(addr);
        self.ppu.write_oam_dma_byte(byte);
        dma.index += 1;
        if dma.index == 256 {
            self.oam_dma = None;
            true
        } else {
            false
        }
    }

    /// Total CPU cycles stolen by DMC sample fetches since the last call,
    /// to be charged against the instruction in progress the same way
    /// `service_oam_dma_byte`'s caller charges OAM DMA stalls.
    pub fn take_dmc_stall_cycles(&mut self) -> u32 {
        let cycles = self.dmc_stall_cycles;
        self.dmc_stall_cycles = 0;
        cycles
    }

    /// Advance the bus by one CPU cycle: clocks the APU (servicing any DMC
    /// sample-fetch request it raises against CPU address space), runs the
    /// PPU the appropriate number of dots (derived from the master-clock
    /// divisors so PAL's non-integer 16:5 ratio never drifts), and returns
    /// whether an NMI edge fired during that span.
    pub fn advance_cpu_cycle(&mut self, video: &mut dyn VideoSink, audio: &mut dyn AudioSink) -> bool {
        self.cpu_cycle += 1;
        self.oam_dma_cycle_parity = !self.oam_dma_cycle_parity;

        if let Some(addr) = self.apu.step(audio) {
            let byte = self.cpu_read(addr);
            self.apu.deliver_dmc_byte(byte);
            self.dmc_stall_cycles += 4;
        }

        let before = self.master_cycle / self.ppu_divisor;
        self.master_cycle += self.cpu_divisor;
        let after = self.master_cycle / self.ppu_divisor;

        let mut nmi = false;
        for _ in before..after {
            if self.ppu.step(&self.cartridge, video) {
                nmi = true;
            }
        }
        nmi
    }
}
