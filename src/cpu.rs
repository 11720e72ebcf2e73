//! 6502-family CPU (Ricoh 2A03, no decimal mode; the APU/controller ports
//! it can see are owned by [`crate::bus::Bus`], not this struct).
//!
//! Grounded on the teacher's `nes_cpu.rs` for register/flag layout and
//! general doc style (kept, generalized to the full opcode table) and
//! `cpu.h`/`cpu.cpp` in `examples/original_source/trunk/nes` for addressing
//! mode and undocumented-opcode semantics; neither teacher file covered the
//! full 256-entry dispatch or the interrupt-poll timing spec.md §4.2 calls
//! for, so the dispatch table and interrupt sequencing here are written
//! fresh against spec.md. `nes_cpu.rs` and the teacher's separate,
//! even-more-partial `cpu.rs` are both superseded by this file (see
//! `DESIGN.md`).
//!
//! Executes one whole instruction per [`Cpu::step`] call rather than
//! modelling individual bus cycles within an instruction (spec.md's
//! redesign away from the source's micro-op loop); interrupts are polled
//! once at the instruction boundary, which is indistinguishable from
//! cycle-exact polling for edge-triggered NMI and level-triggered IRQ at
//! this granularity (see `DESIGN.md`'s Open Question decision). A handful
//! of unstable/rarely-used undocumented opcodes (`SHA`, `TAS`, `LAS`,
//! `XAA`, ...) are intentionally left unimplemented; hitting one halts the
//! CPU the same way a genuinely unassigned opcode would.

use crate::bus::Bus;
use crate::error::{CoreError, CpuSnapshot};
use crate::registry::{Snapshot, StateId};

pub const FLAG_C: u8 = 0x01;
pub const FLAG_Z: u8 = 0x02;
pub const FLAG_I: u8 = 0x04;
pub const FLAG_D: u8 = 0x08;
pub const FLAG_B: u8 = 0x10;
pub const FLAG_U: u8 = 0x20;
pub const FLAG_V: u8 = 0x40;
pub const FLAG_N: u8 = 0x80;

const STACK_BASE: u16 = 0x0100;
const NMI_VECTOR: u16 = 0xFFFA;
const RESET_VECTOR: u16 = 0xFFFC;
const IRQ_VECTOR: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressingMode {
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    IndirectX,
    IndirectY,
    Indirect,
    Relative,
}

/// The resolved operand for one instruction.
enum Operand {
    Address(u16),
    Accumulator,
}

pub struct Cpu {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub p: u8,

    /// Set by the owning [`crate::nes::Nes`] whenever the PPU reports an
    /// NMI edge; consumed (and cleared) the next time interrupts are
    /// polled, so it survives even if the caller doesn't poll immediately.
    nmi_pending: bool,

    /// Set for exactly one `step` call after executing `CLI`/`SEI`/`PLP`/
    /// `RTI`, suppressing the IRQ poll for that one instruction (the real
    /// CPU delays the I-flag's effect on interrupt dispatch by one
    /// instruction).
    suppress_irq_poll: bool,

    halted: Option<(u8, u16)>,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            pc: 0,
            p: FLAG_U | FLAG_I,
            nmi_pending: false,
            suppress_irq_poll: false,
            halted: None,
        }
    }

    pub fn reset(&mut self, bus: &mut Bus) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFD;
        self.p = FLAG_U | FLAG_I;
        self.pc = self.read_u16(bus, RESET_VECTOR);
        self.nmi_pending = false;
        self.suppress_irq_poll = false;
        self.halted = None;
    }

    /// Latch an NMI edge, to be serviced the next time interrupts are
    /// polled.
    pub fn request_nmi(&mut self) {
        self.nmi_pending = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    fn snapshot_now(&self) -> CpuSnapshot {
        CpuSnapshot { pc: self.pc, a: self.a, x: self.x, y: self.y, sp: self.sp, p: self.p }
    }

    /// Run one whole instruction (servicing any pending OAM DMA and
    /// interrupt dispatch first) and return the number of CPU cycles it
    /// consumed.
    pub fn step(&mut self, bus: &mut Bus) -> Result<u32, CoreError> {
        if let Some((opcode, pc)) = self.halted {
            return Err(CoreError::CpuHalt { opcode, pc, snapshot: self.snapshot_now() });
        }

        let mut cycles = 0u32;

        if bus.oam_dma_pending() {
            let odd_cycle = bus.cpu_cycle() % 2 == 1;
            while !bus.service_oam_dma_byte() {}
            cycles += if odd_cycle { 514 } else { 513 };
        }

        let interrupt_cycles = self.poll_interrupts(bus);
        if interrupt_cycles > 0 {
            return Ok(cycles + interrupt_cycles);
        }

        let opcode = self.fetch_u8(bus);
        let instruction_cycles = self.execute(bus, opcode)?;
        Ok(cycles + instruction_cycles)
    }

    fn poll_interrupts(&mut self, bus: &mut Bus) -> u32 {
        if self.nmi_pending {
            self.nmi_pending = false;
            self.service_interrupt(bus, NMI_VECTOR);
            return 7;
        }

        if self.suppress_irq_poll {
            self.suppress_irq_poll = false;
            return 0;
        }

        if bus.irq_line() && (self.p & FLAG_I) == 0 {
            self.service_interrupt(bus, IRQ_VECTOR);
            return 7;
        }

        0
    }

    fn service_interrupt(&mut self, bus: &mut Bus, vector: u16) {
        let pc = self.pc;
        self.push_u16(bus, pc);
        let status = (self.p & !FLAG_B) | FLAG_U;
        self.push_u8(bus, status);
        self.p |= FLAG_I;
        self.pc = self.read_u16(bus, vector);
    }

    // -- bus helpers -----------------------------------------------------

    fn fetch_u8(&mut self, bus: &mut Bus) -> u8 {
        let value = bus.cpu_read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    fn fetch_u16(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.fetch_u8(bus) as u16;
        let hi = self.fetch_u8(bus) as u16;
        (hi << 8) | lo
    }

    fn read_u16(&self, bus: &mut Bus, addr: u16) -> u16 {
        let lo = bus.cpu_read(addr) as u16;
        let hi = bus.cpu_read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// Emulates the 6502's page-wrap bug for indirect addressing: reading
    /// the high byte from `($xxFF)` wraps within the same page rather than
    /// crossing into the next one.
    fn read_u16_bugged(&self, bus: &mut Bus, addr: u16) -> u16 {
        let lo = bus.cpu_read(addr) as u16;
        let hi_addr = (addr & 0xFF00) | (addr.wrapping_add(1) & 0x00FF);
        let hi = bus.cpu_read(hi_addr) as u16;
        (hi << 8) | lo
    }

    fn push_u8(&mut self, bus: &mut Bus, value: u8) {
        // Stack writes never land in PPU register space, so this can't raise
        // an NMI edge; the return value is intentionally unused.
        let _ = bus.cpu_write(STACK_BASE + self.sp as u16, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop_u8(&mut self, bus: &mut Bus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.cpu_read(STACK_BASE + self.sp as u16)
    }

    fn push_u16(&mut self, bus: &mut Bus, value: u16) {
        self.push_u8(bus, (value >> 8) as u8);
        self.push_u8(bus, (value & 0xFF) as u8);
    }

    fn pop_u16(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.pop_u8(bus) as u16;
        let hi = self.pop_u8(bus) as u16;
        (hi << 8) | lo
    }

    // -- flags -------------------------------------------------------------

    fn set_zn(&mut self, value: u8) {
        self.set_flag(FLAG_Z, value == 0);
        self.set_flag(FLAG_N, (value & 0x80) != 0);
    }

    fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.p |= flag;
        } else {
            self.p &= !flag;
        }
    }

    fn flag(&self, flag: u8) -> bool {
        (self.p & flag) != 0
    }

    // -- addressing ----------------------------------------------------------

    /// Resolve an operand, fetching any operand bytes from `pc` as needed.
    /// Returns the operand plus whether resolving it crossed a page
    /// boundary (an extra cycle on most indexed reads).
    fn resolve(&mut self, bus: &mut Bus, mode: AddressingMode) -> (Operand, bool) {
        match mode {
            AddressingMode::Accumulator => (Operand::Accumulator, false),
            AddressingMode::Immediate => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                (Operand::Address(addr), false)
            }
            AddressingMode::ZeroPage => {
                let addr = self.fetch_u8(bus) as u16;
                (Operand::Address(addr), false)
            }
            AddressingMode::ZeroPageX => {
                let base = self.fetch_u8(bus);
                (Operand::Address(base.wrapping_add(self.x) as u16), false)
            }
            AddressingMode::ZeroPageY => {
                let base = self.fetch_u8(bus);
                (Operand::Address(base.wrapping_add(self.y) as u16), false)
            }
            AddressingMode::Absolute => {
                let addr = self.fetch_u16(bus);
                (Operand::Address(addr), false)
            }
            AddressingMode::AbsoluteX => {
                let base = self.fetch_u16(bus);
                let addr = base.wrapping_add(self.x as u16);
                (Operand::Address(addr), page_crossed(base, addr))
            }
            AddressingMode::AbsoluteY => {
                let base = self.fetch_u16(bus);
                let addr = base.wrapping_add(self.y as u16);
                (Operand::Address(addr), page_crossed(base, addr))
            }
            AddressingMode::IndirectX => {
                let base = self.fetch_u8(bus).wrapping_add(self.x);
                let addr = self.read_u16_bugged(bus, base as u16);
                (Operand::Address(addr), false)
            }
            AddressingMode::IndirectY => {
                let base = self.fetch_u8(bus);
                let pointer = self.read_u16_bugged(bus, base as u16);
                let addr = pointer.wrapping_add(self.y as u16);
                (Operand::Address(addr), page_crossed(pointer, addr))
            }
            AddressingMode::Indirect => {
                let pointer = self.fetch_u16(bus);
                let addr = self.read_u16_bugged(bus, pointer);
                (Operand::Address(addr), false)
            }
            AddressingMode::Relative => {
                let offset = self.fetch_u8(bus) as i8;
                let addr = (self.pc as i32 + offset as i32) as u16;
                (Operand::Address(addr), false)
            }
        }
    }

    fn read_operand(&mut self, bus: &mut Bus, operand: &Operand) -> u8 {
        match operand {
            Operand::Accumulator => self.a,
            Operand::Address(addr) => bus.cpu_read(*addr),
        }
    }

    fn write_operand(&mut self, bus: &mut Bus, operand: &Operand, value: u8) {
        match operand {
            Operand::Accumulator => self.a = value,
            Operand::Address(addr) => {
                if bus.cpu_write(*addr, value) {
                    self.request_nmi();
                }
            }
        }
    }

    // -- instruction execution ---------------------------------------------

    fn execute(&mut self, bus: &mut Bus, opcode: u8) -> Result<u32, CoreError> {
        use AddressingMode::*;

        macro_rules! op {
            ($mode:expr, $base:expr, $page_penalty:expr, $body:expr) => {{
                let (operand, crossed) = self.resolve(bus, $mode);
                $body(self, bus, operand);
                $base + if $page_penalty && crossed { 1 } else { 0 }
            }};
        }

        macro_rules! implied {
            ($cycles:expr, $body:expr) => {{
                $body(self, bus);
                $cycles
            }};
        }

        let cycles: u32 = match opcode {
            // -- load/store -----------------------------------------------
            0xA9 => op!(Immediate, 2, false, Self::op_lda),
            0xA5 => op!(ZeroPage, 3, false, Self::op_lda),
            0xB5 => op!(ZeroPageX, 4, false, Self::op_lda),
            0xAD => op!(Absolute, 4, false, Self::op_lda),
            0xBD => op!(AbsoluteX, 4, true, Self::op_lda),
            0xB9 => op!(AbsoluteY, 4, true, Self::op_lda),
            0xA1 => op!(IndirectX, 6, false, Self::op_lda),
            0xB1 => op!(IndirectY, 5, true, Self::op_lda),

            0xA2 => op!(Immediate, 2, false, Self::op_ldx),
            0xA6 => op!(ZeroPage, 3, false, Self::op_ldx),
            0xB6 => op!(ZeroPageY, 4, false, Self::op_ldx),
            0xAE => op!(Absolute, 4, false, Self::op_ldx),
            0xBE => op!(AbsoluteY, 4, true, Self::op_ldx),

            0xA0 => op!(Immediate, 2, false, Self::op_ldy),
            0xA4 => op!(ZeroPage, 3, false, Self::op_ldy),
            0xB4 => op!(ZeroPageX, 4, false, Self::op_ldy),
            0xAC => op!(Absolute, 4, false, Self::op_ldy),
            0xBC => op!(AbsoluteX, 4, true, Self::op_ldy),

            0x85 => op!(ZeroPage, 3, false, Self::op_sta),
            0x95 => op!(ZeroPageX, 4, false, Self::op_sta),
            0x8D => op!(Absolute, 4, false, Self::op_sta),
            0x9D => op!(AbsoluteX, 5, false, Self::op_sta),
            0x99 => op!(AbsoluteY, 5, false, Self::op_sta),
            0x81 => op!(IndirectX, 6, false, Self::op_sta),
            0x91 => op!(IndirectY, 6, false, Self::op_sta),

            0x86 => op!(ZeroPage, 3, false, Self::op_stx),
            0x96 => op!(ZeroPageY, 4, false, Self::op_stx),
            0x8E => op!(Absolute, 4, false, Self::op_stx),

            0x84 => op!(ZeroPage, 3, false, Self::op_sty),
            0x94 => op!(ZeroPageX, 4, false, Self::op_sty),
            0x8C => op!(Absolute, 4, false, Self::op_sty),

            // -- transfers ---------------------------------------------------
            0xAA => implied!(2, Self::op_tax),
            0xA8 => implied!(2, Self::op_tay),
            0xBA => implied!(2, Self::op_tsx),
            0x8A => implied!(2, Self::op_txa),
            0x9A => implied!(2, Self::op_txs),
            0x98 => implied!(2, Self::op_tya),

            // -- stack -----------------------------------------------------
            0x48 => implied!(3, |c: &mut Self, b: &mut Bus| { let a = c.a; c.push_u8(b, a); }),
            0x08 => implied!(3, |c: &mut Self, b: &mut Bus| { let p = c.p | FLAG_B | FLAG_U; c.push_u8(b, p); }),
            0x68 => implied!(4, |c: &mut Self, b: &mut Bus| { let v = c.pop_u8(b); c.a = v; c.set_zn(v); }),
            0x28 => implied!(4, |c: &mut Self, b: &mut Bus| {
                let v = c.pop_u8(b);
                c.p = (v & !FLAG_B) | FLAG_U;
                c.suppress_irq_poll = true;
            }),

            // -- arithmetic/logic ----------------------------------------------
            0x69 => op!(Immediate, 2, false, Self::op_adc),
            0x65 => op!(ZeroPage, 3, false, Self::op_adc),
            0x75 => op!(ZeroPageX, 4, false, Self::op_adc),
            0x6D => op!(Absolute, 4, false, Self::op_adc),
            0x7D => op!(AbsoluteX, 4, true, Self::op_adc),
            0x79 => op!(AbsoluteY, 4, true, Self::op_adc),
            0x61 => op!(IndirectX, 6, false, Self::op_adc),
            0x71 => op!(IndirectY, 5, true, Self::op_adc),

            0xE9 | 0xEB => op!(Immediate, 2, false, Self::op_sbc),
            0xE5 => op!(ZeroPage, 3, false, Self::op_sbc),
            0xF5 => op!(ZeroPageX, 4, false, Self::op_sbc),
            0xED => op!(Absolute, 4, false, Self::op_sbc),
            0xFD => op!(AbsoluteX, 4, true, Self::op_sbc),
            0xF9 => op!(AbsoluteY, 4, true, Self::op_sbc),
            0xE1 => op!(IndirectX, 6, false, Self::op_sbc),
            0xF1 => op!(IndirectY, 5, true, Self::op_sbc),

            0x29 => op!(Immediate, 2, false, Self::op_and),
            0x25 => op!(ZeroPage, 3, false, Self::op_and),
            0x35 => op!(ZeroPageX, 4, false, Self::op_and),
            0x2D => op!(Absolute, 4, false, Self::op_and),
            0x3D => op!(AbsoluteX, 4, true, Self::op_and),
            0x39 => op!(AbsoluteY, 4, true, Self::op_and),
            0x21 => op!(IndirectX, 6, false, Self::op_and),
            0x31 => op!(IndirectY, 5, true, Self::op_and),

            0x09 => op!(Immediate, 2, false, Self::op_ora),
            0x05 => op!(ZeroPage, 3, false, Self::op_ora),
            0x15 => op!(ZeroPageX, 4, false, Self::op_ora),
            0x0D => op!(Absolute, 4, false, Self::op_ora),
            0x1D => op!(AbsoluteX, 4, true, Self::op_ora),
            0x19 => op!(AbsoluteY, 4, true, Self::op_ora),
            0x01 => op!(IndirectX, 6, false, Self::op_ora),
            0x11 => op!(IndirectY, 5, true, Self::op_ora),

            0x49 => op!(Immediate, 2, false, Self::op_eor),
            0x45 => op!(ZeroPage, 3, false, Self::op_eor),
            0x55 => op!(ZeroPageX, 4, false, Self::op_eor),
            0x4D => op!(Absolute, 4, false, Self::op_eor),
            0x5D => op!(AbsoluteX, 4, true, Self::op_eor),
            0x59 => op!(AbsoluteY, 4, true, Self::op_eor),
            0x41 => op!(IndirectX, 6, false, Self::op_eor),
            0x51 => op!(IndirectY, 5, true, Self::op_eor),

            0x24 => op!(ZeroPage, 3, false, Self::op_bit),
            0x2C => op!(Absolute, 4, false, Self::op_bit),

            0xC9 => op!(Immediate, 2, false, Self::op_cmp),
            0xC5 => op!(ZeroPage, 3, false, Self::op_cmp),
            0xD5 => op!(ZeroPageX, 4, false, Self::op_cmp),
            0xCD => op!(Absolute, 4, false, Self::op_cmp),
            0xDD => op!(AbsoluteX, 4, true, Self::op_cmp),
            0xD9 => op!(AbsoluteY, 4, true, Self::op_cmp),
            0xC1 => op!(IndirectX, 6, false, Self::op_cmp),
            0xD1 => op!(IndirectY, 5, true, Self::op_cmp),

            0xE0 => op!(Immediate, 2, false, Self::op_cpx),
            0xE4 => op!(ZeroPage, 3, false, Self::op_cpx),
            0xEC => op!(Absolute, 4, false, Self::op_cpx),

            0xC0 => op!(Immediate, 2, false, Self::op_cpy),
            0xC4 => op!(ZeroPage, 3, false, Self::op_cpy),
            0xCC => op!(Absolute, 4, false, Self::op_cpy),

            // -- increment/decrement -------------------------------------------
            0xE6 => op!(ZeroPage, 5, false, Self::op_inc),
            0xF6 => op!(ZeroPageX, 6, false, Self::op_inc),
            0xEE => op!(Absolute, 6, false, Self::op_inc),
            0xFE => op!(AbsoluteX, 7, false, Self::op_inc),

            0xC6 => op!(ZeroPage, 5, false, Self::op_dec),
            0xD6 => op!(ZeroPageX, 6, false, Self::op_dec),
            0xCE => op!(Absolute, 6, false, Self::op_dec),
            0xDE => op!(AbsoluteX, 7, false, Self::op_dec),

            0xE8 => implied!(2, Self::op_inx),
            0xC8 => implied!(2, Self::op_iny),
            0xCA => implied!(2, Self::op_dex),
            0x88 => implied!(2, Self::op_dey),

            // -- shifts -------------------------------------------------------
            0x0A => op!(Accumulator, 2, false, Self::op_asl),
            0x06 => op!(ZeroPage, 5, false, Self::op_asl),
            0x16 => op!(ZeroPageX, 6, false, Self::op_asl),
            0x0E => op!(Absolute, 6, false, Self::op_asl),
            0x1E => op!(AbsoluteX, 7, false, Self::op_asl),

            0x4A => op!(Accumulator, 2, false, Self::op_lsr),
            0x46 => op!(ZeroPage, 5, false, Self::op_lsr),
            0x56 => op!(ZeroPageX, 6, false, Self::op_lsr),
            0x4E => op!(Absolute, 6, false, Self::op_lsr),
            0x5E => op!(AbsoluteX, 7, false, Self::op_lsr),

            0x2A => op!(Accumulator, 2, false, Self::op_rol),
            0x26 => op!(ZeroPage, 5, false, Self::op_rol),
            0x36 => op!(ZeroPageX, 6, false, Self::op_rol),
            0x2E => op!(Absolute, 6, false, Self::op_rol),
            0x3E => op!(AbsoluteX, 7, false, Self::op_rol),

            0x6A => op!(Accumulator, 2, false, Self::op_ror),
            0x66 => op!(ZeroPage, 5, false, Self::op_ror),
            0x76 => op!(ZeroPageX, 6, false, Self::op_ror),
            0x6E => op!(Absolute, 6, false, Self::op_ror),
            0x7E => op!(AbsoluteX, 7, false, Self::op_ror),

            // -- flags ----------------------------------------------------
            0x18 => implied!(2, |c: &mut Self, _b: &mut Bus| c.set_flag(FLAG_C, false)),
            0x38 => implied!(2, |c: &mut Self, _b: &mut Bus| c.set_flag(FLAG_C, true)),
            0x58 => implied!(2, |c: &mut Self, _b: &mut Bus| {
                c.set_flag(FLAG_I, false);
                c.suppress_irq_poll = true;
            }),
            0x78 => implied!(2, |c: &mut Self, _b: &mut Bus| {
                c.set_flag(FLAG_I, true);
                c.suppress_irq_poll = true;
            }),
            0xB8 => implied!(2, |c: &mut Self, _b: &mut Bus| c.set_flag(FLAG_V, false)),
            0xD8 => implied!(2, |c: &mut Self, _b: &mut Bus| c.set_flag(FLAG_D, false)),
            0xF8 => implied!(2, |c: &mut Self, _b: &mut Bus| c.set_flag(FLAG_D, true)),

            // -- branches ----------------------------------------------------
            0x90 => { let taken = !self.flag(FLAG_C); self.branch(bus, taken) }
            0xB0 => { let taken = self.flag(FLAG_C); self.branch(bus, taken) }
            0xF0 => { let taken = self.flag(FLAG_Z); self.branch(bus, taken) }
            0xD0 => { let taken = !self.flag(FLAG_Z); self.branch(bus, taken) }
            0x30 => { let taken = self.flag(FLAG_N); self.branch(bus, taken) }
            0x10 => { let taken = !self.flag(FLAG_N); self.branch(bus, taken) }
            0x50 => { let taken = !self.flag(FLAG_V); self.branch(bus, taken) }
            0x70 => { let taken = self.flag(FLAG_V); self.branch(bus, taken) }

            // -- jumps/calls --------------------------------------------------
            0x4C => {
                let addr = self.fetch_u16(bus);
                self.pc = addr;
                3
            }
            0x6C => {
                let pointer = self.fetch_u16(bus);
                self.pc = self.read_u16_bugged(bus, pointer);
                5
            }
            0x20 => {
                let addr = self.fetch_u16(bus);
                let return_addr = self.pc.wrapping_sub(1);
                self.push_u16(bus, return_addr);
                self.pc = addr;
                6
            }
            0x60 => {
                let addr = self.pop_u16(bus);
                self.pc = addr.wrapping_add(1);
                6
            }
            0x40 => {
                let p = self.pop_u8(bus);
                self.p = (p & !FLAG_B) | FLAG_U;
                self.pc = self.pop_u16(bus);
                self.suppress_irq_poll = true;
                6
            }
            0x00 => {
                self.pc = self.pc.wrapping_add(1);
                let pc = self.pc;
                self.push_u16(bus, pc);
                let status = self.p | FLAG_B | FLAG_U;
                self.push_u8(bus, status);
                self.p |= FLAG_I;
                self.pc = self.read_u16(bus, IRQ_VECTOR);
                7
            }

            0xEA => implied!(2, |_c: &mut Self, _b: &mut Bus| {}),

            // -- undocumented opcodes, grouped by family ----------------------
            0x4B => op!(Immediate, 2, false, Self::op_alr),
            0x0B | 0x2B => op!(Immediate, 2, false, Self::op_anc),
            0x6B => op!(Immediate, 2, false, Self::op_arr),
            0xCB => op!(Immediate, 2, false, Self::op_axs),

            0xA7 => op!(ZeroPage, 3, false, Self::op_lax),
            0xB7 => op!(ZeroPageY, 4, false, Self::op_lax),
            0xAF => op!(Absolute, 4, false, Self::op_lax),
            0xBF => op!(AbsoluteY, 4, true, Self::op_lax),
            0xA3 => op!(IndirectX, 6, false, Self::op_lax),
            0xB3 => op!(IndirectY, 5, true, Self::op_lax),

            0x87 => op!(ZeroPage, 3, false, Self::op_sax),
            0x97 => op!(ZeroPageY, 4, false, Self::op_sax),
            0x8F => op!(Absolute, 4, false, Self::op_sax),
            0x83 => op!(IndirectX, 6, false, Self::op_sax),

            0xC7 => op!(ZeroPage, 5, false, Self::op_dcp),
            0xD7 => op!(ZeroPageX, 6, false, Self::op_dcp),
            0xCF => op!(Absolute, 6, false, Self::op_dcp),
            0xDF => op!(AbsoluteX, 7, false, Self::op_dcp),
            0xDB => op!(AbsoluteY, 7, false, Self::op_dcp),
            0xC3 => op!(IndirectX, 8, false, Self::op_dcp),
            0xD3 => op!(IndirectY, 8, false, Self::op_dcp),

            0xE7 => op!(ZeroPage, 5, false, Self::op_isc),
            0xF7 => op!(ZeroPageX, 6, false, Self::op_isc),
            0xEF => op!(Absolute, 6, false, Self::op_isc),
            0xFF => op!(AbsoluteX, 7, false, Self::op_isc),
            0xFB => op!(AbsoluteY, 7, false, Self::op_isc),
            0xE3 => op!(IndirectX, 8, false, Self::op_isc),
            0xF3 => op!(IndirectY, 8, false, Self::op_isc),

            0x07 => op!(ZeroPage, 5, false, Self::op_slo),
            0x17 => op!(ZeroPageX, 6, false, Self::op_slo),
            0x0F => op!(Absolute, 6, false, Self::op_slo),
            0x1F => op!(AbsoluteX, 7, false, Self::op_slo),
            0x1B => op!(AbsoluteY, 7, false, Self::op_slo),
            0x03 => op!(IndirectX, 8, false, Self::op_slo),
            0x13 => op!(IndirectY, 8, false, Self::op_slo),

            0x27 => op!(ZeroPage, 5, false, Self::op_rla),
            0x37 => op!(ZeroPageX, 6, false, Self::op_rla),
            0x2F => op!(Absolute, 6, false, Self::op_rla),
            0x3F => op!(AbsoluteX, 7, false, Self::op_rla),
            0x3B => op!(AbsoluteY, 7, false, Self::op_rla),
            0x23 => op!(IndirectX, 8, false, Self::op_rla),
            0x33 => op!(IndirectY, 8, false, Self::op_rla),

            0x47 => op!(ZeroPage, 5, false, Self::op_sre),
            0x57 => op!(ZeroPageX, 6, false, Self::op_sre),
            0x4F => op!(Absolute, 6, false, Self::op_sre),
            0x5F => op!(AbsoluteX, 7, false, Self::op_sre),
            0x5B => op!(AbsoluteY, 7, false, Self::op_sre),
            0x43 => op!(IndirectX, 8, false, Self::op_sre),
            0x53 => op!(IndirectY, 8, false, Self::op_sre),

            0x67 => op!(ZeroPage, 5, false, Self::op_rra),
            0x77 => op!(ZeroPageX, 6, false, Self::op_rra),
            0x6F => op!(Absolute, 6, false, Self::op_rra),
            0x7F => op!(AbsoluteX, 7, false, Self::op_rra),
            0x7B => op!(AbsoluteY, 7, false, Self::op_rra),
            0x63 => op!(IndirectX, 8, false, Self::op_rra),
            0x73 => op!(IndirectY, 8, false, Self::op_rra),

            // NOP family (documented addressing-mode variety; operand
            // fetched for cycle accuracy, result discarded).
            0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xFA => implied!(2, |_c: &mut Self, _b: &mut Bus| {}),
            0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => op!(Immediate, 2, false, |_c: &mut Self, _b: &mut Bus, _o: Operand| {}),
            0x04 | 0x44 | 0x64 => op!(ZeroPage, 3, false, |_c: &mut Self, _b: &mut Bus, _o: Operand| {}),
            0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => op!(ZeroPageX, 4, false, |_c: &mut Self, _b: &mut Bus, _o: Operand| {}),
            0x0C => op!(Absolute, 4, false, |_c: &mut Self, _b: &mut Bus, _o: Operand| {}),
            0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC => op!(AbsoluteX, 4, true, |_c: &mut Self, _b: &mut Bus, _o: Operand| {}),

            _ => {
                let pc = self.pc.wrapping_sub(1);
                self.halted = Some((opcode, pc));
                return Err(CoreError::CpuHalt { opcode, pc, snapshot: self.snapshot_now() });
            }
        };

        Ok(cycles)
    }

    // -- register ops (no operand fetch) ------------------------------------

    fn op_tax(c: &mut Self, _b: &mut Bus) { c.x = c.a; c.set_zn(c.x); }
    fn op_tay(c: &mut Self, _b: &mut Bus) { c.y = c.a; c.set_zn(c.y); }
    fn op_tsx(c: &mut Self, _b: &mut Bus) { c.x = c.sp; c.set_zn(c.x); }
    fn op_txa(c: &mut Self, _b: &mut Bus) { c.a = c.x; c.set_zn(c.a); }
    fn op_txs(c: &mut Self, _b: &mut Bus) { c.sp = c.x; }
    fn op_tya(c: &mut Self, _b: &mut Bus) { c.a = c.y; c.set_zn(c.a); }
    fn op_inx(c: &mut Self, _b: &mut Bus) { c.x = c.x.wrapping_add(1); c.set_zn(c.x); }
    fn op_iny(c: &mut Self, _b: &mut Bus) { c.y = c.y.wrapping_add(1); c.set_zn(c.y); }
    fn op_dex(c: &mut Self, _b: &mut Bus) { c.x = c.x.wrapping_sub(1); c.set_zn(c.x); }
    fn op_dey(c: &mut Self, _b: &mut Bus) { c.y = c.y.wrapping_sub(1); c.set_zn(c.y); }

    // -- memory ops ----------------------------------------------------------

    fn op_lda(c: &mut Self, b: &mut Bus, o: Operand) { let v = c.read_operand(b, &o); c.a = v; c.set_zn(v); }
    fn op_ldx(c: &mut Self, b: &mut Bus, o: Operand) { let v = c.read_operand(b, &o); c.x = v; c.set_zn(v); }
    fn op_ldy(c: &mut Self, b: &mut Bus, o: Operand) { let v = c.read_operand(b, &o); c.y = v; c.set_zn(v); }
    fn op_sta(c: &mut Self, b: &mut Bus, o: Operand) { let a = c.a; c.write_operand(b, &o, a); }
    fn op_stx(c: &mut Self, b: &mut Bus, o: Operand) { let x = c.x; c.write_operand(b, &o, x); }
    fn op_sty(c: &mut Self, b: &mut Bus, o: Operand) { let y = c.y; c.write_operand(b, &o, y); }

    fn adc_value(&mut self, value: u8) {
        let carry_in = if self.flag(FLAG_C) { 1u16 } else { 0 };
        let sum = self.a as u16 + value as u16 + carry_in;
        let result = sum as u8;
        self.set_flag(FLAG_C, sum > 0xFF);
        self.set_flag(FLAG_V, ((self.a ^ result) & (value ^ result) & 0x80) != 0);
        self.a = result;
        self.set_zn(self.a);
    }

    fn op_adc(c: &mut Self, b: &mut Bus, o: Operand) { let v = c.read_operand(b, &o); c.adc_value(v); }
    fn op_sbc(c: &mut Self, b: &mut Bus, o: Operand) { let v = c.read_operand(b, &o); c.adc_value(!v); }

    fn op_and(c: &mut Self, b: &mut Bus, o: Operand) { let v = c.read_operand(b, &o); c.a &= v; c.set_zn(c.a); }
    fn op_ora(c: &mut Self, b: &mut Bus, o: Operand) { let v = c.read_operand(b, &o); c.a |= v; c.set_zn(c.a); }
    fn op_eor(c: &mut Self, b: &mut Bus, o: Operand) { let v = c.read_operand(b, &o); c.a ^= v; c.set_zn(c.a); }

    fn op_bit(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o);
        c.set_flag(FLAG_Z, (c.a & v) == 0);
        c.set_flag(FLAG_V, (v & 0x40) != 0);
        c.set_flag(FLAG_N, (v & 0x80) != 0);
    }

    fn compare(&mut self, reg: u8, value: u8) {
        let result = reg.wrapping_sub(value);
        self.set_flag(FLAG_C, reg >= value);
        self.set_zn(result);
    }

    fn op_cmp(c: &mut Self, b: &mut Bus, o: Operand) { let v = c.read_operand(b, &o); let a = c.a; c.compare(a, v); }
    fn op_cpx(c: &mut Self, b: &mut Bus, o: Operand) { let v = c.read_operand(b, &o); let x = c.x; c.compare(x, v); }
    fn op_cpy(c: &mut Self, b: &mut Bus, o: Operand) { let v = c.read_operand(b, &o); let y = c.y; c.compare(y, v); }

    fn op_inc(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o).wrapping_add(1);
        c.write_operand(b, &o, v);
        c.set_zn(v);
    }

    fn op_dec(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o).wrapping_sub(1);
        c.write_operand(b, &o, v);
        c.set_zn(v);
    }

    fn op_asl(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o);
        c.set_flag(FLAG_C, (v & 0x80) != 0);
        let result = v << 1;
        c.write_operand(b, &o, result);
        c.set_zn(result);
    }

    fn op_lsr(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o);
        c.set_flag(FLAG_C, (v & 0x01) != 0);
        let result = v >> 1;
        c.write_operand(b, &o, result);
        c.set_zn(result);
    }

    fn op_rol(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o);
        let carry_in = if c.flag(FLAG_C) { 1 } else { 0 };
        c.set_flag(FLAG_C, (v & 0x80) != 0);
        let result = (v << 1) | carry_in;
        c.write_operand(b, &o, result);
        c.set_zn(result);
    }

    fn op_ror(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o);
        let carry_in = if c.flag(FLAG_C) { 0x80 } else { 0 };
        c.set_flag(FLAG_C, (v & 0x01) != 0);
        let result = (v >> 1) | carry_in;
        c.write_operand(b, &o, result);
        c.set_zn(result);
    }

    fn branch(&mut self, bus: &mut Bus, taken: bool) -> u32 {
        let (operand, _) = self.resolve(bus, AddressingMode::Relative);
        let Operand::Address(target) = operand else { unreachable!() };
        if !taken {
            return 2;
        }
        let same_page = (self.pc & 0xFF00) == (target & 0xFF00);
        self.pc = target;
        if same_page {
            3
        } else {
            4
        }
    }

    // -- undocumented opcodes ------------------------------------------------

    fn op_lax(c: &mut Self, b: &mut Bus, o: Operand) { let v = c.read_operand(b, &o); c.a = v; c.x = v; c.set_zn(v); }
    fn op_sax(c: &mut Self, b: &mut Bus, o: Operand) { let v = c.a & c.x; c.write_operand(b, &o, v); }

    fn op_dcp(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o).wrapping_sub(1);
        c.write_operand(b, &o, v);
        let a = c.a;
        c.compare(a, v);
    }

    fn op_isc(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o).wrapping_add(1);
        c.write_operand(b, &o, v);
        c.adc_value(!v);
    }

    fn op_slo(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o);
        c.set_flag(FLAG_C, (v & 0x80) != 0);
        let result = v << 1;
        c.write_operand(b, &o, result);
        c.a |= result;
        c.set_zn(c.a);
    }

    fn op_rla(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o);
        let carry_in = if c.flag(FLAG_C) { 1 } else { 0 };
        c.set_flag(FLAG_C, (v & 0x80) != 0);
        let result = (v << 1) | carry_in;
        c.write_operand(b, &o, result);
        c.a &= result;
        c.set_zn(c.a);
    }

    fn op_sre(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o);
        c.set_flag(FLAG_C, (v & 0x01) != 0);
        let result = v >> 1;
        c.write_operand(b, &o, result);
        c.a ^= result;
        c.set_zn(c.a);
    }

    fn op_rra(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o);
        let carry_in = if c.flag(FLAG_C) { 0x80 } else { 0 };
        c.set_flag(FLAG_C, (v & 0x01) != 0);
        let result = (v >> 1) | carry_in;
        c.write_operand(b, &o, result);
        c.adc_value(result);
    }

    fn op_alr(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o);
        c.a &= v;
        c.set_flag(FLAG_C, (c.a & 0x01) != 0);
        c.a >>= 1;
        c.set_zn(c.a);
    }

    fn op_anc(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o);
        c.a &= v;
        c.set_zn(c.a);
        c.set_flag(FLAG_C, (c.a & 0x80) != 0);
    }

    fn op_arr(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o);
        c.a &= v;
        let carry_in = if c.flag(FLAG_C) { 0x80 } else { 0 };
        c.a = (c.a >> 1) | carry_in;
        c.set_zn(c.a);
        c.set_flag(FLAG_C, (c.a & 0x40) != 0);
        c.set_flag(FLAG_V, (((c.a >> 6) ^ (c.a >> 5)) & 0x01) != 0);
    }

    fn op_axs(c: &mut Self, b: &mut Bus, o: Operand) {
        let v = c.read_operand(b, &o);
        let result = (c.a & c.x).wrapping_sub(v);
        c.set_flag(FLAG_C, (c.a & c.x) >= v);
        c.x = result;
        c.set_zn(c.x);
    }
}

fn page_crossed(base: u16, final_addr: u16) -> bool {
    (base & 0xFF00) != (final_addr & 0xFF00)
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot for Cpu {
    fn state_id(&self) -> StateId {
        StateId::Cpu
    }

    fn to_bytes(&self) -> Vec<u8> {
        vec![self.a, self.x, self.y, self.sp, self.p, (self.pc & 0xFF) as u8, (self.pc >> 8) as u8]
    }

    fn load_bytes(&mut self, bytes: &[u8]) {
        if bytes.len() < 7 {
            return;
        }
        self.a = bytes[0];
        self.x = bytes[1];
        self.y = bytes[2];
        self.sp = bytes[3];
        self.p = bytes[4];
        self.pc = u16::from_le_bytes([bytes[5], bytes[6]]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::{Cartridge, CartridgeImage, Mirroring};
    use crate::config::SystemConfig;

    fn new_bus() -> Bus {
        let image = CartridgeImage {
            mapper_number: 0,
            prg_rom: vec![0u8; 32 * 1024],
            chr_rom: vec![0u8; 8 * 1024],
            prg_ram_size: 8 * 1024,
            chr_ram_size: 0,
            mirroring: Mirroring::Horizontal,
            has_battery: false,
            is_pal: false,
        };
        let cartridge = Cartridge::new(image).expect("valid image");
        Bus::new(cartridge, &SystemConfig::ntsc())
    }

    fn load(bus: &mut Bus, addr: u16, bytes: &[u8]) {
        for (i, byte) in bytes.iter().enumerate() {
            bus.cpu_write(addr + i as u16, *byte);
        }
    }

    #[test]
    fn lda_immediate_sets_accumulator_and_flags() {
        let mut bus = new_bus();
        let mut cpu = Cpu::new();
        load(&mut bus, 0x8000, &[0xA9, 0x00]); // LDA #$00
        cpu.pc = 0x8000;
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.a, 0);
        assert!(cpu.flag(FLAG_Z));
        assert_eq!(cycles, 2);
    }

    #[test]
    fn adc_sets_carry_and_overflow_on_signed_wrap() {
        let mut bus = new_bus();
        let mut cpu = Cpu::new();
        cpu.a = 0x7F;
        load(&mut bus, 0x8000, &[0x69, 0x01]); // ADC #$01
        cpu.pc = 0x8000;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.a, 0x80);
        assert!(cpu.flag(FLAG_V));
        assert!(!cpu.flag(FLAG_C));
    }

    #[test]
    fn branch_not_taken_costs_two_cycles() {
        let mut bus = new_bus();
        let mut cpu = Cpu::new();
        load(&mut bus, 0x8000, &[0xF0, 0x10]); // BEQ +16, Z clear
        cpu.pc = 0x8000;
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cycles, 2);
        assert_eq!(cpu.pc, 0x8002);
    }

    #[test]
    fn unassigned_opcode_halts_cpu() {
        let mut bus = new_bus();
        let mut cpu = Cpu::new();
        load(&mut bus, 0x8000, &[0x02]); // no entry in the dispatch table
        cpu.pc = 0x8000;
        assert!(cpu.step(&mut bus).is_err());
        assert!(cpu.is_halted());
        assert!(cpu.step(&mut bus).is_err());
    }

    #[test]
    fn cli_suppresses_irq_poll_for_one_instruction() {
        let mut bus = new_bus();
        let mut cpu = Cpu::new();
        cpu.p &= !FLAG_I;
        load(&mut bus, 0x8000, &[0x58, 0xEA, 0xEA]); // CLI, NOP, NOP
        cpu.pc = 0x8000;

        cpu.step(&mut bus).unwrap(); // CLI
        assert!(cpu.suppress_irq_poll);
        cpu.step(&mut bus).unwrap(); // NOP, poll suppressed and cleared
        assert!(!cpu.suppress_irq_poll);
    }

    #[test]
    fn dcp_combines_decrement_and_compare() {
        let mut bus = new_bus();
        let mut cpu = Cpu::new();
        cpu.a = 0x10;
        bus.cpu_write(0x0010, 0x11);
        load(&mut bus, 0x8000, &[0xC7, 0x10]); // DCP $10
        cpu.pc = 0x8000;
        cpu.step(&mut bus).unwrap();
        assert_eq!(bus.cpu_read(0x0010), 0x10);
        assert!(cpu.flag(FLAG_Z));
        assert!(cpu.flag(FLAG_C));
    }
}
