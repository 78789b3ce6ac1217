use std::fmt;

use log::{debug, trace, warn};
use num_traits::FromPrimitive;
use thiserror::Error;

use crate::{interconnect::Interconnect, port_hint::port_hint};

use super::{
    instruction::{Instruction, ModRm, FETCH_LEN},
    registers::{
        parity, DefaultSegment, Reg16, Reg8, Registers, RepeatMode, SegReg, AF, DF, IF, PF, ZF,
    },
};

/// Outcome of a successful [`Cpu::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A complete instruction ran.
    Executed,
    /// Only a prefix byte was consumed; step again to run the instruction it
    /// modifies.
    Prefix,
}

impl Step {
    pub fn code(self) -> i32 {
        match self {
            Step::Executed => 0,
            Step::Prefix => 1,
        }
    }
}

/// Constructs the interpreter doesn't implement. None of these are
/// recoverable; callers stop running and leave the state for inspection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no backing memory at {addr:05x}")]
    MissingMemory { addr: u32 },

    #[error("PC={pc:05x} OPC={bytes:02x?}")]
    UnknownOpcode { pc: u32, bytes: [u8; 4] },

    #[error("GRP4/{:01x}", .modrm.reg())]
    GroupMember { modrm: ModRm },

    #[error("Sw={:01x} in {:02x}", .modrm.reg(), .modrm.0)]
    SegmentRegister { modrm: ModRm },

    #[error("opcode {:02x}: mod={:01x} rm={:01x}", .opcode, .modrm.mode(), .modrm.rm())]
    AddressingMode { opcode: u8, modrm: ModRm },

    #[error("opcode {:02x}: reg={:01x} rm={:01x}", .opcode, .modrm.reg(), .modrm.rm())]
    RegisterOperand { opcode: u8, modrm: ModRm },

    #[error("XOR Ev={:02x}", .modrm.0)]
    XorOperand { modrm: ModRm },
}

impl DecodeError {
    /// Stable negative code for each failure family.
    pub fn code(&self) -> i32 {
        match self {
            DecodeError::MissingMemory { .. } => -1,
            DecodeError::UnknownOpcode { .. } => -2,
            DecodeError::GroupMember { .. } => -3,
            DecodeError::SegmentRegister { .. } => -4,
            DecodeError::AddressingMode { .. } => -5,
            DecodeError::RegisterOperand { .. } => -5,
            DecodeError::XorOperand { .. } => -6,
        }
    }
}

pub type StepResult = Result<Step, DecodeError>;

/// 0 for an instruction, 1 for a prefix, negative for a decode failure.
pub fn step_code(result: &StepResult) -> i32 {
    match result {
        Ok(step) => step.code(),
        Err(e) => e.code(),
    }
}

pub struct Cpu {
    pub regs: Registers,
    inter: Interconnect,
    default_segment: DefaultSegment,
    default_repeat: RepeatMode,
}

impl Cpu {
    pub fn new(inter: Interconnect) -> Cpu {
        Cpu {
            regs: Registers::new(),
            inter,
            default_segment: DefaultSegment::Ds,
            default_repeat: RepeatMode::None,
        }
    }

    pub fn bus(&mut self) -> &mut Interconnect {
        &mut self.inter
    }

    pub fn default_segment(&self) -> DefaultSegment {
        self.default_segment
    }

    pub fn default_repeat(&self) -> RepeatMode {
        self.default_repeat
    }

    pub fn reset(&mut self) {
        self.regs = Registers::new();
        self.default_segment = DefaultSegment::Ds;
        self.default_repeat = RepeatMode::None;
    }

    /// Runs one instruction at CS:IP, or consumes one prefix byte.
    ///
    /// Prefix state survives only into the very next call: whichever kind of
    /// prefix this call did not consume goes back to its default.
    pub fn step(&mut self) -> StepResult {
        let pc = self.regs.pc();

        let data = self.inter.read(pc, FETCH_LEN);
        if data.is_empty() {
            return Ok(Step::Prefix);
        }
        let instruction = Instruction::from_slice(data);

        trace!("{:05x} {:x}", pc, instruction);

        let mut seg_prefix = false;
        let mut rep_prefix = false;

        let result = match instruction.opcode() {
            0x26 => {
                self.regs.ip = self.regs.ip.wrapping_add(1);
                trace!("ES:");
                self.default_segment = DefaultSegment::Es;
                seg_prefix = true;
                Ok(())
            }
            0xF3 => {
                self.regs.ip = self.regs.ip.wrapping_add(1);
                trace!("REPZ:");
                self.default_repeat = RepeatMode::RepZ;
                rep_prefix = true;
                Ok(())
            }
            _ => self.decode_and_execute(pc, instruction),
        };

        if !seg_prefix {
            self.default_segment = DefaultSegment::Ds;
        }
        if !rep_prefix {
            self.default_repeat = RepeatMode::None;
        }

        match result {
            Ok(()) if seg_prefix || rep_prefix => Ok(Step::Prefix),
            Ok(()) => Ok(Step::Executed),
            Err(e) => {
                warn!("NOTIMP: {}", e);
                Err(e)
            }
        }
    }

    fn decode_and_execute(&mut self, pc: u32, instruction: Instruction) -> Result<(), DecodeError> {
        match instruction.opcode() {
            0x33 => self.op_xor_gv_ev(instruction),
            0x3B => self.op_cmp_gv_ev(instruction),
            0x40 => self.op_inc_ax(),
            0x75 => self.op_jnz(instruction),
            0x89 => self.op_mov_ev_gv(instruction),
            0x8B => self.op_mov_gv_ev(instruction),
            0x8E => self.op_mov_sw_ew(instruction),
            0x90 => self.op_nop(),
            0xAB => self.op_stosw(),
            0xB0..=0xB7 => self.op_mov_r8_ib(instruction),
            0xB8..=0xBF => self.op_mov_r16_iw(instruction),
            0xE6 => self.op_out_ib_al(instruction),
            0xEA => self.op_jmp_far(instruction),
            0xEE => self.op_out_dx_al(),
            0xFA => self.op_cli(),
            0xFC => self.op_cld(),
            0xFE => self.op_grp4(instruction),
            _ => {
                let b = instruction.0;
                Err(DecodeError::UnknownOpcode {
                    pc,
                    bytes: [b[0], b[1], b[2], b[3]],
                })
            }
        }
    }

    fn advance(&mut self, len: u16) {
        self.regs.ip = self.regs.ip.wrapping_add(len);
    }

    fn data_segment(&self) -> u16 {
        match self.default_segment {
            DefaultSegment::Ds => self.regs.ds,
            DefaultSegment::Es => self.regs.es,
        }
    }

    fn linear(seg: u16, offset: u16) -> u32 {
        ((seg as u32) << 4) + offset as u32
    }

    /// Address of a `[DI]` memory operand, the only memory form supported for
    /// ModRM instructions.
    fn di_operand(&mut self, opcode: u8, modrm: ModRm) -> Result<u32, DecodeError> {
        if modrm.mode() != 0 || modrm.rm() != 5 {
            return Err(DecodeError::AddressingMode { opcode, modrm });
        }

        trace!("USING SEG {:?}", self.default_segment);

        let addr = Cpu::linear(self.data_segment(), self.regs.get16(Reg16::Di));
        self.check_backing(addr)?;

        Ok(addr)
    }

    fn check_backing(&mut self, addr: u32) -> Result<(), DecodeError> {
        if self.inter.read(addr, 2).is_empty() {
            return Err(DecodeError::MissingMemory { addr });
        }

        Ok(())
    }

    fn set_zf_pf(&mut self, result: u16) {
        self.regs.set_flag(ZF, result == 0);
        self.regs.set_flag(PF, parity(result));
    }

    fn op_xor_gv_ev(&mut self, instruction: Instruction) -> Result<(), DecodeError> {
        let modrm = instruction.modrm();
        self.advance(2);

        trace!("XOR\t\tGv\tEv");

        let result = match modrm.0 {
            0xC0 => {
                let v = self.regs.get16(Reg16::Ax) ^ self.regs.get16(Reg16::Ax);
                self.regs.set16(Reg16::Ax, v);
                v
            }
            0xFF => {
                let v = self.regs.get16(Reg16::Di) ^ self.regs.get16(Reg16::Di);
                self.regs.set16(Reg16::Di, v);
                v
            }
            _ => return Err(DecodeError::XorOperand { modrm }),
        };

        self.set_zf_pf(result);

        Ok(())
    }

    fn op_cmp_gv_ev(&mut self, instruction: Instruction) -> Result<(), DecodeError> {
        let modrm = instruction.modrm();

        trace!("CMP\t\tREG16,MEM16");

        let addr = self.di_operand(0x3B, modrm)?;
        let mem = self.inter.load::<u16>(addr);

        let regv = match modrm.reg() {
            2 => self.regs.get16(Reg16::Dx),
            _ => return Err(DecodeError::RegisterOperand { opcode: 0x3B, modrm }),
        };

        self.advance(2);
        self.regs.set_flag(ZF, mem == regv);

        Ok(())
    }

    fn op_inc_ax(&mut self) -> Result<(), DecodeError> {
        self.advance(1);

        trace!("INC\t\tAX");

        let ax = self.regs.get16(Reg16::Ax);
        let v = ax.wrapping_add(1);

        self.regs.set_flag(AF, ax & 0xFF == 0xFF);
        self.regs.set_flag(PF, parity(v));
        self.regs.set16(Reg16::Ax, v);

        Ok(())
    }

    // The displacement is added as an unsigned byte: backward jumps land
    // 256 bytes too far forward. Existing firmware images rely on this.
    fn op_jnz(&mut self, instruction: Instruction) -> Result<(), DecodeError> {
        let ib = instruction.imm8(1);
        self.advance(2);

        trace!("JNZ\t\tIb={:02x}", ib);

        if !self.regs.flag(ZF) {
            self.advance(ib as u16);
        }

        Ok(())
    }

    fn op_mov_ev_gv(&mut self, instruction: Instruction) -> Result<(), DecodeError> {
        let modrm = instruction.modrm();

        trace!("MOV\t\tMEM16,REG16");

        let addr = self.di_operand(0x89, modrm)?;

        let regv = match modrm.reg() {
            2 => self.regs.get16(Reg16::Dx),
            _ => return Err(DecodeError::RegisterOperand { opcode: 0x89, modrm }),
        };

        self.advance(2);
        self.inter.store(addr, regv);

        Ok(())
    }

    fn op_mov_gv_ev(&mut self, instruction: Instruction) -> Result<(), DecodeError> {
        let modrm = instruction.modrm();

        trace!("MOV\t\tREG16,REG16/MEM16");

        match modrm.mode() {
            // The word after ModRM is always taken as a direct address.
            0 => {
                let disp = instruction.imm16(2);

                trace!("USING SEG {:?}", self.default_segment);

                let addr = Cpu::linear(self.data_segment(), disp);
                self.check_backing(addr)?;

                if modrm.reg() != Reg16::Si as u8 {
                    return Err(DecodeError::RegisterOperand { opcode: 0x8B, modrm });
                }

                let v = self.inter.load::<u16>(addr);
                self.regs.set16(Reg16::Si, v);
                self.advance(4);
            }
            // Only AX is implemented as the source.
            3 => {
                if modrm.rm() != Reg16::Ax as u8 {
                    return Err(DecodeError::RegisterOperand { opcode: 0x8B, modrm });
                }

                let dst = reg16(modrm.reg());

                let v = self.regs.get16(Reg16::Ax);
                self.regs.set16(dst, v);
                self.advance(2);
            }
            _ => return Err(DecodeError::AddressingMode { opcode: 0x8B, modrm }),
        }

        Ok(())
    }

    fn op_mov_sw_ew(&mut self, instruction: Instruction) -> Result<(), DecodeError> {
        let modrm = instruction.modrm();
        self.advance(2);

        trace!("MOV\t\tSw\tEw");

        if modrm.mode() != 3 {
            return Err(DecodeError::AddressingMode { opcode: 0x8E, modrm });
        }

        let regv = match reg16(modrm.rm()) {
            r @ (Reg16::Ax | Reg16::Bx) => self.regs.get16(r),
            _ => return Err(DecodeError::RegisterOperand { opcode: 0x8E, modrm }),
        };

        match SegReg::from_u8(modrm.reg()) {
            Some(seg @ (SegReg::Es | SegReg::Ds)) => {
                debug!("SETTING {:?}={:04x}", seg, regv);
                self.regs.set_seg(seg, regv);
            }
            _ => return Err(DecodeError::SegmentRegister { modrm }),
        }

        Ok(())
    }

    fn op_nop(&mut self) -> Result<(), DecodeError> {
        self.advance(1);

        trace!("NOP");

        Ok(())
    }

    fn op_stosw(&mut self) -> Result<(), DecodeError> {
        self.advance(1);

        trace!("STOSW USING REP {:?}", self.default_repeat);

        loop {
            if self.default_repeat != RepeatMode::None && self.regs.get16(Reg16::Cx) == 0 {
                break;
            }

            let di = self.regs.get16(Reg16::Di);
            let addr = Cpu::linear(self.regs.es, di);
            self.check_backing(addr)?;

            let ax = self.regs.get16(Reg16::Ax);
            self.inter.store(addr, ax);
            self.regs.set16(Reg16::Di, di.wrapping_add(2));

            if self.default_repeat == RepeatMode::None {
                break;
            }

            let cx = self.regs.get16(Reg16::Cx).wrapping_sub(1);
            self.regs.set16(Reg16::Cx, cx);
        }

        Ok(())
    }

    fn op_mov_r8_ib(&mut self, instruction: Instruction) -> Result<(), DecodeError> {
        let reg = reg8(instruction.opcode_reg());
        let ib = instruction.imm8(1);
        self.advance(2);

        trace!("MOV\t\t{:?}\tIb={:02x}", reg, ib);

        self.regs.set8(reg, ib);

        Ok(())
    }

    fn op_mov_r16_iw(&mut self, instruction: Instruction) -> Result<(), DecodeError> {
        let reg = reg16(instruction.opcode_reg());
        let iw = instruction.imm16(1);
        self.advance(3);

        trace!("MOV\t\t{:?}\tIw={:04x}", reg, iw);

        self.regs.set16(reg, iw);

        Ok(())
    }

    fn op_out_ib_al(&mut self, instruction: Instruction) -> Result<(), DecodeError> {
        let ib = instruction.imm8(1);
        self.advance(2);

        let al = self.regs.get8(Reg8::Al);
        debug!(
            "OUT Ib={:02x} AL={:02x}\t\t[{}]",
            ib,
            al,
            port_hint(ib as u16)
        );

        Ok(())
    }

    fn op_out_dx_al(&mut self) -> Result<(), DecodeError> {
        self.advance(1);

        let dx = self.regs.get16(Reg16::Dx);
        let al = self.regs.get8(Reg8::Al);
        debug!("OUT DX={:04x} AL={:02x}\t[{}]", dx, al, port_hint(dx));

        Ok(())
    }

    fn op_jmp_far(&mut self, instruction: Instruction) -> Result<(), DecodeError> {
        let ofs = instruction.imm16(1);
        let seg = instruction.imm16(3);

        trace!("JMP\t\tAp={:04x}:{:04x}", seg, ofs);

        self.regs.cs = seg;
        self.regs.ip = ofs;

        Ok(())
    }

    fn op_cli(&mut self) -> Result<(), DecodeError> {
        self.advance(1);

        trace!("CLI");

        self.regs.set_flag(IF, false);

        Ok(())
    }

    fn op_cld(&mut self) -> Result<(), DecodeError> {
        self.advance(1);

        trace!("CLD");

        self.regs.set_flag(DF, false);

        Ok(())
    }

    fn op_grp4(&mut self, instruction: Instruction) -> Result<(), DecodeError> {
        let modrm = instruction.modrm();
        self.advance(2);

        trace!("GRP4\tEb={:02x}", modrm.0);

        match modrm.0 {
            // INC AL
            0xC0 => {
                let al = self.regs.get8(Reg8::Al).wrapping_add(1);
                self.regs.set8(Reg8::Al, al);
                Ok(())
            }
            _ => Err(DecodeError::GroupMember { modrm }),
        }
    }
}

fn reg16(field: u8) -> Reg16 {
    Reg16::from_u8(field & 0x7).unwrap_or(Reg16::Ax)
}

fn reg8(field: u8) -> Reg8 {
    Reg8::from_u8(field & 0x7).unwrap_or(Reg8::Al)
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.regs;

        writeln!(
            f,
            "AX: {:04X} BX: {:04X} CX: {:04X} DX: {:04X} ",
            r.get16(Reg16::Ax),
            r.get16(Reg16::Bx),
            r.get16(Reg16::Cx),
            r.get16(Reg16::Dx)
        )?;
        writeln!(
            f,
            "SI: {:04X} DI: {:04X} SP: {:04X} BP: {:04X} ",
            r.get16(Reg16::Si),
            r.get16(Reg16::Di),
            r.get16(Reg16::Sp),
            r.get16(Reg16::Bp)
        )?;
        write!(
            f,
            "CS: {:04X} DS: {:04X} ES: {:04X} SS: {:04X} ",
            r.cs, r.ds, r.es, r.ss
        )
    }
}
