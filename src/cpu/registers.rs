use num_derive::FromPrimitive;

pub const CF: u16 = 0x001;
pub const PF: u16 = 0x004;
pub const AF: u16 = 0x010;
pub const ZF: u16 = 0x040;
pub const SF: u16 = 0x080;
pub const TF: u16 = 0x100;
pub const IF: u16 = 0x200;
pub const DF: u16 = 0x400;
pub const OF: u16 = 0x800;

/// A 16-bit general register with independently addressable byte halves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Register(u16);

impl Register {
    pub fn word(self) -> u16 {
        self.0
    }

    pub fn low_byte(self) -> u8 {
        self.0 as u8
    }

    pub fn high_byte(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn set_word(&mut self, val: u16) {
        self.0 = val;
    }

    pub fn set_low_byte(&mut self, val: u8) {
        self.0 = (self.0 & 0xFF00) | val as u16;
    }

    pub fn set_high_byte(&mut self, val: u8) {
        self.0 = (self.0 & 0x00FF) | ((val as u16) << 8);
    }
}

/// Word registers in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum Reg16 {
    Ax = 0,
    Cx = 1,
    Dx = 2,
    Bx = 3,
    Sp = 4,
    Bp = 5,
    Si = 6,
    Di = 7,
}

/// Byte registers in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum Reg8 {
    Al = 0,
    Cl = 1,
    Dl = 2,
    Bl = 3,
    Ah = 4,
    Ch = 5,
    Dh = 6,
    Bh = 7,
}

impl Reg8 {
    /// Parent word register and whether this is its high half.
    pub fn parent(self) -> (Reg16, bool) {
        match self {
            Reg8::Al => (Reg16::Ax, false),
            Reg8::Cl => (Reg16::Cx, false),
            Reg8::Dl => (Reg16::Dx, false),
            Reg8::Bl => (Reg16::Bx, false),
            Reg8::Ah => (Reg16::Ax, true),
            Reg8::Ch => (Reg16::Cx, true),
            Reg8::Dh => (Reg16::Dx, true),
            Reg8::Bh => (Reg16::Bx, true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum SegReg {
    Es = 0,
    Cs = 1,
    Ss = 2,
    Ds = 3,
}

/// Segment used by memory operands that don't name one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultSegment {
    Ds,
    Es,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatMode {
    None,
    RepNz,
    RepZ,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    pub gpr: [Register; 8],
    pub ip: u16,
    pub flags: u16,
    pub cs: u16,
    pub ss: u16,
    pub ds: u16,
    pub es: u16,
}

impl Registers {
    /// Power-on state: execution starts at F000:FFF0.
    pub fn new() -> Registers {
        let mut gpr = [Register::default(); 8];
        gpr[Reg16::Dx as usize].set_word(0x0480);

        Registers {
            gpr,
            ip: 0xFFF0,
            flags: 0x0002,
            cs: 0xF000,
            ss: 0x0000,
            ds: 0x0000,
            es: 0x0000,
        }
    }

    pub fn get16(&self, reg: Reg16) -> u16 {
        self.gpr[reg as usize].word()
    }

    pub fn set16(&mut self, reg: Reg16, val: u16) {
        self.gpr[reg as usize].set_word(val);
    }

    pub fn get8(&self, reg: Reg8) -> u8 {
        match reg.parent() {
            (parent, false) => self.gpr[parent as usize].low_byte(),
            (parent, true) => self.gpr[parent as usize].high_byte(),
        }
    }

    pub fn set8(&mut self, reg: Reg8, val: u8) {
        match reg.parent() {
            (parent, false) => self.gpr[parent as usize].set_low_byte(val),
            (parent, true) => self.gpr[parent as usize].set_high_byte(val),
        }
    }

    pub fn seg(&self, seg: SegReg) -> u16 {
        match seg {
            SegReg::Es => self.es,
            SegReg::Cs => self.cs,
            SegReg::Ss => self.ss,
            SegReg::Ds => self.ds,
        }
    }

    pub fn set_seg(&mut self, seg: SegReg, val: u16) {
        match seg {
            SegReg::Es => self.es = val,
            SegReg::Cs => self.cs = val,
            SegReg::Ss => self.ss = val,
            SegReg::Ds => self.ds = val,
        }
    }

    pub fn flag(&self, mask: u16) -> bool {
        self.flags & mask != 0
    }

    pub fn set_flag(&mut self, mask: u16, val: bool) {
        if val {
            self.flags |= mask;
        } else {
            self.flags &= !mask;
        }
    }

    /// Physical address of the next instruction byte. Not wrapped to 20 bits.
    pub fn pc(&self) -> u32 {
        ((self.cs as u32) << 4) + self.ip as u32
    }
}

impl Default for Registers {
    fn default() -> Self {
        Registers::new()
    }
}

/// Set for an even number of one bits across all 16 bits of `val`.
pub fn parity(val: u16) -> bool {
    val.count_ones() % 2 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_alias_the_word() {
        let mut r = Register::default();
        r.set_word(0x1234);
        assert_eq!((r.high_byte(), r.low_byte()), (0x12, 0x34));

        r.set_low_byte(0xFF);
        assert_eq!(r.word(), 0x12FF);

        r.set_high_byte(0x00);
        assert_eq!(r.word(), 0x00FF);
    }

    #[test]
    fn byte_registers_map_to_parents() {
        let mut regs = Registers::new();
        regs.set16(Reg16::Bx, 0xAABB);
        regs.set8(Reg8::Bh, 0x11);
        assert_eq!(regs.get16(Reg16::Bx), 0x11BB);
        assert_eq!(regs.get8(Reg8::Bl), 0xBB);
        assert_eq!(regs.get8(Reg8::Dh), 0x04);
    }

    #[test]
    fn reset_vector() {
        let regs = Registers::new();
        assert_eq!(regs.pc(), 0xFFFF0);
        assert_eq!(regs.flags, 0x0002);
    }

    #[test]
    fn parity_counts_all_sixteen_bits() {
        assert!(parity(0));
        assert!(!parity(0x0001));
        assert!(parity(0x0101));
        assert!(!parity(0x8000));
    }
}
