use std::fmt::LowerHex;

/// Number of bytes fetched ahead of CS:IP for one decode.
pub const FETCH_LEN: usize = 8;

/// Raw bytes at CS:IP. Bytes past the end of the fetched region read as zero.
#[derive(Clone, Copy, Debug)]
pub struct Instruction(pub [u8; FETCH_LEN]);

impl LowerHex for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Instruction(bytes) = self;

        write!(
            f,
            "{:02x} {:02x} {:02x} {:02x}",
            bytes[0], bytes[1], bytes[2], bytes[3]
        )
    }
}

impl Instruction {
    pub fn from_slice(data: &[u8]) -> Instruction {
        let mut bytes = [0; FETCH_LEN];
        let len = data.len().min(FETCH_LEN);
        bytes[..len].copy_from_slice(&data[..len]);

        Instruction(bytes)
    }

    pub fn opcode(self) -> u8 {
        self.0[0]
    }

    /// Low three bits of the opcode, used by the register-in-opcode forms.
    pub fn opcode_reg(self) -> u8 {
        self.0[0] & 0x7
    }

    pub fn modrm(self) -> ModRm {
        ModRm(self.0[1])
    }

    pub fn imm8(self, at: usize) -> u8 {
        self.0[at]
    }

    pub fn imm16(self, at: usize) -> u16 {
        self.0[at] as u16 | ((self.0[at + 1] as u16) << 8)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModRm(pub u8);

impl ModRm {
    pub fn mode(self) -> u8 {
        let ModRm(b) = self;

        (b & 0xC0) >> 6
    }

    pub fn reg(self) -> u8 {
        let ModRm(b) = self;

        (b & 0x38) >> 3
    }

    pub fn rm(self) -> u8 {
        let ModRm(b) = self;

        b & 0x07
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modrm_fields() {
        // cmp dx,[di]
        let m = ModRm(0x15);
        assert_eq!((m.mode(), m.reg(), m.rm()), (0, 2, 5));

        // mov bp,ax
        let m = ModRm(0xE8);
        assert_eq!((m.mode(), m.reg(), m.rm()), (3, 5, 0));
    }

    #[test]
    fn short_fetch_is_zero_padded() {
        let insn = Instruction::from_slice(&[0xB8, 0x34]);
        assert_eq!(insn.imm16(1), 0x0034);
        assert_eq!(format!("{:x}", insn), "b8 34 00 00");
    }
}
