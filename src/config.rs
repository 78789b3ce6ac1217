//! Runtime configuration shared by the library and the binary.

use std::path::PathBuf;

/// Top of the 20-bit real mode address space.
pub const MEM_LAST: u32 = 0xFFFFF;

/// Physical placement of RAM and ROM. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    pub ram_first: u32,
    pub ram_last: u32,
    pub bios_first: u32,
    pub bios_last: u32,
}

impl MemoryLayout {
    /// 256K of RAM and a 32K ROM window at 0xF8000.
    pub fn compact() -> MemoryLayout {
        MemoryLayout {
            ram_first: 0x00000,
            ram_last: 0x3FFFF,
            bios_first: 0xF8000,
            bios_last: MEM_LAST,
        }
    }

    pub fn ram_size(&self) -> usize {
        (self.ram_last - self.ram_first + 1) as usize
    }

    pub fn bios_size(&self) -> usize {
        (self.bios_last - self.bios_first + 1) as usize
    }
}

impl Default for MemoryLayout {
    fn default() -> Self {
        MemoryLayout {
            ram_first: 0x00000,
            ram_last: 0x7FFFF,
            bios_first: 0xF0000,
            bios_last: MEM_LAST,
        }
    }
}

/// Register file layout the debugger expects in a `g` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterWidth {
    Bits32,
    Bits64,
}

impl RegisterWidth {
    /// Length in hex characters of the `g` payload.
    pub fn dump_len(self) -> usize {
        match self {
            RegisterWidth::Bits32 => 312 * 2,
            RegisterWidth::Bits64 => 560 * 2,
        }
    }
}

impl Default for RegisterWidth {
    fn default() -> Self {
        RegisterWidth::Bits32
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// `None` runs the interpreter headless. `Some(0)` lets the OS pick.
    pub port: Option<u16>,
    pub bios: Option<PathBuf>,
    pub register_width: RegisterWidth,
    pub layout: MemoryLayout,
    pub verbose: bool,
}
