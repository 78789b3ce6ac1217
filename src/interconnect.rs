use log::trace;

use crate::{
    addressible::Addressible,
    bios::Bios,
    config::{MemoryLayout, MEM_LAST},
    ram::Ram,
    scratchpad::ScratchPad,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Ram,
    Bios,
    Unmapped,
}

/// Physical memory map: RAM, ROM and the scratch fallback for everything else.
///
/// Every address resolves to some buffer. Requests are clamped so the returned
/// view never crosses the end of the region that holds `addr`.
pub struct Interconnect {
    pub bios: Bios,
    ram: Ram,
    scratchpad: ScratchPad,
    layout: MemoryLayout,
}

impl Interconnect {
    pub fn new(mut bios: Bios, layout: MemoryLayout) -> Interconnect {
        bios.data.resize(layout.bios_size(), 0);

        Interconnect {
            bios,
            ram: Ram::new(layout.ram_size()),
            scratchpad: ScratchPad::new(),
            layout,
        }
    }

    pub fn layout(&self) -> MemoryLayout {
        self.layout
    }

    pub fn region(&self, addr: u32) -> Region {
        if map::Range(self.layout.ram_first, self.layout.ram_last)
            .contains(addr)
            .is_some()
        {
            Region::Ram
        } else if map::Range(self.layout.bios_first, self.layout.bios_last)
            .contains(addr)
            .is_some()
        {
            Region::Bios
        } else {
            Region::Unmapped
        }
    }

    /// View of up to `len` bytes at `addr`.
    pub fn read(&mut self, addr: u32, len: usize) -> &[u8] {
        self.resolve(addr, len)
    }

    /// Writable view of up to `len` bytes at `addr`. Unmapped space shares the
    /// scratch buffer with reads.
    pub fn write(&mut self, addr: u32, len: usize) -> &mut [u8] {
        self.resolve(addr, len)
    }

    pub fn load<T: Addressible>(&mut self, addr: u32) -> T {
        let v = T::from_le(self.read(addr, T::width() as usize));

        trace!("load{:?} {:05x}", T::width(), addr);

        v
    }

    pub fn store<T: Addressible>(&mut self, addr: u32, val: T) {
        trace!("store{:?} {:05x}", T::width(), addr);

        val.to_le(self.write(addr, T::width() as usize));
    }

    fn resolve(&mut self, addr: u32, len: usize) -> &mut [u8] {
        let ram = map::Range(self.layout.ram_first, self.layout.ram_last);
        let bios = map::Range(self.layout.bios_first, self.layout.bios_last);

        if let Some(offset) = ram.contains(addr) {
            let len = ram.clamp(addr, len);
            return &mut self.ram.data[offset..offset + len];
        }

        if let Some(offset) = bios.contains(addr) {
            let len = bios.clamp(addr, len);
            return &mut self.bios.data[offset..offset + len];
        }

        self.scratchpad.view(addr, len, MEM_LAST)
    }
}

mod map {
    #[derive(Clone, Copy)]
    pub struct Range(pub u32, pub u32); // (first, last), inclusive

    impl Range {
        pub fn contains(&self, addr: u32) -> Option<usize> {
            let Range(first, last) = *self;

            if first <= addr && addr <= last {
                Some((addr - first) as usize)
            } else {
                None
            }
        }

        pub fn clamp(&self, addr: u32, len: usize) -> usize {
            len.min((self.1 - addr) as usize + 1)
        }
    }
}
