use log::trace;

/// Byte returned for reads of unmapped space.
pub const OPEN_BUS: u8 = 0xCC;

/// Recycled buffer standing in for everything that isn't RAM or ROM.
///
/// It grows to the largest request ever seen and is never shrunk. Every access
/// refills the requested window with `OPEN_BUS` for addresses that are still
/// inside the 20-bit space; bytes past `mem_last` keep whatever the buffer
/// held before.
pub struct ScratchPad {
    data: Vec<u8>,
}

impl ScratchPad {
    pub fn new() -> ScratchPad {
        ScratchPad { data: Vec::new() }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn view(&mut self, addr: u32, len: usize, mem_last: u32) -> &mut [u8] {
        if len > self.data.len() {
            trace!("SCRATCHPAD grow {} -> {}", self.data.len(), len);
            self.data.resize(len, 0);
        }

        for (i, b) in self.data[..len].iter_mut().enumerate() {
            if addr as u64 + i as u64 <= mem_last as u64 {
                *b = OPEN_BUS;
            }
        }

        &mut self.data[..len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_and_never_shrinks() {
        let mut pad = ScratchPad::new();
        assert_eq!(pad.view(0x90000, 4, 0xFFFFF), &[OPEN_BUS; 4]);
        assert_eq!(pad.len(), 4);

        assert_eq!(pad.view(0x90000, 2, 0xFFFFF).len(), 2);
        assert_eq!(pad.len(), 4);
    }

    #[test]
    fn bytes_past_the_address_space_are_recycled() {
        let mut pad = ScratchPad::new();
        pad.view(0x100000, 2, 0xFFFFF).copy_from_slice(&[0x11, 0x22]);

        assert_eq!(pad.view(0x100000, 2, 0xFFFFF), &[0x11, 0x22]);
        assert_eq!(pad.view(0xFFFFF, 2, 0xFFFFF), &[OPEN_BUS, 0x22]);
    }
}
