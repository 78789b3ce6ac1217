#[derive(PartialEq, Eq, Debug)]
pub enum AccessWidth {
    Byte = 1,
    Word = 2,
}

/// Values that can be moved between the CPU and a little-endian memory view.
///
/// The view handed out by the memory bus may be shorter than the access width
/// when the access straddles the end of a region: missing bytes load as zero
/// and stores past the end are dropped.
pub trait Addressible: Copy {
    fn width() -> AccessWidth;
    fn from_le(bytes: &[u8]) -> Self;
    fn to_le(self, bytes: &mut [u8]);
}

impl Addressible for u8 {
    fn width() -> AccessWidth {
        AccessWidth::Byte
    }

    fn from_le(bytes: &[u8]) -> Self {
        bytes.first().copied().unwrap_or(0)
    }

    fn to_le(self, bytes: &mut [u8]) {
        if let Some(b) = bytes.first_mut() {
            *b = self;
        }
    }
}

impl Addressible for u16 {
    fn width() -> AccessWidth {
        AccessWidth::Word
    }

    fn from_le(bytes: &[u8]) -> Self {
        let b0 = bytes.first().copied().unwrap_or(0) as u16;
        let b1 = bytes.get(1).copied().unwrap_or(0) as u16;

        b0 | (b1 << 8)
    }

    fn to_le(self, bytes: &mut [u8]) {
        for (i, b) in bytes.iter_mut().take(2).enumerate() {
            *b = (self >> (i * 8)) as u8;
        }
    }
}
