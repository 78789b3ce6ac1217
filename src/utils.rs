use std::fmt::Write;

/// Appends `bytes` as lowercase hex, two characters per byte.
pub fn push_hex(out: &mut String, bytes: &[u8]) {
    for b in bytes {
        // Writing to a String can't fail.
        let _ = write!(out, "{:02x}", b);
    }
}

pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    push_hex(&mut out, bytes);
    out
}
