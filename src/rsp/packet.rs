//! Wire format: `$<payload>#<checksum>` where the checksum is the 8-bit sum of
//! the payload bytes as two lowercase hex digits. A lone `+` acknowledges.
//!
//! The parser pulls one byte at a time straight off the socket and blocks for
//! as long as the client takes to send the rest of a packet. There is no
//! timeout.

use std::io;

use log::debug;
use smol::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const ACK: &[u8] = b"+";
pub const EMPTY_REPLY: &[u8] = b"$#00";

/// Longest hex number accepted in an `m` argument.
const MAX_HEX_DIGITS: usize = 16;

pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);

    out.push(b'$');
    out.extend_from_slice(payload);
    out.extend_from_slice(format!("#{:02x}", checksum(payload)).as_bytes());

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    Question,
    GetRegs,
    ReadMem { addr: usize, len: usize },
    Step,
    Continue,
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    Packet(Packet),
    /// A verb we don't know. Its body and checksum have been consumed.
    Unknown(u8),
    /// A leading byte that is neither `+` nor `$`.
    Async(u8),
    /// The packet broke off mid-way. Nothing should be answered.
    Malformed,
}

async fn read_byte<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b).await?;
    Ok(b[0])
}

/// Reads the next packet, skipping any acks in front of it.
///
/// Any I/O error, including the peer closing the stream, is returned as is;
/// the caller treats all of them as a hangup.
pub async fn read_packet<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Incoming> {
    let c = loop {
        let c = read_byte(r).await?;
        if c != b'+' {
            break c;
        }
    };

    if c != b'$' {
        return Ok(Incoming::Async(c));
    }

    let verb = read_byte(r).await?;
    let mut csum = verb;

    debug!("Got verb '{}' ({:x})", verb as char, verb);

    let packet = match verb {
        b'?' => Packet::Question,
        b'g' => Packet::GetRegs,
        b's' => Packet::Step,
        b'c' => Packet::Continue,
        b'k' => Packet::Kill,
        b'm' => {
            let addr = match read_hex(r, b',', &mut csum).await? {
                Some(addr) => addr,
                None => return Ok(Incoming::Malformed),
            };
            csum = csum.wrapping_add(b',');

            let len = match read_hex(r, b'#', &mut csum).await? {
                Some(len) => len,
                None => return Ok(Incoming::Malformed),
            };

            if !check_trailer(r, csum, 2).await? {
                return Ok(Incoming::Malformed);
            }

            return Ok(Incoming::Packet(Packet::ReadMem { addr, len }));
        }
        _ => {
            discard_packet(r).await?;
            return Ok(Incoming::Unknown(verb));
        }
    };

    if !check_trailer(r, csum, 3).await? {
        return Ok(Incoming::Malformed);
    }

    Ok(Incoming::Packet(packet))
}

/// Reads hex digits up to `term`. `None` if anything else shows up first.
async fn read_hex<R: AsyncRead + Unpin>(
    r: &mut R,
    term: u8,
    csum: &mut u8,
) -> io::Result<Option<usize>> {
    let mut digits = String::new();

    loop {
        let c = read_byte(r).await?;

        if c.is_ascii_hexdigit() {
            if digits.len() == MAX_HEX_DIGITS {
                return Ok(None);
            }
            *csum = csum.wrapping_add(c);
            digits.push(c as char);
            continue;
        }

        if c == term {
            break;
        }

        return Ok(None);
    }

    if digits.is_empty() {
        return Ok(Some(0));
    }

    Ok(usize::from_str_radix(&digits, 16).ok())
}

/// Consumes the checksum trailer: `#XX` when `len` is 3, `XX` when the `#` was
/// already eaten. The sum is compared but a mismatch is still accepted; only a
/// trailer that doesn't start with a hex digit rejects the packet.
async fn check_trailer<R: AsyncRead + Unpin>(
    r: &mut R,
    csum: u8,
    len: usize,
) -> io::Result<bool> {
    let mut trailer = [0u8; 3];
    let trailer = &mut trailer[..len];
    r.read_exact(trailer).await?;

    // Like scanf's %02x: the leading hex run counts, the rest is ignored.
    let digits = &trailer[len - 2..];
    let run = digits.iter().take_while(|c| c.is_ascii_hexdigit()).count();
    let sum = match std::str::from_utf8(&digits[..run])
        .ok()
        .and_then(|s| u8::from_str_radix(s, 16).ok())
    {
        Some(sum) => sum,
        None => return Ok(false),
    };

    debug!("read csum {:x}, input csum {:x}", sum, csum);

    if sum != csum {
        debug!("checksum mismatch ignored");
    }

    Ok(true)
}

/// Throws away everything up to `#` and the two checksum digits after it.
async fn discard_packet<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<()> {
    while read_byte(r).await? != b'#' {}

    let mut csum = [0u8; 2];
    r.read_exact(&mut csum).await
}

pub async fn send_packet<W: AsyncWrite + Unpin>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    w.write_all(&frame(payload)).await?;
    w.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol::io::Cursor;

    fn parse(input: &[u8]) -> io::Result<Incoming> {
        smol::block_on(read_packet(&mut Cursor::new(input.to_vec())))
    }

    #[test]
    fn framing() {
        assert_eq!(frame(b"S05"), b"$S05#b8");
        assert_eq!(frame(b""), EMPTY_REPLY);
        assert_eq!(checksum(b"?"), 0x3f);
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
    }

    #[test]
    fn simple_verbs() {
        assert_eq!(parse(b"$?#3f").unwrap(), Incoming::Packet(Packet::Question));
        assert_eq!(parse(b"+$g#67").unwrap(), Incoming::Packet(Packet::GetRegs));
        assert_eq!(parse(b"++$s#73").unwrap(), Incoming::Packet(Packet::Step));
        assert_eq!(parse(b"$c#63").unwrap(), Incoming::Packet(Packet::Continue));
        assert_eq!(parse(b"$k#6b").unwrap(), Incoming::Packet(Packet::Kill));
    }

    #[test]
    fn checksum_mismatch_is_accepted() {
        assert_eq!(parse(b"$?#00").unwrap(), Incoming::Packet(Packet::Question));
        assert_eq!(parse(b"$?#zz").unwrap(), Incoming::Malformed);
        assert_eq!(parse(b"$?#3z").unwrap(), Incoming::Packet(Packet::Question));
        assert_eq!(parse(b"$m0,4#f").unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(
            parse(b"$m0,4#fx").unwrap(),
            Incoming::Packet(Packet::ReadMem { addr: 0, len: 4 })
        );
    }

    #[test]
    fn read_mem_arguments() {
        assert_eq!(
            parse(b"$mF0000,1A#00").unwrap(),
            Incoming::Packet(Packet::ReadMem {
                addr: 0xF0000,
                len: 0x1A
            })
        );
        assert_eq!(parse(b"$m10;4#00").unwrap(), Incoming::Malformed);
        assert_eq!(parse(b"$m10,4x#00").unwrap(), Incoming::Malformed);
        assert_eq!(parse(b"$m11112222333344445,1#00").unwrap(), Incoming::Malformed);
    }

    #[test]
    fn unknown_verb_is_drained() {
        let mut input = Cursor::new(b"$zfoo,bar#12$?#3f".to_vec());
        smol::block_on(async {
            assert_eq!(read_packet(&mut input).await.unwrap(), Incoming::Unknown(b'z'));
            assert_eq!(
                read_packet(&mut input).await.unwrap(),
                Incoming::Packet(Packet::Question)
            );
        });
    }

    #[test]
    fn stray_byte_and_eof() {
        assert_eq!(parse(b"x").unwrap(), Incoming::Async(b'x'));
        assert_eq!(
            parse(b"+").unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
        assert!(parse(b"$g#6").is_err());
    }
}
