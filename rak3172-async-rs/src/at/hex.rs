//! Hex rendering and parsing for key material and payloads.
//!
//! Output is always lowercase; input accepts either case. Lengths are strict:
//! decoding fails on odd-length text or when the destination cannot hold the
//! result.

use heapless::{String, Vec};

/// Appends `bytes` to `dst` as lowercase hex digit pairs.
pub(crate) fn push_hex<const N: usize>(dst: &mut String<N>, bytes: &[u8]) -> Result<(), ()> {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    for &byte in bytes {
        dst.push(DIGITS[(byte >> 4) as usize] as char).map_err(|_| ())?;
        dst.push(DIGITS[(byte & 0x0F) as usize] as char).map_err(|_| ())?;
    }
    Ok(())
}

fn digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Decodes hex text into a growable buffer.
pub(crate) fn decode_into<const N: usize>(text: &str, out: &mut Vec<u8, N>) -> Result<(), ()> {
    let raw = text.as_bytes();
    if raw.len() % 2 != 0 {
        return Err(());
    }
    for pair in raw.chunks_exact(2) {
        let hi = digit(pair[0]).ok_or(())?;
        let lo = digit(pair[1]).ok_or(())?;
        out.push((hi << 4) | lo).map_err(|_| ())?;
    }
    Ok(())
}

/// Decodes hex text whose length must exactly fill `out`.
pub(crate) fn decode_exact(text: &str, out: &mut [u8]) -> Result<(), ()> {
    let raw = text.as_bytes();
    if raw.len() != out.len() * 2 {
        return Err(());
    }
    for (slot, pair) in out.iter_mut().zip(raw.chunks_exact(2)) {
        let hi = digit(pair[0]).ok_or(())?;
        let lo = digit(pair[1]).ok_or(())?;
        *slot = (hi << 4) | lo;
    }
    Ok(())
}
