//! Order-preserving tuple codec for key parts.
//!
//! Each element is one type-tag byte followed by a payload whose byte order
//! matches the element's semantic order: strings and byte arrays are
//! null-terminated with interior `0x00` escaped to `0x00 0xFF`, integers use
//! a length-tagged big-endian family with negatives complemented, and
//! doubles use a sign-flipped IEEE-754 image. Lexicographic comparison of
//! two packed tuples therefore equals element-wise comparison.

use crate::error::DockvError;
use crate::keys::KeyBuf;
use crate::value::FieldValue;
use uuid::Uuid;

const NIL: u8 = 0x00;
const BYTES: u8 = 0x01;
const STRING: u8 = 0x02;
const INT_ZERO: u8 = 0x14;
const DOUBLE: u8 = 0x21;
const FALSE: u8 = 0x26;
const TRUE: u8 = 0x27;
const UUID: u8 = 0x30;

const ESCAPE: u8 = 0xFF;
const TERMINATOR: u8 = 0x00;

pub fn pack_into(parts: &[FieldValue], out: &mut KeyBuf) {
    for part in parts {
        pack_element(part, out);
    }
}

fn pack_element(part: &FieldValue, out: &mut KeyBuf) {
    match part {
        FieldValue::Null => out.push(NIL),
        FieldValue::Bytes(b) => {
            out.push(BYTES);
            append_escaped(b, out);
        }
        FieldValue::String(s) => {
            out.push(STRING);
            append_escaped(s.as_bytes(), out);
        }
        FieldValue::Int(v) => pack_int(*v, out),
        FieldValue::Double(f) => {
            out.push(DOUBLE);
            let bits = f.to_bits();
            let mapped = if (bits >> 63) == 1 {
                !bits
            } else {
                bits ^ 0x8000_0000_0000_0000
            };
            out.extend_from_slice(&mapped.to_be_bytes());
        }
        FieldValue::Bool(b) => out.push(if *b { TRUE } else { FALSE }),
        FieldValue::Uuid(u) => {
            out.push(UUID);
            out.extend_from_slice(u.as_bytes());
        }
    }
}

fn append_escaped(bytes: &[u8], out: &mut KeyBuf) {
    for byte in bytes {
        if *byte == 0x00 {
            out.extend_from_slice(&[0x00, ESCAPE]);
        } else {
            out.push(*byte);
        }
    }
    out.push(TERMINATOR);
}

fn pack_int(v: i64, out: &mut KeyBuf) {
    if v == 0 {
        out.push(INT_ZERO);
        return;
    }

    let magnitude = v.unsigned_abs();
    let n = minimal_bytes(magnitude);
    if v > 0 {
        out.push(INT_ZERO + n as u8);
        out.extend_from_slice(&magnitude.to_be_bytes()[8 - n..]);
    } else {
        out.push(INT_ZERO - n as u8);
        let complement = byte_mask(n) - magnitude;
        out.extend_from_slice(&complement.to_be_bytes()[8 - n..]);
    }
}

fn minimal_bytes(magnitude: u64) -> usize {
    ((64 - magnitude.leading_zeros() as usize) + 7) / 8
}

fn byte_mask(n: usize) -> u64 {
    if n >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * n)) - 1
    }
}

pub fn unpack(mut bytes: &[u8]) -> Result<Vec<FieldValue>, DockvError> {
    let mut parts = Vec::new();
    while !bytes.is_empty() {
        let (part, rest) = unpack_element(bytes)?;
        parts.push(part);
        bytes = rest;
    }
    Ok(parts)
}

fn unpack_element(bytes: &[u8]) -> Result<(FieldValue, &[u8]), DockvError> {
    let (&tag, rest) = bytes
        .split_first()
        .ok_or_else(|| DockvError::Decode("empty tuple element".into()))?;

    match tag {
        NIL => Ok((FieldValue::Null, rest)),
        BYTES => {
            let (raw, rest) = take_escaped(rest)?;
            Ok((FieldValue::Bytes(raw), rest))
        }
        STRING => {
            let (raw, rest) = take_escaped(rest)?;
            let s = String::from_utf8(raw)
                .map_err(|e| DockvError::Decode(format!("invalid utf-8 in string element: {e}")))?;
            Ok((FieldValue::String(s.into()), rest))
        }
        DOUBLE => {
            let (raw, rest) = take_fixed(rest, 8)?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(raw);
            let mapped = u64::from_be_bytes(buf);
            let bits = if (mapped >> 63) == 1 {
                mapped ^ 0x8000_0000_0000_0000
            } else {
                !mapped
            };
            Ok((FieldValue::Double(f64::from_bits(bits)), rest))
        }
        FALSE => Ok((FieldValue::Bool(false), rest)),
        TRUE => Ok((FieldValue::Bool(true), rest)),
        UUID => {
            let (raw, rest) = take_fixed(rest, 16)?;
            let u = Uuid::from_slice(raw)
                .map_err(|e| DockvError::Decode(format!("invalid uuid element: {e}")))?;
            Ok((FieldValue::Uuid(u), rest))
        }
        tag if (INT_ZERO - 8..=INT_ZERO + 8).contains(&tag) => unpack_int(tag, rest),
        tag => Err(DockvError::Decode(format!(
            "unknown tuple type tag 0x{tag:02x}"
        ))),
    }
}

fn unpack_int(tag: u8, rest: &[u8]) -> Result<(FieldValue, &[u8]), DockvError> {
    if tag == INT_ZERO {
        return Ok((FieldValue::Int(0), rest));
    }

    let positive = tag > INT_ZERO;
    let n = tag.abs_diff(INT_ZERO) as usize;
    let (raw, rest) = take_fixed(rest, n)?;
    let mut magnitude = [0u8; 8];
    magnitude[8 - n..].copy_from_slice(raw);
    let magnitude = u64::from_be_bytes(magnitude);

    let value = if positive {
        i64::try_from(magnitude)
            .map_err(|_| DockvError::Decode("integer element overflows int64".into()))?
    } else {
        let magnitude = byte_mask(n) - magnitude;
        let signed = -(magnitude as i128);
        i64::try_from(signed)
            .map_err(|_| DockvError::Decode("integer element underflows int64".into()))?
    };
    Ok((FieldValue::Int(value), rest))
}

fn take_fixed(bytes: &[u8], n: usize) -> Result<(&[u8], &[u8]), DockvError> {
    if bytes.len() < n {
        return Err(DockvError::Decode("truncated tuple element".into()));
    }
    Ok(bytes.split_at(n))
}

fn take_escaped(bytes: &[u8]) -> Result<(Vec<u8>, &[u8]), DockvError> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == 0x00 {
            if bytes.get(i + 1) == Some(&ESCAPE) {
                out.push(0x00);
                i += 2;
            } else {
                return Ok((out, &bytes[i + 1..]));
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Err(DockvError::Decode("unterminated tuple element".into()))
}
