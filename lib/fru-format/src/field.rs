// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Type/length prefixed field values.
//!
//! Every field in an info area starts with one byte: bits 7:6 select the
//! representation and bits 5:0 give the payload length in bytes. The value
//! 0xC1, which would otherwise mean a one-byte text field, instead marks the
//! end of an area's field list.

use crate::{AreaKind, EncodeError, MAX_FIELD_LEN};

const TYPE_BINARY: u8 = 0b00;
const TYPE_BCD_PLUS: u8 = 0b01;
const TYPE_SIX_BIT: u8 = 0b10;
const TYPE_TEXT: u8 = 0b11;

const TYPE_SHIFT: u32 = 6;
const LEN_MASK: u8 = 0x3F;

pub(crate) const END_OF_FIELDS: u8 = 0xC1;

/// One field value, tagged with its stored representation.
///
/// The text-like representations trade range for density: BCD plus packs two
/// characters from a 13-character alphabet per byte, 6-bit ASCII packs four
/// uppercase-only characters into three bytes, and text stores one Latin-1
/// character per byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FruField {
    /// Uninterpreted bytes.
    Binary(Vec<u8>),
    /// Digits plus space, dash, and period. Odd-length values decode with a
    /// trailing `'0'`.
    BcdPlus(String),
    /// Characters 0x20 through 0x5F. Values whose length is 3 mod 4 decode
    /// with a trailing space.
    SixBitAscii(String),
    /// 8-bit ASCII + Latin-1.
    Text(String),
}

impl FruField {
    /// True if the field's encoded payload would be zero bytes long. Named
    /// area slots holding such a field decode as absent.
    pub fn is_empty(&self) -> bool {
        match self {
            FruField::Binary(bytes) => bytes.is_empty(),
            FruField::BcdPlus(s)
            | FruField::SixBitAscii(s)
            | FruField::Text(s) => s.is_empty(),
        }
    }
}

impl From<&str> for FruField {
    fn from(s: &str) -> Self {
        FruField::Text(s.to_string())
    }
}

impl From<String> for FruField {
    fn from(s: String) -> Self {
        FruField::Text(s)
    }
}

/// Appends `field` to `out` as a type/length byte plus payload.
pub(crate) fn encode(
    field: &FruField,
    area: AreaKind,
    out: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    let (ty, payload) = match field {
        FruField::Binary(bytes) => (TYPE_BINARY, bytes.clone()),
        FruField::BcdPlus(s) => (TYPE_BCD_PLUS, bcd_pack(s, area)?),
        FruField::SixBitAscii(s) => (TYPE_SIX_BIT, six_bit_pack(s, area)?),
        FruField::Text(s) => (TYPE_TEXT, latin1_bytes(s, area)?),
    };
    if payload.len() > MAX_FIELD_LEN {
        return Err(EncodeError::FieldTooLong { area, len: payload.len() });
    }
    let type_length = (ty << TYPE_SHIFT) | payload.len() as u8;
    if type_length == END_OF_FIELDS {
        return Err(EncodeError::ReservedTypeLength { area });
    }
    out.push(type_length);
    out.extend_from_slice(&payload);
    Ok(())
}

pub(crate) fn payload_len(type_length: u8) -> usize {
    usize::from(type_length & LEN_MASK)
}

/// Decodes a payload according to its type/length byte. Total: every byte
/// pattern decodes to something, reserved BCD codes included.
pub(crate) fn decode(type_length: u8, payload: &[u8]) -> FruField {
    match type_length >> TYPE_SHIFT {
        TYPE_BINARY => FruField::Binary(payload.to_vec()),
        TYPE_BCD_PLUS => FruField::BcdPlus(bcd_unpack(payload)),
        TYPE_SIX_BIT => FruField::SixBitAscii(six_bit_unpack(payload)),
        _ => FruField::Text(payload.iter().map(|&b| char::from(b)).collect()),
    }
}

fn bcd_digit(c: char) -> Option<u8> {
    match c {
        '0'..='9' => Some(c as u8 - b'0'),
        ' ' => Some(0xA),
        '-' => Some(0xB),
        '.' => Some(0xC),
        _ => None,
    }
}

fn bcd_char(nibble: u8) -> char {
    match nibble {
        0..=9 => char::from(b'0' + nibble),
        0xA => ' ',
        0xB => '-',
        0xC => '.',
        // Reserved codes; ipmitool prints these the same way.
        _ => '?',
    }
}

/// Packs two characters per byte, high nibble first. An odd-length string
/// pads the final low nibble with 0.
fn bcd_pack(s: &str, area: AreaKind) -> Result<Vec<u8>, EncodeError> {
    let mut nibbles = Vec::with_capacity(s.len());
    for c in s.chars() {
        nibbles.push(bcd_digit(c).ok_or(EncodeError::NotBcdPlus { area })?);
    }
    let mut out = Vec::with_capacity(nibbles.len().div_ceil(2));
    for pair in nibbles.chunks(2) {
        let lo = pair.get(1).copied().unwrap_or(0);
        out.push(pair[0] << 4 | lo);
    }
    Ok(out)
}

fn bcd_unpack(payload: &[u8]) -> String {
    let mut s = String::with_capacity(payload.len() * 2);
    for &b in payload {
        s.push(bcd_char(b >> 4));
        s.push(bcd_char(b & 0xF));
    }
    s
}

/// Packs four 6-bit codes into three bytes, little-endian: the first
/// character occupies the low six bits of the first byte.
fn six_bit_pack(s: &str, area: AreaKind) -> Result<Vec<u8>, EncodeError> {
    let mut codes = Vec::with_capacity(s.len());
    for c in s.chars() {
        if !(' '..='_').contains(&c) {
            return Err(EncodeError::NotSixBitAscii { area });
        }
        codes.push(c as u8 - 0x20);
    }
    let mut out = Vec::with_capacity(codes.len() * 3 / 4 + 3);
    for group in codes.chunks(4) {
        let mut bits: u32 = 0;
        for (i, &code) in group.iter().enumerate() {
            bits |= u32::from(code) << (6 * i);
        }
        let nbytes = (group.len() * 6).div_ceil(8);
        out.extend_from_slice(&bits.to_le_bytes()[..nbytes]);
    }
    Ok(out)
}

fn six_bit_unpack(payload: &[u8]) -> String {
    let mut s = String::with_capacity(payload.len() * 4 / 3 + 1);
    for group in payload.chunks(3) {
        let mut bits: u32 = 0;
        for (i, &b) in group.iter().enumerate() {
            bits |= u32::from(b) << (8 * i);
        }
        for i in 0..group.len() * 8 / 6 {
            let code = (bits >> (6 * i)) as u8 & LEN_MASK;
            s.push(char::from(code + 0x20));
        }
    }
    s
}

fn latin1_bytes(s: &str, area: AreaKind) -> Result<Vec<u8>, EncodeError> {
    s.chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| EncodeError::NotLatin1 { area })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn check_encode(field: FruField, expect: &[u8]) {
        let mut out = Vec::new();
        encode(&field, AreaKind::Board, &mut out).unwrap();
        assert_eq!(out, expect);
    }

    #[track_caller]
    fn check_error(field: FruField, expect: EncodeError) {
        let mut out = Vec::new();
        assert_eq!(encode(&field, AreaKind::Board, &mut out), Err(expect));
    }

    #[test]
    fn binary_encoding() {
        check_encode(FruField::Binary(vec![1, 2, 3]), &[0x03, 1, 2, 3]);
        check_encode(FruField::Binary(vec![0xC1]), &[0x01, 0xC1]);
        check_encode(FruField::Binary(vec![]), &[0x00]);
    }

    #[test]
    fn text_encoding() {
        check_encode(FruField::Text("ACME".into()), &[0xC4, 0x41, 0x43, 0x4D, 0x45]);
        check_encode(FruField::Text("".into()), &[0xC0]);
        // Latin-1 high half.
        check_encode(FruField::Text("éé".into()), &[0xC2, 0xE9, 0xE9]);
        check_error(
            FruField::Text("€".into()),
            EncodeError::NotLatin1 { area: AreaKind::Board },
        );
    }

    #[test]
    fn bcd_encoding() {
        check_encode(FruField::BcdPlus("0123".into()), &[0x42, 0x01, 0x23]);
        check_encode(FruField::BcdPlus("9 -.".into()), &[0x42, 0x9A, 0xBC]);
        // Odd length pads the low nibble.
        check_encode(FruField::BcdPlus("123".into()), &[0x42, 0x12, 0x30]);
        check_error(
            FruField::BcdPlus("12a".into()),
            EncodeError::NotBcdPlus { area: AreaKind::Board },
        );
    }

    #[test]
    fn bcd_decoding() {
        assert_eq!(
            decode(0x42, &[0x12, 0x30]),
            FruField::BcdPlus("1230".into())
        );
        // Reserved nibbles decode as '?'.
        assert_eq!(decode(0x41, &[0xD5]), FruField::BcdPlus("?5".into()));
    }

    #[test]
    fn six_bit_encoding() {
        check_encode(
            FruField::SixBitAscii("IPMI".into()),
            &[0x83, 0x29, 0xDC, 0xA6],
        );
        check_error(
            FruField::SixBitAscii("ipmi".into()),
            EncodeError::NotSixBitAscii { area: AreaKind::Board },
        );
    }

    #[test]
    fn six_bit_partial_groups() {
        // 1, 2, and 3 trailing characters pack into 1, 2, and 3 bytes.
        check_encode(FruField::SixBitAscii("A".into()), &[0x81, 0x21]);
        check_encode(FruField::SixBitAscii("AB".into()), &[0x82, 0xA1, 0x08]);
        check_encode(
            FruField::SixBitAscii("ABC".into()),
            &[0x83, 0xA1, 0x38, 0x02],
        );
    }

    #[test]
    fn six_bit_round_trip() {
        assert_eq!(
            decode(0x83, &[0x29, 0xDC, 0xA6]),
            FruField::SixBitAscii("IPMI".into())
        );
        // Three characters occupy three bytes, which decode as four: the
        // high padding bits come back as a trailing space.
        assert_eq!(
            decode(0x83, &[0xA1, 0x38, 0x02]),
            FruField::SixBitAscii("ABC ".into())
        );
    }

    #[test]
    fn length_limits() {
        check_encode(
            FruField::Text("x".repeat(63)),
            &[[0xFF].as_slice(), "x".repeat(63).as_bytes()].concat(),
        );
        check_error(
            FruField::Text("x".repeat(64)),
            EncodeError::FieldTooLong { area: AreaKind::Board, len: 64 },
        );
        // 128 BCD characters pack into 64 bytes, one over the cap.
        check_error(
            FruField::BcdPlus("1".repeat(128)),
            EncodeError::FieldTooLong { area: AreaKind::Board, len: 64 },
        );
    }

    #[test]
    fn reserved_type_length() {
        check_error(
            FruField::Text("X".into()),
            EncodeError::ReservedTypeLength { area: AreaKind::Board },
        );
    }

    #[test]
    fn every_type_length_decodes() {
        for tl in 0..=0xFFu8 {
            let payload = vec![0x35; payload_len(tl)];
            decode(tl, &payload);
        }
    }
}
