// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Info area framing shared by the chassis, board, and product areas.
//!
//! An info area is a version byte, a length in 8-byte units, a short
//! area-specific prologue, a field list closed by 0xC1, zero padding out to
//! an 8-byte boundary, and a trailing checksum over everything before it.

use crate::{
    checksum, field, sum_is_zero, AreaKind, DecodeError, EncodeError, FruField,
    AREA_ALIGN, FORMAT_VERSION,
};

/// Accumulates one info area. Callers push the prologue bytes and fields,
/// then [`AreaBuilder::finish`] closes, pads, and checksums the area.
pub(crate) struct AreaBuilder {
    kind: AreaKind,
    buf: Vec<u8>,
}

impl AreaBuilder {
    pub fn new(kind: AreaKind) -> Self {
        // Version, then a placeholder for the length patched in finish().
        AreaBuilder { kind, buf: vec![FORMAT_VERSION, 0] }
    }

    pub fn push_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Appends the area's named field slots followed by its custom fields.
    ///
    /// An absent slot becomes an empty text field so the slots after it
    /// keep their positions. Trailing absent slots are dropped only when
    /// no custom fields follow; otherwise every slot is emitted, since the
    /// decoder assigns the first `named.len()` fields to the slots.
    pub fn push_fields(
        &mut self,
        named: &[Option<&FruField>],
        custom: &[FruField],
    ) -> Result<(), EncodeError> {
        let empty = FruField::Text(String::new());
        let present = if custom.is_empty() {
            named.iter().rposition(|slot| slot.is_some()).map_or(0, |i| i + 1)
        } else {
            named.len()
        };
        for slot in &named[..present] {
            field::encode(slot.unwrap_or(&empty), self.kind, &mut self.buf)?;
        }
        for f in custom {
            field::encode(f, self.kind, &mut self.buf)?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<Vec<u8>, EncodeError> {
        self.buf.push(field::END_OF_FIELDS);
        // Zero padding until the checksum byte will land on an 8-byte
        // boundary.
        while (self.buf.len() + 1) % AREA_ALIGN != 0 {
            self.buf.push(0);
        }
        let units = (self.buf.len() + 1) / AREA_ALIGN;
        self.buf[1] = u8::try_from(units)
            .map_err(|_| EncodeError::AreaOverflow { area: self.kind })?;
        self.buf.push(checksum(&self.buf));
        Ok(self.buf)
    }
}

/// Slices one info area out of `blob` and validates its bounds, checksum,
/// and version, in that order.
pub(crate) fn take_area(
    blob: &[u8],
    offset: usize,
    kind: AreaKind,
) -> Result<&[u8], DecodeError> {
    let header = blob
        .get(offset..offset + 2)
        .ok_or(DecodeError::Truncated(kind))?;
    if header[1] == 0 {
        return Err(DecodeError::BadAreaLength(kind));
    }
    let len = usize::from(header[1]) * AREA_ALIGN;
    let area = blob
        .get(offset..offset + len)
        .ok_or(DecodeError::Truncated(kind))?;
    if !sum_is_zero(area) {
        return Err(DecodeError::AreaChecksum(kind));
    }
    if area[0] != FORMAT_VERSION {
        return Err(DecodeError::AreaVersion(kind, area[0]));
    }
    Ok(area)
}

/// Walks a field list up to its 0xC1 terminator and splits it into `named`
/// leading slots plus trailing custom fields. Empty named fields come back
/// as `None`; short lists leave the remaining slots `None`.
pub(crate) fn parse_fields(
    body: &[u8],
    kind: AreaKind,
    named: usize,
) -> Result<(Vec<Option<FruField>>, Vec<FruField>), DecodeError> {
    let mut slots = Vec::with_capacity(named);
    let mut custom = Vec::new();
    let mut pos = 0;
    loop {
        let type_length =
            *body.get(pos).ok_or(DecodeError::UnterminatedFields(kind))?;
        if type_length == field::END_OF_FIELDS {
            break;
        }
        let len = field::payload_len(type_length);
        let payload = body
            .get(pos + 1..pos + 1 + len)
            .ok_or(DecodeError::UnterminatedFields(kind))?;
        let value = field::decode(type_length, payload);
        if slots.len() < named {
            slots.push(if value.is_empty() { None } else { Some(value) });
        } else {
            custom.push(value);
        }
        pos += 1 + len;
    }
    slots.resize(named, None);
    Ok((slots, custom))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_chassis() -> Vec<u8> {
        let mut builder = AreaBuilder::new(AreaKind::Chassis);
        builder.push_byte(0x05);
        builder.push_fields(&[None, None], &[]).unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn builder_pads_and_checksums() {
        let area = minimal_chassis();
        assert_eq!(area, [0x01, 0x01, 0x05, 0xC1, 0x00, 0x00, 0x00, 0x38]);
        assert!(sum_is_zero(&area));
        assert_eq!(area.len() % AREA_ALIGN, 0);
    }

    #[test]
    fn builder_emits_interior_gaps() {
        let ab = FruField::Text("AB".into());
        let mut builder = AreaBuilder::new(AreaKind::Chassis);
        builder.push_byte(0);
        builder.push_fields(&[None, Some(&ab)], &[]).unwrap();
        let area = builder.finish().unwrap();
        // Empty text placeholder, then the real field.
        assert_eq!(&area[3..7], [0xC0, 0xC2, 0x41, 0x42]);
    }

    #[test]
    fn builder_keeps_slots_ahead_of_custom() {
        let mut builder = AreaBuilder::new(AreaKind::Chassis);
        builder.push_byte(0);
        let custom = [FruField::Text("CU".into())];
        builder.push_fields(&[None, None], &custom).unwrap();
        let area = builder.finish().unwrap();
        // Both absent slots are emitted so the custom field stays past them.
        assert_eq!(&area[3..9], [0xC0, 0xC0, 0xC2, 0x43, 0x55, 0xC1]);
    }

    #[test]
    fn builder_length_byte_cap() {
        // 255 units of 8 bytes is the largest encodable area. The prologue
        // and trailer take four bytes, so 2036 content bytes just fit.
        let mut builder = AreaBuilder::new(AreaKind::Product);
        builder.push_bytes(&[0; 2036]);
        let area = builder.finish().unwrap();
        assert_eq!(area.len(), 255 * AREA_ALIGN);
        assert_eq!(area[1], 255);

        let mut builder = AreaBuilder::new(AreaKind::Product);
        builder.push_bytes(&[0; 2037]);
        assert_eq!(
            builder.finish(),
            Err(EncodeError::AreaOverflow { area: AreaKind::Product })
        );
    }

    #[test]
    fn take_area_validates() {
        let mut blob = vec![0; AREA_ALIGN];
        blob.extend_from_slice(&minimal_chassis());

        assert!(take_area(&blob, AREA_ALIGN, AreaKind::Chassis).is_ok());
        assert_eq!(
            take_area(&blob[..12], AREA_ALIGN, AreaKind::Chassis),
            Err(DecodeError::Truncated(AreaKind::Chassis))
        );

        let mut corrupt = blob.clone();
        corrupt[10] ^= 0x40;
        assert_eq!(
            take_area(&corrupt, AREA_ALIGN, AreaKind::Chassis),
            Err(DecodeError::AreaChecksum(AreaKind::Chassis))
        );

        // Zero length unit count.
        let mut zero_len = blob.clone();
        zero_len[AREA_ALIGN + 1] = 0;
        assert_eq!(
            take_area(&zero_len, AREA_ALIGN, AreaKind::Chassis),
            Err(DecodeError::BadAreaLength(AreaKind::Chassis))
        );

        // Version 2 with the checksum patched to stay valid.
        let mut bad_version = blob.clone();
        bad_version[AREA_ALIGN] = 0x02;
        bad_version[AREA_ALIGN + 7] = bad_version[AREA_ALIGN + 7].wrapping_sub(1);
        assert_eq!(
            take_area(&bad_version, AREA_ALIGN, AreaKind::Chassis),
            Err(DecodeError::AreaVersion(AreaKind::Chassis, 0x02))
        );
    }

    #[test]
    fn parse_fields_splits_named_and_custom() {
        // Two named slots, the second empty, then one custom field.
        let body = [0xC2, 0x41, 0x42, 0xC0, 0x02, 0xAA, 0xBB, 0xC1, 0x00];
        let (slots, custom) =
            parse_fields(&body, AreaKind::Chassis, 2).unwrap();
        assert_eq!(
            slots,
            [Some(FruField::Text("AB".into())), None]
        );
        assert_eq!(custom, [FruField::Binary(vec![0xAA, 0xBB])]);
    }

    #[test]
    fn parse_fields_backfills_missing_slots() {
        let (slots, custom) =
            parse_fields(&[0xC1], AreaKind::Board, 5).unwrap();
        assert_eq!(slots, [None, None, None, None, None]);
        assert!(custom.is_empty());
    }

    #[test]
    fn parse_fields_requires_terminator() {
        assert_eq!(
            parse_fields(&[0xC2, 0x41, 0x42], AreaKind::Board, 2),
            Err(DecodeError::UnterminatedFields(AreaKind::Board))
        );
        // Truncated mid-payload.
        assert_eq!(
            parse_fields(&[0xC2, 0x41], AreaKind::Board, 2),
            Err(DecodeError::UnterminatedFields(AreaKind::Board))
        );
    }
}
