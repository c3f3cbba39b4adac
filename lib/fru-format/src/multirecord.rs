// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The multirecord area: a chain of records, each under its own pair of
//! checksums, ending at the record whose header sets the end-of-list flag.
//!
//! Unlike the info areas the multirecord area has no length byte and no
//! 8-byte size granularity; it must simply be the last area in the image.

use crate::{checksum, AreaKind, DecodeError, EncodeError};
use core::mem::size_of;
use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

const RECORD_FORMAT_VERSION: u8 = 0x02;
const END_OF_LIST: u8 = 0x80;
const VERSION_MASK: u8 = 0x0F;

/// One multirecord entry. Record types and their payload layouts come from
/// the IPMI and platform management specs; this codec treats the payload as
/// opaque bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiRecord {
    pub record_type: u8,
    pub data: Vec<u8>,
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RecordHeader {
    record_type: u8,
    /// Bit 7 flags the last record of the area; bits 3:0 carry the record
    /// format version.
    format: u8,
    length: u8,
    data_checksum: u8,
    header_checksum: u8,
}

const_assert_eq!(size_of::<RecordHeader>(), 5);

pub(crate) fn encode(records: &[MultiRecord]) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let length = u8::try_from(record.data.len()).map_err(|_| {
            EncodeError::RecordTooLong { index, len: record.data.len() }
        })?;
        let last = index == records.len() - 1;
        let mut header = RecordHeader {
            record_type: record.record_type,
            format: if last {
                RECORD_FORMAT_VERSION | END_OF_LIST
            } else {
                RECORD_FORMAT_VERSION
            },
            length,
            data_checksum: checksum(&record.data),
            header_checksum: 0,
        };
        header.header_checksum = checksum(&header.as_bytes()[..4]);
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&record.data);
    }
    Ok(out)
}

pub(crate) fn decode(
    blob: &[u8],
    offset: usize,
) -> Result<Vec<MultiRecord>, DecodeError> {
    let mut records = Vec::new();
    let mut pos = offset;
    loop {
        let index = records.len();
        let rest = blob
            .get(pos..)
            .ok_or(DecodeError::Truncated(AreaKind::MultiRecord))?;
        let (header, _) = RecordHeader::read_from_prefix(rest)
            .map_err(|_| DecodeError::Truncated(AreaKind::MultiRecord))?;
        if checksum(&header.as_bytes()[..4]) != header.header_checksum {
            return Err(DecodeError::RecordHeaderChecksum { index });
        }
        let version = header.format & VERSION_MASK;
        if version != RECORD_FORMAT_VERSION {
            return Err(DecodeError::RecordVersion { index, version });
        }
        let start = pos + size_of::<RecordHeader>();
        let data = blob
            .get(start..start + usize::from(header.length))
            .ok_or(DecodeError::Truncated(AreaKind::MultiRecord))?;
        if checksum(data) != header.data_checksum {
            return Err(DecodeError::RecordChecksum { index });
        }
        records.push(MultiRecord {
            record_type: header.record_type,
            data: data.to_vec(),
        });
        if header.format & END_OF_LIST != 0 {
            break;
        }
        pos = start + usize::from(header.length);
    }
    Ok(records)
}
