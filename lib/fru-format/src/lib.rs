// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Encoding and decoding of IPMI FRU (Field Replaceable Unit) images.
//!
//! A FRU EEPROM describes the identity of a replaceable hardware component:
//! who made it, its part and serial numbers, when it was built. The layout
//! comes from the IPMI FRU Information Storage Definition, v1.0. An image is
//! a fixed 8-byte common header followed by up to five areas, each located by
//! a header offset expressed in 8-byte units (offset 0 meaning "absent"):
//!
//! ```text
//! +--------------------+
//! | common header (8B) |  version, five area offsets, pad, checksum
//! +--------------------+
//! | internal use area  |  version byte + opaque data
//! +--------------------+
//! | chassis info area  |
//! +--------------------+   each info area: version, length in 8-byte
//! | board info area    |   units, fields, 0xC1 terminator, zero padding,
//! +--------------------+   checksum
//! | product info area  |
//! +--------------------+
//! | multirecord area   |  chain of [5-byte header + payload] records
//! +--------------------+
//! ```
//!
//! The header, every info area, and every multirecord record carry a zero
//! checksum: the byte sum of the protected region, checksum included, is 0
//! modulo 256.
//!
//! [`encode`] turns a [`FruData`] into an image and [`decode`] reads one
//! back. The two are inverses up to the format's documented normalizations:
//!
//! * A named field holding an empty value decodes as absent.
//! * A BCD plus string of odd length gains a trailing `'0'`.
//! * A 6-bit ASCII string whose length is 3 mod 4 gains a trailing space.
//! * Internal use data is zero padded up to the next 8-byte boundary.
//!
//! Data that avoids those cases round-trips byte for byte.

mod area;
mod field;
mod multirecord;

pub use field::FruField;
pub use multirecord::MultiRecord;

use core::fmt;
use core::mem::size_of;
use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Format version carried by the common header and every area.
pub const FORMAT_VERSION: u8 = 0x01;

/// Areas are located and sized in units of this many bytes.
pub const AREA_ALIGN: usize = 8;

/// Longest encoded field payload a type/length byte can describe.
pub const MAX_FIELD_LEN: usize = 63;

/// Largest board manufacturing date: the field is stored in three bytes of
/// minutes since 1996-01-01 00:00 GMT.
pub const MAX_MFG_DATE: u32 = 0xFF_FFFF;

/// The five top-level sections of a FRU image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaKind {
    InternalUse,
    Chassis,
    Board,
    Product,
    MultiRecord,
}

impl fmt::Display for AreaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AreaKind::InternalUse => "internal use",
            AreaKind::Chassis => "chassis",
            AreaKind::Board => "board",
            AreaKind::Product => "product",
            AreaKind::MultiRecord => "multirecord",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// A field's encoded payload exceeds [`MAX_FIELD_LEN`].
    FieldTooLong { area: AreaKind, len: usize },
    /// The field would encode as a lone 0xC1 type/length byte, which the
    /// format reserves as the end-of-fields marker. Only a one-character
    /// text field hits this; pad it or use another representation.
    ReservedTypeLength { area: AreaKind },
    NotLatin1 { area: AreaKind },
    NotBcdPlus { area: AreaKind },
    NotSixBitAscii { area: AreaKind },
    /// Minutes since the 1996 epoch must fit in three bytes.
    MfgDateRange { minutes: u32 },
    /// An area grew past the 255 8-byte units its length byte can express.
    AreaOverflow { area: AreaKind },
    /// An area starts past the 255 8-byte units a header offset can express.
    OffsetOverflow { area: AreaKind },
    /// A multirecord payload exceeds the 255 bytes its length byte allows.
    RecordTooLong { index: usize, len: usize },
    /// The image does not fit the capacity given to [`encode_padded`].
    CapacityExceeded { need: usize, capacity: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::FieldTooLong { area, len } => write!(
                f,
                "{area} area field encodes to {len} bytes, max {MAX_FIELD_LEN}"
            ),
            EncodeError::ReservedTypeLength { area } => write!(
                f,
                "{area} area one-character text field collides with the \
                 end-of-fields marker"
            ),
            EncodeError::NotLatin1 { area } => {
                write!(f, "{area} area text field contains non-Latin-1 characters")
            }
            EncodeError::NotBcdPlus { area } => write!(
                f,
                "{area} area BCD plus field may only contain digits, space, \
                 dash, and period"
            ),
            EncodeError::NotSixBitAscii { area } => write!(
                f,
                "{area} area 6-bit ASCII field may only contain characters \
                 0x20 through 0x5f"
            ),
            EncodeError::MfgDateRange { minutes } => write!(
                f,
                "manufacturing date of {minutes} minutes does not fit in \
                 three bytes"
            ),
            EncodeError::AreaOverflow { area } => {
                write!(f, "{area} area exceeds the maximum encodable length")
            }
            EncodeError::OffsetOverflow { area } => {
                write!(f, "{area} area starts past the maximum header offset")
            }
            EncodeError::RecordTooLong { index, len } => {
                write!(f, "multirecord {index} payload is {len} bytes, max 255")
            }
            EncodeError::CapacityExceeded { need, capacity } => {
                write!(f, "image needs {need} bytes but capacity is {capacity}")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The image is smaller than the 8-byte common header.
    TooShort,
    HeaderChecksum,
    HeaderVersion(u8),
    /// An area extends past the end of the image.
    Truncated(AreaKind),
    AreaVersion(AreaKind, u8),
    AreaChecksum(AreaKind),
    /// An info area declares a length of zero units.
    BadAreaLength(AreaKind),
    /// An info area's field list is not closed by an 0xC1 marker.
    UnterminatedFields(AreaKind),
    RecordVersion { index: usize, version: u8 },
    RecordHeaderChecksum { index: usize },
    RecordChecksum { index: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TooShort => {
                write!(f, "image is shorter than the common header")
            }
            DecodeError::HeaderChecksum => {
                write!(f, "common header checksum mismatch")
            }
            DecodeError::HeaderVersion(v) => {
                write!(f, "unsupported common header version {v:#04x}")
            }
            DecodeError::Truncated(area) => {
                write!(f, "{area} area extends past the end of the image")
            }
            DecodeError::AreaVersion(area, v) => {
                write!(f, "unsupported {area} area version {v:#04x}")
            }
            DecodeError::AreaChecksum(area) => {
                write!(f, "{area} area checksum mismatch")
            }
            DecodeError::BadAreaLength(area) => {
                write!(f, "{area} area declares a length of zero")
            }
            DecodeError::UnterminatedFields(area) => {
                write!(f, "{area} area fields are not terminated")
            }
            DecodeError::RecordVersion { index, version } => write!(
                f,
                "multirecord {index} has unsupported format version {version:#04x}"
            ),
            DecodeError::RecordHeaderChecksum { index } => {
                write!(f, "multirecord {index} header checksum mismatch")
            }
            DecodeError::RecordChecksum { index } => {
                write!(f, "multirecord {index} payload checksum mismatch")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Computes the zero checksum of `data`: the byte which, appended to `data`,
/// makes the byte sum of the whole 0 modulo 256.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b)).wrapping_neg()
}

pub(crate) fn sum_is_zero(data: &[u8]) -> bool {
    data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b)) == 0
}

/// In-memory form of a FRU image.
///
/// Every section is optional; an empty `multirecord` list means the image
/// carries no multirecord area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FruData {
    /// Opaque bytes for the internal use area. Encoding pads this with
    /// zeros up to the next 8-byte boundary, so decoded data may be longer
    /// than what was encoded.
    pub internal_use: Option<Vec<u8>>,
    pub chassis: Option<ChassisInfo>,
    pub board: Option<BoardInfo>,
    pub product: Option<ProductInfo>,
    pub multirecord: Vec<MultiRecord>,
}

/// Chassis info area contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChassisInfo {
    /// Enclosure type from the SMBIOS system enclosure table.
    pub chassis_type: u8,
    pub part_number: Option<FruField>,
    pub serial_number: Option<FruField>,
    pub custom: Vec<FruField>,
}

/// Board info area contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardInfo {
    /// IPMI language code; 0 is English.
    pub language: u8,
    /// Minutes since 1996-01-01 00:00 GMT, or 0 if unspecified. Must not
    /// exceed [`MAX_MFG_DATE`].
    pub mfg_date: u32,
    pub manufacturer: Option<FruField>,
    pub product_name: Option<FruField>,
    pub serial_number: Option<FruField>,
    pub part_number: Option<FruField>,
    pub fru_file_id: Option<FruField>,
    pub custom: Vec<FruField>,
}

/// Product info area contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductInfo {
    /// IPMI language code; 0 is English.
    pub language: u8,
    pub manufacturer: Option<FruField>,
    pub product_name: Option<FruField>,
    pub part_number: Option<FruField>,
    pub version: Option<FruField>,
    pub serial_number: Option<FruField>,
    pub asset_tag: Option<FruField>,
    pub fru_file_id: Option<FruField>,
    pub custom: Vec<FruField>,
}

/// The fixed 8-byte structure at the start of every image. Offsets are in
/// units of [`AREA_ALIGN`] bytes from the start of the image; 0 marks an
/// absent area.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct CommonHeader {
    version: u8,
    internal_use: u8,
    chassis: u8,
    board: u8,
    product: u8,
    multirecord: u8,
    #[allow(dead_code)]
    pad: u8,
    checksum: u8,
}

const_assert_eq!(size_of::<CommonHeader>(), 8);

/// Encodes `fru` as a FRU image.
///
/// Areas are laid out in the fixed order internal use, chassis, board,
/// product, multirecord, with no gaps after the header.
pub fn encode(fru: &FruData) -> Result<Vec<u8>, EncodeError> {
    let internal = fru.internal_use.as_deref().map(encode_internal);
    let chassis = fru.chassis.as_ref().map(encode_chassis).transpose()?;
    let board = fru.board.as_ref().map(encode_board).transpose()?;
    let product = fru.product.as_ref().map(encode_product).transpose()?;
    let multirecord = if fru.multirecord.is_empty() {
        None
    } else {
        Some(multirecord::encode(&fru.multirecord)?)
    };

    let mut header = CommonHeader::new_zeroed();
    header.version = FORMAT_VERSION;

    // The header itself occupies the first 8-byte unit.
    let mut next_unit = 1;
    if let Some(bytes) = &internal {
        header.internal_use = area_offset(next_unit, AreaKind::InternalUse)?;
        next_unit += bytes.len() / AREA_ALIGN;
    }
    if let Some(bytes) = &chassis {
        header.chassis = area_offset(next_unit, AreaKind::Chassis)?;
        next_unit += bytes.len() / AREA_ALIGN;
    }
    if let Some(bytes) = &board {
        header.board = area_offset(next_unit, AreaKind::Board)?;
        next_unit += bytes.len() / AREA_ALIGN;
    }
    if let Some(bytes) = &product {
        header.product = area_offset(next_unit, AreaKind::Product)?;
        next_unit += bytes.len() / AREA_ALIGN;
    }
    if multirecord.is_some() {
        header.multirecord = area_offset(next_unit, AreaKind::MultiRecord)?;
    }
    let sum = checksum(&header.as_bytes()[..7]);
    header.checksum = sum;

    let mut blob = Vec::with_capacity(next_unit * AREA_ALIGN);
    blob.extend_from_slice(header.as_bytes());
    for bytes in [&internal, &chassis, &board, &product, &multirecord]
        .into_iter()
        .flatten()
    {
        blob.extend_from_slice(bytes);
    }
    Ok(blob)
}

/// Encodes `fru` and zero pads the image to exactly `capacity` bytes,
/// typically the size of the target EEPROM.
pub fn encode_padded(
    fru: &FruData,
    capacity: usize,
) -> Result<Vec<u8>, EncodeError> {
    let mut blob = encode(fru)?;
    if blob.len() > capacity {
        return Err(EncodeError::CapacityExceeded {
            need: blob.len(),
            capacity,
        });
    }
    blob.resize(capacity, 0);
    Ok(blob)
}

/// Decodes a FRU image.
///
/// Trailing bytes past the last area are ignored, so a raw dump of an
/// EEPROM larger than its contents decodes cleanly.
pub fn decode(blob: &[u8]) -> Result<FruData, DecodeError> {
    let (header, _) =
        CommonHeader::read_from_prefix(blob).map_err(|_| DecodeError::TooShort)?;
    if checksum(&blob[..7]) != header.checksum {
        return Err(DecodeError::HeaderChecksum);
    }
    if header.version != FORMAT_VERSION {
        return Err(DecodeError::HeaderVersion(header.version));
    }

    let mut fru = FruData::default();

    if header.internal_use != 0 {
        let start = usize::from(header.internal_use) * AREA_ALIGN;
        // The internal use area stores no length of its own; it runs to the
        // start of the next area, or to the end of the image.
        let end = [header.chassis, header.board, header.product, header.multirecord]
            .iter()
            .map(|&unit| usize::from(unit) * AREA_ALIGN)
            .filter(|&offset| offset > start)
            .min()
            .unwrap_or(blob.len())
            .min(blob.len());
        let area = blob
            .get(start..end)
            .ok_or(DecodeError::Truncated(AreaKind::InternalUse))?;
        let (&version, data) = area
            .split_first()
            .ok_or(DecodeError::Truncated(AreaKind::InternalUse))?;
        if version != FORMAT_VERSION {
            return Err(DecodeError::AreaVersion(AreaKind::InternalUse, version));
        }
        fru.internal_use = Some(data.to_vec());
    }
    if header.chassis != 0 {
        let area = area::take_area(
            blob,
            usize::from(header.chassis) * AREA_ALIGN,
            AreaKind::Chassis,
        )?;
        fru.chassis = Some(decode_chassis(area)?);
    }
    if header.board != 0 {
        let area = area::take_area(
            blob,
            usize::from(header.board) * AREA_ALIGN,
            AreaKind::Board,
        )?;
        fru.board = Some(decode_board(area)?);
    }
    if header.product != 0 {
        let area = area::take_area(
            blob,
            usize::from(header.product) * AREA_ALIGN,
            AreaKind::Product,
        )?;
        fru.product = Some(decode_product(area)?);
    }
    if header.multirecord != 0 {
        fru.multirecord = multirecord::decode(
            blob,
            usize::from(header.multirecord) * AREA_ALIGN,
        )?;
    }
    Ok(fru)
}

fn area_offset(unit: usize, area: AreaKind) -> Result<u8, EncodeError> {
    u8::try_from(unit).map_err(|_| EncodeError::OffsetOverflow { area })
}

fn encode_internal(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity((1 + data.len()).next_multiple_of(AREA_ALIGN));
    out.push(FORMAT_VERSION);
    out.extend_from_slice(data);
    out.resize(out.len().next_multiple_of(AREA_ALIGN), 0);
    out
}

fn encode_chassis(chassis: &ChassisInfo) -> Result<Vec<u8>, EncodeError> {
    let mut area = area::AreaBuilder::new(AreaKind::Chassis);
    area.push_byte(chassis.chassis_type);
    area.push_fields(
        &[chassis.part_number.as_ref(), chassis.serial_number.as_ref()],
        &chassis.custom,
    )?;
    area.finish()
}

fn encode_board(board: &BoardInfo) -> Result<Vec<u8>, EncodeError> {
    if board.mfg_date > MAX_MFG_DATE {
        return Err(EncodeError::MfgDateRange { minutes: board.mfg_date });
    }
    let mut area = area::AreaBuilder::new(AreaKind::Board);
    area.push_byte(board.language);
    area.push_bytes(&board.mfg_date.to_le_bytes()[..3]);
    area.push_fields(
        &[
            board.manufacturer.as_ref(),
            board.product_name.as_ref(),
            board.serial_number.as_ref(),
            board.part_number.as_ref(),
            board.fru_file_id.as_ref(),
        ],
        &board.custom,
    )?;
    area.finish()
}

fn encode_product(product: &ProductInfo) -> Result<Vec<u8>, EncodeError> {
    let mut area = area::AreaBuilder::new(AreaKind::Product);
    area.push_byte(product.language);
    area.push_fields(
        &[
            product.manufacturer.as_ref(),
            product.product_name.as_ref(),
            product.part_number.as_ref(),
            product.version.as_ref(),
            product.serial_number.as_ref(),
            product.asset_tag.as_ref(),
            product.fru_file_id.as_ref(),
        ],
        &product.custom,
    )?;
    area.finish()
}

// The decode_* helpers receive an area already validated by take_area, so
// the slice is at least AREA_ALIGN bytes and its checksum holds.

fn decode_chassis(area: &[u8]) -> Result<ChassisInfo, DecodeError> {
    let (slots, custom) =
        area::parse_fields(&area[3..area.len() - 1], AreaKind::Chassis, 2)?;
    let mut slots = slots.into_iter();
    Ok(ChassisInfo {
        chassis_type: area[2],
        part_number: slots.next().flatten(),
        serial_number: slots.next().flatten(),
        custom,
    })
}

fn decode_board(area: &[u8]) -> Result<BoardInfo, DecodeError> {
    let (slots, custom) =
        area::parse_fields(&area[6..area.len() - 1], AreaKind::Board, 5)?;
    let mut slots = slots.into_iter();
    Ok(BoardInfo {
        language: area[2],
        mfg_date: u32::from_le_bytes([area[3], area[4], area[5], 0]),
        manufacturer: slots.next().flatten(),
        product_name: slots.next().flatten(),
        serial_number: slots.next().flatten(),
        part_number: slots.next().flatten(),
        fru_file_id: slots.next().flatten(),
        custom,
    })
}

fn decode_product(area: &[u8]) -> Result<ProductInfo, DecodeError> {
    let (slots, custom) =
        area::parse_fields(&area[3..area.len() - 1], AreaKind::Product, 7)?;
    let mut slots = slots.into_iter();
    Ok(ProductInfo {
        language: area[2],
        manufacturer: slots.next().flatten(),
        product_name: slots.next().flatten(),
        part_number: slots.next().flatten(),
        version: slots.next().flatten(),
        serial_number: slots.next().flatten(),
        asset_tag: slots.next().flatten(),
        fru_file_id: slots.next().flatten(),
        custom,
    })
}
