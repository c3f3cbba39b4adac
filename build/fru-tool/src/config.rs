// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TOML description of a FRU image.
//!
//! A description holds one table per area, all optional:
//!
//! ```toml
//! [common]
//! size = 256                      # pad the image to the EEPROM size
//!
//! [internal]
//! hex = "deadbeef"                # or data = [...], or file = "raw.bin"
//!
//! [chassis]
//! type = 23
//! part_number = "CHAS-0042"
//!
//! [board]
//! mfg_date = "2024-05-17 12:30"   # GMT, minute granularity
//! manufacturer = "ACME"
//! product_name = "Widget II"
//! serial_number = { bcd = "0123-4567" }
//! part_number = { sixbit = "PCB-99" }
//! custom = [{ hex = "55aa" }]
//!
//! [product]
//! manufacturer = "ACME"
//! product_name = "Widget System"
//!
//! [[multirecord]]
//! type = 0xc0
//! hex = "010203"
//! ```
//!
//! A bare string field stores as Latin-1 text; `{ bcd = .. }`,
//! `{ sixbit = .. }`, and `{ hex = .. }` select the packed BCD plus, 6-bit
//! ASCII, and binary representations. Manufacturing dates are minutes since
//! 1996-01-01 00:00 GMT on the wire, so they reach from 1996 to late 2027;
//! an omitted date encodes as unspecified.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use fru_format::{
    BoardInfo, ChassisInfo, FruData, FruField, MultiRecord, ProductInfo,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FruConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common: Option<CommonConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal: Option<InternalConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chassis: Option<ChassisConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<BoardConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multirecord: Vec<RecordConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommonConfig {
    /// Total image size in bytes; the encoded image is zero padded out to
    /// this and must not exceed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

/// Internal use area contents, from exactly one of an inline byte array,
/// a hex string, or a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InternalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChassisConfig {
    /// SMBIOS system enclosure type.
    #[serde(default, rename = "type")]
    pub chassis_type: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardConfig {
    #[serde(default)]
    pub language: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfg_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fru_file_id: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductConfig {
    #[serde(default)]
    pub language: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_tag: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fru_file_id: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordConfig {
    #[serde(rename = "type")]
    pub record_type: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
}

/// One field value. A bare string is Latin-1 text; the single-key table
/// forms select the packed representations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Text(String),
    Bcd { bcd: String },
    SixBit { sixbit: String },
    Binary { hex: String },
}

impl FruConfig {
    /// Builds the binary image, honoring `common.size` if set.
    pub fn to_image(&self) -> Result<Vec<u8>> {
        let fru = self.to_fru()?;
        Ok(match self.common.as_ref().and_then(|c| c.size) {
            Some(size) => fru_format::encode_padded(&fru, size)?,
            None => fru_format::encode(&fru)?,
        })
    }

    pub fn to_fru(&self) -> Result<FruData> {
        Ok(FruData {
            internal_use: self
                .internal
                .as_ref()
                .map(InternalConfig::resolve)
                .transpose()?,
            chassis: self
                .chassis
                .as_ref()
                .map(ChassisConfig::to_chassis)
                .transpose()?,
            board: self.board.as_ref().map(BoardConfig::to_board).transpose()?,
            product: self
                .product
                .as_ref()
                .map(ProductConfig::to_product)
                .transpose()?,
            multirecord: self
                .multirecord
                .iter()
                .map(RecordConfig::resolve)
                .collect::<Result<_>>()?,
        })
    }

    /// Renders decoded data back into a description that `encode` accepts.
    /// Binary data comes out in the hex forms.
    pub fn from_fru(fru: &FruData) -> Self {
        FruConfig {
            common: None,
            internal: fru.internal_use.as_ref().map(|data| InternalConfig {
                hex: Some(hex::encode(data)),
                ..InternalConfig::default()
            }),
            chassis: fru.chassis.as_ref().map(ChassisConfig::from_chassis),
            board: fru.board.as_ref().map(BoardConfig::from_board),
            product: fru.product.as_ref().map(ProductConfig::from_product),
            multirecord: fru
                .multirecord
                .iter()
                .map(RecordConfig::from_record)
                .collect(),
        }
    }
}

impl InternalConfig {
    fn resolve(&self) -> Result<Vec<u8>> {
        match (&self.data, &self.hex, &self.file) {
            (Some(data), None, None) => Ok(data.clone()),
            (None, Some(hex), None) => {
                hex::decode(hex).context("bad [internal] hex")
            }
            (None, None, Some(file)) => std::fs::read(file)
                .with_context(|| format!("reading {}", file.display())),
            _ => bail!("[internal] must set exactly one of data, hex, file"),
        }
    }
}

impl ChassisConfig {
    fn to_chassis(&self) -> Result<ChassisInfo> {
        Ok(ChassisInfo {
            chassis_type: self.chassis_type,
            part_number: opt_field(&self.part_number)?,
            serial_number: opt_field(&self.serial_number)?,
            custom: custom_fields(&self.custom)?,
        })
    }

    fn from_chassis(chassis: &ChassisInfo) -> Self {
        ChassisConfig {
            chassis_type: chassis.chassis_type,
            part_number: chassis.part_number.as_ref().map(FieldSpec::from_field),
            serial_number: chassis
                .serial_number
                .as_ref()
                .map(FieldSpec::from_field),
            custom: chassis.custom.iter().map(FieldSpec::from_field).collect(),
        }
    }
}

impl BoardConfig {
    fn to_board(&self) -> Result<BoardInfo> {
        Ok(BoardInfo {
            language: self.language,
            mfg_date: match &self.mfg_date {
                Some(date) => parse_mfg_date(date)?,
                None => 0,
            },
            manufacturer: opt_field(&self.manufacturer)?,
            product_name: opt_field(&self.product_name)?,
            serial_number: opt_field(&self.serial_number)?,
            part_number: opt_field(&self.part_number)?,
            fru_file_id: opt_field(&self.fru_file_id)?,
            custom: custom_fields(&self.custom)?,
        })
    }

    fn from_board(board: &BoardInfo) -> Self {
        BoardConfig {
            language: board.language,
            mfg_date: (board.mfg_date != 0)
                .then(|| format_mfg_date(board.mfg_date)),
            manufacturer: board.manufacturer.as_ref().map(FieldSpec::from_field),
            product_name: board.product_name.as_ref().map(FieldSpec::from_field),
            serial_number: board
                .serial_number
                .as_ref()
                .map(FieldSpec::from_field),
            part_number: board.part_number.as_ref().map(FieldSpec::from_field),
            fru_file_id: board.fru_file_id.as_ref().map(FieldSpec::from_field),
            custom: board.custom.iter().map(FieldSpec::from_field).collect(),
        }
    }
}

impl ProductConfig {
    fn to_product(&self) -> Result<ProductInfo> {
        Ok(ProductInfo {
            language: self.language,
            manufacturer: opt_field(&self.manufacturer)?,
            product_name: opt_field(&self.product_name)?,
            part_number: opt_field(&self.part_number)?,
            version: opt_field(&self.version)?,
            serial_number: opt_field(&self.serial_number)?,
            asset_tag: opt_field(&self.asset_tag)?,
            fru_file_id: opt_field(&self.fru_file_id)?,
            custom: custom_fields(&self.custom)?,
        })
    }

    fn from_product(product: &ProductInfo) -> Self {
        ProductConfig {
            language: product.language,
            manufacturer: product
                .manufacturer
                .as_ref()
                .map(FieldSpec::from_field),
            product_name: product
                .product_name
                .as_ref()
                .map(FieldSpec::from_field),
            part_number: product.part_number.as_ref().map(FieldSpec::from_field),
            version: product.version.as_ref().map(FieldSpec::from_field),
            serial_number: product
                .serial_number
                .as_ref()
                .map(FieldSpec::from_field),
            asset_tag: product.asset_tag.as_ref().map(FieldSpec::from_field),
            fru_file_id: product.fru_file_id.as_ref().map(FieldSpec::from_field),
            custom: product.custom.iter().map(FieldSpec::from_field).collect(),
        }
    }
}

impl RecordConfig {
    fn resolve(&self) -> Result<MultiRecord> {
        let data = match (&self.data, &self.hex) {
            (Some(data), None) => data.clone(),
            (None, Some(hex)) => {
                hex::decode(hex).context("bad [[multirecord]] hex")?
            }
            (None, None) => Vec::new(),
            (Some(_), Some(_)) => {
                bail!("[[multirecord]] may not set both data and hex")
            }
        };
        Ok(MultiRecord { record_type: self.record_type, data })
    }

    fn from_record(record: &MultiRecord) -> Self {
        RecordConfig {
            record_type: record.record_type,
            data: None,
            hex: Some(hex::encode(&record.data)),
        }
    }
}

impl FieldSpec {
    fn to_field(&self) -> Result<FruField> {
        Ok(match self {
            FieldSpec::Text(s) => FruField::Text(s.clone()),
            FieldSpec::Bcd { bcd } => FruField::BcdPlus(bcd.clone()),
            FieldSpec::SixBit { sixbit } => {
                FruField::SixBitAscii(sixbit.clone())
            }
            FieldSpec::Binary { hex } => {
                FruField::Binary(hex::decode(hex).context("bad hex field")?)
            }
        })
    }

    fn from_field(field: &FruField) -> Self {
        match field {
            FruField::Text(s) => FieldSpec::Text(s.clone()),
            FruField::BcdPlus(s) => FieldSpec::Bcd { bcd: s.clone() },
            FruField::SixBitAscii(s) => {
                FieldSpec::SixBit { sixbit: s.clone() }
            }
            FruField::Binary(bytes) => {
                FieldSpec::Binary { hex: hex::encode(bytes) }
            }
        }
    }
}

fn opt_field(spec: &Option<FieldSpec>) -> Result<Option<FruField>> {
    spec.as_ref().map(FieldSpec::to_field).transpose()
}

fn custom_fields(specs: &[FieldSpec]) -> Result<Vec<FruField>> {
    specs.iter().map(FieldSpec::to_field).collect()
}

const MFG_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

fn fru_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1996, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
}

fn parse_mfg_date(date: &str) -> Result<u32> {
    let dt = NaiveDateTime::parse_from_str(date, MFG_DATE_FORMAT)
        .with_context(|| {
            format!("mfg_date must look like \"2024-05-17 12:30\", got {date:?}")
        })?;
    let minutes = (dt - fru_epoch()).num_minutes();
    u32::try_from(minutes)
        .ok()
        .filter(|&m| m <= fru_format::MAX_MFG_DATE)
        .ok_or_else(|| {
            anyhow!("mfg_date {date:?} is not between 1996 and late 2027")
        })
}

fn format_mfg_date(minutes: u32) -> String {
    (fru_epoch() + TimeDelta::minutes(i64::from(minutes)))
        .format(MFG_DATE_FORMAT)
        .to_string()
}
