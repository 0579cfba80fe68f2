//! Encoding settings controlling how decoded rows are materialized.
//!
//! Settings are three independent partitions. The packed bitmask form only
//! exists at the boundary ([`EncodingSettings::bits`] and
//! [`EncodingSettings::merge`]); internally each partition is its own enum so
//! that changing one can never disturb the others.

use crate::error::ConfigurationError;

pub const ROW_ENCODING_LIST: u32 = 0x0000_0001;
pub const ROW_ENCODING_DICT: u32 = 0x0000_0002;
pub const ROW_ENCODING_STRING: u32 = 0x0000_0004;
pub const ROW_ENCODING_RAW: u32 = 0x0000_0008;
pub const ROW_RETURN_MASK: u32 = 0x0000_000F;

pub const DATETIME_AS_STRING: u32 = 0x0000_0010;
pub const DATETIME_AS_PARSED: u32 = 0x0000_0020;
pub const DATETIME_RETURN_MASK: u32 = 0x0000_00F0;

pub const DECIMAL_AS_STRING: u32 = 0x0000_0100;
pub const DECIMAL_AS_FLOAT: u32 = 0x0000_0200;
pub const DECIMAL_AS_DECIMAL: u32 = 0x0000_0400;
pub const DECIMAL_RETURN_MASK: u32 = 0x0000_0F00;

const KNOWN_MASK: u32 = ROW_RETURN_MASK | DATETIME_RETURN_MASK | DECIMAL_RETURN_MASK;

/// Shape of each decoded row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowMode {
    /// Positional values
    #[default]
    List,
    /// Column name to value pairs
    Dict,
    /// Delimited text line
    Text,
    /// Framed row bytes, untouched
    Raw,
}

/// How DATE, TIME and TIMESTAMP fields are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatetimeMode {
    #[default]
    Parsed,
    String,
}

/// How DECIMAL fields are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecimalMode {
    /// Exact unscaled integer plus scale
    #[default]
    Decimal,
    Float,
    String,
}

impl RowMode {
    fn bits(self) -> u32 {
        match self {
            RowMode::List => ROW_ENCODING_LIST,
            RowMode::Dict => ROW_ENCODING_DICT,
            RowMode::Text => ROW_ENCODING_STRING,
            RowMode::Raw => ROW_ENCODING_RAW,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            ROW_ENCODING_LIST => Some(RowMode::List),
            ROW_ENCODING_DICT => Some(RowMode::Dict),
            ROW_ENCODING_STRING => Some(RowMode::Text),
            ROW_ENCODING_RAW => Some(RowMode::Raw),
            _ => None,
        }
    }
}

impl DatetimeMode {
    fn bits(self) -> u32 {
        match self {
            DatetimeMode::Parsed => DATETIME_AS_PARSED,
            DatetimeMode::String => DATETIME_AS_STRING,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            DATETIME_AS_PARSED => Some(DatetimeMode::Parsed),
            DATETIME_AS_STRING => Some(DatetimeMode::String),
            _ => None,
        }
    }
}

impl DecimalMode {
    fn bits(self) -> u32 {
        match self {
            DecimalMode::Decimal => DECIMAL_AS_DECIMAL,
            DecimalMode::Float => DECIMAL_AS_FLOAT,
            DecimalMode::String => DECIMAL_AS_STRING,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            DECIMAL_AS_DECIMAL => Some(DecimalMode::Decimal),
            DECIMAL_AS_FLOAT => Some(DecimalMode::Float),
            DECIMAL_AS_STRING => Some(DecimalMode::String),
            _ => None,
        }
    }
}

/// Active encoding settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodingSettings {
    pub row: RowMode,
    pub datetime: DatetimeMode,
    pub decimal: DecimalMode,
}

impl EncodingSettings {
    /// Packed bitmask form.
    pub fn bits(&self) -> u32 {
        self.row.bits() | self.datetime.bits() | self.decimal.bits()
    }

    /// Settings described by a mask that sets every partition.
    pub fn from_bits(mask: u32) -> Result<Self, ConfigurationError> {
        let invalid = || ConfigurationError::InvalidEncoding { mask };
        if mask & ROW_RETURN_MASK == 0
            || mask & DATETIME_RETURN_MASK == 0
            || mask & DECIMAL_RETURN_MASK == 0
        {
            return Err(invalid());
        }
        Self::default().merge(mask)
    }

    /// Read-modify-write: replace only the partitions `mask` touches.
    ///
    /// Each touched partition must hold exactly one recognized value and no
    /// bits outside the three partitions may be set. Nothing is modified when
    /// validation fails.
    pub fn merge(&self, mask: u32) -> Result<Self, ConfigurationError> {
        let invalid = || ConfigurationError::InvalidEncoding { mask };
        if mask == 0 || mask & !KNOWN_MASK != 0 {
            return Err(invalid());
        }

        let mut merged = *self;
        let row = mask & ROW_RETURN_MASK;
        if row != 0 {
            merged.row = RowMode::from_bits(row).ok_or_else(invalid)?;
        }
        let datetime = mask & DATETIME_RETURN_MASK;
        if datetime != 0 {
            merged.datetime = DatetimeMode::from_bits(datetime).ok_or_else(invalid)?;
        }
        let decimal = mask & DECIMAL_RETURN_MASK;
        if decimal != 0 {
            merged.decimal = DecimalMode::from_bits(decimal).ok_or_else(invalid)?;
        }
        Ok(merged)
    }
}
