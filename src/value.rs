//! Typed value bridge between narrow Arrow column types and `f64`.
//!
//! A [`ValueSlot`] is bound to exactly one [`StorageKind`]. Loading a row
//! copies the column's scalar into the slot; [`ValueSlot::get`] reads it back
//! widened to the canonical `f64`.

use crate::error::{FillError, Result};
use crate::registry::FieldType;
use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Float32Type, Int8Type, Int16Type, Int32Type, UInt8Type};
use serde::{Deserialize, Serialize};

/// Narrow external representation of an input scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    Float32,
    Int32,
    /// Single-byte flag: Arrow `Boolean`, `Int8` or `UInt8`.
    Bool8,
    Int16,
}

impl StorageKind {
    /// Classify an Arrow data type. Returns `None` for unsupported types.
    #[must_use]
    pub fn classify(data_type: &DataType) -> Option<Self> {
        match data_type {
            DataType::Float32 => Some(Self::Float32),
            DataType::Int32 => Some(Self::Int32),
            DataType::Boolean | DataType::Int8 | DataType::UInt8 => Some(Self::Bool8),
            DataType::Int16 => Some(Self::Int16),
            _ => None,
        }
    }

    /// Registry kind a field of this storage kind is registered as.
    #[must_use]
    pub fn field_type(self) -> FieldType {
        match self {
            Self::Float32 => FieldType::Float,
            Self::Int32 | Self::Bool8 | Self::Int16 => FieldType::Integer,
        }
    }
}

/// One active scalar of a bound storage kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueSlot {
    Float32(f32),
    Int32(i32),
    Bool8(u8),
    Int16(i16),
}

impl ValueSlot {
    /// Bind a zeroed slot for `kind`.
    #[must_use]
    pub fn bind(kind: StorageKind) -> Self {
        match kind {
            StorageKind::Float32 => Self::Float32(0.0),
            StorageKind::Int32 => Self::Int32(0),
            StorageKind::Bool8 => Self::Bool8(0),
            StorageKind::Int16 => Self::Int16(0),
        }
    }

    /// Bind a slot for a field given its native Arrow type.
    ///
    /// # Errors
    /// Returns a `TypeError` if the type has no storage kind.
    pub fn for_data_type(field: &str, data_type: &DataType) -> Result<Self> {
        StorageKind::classify(data_type)
            .map(Self::bind)
            .ok_or_else(|| FillError::unsupported_type(field, data_type))
    }

    #[must_use]
    pub fn kind(&self) -> StorageKind {
        match self {
            Self::Float32(_) => StorageKind::Float32,
            Self::Int32(_) => StorageKind::Int32,
            Self::Bool8(_) => StorageKind::Bool8,
            Self::Int16(_) => StorageKind::Int16,
        }
    }

    /// Canonical read accessor. Flags read back as `0.0` or `1.0`.
    #[must_use]
    pub fn get(&self) -> f64 {
        match *self {
            Self::Float32(v) => f64::from(v),
            Self::Int32(v) => f64::from(v),
            Self::Bool8(v) => f64::from(u8::from(v != 0)),
            Self::Int16(v) => f64::from(v),
        }
    }

    /// Copy row `row` of `column` into the slot. Nulls load as zero.
    ///
    /// # Errors
    /// Returns a `TypeError` if the column type does not match the bound kind.
    pub fn load(&mut self, field: &str, column: &dyn Array, row: usize) -> Result<()> {
        let mismatch = || FillError::unsupported_type(field, column.data_type());
        let null = column.is_null(row);
        match self {
            Self::Float32(v) => {
                let a = column.as_primitive_opt::<Float32Type>().ok_or_else(mismatch)?;
                *v = if null { 0.0 } else { a.value(row) };
            }
            Self::Int32(v) => {
                let a = column.as_primitive_opt::<Int32Type>().ok_or_else(mismatch)?;
                *v = if null { 0 } else { a.value(row) };
            }
            Self::Int16(v) => {
                let a = column.as_primitive_opt::<Int16Type>().ok_or_else(mismatch)?;
                *v = if null { 0 } else { a.value(row) };
            }
            Self::Bool8(v) => {
                let raw = match column.data_type() {
                    DataType::Boolean => column.as_boolean().value(row) as u8,
                    DataType::Int8 => column.as_primitive::<Int8Type>().value(row) as u8,
                    DataType::UInt8 => column.as_primitive::<UInt8Type>().value(row),
                    _ => return Err(mismatch()),
                };
                *v = if null { 0 } else { raw };
            }
        }
        Ok(())
    }
}
