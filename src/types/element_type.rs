//! This module defines the canonical, type-safe representation of the element
//! types a vector column may carry through the timbang scoring pipeline.

use crate::error::TimbangError;
use arrow::datatypes::DataType as ArrowDataType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of element types supported for scorer input columns.
///
/// The compute-engine seam works in `f32`, so `Float32` is the only type the
/// scorer accepts end-to-end today; `Float64` is represented so schema errors
/// can name it precisely instead of falling back to a stringly-typed message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementType {
    Float32,
    Float64,
}

impl ElementType {
    /// Converts an Arrow `DataType` into an `ElementType`.
    pub fn from_arrow_type(arrow_type: &ArrowDataType) -> Result<Self, TimbangError> {
        match arrow_type {
            ArrowDataType::Float32 => Ok(Self::Float32),
            ArrowDataType::Float64 => Ok(Self::Float64),
            dt => Err(TimbangError::UnsupportedType(format!(
                "Cannot convert Arrow type {:?} to ElementType",
                dt
            ))),
        }
    }

    /// Converts an `ElementType` back into an Arrow `DataType`.
    pub fn to_arrow_type(&self) -> ArrowDataType {
        match self {
            Self::Float32 => ArrowDataType::Float32,
            Self::Float64 => ArrowDataType::Float64,
        }
    }
}

/// Provides the canonical string representation for an `ElementType`.
impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // These string representations are part of the public contract.
        // They match the Arrow `DataType` string representation.
        write!(f, "{:?}", self)
    }
}
