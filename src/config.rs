// In: src/config.rs

//! The single source of truth for scorer configuration.
//!
//! This module defines the `ScorerOptions` struct, which is designed to be
//! created once at the application boundary (e.g. from a user's JSON document
//! or builder code) and then validated before a `ModelScorer` is constructed.
//!
//! The same column/shape description doubles as the persistent identity of a
//! configured transform: it is exactly what the binary container serializes
//! next to the opaque model blob.

use serde::{Deserialize, Serialize};

use crate::container::{MAX_REASONABLE_COLUMNS, MAX_REASONABLE_RANK};
use crate::error::TimbangError;

//==================================================================================
// I. Core Configuration Structs
//==================================================================================

/// One configured input column: the upstream column name and the tensor shape
/// the model expects for it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InputColumn {
    /// The name of the upstream column feeding this model input.
    pub name: String,
    /// The model-side tensor shape. Every dimension must be a positive size;
    /// unknown/zero dimensions are rejected at construction, never at row time.
    pub shape: Vec<usize>,
}

impl InputColumn {
    pub fn new(name: impl Into<String>, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    /// The total number of elements a tensor of this shape holds.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// The full configuration for a model-scoring transform.
///
/// `ScorerOptions` is intentionally small: everything else a scorer needs
/// (the model itself, the upstream schema) arrives through other channels.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ScorerOptions {
    /// The name of the output column the scorer appends downstream.
    pub output_column: String,

    /// The configured input columns, in the order the model expects them.
    pub input_columns: Vec<InputColumn>,
}

impl ScorerOptions {
    /// Convenience constructor for the common single-input case.
    pub fn single(
        output_column: impl Into<String>,
        input_column: impl Into<String>,
        shape: Vec<usize>,
    ) -> Self {
        Self {
            output_column: output_column.into(),
            input_columns: vec![InputColumn::new(input_column, shape)],
        }
    }

    /// Parses options from a JSON document at the application boundary.
    pub fn from_json(json: &str) -> Result<Self, TimbangError> {
        let options: ScorerOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Validates the construction-time invariants shared by fresh options and
    /// deserialized containers: non-empty names, at least one input column,
    /// and strictly positive dimensions everywhere.
    pub fn validate(&self) -> Result<(), TimbangError> {
        if self.output_column.is_empty() {
            return Err(TimbangError::Encode(
                "output column name must not be empty".into(),
            ));
        }
        if self.input_columns.is_empty() {
            return Err(TimbangError::Encode(
                "at least one input column is required".into(),
            ));
        }
        // The same caps the container reader enforces; checking them here
        // keeps every encodable configuration decodable.
        if self.input_columns.len() > MAX_REASONABLE_COLUMNS {
            return Err(TimbangError::Encode(format!(
                "input column count ({}) exceeds maximum ({})",
                self.input_columns.len(),
                MAX_REASONABLE_COLUMNS
            )));
        }
        for (idx, col) in self.input_columns.iter().enumerate() {
            if col.name.is_empty() {
                return Err(TimbangError::Encode(format!(
                    "input column {} has an empty name",
                    idx
                )));
            }
            if col.shape.is_empty() {
                return Err(TimbangError::Encode(format!(
                    "input column '{}' has an empty shape",
                    col.name
                )));
            }
            if col.shape.len() > MAX_REASONABLE_RANK {
                return Err(TimbangError::Encode(format!(
                    "input column '{}' declares rank {} (maximum {})",
                    col.name,
                    col.shape.len(),
                    MAX_REASONABLE_RANK
                )));
            }
            if let Some(dim) = col.shape.iter().position(|&d| d == 0) {
                return Err(TimbangError::Encode(format!(
                    "input column '{}' has a zero-sized dimension at index {}",
                    col.name, dim
                )));
            }
        }
        Ok(())
    }
}

//==================================================================================
// Unit Tests
//==================================================================================
