// In: src/error.rs

//! This module defines the single, unified error type for the entire timbang library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimbangError {
    // =========================================================================
    // === Container Codec Errors
    // =========================================================================
    /// The container writer was handed configuration it cannot legally encode
    /// (empty names, zero input columns, zero-sized dimensions).
    #[error("Container encoding failed: {0}")]
    Encode(String),

    /// The container bytes are malformed. Fatal; the load is aborted with no
    /// partial state exposed.
    #[error("Container decoding failed: {0}")]
    Decode(String),

    /// The container's format version falls outside the range this reader
    /// supports. Raised before any body bytes are interpreted.
    #[error(
        "Unsupported container version {written}: this reader supports versions {floor} through {current}"
    )]
    Version { written: u32, floor: u32, current: u32 },

    // =========================================================================
    // === Construction / Attach-Time Errors (never deferred to row time)
    // =========================================================================
    /// A column's declared shape disagrees with the configured input shape.
    #[error("Shape mismatch for input column '{column}': {detail}")]
    ShapeMismatch { column: String, detail: String },

    /// An upstream column is missing or has an incompatible type.
    #[error("Schema mismatch for column '{column}': expected {expected}, got {actual}")]
    SchemaMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    /// A data type outside the closed set this library supports.
    #[error("Unsupported data type for this operation: {0}")]
    UnsupportedType(String),

    // =========================================================================
    // === Row-Time Errors
    // =========================================================================
    /// The external compute engine failed while scoring one row. The transform
    /// itself stays valid; all native handles for the row are still released.
    #[error("Engine invocation failed: {0}")]
    EngineInvocation(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the Arrow library.
    #[error("Arrow operation failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// An error originating from the underlying I/O subsystem (e.g. scratch
    /// file creation, reading the model's backing file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically during options parsing.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    // =========================================================================
    // === Internal Invariant Violations
    // =========================================================================
    #[error("Internal logic error (this is a bug): {0}")]
    Internal(String),
}
