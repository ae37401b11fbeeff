// In: src/shape.rs

//! The shape reconciliation engine: pure functions deciding whether a column's
//! declared shape can feed a configured model input as-is, with an implicit
//! reshape, or not at all.
//!
//! Reconciliation runs once per input column when a mapper is constructed and
//! the outcome is cached; nothing here is ever recomputed per row.

use crate::error::TimbangError;

//==================================================================================
// I. Shape Types
//==================================================================================

/// A column's declared shape, as read from the columnar schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnShape {
    /// A single flat dimension (rank <= 1) with a statically known size.
    Flat(usize),
    /// A multi-dimensional shape with known per-dimension sizes.
    Dims(Vec<usize>),
    /// A variable-size column whose length is unknown until row time.
    Variable,
}

/// The outcome of reconciling a declared shape against a configured one.
/// Never mutated after creation; consumed once to decide per-column
/// materialization behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeMatch {
    /// The declared shape equals the configured shape dimension-for-dimension.
    Exact,
    /// The flat declared buffer must be viewed as this multi-dimensional
    /// shape before use.
    Reshape(Vec<usize>),
}

//==================================================================================
// II. Reconciliation
//==================================================================================

/// Statically matches a column's declared shape against the configured input
/// shape for that column.
///
/// Rules:
/// - Multi-dimensional declared shapes must match the configured shape rank
///   and dimensions exactly.
/// - A flat declared size must equal the product of the configured dimensions;
///   the buffer is then viewed as the configured shape.
/// - Variable-size columns are rejected outright: shapes must be statically
///   known at construction time, there is no per-row shape inference.
pub fn reconcile(
    column: &str,
    declared: &ColumnShape,
    configured: &[usize],
) -> Result<ShapeMatch, TimbangError> {
    let mismatch = |detail: String| TimbangError::ShapeMismatch {
        column: column.to_string(),
        detail,
    };

    match declared {
        ColumnShape::Variable => Err(mismatch(
            "column has a variable size; shapes must be statically known at construction time"
                .into(),
        )),

        ColumnShape::Dims(dims) => {
            if dims.len() != configured.len() {
                return Err(mismatch(format!(
                    "declared rank {} does not match configured rank {}",
                    dims.len(),
                    configured.len()
                )));
            }
            for (idx, (&actual, &expected)) in dims.iter().zip(configured.iter()).enumerate() {
                if actual != expected {
                    return Err(mismatch(format!(
                        "dimension {} is {} but the model expects {}",
                        idx, actual, expected
                    )));
                }
            }
            Ok(ShapeMatch::Exact)
        }

        ColumnShape::Flat(size) => {
            let expected: usize = configured.iter().product();
            if *size != expected {
                return Err(mismatch(format!(
                    "flat column has {} elements but the configured shape {:?} requires {}",
                    size, configured, expected
                )));
            }
            Ok(ShapeMatch::Reshape(configured.to_vec()))
        }
    }
}

//==================================================================================
// Unit Tests
//==================================================================================
