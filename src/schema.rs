// In: src/schema.rs

//! The schema propagator: pure, side-effect-free validation of the upstream
//! schema shape and computation of the output schema shape. This runs before
//! any row flows and is re-run whenever the transform is attached to a new
//! upstream schema.
//!
//! Vector columns are expressed in Arrow terms: `FixedSizeList` nesting for
//! statically shaped columns, `List` for variable-length ones. Element types
//! are checked against the closed `ElementType` set, not via reflection.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema};

use crate::config::ScorerOptions;
use crate::error::TimbangError;
use crate::shape::ColumnShape;
use crate::types::ElementType;

/// The type description used in schema mismatch messages.
const EXPECTED_COLUMN_DESC: &str = "vector column of Float32";

//==================================================================================
// I. Declared-Shape Extraction
//==================================================================================

/// Derives a column's declared shape and element type from its Arrow type.
///
/// - A single `FixedSizeList` level is a flat size.
/// - Nested `FixedSizeList` levels form a multi-dimensional shape.
/// - `List` / `LargeList` are variable-size.
/// - Anything else is not a vector column and is rejected.
pub fn declared_shape(data_type: &DataType) -> Result<(ColumnShape, ElementType), TimbangError> {
    match data_type {
        DataType::FixedSizeList(_, _) => {
            let mut dims: Vec<usize> = Vec::new();
            let mut current = data_type;
            loop {
                match current {
                    DataType::FixedSizeList(field, size) => {
                        if *size <= 0 {
                            return Err(TimbangError::UnsupportedType(format!(
                                "FixedSizeList with non-positive size {}",
                                size
                            )));
                        }
                        dims.push(*size as usize);
                        current = field.data_type();
                    }
                    leaf => {
                        let element = ElementType::from_arrow_type(leaf)?;
                        let shape = if dims.len() == 1 {
                            ColumnShape::Flat(dims[0])
                        } else {
                            ColumnShape::Dims(dims)
                        };
                        return Ok((shape, element));
                    }
                }
            }
        }
        DataType::List(field) | DataType::LargeList(field) => {
            let element = ElementType::from_arrow_type(field.data_type())?;
            Ok((ColumnShape::Variable, element))
        }
        dt => Err(TimbangError::UnsupportedType(format!(
            "Type {:?} is not a vector column",
            dt
        ))),
    }
}

//==================================================================================
// II. Propagation
//==================================================================================

/// Validates that every configured input column exists upstream as a vector
/// column of `Float32`, then returns the upstream schema extended with the
/// output column, typed as a variable-length `List<Float32>`.
///
/// The output length is deliberately variable: the engine determines the
/// output element count per invocation, so no exact size is asserted here.
pub fn propagate(upstream: &Schema, options: &ScorerOptions) -> Result<Schema, TimbangError> {
    for col in &options.input_columns {
        let field = upstream
            .column_with_name(&col.name)
            .map(|(_, f)| f)
            .ok_or_else(|| TimbangError::SchemaMismatch {
                column: col.name.clone(),
                expected: EXPECTED_COLUMN_DESC.to_string(),
                actual: "column absent upstream".to_string(),
            })?;

        let (_, element) =
            declared_shape(field.data_type()).map_err(|_| TimbangError::SchemaMismatch {
                column: col.name.clone(),
                expected: EXPECTED_COLUMN_DESC.to_string(),
                actual: format!("{:?}", field.data_type()),
            })?;

        // The engine seam is f32; every other element type is a mismatch.
        match element {
            ElementType::Float32 => {}
            other => {
                return Err(TimbangError::SchemaMismatch {
                    column: col.name.clone(),
                    expected: EXPECTED_COLUMN_DESC.to_string(),
                    actual: format!("vector column of {}", other),
                })
            }
        }
    }

    if upstream.column_with_name(&options.output_column).is_some() {
        return Err(TimbangError::SchemaMismatch {
            column: options.output_column.clone(),
            expected: "no upstream column with the output name".to_string(),
            actual: "column already present upstream".to_string(),
        });
    }

    let mut fields: Vec<Arc<Field>> = upstream.fields().iter().cloned().collect();
    fields.push(Arc::new(output_field(&options.output_column)));
    Ok(Schema::new(fields))
}

/// The output column's field: a nullable variable-length list of `Float32`.
pub fn output_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new(
            "item",
            ElementType::Float32.to_arrow_type(),
            true,
        ))),
        true,
    )
}

//==================================================================================
// Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_list(element: DataType, size: i32) -> DataType {
        DataType::FixedSizeList(Arc::new(Field::new("item", element, true)), size)
    }

    fn upstream_schema() -> Schema {
        Schema::new(vec![
            Field::new("Features", fixed_list(DataType::Float32, 12), false),
            Field::new("Label", DataType::Utf8, true),
        ])
    }

    #[test]
    fn test_declared_shape_flat_and_nested() {
        let flat = fixed_list(DataType::Float32, 12);
        assert_eq!(
            declared_shape(&flat).unwrap(),
            (ColumnShape::Flat(12), ElementType::Float32)
        );

        let nested = fixed_list(fixed_list(DataType::Float32, 2), 3);
        assert_eq!(
            declared_shape(&nested).unwrap(),
            (ColumnShape::Dims(vec![3, 2]), ElementType::Float32)
        );

        let variable = DataType::List(Arc::new(Field::new("item", DataType::Float32, true)));
        assert_eq!(
            declared_shape(&variable).unwrap(),
            (ColumnShape::Variable, ElementType::Float32)
        );
    }

    #[test]
    fn test_declared_shape_rejects_non_vector_types() {
        assert!(declared_shape(&DataType::Float32).is_err());
        assert!(declared_shape(&DataType::Utf8).is_err());
    }

    #[test]
    fn test_propagate_appends_variable_length_output() {
        let options = ScorerOptions::single("Score", "Features", vec![1, 3, 2, 2]);
        let out = propagate(&upstream_schema(), &options).unwrap();

        assert_eq!(out.fields().len(), 3);
        let (_, field) = out.column_with_name("Score").unwrap();
        let expected = output_field("Score");
        assert_eq!(field.data_type(), expected.data_type());
        // Upstream columns pass through untouched.
        assert!(out.column_with_name("Features").is_some());
        assert!(out.column_with_name("Label").is_some());
    }

    #[test]
    fn test_propagate_is_idempotent() {
        let options = ScorerOptions::single("Score", "Features", vec![12]);
        let a = propagate(&upstream_schema(), &options).unwrap();
        let b = propagate(&upstream_schema(), &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_column_names_the_column() {
        let options = ScorerOptions::single("Score", "NoSuchColumn", vec![4]);
        let err = propagate(&upstream_schema(), &options).unwrap_err();
        match err {
            TimbangError::SchemaMismatch { column, actual, .. } => {
                assert_eq!(column, "NoSuchColumn");
                assert!(actual.contains("absent"));
            }
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_element_type_names_both_types() {
        let schema = Schema::new(vec![Field::new(
            "Features",
            fixed_list(DataType::Float64, 4),
            false,
        )]);
        let options = ScorerOptions::single("Score", "Features", vec![4]);
        let err = propagate(&schema, &options).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Float32"), "{}", msg);
        assert!(msg.contains("Float64"), "{}", msg);
    }

    #[test]
    fn test_non_vector_column_is_a_schema_mismatch() {
        let options = ScorerOptions::single("Score", "Label", vec![4]);
        let err = propagate(&upstream_schema(), &options).unwrap_err();
        assert!(matches!(err, TimbangError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_output_name_collision_is_rejected() {
        let options = ScorerOptions::single("Label", "Features", vec![12]);
        let err = propagate(&upstream_schema(), &options).unwrap_err();
        assert!(matches!(err, TimbangError::SchemaMismatch { .. }));
    }
}
