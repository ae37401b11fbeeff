// In: src/scorer/mapper.rs

//! The row tensor materializer. For each active row it fetches the row's
//! column values into reusable dense buffers, wraps them as native tensors,
//! applies any cached reshape, invokes the engine's forward computation, and
//! copies the result back into a row output buffer.
//!
//! Resource discipline is the whole point of this module: every native handle
//! acquired for a row is released before `score_row` returns, whether the row
//! succeeded or failed, via the `TensorGuard` RAII scope. Nothing native is
//! cached across rows; the only cross-row reuse is buffer *contents*.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, FixedSizeListArray, Float32Array, Float32Builder, ListArray, ListBuilder};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use crate::engine::TensorGuard;
use crate::error::TimbangError;
use crate::schema::declared_shape;
use crate::scorer::ModelScorer;
use crate::shape::{reconcile, ShapeMatch};

//==================================================================================
// I. Per-Column Plans
//==================================================================================

/// The cached outcome of shape reconciliation for one input column. Decided
/// once at bind time, never recomputed per row.
#[derive(Debug, Clone)]
struct ColumnPlan {
    name: String,
    /// Index of the column in the bound upstream schema.
    index: usize,
    /// The declared (possibly flat) shape the initial tensor is created with.
    declared_dims: Vec<usize>,
    /// Whether the flat buffer must be viewed as `target` before use.
    needs_reshape: bool,
    target: Vec<usize>,
    /// The logical element count per row, identical on both sides.
    element_count: usize,
}

//==================================================================================
// II. The Mapper
//==================================================================================

pub struct RowMapper<'a> {
    scorer: &'a ModelScorer,
    plans: Vec<ColumnPlan>,
    /// One reusable dense buffer per input column.
    buffers: Vec<Vec<f32>>,
    /// Reusable copy-back buffer for the engine's output tensor.
    out_buf: Vec<f32>,
}

impl<'a> RowMapper<'a> {
    /// Reconciles every configured input column against the upstream schema
    /// and caches the per-column materialization plans.
    pub(crate) fn bind(
        scorer: &'a ModelScorer,
        upstream: &arrow::datatypes::Schema,
    ) -> Result<Self, TimbangError> {
        // Pre-flight schema validation first, so kind/type problems surface
        // as SchemaMismatch before any shape comparison runs.
        crate::schema::propagate(upstream, scorer.options())?;

        let mut plans = Vec::with_capacity(scorer.options().input_columns.len());
        for col in &scorer.options().input_columns {
            // propagate() just proved the column exists.
            let (index, field) = upstream
                .column_with_name(&col.name)
                .ok_or_else(|| TimbangError::Internal(format!(
                    "column '{}' vanished between validation and bind",
                    col.name
                )))?;

            let (declared, _) = declared_shape(field.data_type())?;
            let plan = match reconcile(&col.name, &declared, &col.shape)? {
                ShapeMatch::Exact => ColumnPlan {
                    name: col.name.clone(),
                    index,
                    declared_dims: col.shape.clone(),
                    needs_reshape: false,
                    target: Vec::new(),
                    element_count: col.element_count(),
                },
                ShapeMatch::Reshape(target) => {
                    let flat = col.element_count();
                    ColumnPlan {
                        name: col.name.clone(),
                        index,
                        declared_dims: vec![flat],
                        needs_reshape: true,
                        target,
                        element_count: flat,
                    }
                }
            };
            log::debug!(
                "Bound column '{}' (index {}): reshape={} declared={:?}",
                plan.name,
                plan.index,
                plan.needs_reshape,
                plan.declared_dims
            );
            plans.push(plan);
        }

        let buffers = plans.iter().map(|p| Vec::with_capacity(p.element_count)).collect();
        Ok(Self {
            scorer,
            plans,
            buffers,
            out_buf: Vec::new(),
        })
    }

    /// Scores one row: materialize inputs, invoke the engine, copy the output
    /// back. The returned vector's length is whatever element count the
    /// engine's output tensor reports for this invocation.
    pub fn score_row(
        &mut self,
        batch: &RecordBatch,
        row: usize,
    ) -> Result<Vec<f32>, TimbangError> {
        if row >= batch.num_rows() {
            return Err(TimbangError::Internal(format!(
                "row index {} out of bounds for a batch of {} rows",
                row,
                batch.num_rows()
            )));
        }

        let engine = Arc::clone(self.scorer.engine());

        // Guaranteed-cleanup scope: every guard pushed here is released by
        // the time this function returns, on success and on failure alike.
        let mut inputs: Vec<TensorGuard> = Vec::with_capacity(self.plans.len());

        for (plan, buf) in self.plans.iter().zip(self.buffers.iter_mut()) {
            let column = column_for_plan(batch, plan)?;
            let len = fill_row_values(column, row, buf)?;
            if len != plan.element_count {
                return Err(TimbangError::Internal(format!(
                    "column '{}' produced {} elements at row {}, expected {}",
                    plan.name, len, row, plan.element_count
                )));
            }

            // Only the logical length is authoritative; the buffer may have
            // grown past it on earlier rows.
            let guard = TensorGuard::create(Arc::clone(&engine), &buf[..len], &plan.declared_dims)?;
            let guard = if plan.needs_reshape {
                // reshape() releases the pre-reshape handle in both outcomes.
                guard.reshape(&plan.target)?
            } else {
                guard
            };
            inputs.push(guard);
        }

        let mut named = Vec::with_capacity(inputs.len());
        for (plan, guard) in self.plans.iter().zip(inputs.iter()) {
            named.push((plan.name.as_str(), guard.raw()?));
        }

        let output = TensorGuard::adopt(
            Arc::clone(&engine),
            engine.forward(self.scorer.model().raw()?, &named)?,
        );
        output.copy_out(&mut self.out_buf)?;
        let row_output = self.out_buf.clone();

        // Release in reverse order of acquisition: the output tensor first,
        // then the inputs newest-to-oldest.
        drop(output);
        while let Some(guard) = inputs.pop() {
            drop(guard);
        }

        Ok(row_output)
    }

    /// Scores every row of a batch into a variable-length `List<Float32>`
    /// column, the type the schema propagator declares for the output.
    pub fn score_batch(&mut self, batch: &RecordBatch) -> Result<ListArray, TimbangError> {
        let mut builder = ListBuilder::new(Float32Builder::new());
        for row in 0..batch.num_rows() {
            let values = self.score_row(batch, row)?;
            for v in values {
                builder.values().append_value(v);
            }
            builder.append(true);
        }
        Ok(builder.finish())
    }

    /// Runs the transform over a whole batch and returns the batch extended
    /// with the output column.
    pub fn apply(&mut self, batch: &RecordBatch) -> Result<RecordBatch, TimbangError> {
        let out_schema = self.scorer.output_schema(batch.schema().as_ref())?;
        let scores = self.score_batch(batch)?;

        let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
        columns.push(Arc::new(scores));
        Ok(RecordBatch::try_new(Arc::new(out_schema), columns)?)
    }
}

//==================================================================================
// III. Column Access Helpers
//==================================================================================

/// Fetches the plan's column from the batch, verifying the batch still agrees
/// with the schema the mapper was bound against.
fn column_for_plan<'b>(
    batch: &'b RecordBatch,
    plan: &ColumnPlan,
) -> Result<&'b ArrayRef, TimbangError> {
    let schema = batch.schema();
    let field = schema.fields().get(plan.index).ok_or_else(|| {
        TimbangError::SchemaMismatch {
            column: plan.name.clone(),
            expected: format!("column at index {}", plan.index),
            actual: "batch has fewer columns than the bound schema".to_string(),
        }
    })?;
    if field.name() != &plan.name {
        return Err(TimbangError::SchemaMismatch {
            column: plan.name.clone(),
            expected: format!("column '{}' at index {}", plan.name, plan.index),
            actual: format!("column '{}'", field.name()),
        });
    }
    Ok(batch.column(plan.index))
}

/// Copies one row's values for a statically shaped vector column into `buf`,
/// returning the logical length. The buffer is cleared first; its capacity is
/// what gets reused across rows.
fn fill_row_values(
    column: &ArrayRef,
    row: usize,
    buf: &mut Vec<f32>,
) -> Result<usize, TimbangError> {
    buf.clear();
    if column.is_null(row) {
        return Err(TimbangError::EngineInvocation(format!(
            "null value at row {}",
            row
        )));
    }
    match column.data_type() {
        DataType::FixedSizeList(_, _) => {
            let list = column
                .as_any()
                .downcast_ref::<FixedSizeListArray>()
                .ok_or_else(|| {
                    TimbangError::Internal("FixedSizeList column failed to downcast".into())
                })?;
            append_all_values(&list.value(row), buf)?;
        }
        dt => {
            // bind() only admits statically shaped vector columns.
            return Err(TimbangError::Internal(format!(
                "unexpected column type {:?} at row time",
                dt
            )));
        }
    }
    Ok(buf.len())
}

/// Appends every leaf `f32` of a (possibly nested) fixed-size list slice.
fn append_all_values(array: &ArrayRef, buf: &mut Vec<f32>) -> Result<(), TimbangError> {
    match array.data_type() {
        DataType::FixedSizeList(_, _) => {
            let list = array
                .as_any()
                .downcast_ref::<FixedSizeListArray>()
                .ok_or_else(|| {
                    TimbangError::Internal("FixedSizeList column failed to downcast".into())
                })?;
            for i in 0..list.len() {
                if list.is_null(i) {
                    return Err(TimbangError::EngineInvocation(
                        "null nested list value".into(),
                    ));
                }
                append_all_values(&list.value(i), buf)?;
            }
            Ok(())
        }
        DataType::Float32 => {
            let values = array
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| {
                    TimbangError::Internal("Float32 values failed to downcast".into())
                })?;
            if values.null_count() > 0 {
                return Err(TimbangError::EngineInvocation(
                    "null element inside a vector value".into(),
                ));
            }
            buf.extend_from_slice(values.values());
            Ok(())
        }
        dt => Err(TimbangError::Internal(format!(
            "unexpected leaf type {:?} in a vector column",
            dt
        ))),
    }
}
