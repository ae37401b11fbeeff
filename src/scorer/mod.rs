// In: src/scorer/mod.rs

//! The model-scoring transform: the public facade tying the container codec,
//! shape reconciliation, schema propagation, and the per-row materializer
//! together.
//!
//! A `ModelScorer` is created either from explicit options plus a model file
//! (fresh construction) or by decoding a container (reload). Either way it
//! owns the native model handle for its whole lifetime and releases it exactly
//! once, on drop. Row scoring happens through a `RowMapper` bound to a
//! concrete upstream schema, so all shape decisions are made before any data
//! flows.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::Schema;

use crate::config::ScorerOptions;
use crate::container::{ContainerKind, ModelContainer, ScratchFile};
use crate::engine::{ComputeEngine, ModelGuard};
use crate::error::TimbangError;
use crate::schema;

pub mod mapper;

pub use mapper::RowMapper;


//==================================================================================
// The Transform
//==================================================================================

pub struct ModelScorer {
    engine: Arc<dyn ComputeEngine>,
    options: ScorerOptions,
    kind: ContainerKind,
    model: ModelGuard,
    /// The model's backing bytes on disk: the user's own file for fresh
    /// construction, or the scratch copy extracted from a container.
    model_path: PathBuf,
}

impl ModelScorer {
    /// Fresh construction from user-supplied options and a model file.
    ///
    /// The container variant is derived from the input count: exactly one
    /// configured input produces the single-input container on save, anything
    /// else the multi-input one. Both share the same layout otherwise.
    pub fn from_options(
        engine: Arc<dyn ComputeEngine>,
        options: ScorerOptions,
        model_path: &Path,
    ) -> Result<Self, TimbangError> {
        options.validate()?;
        let kind = if options.input_columns.len() == 1 {
            ContainerKind::SingleInput
        } else {
            ContainerKind::MultiInput
        };
        let model = ModelGuard::load(Arc::clone(&engine), model_path)?;
        log::info!(
            "Constructed scorer for output '{}' from model {:?} ({} input column(s))",
            options.output_column,
            model_path,
            options.input_columns.len()
        );
        Ok(Self {
            engine,
            options,
            kind,
            model,
            model_path: model_path.to_path_buf(),
        })
    }

    /// Reload from a serialized container.
    pub fn load<R: Read>(engine: Arc<dyn ComputeEngine>, reader: &mut R) -> Result<Self, TimbangError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_container_bytes(engine, &bytes)
    }

    /// Reload from container bytes already in memory.
    pub fn from_container_bytes(
        engine: Arc<dyn ComputeEngine>,
        bytes: &[u8],
    ) -> Result<Self, TimbangError> {
        let container = ModelContainer::from_bytes(bytes)?;
        let options = container.options();

        // The external loader only accepts path-shaped input, so the blob
        // takes a disk round-trip through a uniquely named scratch file. If
        // the loader fails, the `ScratchFile` guard removes the file before
        // the error leaves this function.
        let scratch = ScratchFile::create(&container.model_blob)?;
        let model = ModelGuard::load_scratch(Arc::clone(&engine), scratch)?;

        // Post-conditions of the read contract. Header and shape checks have
        // already passed, so a violation here is an internal invariant bug.
        let model_path = match model.scratch_path() {
            Some(path) => path.to_path_buf(),
            None => {
                return Err(TimbangError::Decode(
                    "loaded model has no backing path (this is a bug)".into(),
                ))
            }
        };

        log::info!(
            "Reloaded scorer for output '{}' from a {} byte container",
            options.output_column,
            bytes.len()
        );
        Ok(Self {
            engine,
            options,
            kind: container.kind,
            model,
            model_path,
        })
    }

    /// Serializes the transform's configuration and its model blob into the
    /// versioned container format. Reads the model's backing file fully; does
    /// not mutate it.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<(), TimbangError> {
        let blob = std::fs::read(&self.model_path)?;
        let container = ModelContainer::from_options(self.kind, &self.options, blob)?;
        let bytes = container.to_bytes()?;
        writer.write_all(&bytes)?;
        log::info!(
            "Saved scorer for output '{}' ({} container bytes)",
            self.options.output_column,
            bytes.len()
        );
        Ok(())
    }

    /// Computes the output schema shape for an upstream schema, without
    /// touching any row or native resource. Pure pre-flight validation.
    pub fn output_schema(&self, upstream: &Schema) -> Result<Schema, TimbangError> {
        schema::propagate(upstream, &self.options)
    }

    /// Binds the transform to a concrete upstream schema, reconciling every
    /// configured input shape once and caching the outcome. All shape and
    /// schema errors surface here, never at row time.
    pub fn bind(&self, upstream: &Schema) -> Result<RowMapper<'_>, TimbangError> {
        RowMapper::bind(self, upstream)
    }

    pub fn options(&self) -> &ScorerOptions {
        &self.options
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub(crate) fn engine(&self) -> &Arc<dyn ComputeEngine> {
        &self.engine
    }

    pub(crate) fn model(&self) -> &ModelGuard {
        &self.model
    }
}
