// In: src/engine/mod.rs

//! The seam between timbang and the external tensor-computation engine.
//!
//! The engine is treated purely as a capability: given named input tensors,
//! produce named output tensors. Everything it owns (models, tensors) is an
//! externally-owned resource reached through an opaque handle, and every
//! handle acquired here travels inside an RAII guard so release happens on
//! every exit path. Finalizer-style cleanup is deliberately absent: lifetimes
//! are scoped and deterministic.

use std::path::Path;
use std::sync::Arc;

use crate::container::ScratchFile;
use crate::error::TimbangError;

pub mod stub;

//==================================================================================
// I. Opaque Handles & the Engine Capability
//==================================================================================

/// An opaque identifier for an engine-owned tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawTensor(pub u64);

/// An opaque identifier for an engine-owned model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawModel(pub u64);

/// The collaborator interface the external computation engine must provide.
///
/// `forward` is assumed safe to invoke concurrently with independent handle
/// sets; if a real engine is not thread-safe, the host is responsible for
/// serializing access. This crate adds no locking of its own.
pub trait ComputeEngine: Send + Sync {
    /// Loads a model from a filesystem path, returning a native handle.
    /// Path-shaped input is the contract here: many native loaders accept
    /// nothing else, which is why the container codec spills blobs to disk.
    fn load_model(&self, path: &Path) -> Result<RawModel, TimbangError>;

    /// Releases a model handle. Must be called exactly once per handle.
    fn release_model(&self, model: RawModel);

    /// Wraps a dense buffer as a native tensor with the given shape.
    fn create_tensor(&self, data: &[f32], shape: &[usize]) -> Result<RawTensor, TimbangError>;

    /// Produces a new tensor viewing `tensor`'s buffer as `shape`. The source
    /// tensor stays live and must still be released by its owner.
    fn reshape(&self, tensor: RawTensor, shape: &[usize]) -> Result<RawTensor, TimbangError>;

    /// Runs the model's forward computation over named input tensors and
    /// returns the output tensor, owned by the caller.
    fn forward(
        &self,
        model: RawModel,
        inputs: &[(&str, RawTensor)],
    ) -> Result<RawTensor, TimbangError>;

    /// Copies a tensor's contents into `out`, sizing it to the exact element
    /// count of the tensor.
    fn copy_out(&self, tensor: RawTensor, out: &mut Vec<f32>) -> Result<(), TimbangError>;

    /// Releases a tensor handle. Must be called exactly once per handle.
    fn release_tensor(&self, tensor: RawTensor);
}

//==================================================================================
// II. RAII Guards
//==================================================================================

/// Exclusive ownership of one engine tensor. The handle is released exactly
/// once: either explicitly through `reshape` (which supersedes it) or by the
/// guard's `Drop`.
pub struct TensorGuard {
    engine: Arc<dyn ComputeEngine>,
    raw: Option<RawTensor>,
}

impl TensorGuard {
    /// Materializes a dense buffer as a guarded native tensor.
    pub fn create(
        engine: Arc<dyn ComputeEngine>,
        data: &[f32],
        shape: &[usize],
    ) -> Result<Self, TimbangError> {
        let raw = engine.create_tensor(data, shape)?;
        Ok(Self {
            engine,
            raw: Some(raw),
        })
    }

    /// Takes ownership of a handle the engine already produced (e.g. the
    /// output of `forward`).
    pub fn adopt(engine: Arc<dyn ComputeEngine>, raw: RawTensor) -> Self {
        Self {
            engine,
            raw: Some(raw),
        }
    }

    pub fn raw(&self) -> Result<RawTensor, TimbangError> {
        self.raw
            .ok_or_else(|| TimbangError::Internal("tensor guard used after release".into()))
    }

    /// Requests a reshaped view and supersedes this guard's handle with it.
    ///
    /// The source handle is released immediately in both outcomes: after a
    /// successful reshape it is invalid by contract, and on failure it must
    /// not outlive the error being propagated.
    pub fn reshape(mut self, target: &[usize]) -> Result<Self, TimbangError> {
        let raw = self
            .raw
            .take()
            .ok_or_else(|| TimbangError::Internal("tensor guard used after release".into()))?;
        let result = self.engine.reshape(raw, target);
        self.engine.release_tensor(raw);
        let reshaped = result?;
        Ok(Self {
            engine: Arc::clone(&self.engine),
            raw: Some(reshaped),
        })
    }

    /// Copies the tensor's contents into `out`, sized to the element count.
    pub fn copy_out(&self, out: &mut Vec<f32>) -> Result<(), TimbangError> {
        self.engine.copy_out(self.raw()?, out)
    }
}

impl Drop for TensorGuard {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.engine.release_tensor(raw);
        }
    }
}

/// Exclusive ownership of one native model handle, optionally together with
/// the scratch file backing it. Released exactly once, when the owning
/// transform is torn down.
pub struct ModelGuard {
    engine: Arc<dyn ComputeEngine>,
    raw: Option<RawModel>,
    scratch: Option<ScratchFile>,
}

impl ModelGuard {
    /// Loads a model from a caller-owned path (fresh construction).
    pub fn load(engine: Arc<dyn ComputeEngine>, path: &Path) -> Result<Self, TimbangError> {
        let raw = engine.load_model(path)?;
        Ok(Self {
            engine,
            raw: Some(raw),
            scratch: None,
        })
    }

    /// Loads a model from a scratch file and takes ownership of it, so the
    /// file lives exactly as long as the native handle. If the loader fails,
    /// `scratch` is dropped right here and its file is removed before the
    /// failure propagates.
    pub fn load_scratch(
        engine: Arc<dyn ComputeEngine>,
        scratch: ScratchFile,
    ) -> Result<Self, TimbangError> {
        let raw = engine.load_model(scratch.path())?;
        Ok(Self {
            engine,
            raw: Some(raw),
            scratch: Some(scratch),
        })
    }

    pub fn raw(&self) -> Result<RawModel, TimbangError> {
        self.raw
            .ok_or_else(|| TimbangError::Internal("model guard used after release".into()))
    }

    /// The filesystem location of the model's backing bytes, if this guard
    /// owns a scratch copy.
    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch.as_ref().map(|s| s.path())
    }
}

impl Drop for ModelGuard {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.engine.release_model(raw);
        }
        // The scratch file, if any, is removed by its own guard afterwards.
    }
}

//==================================================================================
// Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::stub::StubEngine;
    use super::*;

    #[test]
    fn test_guard_releases_on_drop_exactly_once() {
        let engine = Arc::new(StubEngine::new());
        {
            let _guard =
                TensorGuard::create(engine.clone(), &[1.0, 2.0, 3.0, 4.0], &[4]).unwrap();
            assert_eq!(engine.live_tensor_count(), 1);
        }
        assert_eq!(engine.live_tensor_count(), 0);
        assert_eq!(engine.tensors_created(), engine.tensors_released());
    }

    #[test]
    fn test_reshape_supersedes_and_releases_source() {
        let engine = Arc::new(StubEngine::new());
        let guard = TensorGuard::create(engine.clone(), &[0.0; 12], &[12]).unwrap();
        let reshaped = guard.reshape(&[1, 3, 2, 2]).unwrap();

        // Two tensors were created in total, but only the reshaped one is live.
        assert_eq!(engine.tensors_created(), 2);
        assert_eq!(engine.live_tensor_count(), 1);
        drop(reshaped);
        assert_eq!(engine.live_tensor_count(), 0);
    }

    #[test]
    fn test_failed_reshape_still_releases_source() {
        let engine = Arc::new(StubEngine::new());
        let guard = TensorGuard::create(engine.clone(), &[0.0; 10], &[10]).unwrap();
        // 10 elements cannot be viewed as 12; the stub refuses.
        let err = guard.reshape(&[1, 3, 2, 2]).err().unwrap();
        assert!(matches!(err, TimbangError::EngineInvocation(_)));
        assert_eq!(engine.live_tensor_count(), 0);
    }

    #[test]
    fn test_model_guard_releases_model() {
        let engine = Arc::new(StubEngine::new());
        let scratch = ScratchFile::create(b"pretend-model").unwrap();
        {
            let guard = ModelGuard::load_scratch(engine.clone(), scratch).unwrap();
            assert_eq!(engine.live_model_count(), 1);
            assert!(guard.scratch_path().is_some());
        }
        assert_eq!(engine.live_model_count(), 0);
    }

    #[test]
    fn test_failed_model_load_removes_scratch() {
        let engine = Arc::new(StubEngine::new());
        engine.fail_loads(true);

        let scratch = ScratchFile::create(b"pretend-model").unwrap();
        let path = scratch.path().to_path_buf();
        let res = ModelGuard::load_scratch(engine.clone(), scratch);
        assert!(res.is_err());
        // No scratch state survives a failed load.
        assert!(!path.exists());
        assert_eq!(engine.live_model_count(), 0);
    }
}
