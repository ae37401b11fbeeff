// In: src/engine/stub.rs

//! An in-process reference implementation of the `ComputeEngine` capability,
//! backed by `ndarray` buffers behind opaque handle ids.
//!
//! The stub exists so the scoring pipeline can be exercised end-to-end without
//! a real native engine: it does honest bookkeeping (every create/release is
//! counted, reshapes validate element counts) and offers failure injection for
//! the resource-safety tests. Its "model" is just the blob bytes read back
//! from disk, which also lets tests assert blob fidelity through a container
//! round-trip.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use ndarray::{ArrayD, IxDyn};

use crate::engine::{ComputeEngine, RawModel, RawTensor};
use crate::error::TimbangError;

//==================================================================================
// Engine State
//==================================================================================

#[derive(Default)]
struct StubState {
    next_id: u64,
    tensors: HashMap<u64, ArrayD<f32>>,
    models: HashMap<u64, Vec<u8>>,
    tensors_created: u64,
    tensors_released: u64,
    forward_calls: u64,
    fail_loads: bool,
    fail_next_forward: bool,
}

impl StubState {
    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// What `forward` produces.
enum OutputMode {
    /// Echo the first input tensor, flattened.
    EchoFirstInput,
    /// Return a fixed vector on every call.
    Fixed(Vec<f32>),
}

pub struct StubEngine {
    state: Mutex<StubState>,
    output: OutputMode,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState::default()),
            output: OutputMode::EchoFirstInput,
        }
    }

    /// A stub whose forward pass returns `values` on every invocation,
    /// regardless of input. Useful for asserting dynamic output sizing.
    pub fn with_output(values: Vec<f32>) -> Self {
        Self {
            state: Mutex::new(StubState::default()),
            output: OutputMode::Fixed(values),
        }
    }

    /// When set, `load_model` refuses every request.
    pub fn fail_loads(&self, fail: bool) {
        self.lock().fail_loads = fail;
    }

    /// Makes exactly the next `forward` call fail.
    pub fn fail_next_forward(&self) {
        self.lock().fail_next_forward = true;
    }

    // --- Accounting accessors used by tests and benches ---

    pub fn tensors_created(&self) -> u64 {
        self.lock().tensors_created
    }

    pub fn tensors_released(&self) -> u64 {
        self.lock().tensors_released
    }

    pub fn live_tensor_count(&self) -> usize {
        self.lock().tensors.len()
    }

    pub fn live_model_count(&self) -> usize {
        self.lock().models.len()
    }

    pub fn forward_calls(&self) -> u64 {
        self.lock().forward_calls
    }

    /// The blob bytes a loaded model was created from.
    pub fn model_bytes(&self, model: RawModel) -> Option<Vec<u8>> {
        self.lock().models.get(&model.0).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        // A poisoned mutex means a panic mid-bookkeeping; nothing can be
        // salvaged at that point, so propagating the panic is correct.
        self.state.lock().expect("StubEngine state mutex poisoned")
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

//==================================================================================
// ComputeEngine Implementation
//==================================================================================

impl ComputeEngine for StubEngine {
    fn load_model(&self, path: &Path) -> Result<RawModel, TimbangError> {
        let bytes = std::fs::read(path)?;
        let mut state = self.lock();
        if state.fail_loads {
            return Err(TimbangError::EngineInvocation(
                "stub engine was told to refuse model loads".into(),
            ));
        }
        let id = state.fresh_id();
        state.models.insert(id, bytes);
        Ok(RawModel(id))
    }

    fn release_model(&self, model: RawModel) {
        self.lock().models.remove(&model.0);
    }

    fn create_tensor(&self, data: &[f32], shape: &[usize]) -> Result<RawTensor, TimbangError> {
        let array = ArrayD::from_shape_vec(IxDyn(shape), data.to_vec()).map_err(|e| {
            TimbangError::EngineInvocation(format!(
                "cannot wrap {} elements as shape {:?}: {}",
                data.len(),
                shape,
                e
            ))
        })?;
        let mut state = self.lock();
        let id = state.fresh_id();
        state.tensors.insert(id, array);
        state.tensors_created += 1;
        Ok(RawTensor(id))
    }

    fn reshape(&self, tensor: RawTensor, shape: &[usize]) -> Result<RawTensor, TimbangError> {
        let mut state = self.lock();
        let source = state
            .tensors
            .get(&tensor.0)
            .ok_or_else(|| TimbangError::Internal(format!("unknown tensor handle {:?}", tensor)))?
            .clone();
        let reshaped = source.into_shape_with_order(IxDyn(shape)).map_err(|e| {
            TimbangError::EngineInvocation(format!("reshape to {:?} failed: {}", shape, e))
        })?;
        let id = state.fresh_id();
        state.tensors.insert(id, reshaped);
        state.tensors_created += 1;
        Ok(RawTensor(id))
    }

    fn forward(
        &self,
        model: RawModel,
        inputs: &[(&str, RawTensor)],
    ) -> Result<RawTensor, TimbangError> {
        let mut state = self.lock();
        state.forward_calls += 1;

        if state.fail_next_forward {
            state.fail_next_forward = false;
            return Err(TimbangError::EngineInvocation(
                "stub engine injected a forward failure".into(),
            ));
        }
        if !state.models.contains_key(&model.0) {
            return Err(TimbangError::Internal(format!(
                "unknown model handle {:?}",
                model
            )));
        }
        let first = match inputs.first() {
            Some((_, raw)) => raw,
            None => {
                return Err(TimbangError::EngineInvocation(
                    "forward called with no input tensors".into(),
                ))
            }
        };
        for (name, raw) in inputs {
            if !state.tensors.contains_key(&raw.0) {
                return Err(TimbangError::Internal(format!(
                    "unknown tensor handle {:?} for input '{}'",
                    raw, name
                )));
            }
        }

        let output: Vec<f32> = match &self.output {
            OutputMode::Fixed(values) => values.clone(),
            OutputMode::EchoFirstInput => state
                .tensors
                .get(&first.0)
                .map(|a| a.iter().copied().collect())
                .unwrap_or_default(),
        };

        let len = output.len();
        let array = ArrayD::from_shape_vec(IxDyn(&[len]), output)
            .map_err(|e| TimbangError::Internal(format!("stub output shape error: {}", e)))?;
        let id = state.fresh_id();
        state.tensors.insert(id, array);
        state.tensors_created += 1;
        Ok(RawTensor(id))
    }

    fn copy_out(&self, tensor: RawTensor, out: &mut Vec<f32>) -> Result<(), TimbangError> {
        let state = self.lock();
        let array = state
            .tensors
            .get(&tensor.0)
            .ok_or_else(|| TimbangError::Internal(format!("unknown tensor handle {:?}", tensor)))?;
        out.clear();
        out.extend(array.iter().copied());
        Ok(())
    }

    fn release_tensor(&self, tensor: RawTensor) {
        let mut state = self.lock();
        if state.tensors.remove(&tensor.0).is_some() {
            state.tensors_released += 1;
        }
    }
}

//==================================================================================
// Unit Tests
//==================================================================================
