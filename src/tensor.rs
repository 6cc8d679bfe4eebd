//! Numeric buffer ownership for the inference pipeline.
//!
//! Every tensor the pipeline allocates (normalized input, raw model output) is a
//! `TensorBuffer`. A buffer registers itself with a `BufferTracker` when it is
//! created and unregisters exactly once when it is dropped, so release happens on
//! every exit path, including `?` returns and panics unwinding through a worker.
//!
//! The tracker is the observable side of that discipline: `outstanding()` must
//! return to its previous value once a `detect()` call has finished.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════
// Input normalization convention
// ═══════════════════════════════════════════════════════════

/// Value range a model expects its input pixels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRange {
    /// `[0, 1]`: `x / 255`.
    Unit,
    /// `[-1, 1]`: `x / 127.5 - 1` (MobileNet-style classifiers).
    Signed,
}

impl InputRange {
    /// Map one 8-bit channel value into this range.
    pub fn normalize(self, value: u8) -> f32 {
        match self {
            Self::Unit => value as f32 / 255.0,
            Self::Signed => value as f32 / 127.5 - 1.0,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// BufferTracker
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
    #[error("Shape {shape:?} holds {expected} values, got {actual}")]
    LengthMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

/// Counts live and lifetime numeric buffers.
///
/// Cheap to clone; clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct BufferTracker {
    live: Arc<AtomicUsize>,
    allocated: Arc<AtomicU64>,
}

impl BufferTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers created through this tracker and not yet dropped.
    pub fn outstanding(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Total buffers ever created through this tracker.
    pub fn total_allocated(&self) -> u64 {
        self.allocated.load(Ordering::Acquire)
    }

    /// Allocate a tracked buffer, checking `data` fills `shape` exactly.
    pub fn alloc(&self, shape: Vec<usize>, data: Vec<f32>) -> Result<TensorBuffer, TensorError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(TensorError::LengthMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(self.register(shape, data))
    }

    /// Allocate a rank-1 tracked buffer.
    pub fn alloc_vector(&self, data: Vec<f32>) -> TensorBuffer {
        let shape = vec![data.len()];
        self.register(shape, data)
    }

    fn register(&self, shape: Vec<usize>, data: Vec<f32>) -> TensorBuffer {
        self.live.fetch_add(1, Ordering::AcqRel);
        self.allocated.fetch_add(1, Ordering::AcqRel);
        TensorBuffer {
            shape,
            data,
            live: Arc::clone(&self.live),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// TensorBuffer
// ═══════════════════════════════════════════════════════════

/// Owned, tracked `f32` tensor. Released exactly once, on drop.
///
/// Not `Clone`; every copy has to go through `BufferTracker::alloc`.
#[derive(Debug)]
pub struct TensorBuffer {
    shape: Vec<usize>,
    data: Vec<f32>,
    live: Arc<AtomicUsize>,
}

impl TensorBuffer {
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Move the values out and release the buffer.
    pub fn read_back(mut self) -> Vec<f32> {
        std::mem::take(&mut self.data)
    }

    /// Release the buffer now. Same as `drop`.
    pub fn release(self) {}
}

impl Drop for TensorBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
