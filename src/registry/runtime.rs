use std::sync::Arc;

use thiserror::Error;

use super::manifest::{ModelFormat, ModelManifest, OutputActivation, WeightGroup, WeightSpec};
use crate::config;
use crate::tensor::{BufferTracker, InputRange, TensorBuffer, TensorError};

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Unsupported model format: {0}")]
    Unsupported(String),

    #[error("Invalid weights: {0}")]
    Weights(String),

    #[error("Input shape {actual:?} does not match expected {expected:?}")]
    InputShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Model execution failed: {0}")]
    Execution(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// A loaded image classifier, shareable across concurrent requests.
pub trait ClassifierModel: Send + Sync {
    /// Pixel convention the model was trained with.
    fn input_range(&self) -> InputRange;

    fn output_activation(&self) -> OutputActivation;

    fn output_units(&self) -> usize;

    /// Run one forward pass over a `[1, H, W, 3]` tensor. The returned buffer
    /// is tracked by `tracker` and owned by the caller.
    fn run(&self, input: &TensorBuffer, tracker: &BufferTracker)
        -> Result<TensorBuffer, RuntimeError>;
}

/// Turns a validated manifest plus its concatenated shard bytes into a model.
pub trait ModelRuntime: Send + Sync {
    fn build(
        &self,
        manifest: &ModelManifest,
        weights: Vec<u8>,
        default_range: InputRange,
    ) -> Result<Arc<dyn ClassifierModel>, RuntimeError>;
}

/// Dispatches on `ModelManifest::format`. ONNX graphs need the
/// `onnx-runtime` feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRuntime;

impl ModelRuntime for DefaultRuntime {
    fn build(
        &self,
        manifest: &ModelManifest,
        weights: Vec<u8>,
        default_range: InputRange,
    ) -> Result<Arc<dyn ClassifierModel>, RuntimeError> {
        match manifest.format {
            ModelFormat::PooledDense => Ok(Arc::new(PooledDenseModel::from_manifest(
                manifest,
                &weights,
                default_range,
            )?)),
            #[cfg(feature = "onnx-runtime")]
            ModelFormat::Onnx => Ok(Arc::new(onnx::OnnxClassifier::from_bytes(
                manifest,
                &weights,
                default_range,
            )?)),
            #[cfg(not(feature = "onnx-runtime"))]
            ModelFormat::Onnx => Err(RuntimeError::Unsupported(
                "onnx (built without the onnx-runtime feature)".into(),
            )),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Pooled dense classifier
// ═══════════════════════════════════════════════════════════

pub const KERNEL_WEIGHT: &str = "dense/kernel";
pub const BIAS_WEIGHT: &str = "dense/bias";

/// Per-channel global average pooling followed by one dense layer:
/// `out[j] = bias[j] + Σ_c mean_c · kernel[c][j]`.
///
/// Small enough to ship inline for calibration heads and test fixtures.
#[derive(Debug, Clone)]
pub struct PooledDenseModel {
    /// Row-major `[3, units]`.
    kernel: Vec<f32>,
    bias: Vec<f32>,
    input_range: InputRange,
    activation: OutputActivation,
}

impl PooledDenseModel {
    pub fn new(
        kernel: Vec<f32>,
        bias: Vec<f32>,
        input_range: InputRange,
        activation: OutputActivation,
    ) -> Result<Self, RuntimeError> {
        if bias.is_empty() {
            return Err(RuntimeError::Weights("bias must not be empty".into()));
        }
        if kernel.len() != 3 * bias.len() {
            return Err(RuntimeError::Weights(format!(
                "kernel has {} values, expected 3x{}",
                kernel.len(),
                bias.len()
            )));
        }
        Ok(Self {
            kernel,
            bias,
            input_range,
            activation,
        })
    }

    /// Decode little-endian float32 weights laid out in `weightsManifest` order.
    pub fn from_manifest(
        manifest: &ModelManifest,
        weights: &[u8],
        default_range: InputRange,
    ) -> Result<Self, RuntimeError> {
        if weights.len() % 4 != 0 {
            return Err(RuntimeError::Weights(format!(
                "{} bytes is not a whole number of float32 values",
                weights.len()
            )));
        }
        let values: Vec<f32> = weights
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let units = manifest.output_units;
        let mut kernel = None;
        let mut bias = None;
        let mut offset = 0;
        for spec in manifest.weight_specs() {
            let count = spec.element_count();
            let slice = values.get(offset..offset + count).ok_or_else(|| {
                RuntimeError::Weights(format!("weights truncated at {}", spec.name))
            })?;
            match spec.name.as_str() {
                KERNEL_WEIGHT => {
                    expect_shape(spec, &[3, units])?;
                    kernel = Some(slice.to_vec());
                }
                BIAS_WEIGHT => {
                    expect_shape(spec, &[units])?;
                    bias = Some(slice.to_vec());
                }
                other => {
                    tracing::debug!(weight = other, "Ignoring unused weight");
                }
            }
            offset += count;
        }

        let kernel =
            kernel.ok_or_else(|| RuntimeError::Weights(format!("missing {KERNEL_WEIGHT}")))?;
        let bias = bias.ok_or_else(|| RuntimeError::Weights(format!("missing {BIAS_WEIGHT}")))?;

        Self::new(
            kernel,
            bias,
            manifest.input_range.unwrap_or(default_range),
            manifest.output_activation,
        )
    }

    /// Serialize into a single-shard asset pair: `(model.json, shard)`.
    pub fn to_assets(&self, shard_name: &str) -> Result<(Vec<u8>, Vec<u8>), super::AssetError> {
        let units = self.bias.len();
        let manifest = ModelManifest {
            format: ModelFormat::PooledDense,
            input_size: config::DEFAULT_INPUT_SIZE,
            input_range: Some(self.input_range),
            output_activation: self.activation,
            output_units: units,
            labels: Vec::new(),
            weights_manifest: vec![WeightGroup {
                paths: vec![shard_name.to_string()],
                weights: vec![
                    WeightSpec {
                        name: KERNEL_WEIGHT.into(),
                        shape: vec![3, units],
                        dtype: "float32".into(),
                    },
                    WeightSpec {
                        name: BIAS_WEIGHT.into(),
                        shape: vec![units],
                        dtype: "float32".into(),
                    },
                ],
            }],
        };
        let shard = self
            .kernel
            .iter()
            .chain(self.bias.iter())
            .flat_map(|v| v.to_le_bytes())
            .collect();
        Ok((manifest.to_json()?, shard))
    }
}

fn expect_shape(spec: &WeightSpec, expected: &[usize]) -> Result<(), RuntimeError> {
    if spec.shape != expected {
        return Err(RuntimeError::Weights(format!(
            "{} has shape {:?}, expected {:?}",
            spec.name, spec.shape, expected
        )));
    }
    Ok(())
}

impl ClassifierModel for PooledDenseModel {
    fn input_range(&self) -> InputRange {
        self.input_range
    }

    fn output_activation(&self) -> OutputActivation {
        self.activation
    }

    fn output_units(&self) -> usize {
        self.bias.len()
    }

    fn run(
        &self,
        input: &TensorBuffer,
        tracker: &BufferTracker,
    ) -> Result<TensorBuffer, RuntimeError> {
        let shape = input.shape();
        if shape.len() != 4 || shape[0] != 1 || shape[3] != 3 {
            return Err(RuntimeError::InputShape {
                expected: vec![1, 0, 0, 3],
                actual: shape.to_vec(),
            });
        }
        let pixels = shape[1] * shape[2];
        if pixels == 0 {
            return Err(RuntimeError::Execution("empty input".into()));
        }

        let mut means = [0.0f64; 3];
        for px in input.data().chunks_exact(3) {
            for (sum, &v) in means.iter_mut().zip(px) {
                *sum += v as f64;
            }
        }
        let means = means.map(|sum| (sum / pixels as f64) as f32);

        let units = self.bias.len();
        let output: Vec<f32> = (0..units)
            .map(|j| {
                self.bias[j]
                    + means
                        .iter()
                        .enumerate()
                        .map(|(c, m)| m * self.kernel[c * units + j])
                        .sum::<f32>()
            })
            .collect();

        Ok(tracker.alloc_vector(output))
    }
}

// ═══════════════════════════════════════════════════════════
// ONNX classifier — behind `onnx-runtime` feature
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-runtime")]
mod onnx {
    use super::{ClassifierModel, ModelManifest, OutputActivation, RuntimeError};
    use crate::tensor::{BufferTracker, InputRange, TensorBuffer};
    use ort::session::Session;
    use std::sync::Mutex;

    /// NHWC float32 image classifier executed by ONNX Runtime.
    ///
    /// `Session::run` needs `&mut self`, so the session sits behind a Mutex.
    pub struct OnnxClassifier {
        session: Mutex<Session>,
        input_range: InputRange,
        activation: OutputActivation,
        units: usize,
    }

    impl OnnxClassifier {
        pub fn from_bytes(
            manifest: &ModelManifest,
            bytes: &[u8],
            default_range: InputRange,
        ) -> Result<Self, RuntimeError> {
            let session = Session::builder()
                .map_err(|e: ort::Error| RuntimeError::Weights(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| RuntimeError::Weights(e.to_string()))?
                .commit_from_memory(bytes)
                .map_err(|e: ort::Error| RuntimeError::Weights(format!("ONNX load failed: {e}")))?;

            tracing::info!(units = manifest.output_units, "ONNX classifier loaded");

            Ok(Self {
                session: Mutex::new(session),
                input_range: manifest.input_range.unwrap_or(default_range),
                activation: manifest.output_activation,
                units: manifest.output_units,
            })
        }
    }

    impl ClassifierModel for OnnxClassifier {
        fn input_range(&self) -> InputRange {
            self.input_range
        }

        fn output_activation(&self) -> OutputActivation {
            self.activation
        }

        fn output_units(&self) -> usize {
            self.units
        }

        fn run(
            &self,
            input: &TensorBuffer,
            tracker: &BufferTracker,
        ) -> Result<TensorBuffer, RuntimeError> {
            use ort::value::TensorRef;

            let shape = input.shape();
            if shape.len() != 4 {
                return Err(RuntimeError::InputShape {
                    expected: vec![1, 0, 0, 3],
                    actual: shape.to_vec(),
                });
            }
            let array = ndarray::ArrayView4::from_shape(
                (shape[0], shape[1], shape[2], shape[3]),
                input.data(),
            )
            .map_err(|e| RuntimeError::Execution(e.to_string()))?;
            let tensor = TensorRef::from_array_view(array)
                .map_err(|e| RuntimeError::Execution(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| RuntimeError::Execution("Session lock poisoned".to_string()))?;
            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| RuntimeError::Execution(format!("ONNX inference failed: {e}")))?;
            let (_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| RuntimeError::Execution(format!("Output extraction: {e}")))?;

            Ok(tracker.alloc_vector(data.to_vec()))
        }
    }
}
