use std::time::Duration;

use tracing::{debug, warn};

use super::preprocess::PreprocessedTensor;
use super::simulate::FallbackSimulator;
use super::types::{InferenceResult, Source};
use super::InferenceError;
use crate::registry::{ModelHandle, ModelStatus, OutputActivation};
use crate::tensor::BufferTracker;

/// Outcome of one inference. `failure` is set when a loaded model errored
/// and `result` was simulated in its place.
#[derive(Debug)]
pub struct Execution {
    pub result: InferenceResult,
    pub failure: Option<InferenceError>,
}

/// Runs a model against a prepared tensor off the async runtime, then maps
/// its raw output onto the domain's classes.
pub struct InferenceExecutor {
    tracker: BufferTracker,
    simulator: FallbackSimulator,
    timeout: Duration,
}

impl InferenceExecutor {
    pub fn new(tracker: BufferTracker, timeout: Duration) -> Self {
        Self {
            tracker,
            simulator: FallbackSimulator::new(),
            timeout,
        }
    }

    /// Never fails: model errors degrade to a simulated result.
    ///
    /// `raw` is the original upload, used to seed simulation.
    pub async fn infer(
        &self,
        tensor: PreprocessedTensor,
        raw: &[u8],
        handle: &ModelHandle,
    ) -> Execution {
        let domain = handle.domain();
        let source = match handle.status() {
            ModelStatus::PrimaryLoaded => Source::Primary,
            ModelStatus::FallbackLoaded => Source::Fallback,
            _ => {
                drop(tensor);
                return Execution {
                    result: self.simulator.simulate(raw, domain),
                    failure: None,
                };
            }
        };

        match self.run_model(tensor, handle, source).await {
            Ok(result) => Execution {
                result,
                failure: None,
            },
            Err(err) => {
                warn!(%domain, %source, error = %err, "Model inference failed, simulating");
                let result = self
                    .simulator
                    .simulate(raw, domain)
                    .with_note(format!("{source} model failed: {err}"));
                Execution {
                    result,
                    failure: Some(err),
                }
            }
        }
    }

    async fn run_model(
        &self,
        tensor: PreprocessedTensor,
        handle: &ModelHandle,
        source: Source,
    ) -> Result<InferenceResult, InferenceError> {
        let model = handle.model().cloned().ok_or(InferenceError::NoModel)?;
        let activation = model.output_activation();
        let tracker = self.tracker.clone();

        // Input and output buffers are released inside the worker, so a
        // timed-out run still frees them when it finishes.
        let task = tokio::task::spawn_blocking(move || {
            let output = model.run(tensor.buffer(), &tracker);
            drop(tensor);
            output.map(|buffer| buffer.read_back())
        });

        let raw = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => return Err(InferenceError::Timeout(self.timeout.as_millis() as u64)),
            Ok(Err(join_err)) => return Err(InferenceError::Worker(join_err.to_string())),
            Ok(Ok(output)) => output?,
        };

        let classes = handle.domain().descriptor().num_classes();
        let probabilities = match source {
            Source::Fallback => fold_into(&to_distribution(&raw, activation)?, classes),
            _ => {
                let distribution = primary_distribution(&raw, activation, classes)?;
                match handle.class_order() {
                    Some(order) => reorder(&distribution, order),
                    None => distribution,
                }
            }
        };
        debug!(domain = %handle.domain(), %source, outputs = raw.len(), "Inference complete");

        let result = InferenceResult::new(probabilities, source);
        if source == Source::Fallback {
            return Ok(result.with_note("class mapping is a heuristic"));
        }
        Ok(result)
    }
}

/// Map a domain model's raw output onto its classes. A single sigmoid unit
/// for a two-class domain is the positive (index 1) probability.
pub fn primary_distribution(
    raw: &[f32],
    activation: OutputActivation,
    classes: usize,
) -> Result<Vec<f32>, InferenceError> {
    if classes == 2 && raw.len() == 1 && activation == OutputActivation::Sigmoid {
        check_finite(raw)?;
        let p = raw[0].clamp(0.0, 1.0);
        return Ok(vec![1.0 - p, p]);
    }
    if raw.len() != classes {
        return Err(InferenceError::ShapeMismatch {
            expected: classes,
            actual: raw.len(),
        });
    }
    to_distribution(raw, activation)
}

/// Turn raw output into a distribution that sums to 1.
pub fn to_distribution(
    raw: &[f32],
    activation: OutputActivation,
) -> Result<Vec<f32>, InferenceError> {
    if raw.is_empty() {
        return Err(InferenceError::InvalidOutput("empty output".into()));
    }
    check_finite(raw)?;

    match activation {
        OutputActivation::Logits => Ok(softmax(raw)),
        OutputActivation::Softmax | OutputActivation::Sigmoid => {
            let clamped: Vec<f32> = raw.iter().map(|v| v.clamp(0.0, 1.0)).collect();
            let sum: f32 = clamped.iter().sum();
            if sum <= f32::EPSILON {
                return Err(InferenceError::InvalidOutput("all outputs are zero".into()));
            }
            Ok(clamped.into_iter().map(|v| v / sum).collect())
        }
    }
}

fn check_finite(raw: &[f32]) -> Result<(), InferenceError> {
    if raw.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(InferenceError::InvalidOutput("non-finite value".into()))
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Move output unit `i` to domain class `order[i]`.
pub fn reorder(distribution: &[f32], order: &[usize]) -> Vec<f32> {
    let mut out = vec![0.0; distribution.len()];
    for (&p, &class) in distribution.iter().zip(order) {
        if let Some(slot) = out.get_mut(class) {
            *slot = p;
        }
    }
    out
}

/// Fold a general-purpose classifier's distribution onto `classes` domain
/// classes: generic class `i` contributes to domain class `i % classes`.
pub fn fold_into(distribution: &[f32], classes: usize) -> Vec<f32> {
    let n = classes.max(1);
    let mut folded = vec![0.0; n];
    for (i, p) in distribution.iter().enumerate() {
        folded[i % n] += p;
    }
    let sum: f32 = folded.iter().sum();
    if sum > 0.0 {
        folded.iter_mut().for_each(|p| *p /= sum);
    }
    folded
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
