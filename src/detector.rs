use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::InferenceConfig;
use crate::domain::Domain;
use crate::pipeline::{
    decode_data_url, DetectError, Diagnosis, ImagePreprocessor, InferenceError,
    InferenceExecutor, PreprocessConfig, PreprocessingPipeline, ResultInterpreter,
};
use crate::registry::{AssetError, DomainHealth, ModelRegistry};
use crate::tensor::BufferTracker;

/// Entry point: one image in, one tagged diagnosis out.
///
/// Detectors built over the same `Arc<ModelRegistry>` share loaded models.
pub struct Detector {
    registry: Arc<ModelRegistry>,
    preprocessor: PreprocessingPipeline,
    executor: InferenceExecutor,
    interpreter: ResultInterpreter,
    tracker: BufferTracker,
}

impl Detector {
    pub fn new(registry: Arc<ModelRegistry>, config: &InferenceConfig) -> Self {
        let tracker = BufferTracker::new();
        let preprocess = PreprocessConfig {
            target_size: config.input_size,
            min_dimension: config.min_dimension,
            max_input_dimension: config.max_input_dimension,
            ..PreprocessConfig::default()
        };
        Self {
            registry,
            preprocessor: PreprocessingPipeline::new(preprocess, tracker.clone()),
            executor: InferenceExecutor::new(tracker.clone(), config.inference_timeout()),
            interpreter: ResultInterpreter,
            tracker,
        }
    }

    /// Detector with its own registry over the configured asset source.
    pub fn from_config(config: &InferenceConfig) -> Result<Self, AssetError> {
        let registry = ModelRegistry::from_config(config)?;
        Ok(Self::new(Arc::new(registry), config))
    }

    pub fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.executor = InferenceExecutor::new(self.tracker.clone(), timeout);
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Live tensor accounting for this detector's requests.
    pub fn buffers(&self) -> &BufferTracker {
        &self.tracker
    }

    pub fn health(&self) -> Vec<DomainHealth> {
        self.registry.snapshot()
    }

    /// Classify one image. Only an unusable image yields `Diagnosis::Failed`;
    /// model problems degrade to heuristic or simulated results.
    pub async fn detect(&self, domain: Domain, image_bytes: &[u8]) -> Diagnosis {
        let started = Instant::now();

        // Validation first: a bad upload never triggers a model load.
        let prepared = match self.preprocessor.prepare(image_bytes) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(%domain, error = %e, "Rejected image");
                return Diagnosis::Failed(DetectError::from(e));
            }
        };

        let handle = self.registry.ensure_loaded(domain).await;

        let tensor = match self.preprocessor.tensorize(&prepared, handle.input_range()) {
            Ok(tensor) => tensor,
            Err(e) => {
                warn!(%domain, error = %e, "Tensorization failed");
                return Diagnosis::Failed(DetectError::from(e));
            }
        };
        drop(prepared);

        let execution = self.executor.infer(tensor, image_bytes, &handle).await;
        if let Some(err @ InferenceError::Timeout(_)) = &execution.failure {
            self.registry.mark_unavailable(domain, err.to_string());
        }

        let result = self.interpreter.interpret(&execution.result, domain);
        info!(
            %domain,
            source = %result.source,
            label = %result.label,
            confidence = result.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Diagnosis complete"
        );
        Diagnosis::from_result(result)
    }

    /// `detect` for a `data:image/...;base64,` payload (or bare base64).
    pub async fn detect_data_url(&self, domain: Domain, payload: &str) -> Diagnosis {
        match decode_data_url(payload) {
            Ok(bytes) => self.detect(domain, &bytes).await,
            Err(e) => {
                warn!(%domain, error = %e, "Rejected data URL");
                Diagnosis::Failed(DetectError::from(e))
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
