//! Model manifest (`model.json`) parsing and validation.
//!
//! Layout follows the TF.js convention the model conversion scripts emit: a JSON
//! manifest describing the topology plus one or more binary weight shards listed
//! under `weightsManifest`, fetched relative to the manifest's directory and
//! concatenated in order.
//!
//! ```json
//! {
//!   "format": "pooled-dense",
//!   "inputSize": 224,
//!   "inputRange": "unit",
//!   "outputActivation": "sigmoid",
//!   "outputUnits": 1,
//!   "weightsManifest": [{
//!     "paths": ["group1-shard1of1.bin"],
//!     "weights": [
//!       { "name": "dense/kernel", "shape": [3, 1], "dtype": "float32" },
//!       { "name": "dense/bias", "shape": [1], "dtype": "float32" }
//!     ]
//!   }]
//! }
//! ```

use serde::{Deserialize, Serialize};

use super::AssetError;
use crate::config;
use crate::tensor::InputRange;

/// How the weight shards are to be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFormat {
    /// Built-in runtime: per-channel global average pooling then one dense layer.
    PooledDense,
    /// Concatenated shards form an ONNX graph.
    Onnx,
}

/// What the raw output vector holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputActivation {
    /// Already a probability distribution.
    #[default]
    Softmax,
    /// Independent per-unit probabilities; a single unit is the positive class.
    Sigmoid,
    /// Unnormalized scores; softmax is applied after readback.
    Logits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightSpec {
    pub name: String,
    pub shape: Vec<usize>,
    #[serde(default = "default_dtype")]
    pub dtype: String,
}

impl WeightSpec {
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightGroup {
    pub paths: Vec<String>,
    #[serde(default)]
    pub weights: Vec<WeightSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelManifest {
    pub format: ModelFormat,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// Absent: the consuming domain's default convention applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_range: Option<InputRange>,
    #[serde(default)]
    pub output_activation: OutputActivation,
    pub output_units: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    pub weights_manifest: Vec<WeightGroup>,
}

fn default_dtype() -> String {
    "float32".to_string()
}

fn default_input_size() -> u32 {
    config::DEFAULT_INPUT_SIZE
}

impl ModelManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, AssetError> {
        serde_json::from_slice(bytes).map_err(|e| AssetError::Malformed(format!("model.json: {e}")))
    }

    pub fn to_json(&self) -> Result<Vec<u8>, AssetError> {
        serde_json::to_vec_pretty(self).map_err(|e| AssetError::Malformed(e.to_string()))
    }

    /// Structural checks that need no weight bytes.
    pub fn validate(&self, expected_input_size: u32) -> Result<(), AssetError> {
        if self.input_size != expected_input_size {
            return Err(AssetError::ShapeMismatch {
                what: "model input".into(),
                expected: format!("{expected_input_size}x{expected_input_size}x3"),
                found: format!("{0}x{0}x3", self.input_size),
            });
        }
        if self.output_units == 0 {
            return Err(AssetError::Malformed("outputUnits must be positive".into()));
        }
        if !self.labels.is_empty() && self.labels.len() != self.output_units {
            return Err(AssetError::Malformed(format!(
                "{} labels for {} output units",
                self.labels.len(),
                self.output_units
            )));
        }
        if self.weights_manifest.iter().all(|g| g.paths.is_empty()) {
            return Err(AssetError::Malformed("weightsManifest lists no shards".into()));
        }
        for group in &self.weights_manifest {
            for path in &group.paths {
                if path.split('/').any(|part| part == "..") {
                    return Err(AssetError::InvalidPath(path.clone()));
                }
            }
            if let Some(spec) = group.weights.iter().find(|w| w.dtype != "float32") {
                return Err(AssetError::Malformed(format!(
                    "weight {} has unsupported dtype {}",
                    spec.name, spec.dtype
                )));
            }
        }
        Ok(())
    }

    /// Shard paths resolved against the manifest's directory, in load order.
    pub fn shard_paths(&self, manifest_path: &str) -> Vec<String> {
        self.weights_manifest
            .iter()
            .flat_map(|group| group.paths.iter())
            .map(|shard| resolve_relative(manifest_path, shard))
            .collect()
    }

    pub fn weight_specs(&self) -> impl Iterator<Item = &WeightSpec> {
        self.weights_manifest.iter().flat_map(|g| g.weights.iter())
    }

    /// Total shard bytes implied by the weight specs (`None` when the manifest
    /// lists no specs, as for opaque ONNX graphs).
    pub fn expected_weight_bytes(&self) -> Option<usize> {
        let mut specs = self.weight_specs().peekable();
        specs.peek()?;
        Some(specs.map(|s| s.element_count() * 4).sum())
    }
}

/// Resolve `shard` relative to the directory of `manifest_path`.
/// Absolute shard paths are returned unchanged.
pub fn resolve_relative(manifest_path: &str, shard: &str) -> String {
    if shard.starts_with('/') {
        return shard.to_string();
    }
    let dir = manifest_path
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("");
    format!("{dir}/{shard}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "format": "pooled-dense",
        "inputSize": 224,
        "outputActivation": "sigmoid",
        "outputUnits": 1,
        "weightsManifest": [{
            "paths": ["group1-shard1of2.bin", "group1-shard2of2.bin"],
            "weights": [
                { "name": "dense/kernel", "shape": [3, 1], "dtype": "float32" },
                { "name": "dense/bias", "shape": [1] }
            ]
        }]
    }"#;

    #[test]
    fn parses_sample() {
        let manifest = ModelManifest::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(manifest.format, ModelFormat::PooledDense);
        assert_eq!(manifest.output_activation, OutputActivation::Sigmoid);
        assert_eq!(manifest.output_units, 1);
        assert_eq!(manifest.input_range, None);
        assert_eq!(manifest.expected_weight_bytes(), Some(16));
        assert!(manifest.validate(224).is_ok());
    }

    #[test]
    fn shard_paths_resolve_against_manifest_dir() {
        let manifest = ModelManifest::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            manifest.shard_paths("/models/pneumonia/model.json"),
            vec![
                "/models/pneumonia/group1-shard1of2.bin",
                "/models/pneumonia/group1-shard2of2.bin"
            ]
        );
    }

    #[test]
    fn absolute_shard_path_kept() {
        assert_eq!(
            resolve_relative("/models/x/model.json", "/shared/w.bin"),
            "/shared/w.bin"
        );
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = ModelManifest::parse(b"{ not json").unwrap_err();
        assert!(matches!(err, AssetError::Malformed(_)));
    }

    #[test]
    fn input_size_mismatch() {
        let manifest = ModelManifest::parse(SAMPLE.as_bytes()).unwrap();
        let err = manifest.validate(299).unwrap_err();
        assert!(matches!(err, AssetError::ShapeMismatch { .. }));
    }

    #[test]
    fn label_count_must_match_units() {
        let mut manifest = ModelManifest::parse(SAMPLE.as_bytes()).unwrap();
        manifest.labels = vec!["a".into(), "b".into()];
        assert!(matches!(manifest.validate(224), Err(AssetError::Malformed(_))));
    }

    #[test]
    fn unsupported_dtype_rejected() {
        let mut manifest = ModelManifest::parse(SAMPLE.as_bytes()).unwrap();
        manifest.weights_manifest[0].weights[0].dtype = "int8".into();
        assert!(matches!(manifest.validate(224), Err(AssetError::Malformed(_))));
    }

    #[test]
    fn traversal_in_shard_path_rejected() {
        let mut manifest = ModelManifest::parse(SAMPLE.as_bytes()).unwrap();
        manifest.weights_manifest[0].paths = vec!["../../secrets.bin".into()];
        assert!(matches!(manifest.validate(224), Err(AssetError::InvalidPath(_))));
    }

    #[test]
    fn onnx_manifest_has_no_expected_size() {
        let json = r#"{"format":"onnx","outputUnits":7,
            "weightsManifest":[{"paths":["model.onnx"]}]}"#;
        let manifest = ModelManifest::parse(json.as_bytes()).unwrap();
        assert_eq!(manifest.format, ModelFormat::Onnx);
        assert_eq!(manifest.input_size, 224);
        assert_eq!(manifest.output_activation, OutputActivation::Softmax);
        assert_eq!(manifest.expected_weight_bytes(), None);
    }

    #[test]
    fn round_trips_through_json() {
        let manifest = ModelManifest::parse(SAMPLE.as_bytes()).unwrap();
        let bytes = manifest.to_json().unwrap();
        let again = ModelManifest::parse(&bytes).unwrap();
        assert_eq!(again.shard_paths("/m/model.json").len(), 2);
    }
}
