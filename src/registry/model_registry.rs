//! Per-domain model lifecycle.
//!
//! Each domain moves `Unloaded → Loading → {PrimaryLoaded | FallbackLoaded |
//! Unavailable}`. Concurrent callers of `ensure_loaded` share one in-flight load;
//! a settled state is kept for the lifetime of the registry. Loading never fails
//! from the caller's point of view: the worst outcome is `Unavailable`, which
//! routes requests to simulation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::manifest::{ModelManifest, OutputActivation};
use super::runtime::{ClassifierModel, DefaultRuntime, ModelRuntime};
use super::source::{source_from_config, AssetSource};
use super::AssetError;
use crate::config::InferenceConfig;
use crate::domain::Domain;
use crate::tensor::InputRange;

// ═══════════════════════════════════════════════════════════
// State types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Unloaded,
    Loading,
    PrimaryLoaded,
    FallbackLoaded,
    Unavailable,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::PrimaryLoaded => "primary_loaded",
            Self::FallbackLoaded => "fallback_loaded",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelState {
    pub status: ModelStatus,
    pub last_error: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl ModelState {
    fn with_status(status: ModelStatus) -> Self {
        Self {
            status,
            last_error: None,
            loaded_at: None,
        }
    }
}

/// Health line for one domain, as reported by `ModelRegistry::snapshot`.
#[derive(Debug, Clone, Serialize)]
pub struct DomainHealth {
    pub domain: Domain,
    #[serde(flatten)]
    pub state: ModelState,
}

/// Settled outcome of a load. Cheap to clone via `Arc`.
pub struct ModelHandle {
    domain: Domain,
    state: ModelState,
    model: Option<Arc<dyn ClassifierModel>>,
    class_order: Option<Vec<usize>>,
}

impl ModelHandle {
    fn loaded(
        domain: Domain,
        status: ModelStatus,
        built: BuiltModel,
        last_error: Option<String>,
    ) -> Self {
        Self {
            domain,
            state: ModelState {
                status,
                last_error,
                loaded_at: Some(Utc::now()),
            },
            model: Some(built.model),
            class_order: built.class_order,
        }
    }

    fn unavailable(domain: Domain, reason: String) -> Self {
        Self {
            domain,
            state: ModelState {
                status: ModelStatus::Unavailable,
                last_error: Some(reason),
                loaded_at: None,
            },
            model: None,
            class_order: None,
        }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn status(&self) -> ModelStatus {
        self.state.status
    }

    /// `None` when the domain is `Unavailable`.
    pub fn model(&self) -> Option<&Arc<dyn ClassifierModel>> {
        self.model.as_ref()
    }

    /// Domain class index of each output unit, when the model's declared
    /// labels are in a different order than the domain's.
    pub fn class_order(&self) -> Option<&[usize]> {
        self.class_order.as_deref()
    }

    /// Pixel convention for tensorization: the model's, else the domain default.
    pub fn input_range(&self) -> InputRange {
        self.model
            .as_ref()
            .map(|m| m.input_range())
            .unwrap_or(self.domain.descriptor().input_range)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("domain", &self.domain)
            .field("state", &self.state)
            .field("has_model", &self.model.is_some())
            .field("class_order", &self.class_order)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub fallback_model_path: String,
    pub input_size: u32,
    /// Applied to each stage (primary, fallback) separately.
    pub load_timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from(&InferenceConfig::default())
    }
}

impl From<&InferenceConfig> for RegistrySettings {
    fn from(config: &InferenceConfig) -> Self {
        Self {
            fallback_model_path: config.fallback_model_path.clone(),
            input_size: config.input_size,
            load_timeout: config.load_timeout(),
        }
    }
}

type PendingLoad = Shared<BoxFuture<'static, Arc<ModelHandle>>>;

enum Slot {
    Loading(PendingLoad),
    Settled(Arc<ModelHandle>),
}

/// Owns the loaded models of all domains. Constructed once and shared
/// (`Arc<ModelRegistry>`) by every detector that should reuse its models.
pub struct ModelRegistry {
    loader: Arc<Loader>,
    slots: Mutex<HashMap<Domain, Slot>>,
}

impl ModelRegistry {
    pub fn new(
        source: Arc<dyn AssetSource>,
        runtime: Arc<dyn ModelRuntime>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            loader: Arc::new(Loader {
                source,
                runtime,
                settings,
            }),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Registry over the configured asset source with the built-in runtime.
    pub fn from_config(config: &InferenceConfig) -> Result<Self, AssetError> {
        let source = source_from_config(config)?;
        info!(source = %source.describe(), "Model registry initialized");
        Ok(Self::new(
            source,
            Arc::new(DefaultRuntime),
            RegistrySettings::from(config),
        ))
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<Domain, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the settled handle for `domain`, loading it on first use.
    ///
    /// Concurrent callers during a load all await the same attempt, so the
    /// asset source sees one fetch sequence per domain.
    pub async fn ensure_loaded(&self, domain: Domain) -> Arc<ModelHandle> {
        let pending = {
            let mut slots = self.lock_slots();
            match slots.get(&domain) {
                Some(Slot::Settled(handle)) => return Arc::clone(handle),
                Some(Slot::Loading(pending)) => {
                    debug!(%domain, "Joining in-flight model load");
                    pending.clone()
                }
                None => {
                    let loader = Arc::clone(&self.loader);
                    let pending = async move { Arc::new(loader.load(domain).await) }
                        .boxed()
                        .shared();
                    slots.insert(domain, Slot::Loading(pending.clone()));
                    pending
                }
            }
        };

        let handle = pending.await;

        let mut slots = self.lock_slots();
        if let Some(Slot::Loading(_)) = slots.get(&domain) {
            slots.insert(domain, Slot::Settled(Arc::clone(&handle)));
        }
        handle
    }

    /// Current state without triggering a load.
    pub fn status(&self, domain: Domain) -> ModelState {
        match self.lock_slots().get(&domain) {
            None => ModelState::with_status(ModelStatus::Unloaded),
            Some(Slot::Loading(_)) => ModelState::with_status(ModelStatus::Loading),
            Some(Slot::Settled(handle)) => handle.state().clone(),
        }
    }

    pub fn snapshot(&self) -> Vec<DomainHealth> {
        Domain::ALL
            .iter()
            .map(|&domain| DomainHealth {
                domain,
                state: self.status(domain),
            })
            .collect()
    }

    /// Retire a domain's model after a runtime failure. Later requests simulate.
    pub fn mark_unavailable(&self, domain: Domain, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%domain, reason = %reason, "Marking model unavailable");
        self.lock_slots().insert(
            domain,
            Slot::Settled(Arc::new(ModelHandle::unavailable(domain, reason))),
        );
    }
}

// ═══════════════════════════════════════════════════════════
// Loader
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Primary,
    Fallback,
}

struct BuiltModel {
    model: Arc<dyn ClassifierModel>,
    class_order: Option<Vec<usize>>,
}

struct Loader {
    source: Arc<dyn AssetSource>,
    runtime: Arc<dyn ModelRuntime>,
    settings: RegistrySettings,
}

impl Loader {
    async fn load(&self, domain: Domain) -> ModelHandle {
        let started = Instant::now();
        let primary_path = domain.asset_path();
        info!(%domain, path = %primary_path, "Loading primary model");

        let primary_err = match self.load_stage(domain, &primary_path, Stage::Primary).await {
            Ok(built) => {
                info!(
                    %domain,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    remapped = built.class_order.is_some(),
                    "Primary model ready"
                );
                return ModelHandle::loaded(domain, ModelStatus::PrimaryLoaded, built, None);
            }
            Err(e) => e,
        };

        let fallback_path = &self.settings.fallback_model_path;
        warn!(
            %domain,
            error = %primary_err,
            fallback = %fallback_path,
            "Primary model unavailable, trying general-purpose classifier"
        );

        match self.load_stage(domain, fallback_path, Stage::Fallback).await {
            Ok(built) => {
                info!(
                    %domain,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Fallback model ready"
                );
                ModelHandle::loaded(
                    domain,
                    ModelStatus::FallbackLoaded,
                    built,
                    Some(format!("primary: {primary_err}")),
                )
            }
            Err(fallback_err) => {
                warn!(
                    %domain,
                    error = %fallback_err,
                    "No model available, requests will be simulated"
                );
                ModelHandle::unavailable(
                    domain,
                    format!("primary: {primary_err}; fallback: {fallback_err}"),
                )
            }
        }
    }

    async fn load_stage(
        &self,
        domain: Domain,
        path: &str,
        stage: Stage,
    ) -> Result<BuiltModel, AssetError> {
        let limit = self.settings.load_timeout;
        match tokio::time::timeout(limit, self.fetch_model(domain, path, stage)).await {
            Ok(result) => result,
            Err(_) => Err(AssetError::Timeout {
                path: path.to_string(),
                limit,
            }),
        }
    }

    async fn fetch_model(
        &self,
        domain: Domain,
        path: &str,
        stage: Stage,
    ) -> Result<BuiltModel, AssetError> {
        let manifest_bytes = self.source.fetch(path).await?;
        let manifest = ModelManifest::parse(&manifest_bytes)?;
        manifest.validate(self.settings.input_size)?;
        let class_order = match stage {
            Stage::Primary => check_domain_outputs(domain, &manifest)?,
            Stage::Fallback => None,
        };

        let mut weights = Vec::new();
        for shard in manifest.shard_paths(path) {
            weights.extend(self.source.fetch(&shard).await?);
        }
        if let Some(expected) = manifest.expected_weight_bytes() {
            if weights.len() != expected {
                return Err(AssetError::ShapeMismatch {
                    what: format!("weights of {path}"),
                    expected: format!("{expected} bytes"),
                    found: format!("{} bytes", weights.len()),
                });
            }
        }

        debug!(
            %domain,
            path,
            weight_bytes = weights.len(),
            units = manifest.output_units,
            "Building model"
        );
        let model = self
            .runtime
            .build(&manifest, weights, domain.descriptor().input_range)?;
        Ok(BuiltModel { model, class_order })
    }
}

/// A primary model must emit one value per domain class, or a single
/// sigmoid unit for a binary domain.
///
/// Declared `labels` must name the domain's classes (case-insensitive, each
/// once). Returns the domain index of every output unit when that order
/// differs from the domain's, `None` when no remap is needed.
fn check_domain_outputs(
    domain: Domain,
    manifest: &ModelManifest,
) -> Result<Option<Vec<usize>>, AssetError> {
    let descriptor = domain.descriptor();
    let classes = descriptor.num_classes();
    let units = manifest.output_units;
    let single_sigmoid =
        classes == 2 && units == 1 && manifest.output_activation == OutputActivation::Sigmoid;
    if units != classes && !single_sigmoid {
        return Err(AssetError::ShapeMismatch {
            what: format!("{domain} model output"),
            expected: format!("{classes} classes"),
            found: format!("{units} units"),
        });
    }
    if manifest.labels.is_empty() {
        return Ok(None);
    }

    let label_mismatch = || AssetError::ShapeMismatch {
        what: format!("{domain} model labels"),
        expected: descriptor.labels.join(", "),
        found: manifest.labels.join(", "),
    };
    let position = |label: &str| {
        descriptor
            .labels
            .iter()
            .position(|known| known.eq_ignore_ascii_case(label.trim()))
    };

    if single_sigmoid {
        // The unit is the positive class probability.
        return match manifest.labels.first().and_then(|l| position(l.as_str())) {
            Some(1) => Ok(None),
            _ => Err(label_mismatch()),
        };
    }

    let mut order = Vec::with_capacity(units);
    for label in &manifest.labels {
        match position(label.as_str()) {
            Some(index) if !order.contains(&index) => order.push(index),
            _ => return Err(label_mismatch()),
        }
    }
    if order.iter().enumerate().all(|(unit, &class)| unit == class) {
        Ok(None)
    } else {
        Ok(Some(order))
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::SKIN_LESION_LABELS;
    use crate::registry::{MemoryAssetSource, PooledDenseModel};
    use crate::test_support::{
        constant_model, generic_model, with_labeled_primary, with_model, with_primary,
        GENERIC_PATH,
    };
    use futures_util::future::join_all;

    fn registry(source: Arc<MemoryAssetSource>) -> ModelRegistry {
        ModelRegistry::new(source, Arc::new(DefaultRuntime), RegistrySettings::default())
    }

    fn pneumonia_source() -> MemoryAssetSource {
        with_primary(
            MemoryAssetSource::new(),
            Domain::Pneumonia,
            &constant_model(vec![0.9], OutputActivation::Sigmoid),
        )
    }

    #[tokio::test]
    async fn loads_primary_once() {
        let source = Arc::new(pneumonia_source());
        let registry = registry(source.clone());

        let handle = registry.ensure_loaded(Domain::Pneumonia).await;
        assert_eq!(handle.status(), ModelStatus::PrimaryLoaded);
        assert!(handle.model().is_some());
        assert!(handle.state().loaded_at.is_some());
        assert_eq!(source.fetch_count(), 2);

        let again = registry.ensure_loaded(Domain::Pneumonia).await;
        assert!(Arc::ptr_eq(&handle, &again));
        assert_eq!(source.fetch_count(), 2);
        assert_eq!(registry.status(Domain::Pneumonia).status, ModelStatus::PrimaryLoaded);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let source = Arc::new(pneumonia_source().with_latency(Duration::from_millis(40)));
        let registry = registry(source.clone());

        let handles =
            join_all((0..8).map(|_| registry.ensure_loaded(Domain::Pneumonia))).await;

        assert_eq!(source.fetch_count(), 2);
        for handle in &handles {
            assert!(Arc::ptr_eq(handle, &handles[0]));
            assert_eq!(handle.status(), ModelStatus::PrimaryLoaded);
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_failed_load() {
        let source = Arc::new(MemoryAssetSource::new().with_latency(Duration::from_millis(20)));
        let registry = registry(source.clone());

        let handles = join_all((0..5).map(|_| registry.ensure_loaded(Domain::SkinLesion))).await;

        // Primary manifest, then fallback manifest; nothing per caller.
        assert_eq!(
            source.fetch_log(),
            vec!["/models/skin-cancer/model.json", GENERIC_PATH]
        );
        assert!(handles.iter().all(|h| h.status() == ModelStatus::Unavailable));
    }

    #[tokio::test]
    async fn status_reports_loading_while_in_flight() {
        let source = Arc::new(pneumonia_source().with_latency(Duration::from_millis(100)));
        let registry = registry(source);

        assert_eq!(registry.status(Domain::Pneumonia).status, ModelStatus::Unloaded);
        let (handle, during) = tokio::join!(registry.ensure_loaded(Domain::Pneumonia), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            registry.status(Domain::Pneumonia)
        });
        assert_eq!(during.status, ModelStatus::Loading);
        assert_eq!(handle.status(), ModelStatus::PrimaryLoaded);
    }

    #[tokio::test]
    async fn missing_primary_uses_fallback() {
        let source = Arc::new(with_model(MemoryAssetSource::new(), GENERIC_PATH, &generic_model()));
        let registry = registry(source);

        let handle = registry.ensure_loaded(Domain::BrainStroke).await;
        assert_eq!(handle.status(), ModelStatus::FallbackLoaded);
        let err = handle.state().last_error.clone().unwrap();
        assert!(err.contains("not found"), "{err}");
    }

    #[tokio::test]
    async fn nothing_available_is_unavailable() {
        let registry = registry(Arc::new(MemoryAssetSource::new()));

        let handle = registry.ensure_loaded(Domain::Pneumonia).await;
        assert_eq!(handle.status(), ModelStatus::Unavailable);
        assert!(handle.model().is_none());
        let err = handle.state().last_error.clone().unwrap();
        assert!(err.contains("primary:") && err.contains("fallback:"), "{err}");
        assert_eq!(handle.input_range(), InputRange::Unit);
    }

    #[tokio::test]
    async fn malformed_primary_falls_back() {
        let source = with_model(MemoryAssetSource::new(), GENERIC_PATH, &generic_model())
            .with_asset(Domain::Pneumonia.asset_path(), b"<html>404</html>".to_vec());
        let registry = registry(Arc::new(source));

        let handle = registry.ensure_loaded(Domain::Pneumonia).await;
        assert_eq!(handle.status(), ModelStatus::FallbackLoaded);
        assert!(handle.state().last_error.as_ref().unwrap().contains("Malformed"));
    }

    #[tokio::test]
    async fn truncated_shard_is_shape_mismatch() {
        let model = constant_model(vec![0.9], OutputActivation::Sigmoid);
        let (json, mut shard) = model.to_assets("w.bin").unwrap();
        shard.truncate(4);
        let source = MemoryAssetSource::new()
            .with_asset("/models/pneumonia/model.json", json)
            .with_asset("/models/pneumonia/w.bin", shard);
        let registry = registry(Arc::new(source));

        let handle = registry.ensure_loaded(Domain::Pneumonia).await;
        assert_eq!(handle.status(), ModelStatus::Unavailable);
        assert!(handle.state().last_error.as_ref().unwrap().contains("Shape mismatch"));
    }

    #[tokio::test]
    async fn primary_with_wrong_class_count_is_rejected() {
        let source = with_primary(
            MemoryAssetSource::new(),
            Domain::SkinLesion,
            &constant_model(vec![0.5, 0.5], OutputActivation::Softmax),
        );
        let registry = registry(Arc::new(source));

        let handle = registry.ensure_loaded(Domain::SkinLesion).await;
        assert_eq!(handle.status(), ModelStatus::Unavailable);
        assert!(handle.state().last_error.as_ref().unwrap().contains("7 classes"));
    }

    fn skin_model() -> PooledDenseModel {
        constant_model(vec![0.7, 0.05, 0.05, 0.05, 0.05, 0.05, 0.05], OutputActivation::Softmax)
    }

    #[tokio::test]
    async fn declared_labels_remap_outputs() {
        let labels = [
            "Melanoma",
            "Actinic Keratoses",
            "Basal Cell Carcinoma",
            "Benign Keratosis",
            "Dermatofibroma",
            "Melanocytic Nevi",
            "Vascular Lesions",
        ];
        let source = with_labeled_primary(
            MemoryAssetSource::new(),
            Domain::SkinLesion,
            &skin_model(),
            &labels,
        );
        let registry = registry(Arc::new(source));

        let handle = registry.ensure_loaded(Domain::SkinLesion).await;
        assert_eq!(handle.status(), ModelStatus::PrimaryLoaded);
        assert_eq!(handle.class_order(), Some(&[4, 0, 1, 2, 3, 5, 6][..]));
    }

    #[tokio::test]
    async fn labels_in_domain_order_need_no_remap() {
        let lower: Vec<String> = SKIN_LESION_LABELS.iter().map(|l| l.to_lowercase()).collect();
        let labels: Vec<&str> = lower.iter().map(String::as_str).collect();
        let source = with_labeled_primary(
            MemoryAssetSource::new(),
            Domain::SkinLesion,
            &skin_model(),
            &labels,
        );
        let registry = registry(Arc::new(source));

        let handle = registry.ensure_loaded(Domain::SkinLesion).await;
        assert_eq!(handle.status(), ModelStatus::PrimaryLoaded);
        assert!(handle.class_order().is_none());
    }

    #[tokio::test]
    async fn unknown_or_repeated_labels_reject_primary() {
        let mut unknown = SKIN_LESION_LABELS.to_vec();
        unknown[2] = "Freckle";
        let mut repeated = SKIN_LESION_LABELS.to_vec();
        repeated[6] = "melanoma";

        for labels in [unknown, repeated] {
            let source = with_labeled_primary(
                with_model(MemoryAssetSource::new(), GENERIC_PATH, &generic_model()),
                Domain::SkinLesion,
                &skin_model(),
                &labels,
            );
            let registry = registry(Arc::new(source));

            let handle = registry.ensure_loaded(Domain::SkinLesion).await;
            assert_eq!(handle.status(), ModelStatus::FallbackLoaded);
            let err = handle.state().last_error.clone().unwrap();
            assert!(err.contains("skin-cancer model labels"), "{err}");
        }
    }

    #[tokio::test]
    async fn single_sigmoid_label_must_name_positive_class() {
        let model = constant_model(vec![0.9], OutputActivation::Sigmoid);

        let labels = ["pneumonia"];
        let source =
            with_labeled_primary(MemoryAssetSource::new(), Domain::Pneumonia, &model, &labels);
        let handle = registry(Arc::new(source)).ensure_loaded(Domain::Pneumonia).await;
        assert_eq!(handle.status(), ModelStatus::PrimaryLoaded);
        assert!(handle.class_order().is_none());

        let source =
            with_labeled_primary(MemoryAssetSource::new(), Domain::Pneumonia, &model, &["Normal"]);
        let handle = registry(Arc::new(source)).ensure_loaded(Domain::Pneumonia).await;
        assert_eq!(handle.status(), ModelStatus::Unavailable);
    }

    #[tokio::test]
    async fn slow_source_times_out() {
        let source = Arc::new(pneumonia_source().with_latency(Duration::from_millis(200)));
        let settings = RegistrySettings {
            load_timeout: Duration::from_millis(30),
            ..RegistrySettings::default()
        };
        let registry = ModelRegistry::new(source, Arc::new(DefaultRuntime), settings);

        let handle = registry.ensure_loaded(Domain::Pneumonia).await;
        assert_eq!(handle.status(), ModelStatus::Unavailable);
        assert!(handle.state().last_error.as_ref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn mark_unavailable_is_sticky() {
        let source = Arc::new(pneumonia_source());
        let registry = registry(source.clone());
        registry.ensure_loaded(Domain::Pneumonia).await;

        registry.mark_unavailable(Domain::Pneumonia, "inference timed out");
        let state = registry.status(Domain::Pneumonia);
        assert_eq!(state.status, ModelStatus::Unavailable);
        assert_eq!(state.last_error.as_deref(), Some("inference timed out"));

        let handle = registry.ensure_loaded(Domain::Pneumonia).await;
        assert_eq!(handle.status(), ModelStatus::Unavailable);
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn registries_do_not_share_models() {
        let source = Arc::new(pneumonia_source());
        let a = registry(source.clone());
        let b = registry(source.clone());
        a.ensure_loaded(Domain::Pneumonia).await;
        b.ensure_loaded(Domain::Pneumonia).await;
        assert_eq!(source.fetch_count(), 4);
    }

    #[tokio::test]
    async fn domains_load_independently() {
        let source = Arc::new(pneumonia_source());
        let registry = registry(source);
        registry.ensure_loaded(Domain::Pneumonia).await;

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 3);
        let by_domain = |d: Domain| snapshot.iter().find(|h| h.domain == d).unwrap().state.status;
        assert_eq!(by_domain(Domain::Pneumonia), ModelStatus::PrimaryLoaded);
        assert_eq!(by_domain(Domain::SkinLesion), ModelStatus::Unloaded);
        assert_eq!(by_domain(Domain::BrainStroke), ModelStatus::Unloaded);
    }

    #[test]
    fn health_serializes_flat() {
        let health = DomainHealth {
            domain: Domain::SkinLesion,
            state: ModelState::with_status(ModelStatus::FallbackLoaded),
        };
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["domain"], "skin_lesion");
        assert_eq!(json["status"], "fallback_loaded");
    }
}
