use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::debug;

use super::AssetError;
use crate::config::InferenceConfig;

/// Where model manifests and weight shards are fetched from.
///
/// Paths are absolute within the asset tree (`/models/pneumonia/model.json`).
pub trait AssetSource: Send + Sync {
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, AssetError>>;

    /// Human-readable location for log lines.
    fn describe(&self) -> String;
}

/// Build the source selected by `config.asset_base`.
pub fn source_from_config(config: &InferenceConfig) -> Result<Arc<dyn AssetSource>, AssetError> {
    if config.uses_http() {
        let source = HttpAssetSource::new(&config.asset_base, config.load_timeout())?;
        Ok(Arc::new(source))
    } else {
        Ok(Arc::new(DirAssetSource::new(&config.asset_base)))
    }
}

// ═══════════════════════════════════════════════════════════
// HTTP
// ═══════════════════════════════════════════════════════════

/// Static asset server (the web app's `/models/` tree).
pub struct HttpAssetSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAssetSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AssetError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AssetError::Transport {
                path: base_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        let url = self.url_for(path);
        debug!(url = %url, "Fetching model asset");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AssetError::Transport {
                path: path.to_string(),
                reason: if e.is_connect() {
                    format!("cannot connect to {}", self.base_url)
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AssetError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(AssetError::Http {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| AssetError::Transport {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(body.to_vec())
    }
}

impl AssetSource for HttpAssetSource {
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, AssetError>> {
        self.get(path).boxed()
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

// ═══════════════════════════════════════════════════════════
// Local directory
// ═══════════════════════════════════════════════════════════

/// Asset tree on disk, e.g. `~/MedVision/models/...`.
pub struct DirAssetSource {
    root: PathBuf,
}

impl DirAssetSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Map an asset path under `root`, refusing anything that escapes it.
    fn resolve(&self, path: &str) -> Result<PathBuf, AssetError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(AssetError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        let full = self.resolve(path)?;
        debug!(path = %full.display(), "Reading model asset");
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(path.to_string()))
            }
            Err(e) => Err(AssetError::Io(e)),
        }
    }
}

impl AssetSource for DirAssetSource {
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, AssetError>> {
        self.read(path).boxed()
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

// ═══════════════════════════════════════════════════════════
// In-memory (tests, embedded bundles)
// ═══════════════════════════════════════════════════════════

/// Serves assets from a map and records every fetch.
#[derive(Default)]
pub struct MemoryAssetSource {
    assets: HashMap<String, Vec<u8>>,
    latency: Option<Duration>,
    fetches: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, path: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.assets.insert(path.into(), bytes);
        self
    }

    /// Delay every fetch, to hold loads in flight.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Paths requested so far, in order.
    pub fn fetch_log(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AssetSource for MemoryAssetSource {
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, AssetError>> {
        async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(path.to_string());
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.assets
                .get(path)
                .cloned()
                .ok_or_else(|| AssetError::NotFound(path.to_string()))
        }
        .boxed()
    }

    fn describe(&self) -> String {
        format!("memory ({} assets)", self.assets.len())
    }
}
