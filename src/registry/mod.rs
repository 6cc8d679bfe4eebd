pub mod manifest;
pub mod model_registry;
pub mod runtime;
pub mod source;

pub use manifest::*;
pub use model_registry::*;
pub use runtime::*;
pub use source::*;

use std::time::Duration;

use thiserror::Error;

/// Why a model asset could not be turned into a runnable classifier.
///
/// Never surfaced to `detect()` callers: the registry records it in
/// `ModelState::last_error` and degrades the domain's status instead.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} fetching {path}")]
    Http { status: u16, path: String },

    #[error("Transport error fetching {path}: {reason}")]
    Transport { path: String, reason: String },

    #[error("Invalid asset path: {0}")]
    InvalidPath(String),

    #[error("Malformed model asset: {0}")]
    Malformed(String),

    #[error("Shape mismatch in {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: String,
        expected: String,
        found: String,
    },

    #[error("Model runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Loading {path} timed out after {limit:?}")]
    Timeout { path: String, limit: Duration },
}
