pub mod executor;
pub mod interpret;
pub mod preprocess;
pub mod simulate;
pub mod types;

pub use executor::*;
pub use interpret::*;
pub use preprocess::*;
pub use simulate::*;
pub use types::*;

use thiserror::Error;

use crate::registry::RuntimeError;

/// Failure while running a loaded model. Recovered by the executor, which
/// substitutes a simulated result.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("No model loaded")]
    NoModel,

    #[error("Model returned {actual} outputs, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Model output is not a usable distribution: {0}")]
    InvalidOutput(String),

    #[error("Inference timed out after {0} ms")]
    Timeout(u64),

    #[error("Inference worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// The only failure `Detector::detect` reports to callers.
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] InvalidImageError),
}
