//! MedVision: image-based screening for pneumonia (chest X-ray), skin lesions
//! (dermatoscopy) and brain stroke (CT/MRI).
//!
//! ```no_run
//! # async fn demo(bytes: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! use medvision::{Detector, Diagnosis, Domain, InferenceConfig};
//!
//! medvision::init_tracing();
//! let detector = Detector::from_config(&InferenceConfig::from_env())?;
//! match detector.detect(Domain::SkinLesion, &bytes).await {
//!     Diagnosis::Real(r) => println!("{} ({:.0}%)", r.label, r.confidence * 100.0),
//!     Diagnosis::Heuristic(r) | Diagnosis::Simulated(r) => {
//!         println!("{}: {}", r.label, r.warning.unwrap_or_default())
//!     }
//!     Diagnosis::Failed(e) => eprintln!("{e}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod detector;
pub mod domain;
pub mod pipeline;
pub mod registry;
pub mod tensor;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::InferenceConfig;
pub use detector::Detector;
pub use domain::{Domain, SeverityTier};
pub use pipeline::{DetectError, DiagnosticResult, Diagnosis, InferenceResult, Source};
pub use registry::{ModelRegistry, ModelState, ModelStatus};

use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber, filtered by `RUST_LOG` or the
/// build's default. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);
}
