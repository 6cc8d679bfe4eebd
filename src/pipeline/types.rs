use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use super::DetectError;
use crate::domain::{Domain, KnowledgeRecord, SeverityTier};

/// Which path produced a probability vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Domain-specific model.
    Primary,
    /// General-purpose classifier with a heuristic class remap.
    Fallback,
    /// Deterministic simulation; no model was consulted.
    Simulated,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

/// Normalized class probabilities in domain label order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceResult {
    pub probabilities: Vec<f32>,
    pub source: Source,
    /// Why a degraded path was taken, when one was.
    pub note: Option<String>,
}

impl InferenceResult {
    pub fn new(probabilities: Vec<f32>, source: Source) -> Self {
        Self {
            probabilities,
            source,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn sum(&self) -> f32 {
        self.probabilities.iter().sum()
    }

    /// Index and value of the largest probability. Ties keep the lowest index.
    pub fn top(&self) -> (usize, f32) {
        self.probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub name: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassProbability {
    pub label: String,
    pub probability: f32,
}

/// User-facing interpretation of one image.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticResult {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub domain: Domain,
    pub source: Source,
    /// Winning class label.
    pub label: String,
    pub class_index: usize,
    /// Largest probability in the distribution.
    pub top_probability: f32,
    /// Probability of the winning class.
    pub confidence: f32,
    /// Binary domains only: probability of the disease class.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive_probability: Option<f32>,
    pub severity: Option<SeverityTier>,
    pub findings: Vec<Finding>,
    pub recommendations: Vec<String>,
    /// All classes, most probable first.
    pub ranked: Vec<ClassProbability>,
    /// Multi-class domains only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge: Option<&'static KnowledgeRecord>,
    /// Present whenever the result did not come from the primary model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Outcome of `Detector::detect`, tagged by provenance so callers cannot
/// mistake a simulated answer for a model prediction.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum Diagnosis {
    Real(DiagnosticResult),
    Heuristic(DiagnosticResult),
    Simulated(DiagnosticResult),
    Failed(#[serde(serialize_with = "serialize_display")] DetectError),
}

impl Diagnosis {
    pub fn from_result(result: DiagnosticResult) -> Self {
        match result.source {
            Source::Primary => Self::Real(result),
            Source::Fallback => Self::Heuristic(result),
            Source::Simulated => Self::Simulated(result),
        }
    }

    pub fn result(&self) -> Option<&DiagnosticResult> {
        match self {
            Self::Real(r) | Self::Heuristic(r) | Self::Simulated(r) => Some(r),
            Self::Failed(_) => None,
        }
    }

    pub fn into_result(self) -> Result<DiagnosticResult, DetectError> {
        match self {
            Self::Real(r) | Self::Heuristic(r) | Self::Simulated(r) => Ok(r),
            Self::Failed(e) => Err(e),
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Self::Real(_))
    }
}

fn serialize_display<S: Serializer>(value: &impl fmt::Display, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::InvalidImageError;

    #[test]
    fn top_prefers_first_on_tie() {
        let r = InferenceResult::new(vec![0.4, 0.4, 0.2], Source::Primary);
        assert_eq!(r.top(), (0, 0.4));
        let r = InferenceResult::new(vec![0.1, 0.2, 0.7], Source::Primary);
        assert_eq!(r.top().0, 2);
    }

    #[test]
    fn failed_diagnosis_serializes_message() {
        let diagnosis =
            Diagnosis::Failed(DetectError::InvalidImage(InvalidImageError::TooShort(3)));
        let json = serde_json::to_value(&diagnosis).unwrap();
        assert_eq!(json["kind"], "failed");
        assert!(json["result"].as_str().unwrap().contains("Invalid image"));
        assert!(diagnosis.result().is_none());
    }

    #[test]
    fn source_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Source::Simulated).unwrap(), "\"simulated\"");
    }
}
