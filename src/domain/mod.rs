//! Diagnostic domains and their descriptors.
//!
//! The pneumonia, skin-lesion and brain-stroke classifiers share one pipeline.
//! Everything that differs between them (class taxonomy, input convention,
//! severity bands, recommendation and knowledge tables, simulation bias) lives in
//! a static `DomainDescriptor` selected by `Domain::descriptor()`.

pub mod knowledge;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tensor::InputRange;

pub use knowledge::KnowledgeRecord;

// ═══════════════════════════════════════════════════════════
// Domain
// ═══════════════════════════════════════════════════════════

/// One independent classification task with its own model asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Pneumonia,
    SkinLesion,
    BrainStroke,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown diagnostic domain: {0}")]
pub struct UnknownDomain(pub String);

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Pneumonia, Domain::SkinLesion, Domain::BrainStroke];

    /// Asset directory name under `/models/`.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Pneumonia => "pneumonia",
            Self::SkinLesion => "skin-cancer",
            Self::BrainStroke => "brain-stroke",
        }
    }

    /// Well-known manifest path of the primary model.
    pub fn asset_path(self) -> String {
        format!("/models/{}/model.json", self.slug())
    }

    pub fn descriptor(self) -> &'static DomainDescriptor {
        match self {
            Self::Pneumonia => &PNEUMONIA,
            Self::SkinLesion => &SKIN_LESION,
            Self::BrainStroke => &BRAIN_STROKE,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Domain {
    type Err = UnknownDomain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pneumonia" => Ok(Self::Pneumonia),
            "skin-cancer" | "skin-lesion" | "skin_lesion" | "skin" => Ok(Self::SkinLesion),
            "brain-stroke" | "brain_stroke" | "stroke" => Ok(Self::BrainStroke),
            _ => Err(UnknownDomain(s.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Severity
// ═══════════════════════════════════════════════════════════

/// Ordered severity bucket. `Mild < Moderate < Severe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityTier {
    Mild,
    Moderate,
    Severe,
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mild => write!(f, "Mild"),
            Self::Moderate => write!(f, "Moderate"),
            Self::Severe => write!(f, "Severe"),
        }
    }
}

/// Probability band: a positive probability strictly above `above` maps to `tier`.
#[derive(Debug, Clone, Copy)]
pub struct SeverityBand {
    pub above: f32,
    pub tier: SeverityTier,
}

/// Bands shared by both binary domains, checked top-down.
const BINARY_BANDS: &[SeverityBand] = &[
    SeverityBand {
        above: 0.9,
        tier: SeverityTier::Severe,
    },
    SeverityBand {
        above: 0.8,
        tier: SeverityTier::Moderate,
    },
];

// ═══════════════════════════════════════════════════════════
// Descriptor types
// ═══════════════════════════════════════════════════════════

/// Recommendation lists, escalating with severity.
///
/// Composition: severe = `severe` + `base`; moderate = `moderate` + `base`;
/// mild = `mild_lead` + `base` + `mild_tail`; negative = `negative`.
#[derive(Debug)]
pub struct RecommendationTable {
    pub base: &'static [&'static str],
    pub severe: &'static [&'static str],
    pub moderate: &'static [&'static str],
    pub mild_lead: &'static [&'static str],
    pub mild_tail: &'static [&'static str],
    pub negative: &'static [&'static str],
}

impl RecommendationTable {
    pub fn for_tier(&self, tier: Option<SeverityTier>) -> Vec<String> {
        let parts: Vec<&[&str]> = match tier {
            Some(SeverityTier::Severe) => vec![self.severe, self.base],
            Some(SeverityTier::Moderate) => vec![self.moderate, self.base],
            Some(SeverityTier::Mild) => vec![self.mild_lead, self.base, self.mild_tail],
            None => vec![self.negative],
        };
        parts
            .into_iter()
            .flatten()
            .map(|s| s.to_string())
            .collect()
    }
}

/// Textual finding rendered for binary domains. `{pct}` in either text is
/// replaced with the positive probability as a percentage.
#[derive(Debug)]
pub struct FindingTemplate {
    pub name: &'static str,
    pub positive: &'static str,
    pub negative: &'static str,
}

#[derive(Debug)]
pub struct BinaryPolicy {
    /// Index of the positive (disease) class in `DomainDescriptor::labels`.
    pub positive_index: usize,
    pub threshold: f32,
    /// Checked in order; first band whose `above` is exceeded wins.
    pub bands: &'static [SeverityBand],
    pub recommendations: &'static RecommendationTable,
    pub findings: &'static [FindingTemplate],
}

impl BinaryPolicy {
    pub fn is_positive(&self, positive_probability: f32) -> bool {
        positive_probability > self.threshold
    }

    /// `None` below the threshold; otherwise the first matching band, else Mild.
    pub fn severity(&self, positive_probability: f32) -> Option<SeverityTier> {
        if !self.is_positive(positive_probability) {
            return None;
        }
        let tier = self
            .bands
            .iter()
            .find(|band| positive_probability > band.above)
            .map(|band| band.tier)
            .unwrap_or(SeverityTier::Mild);
        Some(tier)
    }
}

#[derive(Debug)]
pub struct MultiClassPolicy {
    pub knowledge: &'static [KnowledgeRecord],
    /// Used when no record matches the winning class.
    pub generic: &'static KnowledgeRecord,
    /// Selected by the matched record's `risk`.
    pub recommendations: &'static RecommendationTable,
}

#[derive(Debug)]
pub enum DomainKind {
    Binary(BinaryPolicy),
    MultiClass(MultiClassPolicy),
}

/// Bias of the deterministic simulation: `benign_index` receives a probability
/// in `[floor, floor + span)`, the rest is spread over the other classes.
#[derive(Debug, Clone, Copy)]
pub struct SimulationProfile {
    pub benign_index: usize,
    pub floor: f32,
    pub span: f32,
}

/// Strategy object parameterizing the shared pipeline for one domain.
#[derive(Debug)]
pub struct DomainDescriptor {
    pub domain: Domain,
    pub labels: &'static [&'static str],
    /// Input convention assumed when a manifest does not declare one.
    pub input_range: InputRange,
    pub kind: DomainKind,
    pub simulation: SimulationProfile,
}

impl DomainDescriptor {
    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn label(&self, index: usize) -> &'static str {
        self.labels.get(index).copied().unwrap_or("Unknown")
    }
}

// ═══════════════════════════════════════════════════════════
// Domain tables
// ═══════════════════════════════════════════════════════════

static PNEUMONIA: DomainDescriptor = DomainDescriptor {
    domain: Domain::Pneumonia,
    labels: &["Normal", "Pneumonia"],
    input_range: InputRange::Unit,
    kind: DomainKind::Binary(BinaryPolicy {
        positive_index: 1,
        threshold: 0.5,
        bands: BINARY_BANDS,
        recommendations: &knowledge::PNEUMONIA_RECOMMENDATIONS,
        findings: knowledge::PNEUMONIA_FINDINGS,
    }),
    simulation: SimulationProfile {
        benign_index: 0,
        floor: 0.55,
        span: 0.35,
    },
};

static BRAIN_STROKE: DomainDescriptor = DomainDescriptor {
    domain: Domain::BrainStroke,
    labels: &["Normal", "Stroke"],
    input_range: InputRange::Unit,
    kind: DomainKind::Binary(BinaryPolicy {
        positive_index: 1,
        threshold: 0.5,
        bands: BINARY_BANDS,
        recommendations: &knowledge::STROKE_RECOMMENDATIONS,
        findings: knowledge::STROKE_FINDINGS,
    }),
    simulation: SimulationProfile {
        benign_index: 0,
        floor: 0.55,
        span: 0.35,
    },
};

static SKIN_LESION: DomainDescriptor = DomainDescriptor {
    domain: Domain::SkinLesion,
    labels: knowledge::SKIN_LESION_LABELS,
    input_range: InputRange::Unit,
    kind: DomainKind::MultiClass(MultiClassPolicy {
        knowledge: knowledge::SKIN_LESION_RECORDS,
        generic: &knowledge::GENERIC_RECORD,
        recommendations: &knowledge::SKIN_RECOMMENDATIONS,
    }),
    simulation: SimulationProfile {
        benign_index: 5,
        floor: 0.40,
        span: 0.30,
    },
};

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
