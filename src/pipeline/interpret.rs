use chrono::Utc;
use uuid::Uuid;

use super::types::{ClassProbability, DiagnosticResult, Finding, InferenceResult, Source};
use crate::domain::knowledge;
use crate::domain::{BinaryPolicy, Domain, DomainDescriptor, DomainKind, MultiClassPolicy};

const FALLBACK_WARNING: &str = "Produced by a general-purpose image classifier with a heuristic \
     class mapping. This is not a calibrated diagnostic prediction.";
const SIMULATED_WARNING: &str = "No diagnostic model was available. This result is a \
     deterministic simulation, not a diagnostic prediction.";

/// Turns normalized probabilities into a user-facing diagnostic result using
/// the domain's policy tables. Pure apart from the result id and timestamp.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultInterpreter;

impl ResultInterpreter {
    pub fn interpret(&self, result: &InferenceResult, domain: Domain) -> DiagnosticResult {
        let descriptor = domain.descriptor();
        let ranked = rank(result, descriptor);
        let mut diagnostic = match &descriptor.kind {
            DomainKind::Binary(policy) => binary(result, descriptor, policy, ranked),
            DomainKind::MultiClass(policy) => multi_class(result, descriptor, policy, ranked),
        };
        diagnostic.warning = warning_for(result);
        diagnostic
    }
}

fn rank(result: &InferenceResult, descriptor: &DomainDescriptor) -> Vec<ClassProbability> {
    let mut ranked: Vec<ClassProbability> = result
        .probabilities
        .iter()
        .enumerate()
        .map(|(i, &p)| ClassProbability {
            label: descriptor.label(i).to_string(),
            probability: p,
        })
        .collect();
    ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    ranked
}

fn binary(
    result: &InferenceResult,
    descriptor: &'static DomainDescriptor,
    policy: &'static BinaryPolicy,
    ranked: Vec<ClassProbability>,
) -> DiagnosticResult {
    let positive_probability = result
        .probabilities
        .get(policy.positive_index)
        .copied()
        .unwrap_or(0.0);
    let positive = policy.is_positive(positive_probability);
    let class_index = if positive {
        policy.positive_index
    } else {
        // Most probable among the non-positive classes.
        (0..descriptor.num_classes())
            .filter(|&i| i != policy.positive_index)
            .max_by(|&a, &b| prob(result, a).total_cmp(&prob(result, b)))
            .unwrap_or(0)
    };
    let severity = policy.severity(positive_probability);
    let pct = format!("{:.1}%", positive_probability * 100.0);

    let findings = policy
        .findings
        .iter()
        .map(|template| Finding {
            name: template.name.to_string(),
            detail: if positive {
                template.positive
            } else {
                template.negative
            }
            .replace("{pct}", &pct),
        })
        .collect();

    DiagnosticResult {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        domain: descriptor.domain,
        source: result.source,
        label: descriptor.label(class_index).to_string(),
        class_index,
        top_probability: result.top().1,
        confidence: prob(result, class_index),
        positive_probability: Some(positive_probability),
        severity,
        findings,
        recommendations: policy.recommendations.for_tier(severity),
        ranked,
        knowledge: None,
        warning: None,
    }
}

fn multi_class(
    result: &InferenceResult,
    descriptor: &'static DomainDescriptor,
    policy: &'static MultiClassPolicy,
    ranked: Vec<ClassProbability>,
) -> DiagnosticResult {
    let (class_index, confidence) = result.top();
    let label = descriptor.label(class_index);
    let record = knowledge::lookup(policy.knowledge, policy.generic, label);

    let findings = vec![
        Finding {
            name: "Classification".to_string(),
            detail: format!("{label} ({:.1}% confidence)", confidence * 100.0),
        },
        Finding {
            name: "Description".to_string(),
            detail: record.description.to_string(),
        },
    ];

    let mut recommendations = policy.recommendations.for_tier(record.risk);
    recommendations.extend(record.prevention.iter().map(|s| s.to_string()));

    DiagnosticResult {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        domain: descriptor.domain,
        source: result.source,
        label: label.to_string(),
        class_index,
        top_probability: confidence,
        confidence,
        positive_probability: None,
        severity: record.risk,
        findings,
        recommendations,
        ranked,
        knowledge: Some(record),
        warning: None,
    }
}

fn prob(result: &InferenceResult, index: usize) -> f32 {
    result.probabilities.get(index).copied().unwrap_or(0.0)
}

fn warning_for(result: &InferenceResult) -> Option<String> {
    let base = match result.source {
        Source::Primary => return None,
        Source::Fallback => FALLBACK_WARNING,
        Source::Simulated => SIMULATED_WARNING,
    };
    Some(match &result.note {
        Some(note) => format!("{base} ({note})"),
        None => base.to_string(),
    })
}
