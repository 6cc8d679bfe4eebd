//! Static recommendation, finding and knowledge tables.
//!
//! Pneumonia strings match the clinical wording the chest X-ray service has
//! always returned. Skin-lesion classes follow the HAM10000 taxonomy in model
//! output order.

use serde::Serialize;

use super::{FindingTemplate, RecommendationTable, SeverityTier};

// ── Pneumonia ──────────────────────────────────────────────

pub static PNEUMONIA_RECOMMENDATIONS: RecommendationTable = RecommendationTable {
    base: &[
        "Consult with a healthcare provider",
        "Monitor breathing and oxygen levels",
        "Rest and maintain good hydration",
    ],
    severe: &[
        "⚠️ SEEK IMMEDIATE EMERGENCY CARE",
        "High risk - immediate medical attention required",
        "Prepare for possible hospitalization",
        "Monitor oxygen saturation closely",
    ],
    moderate: &[
        "Seek urgent medical attention",
        "Begin prescribed treatments promptly",
        "Schedule follow-up chest X-rays",
    ],
    mild_lead: &["Schedule medical evaluation"],
    mild_tail: &[
        "Follow up with chest X-rays as advised",
        "Complete prescribed medications if given",
    ],
    negative: &[
        "Continue normal health monitoring",
        "Maintain good respiratory hygiene",
        "Stay current with vaccinations",
        "Follow up if new symptoms develop",
    ],
};

pub const PNEUMONIA_FINDINGS: &[FindingTemplate] = &[
    FindingTemplate {
        name: "Lung opacity",
        positive: "Increased opacity detected in lung fields ({pct} confidence)",
        negative: "Normal opacity detected in lung fields ({pct} confidence)",
    },
    FindingTemplate {
        name: "Infiltrates",
        positive: "Likely presence of infiltrates",
        negative: "No significant infiltrates detected",
    },
    FindingTemplate {
        name: "Consolidation",
        positive: "Potential areas of consolidation observed",
        negative: "No consolidation observed",
    },
];

// ── Brain stroke ───────────────────────────────────────────

pub static STROKE_RECOMMENDATIONS: RecommendationTable = RecommendationTable {
    base: &[
        "Consult a neurologist",
        "Monitor blood pressure regularly",
        "Note the time symptoms first appeared",
    ],
    severe: &[
        "⚠️ CALL EMERGENCY SERVICES IMMEDIATELY",
        "Stroke treatment is time-critical - do not wait for symptoms to pass",
        "Do not eat, drink or take medication until assessed",
        "Check face, arm and speech (FAST) while waiting for help",
    ],
    moderate: &[
        "Go to an emergency department today",
        "Arrange urgent neurological imaging review",
        "Avoid driving or operating machinery",
    ],
    mild_lead: &["Schedule a prompt neurological evaluation"],
    mild_tail: &[
        "Review stroke risk factors with your doctor",
        "Seek emergency care at once if new weakness, numbness or speech problems appear",
    ],
    negative: &[
        "Continue routine health monitoring",
        "Keep blood pressure and cholesterol under control",
        "Stay physically active and avoid smoking",
        "Learn the FAST warning signs of stroke",
    ],
};

pub const STROKE_FINDINGS: &[FindingTemplate] = &[
    FindingTemplate {
        name: "Lesion",
        positive: "Region consistent with a stroke lesion detected ({pct} confidence)",
        negative: "No stroke lesion pattern detected ({pct} confidence)",
    },
    FindingTemplate {
        name: "Tissue density",
        positive: "Abnormal tissue density in affected territory",
        negative: "Tissue density within expected range",
    },
    FindingTemplate {
        name: "Midline",
        positive: "Assess for mass effect or midline shift",
        negative: "No signs of mass effect observed",
    },
];

// ── Skin lesion ────────────────────────────────────────────

pub static SKIN_RECOMMENDATIONS: RecommendationTable = RecommendationTable {
    base: &["Consult a dermatologist for a definitive diagnosis"],
    severe: &[
        "⚠️ SEEK PROMPT DERMATOLOGICAL EVALUATION",
        "A biopsy is usually needed to confirm this finding",
        "Do not wait for the lesion to change further",
    ],
    moderate: &[
        "Schedule a dermatology appointment within the next few weeks",
        "Avoid scratching or irritating the lesion",
    ],
    mild_lead: &["Have the lesion checked at your next medical visit"],
    mild_tail: &["Seek care sooner if the lesion bleeds or grows quickly"],
    negative: &[
        "Likely benign: continue routine skin self-examination",
        "Photograph the lesion to track changes over time",
        "See a dermatologist if it changes in size, shape or color",
    ],
};

pub const SKIN_LESION_LABELS: &[&str] = &[
    "Actinic Keratoses",
    "Basal Cell Carcinoma",
    "Benign Keratosis",
    "Dermatofibroma",
    "Melanoma",
    "Melanocytic Nevi",
    "Vascular Lesions",
];

/// Static description of one lesion type.
#[derive(Debug, Serialize)]
pub struct KnowledgeRecord {
    pub name: &'static str,
    /// HAM10000 short code, empty for the generic record.
    pub code: &'static str,
    pub description: &'static str,
    pub risk: Option<SeverityTier>,
    pub risk_factors: &'static [&'static str],
    pub treatments: &'static [&'static str],
    pub prevention: &'static [&'static str],
}

const SUN_PROTECTION: &[&str] = &[
    "Use broad-spectrum sunscreen (SPF 30+) daily",
    "Avoid tanning beds",
    "Wear protective clothing and hats outdoors",
    "Examine your skin monthly for new or changing spots",
];

pub const SKIN_LESION_RECORDS: &[KnowledgeRecord] = &[
    KnowledgeRecord {
        name: "Actinic Keratoses",
        code: "akiec",
        description: "Rough, scaly patches caused by years of sun exposure. \
            Considered precancerous: a small share progress to squamous cell carcinoma.",
        risk: Some(SeverityTier::Moderate),
        risk_factors: &[
            "Chronic sun exposure",
            "Fair skin",
            "Age over 40",
            "Weakened immune system",
        ],
        treatments: &[
            "Cryotherapy",
            "Topical medications (fluorouracil, imiquimod)",
            "Photodynamic therapy",
            "Curettage",
        ],
        prevention: SUN_PROTECTION,
    },
    KnowledgeRecord {
        name: "Basal Cell Carcinoma",
        code: "bcc",
        description: "The most common skin cancer. Grows slowly and rarely spreads, \
            but can damage surrounding tissue if left untreated.",
        risk: Some(SeverityTier::Moderate),
        risk_factors: &[
            "Cumulative UV exposure",
            "Fair skin and light eyes",
            "Previous skin cancer",
            "Radiation therapy history",
        ],
        treatments: &[
            "Surgical excision",
            "Mohs micrographic surgery",
            "Topical therapy for superficial lesions",
            "Radiation therapy",
        ],
        prevention: SUN_PROTECTION,
    },
    KnowledgeRecord {
        name: "Benign Keratosis",
        code: "bkl",
        description: "Non-cancerous growths such as seborrheic keratoses and solar lentigines. \
            Often waxy or stuck-on in appearance.",
        risk: None,
        risk_factors: &["Age", "Family history", "Sun exposure"],
        treatments: &[
            "Usually no treatment needed",
            "Cryotherapy or curettage for cosmetic reasons",
        ],
        prevention: &[
            "Regular skin checks",
            "Have any rapidly changing lesion examined",
        ],
    },
    KnowledgeRecord {
        name: "Dermatofibroma",
        code: "df",
        description: "Common benign fibrous nodule, often on the legs, that dimples \
            when pinched.",
        risk: None,
        risk_factors: &["Minor skin injury or insect bites", "More common in women"],
        treatments: &[
            "Usually no treatment needed",
            "Surgical removal if symptomatic",
        ],
        prevention: &["Protect skin from minor injuries", "Monitor for changes"],
    },
    KnowledgeRecord {
        name: "Melanoma",
        code: "mel",
        description: "A serious skin cancer arising from pigment cells. Can spread to \
            other organs; early detection greatly improves outcomes.",
        risk: Some(SeverityTier::Severe),
        risk_factors: &[
            "History of sunburns",
            "Many or atypical moles",
            "Family history of melanoma",
            "Fair skin",
            "Weakened immune system",
        ],
        treatments: &[
            "Wide local excision",
            "Sentinel lymph node biopsy",
            "Immunotherapy",
            "Targeted therapy",
            "Radiation therapy",
        ],
        prevention: &[
            "Use broad-spectrum sunscreen (SPF 30+) daily",
            "Avoid tanning beds",
            "Check moles using the ABCDE rule",
            "Annual dermatologist skin exams",
        ],
    },
    KnowledgeRecord {
        name: "Melanocytic Nevi",
        code: "nv",
        description: "Common moles: benign clusters of pigment cells. Most never change, \
            but new or evolving moles deserve attention.",
        risk: None,
        risk_factors: &["Sun exposure in childhood", "Genetics", "Fair skin"],
        treatments: &[
            "No treatment needed for typical moles",
            "Excision if atypical or changing",
        ],
        prevention: &[
            "Monitor moles using the ABCDE rule",
            "Photograph moles to track changes",
            "Use sun protection",
        ],
    },
    KnowledgeRecord {
        name: "Vascular Lesions",
        code: "vasc",
        description: "Lesions formed by blood vessels, such as cherry angiomas and \
            angiokeratomas. Usually benign.",
        risk: Some(SeverityTier::Mild),
        risk_factors: &["Age", "Genetics", "Pregnancy and hormonal changes"],
        treatments: &[
            "Usually no treatment needed",
            "Laser therapy",
            "Electrocautery",
        ],
        prevention: &[
            "Have bleeding or rapidly growing lesions examined",
            "Protect skin from trauma",
        ],
    },
];

pub static GENERIC_RECORD: KnowledgeRecord = KnowledgeRecord {
    name: "Unclassified lesion",
    code: "",
    description: "This lesion could not be matched to a known category. \
        Please consult a dermatologist or healthcare professional for an evaluation.",
    risk: None,
    risk_factors: &[],
    treatments: &["Consult a healthcare professional"],
    prevention: &[
        "Examine your skin monthly for new or changing spots",
        "Use sun protection",
    ],
};

/// Find the record for a class label: exact (case-insensitive) match first,
/// then substring in either direction, else `generic`.
pub fn lookup<'a>(
    records: &'a [KnowledgeRecord],
    generic: &'a KnowledgeRecord,
    label: &str,
) -> &'a KnowledgeRecord {
    let needle = label.trim().to_lowercase();
    if needle.is_empty() {
        return generic;
    }

    if let Some(exact) = records
        .iter()
        .find(|r| r.name.to_lowercase() == needle || r.code == needle)
    {
        return exact;
    }

    records
        .iter()
        .find(|r| {
            let name = r.name.to_lowercase();
            name.contains(&needle) || needle.contains(&name)
        })
        .unwrap_or(generic)
}
