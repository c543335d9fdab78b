//! Keyword-scoring heuristic for protected health information in free text.
//!
//! This is a first-pass filter feeding human review, not a compliance
//! guarantee: a negative result means "not flagged", never "contains no
//! PHI". The score threshold is a product constant carried from the
//! original system; do not tune it without product sign-off.

/// A category scores positive when more than this percentage of its
/// keywords appear in the text.
pub const PHI_SCORE_THRESHOLD: u8 = 20;

/// Keyword sets are disjoint across categories so a term contributes to
/// exactly one score.
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "mental_health",
        &[
            "anxiety",
            "depression",
            "trauma",
            "adhd",
            "psychiatric",
            "counseling",
            "behavioral disorder",
        ],
    ),
    (
        "medical",
        &[
            "diagnosis",
            "medication",
            "allergy",
            "seizure",
            "asthma",
            "diabetes",
            "prescription",
            "immunization",
        ],
    ),
    (
        "developmental_disability",
        &[
            "developmental delay",
            "autism",
            "down syndrome",
            "cerebral palsy",
            "speech delay",
            "sensory processing",
            "iep",
        ],
    ),
    (
        "therapy_notes",
        &[
            "therapy session",
            "occupational therapy",
            "speech therapy",
            "physical therapy",
            "play therapy",
            "intervention plan",
        ],
    ),
];

/// Outcome of scanning one piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiFinding {
    pub contains_phi: bool,
    /// Best-scoring category when flagged.
    pub phi_type: Option<String>,
    /// Best category score, 0-100.
    pub confidence: u8,
}

impl PhiFinding {
    fn negative() -> Self {
        Self {
            contains_phi: false,
            phi_type: None,
            confidence: 0,
        }
    }
}

/// Scores free text against per-category keyword sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhiDetector;

impl PhiDetector {
    pub fn new() -> Self {
        Self
    }

    /// Score `text` against every category and report the best match.
    pub fn detect(&self, text: &str) -> PhiFinding {
        let haystack = text.to_lowercase();
        if haystack.trim().is_empty() {
            return PhiFinding::negative();
        }

        let mut best: Option<(&str, u8)> = None;
        for (category, keywords) in CATEGORIES {
            let matches = keywords.iter().filter(|k| haystack.contains(*k)).count();
            let score = (matches * 100 / keywords.len()) as u8;
            match best {
                Some((_, best_score)) if best_score >= score => {}
                _ => best = Some((category, score)),
            }
        }

        match best {
            Some((category, score)) if score > PHI_SCORE_THRESHOLD => PhiFinding {
                contains_phi: true,
                phi_type: Some(category.to_string()),
                confidence: score.min(100),
            },
            Some((_, score)) => PhiFinding {
                contains_phi: false,
                phi_type: None,
                confidence: score.min(100),
            },
            None => PhiFinding::negative(),
        }
    }
}
