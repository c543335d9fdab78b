//! Risk and compliance taxonomy: (resource type, action) -> risk + flags.

use custos_types::{ComplianceFlag, DataAction, RiskLevel};

/// Resource types whose entries fall under FERPA educational-record rules.
const FERPA_RESOURCES: &[&str] = &[
    "behavior_logs",
    "children",
    "educational_record",
    "child_profile",
];

/// Resource types whose entries fall under HIPAA PHI rules.
const HIPAA_RESOURCES: &[&str] = &[
    "phi_data",
    "medical_notes",
    "therapy_notes",
    "health_information",
];

/// Resource types known to carry no regulated data. Anything outside this
/// set and the regulated sets classifies with the safe default and gets
/// flagged for human review.
const UNREGULATED_RESOURCES: &[&str] = &[
    "organizations",
    "users",
    "classrooms",
    "strategies",
    "coaching_sessions",
    "settings",
    "audit_logs",
];

/// Result of classifying one (resource type, action) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub risk_level: RiskLevel,
    pub flags: Vec<ComplianceFlag>,
    /// False when the resource type is outside every known set; the caller
    /// records the safe default in `details` for later review.
    pub recognized: bool,
}

/// Derive risk level and compliance flags. First matching rule wins:
///
/// 1. `phi_data` is always critical.
/// 2. deleting `behavior_logs` or `children` is critical.
/// 3. any `educational_record` access is high.
/// 4. any other delete is high.
/// 5. updates are medium.
/// 6. everything else is low.
pub fn classify(resource_type: &str, action: DataAction) -> Classification {
    let risk_level = if resource_type == "phi_data" {
        RiskLevel::Critical
    } else if matches!(resource_type, "behavior_logs" | "children")
        && action == DataAction::Delete
    {
        RiskLevel::Critical
    } else if resource_type == "educational_record" {
        RiskLevel::High
    } else if action == DataAction::Delete {
        RiskLevel::High
    } else if action == DataAction::Update {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    let mut flags = Vec::new();
    if FERPA_RESOURCES.contains(&resource_type) {
        flags.push(ComplianceFlag::FerpaEducationalRecord);
    }
    if HIPAA_RESOURCES.contains(&resource_type) {
        flags.push(ComplianceFlag::HipaaPhiData);
    }

    let recognized = FERPA_RESOURCES.contains(&resource_type)
        || HIPAA_RESOURCES.contains(&resource_type)
        || UNREGULATED_RESOURCES.contains(&resource_type);

    Classification {
        risk_level,
        flags,
        recognized,
    }
}
