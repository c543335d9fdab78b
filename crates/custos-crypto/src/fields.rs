//! Per-entity allowlist of sensitive fields.

/// Sensitive text fields for an entity type. Only these are ever encrypted;
/// the rest of the record stays queryable and filterable as plaintext.
pub fn sensitive_fields(entity_type: &str) -> &'static [&'static str] {
    match entity_type {
        "behavior_logs" => &["description", "reflection_notes"],
        "children" | "child_profile" => &["developmental_notes", "family_context"],
        "educational_record" => &["developmental_notes"],
        "phi_data" | "medical_notes" | "health_information" => &["medical_notes"],
        "therapy_notes" => &["medical_notes", "reflection_notes"],
        _ => &[],
    }
}
