//! Audit-log export serialization (JSON and CSV).

use custos_types::AuditEntry;

const CSV_HEADER: &str = "Timestamp,User,Action,Resource Type,Resource ID,Success,Risk Level,PHI Accessed,FERPA Record,Compliance Flags";

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Serialize entries as a JSON array.
pub fn entries_to_json(entries: &[AuditEntry]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(entries)
}

/// Serialize entries as CSV with the fixed reporting column order.
/// Compliance flags are semicolon-joined into a single column.
pub fn entries_to_csv(entries: &[AuditEntry]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for entry in entries {
        let flags = entry
            .compliance_flags
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let row = [
            entry.timestamp.to_rfc3339(),
            entry.actor.email.clone(),
            entry.action.clone(),
            entry.resource_type.clone(),
            entry.resource_id.clone().unwrap_or_default(),
            entry.success.to_string(),
            entry.risk_level.to_string(),
            entry.phi_accessed.to_string(),
            entry.ferpa_record_accessed.to_string(),
            flags,
        ];
        let row: Vec<String> = row.iter().map(|f| csv_escape(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}
