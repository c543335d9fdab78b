//! Compliance report generation: pure read-side aggregation.

use custos_types::{
    AuditEntry, AuditLogFilter, AuditStore, AuditStoreError, ComplianceReport, DateRange,
    ReportSummary,
};

fn is_security_event(entry: &AuditEntry) -> bool {
    entry.risk_level.is_alertable() || !entry.success
}

/// Aggregate all persisted entries in `range` into a FERPA/HIPAA-focused
/// report. Never mutates the underlying store.
pub async fn generate_report(
    store: &dyn AuditStore,
    range: DateRange,
) -> Result<ComplianceReport, AuditStoreError> {
    let in_range = store
        .list(&AuditLogFilter {
            range: Some(range),
            ..Default::default()
        })
        .await?;

    let ferpa_events: Vec<AuditEntry> = in_range
        .iter()
        .filter(|e| e.ferpa_record_accessed)
        .cloned()
        .collect();
    let hipaa_events: Vec<AuditEntry> = in_range
        .iter()
        .filter(|e| e.phi_accessed)
        .cloned()
        .collect();
    let security_events: Vec<AuditEntry> = in_range
        .iter()
        .filter(|e| is_security_event(e))
        .cloned()
        .collect();

    let summary = ReportSummary {
        total_events: in_range.len(),
        ferpa_events: ferpa_events.len(),
        hipaa_events: hipaa_events.len(),
        security_events: security_events.len(),
        failed_access: in_range.iter().filter(|e| !e.success).count(),
        admin_actions: in_range
            .iter()
            .filter(|e| e.action.starts_with("ADMIN_"))
            .count(),
        data_exports: in_range.iter().filter(|e| e.action == "DATA_EXPORT").count(),
    };

    Ok(ComplianceReport {
        range,
        ferpa_events,
        hipaa_events,
        security_events,
        summary,
    })
}
