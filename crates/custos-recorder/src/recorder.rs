//! The audit event recorder: intent wrappers around an infallible core.

use custos_classify::{classify, PhiDetector};
use custos_crypto::FieldCodec;
use custos_types::{
    Actor, AlertStore, AuditEntry, AuditLogFilter, AuditStore, AuditStoreError, AuthAction,
    ComplianceFlag, ComplianceReport, DataAction, DateRange, ExportFormat, IdentityProvider,
    RemoteSink, RequestContext, RiskLevel, SecurityAlert,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::retry::RetryQueue;

/// Free-form, action-specific metadata attached to an entry.
pub type Details = HashMap<String, serde_json::Value>;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Caller-contract violation (e.g. non-admin clearing logs). Unlike
    /// infrastructure failures, this is surfaced.
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Store(#[from] AuditStoreError),
    #[error("export failed: {0}")]
    Export(String),
}

/// Caller-supplied intent, before classification and enrichment.
struct AuditIntent {
    action: String,
    resource_type: String,
    resource_id: Option<String>,
    resource_name: Option<String>,
    before: Option<serde_json::Value>,
    after: Option<serde_json::Value>,
    context: RequestContext,
    success: bool,
    error_message: Option<String>,
    /// Regulatory floor set by the wrapper (PHI/FERPA/admin/export paths).
    /// `None` means the taxonomy decides.
    risk_floor: Option<RiskLevel>,
    flags: Vec<ComplianceFlag>,
    phi_accessed: bool,
    ferpa_record_accessed: bool,
    details: Details,
    /// CRUD verb for taxonomy classification, when applicable.
    data_action: Option<DataAction>,
    corrects: Option<String>,
}

impl AuditIntent {
    fn new(action: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: None,
            resource_name: None,
            before: None,
            after: None,
            context: RequestContext::default(),
            success: true,
            error_message: None,
            risk_floor: None,
            flags: Vec::new(),
            phi_accessed: false,
            ferpa_record_accessed: false,
            details: Details::new(),
            data_action: None,
            corrects: None,
        }
    }
}

/// Records every access to regulated data. Collaborators are injected, not
/// ambient: each leg can be swapped for a fake in tests, and two recorders
/// never share hidden state.
pub struct AuditRecorder {
    identity: Arc<dyn IdentityProvider>,
    local: Arc<dyn AuditStore>,
    sink: Arc<dyn RemoteSink>,
    retry: Arc<RetryQueue>,
    alerts: Arc<dyn AlertStore>,
    detector: PhiDetector,
    codec: Option<FieldCodec>,
}

impl AuditRecorder {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        local: Arc<dyn AuditStore>,
        sink: Arc<dyn RemoteSink>,
        retry: Arc<RetryQueue>,
        alerts: Arc<dyn AlertStore>,
    ) -> Self {
        Self {
            identity,
            local,
            sink,
            retry,
            alerts,
            detector: PhiDetector::new(),
            codec: None,
        }
    }

    /// Enable field-level encryption of snapshot payloads.
    pub fn with_codec(mut self, codec: FieldCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn retry_queue(&self) -> Arc<RetryQueue> {
        Arc::clone(&self.retry)
    }

    /// Log a CRUD access to a regulated resource. Risk and flags come from
    /// the taxonomy.
    pub async fn log_data_access(
        &self,
        action: DataAction,
        resource_type: &str,
        resource_id: Option<&str>,
        resource_name: Option<&str>,
        details: Option<Details>,
        ctx: RequestContext,
    ) -> String {
        let mut intent = AuditIntent::new(action.audit_action(), resource_type);
        intent.resource_id = resource_id.map(str::to_string);
        intent.resource_name = resource_name.map(str::to_string);
        intent.details = details.unwrap_or_default();
        intent.data_action = Some(action);
        intent.context = ctx;
        self.record(intent).await
    }

    /// Log a CRUD update with before/after snapshots. Sensitive snapshot
    /// fields are encrypted when a codec is configured.
    pub async fn log_data_change(
        &self,
        action: DataAction,
        resource_type: &str,
        resource_id: &str,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
        ctx: RequestContext,
    ) -> String {
        let mut intent = AuditIntent::new(action.audit_action(), resource_type);
        intent.resource_id = Some(resource_id.to_string());
        intent.before = before;
        intent.after = after;
        intent.data_action = Some(action);
        intent.context = ctx;
        self.record(intent).await
    }

    /// Log access to protected health information. Always critical,
    /// granted or denied: a denied access is still recorded, never dropped.
    pub async fn log_phi_access(
        &self,
        resource_type: &str,
        resource_id: &str,
        phi_type: &str,
        access_granted: bool,
        justification: Option<&str>,
        ctx: RequestContext,
    ) -> String {
        let action = if access_granted {
            "PHI_ACCESS_GRANTED"
        } else {
            "PHI_ACCESS_DENIED"
        };
        let mut intent = AuditIntent::new(action, resource_type);
        intent.resource_id = Some(resource_id.to_string());
        intent.success = access_granted;
        intent.risk_floor = Some(RiskLevel::Critical);
        intent.flags = vec![ComplianceFlag::HipaaPhiData];
        intent.phi_accessed = true;
        intent
            .details
            .insert("phi_type".to_string(), serde_json::json!(phi_type));
        if let Some(justification) = justification {
            intent
                .details
                .insert("justification".to_string(), serde_json::json!(justification));
        }
        intent.context = ctx;
        self.record(intent).await
    }

    /// Log access to a student educational record. Always high risk and
    /// FERPA-flagged.
    pub async fn log_ferpa_access(
        &self,
        child_id: &str,
        child_name: &str,
        action: DataAction,
        parent_requested: bool,
        ctx: RequestContext,
    ) -> String {
        let mut intent = AuditIntent::new("FERPA_EDUCATIONAL_RECORD_ACCESS", "educational_record");
        intent.resource_id = Some(child_id.to_string());
        intent.resource_name = Some(child_name.to_string());
        intent.risk_floor = Some(RiskLevel::High);
        intent.flags = vec![ComplianceFlag::FerpaEducationalRecord];
        intent.ferpa_record_accessed = true;
        intent
            .details
            .insert("record_action".to_string(), serde_json::json!(action.as_str()));
        intent.details.insert(
            "parent_requested".to_string(),
            serde_json::json!(parent_requested),
        );
        intent.context = ctx;
        self.record(intent).await
    }

    /// Log an authentication lifecycle event.
    pub async fn log_auth_event(
        &self,
        action: AuthAction,
        success: bool,
        details: Option<Details>,
        ctx: RequestContext,
    ) -> String {
        let mut intent = AuditIntent::new(action.audit_action(), "auth");
        intent.success = success;
        intent.details = details.unwrap_or_default();
        intent.context = ctx;
        self.record(intent).await
    }

    /// Log a privileged administrative action. Always high risk.
    pub async fn log_admin_action(
        &self,
        action: &str,
        resource_type: &str,
        resource_id: Option<&str>,
        details: Option<Details>,
        ctx: RequestContext,
    ) -> String {
        let action = if action.starts_with("ADMIN_") {
            action.to_string()
        } else {
            format!("ADMIN_{}", action)
        };
        let mut intent = AuditIntent::new(action, resource_type);
        intent.resource_id = resource_id.map(str::to_string);
        intent.risk_floor = Some(RiskLevel::High);
        intent.flags = vec![ComplianceFlag::AdminPrivilege];
        intent.details = details.unwrap_or_default();
        intent.context = ctx;
        self.record(intent).await
    }

    /// Log a bulk data export. Critical when PHI is included, high when
    /// FERPA records are included, medium otherwise.
    pub async fn log_data_export(
        &self,
        export_type: &str,
        record_count: usize,
        includes_phi: bool,
        includes_ferpa: bool,
        format: &str,
        ctx: RequestContext,
    ) -> String {
        let mut intent = AuditIntent::new("DATA_EXPORT", export_type);
        intent.risk_floor = Some(if includes_phi {
            RiskLevel::Critical
        } else if includes_ferpa {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        });
        if includes_phi {
            intent.flags.push(ComplianceFlag::PhiExport);
            intent.flags.push(ComplianceFlag::HipaaAuditRequired);
        }
        if includes_ferpa {
            intent.flags.push(ComplianceFlag::FerpaExport);
            intent.flags.push(ComplianceFlag::EducationalRecordShared);
        }
        intent.phi_accessed = includes_phi;
        intent.ferpa_record_accessed = includes_ferpa;
        intent
            .details
            .insert("record_count".to_string(), serde_json::json!(record_count));
        intent
            .details
            .insert("format".to_string(), serde_json::json!(format));
        intent.context = ctx;
        self.record(intent).await
    }

    /// Record a correction to an earlier entry. The log is append-only:
    /// the original is never edited, the new entry points back at it via
    /// `corrects`.
    pub async fn log_correction(
        &self,
        original_entry_id: &str,
        resource_type: &str,
        reason: &str,
        details: Option<Details>,
        ctx: RequestContext,
    ) -> String {
        let mut intent = AuditIntent::new("AUDIT_CORRECTION", resource_type);
        intent.corrects = Some(original_entry_id.to_string());
        intent.details = details.unwrap_or_default();
        intent
            .details
            .insert("reason".to_string(), serde_json::json!(reason));
        intent.context = ctx;
        self.record(intent).await
    }

    /// The core: classify, enrich, persist, alert. Returns the new entry's
    /// id and never fails — a broken audit pipeline must not break the
    /// feature it audits. Local persistence is awaited; the remote leg is
    /// fire-and-forget with retry on failure.
    async fn record(&self, intent: AuditIntent) -> String {
        let actor = self
            .identity
            .current_actor()
            .await
            .unwrap_or_else(Actor::anonymous);
        let entry = self.build_entry(actor, intent);
        let entry_id = entry.id.clone();

        if let Err(e) = self.local.append(entry.clone()).await {
            // Fallback diagnostic channel; the entry is lost locally but the
            // remote leg below still runs.
            tracing::error!(entry_id = %entry_id, error = %e, "local audit buffer write failed");
        }

        if entry.risk_level.is_alertable() {
            let alert = SecurityAlert {
                id: Uuid::new_v4().to_string(),
                entry_id: entry_id.clone(),
                severity: entry.risk_level,
                description: format!(
                    "{} risk: {} on {}",
                    entry.risk_level, entry.action, entry.resource_type
                ),
                status: Default::default(),
                created_at: entry.timestamp,
            };
            if let Err(e) = self.alerts.append(alert).await {
                tracing::warn!(entry_id = %entry_id, error = %e, "failed to persist security alert");
            }
        }

        let sink = Arc::clone(&self.sink);
        let retry = Arc::clone(&self.retry);
        tokio::spawn(async move {
            if let Err(e) = sink.send(&entry).await {
                tracing::warn!(entry_id = %entry.id, error = %e, "remote audit write failed, queueing for retry");
                retry.enqueue(entry).await;
            }
        });

        entry_id
    }

    fn build_entry(&self, actor: Actor, intent: AuditIntent) -> AuditEntry {
        let mut risk_level = intent.risk_floor.unwrap_or(RiskLevel::Low);
        let mut flags = intent.flags;
        let mut details = intent.details;
        let mut phi_accessed = intent.phi_accessed;

        // Taxonomy runs only when the wrapper did not pin a regulatory floor.
        if intent.risk_floor.is_none() {
            if let Some(action) = intent.data_action {
                let classification = classify(&intent.resource_type, action);
                risk_level = classification.risk_level;
                for flag in classification.flags {
                    if !flags.contains(&flag) {
                        flags.push(flag);
                    }
                }
                if !classification.recognized {
                    // Safe default applied; mark for human review rather than
                    // failing the write.
                    details.insert(
                        "classification_defaulted".to_string(),
                        serde_json::json!(true),
                    );
                }
            }
        }

        let scan = collect_scan_text(&intent.resource_name, &details, &intent.before, &intent.after);
        let finding = self.detector.detect(&scan);
        if finding.contains_phi {
            phi_accessed = true;
            if !flags.contains(&ComplianceFlag::HipaaPhiData) {
                flags.push(ComplianceFlag::HipaaPhiData);
            }
            details.insert(
                "phi_detection".to_string(),
                serde_json::json!({
                    "phi_type": finding.phi_type,
                    "confidence": finding.confidence,
                }),
            );
        }
        if phi_accessed && risk_level < RiskLevel::High {
            risk_level = RiskLevel::High;
        }

        let ferpa_record_accessed = intent.ferpa_record_accessed
            || flags.contains(&ComplianceFlag::FerpaEducationalRecord);

        let (mut before, mut after) = (intent.before, intent.after);
        if let Some(ref codec) = self.codec {
            if let Some(ref mut snapshot) = before {
                codec.encrypt_fields(&intent.resource_type, snapshot);
            }
            if let Some(ref mut snapshot) = after {
                codec.encrypt_fields(&intent.resource_type, snapshot);
            }
        }

        AuditEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            actor,
            action: intent.action,
            resource_type: intent.resource_type,
            resource_id: intent.resource_id,
            resource_name: intent.resource_name,
            before,
            after,
            context: intent.context,
            success: intent.success,
            error_message: intent.error_message,
            risk_level,
            compliance_flags: flags,
            phi_accessed,
            ferpa_record_accessed,
            details,
            corrects: intent.corrects,
        }
    }

    /// List persisted entries, newest first.
    pub async fn get_audit_logs(
        &self,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AuditEntry>, RecorderError> {
        Ok(self.local.list(filter).await?)
    }

    /// Aggregate entries in `range` into a compliance report.
    pub async fn generate_compliance_report(
        &self,
        range: DateRange,
    ) -> Result<ComplianceReport, RecorderError> {
        Ok(crate::report::generate_report(self.local.as_ref(), range).await?)
    }

    /// Serialize the (optionally filtered) entry set. Export is a
    /// user-initiated synchronous action, so failures surface.
    pub async fn export_audit_logs(
        &self,
        format: ExportFormat,
        filter: &AuditLogFilter,
    ) -> Result<String, RecorderError> {
        let entries = self.local.list(filter).await?;
        match format {
            ExportFormat::Json => crate::export::entries_to_json(&entries)
                .map_err(|e| RecorderError::Export(e.to_string())),
            ExportFormat::Csv => Ok(crate::export::entries_to_csv(&entries)),
        }
    }

    /// Archive the local audit buffer. Admin only; the clear itself is
    /// audited before it executes.
    pub async fn clear_audit_logs(
        &self,
        reason: &str,
        ctx: RequestContext,
    ) -> Result<usize, RecorderError> {
        let actor = self
            .identity
            .current_actor()
            .await
            .unwrap_or_else(Actor::anonymous);
        if !actor.is_admin() {
            return Err(RecorderError::Forbidden(format!(
                "role '{}' may not clear audit logs",
                actor.role
            )));
        }

        let mut details = Details::new();
        details.insert("reason".to_string(), serde_json::json!(reason));
        self.log_admin_action("CLEAR_AUDIT_LOGS", "audit_logs", None, Some(details), ctx)
            .await;

        let archived = self.local.clear().await?;
        tracing::info!(archived, reason, "audit log buffer archived by admin");
        Ok(archived)
    }
}

fn push_json_strings(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => {
            out.push(' ');
            out.push_str(s);
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                push_json_strings(v, out);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                push_json_strings(v, out);
            }
        }
        _ => {}
    }
}

/// Free text the PHI detector scans: resource name, string details, and
/// snapshot string fields (scanned before encryption).
fn collect_scan_text(
    resource_name: &Option<String>,
    details: &Details,
    before: &Option<serde_json::Value>,
    after: &Option<serde_json::Value>,
) -> String {
    let mut out = String::new();
    if let Some(name) = resource_name {
        out.push_str(name);
    }
    for value in details.values() {
        push_json_strings(value, &mut out);
    }
    if let Some(snapshot) = before {
        push_json_strings(snapshot, &mut out);
    }
    if let Some(snapshot) = after {
        push_json_strings(snapshot, &mut out);
    }
    out
}
