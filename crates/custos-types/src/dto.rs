//! Audit entry, alert, filter, and report DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Coarse ordinal risk rating driving alerting and retention policy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// High and critical entries raise a `SecurityAlert`.
    pub fn is_alertable(self) -> bool {
        self >= RiskLevel::High
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regulatory tag on an entry. Additive: one entry may carry several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceFlag {
    FerpaEducationalRecord,
    HipaaPhiData,
    AdminPrivilege,
    PhiExport,
    HipaaAuditRequired,
    FerpaExport,
    EducationalRecordShared,
}

impl ComplianceFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            ComplianceFlag::FerpaEducationalRecord => "FERPA_EDUCATIONAL_RECORD",
            ComplianceFlag::HipaaPhiData => "HIPAA_PHI_DATA",
            ComplianceFlag::AdminPrivilege => "ADMIN_PRIVILEGE",
            ComplianceFlag::PhiExport => "PHI_EXPORT",
            ComplianceFlag::HipaaAuditRequired => "HIPAA_AUDIT_REQUIRED",
            ComplianceFlag::FerpaExport => "FERPA_EXPORT",
            ComplianceFlag::EducationalRecordShared => "EDUCATIONAL_RECORD_SHARED",
        }
    }
}

/// CRUD verb on a regulated resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataAction {
    Read,
    Create,
    Update,
    Delete,
}

impl DataAction {
    pub fn as_str(self) -> &'static str {
        match self {
            DataAction::Read => "read",
            DataAction::Create => "create",
            DataAction::Update => "update",
            DataAction::Delete => "delete",
        }
    }

    /// Namespaced audit verb for this action (e.g. `DATA_READ`).
    pub fn audit_action(self) -> &'static str {
        match self {
            DataAction::Read => "DATA_READ",
            DataAction::Create => "DATA_CREATE",
            DataAction::Update => "DATA_UPDATE",
            DataAction::Delete => "DATA_DELETE",
        }
    }
}

/// Authentication lifecycle event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthAction {
    Login,
    Logout,
    FailedLogin,
    PasswordChange,
    MfaChallenge,
}

impl AuthAction {
    /// Namespaced audit verb for this action (e.g. `AUTH_LOGIN`).
    pub fn audit_action(self) -> &'static str {
        match self {
            AuthAction::Login => "AUTH_LOGIN",
            AuthAction::Logout => "AUTH_LOGOUT",
            AuthAction::FailedLogin => "AUTH_FAILED_LOGIN",
            AuthAction::PasswordChange => "AUTH_PASSWORD_CHANGE",
            AuthAction::MfaChallenge => "AUTH_MFA_CHALLENGE",
        }
    }
}

/// Who performed the audited action. Anonymous actions are permitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

impl Actor {
    /// Fallback actor used when identity resolution fails or yields nothing.
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            email: "unknown".to_string(),
            role: "unknown".to_string(),
            organization_id: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Best-effort request context. Absence of any field never fails a write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// One immutable audit record. Corrections are new entries that reference
/// the original via `corrects`, never in-place edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    /// Namespaced verb, e.g. `DATA_READ`, `PHI_ACCESS_GRANTED`, `DATA_EXPORT`.
    pub action: String,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    #[serde(default)]
    pub context: RequestContext,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub compliance_flags: Vec<ComplianceFlag>,
    #[serde(default)]
    pub phi_accessed: bool,
    #[serde(default)]
    pub ferpa_record_accessed: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrects: Option<String>,
}

impl AuditEntry {
    pub fn has_flag(&self, flag: ComplianceFlag) -> bool {
        self.compliance_flags.contains(&flag)
    }
}

/// Open/closed state of a security alert. Closing is a status transition,
/// not a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Open,
    Closed,
}

/// Alert derived from a high/critical audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: String,
    /// Id of the originating audit entry.
    pub entry_id: String,
    pub severity: RiskLevel,
    pub description: String,
    #[serde(default)]
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

/// Inclusive time window for reports and filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.from && ts <= self.to
    }
}

/// Optional filters for listing audit entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLogFilter {
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub range: Option<DateRange>,
}

impl AuditLogFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(ref actor_id) = self.actor_id {
            if &entry.actor.user_id != actor_id {
                return false;
            }
        }
        if let Some(ref resource_type) = self.resource_type {
            if &entry.resource_type != resource_type {
                return false;
            }
        }
        if let Some(ref action) = self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(risk) = self.risk_level {
            if entry.risk_level != risk {
                return false;
            }
        }
        if let Some(range) = self.range {
            if !range.contains(entry.timestamp) {
                return false;
            }
        }
        true
    }
}

/// Counts section of a compliance report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_events: usize,
    pub ferpa_events: usize,
    pub hipaa_events: usize,
    pub security_events: usize,
    pub failed_access: usize,
    pub admin_actions: usize,
    pub data_exports: usize,
}

/// FERPA/HIPAA-focused aggregation over a time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub range: DateRange,
    pub ferpa_events: Vec<AuditEntry>,
    pub hipaa_events: Vec<AuditEntry>,
    pub security_events: Vec<AuditEntry>,
    pub summary: ReportSummary,
}

/// Outcome of one retry-queue drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStats {
    pub attempted: usize,
    pub delivered: usize,
    pub still_queued: usize,
}

/// Serialization format for audit-log export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unsupported export format: {}", other)),
        }
    }
}
