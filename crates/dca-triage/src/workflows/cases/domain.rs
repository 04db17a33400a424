use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

static RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier such as `case-000042` or `audit-000043`.
pub fn next_record_id(prefix: &str) -> String {
    let id = RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

/// Identifier wrapper for debt cases.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub String);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for debt-collection agencies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgencyId(pub String);

impl fmt::Display for AgencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Debtor details owned by a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debtor {
    pub name: String,
    pub account_id: Option<String>,
}

/// Lifecycle state of a case as shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseStatus {
    #[serde(rename = "New")]
    New,
    #[serde(rename = "Assigned")]
    Assigned,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Contact Made")]
    ContactMade,
    #[serde(rename = "Payment Negotiated")]
    PaymentNegotiated,
    #[serde(rename = "In Dispute")]
    InDispute,
    #[serde(rename = "Resolved")]
    Resolved,
    #[serde(rename = "Paid")]
    Paid,
    #[serde(rename = "Closed")]
    Closed,
    #[serde(rename = "Closed - Unresolved")]
    ClosedUnresolved,
}

impl CaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CaseStatus::New => "New",
            CaseStatus::Assigned => "Assigned",
            CaseStatus::InProgress => "In Progress",
            CaseStatus::ContactMade => "Contact Made",
            CaseStatus::PaymentNegotiated => "Payment Negotiated",
            CaseStatus::InDispute => "In Dispute",
            CaseStatus::Resolved => "Resolved",
            CaseStatus::Paid => "Paid",
            CaseStatus::Closed => "Closed",
            CaseStatus::ClosedUnresolved => "Closed - Unresolved",
        }
    }

    /// Terminal cases are excluded from sweeps and from agency workload.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            CaseStatus::Paid | CaseStatus::Closed | CaseStatus::Resolved | CaseStatus::ClosedUnresolved
        )
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        let status = match normalized.as_str() {
            "new" => CaseStatus::New,
            "assigned" => CaseStatus::Assigned,
            "in progress" | "in_progress" => CaseStatus::InProgress,
            "contact made" | "contact_made" => CaseStatus::ContactMade,
            "payment negotiated" | "payment_negotiated" => CaseStatus::PaymentNegotiated,
            "in dispute" | "in_dispute" => CaseStatus::InDispute,
            "resolved" => CaseStatus::Resolved,
            "paid" => CaseStatus::Paid,
            "closed" => CaseStatus::Closed,
            "closed - unresolved" | "closed_unresolved" => CaseStatus::ClosedUnresolved,
            _ => return None,
        };
        Some(status)
    }
}

/// Cached SLA state, recomputed by the monitor sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SlaStatus {
    #[default]
    #[serde(rename = "On Track")]
    OnTrack,
    #[serde(rename = "At Risk")]
    AtRisk,
    #[serde(rename = "Breached")]
    Breached,
}

impl SlaStatus {
    pub const fn label(self) -> &'static str {
        match self {
            SlaStatus::OnTrack => "On Track",
            SlaStatus::AtRisk => "At Risk",
            SlaStatus::Breached => "Breached",
        }
    }
}

/// A single debt tracked through its recovery lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub debtor: Debtor,
    pub amount: f64,
    pub currency: String,
    /// Days since the debt became due.
    pub aging: u32,
    pub priority_score: Option<u8>,
    pub recovery_probability: Option<f64>,
    pub status: CaseStatus,
    pub sla_status: SlaStatus,
    pub sla_urgency: f64,
    pub assigned_agency: Option<AgencyId>,
    pub owner_id: Option<String>,
    pub payment_behavior: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency token, bumped by the store on every update.
    #[serde(default)]
    pub version: u64,
}

impl Case {
    pub fn new(
        id: CaseId,
        debtor: Debtor,
        amount: f64,
        aging: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            debtor,
            amount,
            currency: "USD".to_string(),
            aging,
            priority_score: None,
            recovery_probability: None,
            status: CaseStatus::New,
            sla_status: SlaStatus::OnTrack,
            sla_urgency: 0.0,
            assigned_agency: None,
            owner_id: None,
            payment_behavior: None,
            created_at,
            updated_at: created_at,
            version: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_unassigned(&self) -> bool {
        self.assigned_agency.is_none()
    }
}

/// Third-party collection agency a case can be assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub id: AgencyId,
    pub name: String,
    pub email: Option<String>,
    /// Historical recovery rate, 0 to 100.
    pub performance_score: Option<f64>,
    /// Non-terminal cases currently assigned. Derived from the case store.
    pub active_cases: Option<u32>,
    pub manager: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    Completed,
}

/// Append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub case_id: CaseId,
    pub amount: f64,
    pub paid_at: DateTime<Utc>,
    pub status: PaymentStatus,
    pub notes: Option<String>,
}

/// Actor recorded on audit entries written by the sweeps.
pub const SYSTEM_ACTOR: &str = "system";

/// Append-only record of a state-changing operation on a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub case_id: CaseId,
    pub actor: String,
    pub action: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        case_id: CaseId,
        actor: impl Into<String>,
        action: impl Into<String>,
        detail: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: next_record_id("audit"),
            case_id,
            actor: actor.into(),
            action: action.into(),
            detail: detail.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SlaTrackingStatus {
    #[default]
    Active,
    Breached,
}

/// One-per-case SLA record upserted by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaTrackingRecord {
    pub id: String,
    pub case_id: CaseId,
    pub deadline: Option<DateTime<Utc>>,
    pub status: SlaTrackingStatus,
    pub breach_flag: bool,
    pub created_at: DateTime<Utc>,
}

impl SlaTrackingRecord {
    pub fn id_for(case_id: &CaseId) -> String {
        format!("sla_{}", case_id.0)
    }
}
