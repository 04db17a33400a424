use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{
    Agency, AgencyId, AuditLogEntry, Case, CaseId, CaseStatus, Payment, SlaTrackingRecord,
};

/// Filters accepted by [`CaseRepository::list`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseQuery {
    pub status: Option<CaseStatus>,
    pub agency_id: Option<AgencyId>,
    pub owner_id: Option<String>,
    pub limit: Option<usize>,
}

impl CaseQuery {
    pub fn matches(&self, case: &Case) -> bool {
        self.status.map_or(true, |status| case.status == status)
            && self
                .agency_id
                .as_ref()
                .map_or(true, |id| case.assigned_agency.as_ref() == Some(id))
            && self
                .owner_id
                .as_ref()
                .map_or(true, |owner| case.owner_id.as_ref() == Some(owner))
    }
}

/// Case storage. `update` is a compare-and-swap on [`Case::version`].
pub trait CaseRepository: Send + Sync {
    fn insert(&self, case: Case) -> Result<Case, RepositoryError>;
    /// Persists `case` if the stored version equals `case.version`, returning the stored copy
    /// with its version bumped.
    fn update(&self, case: Case) -> Result<Case, RepositoryError>;
    fn fetch(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError>;
    fn delete(&self, id: &CaseId) -> Result<(), RepositoryError>;
    /// Newest first.
    fn list(&self, query: &CaseQuery) -> Result<Vec<Case>, RepositoryError>;
    /// Every case whose status is not terminal.
    fn list_active(&self) -> Result<Vec<Case>, RepositoryError>;
    /// Active cases with no agency assigned.
    fn list_unassigned(&self) -> Result<Vec<Case>, RepositoryError>;
    /// Every case, terminal or not.
    fn list_all(&self) -> Result<Vec<Case>, RepositoryError>;
}

pub trait AgencyRepository: Send + Sync {
    fn insert(&self, agency: Agency) -> Result<Agency, RepositoryError>;
    fn fetch(&self, id: &AgencyId) -> Result<Option<Agency>, RepositoryError>;
    fn delete(&self, id: &AgencyId) -> Result<(), RepositoryError>;
    fn list_all(&self) -> Result<Vec<Agency>, RepositoryError>;
    fn set_active_cases(&self, id: &AgencyId, active_cases: u32) -> Result<(), RepositoryError>;
}

pub trait SlaTrackingRepository: Send + Sync {
    fn fetch_by_case(&self, case_id: &CaseId) -> Result<Option<SlaTrackingRecord>, RepositoryError>;
    fn upsert(&self, record: SlaTrackingRecord) -> Result<(), RepositoryError>;
}

/// Append-only payment ledger.
pub trait PaymentLedger: Send + Sync {
    fn append(&self, payment: Payment) -> Result<(), RepositoryError>;
    fn for_case(&self, case_id: &CaseId) -> Result<Vec<Payment>, RepositoryError>;
}

/// Append-only audit trail.
pub trait AuditLog: Send + Sync {
    fn append(&self, entry: AuditLogEntry) -> Result<(), RepositoryError>;
    /// Newest first.
    fn for_case(&self, case_id: &CaseId) -> Result<Vec<AuditLogEntry>, RepositoryError>;
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record was modified concurrently (expected version {expected}, found {actual})")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Shared handles to every store the case workflows touch.
#[derive(Clone)]
pub struct CaseStores {
    pub cases: Arc<dyn CaseRepository>,
    pub agencies: Arc<dyn AgencyRepository>,
    pub sla_tracking: Arc<dyn SlaTrackingRepository>,
    pub payments: Arc<dyn PaymentLedger>,
    pub audit_log: Arc<dyn AuditLog>,
}
