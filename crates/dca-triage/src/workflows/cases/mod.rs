//! Debt-case triage: priority scoring, agency matching, and the SLA and auto-assignment sweeps.

pub mod automation;
pub mod domain;
pub mod matching;
pub mod memory;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod sla;
pub mod sweep;

#[cfg(test)]
mod tests;

pub use automation::{AutomationError, AutomationRunner, AutomationSummary};
pub use domain::{
    Agency, AgencyId, AuditLogEntry, Case, CaseId, CaseStatus, Debtor, Payment, PaymentStatus,
    SlaStatus, SlaTrackingRecord, SlaTrackingStatus,
};
pub use matching::{
    rank_agencies, recommend_dca, recompute_workload, AgencyRecommendation,
    DanglingAgencyReference, MatchingCriteria,
};
pub use memory::InMemoryStores;
pub use repository::{
    AgencyRepository, AuditLog, CaseQuery, CaseRepository, CaseStores, PaymentLedger,
    RepositoryError, SlaTrackingRepository,
};
pub use router::case_router;
pub use scoring::{
    calculate_priority_score, estimate_recovery_probability, prioritize,
    try_calculate_priority_score, PriorityFactors, ScoringError, ScoringRequest,
};
pub use service::{CaseService, NewAgency, NewCase, PaymentRequest, ServiceError};
pub use sla::{SlaMonitor, SlaMonitorError, SlaPolicy, SlaSweepSummary};
pub use sweep::{SweepControl, SweepError, SweepInterruption, SweepLock};
