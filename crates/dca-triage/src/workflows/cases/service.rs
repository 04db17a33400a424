use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::automation::{AutomationError, AutomationRunner, AutomationSummary};
use super::domain::{
    next_record_id, Agency, AgencyId, AuditLogEntry, Case, CaseId, CaseStatus, Debtor, Payment,
    PaymentStatus,
};
use super::matching::{
    rank_agencies, recompute_workload, AgencyRecommendation, DanglingAgencyReference,
    MatchingCriteria,
};
use super::repository::{CaseQuery, CaseStores, RepositoryError};
use super::scoring::{prioritize, PrioritizedCase, ScoringError, ScoringRequest};
use super::sla::{SlaMonitor, SlaMonitorError, SlaPolicy, SlaSweepSummary};
use super::sweep::{SweepControl, SweepLock};

/// Page size used when a listing does not ask for one.
pub const DEFAULT_LIST_LIMIT: usize = 50;
/// Share of the outstanding amount a single payment must cover to settle the case.
pub const SETTLEMENT_RATIO: f64 = 0.9;

/// Fields accepted when opening a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCase {
    #[serde(default)]
    pub id: Option<CaseId>,
    pub debtor_name: String,
    #[serde(default)]
    pub debtor_account_id: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub aging: u32,
    #[serde(default)]
    pub recovery_probability: Option<f64>,
    #[serde(default)]
    pub priority_score: Option<u8>,
    #[serde(default)]
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub assigned_agency: Option<AgencyId>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub payment_behavior: Option<String>,
}

/// Fields accepted when registering an agency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAgency {
    #[serde(default)]
    pub id: Option<AgencyId>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub performance_score: Option<f64>,
    #[serde(default)]
    pub manager: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub case_id: CaseId,
    pub amount: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub case_status: CaseStatus,
}

/// Facade over the stores, scorer, matcher, and sweeps for interactive callers.
pub struct CaseService {
    stores: CaseStores,
    policy: SlaPolicy,
    sweep_lock: SweepLock,
    sweep_control: SweepControl,
}

impl CaseService {
    pub fn new(stores: CaseStores, policy: SlaPolicy) -> Self {
        Self {
            stores,
            policy,
            sweep_lock: SweepLock::new(),
            sweep_control: SweepControl::unbounded(),
        }
    }

    pub fn with_sweep_control(mut self, control: SweepControl) -> Self {
        self.sweep_control = control;
        self
    }

    pub fn with_sweep_lock(mut self, lock: SweepLock) -> Self {
        self.sweep_lock = lock;
        self
    }

    pub fn stores(&self) -> &CaseStores {
        &self.stores
    }

    pub fn create_case(&self, request: NewCase, now: DateTime<Utc>) -> Result<Case, ServiceError> {
        if request.debtor_name.trim().is_empty() {
            return Err(ServiceError::Validation("debtor name is required".to_string()));
        }
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(ServiceError::Validation(
                "amount must be a positive number".to_string(),
            ));
        }
        if let Some(probability) = request.recovery_probability {
            if !(0.0..=100.0).contains(&probability) {
                return Err(ServiceError::Scoring(
                    ScoringError::RecoveryProbabilityOutOfRange(probability),
                ));
            }
        }
        if let Some(score) = request.priority_score {
            if score > 100 {
                return Err(ServiceError::Validation(format!(
                    "priority score {score} exceeds 100"
                )));
            }
        }
        if let Some(agency_id) = &request.assigned_agency {
            self.require_agency(agency_id)?;
        }

        let id = request
            .id
            .unwrap_or_else(|| CaseId(next_record_id("case")));
        let mut case = Case::new(
            id,
            Debtor {
                name: request.debtor_name,
                account_id: request.debtor_account_id,
            },
            request.amount,
            request.aging,
            now,
        );
        if let Some(currency) = request.currency {
            case.currency = currency;
        }
        case.recovery_probability = request.recovery_probability;
        case.priority_score = request.priority_score;
        case.status = request.status.unwrap_or(CaseStatus::New);
        case.assigned_agency = request.assigned_agency;
        case.owner_id = request.owner_id;
        case.payment_behavior = request.payment_behavior;

        let stored = self.stores.cases.insert(case)?;
        // The agency may have been deleted since the check above.
        if let Some(agency_id) = &stored.assigned_agency {
            if let Err(err) = self.require_agency(agency_id) {
                self.stores.cases.delete(&stored.id)?;
                return Err(err);
            }
        }
        info!(case_id = %stored.id, amount = stored.amount, "case opened");
        Ok(stored)
    }

    pub fn get_case(&self, id: &CaseId) -> Result<Case, ServiceError> {
        let case = self
            .stores
            .cases
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(case)
    }

    pub fn list_cases(&self, mut query: CaseQuery) -> Result<Vec<Case>, ServiceError> {
        query.limit.get_or_insert(DEFAULT_LIST_LIMIT);
        Ok(self.stores.cases.list(&query)?)
    }

    /// Moves a case to `status` and records who did it.
    pub fn update_status(
        &self,
        id: &CaseId,
        status: CaseStatus,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Case, ServiceError> {
        let mut case = self.get_case(id)?;
        let previous = case.status;
        case.status = status;
        case.updated_at = now;
        let case = self.stores.cases.update(case)?;

        self.audit_committed(AuditLogEntry::new(
            case.id.clone(),
            actor,
            "Status Updated",
            format!("{} -> {}", previous.label(), status.label()),
            now,
        ));
        Ok(case)
    }

    pub fn delete_case(&self, id: &CaseId) -> Result<(), ServiceError> {
        self.stores.cases.delete(id)?;
        Ok(())
    }

    pub fn audit_trail(&self, id: &CaseId) -> Result<Vec<AuditLogEntry>, ServiceError> {
        Ok(self.stores.audit_log.for_case(id)?)
    }

    /// Settles the case when the payment covers at least 90% of the amount, then appends the
    /// payment. The ledger is only written once the case update has won its version check; a
    /// failed append restores the previous case status.
    pub fn record_payment(
        &self,
        request: PaymentRequest,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentReceipt, ServiceError> {
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(ServiceError::Validation(
                "payment amount must be a positive number".to_string(),
            ));
        }

        let previous = self.get_case(&request.case_id)?;
        let mut case = previous.clone();
        let payment = Payment {
            id: next_record_id("pay"),
            case_id: case.id.clone(),
            amount: request.amount,
            paid_at: now,
            status: PaymentStatus::Completed,
            notes: request.notes,
        };
        case.status = if request.amount >= case.amount * SETTLEMENT_RATIO {
            CaseStatus::Paid
        } else {
            CaseStatus::InProgress
        };
        case.updated_at = now;
        let case = self.stores.cases.update(case)?;

        if let Err(err) = self.stores.payments.append(payment.clone()) {
            let restore = Case {
                version: case.version,
                ..previous
            };
            if let Err(restore_err) = self.stores.cases.update(restore) {
                error!(case_id = %case.id, error = %restore_err, "could not restore case after ledger failure");
            }
            return Err(err.into());
        }

        self.audit_committed(AuditLogEntry::new(
            case.id.clone(),
            actor,
            "Payment Recorded",
            format!("{:.2} {} received", payment.amount, case.currency),
            now,
        ));
        info!(case_id = %case.id, amount = payment.amount, status = case.status.label(), "payment recorded");

        Ok(PaymentReceipt {
            payment,
            case_status: case.status,
        })
    }

    /// Agencies with `active_cases` recomputed from the current case set.
    pub fn list_agencies(&self) -> Result<Vec<Agency>, ServiceError> {
        let agencies = self.stores.agencies.list_all()?;
        let cases = self.stores.cases.list_all()?;
        Ok(recompute_workload(&agencies, &cases)?)
    }

    pub fn create_agency(&self, request: NewAgency, now: DateTime<Utc>) -> Result<Agency, ServiceError> {
        if request.name.trim().is_empty() {
            return Err(ServiceError::Validation("agency name is required".to_string()));
        }
        if let Some(score) = request.performance_score {
            if !score.is_finite() || !(0.0..=100.0).contains(&score) {
                return Err(ServiceError::Validation(format!(
                    "performance score {score} must be between 0 and 100"
                )));
            }
        }

        let agency = Agency {
            id: request
                .id
                .unwrap_or_else(|| AgencyId(next_record_id("dca"))),
            name: request.name,
            email: request.email,
            performance_score: request.performance_score,
            active_cases: Some(0),
            manager: request.manager,
            created_at: now,
        };
        Ok(self.stores.agencies.insert(agency)?)
    }

    /// Removes an agency that no case references.
    ///
    /// References are checked again after the delete; a case that took the agency in between
    /// puts the agency back and the call fails with [`ServiceError::AgencyInUse`].
    pub fn delete_agency(&self, id: &AgencyId) -> Result<(), ServiceError> {
        let agency = self.require_agency(id)?;
        self.ensure_unreferenced(id)?;
        self.stores.agencies.delete(id)?;

        if let Err(err) = self.ensure_unreferenced(id) {
            if let Err(restore_err) = self.stores.agencies.insert(agency) {
                error!(agency_id = %id, error = %restore_err, "could not restore agency");
            }
            return Err(err);
        }
        info!(agency_id = %id, "agency removed");
        Ok(())
    }

    fn ensure_unreferenced(&self, id: &AgencyId) -> Result<(), ServiceError> {
        let referencing = self
            .stores
            .cases
            .list_all()?
            .iter()
            .filter(|case| case.assigned_agency.as_ref() == Some(id))
            .count();
        if referencing > 0 {
            return Err(ServiceError::AgencyInUse {
                agency_id: id.clone(),
                cases: referencing,
            });
        }
        Ok(())
    }

    /// Every agency ranked for `criteria` against live workload, best first.
    pub fn recommend(
        &self,
        criteria: &MatchingCriteria,
    ) -> Result<Vec<AgencyRecommendation>, ServiceError> {
        let pool = self.list_agencies()?;
        Ok(rank_agencies(&pool, criteria)
            .into_iter()
            .map(AgencyRecommendation::from)
            .collect())
    }

    pub fn prioritize(
        &self,
        requests: Vec<ScoringRequest>,
    ) -> Result<Vec<PrioritizedCase>, ServiceError> {
        Ok(prioritize(requests)?)
    }

    pub fn run_automation(&self, now: DateTime<Utc>) -> Result<AutomationSummary, ServiceError> {
        let runner = AutomationRunner::new(
            Arc::clone(&self.stores.cases),
            Arc::clone(&self.stores.agencies),
            Arc::clone(&self.stores.audit_log),
        )
        .with_lock(self.sweep_lock.clone())
        .with_control(self.sweep_control.clone());
        Ok(runner.run_at(now)?)
    }

    pub fn run_sla_monitor(&self, now: DateTime<Utc>) -> Result<SlaSweepSummary, ServiceError> {
        let monitor = SlaMonitor::new(
            Arc::clone(&self.stores.cases),
            Arc::clone(&self.stores.sla_tracking),
            Arc::clone(&self.stores.audit_log),
            self.policy.clone(),
        )
        .with_lock(self.sweep_lock.clone())
        .with_control(self.sweep_control.clone());
        Ok(monitor.run_at(now)?)
    }

    /// Audits a change that is already stored. The change stands if the entry cannot be written.
    fn audit_committed(&self, entry: AuditLogEntry) {
        let case_id = entry.case_id.clone();
        if let Err(err) = self.stores.audit_log.append(entry) {
            error!(case_id = %case_id, error = %err, "audit entry was not written");
        }
    }

    fn require_agency(&self, id: &AgencyId) -> Result<Agency, ServiceError> {
        self.stores
            .agencies
            .fetch(id)?
            .ok_or_else(|| ServiceError::UnknownAgency(id.clone()))
    }
}

/// Error raised by the case service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("agency {0} does not exist")]
    UnknownAgency(AgencyId),
    #[error("agency {agency_id} is still referenced by {cases} case(s)")]
    AgencyInUse { agency_id: AgencyId, cases: usize },
    #[error("referential integrity violated: {0}")]
    DanglingAgency(#[from] DanglingAgencyReference),
    #[error(transparent)]
    Automation(#[from] AutomationError),
    #[error(transparent)]
    Sla(#[from] SlaMonitorError),
}
