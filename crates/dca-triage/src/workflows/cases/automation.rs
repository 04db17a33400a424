//! Auto-assignment sweep: score unscored cases and hand unassigned ones to the best agency.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::domain::{Agency, AuditLogEntry, Case, CaseStatus, SYSTEM_ACTOR};
use super::matching::{recommend_dca, recompute_workload, DanglingAgencyReference, MatchingCriteria};
use super::repository::{AgencyRepository, AuditLog, CaseRepository, RepositoryError};
use super::scoring::{try_calculate_priority_score, PriorityFactors, ScoringError};
use super::sweep::{SweepControl, SweepError, SweepInterruption, SweepLock};

/// Totals reported by one automation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AutomationSummary {
    pub assigned_count: usize,
    pub scored: usize,
    pub unmatched: usize,
    pub processed: usize,
    pub failed: usize,
    /// Assignments that were stored but whose audit entry could not be written.
    pub unaudited: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<SweepInterruption>,
}

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error("unable to load cases or agencies: {0}")]
    Repository(#[from] RepositoryError),
    #[error("referential integrity violated: {0}")]
    DanglingAgency(#[from] DanglingAgencyReference),
}

#[derive(Debug, thiserror::Error)]
enum CaseFailure {
    #[error("cannot score case: {0}")]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

struct CaseResult {
    scored: bool,
    assigned: bool,
    audited: bool,
}

pub struct AutomationRunner<C: ?Sized, A: ?Sized, L: ?Sized> {
    cases: Arc<C>,
    agencies: Arc<A>,
    audit: Arc<L>,
    lock: SweepLock,
    control: SweepControl,
}

impl<C, A, L> AutomationRunner<C, A, L>
where
    C: CaseRepository + ?Sized,
    A: AgencyRepository + ?Sized,
    L: AuditLog + ?Sized,
{
    pub fn new(cases: Arc<C>, agencies: Arc<A>, audit: Arc<L>) -> Self {
        Self {
            cases,
            agencies,
            audit,
            lock: SweepLock::new(),
            control: SweepControl::unbounded(),
        }
    }

    pub fn with_lock(mut self, lock: SweepLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_control(mut self, control: SweepControl) -> Self {
        self.control = control;
        self
    }

    pub fn run(&self) -> Result<AutomationSummary, AutomationError> {
        self.run_at(Utc::now())
    }

    pub fn run_at(&self, now: DateTime<Utc>) -> Result<AutomationSummary, AutomationError> {
        let _guard = self.lock.try_acquire()?;
        let clock = self.control.start();

        let mut pool = recompute_workload(&self.agencies.list_all()?, &self.cases.list_all()?)?;
        let unassigned = self.cases.list_unassigned()?;
        info!(
            cases = unassigned.len(),
            agencies = pool.len(),
            "running auto-assignment"
        );

        let mut summary = AutomationSummary::default();
        for case in unassigned {
            if let Some(reason) = clock.check() {
                warn!(?reason, processed = summary.processed, "auto-assignment interrupted");
                summary.interrupted = Some(reason);
                break;
            }

            summary.processed += 1;
            let case_id = case.id.clone();
            match self.process(case, &mut pool, now) {
                Ok(result) => {
                    if result.scored {
                        summary.scored += 1;
                    }
                    if result.assigned {
                        summary.assigned_count += 1;
                    } else {
                        summary.unmatched += 1;
                    }
                    if !result.audited {
                        summary.unaudited += 1;
                    }
                }
                Err(err) => {
                    error!(case_id = %case_id, error = %err, "auto-assignment failed");
                    summary.failed += 1;
                }
            }
        }

        self.store_workload(&pool);
        info!(
            assigned = summary.assigned_count,
            failed = summary.failed,
            unaudited = summary.unaudited,
            "automation complete"
        );
        Ok(summary)
    }

    fn process(
        &self,
        mut case: Case,
        pool: &mut [Agency],
        now: DateTime<Utc>,
    ) -> Result<CaseResult, CaseFailure> {
        let mut scored = false;
        if case.priority_score.is_none() {
            let score = try_calculate_priority_score(&PriorityFactors::for_unscored_case(&case))?;
            case.priority_score = Some(score);
            case = self.cases.update(case)?;
            scored = true;
        }

        let criteria = MatchingCriteria::for_amount(case.amount);
        let Some(agency) = recommend_dca(pool, &criteria) else {
            return Ok(CaseResult {
                scored,
                assigned: false,
                audited: true,
            });
        };
        let agency_id = agency.id.clone();
        let agency_name = agency.name.clone();

        info!(case_id = %case.id, amount = case.amount, agency = %agency_name, "assigning case");
        case.assigned_agency = Some(agency_id.clone());
        case.status = CaseStatus::InProgress;
        case.updated_at = now;
        let case = self.cases.update(case)?;

        if let Some(entry) = pool.iter_mut().find(|agency| agency.id == agency_id) {
            entry.active_cases = Some(entry.active_cases.unwrap_or(0) + 1);
        }

        let entry = AuditLogEntry::new(
            case.id.clone(),
            SYSTEM_ACTOR,
            "Assigned",
            format!("Auto-assigned to {agency_name}"),
            now,
        );
        // The assignment is already stored, so a lost audit entry is reported, not retried.
        let audited = match self.audit.append(entry) {
            Ok(()) => true,
            Err(err) => {
                error!(case_id = %case.id, error = %err, "audit entry for assignment was not written");
                false
            }
        };

        Ok(CaseResult {
            scored,
            assigned: true,
            audited,
        })
    }

    fn store_workload(&self, pool: &[Agency]) {
        for agency in pool {
            let active_cases = agency.active_cases.unwrap_or(0);
            if let Err(err) = self.agencies.set_active_cases(&agency.id, active_cases) {
                warn!(agency_id = %agency.id, error = %err, "could not persist agency workload");
            }
        }
    }
}
