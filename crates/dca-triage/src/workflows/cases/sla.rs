//! SLA breach sweep over active cases.
//!
//! A case enters critical watch when both its priority and its age exceed the policy
//! thresholds. A watched case breaches once it has gone longer than the staleness window
//! without an update. The sweep never moves a breached case back to on-track; that takes an
//! explicit status change elsewhere.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::domain::{
    AuditLogEntry, Case, SlaStatus, SlaTrackingRecord, SlaTrackingStatus, SYSTEM_ACTOR,
};
use super::repository::{AuditLog, CaseRepository, RepositoryError, SlaTrackingRepository};
use super::sweep::{SweepControl, SweepError, SweepInterruption, SweepLock};

/// Audit action written when a case first breaches.
pub const SLA_BREACHED_ACTION: &str = "SLA Breached";

/// Thresholds applied by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaPolicy {
    /// Watch cases scoring strictly above this.
    pub priority_threshold: u8,
    /// Watch cases strictly older than this many days.
    pub aging_threshold_days: u32,
    /// A watched case breaches when its last update is strictly older than this.
    pub stale_after_days: u32,
    /// Urgency written to breached cases.
    pub critical_urgency: f64,
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self {
            priority_threshold: 80,
            aging_threshold_days: 60,
            stale_after_days: 7,
            critical_urgency: 10.0,
        }
    }
}

/// Outcome of evaluating one case against the policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlaAssessment {
    Normal,
    CriticalWatch,
    Breached { days_since_update: f64 },
}

impl SlaPolicy {
    pub fn is_critical(&self, case: &Case) -> bool {
        case.priority_score.unwrap_or(0) > self.priority_threshold
            && case.aging > self.aging_threshold_days
    }

    pub fn assess(&self, case: &Case, now: DateTime<Utc>) -> SlaAssessment {
        if !self.is_critical(case) {
            return SlaAssessment::Normal;
        }

        let elapsed = now - case.updated_at;
        if elapsed > Duration::days(i64::from(self.stale_after_days)) {
            SlaAssessment::Breached {
                days_since_update: elapsed.num_seconds() as f64 / 86_400.0,
            }
        } else {
            SlaAssessment::CriticalWatch
        }
    }
}

/// Totals reported by one monitor run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SlaSweepSummary {
    pub breach_count: usize,
    pub at_risk_count: usize,
    pub processed: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<SweepInterruption>,
}

#[derive(Debug, thiserror::Error)]
pub enum SlaMonitorError {
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error("unable to list active cases: {0}")]
    Repository(#[from] RepositoryError),
}

enum CaseOutcome {
    Unchanged,
    AtRisk,
    Breached,
}

pub struct SlaMonitor<C: ?Sized, S: ?Sized, L: ?Sized> {
    cases: Arc<C>,
    tracking: Arc<S>,
    audit: Arc<L>,
    policy: SlaPolicy,
    lock: SweepLock,
    control: SweepControl,
}

impl<C, S, L> SlaMonitor<C, S, L>
where
    C: CaseRepository + ?Sized,
    S: SlaTrackingRepository + ?Sized,
    L: AuditLog + ?Sized,
{
    pub fn new(cases: Arc<C>, tracking: Arc<S>, audit: Arc<L>, policy: SlaPolicy) -> Self {
        Self {
            cases,
            tracking,
            audit,
            policy,
            lock: SweepLock::new(),
            control: SweepControl::unbounded(),
        }
    }

    /// Shares a lock with other sweeps so they never overlap.
    pub fn with_lock(mut self, lock: SweepLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_control(mut self, control: SweepControl) -> Self {
        self.control = control;
        self
    }

    pub fn policy(&self) -> &SlaPolicy {
        &self.policy
    }

    pub fn run(&self) -> Result<SlaSweepSummary, SlaMonitorError> {
        self.run_at(Utc::now())
    }

    /// Runs the sweep as if the current time were `now`.
    pub fn run_at(&self, now: DateTime<Utc>) -> Result<SlaSweepSummary, SlaMonitorError> {
        let _guard = self.lock.try_acquire()?;
        let clock = self.control.start();
        let active = self.cases.list_active()?;
        info!(cases = active.len(), "running sla monitor");

        let mut summary = SlaSweepSummary::default();
        for case in active {
            if let Some(reason) = clock.check() {
                warn!(?reason, processed = summary.processed, "sla monitor interrupted");
                summary.interrupted = Some(reason);
                break;
            }

            summary.processed += 1;
            let case_id = case.id.clone();
            match self.process(case, now) {
                Ok(CaseOutcome::Breached) => summary.breach_count += 1,
                Ok(CaseOutcome::AtRisk) => summary.at_risk_count += 1,
                Ok(CaseOutcome::Unchanged) => {}
                Err(err) => {
                    error!(case_id = %case_id, error = %err, "sla update failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            breaches = summary.breach_count,
            at_risk = summary.at_risk_count,
            failed = summary.failed,
            "sla check complete"
        );
        Ok(summary)
    }

    fn process(&self, case: Case, now: DateTime<Utc>) -> Result<CaseOutcome, RepositoryError> {
        match self.policy.assess(&case, now) {
            SlaAssessment::Normal => Ok(CaseOutcome::Unchanged),
            SlaAssessment::CriticalWatch => {
                if case.sla_status != SlaStatus::OnTrack {
                    return Ok(CaseOutcome::Unchanged);
                }
                let mut case = case;
                case.sla_status = SlaStatus::AtRisk;
                self.cases.update(case)?;
                Ok(CaseOutcome::AtRisk)
            }
            SlaAssessment::Breached { days_since_update } => {
                warn!(
                    case_id = %case.id,
                    days_since_update,
                    "case is overdue for action"
                );
                self.record_breach(case, now)?;
                Ok(CaseOutcome::Breached)
            }
        }
    }

    /// Writes the audit entry, then the tracking record, then the case. A run that fails part
    /// way leaves the case un-breached, so the next run retries it without re-auditing.
    fn record_breach(&self, case: Case, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let deadline = case.updated_at + Duration::days(i64::from(self.policy.stale_after_days));
        let existing = self.tracking.fetch_by_case(&case.id)?;
        let flagged = existing.as_ref().is_some_and(|record| record.breach_flag);

        if !flagged && !self.breach_already_audited(&case)? {
            self.audit.append(AuditLogEntry::new(
                case.id.clone(),
                SYSTEM_ACTOR,
                SLA_BREACHED_ACTION,
                format!(
                    "No update for more than {} days on a priority {} case",
                    self.policy.stale_after_days,
                    case.priority_score.unwrap_or(0)
                ),
                now,
            ))?;
        }

        let record = match existing {
            Some(mut existing) => {
                existing.status = SlaTrackingStatus::Breached;
                existing.breach_flag = true;
                existing.deadline.get_or_insert(deadline);
                existing
            }
            None => SlaTrackingRecord {
                id: SlaTrackingRecord::id_for(&case.id),
                case_id: case.id.clone(),
                deadline: Some(deadline),
                status: SlaTrackingStatus::Breached,
                breach_flag: true,
                created_at: now,
            },
        };
        self.tracking.upsert(record)?;

        if case.sla_status != SlaStatus::Breached
            || case.sla_urgency != self.policy.critical_urgency
        {
            // updated_at tracks operator activity only.
            let mut case = case;
            case.sla_status = SlaStatus::Breached;
            case.sla_urgency = self.policy.critical_urgency;
            self.cases.update(case)?;
        }
        Ok(())
    }

    /// True when this breach episode, counted from the last operator update, was already audited.
    fn breach_already_audited(&self, case: &Case) -> Result<bool, RepositoryError> {
        Ok(self
            .audit
            .for_case(&case.id)?
            .iter()
            .any(|entry| {
                entry.action == SLA_BREACHED_ACTION && entry.timestamp >= case.updated_at
            }))
    }
}
