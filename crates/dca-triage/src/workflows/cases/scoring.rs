//! Weighted multi-factor priority scoring.
//!
//! Each factor is normalized into `[0, 1]` and combined with fixed weights that sum to one, so
//! in-domain inputs always produce a score in `0..=100`. Rounding is `f64::round`, i.e. half
//! away from zero.

use serde::{Deserialize, Serialize};

use super::domain::{Case, CaseId};

/// Amount at which the amount factor saturates.
pub const AMOUNT_CAP: f64 = 50_000.0;
/// Age in days at which the overdue factor saturates.
pub const DAYS_CAP: f64 = 365.0;
pub const MAX_SLA_URGENCY: f64 = 10.0;
/// Probability assumed when a case has no recovery estimate.
pub const DEFAULT_RECOVERY_PROBABILITY: f64 = 50.0;

const WEIGHT_PROBABILITY: f64 = 0.4;
const WEIGHT_AMOUNT: f64 = 0.3;
const WEIGHT_DAYS: f64 = 0.2;
const WEIGHT_URGENCY: f64 = 0.1;

/// Inputs to the priority score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityFactors {
    /// 0 to 100.
    pub recovery_probability: f64,
    pub amount: f64,
    pub days_overdue: u32,
    /// 0 to 10, 10 meaning the SLA is about to breach.
    pub sla_urgency: f64,
}

impl PriorityFactors {
    /// Factors used by the automation sweep for a case that has not been scored yet.
    pub fn for_unscored_case(case: &Case) -> Self {
        Self {
            recovery_probability: case
                .recovery_probability
                .unwrap_or(DEFAULT_RECOVERY_PROBABILITY),
            amount: case.amount,
            days_overdue: case.aging,
            sla_urgency: 0.0,
        }
    }
}

/// Raised by [`try_calculate_priority_score`] when a factor is outside its domain.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("recovery probability {0} must be between 0 and 100")]
    RecoveryProbabilityOutOfRange(f64),
    #[error("amount {0} must be a non-negative number")]
    NegativeAmount(f64),
    #[error("sla urgency {0} must be between 0 and 10")]
    SlaUrgencyOutOfRange(f64),
}

/// Computes the 0-100 priority score without validating the factors.
///
/// Callers are responsible for keeping inputs inside their domains; an out-of-range input
/// yields a meaningless (but still `u8`-clamped) score.
pub fn calculate_priority_score(factors: &PriorityFactors) -> u8 {
    let norm_probability = factors.recovery_probability / 100.0;
    let norm_amount = (factors.amount / AMOUNT_CAP).min(1.0);
    let norm_days = (f64::from(factors.days_overdue) / DAYS_CAP).min(1.0);
    let norm_urgency = factors.sla_urgency / MAX_SLA_URGENCY;

    let weighted = norm_probability * WEIGHT_PROBABILITY
        + norm_amount * WEIGHT_AMOUNT
        + norm_days * WEIGHT_DAYS
        + norm_urgency * WEIGHT_URGENCY;

    (weighted * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Validating variant used by the sweeps and the HTTP layer.
pub fn try_calculate_priority_score(factors: &PriorityFactors) -> Result<u8, ScoringError> {
    validate(factors)?;
    Ok(calculate_priority_score(factors))
}

fn validate(factors: &PriorityFactors) -> Result<(), ScoringError> {
    let probability = factors.recovery_probability;
    if !probability.is_finite() || !(0.0..=100.0).contains(&probability) {
        return Err(ScoringError::RecoveryProbabilityOutOfRange(probability));
    }
    if !factors.amount.is_finite() || factors.amount < 0.0 {
        return Err(ScoringError::NegativeAmount(factors.amount));
    }
    let urgency = factors.sla_urgency;
    if !urgency.is_finite() || !(0.0..=MAX_SLA_URGENCY).contains(&urgency) {
        return Err(ScoringError::SlaUrgencyOutOfRange(urgency));
    }
    Ok(())
}

/// Ad-hoc scoring request accepted by the batch prioritization endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRequest {
    #[serde(default)]
    pub case_id: Option<CaseId>,
    #[serde(default)]
    pub recovery_probability: Option<f64>,
    pub amount: f64,
    #[serde(default)]
    pub days_overdue: Option<u32>,
    #[serde(default)]
    pub aging: Option<u32>,
    #[serde(default)]
    pub sla_urgency: Option<f64>,
}

impl ScoringRequest {
    fn factors(&self) -> PriorityFactors {
        PriorityFactors {
            recovery_probability: self
                .recovery_probability
                .unwrap_or(DEFAULT_RECOVERY_PROBABILITY),
            amount: self.amount,
            days_overdue: self.days_overdue.or(self.aging).unwrap_or(0),
            sla_urgency: self.sla_urgency.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrioritizedCase {
    #[serde(flatten)]
    pub request: ScoringRequest,
    pub priority_score: u8,
}

/// Scores every request and orders them highest priority first; equal scores keep input order.
pub fn prioritize(requests: Vec<ScoringRequest>) -> Result<Vec<PrioritizedCase>, ScoringError> {
    let mut scored = requests
        .into_iter()
        .map(|request| {
            let priority_score = try_calculate_priority_score(&request.factors())?;
            Ok(PrioritizedCase {
                request,
                priority_score,
            })
        })
        .collect::<Result<Vec<_>, ScoringError>>()?;

    scored.sort_by(|a, b| b.priority_score.cmp(&a.priority_score));
    Ok(scored)
}

/// Heuristic recovery estimate (0-100) from age and payment-history score.
///
/// Missing inputs default to 30 days overdue and a history score of 50.
pub fn estimate_recovery_probability(days_overdue: Option<u32>, history_score: Option<f64>) -> u8 {
    let norm_days = (f64::from(days_overdue.unwrap_or(30)) / DAYS_CAP).min(1.0);
    let norm_history = history_score.unwrap_or(50.0) / 100.0;

    let probability = norm_history * 0.4 + (1.0 - norm_days) * 0.4 + 0.1;
    (probability.clamp(0.0, 1.0) * 100.0).round() as u8
}
