//! Load-balanced agency recommendation.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{Agency, AgencyId, Case, CaseId};

/// Performance assumed for an agency without a recorded score.
pub const DEFAULT_PERFORMANCE_SCORE: f64 = 50.0;
/// Points subtracted per unit of load relative to the pool average.
pub const LOAD_PENALTY: f64 = 10.0;

/// Case attributes considered when picking an agency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingCriteria {
    pub amount: f64,
    /// Accepted for forward compatibility; not yet part of the score.
    #[serde(default)]
    pub case_type: Option<String>,
}

impl MatchingCriteria {
    pub fn for_amount(amount: f64) -> Self {
        Self {
            amount,
            case_type: None,
        }
    }
}

/// An agency paired with the score it earned for one recommendation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgencyMatch<'a> {
    pub agency: &'a Agency,
    pub match_score: f64,
}

/// Serializable view of a ranked agency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgencyRecommendation {
    pub id: AgencyId,
    pub name: String,
    pub match_score: f64,
}

impl From<AgencyMatch<'_>> for AgencyRecommendation {
    fn from(value: AgencyMatch<'_>) -> Self {
        Self {
            id: value.agency.id.clone(),
            name: value.agency.name.clone(),
            match_score: value.match_score,
        }
    }
}

/// Scores every agency, best first. Equal scores are ordered by ascending agency id.
pub fn rank_agencies<'a>(agencies: &'a [Agency], _criteria: &MatchingCriteria) -> Vec<AgencyMatch<'a>> {
    if agencies.is_empty() {
        return Vec::new();
    }

    let total_load: u64 = agencies
        .iter()
        .map(|agency| u64::from(agency.active_cases.unwrap_or(0)))
        .sum();
    let average_load = if total_load == 0 {
        1.0
    } else {
        total_load as f64 / agencies.len() as f64
    };

    let mut ranked: Vec<AgencyMatch<'a>> = agencies
        .iter()
        .map(|agency| {
            let performance = agency
                .performance_score
                .unwrap_or(DEFAULT_PERFORMANCE_SCORE);
            let load_factor = f64::from(agency.active_cases.unwrap_or(0)) / average_load;
            AgencyMatch {
                agency,
                match_score: performance - load_factor * LOAD_PENALTY,
            }
        })
        .collect();

    ranked.sort_by(compare_matches);
    ranked
}

fn compare_matches(a: &AgencyMatch<'_>, b: &AgencyMatch<'_>) -> Ordering {
    b.match_score
        .total_cmp(&a.match_score)
        .then_with(|| a.agency.id.cmp(&b.agency.id))
}

/// Picks the best-fit agency, or `None` when the pool is empty.
pub fn recommend_dca<'a>(agencies: &'a [Agency], criteria: &MatchingCriteria) -> Option<&'a Agency> {
    rank_agencies(agencies, criteria)
        .into_iter()
        .next()
        .map(|matched| matched.agency)
}

/// A case points at an agency that is not in the pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("case {case_id} references unknown agency {agency_id}")]
pub struct DanglingAgencyReference {
    pub case_id: CaseId,
    pub agency_id: AgencyId,
}

/// Returns the pool with `active_cases` recomputed from the non-terminal cases assigned to each
/// agency.
pub fn recompute_workload(
    agencies: &[Agency],
    cases: &[Case],
) -> Result<Vec<Agency>, DanglingAgencyReference> {
    let mut load: BTreeMap<&AgencyId, u32> =
        agencies.iter().map(|agency| (&agency.id, 0)).collect();

    for case in cases {
        let Some(agency_id) = &case.assigned_agency else {
            continue;
        };
        match load.get_mut(agency_id) {
            Some(count) => {
                if case.is_active() {
                    *count += 1;
                }
            }
            None => {
                return Err(DanglingAgencyReference {
                    case_id: case.id.clone(),
                    agency_id: agency_id.clone(),
                })
            }
        }
    }

    Ok(agencies
        .iter()
        .map(|agency| {
            let mut agency = agency.clone();
            agency.active_cases = Some(load.get(&agency.id).copied().unwrap_or(0));
            agency
        })
        .collect())
}
