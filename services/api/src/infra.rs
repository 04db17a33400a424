use chrono::{DateTime, Duration, Utc};
use dca_triage::error::AppError;
use dca_triage::workflows::cases::{
    Agency, AgencyId, AgencyRepository, Case, CaseId, CaseRepository, CaseStatus, Debtor,
    InMemoryStores, ServiceError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Portfolio loaded into the in-memory stores by the one-shot commands.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Snapshot {
    #[serde(default)]
    pub(crate) agencies: Vec<Agency>,
    #[serde(default)]
    pub(crate) cases: Vec<Case>,
}

impl Snapshot {
    pub(crate) fn from_path(path: &Path) -> Result<Self, AppError> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Self = serde_json::from_reader(reader).map_err(std::io::Error::from)?;
        Ok(snapshot)
    }

    /// Agencies first, so cases can reference them.
    pub(crate) fn into_stores(self) -> Result<InMemoryStores, AppError> {
        let stores = InMemoryStores::default();
        for agency in self.agencies {
            stores.agencies.insert(agency).map_err(ServiceError::from)?;
        }
        for case in self.cases {
            stores.cases.insert(case).map_err(ServiceError::from)?;
        }
        Ok(stores)
    }
}

/// Sample portfolio: three agencies and a spread of cases around the SLA thresholds.
pub(crate) fn demo_snapshot(now: DateTime<Utc>) -> Snapshot {
    let agencies = vec![
        demo_agency("dca-northwind", "Northwind Recovery", Some(88.0), now),
        demo_agency("dca-harbor", "Harbor Collections", Some(74.0), now),
        demo_agency("dca-summit", "Summit Credit Partners", None, now),
    ];

    let mut stale = demo_case(
        "case-globex",
        "Globex Freight",
        48_500.0,
        210,
        now - Duration::days(12),
    );
    stale.priority_score = Some(86);
    stale.recovery_probability = Some(82.0);
    stale.assigned_agency = Some(AgencyId("dca-harbor".to_string()));
    stale.status = CaseStatus::ContactMade;

    let mut watched = demo_case(
        "case-umbrella",
        "Umbrella Logistics",
        39_000.0,
        95,
        now - Duration::days(3),
    );
    watched.priority_score = Some(83);

    let mut fresh = demo_case(
        "case-initech",
        "Initech Supplies",
        2_400.0,
        18,
        now - Duration::days(1),
    );
    fresh.recovery_probability = Some(35.0);

    let mut settled = demo_case(
        "case-hooli",
        "Hooli Media",
        7_800.0,
        140,
        now - Duration::days(20),
    );
    settled.status = CaseStatus::Paid;
    settled.assigned_agency = Some(AgencyId("dca-northwind".to_string()));

    let cases = vec![
        stale,
        watched,
        fresh,
        settled,
        demo_case(
            "case-stark",
            "Stark Fabrication",
            15_250.0,
            64,
            now - Duration::days(2),
        ),
        demo_case(
            "case-wayne",
            "Wayne Outfitters",
            61_000.0,
            400,
            now - Duration::days(5),
        ),
    ];

    Snapshot { agencies, cases }
}

fn demo_agency(id: &str, name: &str, performance: Option<f64>, now: DateTime<Utc>) -> Agency {
    Agency {
        id: AgencyId(id.to_string()),
        name: name.to_string(),
        email: Some(format!("ops@{}.example", id.trim_start_matches("dca-"))),
        performance_score: performance,
        active_cases: None,
        manager: None,
        created_at: now - Duration::days(365),
    }
}

fn demo_case(id: &str, debtor: &str, amount: f64, aging: u32, touched: DateTime<Utc>) -> Case {
    let mut case = Case::new(
        CaseId(id.to_string()),
        Debtor {
            name: debtor.to_string(),
            account_id: None,
        },
        amount,
        aging,
        touched - Duration::days(30),
    );
    case.updated_at = touched;
    case
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}
