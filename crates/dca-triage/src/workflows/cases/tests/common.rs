use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::cases::domain::{
    Agency, AgencyId, AuditLogEntry, Case, CaseId, Debtor, Payment, SlaTrackingRecord,
};
use crate::workflows::cases::memory::{
    InMemoryAuditLog, InMemoryCaseRepository, InMemoryPaymentLedger, InMemorySlaTracking,
    InMemoryStores,
};
use crate::workflows::cases::repository::{
    AuditLog, CaseQuery, CaseRepository, PaymentLedger, RepositoryError, SlaTrackingRepository,
};
use crate::workflows::cases::{case_router, CaseService, SlaPolicy};

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

pub(super) fn case(id: &str, amount: f64, aging: u32) -> Case {
    Case::new(
        CaseId(id.to_string()),
        Debtor {
            name: format!("Debtor {id}"),
            account_id: Some(format!("ACC-{id}")),
        },
        amount,
        aging,
        days_ago(1),
    )
}

/// A high-priority, long-overdue case last touched `stale_days` ago.
pub(super) fn watched_case(id: &str, priority: u8, aging: u32, stale_days: i64) -> Case {
    let mut case = case(id, 20_000.0, aging);
    case.priority_score = Some(priority);
    case.created_at = days_ago(stale_days + 30);
    case.updated_at = days_ago(stale_days);
    case
}

pub(super) fn agency(id: &str, performance: Option<f64>, active_cases: u32) -> Agency {
    Agency {
        id: AgencyId(id.to_string()),
        name: format!("Agency {id}"),
        email: Some(format!("{id}@collections.example")),
        performance_score: performance,
        active_cases: Some(active_cases),
        manager: None,
        created_at: days_ago(90),
    }
}

pub(super) fn seeded_stores(cases: Vec<Case>, agencies: Vec<Agency>) -> InMemoryStores {
    use crate::workflows::cases::repository::AgencyRepository;

    let stores = InMemoryStores::default();
    for agency in agencies {
        stores.agencies.insert(agency).expect("agency seeds");
    }
    for case in cases {
        stores.cases.insert(case).expect("case seeds");
    }
    stores
}

pub(super) fn build_service(stores: &InMemoryStores) -> CaseService {
    CaseService::new(stores.case_stores(), SlaPolicy::default())
}

pub(super) fn router_with_service(service: CaseService) -> axum::Router {
    case_router(Arc::new(service))
}

pub(super) fn stored_case(stores: &InMemoryStores, id: &str) -> Case {
    stores
        .cases
        .fetch(&CaseId(id.to_string()))
        .expect("fetch succeeds")
        .expect("case present")
}

pub(super) fn assert_conflict_response(response: Response) {
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Reads through to an in-memory store but loses every write race.
#[derive(Default, Clone)]
pub(super) struct RacingCaseRepository {
    pub(super) inner: InMemoryCaseRepository,
}

impl CaseRepository for RacingCaseRepository {
    fn insert(&self, case: Case) -> Result<Case, RepositoryError> {
        self.inner.insert(case)
    }

    fn update(&self, case: Case) -> Result<Case, RepositoryError> {
        Err(RepositoryError::VersionConflict {
            expected: case.version,
            actual: case.version + 1,
        })
    }

    fn fetch(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn delete(&self, id: &CaseId) -> Result<(), RepositoryError> {
        self.inner.delete(id)
    }

    fn list(&self, query: &CaseQuery) -> Result<Vec<Case>, RepositoryError> {
        self.inner.list(query)
    }

    fn list_active(&self) -> Result<Vec<Case>, RepositoryError> {
        self.inner.list_active()
    }

    fn list_unassigned(&self) -> Result<Vec<Case>, RepositoryError> {
        self.inner.list_unassigned()
    }

    fn list_all(&self) -> Result<Vec<Case>, RepositoryError> {
        self.inner.list_all()
    }
}

pub(super) struct UnavailableCaseRepository;

impl CaseRepository for UnavailableCaseRepository {
    fn insert(&self, _case: Case) -> Result<Case, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _case: Case) -> Result<Case, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &CaseId) -> Result<Option<Case>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: &CaseId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self, _query: &CaseQuery) -> Result<Vec<Case>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_active(&self) -> Result<Vec<Case>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_unassigned(&self) -> Result<Vec<Case>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_all(&self) -> Result<Vec<Case>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Counts down injected write failures; reads always pass through.
#[derive(Debug, Default)]
pub(super) struct FailBudget(AtomicUsize);

impl FailBudget {
    pub(super) fn new(failures: usize) -> Self {
        Self(AtomicUsize::new(failures))
    }

    fn trip(&self, store: &str) -> Result<(), RepositoryError> {
        let tripped = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if tripped {
            Err(RepositoryError::Unavailable(format!("{store} write timed out")))
        } else {
            Ok(())
        }
    }
}

/// Tracking store whose first `n` upserts fail.
pub(super) struct FlakySlaTracking {
    pub(super) inner: Arc<InMemorySlaTracking>,
    pub(super) failures: FailBudget,
}

impl FlakySlaTracking {
    pub(super) fn failing(inner: Arc<InMemorySlaTracking>, failures: usize) -> Self {
        Self {
            inner,
            failures: FailBudget::new(failures),
        }
    }
}

impl SlaTrackingRepository for FlakySlaTracking {
    fn fetch_by_case(&self, case_id: &CaseId) -> Result<Option<SlaTrackingRecord>, RepositoryError> {
        self.inner.fetch_by_case(case_id)
    }

    fn upsert(&self, record: SlaTrackingRecord) -> Result<(), RepositoryError> {
        self.failures.trip("sla tracking")?;
        self.inner.upsert(record)
    }
}

/// Audit log whose first `n` appends fail.
pub(super) struct FlakyAuditLog {
    pub(super) inner: Arc<InMemoryAuditLog>,
    pub(super) failures: FailBudget,
}

impl FlakyAuditLog {
    pub(super) fn failing(inner: Arc<InMemoryAuditLog>, failures: usize) -> Self {
        Self {
            inner,
            failures: FailBudget::new(failures),
        }
    }
}

impl AuditLog for FlakyAuditLog {
    fn append(&self, entry: AuditLogEntry) -> Result<(), RepositoryError> {
        self.failures.trip("audit log")?;
        self.inner.append(entry)
    }

    fn for_case(&self, case_id: &CaseId) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        self.inner.for_case(case_id)
    }
}

/// Payment ledger whose first `n` appends fail.
pub(super) struct FlakyPaymentLedger {
    pub(super) inner: Arc<InMemoryPaymentLedger>,
    pub(super) failures: FailBudget,
}

impl FlakyPaymentLedger {
    pub(super) fn failing(inner: Arc<InMemoryPaymentLedger>, failures: usize) -> Self {
        Self {
            inner,
            failures: FailBudget::new(failures),
        }
    }
}

impl PaymentLedger for FlakyPaymentLedger {
    fn append(&self, payment: Payment) -> Result<(), RepositoryError> {
        self.failures.trip("payment ledger")?;
        self.inner.append(payment)
    }

    fn for_case(&self, case_id: &CaseId) -> Result<Vec<Payment>, RepositoryError> {
        self.inner.for_case(case_id)
    }
}
