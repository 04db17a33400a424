use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::common::*;
use crate::workflows::cases::domain::{Agency, AgencyId, Case, CaseId, CaseStatus};
use crate::workflows::cases::matching::MatchingCriteria;
use crate::workflows::cases::memory::{InMemoryAgencyRepository, InMemoryCaseRepository};
use crate::workflows::cases::repository::{
    AgencyRepository, CaseQuery, CaseRepository, RepositoryError,
};
use crate::workflows::cases::scoring::ScoringError;
use crate::workflows::cases::service::{NewAgency, NewCase, PaymentRequest, ServiceError};
use crate::workflows::cases::sweep::{SweepError, SweepLock};
use crate::workflows::cases::{
    AutomationError, CaseService, InMemoryStores, PaymentLedger, SlaPolicy,
};

fn new_case(name: &str, amount: f64) -> NewCase {
    NewCase {
        id: None,
        debtor_name: name.to_string(),
        debtor_account_id: None,
        amount,
        currency: None,
        aging: 30,
        recovery_probability: None,
        priority_score: None,
        status: None,
        assigned_agency: None,
        owner_id: None,
        payment_behavior: None,
    }
}

fn payment(case_id: &str, amount: f64) -> PaymentRequest {
    PaymentRequest {
        case_id: CaseId(case_id.to_string()),
        amount,
        notes: None,
    }
}

#[test]
fn create_case_assigns_id_and_defaults() {
    let stores = InMemoryStores::default();
    let service = build_service(&stores);

    let case = service
        .create_case(new_case("Acme Retail", 4_200.0), now())
        .expect("case created");

    assert!(case.id.0.starts_with("case-"));
    assert_eq!(case.status, CaseStatus::New);
    assert_eq!(case.currency, "USD");
    assert_eq!(case.created_at, now());
    assert!(case.priority_score.is_none());
}

#[test]
fn create_case_rejects_invalid_payloads() {
    let stores = InMemoryStores::default();
    let service = build_service(&stores);

    assert!(matches!(
        service.create_case(new_case("  ", 100.0), now()),
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(
        service.create_case(new_case("Acme", 0.0), now()),
        Err(ServiceError::Validation(_))
    ));

    let mut bad_probability = new_case("Acme", 100.0);
    bad_probability.recovery_probability = Some(140.0);
    assert!(matches!(
        service.create_case(bad_probability, now()),
        Err(ServiceError::Scoring(ScoringError::RecoveryProbabilityOutOfRange(_)))
    ));
}

#[test]
fn create_case_requires_known_agency() {
    let stores = InMemoryStores::default();
    let service = build_service(&stores);
    let mut request = new_case("Acme", 100.0);
    request.assigned_agency = Some(AgencyId("dca-missing".to_string()));

    match service.create_case(request, now()) {
        Err(ServiceError::UnknownAgency(id)) => assert_eq!(id.0, "dca-missing"),
        other => panic!("expected unknown agency, got {other:?}"),
    }
}

#[test]
fn duplicate_case_id_conflicts() {
    let stores = seeded_stores(vec![case("case-1", 100.0, 1)], Vec::new());
    let service = build_service(&stores);
    let mut request = new_case("Acme", 100.0);
    request.id = Some(CaseId("case-1".to_string()));

    assert!(matches!(
        service.create_case(request, now()),
        Err(ServiceError::Repository(RepositoryError::Conflict))
    ));
}

#[test]
fn list_cases_filters_by_status_and_agency() {
    let mut assigned = case("case-2", 100.0, 1);
    assigned.assigned_agency = Some(AgencyId("dca-a".to_string()));
    assigned.status = CaseStatus::InProgress;
    let stores = seeded_stores(
        vec![case("case-1", 100.0, 1), assigned, case("case-3", 100.0, 1)],
        vec![agency("dca-a", Some(80.0), 0)],
    );
    let service = build_service(&stores);

    let in_progress = service
        .list_cases(CaseQuery {
            status: Some(CaseStatus::InProgress),
            ..CaseQuery::default()
        })
        .expect("listing works");
    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].id.0, "case-2");

    let limited = service
        .list_cases(CaseQuery {
            limit: Some(2),
            ..CaseQuery::default()
        })
        .expect("listing works");
    assert_eq!(limited.len(), 2);

    let by_agency = service
        .list_cases(CaseQuery {
            agency_id: Some(AgencyId("dca-a".to_string())),
            ..CaseQuery::default()
        })
        .expect("listing works");
    assert_eq!(by_agency.len(), 1);
}

#[test]
fn update_status_writes_audit_entry_with_actor() {
    let stores = seeded_stores(vec![case("case-1", 100.0, 1)], Vec::new());
    let service = build_service(&stores);

    let updated = service
        .update_status(&CaseId("case-1".to_string()), CaseStatus::ContactMade, "agent-7", now())
        .expect("status updated");
    assert_eq!(updated.status, CaseStatus::ContactMade);
    assert_eq!(updated.updated_at, now());

    let trail = service
        .audit_trail(&CaseId("case-1".to_string()))
        .expect("trail loads");
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].actor, "agent-7");
    assert_eq!(trail[0].detail, "New -> Contact Made");
}

#[test]
fn update_status_on_missing_case_is_not_found() {
    let stores = InMemoryStores::default();
    let service = build_service(&stores);

    assert!(matches!(
        service.update_status(&CaseId("nope".to_string()), CaseStatus::Closed, "agent", now()),
        Err(ServiceError::Repository(RepositoryError::NotFound))
    ));
}

#[test]
fn stale_copy_loses_optimistic_update() {
    let stores = seeded_stores(vec![case("case-1", 100.0, 1)], Vec::new());
    let stale = stored_case(&stores, "case-1");

    let mut first = stale.clone();
    first.status = CaseStatus::ContactMade;
    stores.cases.update(first).expect("first writer wins");

    let mut second = stale;
    second.status = CaseStatus::InDispute;
    assert_eq!(
        stores.cases.update(second),
        Err(RepositoryError::VersionConflict {
            expected: 0,
            actual: 1
        })
    );
    assert_eq!(stored_case(&stores, "case-1").status, CaseStatus::ContactMade);
}

#[test]
fn payment_covering_ninety_percent_settles_case() {
    let stores = seeded_stores(vec![case("case-1", 1_000.0, 1)], Vec::new());
    let service = build_service(&stores);

    let receipt = service
        .record_payment(payment("case-1", 900.0), "agent", now())
        .expect("payment recorded");
    assert_eq!(receipt.case_status, CaseStatus::Paid);
    assert_eq!(stored_case(&stores, "case-1").status, CaseStatus::Paid);

    let ledger = stores
        .payments
        .for_case(&CaseId("case-1".to_string()))
        .expect("ledger loads");
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].amount, 900.0);
}

#[test]
fn partial_payment_moves_case_in_progress() {
    let stores = seeded_stores(vec![case("case-1", 1_000.0, 1)], Vec::new());
    let service = build_service(&stores);

    let receipt = service
        .record_payment(payment("case-1", 250.0), "agent", now())
        .expect("payment recorded");
    assert_eq!(receipt.case_status, CaseStatus::InProgress);
}

#[test]
fn payment_for_unknown_case_is_not_recorded() {
    let stores = InMemoryStores::default();
    let service = build_service(&stores);

    assert!(service
        .record_payment(payment("ghost", 10.0), "agent", now())
        .is_err());
    assert!(stores
        .payments
        .for_case(&CaseId("ghost".to_string()))
        .expect("ledger loads")
        .is_empty());
}

#[test]
fn create_agency_validates_performance_score() {
    let stores = InMemoryStores::default();
    let service = build_service(&stores);

    let request = NewAgency {
        id: None,
        name: "Northwind Recovery".to_string(),
        email: None,
        performance_score: Some(120.0),
        manager: None,
    };
    assert!(matches!(
        service.create_agency(request.clone(), now()),
        Err(ServiceError::Validation(_))
    ));

    let created = service
        .create_agency(
            NewAgency {
                performance_score: Some(88.0),
                ..request
            },
            now(),
        )
        .expect("agency created");
    assert!(created.id.0.starts_with("dca-"));
    assert_eq!(created.active_cases, Some(0));
}

#[test]
fn delete_agency_refuses_while_referenced() {
    let mut closed = case("case-1", 100.0, 1);
    closed.assigned_agency = Some(AgencyId("dca-a".to_string()));
    closed.status = CaseStatus::Closed;
    let stores = seeded_stores(
        vec![closed],
        vec![agency("dca-a", Some(80.0), 0), agency("dca-b", Some(70.0), 0)],
    );
    let service = build_service(&stores);

    match service.delete_agency(&AgencyId("dca-a".to_string())) {
        Err(ServiceError::AgencyInUse { cases, .. }) => assert_eq!(cases, 1),
        other => panic!("expected agency in use, got {other:?}"),
    }
    service
        .delete_agency(&AgencyId("dca-b".to_string()))
        .expect("unreferenced agency deletes");
    assert_eq!(service.list_agencies().expect("listing works").len(), 1);
}

#[test]
fn list_agencies_reports_derived_workload() {
    let mut open = case("case-1", 100.0, 1);
    open.assigned_agency = Some(AgencyId("dca-a".to_string()));
    let stores = seeded_stores(vec![open], vec![agency("dca-a", Some(80.0), 12)]);
    let service = build_service(&stores);

    let agencies = service.list_agencies().expect("listing works");
    assert_eq!(agencies[0].active_cases, Some(1));
}

#[test]
fn recommend_ranks_against_live_workload() {
    let mut open = case("case-1", 100.0, 1);
    open.assigned_agency = Some(AgencyId("dca-a".to_string()));
    let stores = seeded_stores(
        vec![open],
        vec![agency("dca-a", Some(80.0), 0), agency("dca-b", Some(75.0), 0)],
    );
    let service = build_service(&stores);

    let ranked = service
        .recommend(&MatchingCriteria::for_amount(5_000.0))
        .expect("ranking works");
    assert_eq!(ranked[0].id.0, "dca-b");
    assert_eq!(ranked[0].match_score, 75.0);
    assert_eq!(ranked[1].match_score, 60.0);
}

#[test]
fn sweeps_share_the_service_lock() {
    let stores = seeded_stores(vec![case("case-1", 100.0, 1)], vec![agency("dca-a", None, 0)]);
    let lock = SweepLock::new();
    let service = build_service(&stores).with_sweep_lock(lock.clone());
    let _held = lock.try_acquire().expect("lock free");

    assert!(matches!(
        service.run_automation(now()),
        Err(ServiceError::Automation(AutomationError::Sweep(
            SweepError::AlreadyRunning
        )))
    ));
    assert!(service.run_sla_monitor(now()).is_err());
}

/// Agency store that loses every agency after the first lookup.
struct VanishingAgencyRepository {
    inner: InMemoryAgencyRepository,
    lookups: AtomicUsize,
}

impl AgencyRepository for VanishingAgencyRepository {
    fn insert(&self, agency: Agency) -> Result<Agency, RepositoryError> {
        self.inner.insert(agency)
    }

    fn fetch(&self, id: &AgencyId) -> Result<Option<Agency>, RepositoryError> {
        if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner.fetch(id)
        } else {
            Ok(None)
        }
    }

    fn delete(&self, id: &AgencyId) -> Result<(), RepositoryError> {
        self.inner.delete(id)
    }

    fn list_all(&self) -> Result<Vec<Agency>, RepositoryError> {
        self.inner.list_all()
    }

    fn set_active_cases(&self, id: &AgencyId, active_cases: u32) -> Result<(), RepositoryError> {
        self.inner.set_active_cases(id, active_cases)
    }
}

/// Case store whose first full listing misses cases written by another request.
struct LateWriteCaseRepository {
    inner: InMemoryCaseRepository,
    listings: AtomicUsize,
}

impl CaseRepository for LateWriteCaseRepository {
    fn insert(&self, case: Case) -> Result<Case, RepositoryError> {
        self.inner.insert(case)
    }

    fn update(&self, case: Case) -> Result<Case, RepositoryError> {
        self.inner.update(case)
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
        if self.listings.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(Vec::new())
        } else {
            self.inner.list_all()
        }
    }
}

#[test]
fn lost_race_on_payment_leaves_ledger_untouched() {
    let cases = RacingCaseRepository::default();
    cases.insert(case("case-1", 1_000.0, 1)).expect("seed");
    let stores = InMemoryStores::default();
    let mut handles = stores.case_stores();
    handles.cases = Arc::new(cases);
    let service = CaseService::new(handles, SlaPolicy::default());

    for _ in 0..2 {
        assert!(matches!(
            service.record_payment(payment("case-1", 950.0), "agent", now()),
            Err(ServiceError::Repository(RepositoryError::VersionConflict { .. }))
        ));
    }
    assert!(stores
        .payments
        .for_case(&CaseId("case-1".to_string()))
        .expect("ledger loads")
        .is_empty());
    assert!(stores.audit_log.entries().expect("audit log readable").is_empty());
}

#[test]
fn ledger_failure_restores_the_case() {
    let stores = seeded_stores(vec![case("case-1", 1_000.0, 1)], Vec::new());
    let original = stored_case(&stores, "case-1");
    let mut handles = stores.case_stores();
    handles.payments = Arc::new(FlakyPaymentLedger::failing(Arc::clone(&stores.payments), 1));
    let service = CaseService::new(handles, SlaPolicy::default());

    assert!(matches!(
        service.record_payment(payment("case-1", 950.0), "agent", now()),
        Err(ServiceError::Repository(RepositoryError::Unavailable(_)))
    ));
    let restored = stored_case(&stores, "case-1");
    assert_eq!(restored.status, original.status);
    assert_eq!(restored.updated_at, original.updated_at);

    let receipt = service
        .record_payment(payment("case-1", 950.0), "agent", now())
        .expect("retry succeeds");
    assert_eq!(receipt.case_status, CaseStatus::Paid);
    let ledger = stores
        .payments
        .for_case(&CaseId("case-1".to_string()))
        .expect("ledger loads");
    assert_eq!(ledger.len(), 1);
}

#[test]
fn stored_changes_stand_when_the_audit_log_fails() {
    let stores = seeded_stores(vec![case("case-1", 1_000.0, 1)], Vec::new());
    let mut handles = stores.case_stores();
    handles.audit_log = Arc::new(FlakyAuditLog::failing(Arc::clone(&stores.audit_log), 2));
    let service = CaseService::new(handles, SlaPolicy::default());

    service
        .update_status(&CaseId("case-1".to_string()), CaseStatus::ContactMade, "agent-7", now())
        .expect("status change stands");
    assert_eq!(stored_case(&stores, "case-1").status, CaseStatus::ContactMade);

    let receipt = service
        .record_payment(payment("case-1", 100.0), "agent-7", now())
        .expect("payment stands");
    assert_eq!(receipt.case_status, CaseStatus::InProgress);
    assert_eq!(
        stores
            .payments
            .for_case(&CaseId("case-1".to_string()))
            .expect("ledger loads")
            .len(),
        1
    );
    assert!(stores.audit_log.entries().expect("audit log readable").is_empty());
}

#[test]
fn case_opened_against_a_deleted_agency_is_rolled_back() {
    let stores = seeded_stores(Vec::new(), vec![agency("dca-a", Some(80.0), 0)]);
    let mut handles = stores.case_stores();
    handles.agencies = Arc::new(VanishingAgencyRepository {
        inner: (*stores.agencies).clone(),
        lookups: AtomicUsize::new(0),
    });
    let service = CaseService::new(handles, SlaPolicy::default());

    let request = NewCase {
        id: Some(CaseId("case-1".to_string())),
        assigned_agency: Some(AgencyId("dca-a".to_string())),
        ..new_case("Globex Freight", 500.0)
    };
    assert!(matches!(
        service.create_case(request, now()),
        Err(ServiceError::UnknownAgency(_))
    ));
    assert!(stores
        .cases
        .fetch(&CaseId("case-1".to_string()))
        .expect("fetch succeeds")
        .is_none());
}

#[test]
fn agency_taken_during_delete_is_restored() {
    let mut taken = case("case-1", 100.0, 1);
    taken.assigned_agency = Some(AgencyId("dca-a".to_string()));
    let stores = seeded_stores(vec![taken], vec![agency("dca-a", Some(80.0), 0)]);
    let mut handles = stores.case_stores();
    handles.cases = Arc::new(LateWriteCaseRepository {
        inner: (*stores.cases).clone(),
        listings: AtomicUsize::new(0),
    });
    let service = CaseService::new(handles, SlaPolicy::default());

    match service.delete_agency(&AgencyId("dca-a".to_string())) {
        Err(ServiceError::AgencyInUse { cases, .. }) => assert_eq!(cases, 1),
        other => panic!("expected agency in use, got {other:?}"),
    }
    assert!(stores
        .agencies
        .fetch(&AgencyId("dca-a".to_string()))
        .expect("fetch succeeds")
        .is_some());
}
