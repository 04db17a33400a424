//! Process-local stores used by the api binary, the demo command, and tests.
//!
//! Each store wraps its table in `Arc<Mutex<_>>`, so clones share state.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{Agency, AgencyId, AuditLogEntry, Case, CaseId, Payment, SlaTrackingRecord};
use super::repository::{
    AgencyRepository, AuditLog, CaseQuery, CaseRepository, CaseStores, PaymentLedger,
    RepositoryError, SlaTrackingRepository,
};

fn lock<T>(table: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    table
        .lock()
        .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryCaseRepository {
    records: Arc<Mutex<BTreeMap<CaseId, Case>>>,
}

impl CaseRepository for InMemoryCaseRepository {
    fn insert(&self, case: Case) -> Result<Case, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.contains_key(&case.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(case.id.clone(), case.clone());
        Ok(case)
    }

    fn update(&self, case: Case) -> Result<Case, RepositoryError> {
        let mut guard = lock(&self.records)?;
        let stored = guard.get_mut(&case.id).ok_or(RepositoryError::NotFound)?;
        if stored.version != case.version {
            return Err(RepositoryError::VersionConflict {
                expected: case.version,
                actual: stored.version,
            });
        }
        let mut next = case;
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    fn fetch(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    fn delete(&self, id: &CaseId) -> Result<(), RepositoryError> {
        lock(&self.records)?
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn list(&self, query: &CaseQuery) -> Result<Vec<Case>, RepositoryError> {
        let guard = lock(&self.records)?;
        let mut cases: Vec<Case> = guard
            .values()
            .filter(|case| query.matches(case))
            .cloned()
            .collect();
        cases.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = query.limit {
            cases.truncate(limit);
        }
        Ok(cases)
    }

    fn list_active(&self) -> Result<Vec<Case>, RepositoryError> {
        let guard = lock(&self.records)?;
        Ok(guard.values().filter(|case| case.is_active()).cloned().collect())
    }

    fn list_unassigned(&self) -> Result<Vec<Case>, RepositoryError> {
        let guard = lock(&self.records)?;
        Ok(guard
            .values()
            .filter(|case| case.is_active() && case.is_unassigned())
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<Case>, RepositoryError> {
        Ok(lock(&self.records)?.values().cloned().collect())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAgencyRepository {
    records: Arc<Mutex<BTreeMap<AgencyId, Agency>>>,
}

impl AgencyRepository for InMemoryAgencyRepository {
    fn insert(&self, agency: Agency) -> Result<Agency, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.contains_key(&agency.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(agency.id.clone(), agency.clone());
        Ok(agency)
    }

    fn fetch(&self, id: &AgencyId) -> Result<Option<Agency>, RepositoryError> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    fn delete(&self, id: &AgencyId) -> Result<(), RepositoryError> {
        lock(&self.records)?
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn list_all(&self) -> Result<Vec<Agency>, RepositoryError> {
        Ok(lock(&self.records)?.values().cloned().collect())
    }

    fn set_active_cases(&self, id: &AgencyId, active_cases: u32) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        let agency = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        agency.active_cases = Some(active_cases);
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemorySlaTracking {
    records: Arc<Mutex<BTreeMap<CaseId, SlaTrackingRecord>>>,
}

impl InMemorySlaTracking {
    /// Every record, ordered by case id.
    pub fn records(&self) -> Result<Vec<SlaTrackingRecord>, RepositoryError> {
        Ok(lock(&self.records)?.values().cloned().collect())
    }
}

impl SlaTrackingRepository for InMemorySlaTracking {
    fn fetch_by_case(&self, case_id: &CaseId) -> Result<Option<SlaTrackingRecord>, RepositoryError> {
        Ok(lock(&self.records)?.get(case_id).cloned())
    }

    fn upsert(&self, record: SlaTrackingRecord) -> Result<(), RepositoryError> {
        lock(&self.records)?.insert(record.case_id.clone(), record);
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryPaymentLedger {
    entries: Arc<Mutex<Vec<Payment>>>,
}

impl PaymentLedger for InMemoryPaymentLedger {
    fn append(&self, payment: Payment) -> Result<(), RepositoryError> {
        lock(&self.entries)?.push(payment);
        Ok(())
    }

    fn for_case(&self, case_id: &CaseId) -> Result<Vec<Payment>, RepositoryError> {
        Ok(lock(&self.entries)?
            .iter()
            .filter(|payment| &payment.case_id == case_id)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditLogEntry>>>,
}

impl InMemoryAuditLog {
    /// Every entry in append order.
    pub fn entries(&self) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        Ok(lock(&self.entries)?.clone())
    }
}

impl AuditLog for InMemoryAuditLog {
    fn append(&self, entry: AuditLogEntry) -> Result<(), RepositoryError> {
        lock(&self.entries)?.push(entry);
        Ok(())
    }

    fn for_case(&self, case_id: &CaseId) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        Ok(lock(&self.entries)?
            .iter()
            .rev()
            .filter(|entry| &entry.case_id == case_id)
            .cloned()
            .collect())
    }
}

/// One handle per store, sharing state across clones.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStores {
    pub cases: Arc<InMemoryCaseRepository>,
    pub agencies: Arc<InMemoryAgencyRepository>,
    pub sla_tracking: Arc<InMemorySlaTracking>,
    pub payments: Arc<InMemoryPaymentLedger>,
    pub audit_log: Arc<InMemoryAuditLog>,
}

impl InMemoryStores {
    pub fn case_stores(&self) -> CaseStores {
        CaseStores {
            cases: self.cases.clone(),
            agencies: self.agencies.clone(),
            sla_tracking: self.sla_tracking.clone(),
            payments: self.payments.clone(),
            audit_log: self.audit_log.clone(),
        }
    }
}
