use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::automation::AutomationError;
use super::domain::{AgencyId, CaseId, CaseStatus};
use super::matching::MatchingCriteria;
use super::repository::{CaseQuery, RepositoryError};
use super::scoring::{estimate_recovery_probability, ScoringRequest};
use super::service::{CaseService, NewAgency, NewCase, PaymentRequest, ServiceError};
use super::sla::SlaMonitorError;
use super::sweep::SweepError;

/// Actor recorded when a request does not name one.
const API_ACTOR: &str = "api";

/// Router builder exposing case, agency, scoring, and sweep endpoints.
pub fn case_router(service: Arc<CaseService>) -> Router {
    Router::new()
        .route("/api/v1/cases", get(list_cases_handler).post(create_case_handler))
        .route(
            "/api/v1/cases/:case_id",
            get(get_case_handler).delete(delete_case_handler),
        )
        .route("/api/v1/cases/:case_id/status", put(update_status_handler))
        .route("/api/v1/cases/:case_id/audit", get(audit_trail_handler))
        .route("/api/v1/payments", post(record_payment_handler))
        .route(
            "/api/v1/dcas",
            get(list_agencies_handler).post(create_agency_handler),
        )
        .route(
            "/api/v1/dcas/:dca_id",
            axum::routing::delete(delete_agency_handler),
        )
        .route("/api/v1/ml/prioritize-cases", post(prioritize_handler))
        .route("/api/v1/ml/recommend-dca", post(recommend_handler))
        .route("/api/v1/ml/predict-recovery", post(predict_recovery_handler))
        .route("/api/v1/automation/run", post(run_automation_handler))
        .route("/api/v1/sla/run", post(run_sla_handler))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListCasesParams {
    pub(crate) status: Option<String>,
    pub(crate) dca_id: Option<String>,
    pub(crate) owner_id: Option<String>,
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusUpdateRequest {
    pub(crate) status: CaseStatus,
    #[serde(default)]
    pub(crate) actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PrioritizeRequest {
    pub(crate) cases: Vec<ScoringRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PredictRecoveryRequest {
    #[serde(default)]
    pub(crate) days_overdue: Option<u32>,
    #[serde(default)]
    pub(crate) history_score: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Listing<T> {
    count: usize,
    data: Vec<T>,
}

impl<T> From<Vec<T>> for Listing<T> {
    fn from(data: Vec<T>) -> Self {
        Self {
            count: data.len(),
            data,
        }
    }
}

pub(crate) async fn list_cases_handler(
    State(service): State<Arc<CaseService>>,
    Query(params): Query<ListCasesParams>,
) -> Response {
    let status = match params.status.as_deref().map(CaseStatus::from_label) {
        Some(None) => {
            let payload = json!({ "error": "unknown case status" });
            return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
        }
        Some(status) => status,
        None => None,
    };
    let query = CaseQuery {
        status,
        agency_id: params.dca_id.map(AgencyId),
        owner_id: params.owner_id,
        limit: params.limit,
    };

    match service.list_cases(query) {
        Ok(cases) => (StatusCode::OK, Json(Listing::from(cases))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_case_handler(
    State(service): State<Arc<CaseService>>,
    Json(request): Json<NewCase>,
) -> Response {
    match service.create_case(request, Utc::now()) {
        Ok(case) => (StatusCode::CREATED, Json(case)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_case_handler(
    State(service): State<Arc<CaseService>>,
    Path(case_id): Path<String>,
) -> Response {
    match service.get_case(&CaseId(case_id)) {
        Ok(case) => (StatusCode::OK, Json(case)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn delete_case_handler(
    State(service): State<Arc<CaseService>>,
    Path(case_id): Path<String>,
) -> Response {
    match service.delete_case(&CaseId(case_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_status_handler(
    State(service): State<Arc<CaseService>>,
    Path(case_id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> Response {
    let actor = request.actor.as_deref().unwrap_or(API_ACTOR);
    match service.update_status(&CaseId(case_id), request.status, actor, Utc::now()) {
        Ok(case) => (StatusCode::OK, Json(case)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn audit_trail_handler(
    State(service): State<Arc<CaseService>>,
    Path(case_id): Path<String>,
) -> Response {
    match service.audit_trail(&CaseId(case_id)) {
        Ok(entries) => (StatusCode::OK, Json(Listing::from(entries))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn record_payment_handler(
    State(service): State<Arc<CaseService>>,
    Json(request): Json<PaymentRequest>,
) -> Response {
    match service.record_payment(request, API_ACTOR, Utc::now()) {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_agencies_handler(State(service): State<Arc<CaseService>>) -> Response {
    match service.list_agencies() {
        Ok(agencies) => (StatusCode::OK, Json(Listing::from(agencies))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_agency_handler(
    State(service): State<Arc<CaseService>>,
    Json(request): Json<NewAgency>,
) -> Response {
    match service.create_agency(request, Utc::now()) {
        Ok(agency) => (StatusCode::CREATED, Json(agency)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn delete_agency_handler(
    State(service): State<Arc<CaseService>>,
    Path(dca_id): Path<String>,
) -> Response {
    match service.delete_agency(&AgencyId(dca_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn prioritize_handler(
    State(service): State<Arc<CaseService>>,
    Json(request): Json<PrioritizeRequest>,
) -> Response {
    match service.prioritize(request.cases) {
        Ok(prioritized) => (StatusCode::OK, Json(Listing::from(prioritized))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn recommend_handler(
    State(service): State<Arc<CaseService>>,
    Json(criteria): Json<MatchingCriteria>,
) -> Response {
    match service.recommend(&criteria) {
        Ok(ranked) => {
            let payload = match ranked.first() {
                Some(best) => json!({ "recommended_dca": best, "candidates": ranked }),
                None => json!({
                    "recommended_dca": serde_json::Value::Null,
                    "message": "No suitable DCA found",
                }),
            };
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn predict_recovery_handler(
    Json(request): Json<PredictRecoveryRequest>,
) -> Response {
    let probability = estimate_recovery_probability(request.days_overdue, request.history_score);
    let payload = json!({ "recovery_probability": probability });
    (StatusCode::OK, Json(payload)).into_response()
}

pub(crate) async fn run_automation_handler(State(service): State<Arc<CaseService>>) -> Response {
    let outcome = tokio::task::spawn_blocking(move || service.run_automation(Utc::now())).await;
    match outcome {
        Ok(Ok(summary)) => (StatusCode::OK, Json(summary)).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(join_error) => internal_error(join_error.to_string()),
    }
}

pub(crate) async fn run_sla_handler(State(service): State<Arc<CaseService>>) -> Response {
    let outcome = tokio::task::spawn_blocking(move || service.run_sla_monitor(Utc::now())).await;
    match outcome {
        Ok(Ok(summary)) => (StatusCode::OK, Json(summary)).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(join_error) => internal_error(join_error.to_string()),
    }
}

fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::Scoring(_) | ServiceError::UnknownAgency(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        ServiceError::Repository(RepositoryError::Conflict)
        | ServiceError::Repository(RepositoryError::VersionConflict { .. })
        | ServiceError::AgencyInUse { .. }
        | ServiceError::Automation(AutomationError::Sweep(SweepError::AlreadyRunning))
        | ServiceError::Sla(SlaMonitorError::Sweep(SweepError::AlreadyRunning)) => {
            StatusCode::CONFLICT
        }
        ServiceError::Repository(RepositoryError::Unavailable(_))
        | ServiceError::DanglingAgency(_)
        | ServiceError::Automation(_)
        | ServiceError::Sla(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: ServiceError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, "request failed");
    }
    let payload = json!({ "error": err.to_string() });
    (status, Json(payload)).into_response()
}

fn internal_error(message: String) -> Response {
    error!(error = %message, "sweep task aborted");
    let payload = json!({ "error": message });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
