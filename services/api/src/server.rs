use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_case_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use dca_triage::config::AppConfig;
use dca_triage::error::AppError;
use dca_triage::telemetry;
use dca_triage::workflows::cases::{CaseService, InMemoryStores, SweepControl};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let stores = InMemoryStores::default();
    let case_service = Arc::new(
        CaseService::new(stores.case_stores(), config.sweeps.sla.clone())
            .with_sweep_control(SweepControl::new(config.sweeps.budget)),
    );

    let app = with_case_routes(case_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        priority_threshold = config.sweeps.sla.priority_threshold,
        aging_threshold_days = config.sweeps.sla.aging_threshold_days,
        "dca triage service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
