use crate::infra::{demo_snapshot, Snapshot};
use chrono::{DateTime, Utc};
use clap::Args;
use dca_triage::config::AppConfig;
use dca_triage::error::AppError;
use dca_triage::telemetry;
use dca_triage::workflows::cases::{
    CaseQuery, CaseService, InMemoryStores, ServiceError, SlaPolicy, SweepControl,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluation instant (RFC 3339). Defaults to now.
    #[arg(long, value_parser = crate::infra::parse_timestamp)]
    pub(crate) now: Option<DateTime<Utc>>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct SweepArgs {
    /// JSON document with `agencies` and `cases` arrays. Defaults to the demo portfolio.
    #[arg(long)]
    pub(crate) snapshot: Option<PathBuf>,
    /// Evaluation instant (RFC 3339). Defaults to now.
    #[arg(long, value_parser = crate::infra::parse_timestamp)]
    pub(crate) now: Option<DateTime<Utc>>,
    /// Stop the sweep after this many seconds, overriding SWEEP_BUDGET_SECS.
    #[arg(long)]
    pub(crate) budget_secs: Option<u64>,
}

pub(crate) fn run_automation(args: SweepArgs) -> Result<(), AppError> {
    let (service, now) = sweep_service(args)?;
    let summary = service.run_automation(now)?;
    print_json(&summary);
    Ok(())
}

pub(crate) fn run_sla(args: SweepArgs) -> Result<(), AppError> {
    let (service, now) = sweep_service(args)?;
    let summary = service.run_sla_monitor(now)?;
    print_json(&summary);
    Ok(())
}

fn sweep_service(args: SweepArgs) -> Result<(CaseService, DateTime<Utc>), AppError> {
    let SweepArgs {
        snapshot,
        now,
        budget_secs,
    } = args;

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let now = now.unwrap_or_else(Utc::now);
    let snapshot = match snapshot {
        Some(path) => Snapshot::from_path(&path)?,
        None => demo_snapshot(now),
    };
    let budget = budget_secs.map(Duration::from_secs).or(config.sweeps.budget);

    let stores = snapshot.into_stores()?;
    let service = CaseService::new(stores.case_stores(), config.sweeps.sla)
        .with_sweep_control(SweepControl::new(budget));
    Ok((service, now))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("summary unavailable: {err}"),
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let now = args.now.unwrap_or_else(Utc::now);
    let stores = demo_snapshot(now).into_stores()?;
    let service = CaseService::new(stores.case_stores(), SlaPolicy::default());

    println!("DCA triage demo (evaluated {})", now.to_rfc3339());
    render_portfolio(&service)?;

    let automation = service.run_automation(now)?;
    println!(
        "\nAuto-assignment: {} assigned | {} newly scored | {} without a match | {} failed",
        automation.assigned_count, automation.scored, automation.unmatched, automation.failed
    );

    let sla = service.run_sla_monitor(now)?;
    println!(
        "SLA monitor: {} breached | {} at risk | {} checked",
        sla.breach_count, sla.at_risk_count, sla.processed
    );

    println!("\nAfter sweeps");
    render_portfolio(&service)?;
    render_breach_audit(&service, &stores)?;

    Ok(())
}

fn render_portfolio(service: &CaseService) -> Result<(), AppError> {
    let cases = service.list_cases(CaseQuery::default())?;
    println!("Cases:");
    for case in &cases {
        let priority = case
            .priority_score
            .map(|score| score.to_string())
            .unwrap_or_else(|| "-".to_string());
        let agency = case
            .assigned_agency
            .as_ref()
            .map(|id| id.0.as_str())
            .unwrap_or("unassigned");
        println!(
            "  - {} | {} | {:.2} {} | {} days | priority {} | {} | SLA {} | {}",
            case.id,
            case.debtor.name,
            case.amount,
            case.currency,
            case.aging,
            priority,
            case.status.label(),
            case.sla_status.label(),
            agency
        );
    }

    println!("Agencies:");
    for agency in service.list_agencies()? {
        let performance = agency
            .performance_score
            .map(|score| format!("{score:.0}"))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "  - {} ({}) | performance {} | {} active cases",
            agency.name,
            agency.id,
            performance,
            agency.active_cases.unwrap_or(0)
        );
    }
    Ok(())
}

fn render_breach_audit(service: &CaseService, stores: &InMemoryStores) -> Result<(), AppError> {
    let breached = stores.sla_tracking.records().map_err(ServiceError::from)?;
    if breached.is_empty() {
        println!("\nNo SLA breaches recorded");
        return Ok(());
    }

    println!("\nSLA breaches:");
    for record in breached {
        let deadline = record
            .deadline
            .map(|deadline| deadline.to_rfc3339())
            .unwrap_or_else(|| "n/a".to_string());
        println!("  - {} (deadline {})", record.case_id, deadline);
        for entry in service.audit_trail(&record.case_id)? {
            println!("      {} by {}: {}", entry.action, entry.actor, entry.detail);
        }
    }
    Ok(())
}
