use anyhow::{bail, Context, Result};
use billing_service::{
    config::AppConfig,
    metrics_server, observability,
    pipeline::{BillingMode, BillingPipeline},
    sinks::PgBillingSink,
    sources::PgReadingSource,
    BillingRequest,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, fs, process::ExitCode};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args: Vec<String> = env::args().skip(1).collect();
    let calculate_only = args.iter().any(|a| a == "--calculate-only");
    let Some(request_path) = args.iter().find(|a| !a.starts_with("--")) else {
        bail!("usage: billing-service <request.json> [--calculate-only]");
    };

    let cfg = AppConfig::load()?;
    observability::init_tracing(cfg.log_filter());

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let body = fs::read_to_string(request_path)
        .with_context(|| format!("failed to read billing request {request_path}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.postgres.max_connections)
        .connect(&cfg.postgres.uri)
        .await?;

    // Schema is expected to be applied out-of-band via `meter-client/sql/schema/*.sql`.
    let pipeline = BillingPipeline::new(
        PgReadingSource::new(pool.clone()),
        PgBillingSink::new(pool.clone()),
        cfg.billing.max_billing_periods,
    );
    let mode = if calculate_only {
        BillingMode::Calculate
    } else {
        BillingMode::Create
    };

    let result = match BillingRequest::from_json(&body) {
        Ok(request) => pipeline.run(&request, mode).await,
        Err(e) => Err(e),
    };
    pool.close().await;

    match result {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_user_facing() => {
            eprintln!("{e}");
            Ok(ExitCode::from(2))
        }
        Err(e) => Err(e.into()),
    }
}
