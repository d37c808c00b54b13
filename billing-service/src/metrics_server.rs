use std::net::SocketAddr;

use anyhow::Context;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

fn describe() {
    metrics::describe_counter!(
        "billing_computations_total",
        "Billings computed, labelled by mode (calculate or create)"
    );
    metrics::describe_counter!(
        "billing_input_rejected_total",
        "Billing requests rejected for invalid input"
    );
    metrics::describe_counter!(
        "billing_no_sub_meter_total",
        "Billing requests for main meters without sub meter readings"
    );
    metrics::describe_counter!(
        "billing_persist_errors_total",
        "Billing transactions that failed and were rolled back"
    );
    metrics::describe_counter!(
        "billing_persisted_records_total",
        "Billing rows written"
    );
    metrics::describe_counter!(
        "billing_supplementary_break_points_total",
        "Break points added for readings away from period boundaries"
    );
    metrics::describe_counter!(
        "billing_meter_rollbacks_total",
        "Sub meter readings lower than an earlier reading"
    );
    metrics::describe_counter!(
        "billing_csv_parse_errors_total",
        "Unparseable rows in CSV reading files"
    );
    metrics::describe_histogram!(
        "billing_break_points_per_computation",
        "Break points walked per billing computation"
    );
}

/// Install the Prometheus recorder and serve `/metrics` on `bind_addr`.
pub fn init(bind_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .with_context(|| format!("invalid metrics bind address '{bind_addr}'"))?;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;
    // A second init keeps the first handle.
    let _ = PROM_HANDLE.set(handle);
    describe();

    tokio::spawn(async move {
        let app = Router::new().route("/metrics", get(metrics_handler));

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!(%addr, "serving metrics");
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind metrics listener");
            }
        }
    });

    Ok(())
}

async fn metrics_handler() -> String {
    PROM_HANDLE.get().map(|h| h.render()).unwrap_or_default()
}
