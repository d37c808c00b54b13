use anyhow::{bail, Context, Result};
use billing_service::{
    config::BillingConfig,
    observability,
    pipeline::{BillingMode, BillingPipeline},
    sinks::PreviewOnlySink,
    sources::ReadingCsvFile,
    BillingRequest,
};
use std::{env, fs};

/// Preview a billing from a CSV reading history, without a database.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing(None);

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: calculate_billing_csv <readings.csv> <request.json>");
    }

    let body = fs::read_to_string(&args[2])
        .with_context(|| format!("failed to read billing request {}", args[2]))?;
    let request = BillingRequest::from_json(&body)?;
    let history = ReadingCsvFile::new(&args[1]).load(request.main_meter_id)?;

    let pipeline = BillingPipeline::new(
        history,
        PreviewOnlySink,
        BillingConfig::default().max_billing_periods,
    );
    let outcome = pipeline.run(&request, BillingMode::Calculate).await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
