use meter_client::domain::{BillingRecords, SubMeter, SubMeterReadingRow};
use serde::Serialize;
use time::Date;

use crate::allocation::{compute_billing, plan_break_points, BillingRequest, BillingStatement};
use crate::error::{BillingError, BillingField};

/// Where sub-meters and their readings come from.
#[async_trait::async_trait]
pub trait ReadingSource: Send + Sync {
    /// Readings of every sub-meter of `main_meter_id` in `[date_min,
    /// date_max]` plus the adjacent readings on both sides, newest first.
    async fn sub_meter_readings(
        &self,
        main_meter_id: i32,
        date_min: Date,
        date_max: Date,
    ) -> Result<Vec<SubMeterReadingRow>, BillingError>;

    async fn list_sub_meters(&self, main_meter_id: i32) -> Result<Vec<SubMeter>, BillingError>;
}

/// Where computed billings are stored.
#[async_trait::async_trait]
pub trait BillingSink: Send + Sync {
    /// Store the whole record set atomically and return the new main billing id.
    async fn persist(&self, records: &BillingRecords) -> Result<i32, BillingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingMode {
    /// Compute and return the statement only.
    Calculate,
    /// Compute and persist.
    Create,
}

impl BillingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calculate => "calculate",
            Self::Create => "create",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BillingOutcome {
    pub statement: BillingStatement,
    /// Id of the stored main billing; `None` for previews.
    pub billing_id: Option<i32>,
}

pub struct BillingPipeline<S, K> {
    pub source: S,
    pub sink: K,
    /// Upper bound on the number of periods billed in one request.
    pub max_billing_periods: usize,
}

impl<S, K> BillingPipeline<S, K>
where
    S: ReadingSource,
    K: BillingSink,
{
    pub fn new(source: S, sink: K, max_billing_periods: usize) -> Self {
        Self {
            source,
            sink,
            max_billing_periods,
        }
    }

    pub async fn run(
        &self,
        request: &BillingRequest,
        mode: BillingMode,
    ) -> Result<BillingOutcome, BillingError> {
        let result = self.execute(request, mode).await;
        if let Err(e) = &result {
            match e {
                BillingError::Input { field, message } => {
                    metrics::counter!("billing_input_rejected_total").increment(1);
                    tracing::info!(
                        main_meter_id = request.main_meter_id,
                        field = %field,
                        message = %message,
                        "billing request rejected"
                    );
                }
                BillingError::NoSubMeter => {
                    metrics::counter!("billing_no_sub_meter_total").increment(1);
                    tracing::info!(
                        main_meter_id = request.main_meter_id,
                        "no sub meter readings for billing"
                    );
                }
                other => {
                    tracing::error!(
                        main_meter_id = request.main_meter_id,
                        error = %other,
                        "billing failed"
                    );
                }
            }
        }
        result
    }

    async fn execute(
        &self,
        request: &BillingRequest,
        mode: BillingMode,
    ) -> Result<BillingOutcome, BillingError> {
        if request.periods.len() > self.max_billing_periods {
            return Err(BillingError::input(
                BillingField::Periods,
                format!(
                    "At most {} billing periods can be billed at once.",
                    self.max_billing_periods
                ),
            ));
        }

        let plan = plan_break_points(&request.periods, request.max_day_diff)?;
        let rows = self
            .source
            .sub_meter_readings(request.main_meter_id, plan.window.min, plan.window.max)
            .await?;
        let sub_meters = self.source.list_sub_meters(request.main_meter_id).await?;

        let statement = compute_billing(request, &plan, &rows, &sub_meters)?;

        metrics::counter!("billing_computations_total", "mode" => mode.as_str()).increment(1);
        metrics::counter!("billing_supplementary_break_points_total")
            .increment(statement.supplementary_break_points as u64);
        metrics::counter!("billing_meter_rollbacks_total")
            .increment(statement.meter_rollbacks as u64);
        metrics::histogram!("billing_break_points_per_computation")
            .record(statement.break_points as f64);

        tracing::info!(
            main_meter_id = request.main_meter_id,
            mode = mode.as_str(),
            periods = request.periods.len(),
            sub_meters = statement.records.sub_billings.len(),
            break_points = statement.break_points,
            fingerprint = %statement.fingerprint,
            "computed billing"
        );

        let billing_id = match mode {
            BillingMode::Calculate => None,
            BillingMode::Create => {
                let id = self.sink.persist(&statement.records).await?;
                tracing::info!(main_meter_id = request.main_meter_id, billing_id = id, "stored billing");
                Some(id)
            }
        };

        Ok(BillingOutcome {
            statement,
            billing_id,
        })
    }
}
