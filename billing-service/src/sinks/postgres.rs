use meter_client::db::billing_queries;
use meter_client::domain::BillingRecords;
use sqlx::PgPool;

use crate::error::BillingError;
use crate::pipeline::BillingSink;

/// Stores billings in one transaction. Failures are reported, never retried.
pub struct PgBillingSink {
    pool: PgPool,
}

impl PgBillingSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BillingSink for PgBillingSink {
    async fn persist(&self, records: &BillingRecords) -> Result<i32, BillingError> {
        match billing_queries::insert_billing_records(&self.pool, records).await {
            Ok(id) => {
                metrics::counter!("billing_persisted_records_total").increment(
                    (1 + records.main_periods.len()
                        + records.sub_billings.len()
                        + records.sub_periods.len()) as u64,
                );
                Ok(id)
            }
            Err(e) => {
                metrics::counter!("billing_persist_errors_total").increment(1);
                tracing::error!(
                    main_meter_id = records.main_billing.main_meter_id,
                    error = %format!("{e:#}"),
                    "failed to store billing, transaction rolled back"
                );
                Err(BillingError::Storage(format!("{e:#}")))
            }
        }
    }
}
