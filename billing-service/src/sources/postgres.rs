use meter_client::db::sub_meter_queries;
use meter_client::domain::{SubMeter, SubMeterReadingRow};
use sqlx::PgPool;
use time::Date;

use crate::error::BillingError;
use crate::pipeline::ReadingSource;

/// Reads sub-meters and their readings from the application database.
pub struct PgReadingSource {
    pool: PgPool,
}

impl PgReadingSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReadingSource for PgReadingSource {
    async fn sub_meter_readings(
        &self,
        main_meter_id: i32,
        date_min: Date,
        date_max: Date,
    ) -> Result<Vec<SubMeterReadingRow>, BillingError> {
        let rows = sub_meter_queries::sub_meter_readings(&self.pool, main_meter_id, date_min, date_max)
            .await
            .map_err(|e| BillingError::Storage(format!("{e:#}")))?;
        tracing::debug!(main_meter_id, rows = rows.len(), "fetched sub meter readings");
        Ok(rows)
    }

    async fn list_sub_meters(&self, main_meter_id: i32) -> Result<Vec<SubMeter>, BillingError> {
        sub_meter_queries::list_sub_meters(&self.pool, main_meter_id)
            .await
            .map_err(|e| BillingError::Storage(format!("{e:#}")))
    }
}
