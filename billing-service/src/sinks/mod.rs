pub mod postgres;

pub use postgres::PgBillingSink;

use meter_client::domain::BillingRecords;

use crate::error::BillingError;
use crate::pipeline::BillingSink;

/// Sink for tools that only ever preview billings.
pub struct PreviewOnlySink;

#[async_trait::async_trait]
impl BillingSink for PreviewOnlySink {
    async fn persist(&self, _records: &BillingRecords) -> Result<i32, BillingError> {
        Err(BillingError::Internal(
            "this tool cannot store billings".to_string(),
        ))
    }
}
