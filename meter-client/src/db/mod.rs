pub mod billing_queries;
pub mod sub_meter_queries;
