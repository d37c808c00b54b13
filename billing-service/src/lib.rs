pub mod allocation;
pub mod config;
pub mod error;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;

pub use allocation::{compute_billing, BillingRequest, BillingStatement};
pub use error::{BillingError, BillingField};
pub use pipeline::{BillingMode, BillingOutcome, BillingPipeline};
