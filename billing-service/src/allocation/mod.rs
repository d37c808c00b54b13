//! Billing allocation: splits a main meter's consumption and prices over its
//! sub-meters, break point by break point.
//!
//! Everything here is synchronous and works on data that was already fetched.

pub mod aggregator;
pub mod break_points;
pub mod engine;
pub mod interpolation;
pub mod period;
pub mod resolver;

pub use aggregator::{aggregate, fingerprint, BillingStatement};
pub use break_points::{plan_break_points, BillingWindow, BreakPoint, BreakPointPlan, BreakPoints};
pub use engine::{allocate, AllocationStep, PeriodAllocation, Share};
pub use interpolation::{interpolate, Reading};
pub use period::{BillingPeriodInput, BillingRequest};
pub use resolver::{resolve_readings, ReadingMatrix, ResolvedReadings};

use meter_client::domain::{SubMeter, SubMeterReadingRow};

use crate::error::BillingError;

/// Resolve, allocate and price one billing for readings fetched over
/// `plan.window`.
pub fn compute_billing(
    request: &BillingRequest,
    plan: &BreakPointPlan,
    rows: &[SubMeterReadingRow],
    sub_meters: &[SubMeter],
) -> Result<BillingStatement, BillingError> {
    let resolved = resolve_readings(plan, rows)?;
    let allocations = allocate(&request.periods, &resolved)?;
    aggregate(request, &resolved, &allocations, sub_meters)
}
