use std::collections::{BTreeMap, BTreeSet};

use time::Date;

use super::period::{days_between, BillingPeriodInput};
use super::resolver::{ReadingMatrix, ResolvedReadings};
use crate::error::BillingError;

/// What one sub-meter accumulated over one main-meter billing period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Share {
    pub energy_consumption: f64,
    pub consumed_energy_price: f64,
}

/// Consumption split between two neighbouring break points.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationStep {
    pub later: Date,
    pub at: Date,
    pub main_meter_consumption: f64,
    /// Sub-meters without a usable measured delta in this step.
    pub invalid: BTreeSet<i32>,
    pub shares: BTreeMap<i32, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodAllocation {
    /// Position of the period in the request, earliest first.
    pub period_index: usize,
    pub shares: BTreeMap<i32, Share>,
    pub service_price_per_sub_meter: Option<f64>,
    pub steps: Vec<AllocationStep>,
}

/// Running state for the main-meter period currently being walked.
struct PeriodWalk {
    period_index: usize,
    shifted_begin: Date,
    begin_value: f64,
    value_per_day: f64,
    /// Main-meter value at the previous (later) break point.
    later_value: f64,
    price_per_unit: Option<f64>,
    consumed_energy_price: f64,
    service_price: Option<f64>,
    shares: BTreeMap<i32, Share>,
    steps: Vec<AllocationStep>,
}

impl PeriodWalk {
    fn new(period_index: usize, period: &BillingPeriodInput, sub_meter_ids: &BTreeSet<i32>) -> Self {
        let consumption = period.energy_consumption();
        let days = period.days();
        Self {
            period_index,
            shifted_begin: period.shifted_begin(),
            begin_value: period.begin_reading_value,
            value_per_day: if days > 0.0 { consumption / days } else { 0.0 },
            later_value: period.end_reading_value,
            price_per_unit: (consumption != 0.0).then(|| period.consumed_energy_price / consumption),
            consumed_energy_price: period.consumed_energy_price,
            service_price: period.service_price,
            shares: sub_meter_ids.iter().map(|id| (*id, Share::default())).collect(),
            steps: Vec::new(),
        }
    }

    fn main_meter_value(&self, at: Date) -> f64 {
        if at > self.shifted_begin {
            self.begin_value + self.value_per_day * days_between(at, self.shifted_begin)
        } else {
            self.begin_value
        }
    }

    fn step(&mut self, later: Date, at: Date, matrix: &ReadingMatrix, sub_meter_ids: &BTreeSet<i32>) {
        let main_value = self.main_meter_value(at);
        let main_meter_consumption = self.later_value - main_value;
        self.later_value = main_value;

        let mut invalid = BTreeSet::new();
        let mut measured = BTreeMap::new();
        let mut sum = 0.0;
        let mut later_sum = 0.0;
        for &id in sub_meter_ids {
            match (matrix.reading(at, id).value(), matrix.reading(later, id).value()) {
                (Some(value), Some(later_value)) if value <= later_value => {
                    sum += value;
                    later_sum += later_value;
                    measured.insert(id, later_value - value);
                }
                _ => {
                    invalid.insert(id);
                }
            }
        }

        // Losses, metering error and unreadable sub-meters all end up here.
        let residual = main_meter_consumption - (later_sum - sum);
        let shares: BTreeMap<i32, f64> = if invalid.is_empty() {
            let addendum = residual / sub_meter_ids.len() as f64;
            measured
                .into_iter()
                .map(|(id, delta)| (id, delta + addendum))
                .collect()
        } else {
            let addendum = residual / invalid.len() as f64;
            sub_meter_ids
                .iter()
                .map(|id| (*id, measured.get(id).copied().unwrap_or(addendum)))
                .collect()
        };

        for (id, consumption) in &shares {
            let share = self.shares.entry(*id).or_default();
            share.energy_consumption += consumption;
            if let Some(price_per_unit) = self.price_per_unit {
                share.consumed_energy_price += consumption * price_per_unit;
            }
        }

        self.steps.push(AllocationStep {
            later,
            at,
            main_meter_consumption,
            invalid,
            shares,
        });
    }

    fn finish(mut self) -> PeriodAllocation {
        let sub_meter_count = self.shares.len() as f64;
        if self.price_per_unit.is_none() && sub_meter_count > 0.0 {
            // Nothing consumed: the energy price cannot follow consumption.
            let even = self.consumed_energy_price / sub_meter_count;
            for share in self.shares.values_mut() {
                share.consumed_energy_price = even;
            }
        }
        PeriodAllocation {
            period_index: self.period_index,
            service_price_per_sub_meter: self
                .service_price
                .filter(|_| sub_meter_count > 0.0)
                .map(|price| price / sub_meter_count),
            shares: self.shares,
            steps: self.steps,
        }
    }
}

/// Split every period's main-meter consumption across the sub-meters.
///
/// Break points are walked latest first; each period is closed when its
/// shifted begin is reached. Allocations are returned latest period first.
pub fn allocate(
    periods: &[BillingPeriodInput],
    resolved: &ResolvedReadings,
) -> Result<Vec<PeriodAllocation>, BillingError> {
    let sub_meter_ids = &resolved.sub_meter_ids;
    let mut pending = periods.iter().enumerate().rev();
    let mut current = pending
        .next()
        .map(|(index, period)| PeriodWalk::new(index, period, sub_meter_ids));
    let mut allocations = Vec::with_capacity(periods.len());

    let mut break_points = resolved.break_points.iter();
    let Some(mut later) = break_points.next().map(|bp| bp.actual) else {
        return Err(BillingError::Internal("no break points to allocate over".to_string()));
    };

    for bp in break_points {
        let Some(walk) = current.as_mut() else {
            break;
        };
        walk.step(later, bp.actual, &resolved.matrix, sub_meter_ids);
        if bp.actual == walk.shifted_begin {
            if let Some(done) = current.take() {
                allocations.push(done.finish());
            }
            current = pending
                .next()
                .map(|(index, period)| PeriodWalk::new(index, period, sub_meter_ids));
        }
        later = bp.actual;
    }

    if allocations.len() != periods.len() {
        return Err(BillingError::Internal(format!(
            "allocated {} of {} billing periods",
            allocations.len(),
            periods.len()
        )));
    }

    Ok(allocations)
}
