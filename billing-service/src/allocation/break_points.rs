use std::collections::BTreeMap;

use time::{Date, Duration};

use super::period::BillingPeriodInput;
use crate::error::{BillingError, BillingField};

/// A date the allocation needs a reading for, with the window of real
/// readings allowed to stand in for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakPoint {
    pub min: Date,
    pub actual: Date,
    pub max: Date,
}

impl BreakPoint {
    pub fn around(actual: Date, day_diff: u8) -> Self {
        let diff = Duration::days(i64::from(day_diff));
        Self {
            min: actual.saturating_sub(diff),
            actual,
            max: actual.saturating_add(diff),
        }
    }

    pub fn brackets(&self, date: Date) -> bool {
        self.min <= date && date <= self.max
    }
}

/// Break points keyed by their actual date, so no two share one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakPoints {
    by_actual: BTreeMap<Date, BreakPoint>,
}

impl BreakPoints {
    /// Insert a break point. A break point already sitting on the same
    /// actual date is widened to cover both windows. Returns whether the
    /// actual date was new.
    pub fn insert(&mut self, bp: BreakPoint) -> bool {
        match self.by_actual.get_mut(&bp.actual) {
            Some(existing) => {
                existing.min = existing.min.min(bp.min);
                existing.max = existing.max.max(bp.max);
                false
            }
            None => {
                self.by_actual.insert(bp.actual, bp);
                true
            }
        }
    }

    pub fn contains_actual(&self, actual: Date) -> bool {
        self.by_actual.contains_key(&actual)
    }

    pub fn merge(&mut self, other: &BreakPoints) {
        for bp in other.by_actual.values() {
            self.insert(*bp);
        }
    }

    /// Latest first.
    pub fn descending(&self) -> Vec<BreakPoint> {
        self.by_actual.values().rev().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_actual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_actual.is_empty()
    }
}

/// Date range readings are fetched for; supplementary break points must also
/// fall inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingWindow {
    pub min: Date,
    pub max: Date,
}

impl BillingWindow {
    pub fn contains(&self, date: Date) -> bool {
        self.min <= date && date <= self.max
    }
}

#[derive(Debug, Clone)]
pub struct BreakPointPlan {
    pub day_diff: u8,
    pub break_points: BreakPoints,
    pub window: BillingWindow,
}

/// Validate the submitted periods and derive the primary break points: one at
/// every period end and one at every shifted period begin.
///
/// Periods are given earliest first and must be contiguous.
pub fn plan_break_points(
    periods: &[BillingPeriodInput],
    day_diff: u8,
) -> Result<BreakPointPlan, BillingError> {
    let (Some(earliest), Some(latest)) = (periods.first(), periods.last()) else {
        return Err(BillingError::input(
            BillingField::Periods,
            "No billing period provided.",
        ));
    };

    let mut break_points = BreakPoints::default();
    let diff = Duration::days(i64::from(day_diff));

    for (i, period) in periods.iter().enumerate().rev() {
        if let Some(later) = periods.get(i + 1) {
            if period.end_date.next_day() != Some(later.begin_date) {
                return Err(BillingError::input(
                    BillingField::BeginDate(i + 1),
                    "Begin date must follow previous billing period's end date.",
                ));
            }
        }
        if period.end_date < period.begin_date {
            return Err(BillingError::input(
                BillingField::EndDate(i),
                "End date must be greater or equal to begin date.",
            ));
        }

        break_points.insert(BreakPoint::around(period.end_date, day_diff));
        let shifted_begin = period.shifted_begin();
        break_points.insert(BreakPoint {
            min: shifted_begin.saturating_sub(diff),
            actual: shifted_begin,
            max: period.begin_date.saturating_add(diff),
        });
    }

    let window = BillingWindow {
        min: earliest.shifted_begin().saturating_sub(diff),
        max: latest.end_date,
    };

    tracing::debug!(
        break_points = ?break_points.descending(),
        window_min = %window.min,
        window_max = %window.max,
        "planned billing break points"
    );

    Ok(BreakPointPlan {
        day_diff,
        break_points,
        window,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn period(begin: Date, end: Date) -> BillingPeriodInput {
        BillingPeriodInput {
            begin_date: begin,
            end_date: end,
            begin_reading_value: 0.0,
            end_reading_value: 10.0,
            consumed_energy_price: 5.0,
            service_price: None,
        }
    }

    #[test]
    fn single_period_yields_end_and_shifted_begin() {
        let plan = plan_break_points(&[period(date!(2024 - 01 - 01), date!(2024 - 01 - 31))], 3).unwrap();
        assert_eq!(
            plan.break_points.descending(),
            vec![
                BreakPoint {
                    min: date!(2024 - 01 - 28),
                    actual: date!(2024 - 01 - 31),
                    max: date!(2024 - 02 - 03),
                },
                BreakPoint {
                    min: date!(2023 - 12 - 28),
                    actual: date!(2023 - 12 - 31),
                    max: date!(2024 - 01 - 04),
                },
            ]
        );
        assert_eq!(plan.window.min, date!(2023 - 12 - 28));
        assert_eq!(plan.window.max, date!(2024 - 01 - 31));
    }

    #[test]
    fn contiguous_periods_share_a_widened_break_point() {
        let plan = plan_break_points(
            &[
                period(date!(2024 - 01 - 01), date!(2024 - 01 - 31)),
                period(date!(2024 - 02 - 01), date!(2024 - 02 - 29)),
            ],
            2,
        )
        .unwrap();
        let bps = plan.break_points.descending();
        assert_eq!(bps.len(), 3);
        assert_eq!(
            bps[1],
            BreakPoint {
                min: date!(2024 - 01 - 29),
                actual: date!(2024 - 01 - 31),
                max: date!(2024 - 02 - 03),
            }
        );
        assert!(bps.windows(2).all(|w| w[0].actual > w[1].actual));
    }

    #[test]
    fn rejects_empty_request() {
        let err = plan_break_points(&[], 3).unwrap_err();
        assert!(matches!(
            err,
            BillingError::Input {
                field: BillingField::Periods,
                ..
            }
        ));
    }

    #[test]
    fn rejects_gap_between_periods_on_later_begin_date() {
        let err = plan_break_points(
            &[
                period(date!(2024 - 01 - 01), date!(2024 - 01 - 31)),
                period(date!(2024 - 02 - 02), date!(2024 - 02 - 29)),
            ],
            3,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BillingError::Input {
                field: BillingField::BeginDate(1),
                ..
            }
        ));
    }

    #[test]
    fn rejects_end_before_begin() {
        let err = plan_break_points(&[period(date!(2024 - 01 - 10), date!(2024 - 01 - 09))], 3).unwrap_err();
        assert!(matches!(
            err,
            BillingError::Input {
                field: BillingField::EndDate(0),
                ..
            }
        ));
    }

    #[test]
    fn one_day_period_is_accepted() {
        let plan = plan_break_points(&[period(date!(2024 - 01 - 10), date!(2024 - 01 - 10))], 0).unwrap();
        assert_eq!(plan.break_points.len(), 2);
        assert_eq!(plan.window.min, date!(2024 - 01 - 09));
    }
}
