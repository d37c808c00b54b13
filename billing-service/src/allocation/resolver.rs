use std::collections::{BTreeMap, BTreeSet};

use meter_client::domain::SubMeterReadingRow;
use time::Date;

use super::break_points::{BillingWindow, BreakPoint, BreakPointPlan, BreakPoints};
use super::interpolation::{RawReading, Reading, SeriesCursor};
use crate::error::BillingError;

/// Readings per break point (by actual date) and sub-meter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingMatrix {
    cells: BTreeMap<Date, BTreeMap<i32, Reading>>,
}

impl ReadingMatrix {
    pub fn get(&self, actual: Date, sub_meter_id: i32) -> Option<Reading> {
        self.cells
            .get(&actual)
            .and_then(|column| column.get(&sub_meter_id))
            .copied()
    }

    pub fn set(&mut self, actual: Date, sub_meter_id: i32, reading: Reading) {
        self.cells
            .entry(actual)
            .or_default()
            .insert(sub_meter_id, reading);
    }

    pub fn set_if_missing(&mut self, actual: Date, sub_meter_id: i32, reading: Reading) {
        self.cells
            .entry(actual)
            .or_default()
            .entry(sub_meter_id)
            .or_insert(reading);
    }

    /// Reading of `sub_meter_id` at `actual`, treating a missing cell as
    /// invalid.
    pub fn reading(&self, actual: Date, sub_meter_id: i32) -> Reading {
        self.get(actual, sub_meter_id).unwrap_or(Reading::Invalid)
    }
}

/// Break points discovered while resolving the primary ones.
pub struct Supplements<'a> {
    primary: &'a BreakPoints,
    window: BillingWindow,
    day_diff: u8,
    found: BreakPoints,
    rollbacks: usize,
}

impl<'a> Supplements<'a> {
    pub fn new(primary: &'a BreakPoints, window: BillingWindow, day_diff: u8) -> Self {
        Self {
            primary,
            window,
            day_diff,
            found: BreakPoints::default(),
            rollbacks: 0,
        }
    }

    /// Whether a supplementary break point may be placed on `date`.
    pub fn admits(&self, date: Date) -> bool {
        !self.primary.contains_actual(date)
            && !self.found.contains_actual(date)
            && self.window.contains(date)
    }

    pub fn add(&mut self, date: Date) {
        self.found.insert(BreakPoint::around(date, self.day_diff));
    }

    pub fn propose(&mut self, date: Date) {
        if self.admits(date) {
            self.add(date);
        }
    }

    /// A sub-meter read `current` before `later` but with a higher value.
    /// Both dates get break points so the span between them can be handed to
    /// residual redistribution.
    pub fn rollback(&mut self, later: Date, current: Date) {
        self.rollbacks += 1;
        self.propose(later);
        self.propose(current);
    }
}

/// Per-computation resolver state: the matrix survives both passes, the
/// cursors are rebuilt for each.
#[derive(Debug, Default)]
struct ResolverState {
    matrix: ReadingMatrix,
    cursors: BTreeMap<i32, SeriesCursor>,
}

impl ResolverState {
    fn run_pass(
        &mut self,
        series: &[(i32, RawReading)],
        break_points: &[BreakPoint],
        mut supplements: Option<&mut Supplements<'_>>,
    ) {
        self.cursors.clear();
        for (sub_meter_id, raw) in series {
            let cursor = self.cursors.entry(*sub_meter_id).or_default();
            cursor.visit(
                *sub_meter_id,
                *raw,
                break_points,
                &mut self.matrix,
                supplements.as_deref_mut(),
            );
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedReadings {
    /// Primary and supplementary break points, latest first.
    pub break_points: Vec<BreakPoint>,
    pub matrix: ReadingMatrix,
    pub sub_meter_ids: BTreeSet<i32>,
    pub supplementary: Vec<BreakPoint>,
    pub rollbacks: usize,
}

/// Order rows newest first with the "no earlier data" markers last. Rows of
/// one sub-meter keep their relative order.
fn newest_first(rows: &[SubMeterReadingRow]) -> Vec<(i32, RawReading)> {
    let mut series: Vec<(i32, RawReading)> = rows
        .iter()
        .map(|row| (row.sub_meter_id, RawReading::from(row)))
        .collect();
    series.sort_by(|(_, a), (_, b)| b.date().cmp(&a.date()));
    series
}

/// Fill the reading matrix for every sub-meter at every break point.
///
/// The first pass resolves the primary break points and collects
/// supplementary ones; if there are any, a second pass resolves those.
pub fn resolve_readings(
    plan: &BreakPointPlan,
    rows: &[SubMeterReadingRow],
) -> Result<ResolvedReadings, BillingError> {
    if rows.is_empty() {
        return Err(BillingError::NoSubMeter);
    }

    let series = newest_first(rows);
    let sub_meter_ids: BTreeSet<i32> = series.iter().map(|(id, _)| *id).collect();
    let primary = plan.break_points.descending();

    let mut state = ResolverState::default();
    let mut supplements = Supplements::new(&plan.break_points, plan.window, plan.day_diff);
    state.run_pass(&series, &primary, Some(&mut supplements));

    let rollbacks = supplements.rollbacks;
    let found = supplements.found;
    let supplementary = found.descending();
    tracing::debug!(supplementary = ?supplementary, "supplementary break points");

    let mut merged = plan.break_points.clone();
    if !found.is_empty() {
        state.run_pass(&series, &supplementary, None);
        merged.merge(&found);
    }

    Ok(ResolvedReadings {
        break_points: merged.descending(),
        matrix: state.matrix,
        sub_meter_ids,
        supplementary,
        rollbacks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::break_points::plan_break_points;
    use crate::allocation::period::BillingPeriodInput;
    use time::macros::date;

    fn quarter_plan(day_diff: u8) -> BreakPointPlan {
        plan_break_points(
            &[BillingPeriodInput {
                begin_date: date!(2024 - 01 - 01),
                end_date: date!(2024 - 03 - 31),
                begin_reading_value: 0.0,
                end_reading_value: 600.0,
                consumed_energy_price: 120.0,
                service_price: None,
            }],
            day_diff,
        )
        .unwrap()
    }

    #[test]
    fn no_rows_means_no_sub_meter() {
        let err = resolve_readings(&quarter_plan(3), &[]).unwrap_err();
        assert!(matches!(err, BillingError::NoSubMeter));
    }

    #[test]
    fn sorts_sentinels_last() {
        let rows = vec![
            SubMeterReadingRow::no_earlier_data(2),
            SubMeterReadingRow::taken(1, 1.0, date!(2024 - 01 - 01)),
            SubMeterReadingRow::taken(2, 2.0, date!(2024 - 02 - 01)),
        ];
        let series = newest_first(&rows);
        assert_eq!(series[0].1.date(), Some(date!(2024 - 02 - 01)));
        assert_eq!(series[2].1, RawReading::NoEarlierData);
    }

    #[test]
    fn rollback_adds_break_point_and_invalidates_span() {
        let rows = vec![
            SubMeterReadingRow::taken(1, 150.0, date!(2024 - 03 - 31)),
            SubMeterReadingRow::taken(2, 90.0, date!(2024 - 03 - 31)),
            SubMeterReadingRow::taken(1, 300.0, date!(2024 - 02 - 10)),
            SubMeterReadingRow::taken(1, 100.0, date!(2023 - 12 - 31)),
            SubMeterReadingRow::taken(2, 0.0, date!(2023 - 12 - 31)),
            SubMeterReadingRow::no_earlier_data(1),
            SubMeterReadingRow::no_earlier_data(2),
        ];
        let resolved = resolve_readings(&quarter_plan(3), &rows).unwrap();

        assert_eq!(resolved.rollbacks, 1);
        assert_eq!(
            resolved.supplementary,
            vec![BreakPoint::around(date!(2024 - 02 - 10), 3)]
        );
        let actuals: Vec<Date> = resolved.break_points.iter().map(|bp| bp.actual).collect();
        assert_eq!(
            actuals,
            vec![
                date!(2024 - 03 - 31),
                date!(2024 - 02 - 10),
                date!(2023 - 12 - 31)
            ]
        );

        let m = &resolved.matrix;
        assert_eq!(
            m.get(date!(2024 - 02 - 10), 1),
            Some(Reading::Observed {
                value: 300.0,
                date: date!(2024 - 02 - 10),
            })
        );
        // 90 / 91 days * 41 days
        let Some(Reading::Estimated { value }) = m.get(date!(2024 - 02 - 10), 2) else {
            panic!("expected an estimate");
        };
        assert!((value - 90.0 / 91.0 * 41.0).abs() < 1e-9);
        assert_eq!(m.reading(date!(2023 - 12 - 31), 2).value(), Some(0.0));
    }

    #[test]
    fn newest_reading_between_break_points_gets_its_own() {
        let rows = vec![
            SubMeterReadingRow::taken(1, 40.0, date!(2024 - 03 - 20)),
            SubMeterReadingRow::taken(1, 0.0, date!(2023 - 12 - 25)),
        ];
        let resolved = resolve_readings(&quarter_plan(1), &rows).unwrap();

        assert_eq!(
            resolved.supplementary,
            vec![BreakPoint::around(date!(2024 - 03 - 20), 1)]
        );
        assert_eq!(
            resolved.matrix.get(date!(2024 - 03 - 31), 1),
            Some(Reading::Invalid)
        );
        assert_eq!(
            resolved.matrix.get(date!(2024 - 03 - 20), 1),
            Some(Reading::Observed {
                value: 40.0,
                date: date!(2024 - 03 - 20),
            })
        );
        assert!(resolved.matrix.reading(date!(2023 - 12 - 31), 1).is_valid());
    }

    #[test]
    fn wide_window_needs_no_supplementary_break_point() {
        let rows = vec![
            SubMeterReadingRow::taken(1, 40.0, date!(2024 - 03 - 20)),
            SubMeterReadingRow::taken(1, 0.0, date!(2023 - 12 - 25)),
            SubMeterReadingRow::no_earlier_data(1),
        ];
        let resolved = resolve_readings(&quarter_plan(255), &rows).unwrap();
        assert!(resolved.supplementary.is_empty());
        assert_eq!(
            resolved.matrix.get(date!(2023 - 12 - 31), 1),
            Some(Reading::Observed {
                value: 0.0,
                date: date!(2023 - 12 - 25),
            })
        );
    }

    #[test]
    fn oldest_reading_between_break_points_gets_its_own() {
        let rows = vec![
            SubMeterReadingRow::taken(1, 100.0, date!(2024 - 03 - 31)),
            SubMeterReadingRow::taken(1, 50.0, date!(2024 - 02 - 15)),
            SubMeterReadingRow::no_earlier_data(1),
        ];
        let resolved = resolve_readings(&quarter_plan(3), &rows).unwrap();

        assert_eq!(
            resolved.supplementary,
            vec![BreakPoint::around(date!(2024 - 02 - 15), 3)]
        );
        assert_eq!(
            resolved.matrix.get(date!(2024 - 02 - 15), 1),
            Some(Reading::Observed {
                value: 50.0,
                date: date!(2024 - 02 - 15),
            })
        );
        assert_eq!(
            resolved.matrix.get(date!(2023 - 12 - 31), 1),
            Some(Reading::Invalid)
        );
        assert_eq!(resolved.rollbacks, 0);
    }
}
