use meter_client::domain::SubMeterReadingRow;
use time::Date;

use super::break_points::BreakPoint;
use super::period::days_between;
use super::resolver::{ReadingMatrix, Supplements};

/// Value of one sub-meter at one break point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// A real reading taken inside the break point window.
    Observed { value: f64, date: Date },
    /// Interpolated between the two real readings around the break point.
    Estimated { value: f64 },
    /// No usable value: nothing brackets the break point or the meter ran
    /// backwards across it.
    Invalid,
}

impl Reading {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Observed { value, .. } | Self::Estimated { value } => Some(*value),
            Self::Invalid => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.value().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub value: f64,
    pub date: Date,
}

/// A raw reading as delivered by the reading query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawReading {
    Taken(Observation),
    /// The sub-meter has no reading before the fetched window.
    NoEarlierData,
}

impl RawReading {
    pub fn date(&self) -> Option<Date> {
        match self {
            Self::Taken(o) => Some(o.date),
            Self::NoEarlierData => None,
        }
    }
}

impl From<&SubMeterReadingRow> for RawReading {
    fn from(row: &SubMeterReadingRow) -> Self {
        match (row.reading_value, row.reading_date) {
            (Some(value), Some(date)) => Self::Taken(Observation { value, date }),
            _ => Self::NoEarlierData,
        }
    }
}

/// Linear estimate at `at` between two readings of the same meter.
///
/// Returns `None` when the later value is lower than the earlier one, which a
/// cumulative meter cannot do.
pub fn interpolate(earlier: Observation, later: Observation, at: Date) -> Option<f64> {
    if later.value < earlier.value {
        return None;
    }
    let span = days_between(later.date, earlier.date);
    if span <= 0.0 {
        return Some(earlier.value);
    }
    let per_day = (later.value - earlier.value) / span;
    Some(earlier.value + per_day * days_between(at, earlier.date))
}

fn distance(a: Date, b: Date) -> i64 {
    (a - b).whole_days().abs()
}

/// Walk state of one sub-meter while its readings are fed newest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesCursor {
    /// The reading seen just before the current one, i.e. the next later one.
    pub later: Option<Observation>,
    /// Break points before this index can no longer be improved.
    pub next_index: usize,
}

impl SeriesCursor {
    /// Feed the next older raw reading of `sub_meter_id`.
    ///
    /// With `supplements` present (the primary pass) rollbacks and readings
    /// no break point covers are proposed as supplementary break points.
    pub fn visit(
        &mut self,
        sub_meter_id: i32,
        raw: RawReading,
        break_points: &[BreakPoint],
        matrix: &mut ReadingMatrix,
        supplements: Option<&mut Supplements<'_>>,
    ) {
        match raw {
            RawReading::NoEarlierData => self.close(sub_meter_id, break_points, matrix, supplements),
            RawReading::Taken(current) => {
                self.take(sub_meter_id, current, break_points, matrix, supplements)
            }
        }
    }

    fn close(
        &mut self,
        sub_meter_id: i32,
        break_points: &[BreakPoint],
        matrix: &mut ReadingMatrix,
        supplements: Option<&mut Supplements<'_>>,
    ) {
        let Some(supplements) = supplements else {
            let start = self.next_index.min(break_points.len());
            for bp in &break_points[start..] {
                matrix.set_if_missing(bp.actual, sub_meter_id, Reading::Invalid);
            }
            return;
        };

        let mut has_valid = false;
        let mut later_bracketed = false;
        for bp in break_points {
            match matrix.get(bp.actual, sub_meter_id) {
                Some(reading) => has_valid |= reading.is_valid(),
                None => matrix.set(bp.actual, sub_meter_id, Reading::Invalid),
            }
            if let Some(later) = self.later {
                later_bracketed |= bp.brackets(later.date);
            }
        }

        // The oldest real reading sits between break points; give it one of
        // its own so the allocation can use it.
        if let Some(later) = self.later {
            if has_valid && !later_bracketed {
                supplements.propose(later.date);
            }
        }
    }

    fn take(
        &mut self,
        sub_meter_id: i32,
        current: Observation,
        break_points: &[BreakPoint],
        matrix: &mut ReadingMatrix,
        mut supplements: Option<&mut Supplements<'_>>,
    ) {
        let rising = match self.later {
            Some(later) if later.value >= current.value => true,
            Some(later) => {
                if let Some(s) = supplements.as_deref_mut() {
                    tracing::warn!(
                        sub_meter_id,
                        date = %current.date,
                        value = current.value,
                        later_date = %later.date,
                        later_value = later.value,
                        "sub meter reading decreased over time"
                    );
                    s.rollback(later.date, current.date);
                }
                false
            }
            None => false,
        };

        // The newest reading of a sub-meter becomes a break point of its own
        // unless some break point window picks it up.
        let pending = self.later.is_none()
            && supplements
                .as_deref()
                .is_some_and(|s| s.admits(current.date));

        let mut in_window = false;
        let start = self.next_index.min(break_points.len());
        for bp in &break_points[start..] {
            if current.date > bp.max {
                if pending && !in_window {
                    if let Some(s) = supplements.as_deref_mut() {
                        s.add(current.date);
                    }
                }
                break;
            }

            if current.date >= bp.min {
                let replace = match matrix.get(bp.actual, sub_meter_id) {
                    Some(Reading::Observed { date, .. }) => {
                        distance(bp.actual, current.date) <= distance(bp.actual, date)
                    }
                    _ => true,
                };
                if replace {
                    matrix.set(
                        bp.actual,
                        sub_meter_id,
                        Reading::Observed {
                            value: current.value,
                            date: current.date,
                        },
                    );
                }
                if bp.actual >= current.date {
                    // Older readings are farther away.
                    self.next_index += 1;
                }
                in_window = true;
            } else {
                let reading = match self.later {
                    Some(later) if rising => interpolate(current, later, bp.actual)
                        .map(|value| Reading::Estimated { value })
                        .unwrap_or(Reading::Invalid),
                    _ => Reading::Invalid,
                };
                matrix.set(bp.actual, sub_meter_id, reading);
                self.next_index += 1;
            }
        }

        self.later = Some(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn obs(value: f64, date: Date) -> Observation {
        Observation { value, date }
    }

    #[test]
    fn interpolates_linearly_by_day() {
        let v = interpolate(
            obs(100.0, date!(2024 - 01 - 01)),
            obs(130.0, date!(2024 - 01 - 31)),
            date!(2024 - 01 - 11),
        );
        assert_eq!(v, Some(110.0));
    }

    #[test]
    fn rollback_has_no_estimate() {
        let v = interpolate(
            obs(100.0, date!(2024 - 01 - 01)),
            obs(90.0, date!(2024 - 01 - 31)),
            date!(2024 - 01 - 11),
        );
        assert_eq!(v, None);
    }

    #[test]
    fn flat_meter_keeps_its_value() {
        let v = interpolate(
            obs(42.0, date!(2024 - 01 - 01)),
            obs(42.0, date!(2024 - 03 - 01)),
            date!(2024 - 02 - 01),
        );
        assert_eq!(v, Some(42.0));
    }

    #[test]
    fn zero_reading_is_not_mistaken_for_missing() {
        assert_eq!(Reading::Estimated { value: 0.0 }.value(), Some(0.0));
        assert!(!Reading::Invalid.is_valid());
    }

    #[test]
    fn sentinel_row_maps_to_no_earlier_data() {
        let row = SubMeterReadingRow::no_earlier_data(3);
        assert_eq!(RawReading::from(&row), RawReading::NoEarlierData);
        let row = SubMeterReadingRow::taken(3, 1.5, date!(2024 - 05 - 01));
        assert_eq!(RawReading::from(&row).date(), Some(date!(2024 - 05 - 01)));
    }

    #[test]
    fn estimates_break_point_between_distant_readings() {
        let bps = [
            BreakPoint::around(date!(2024 - 01 - 31), 2),
            BreakPoint::around(date!(2023 - 12 - 31), 2),
        ];
        let mut matrix = ReadingMatrix::default();
        let mut cursor = SeriesCursor::default();
        for raw in [
            RawReading::Taken(obs(160.0, date!(2024 - 02 - 10))),
            RawReading::Taken(obs(130.0, date!(2024 - 01 - 11))),
            RawReading::Taken(obs(100.0, date!(2023 - 12 - 01))),
        ] {
            cursor.visit(1, raw, &bps, &mut matrix, None);
        }

        // 130 + 30 / 30 days * 20 days
        assert_eq!(
            matrix.get(date!(2024 - 01 - 31), 1),
            Some(Reading::Estimated { value: 150.0 })
        );
        // 100 + 30 / 41 days * 30 days
        let Some(Reading::Estimated { value }) = matrix.get(date!(2023 - 12 - 31), 1) else {
            panic!("expected an estimate");
        };
        assert!((value - (100.0 + 30.0 / 41.0 * 30.0)).abs() < 1e-9);
        assert_eq!(cursor.next_index, 2);
    }

    #[test]
    fn prefers_reading_nearest_to_break_point() {
        let bps = [BreakPoint::around(date!(2024 - 01 - 31), 5)];
        let mut matrix = ReadingMatrix::default();
        let mut cursor = SeriesCursor::default();
        for raw in [
            RawReading::Taken(obs(52.0, date!(2024 - 02 - 04))),
            RawReading::Taken(obs(51.0, date!(2024 - 02 - 01))),
            RawReading::Taken(obs(48.0, date!(2024 - 01 - 27))),
        ] {
            cursor.visit(1, raw, &bps, &mut matrix, None);
        }
        assert_eq!(
            matrix.get(date!(2024 - 01 - 31), 1),
            Some(Reading::Observed {
                value: 51.0,
                date: date!(2024 - 02 - 01),
            })
        );
    }

    #[test]
    fn no_earlier_data_without_readings_invalidates_everything() {
        let bps = [
            BreakPoint::around(date!(2024 - 01 - 31), 2),
            BreakPoint::around(date!(2023 - 12 - 31), 2),
        ];
        let mut matrix = ReadingMatrix::default();
        let mut cursor = SeriesCursor::default();
        cursor.visit(4, RawReading::NoEarlierData, &bps, &mut matrix, None);
        assert_eq!(matrix.get(date!(2024 - 01 - 31), 4), Some(Reading::Invalid));
        assert_eq!(matrix.get(date!(2023 - 12 - 31), 4), Some(Reading::Invalid));
    }
}
