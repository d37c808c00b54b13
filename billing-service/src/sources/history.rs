use std::collections::BTreeMap;
use std::ops::Bound;

use meter_client::domain::{SubMeter, SubMeterReadingRow};
use time::Date;

use crate::error::BillingError;
use crate::pipeline::ReadingSource;

/// The full reading history of one main meter, kept in memory.
///
/// Serves windows the same way the Postgres reading query does, so offline
/// previews and tests see exactly what a database-backed billing would.
#[derive(Debug, Clone, Default)]
pub struct ReadingHistory {
    main_meter_id: i32,
    sub_meters: BTreeMap<i32, SubMeter>,
    readings: BTreeMap<i32, BTreeMap<Date, f64>>,
}

impl ReadingHistory {
    pub fn new(main_meter_id: i32) -> Self {
        Self {
            main_meter_id,
            ..Self::default()
        }
    }

    pub fn main_meter_id(&self) -> i32 {
        self.main_meter_id
    }

    pub fn add_sub_meter(&mut self, sub_meter: SubMeter) {
        self.sub_meters.insert(sub_meter.id, sub_meter);
    }

    /// Record a reading. Unknown sub-meters are registered on the fly; a
    /// second reading on the same day replaces the first.
    pub fn record(&mut self, sub_meter_id: i32, date: Date, value: f64) {
        let next_index = self.sub_meters.len() as i32 + 1;
        self.sub_meters.entry(sub_meter_id).or_insert_with(|| SubMeter {
            id: sub_meter_id,
            sub_index: next_index,
            meter_id: None,
            email: String::new(),
        });
        self.readings
            .entry(sub_meter_id)
            .or_default()
            .insert(date, value);
    }

    pub fn reading_count(&self) -> usize {
        self.readings.values().map(BTreeMap::len).sum()
    }

    /// Rows of every sub-meter in `[date_min, date_max]`, plus the first
    /// reading after the window and the last one before it (or the "no
    /// earlier data" marker), newest first.
    pub fn select_window(&self, date_min: Date, date_max: Date) -> Vec<SubMeterReadingRow> {
        let empty = BTreeMap::new();
        let mut rows = Vec::new();
        for &id in self.sub_meters.keys() {
            let series = self.readings.get(&id).unwrap_or(&empty);

            if let Some((date, value)) = series
                .range((Bound::Excluded(date_max), Bound::Unbounded))
                .next()
            {
                rows.push(SubMeterReadingRow::taken(id, *value, *date));
            }
            if date_min <= date_max {
                rows.extend(
                    series
                        .range(date_min..=date_max)
                        .map(|(date, value)| SubMeterReadingRow::taken(id, *value, *date)),
                );
            }
            match series.range(..date_min).next_back() {
                Some((date, value)) => rows.push(SubMeterReadingRow::taken(id, *value, *date)),
                None => rows.push(SubMeterReadingRow::no_earlier_data(id)),
            }
        }

        rows.sort_by(|a, b| b.reading_date.cmp(&a.reading_date));
        rows
    }
}

#[async_trait::async_trait]
impl ReadingSource for ReadingHistory {
    async fn sub_meter_readings(
        &self,
        main_meter_id: i32,
        date_min: Date,
        date_max: Date,
    ) -> Result<Vec<SubMeterReadingRow>, BillingError> {
        if main_meter_id != self.main_meter_id {
            return Ok(Vec::new());
        }
        Ok(self.select_window(date_min, date_max))
    }

    async fn list_sub_meters(&self, main_meter_id: i32) -> Result<Vec<SubMeter>, BillingError> {
        if main_meter_id != self.main_meter_id {
            return Ok(Vec::new());
        }
        let mut sub_meters: Vec<SubMeter> = self.sub_meters.values().cloned().collect();
        sub_meters.sort_by_key(|sm| sm.sub_index);
        Ok(sub_meters)
    }
}
