use time::Date;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubMeter {
    pub id: i32,
    /// Position of the sub-meter under its main meter, starting at 1.
    pub sub_index: i32,
    pub meter_id: Option<String>,
    pub email: String,
}

/// One row of the windowed sub-meter reading query.
///
/// A row with neither value nor date is the "no earlier data" marker: the
/// sub-meter has no reading before the requested window.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubMeterReadingRow {
    pub sub_meter_id: i32,
    pub reading_value: Option<f64>,
    #[cfg_attr(feature = "serde", serde(with = "super::iso_date::option"))]
    pub reading_date: Option<Date>,
}

impl SubMeterReadingRow {
    pub fn taken(sub_meter_id: i32, reading_value: f64, reading_date: Date) -> Self {
        Self {
            sub_meter_id,
            reading_value: Some(reading_value),
            reading_date: Some(reading_date),
        }
    }

    pub fn no_earlier_data(sub_meter_id: i32) -> Self {
        Self {
            sub_meter_id,
            reading_value: None,
            reading_date: None,
        }
    }
}
