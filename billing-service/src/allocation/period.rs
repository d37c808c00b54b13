use serde::{Deserialize, Serialize};
use time::{Date, Duration};

use crate::error::{BillingError, BillingField};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// One main-meter billing period as submitted by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingPeriodInput {
    #[serde(with = "iso_date")]
    pub begin_date: Date,
    #[serde(with = "iso_date")]
    pub end_date: Date,
    pub begin_reading_value: f64,
    pub end_reading_value: f64,
    pub consumed_energy_price: f64,
    #[serde(default)]
    pub service_price: Option<f64>,
}

impl BillingPeriodInput {
    pub fn energy_consumption(&self) -> f64 {
        self.end_reading_value - self.begin_reading_value
    }

    pub fn total_price(&self) -> f64 {
        self.consumed_energy_price + self.service_price.unwrap_or(0.0)
    }

    /// The day before `begin_date`, so that the length of January measured
    /// from the shifted begin to the end date is 31 days.
    pub fn shifted_begin(&self) -> Date {
        self.begin_date.saturating_sub(Duration::DAY)
    }

    pub fn days(&self) -> f64 {
        days_between(self.end_date, self.shifted_begin())
    }
}

/// Request to bill a main meter over contiguous periods, earliest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingRequest {
    pub main_meter_id: i32,
    /// Maximum number of days a real reading may be away from the date it
    /// stands in for.
    pub max_day_diff: u8,
    pub periods: Vec<BillingPeriodInput>,
}

#[derive(Deserialize)]
struct RequestBody {
    main_meter_id: i32,
    max_day_diff: i64,
    periods: Vec<BillingPeriodInput>,
}

impl BillingRequest {
    /// Parse a JSON request body, reporting an out of range day difference
    /// against its own field.
    pub fn from_json(json: &str) -> Result<Self, BillingError> {
        let body: RequestBody = serde_json::from_str(json).map_err(|e| {
            BillingError::input(BillingField::Request, format!("Invalid billing request: {e}"))
        })?;
        let max_day_diff = u8::try_from(body.max_day_diff).map_err(|_| {
            BillingError::input(
                BillingField::MaxDayDiff,
                "Max day difference must be between 0 and 255.",
            )
        })?;
        Ok(Self {
            main_meter_id: body.main_meter_id,
            max_day_diff,
            periods: body.periods,
        })
    }
}

/// Whole days from `earlier` to `later`, negative if the order is reversed.
pub fn days_between(later: Date, earlier: Date) -> f64 {
    (later - earlier).whole_days() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn january_spans_thirty_one_days() {
        let period = BillingPeriodInput {
            begin_date: date!(2024 - 01 - 01),
            end_date: date!(2024 - 01 - 31),
            begin_reading_value: 100.0,
            end_reading_value: 150.0,
            consumed_energy_price: 25.0,
            service_price: Some(4.0),
        };
        assert_eq!(period.shifted_begin(), date!(2023 - 12 - 31));
        assert_eq!(period.days(), 31.0);
        assert_eq!(period.energy_consumption(), 50.0);
        assert_eq!(period.total_price(), 29.0);
    }

    #[test]
    fn request_reads_iso_dates_from_json() {
        let json = r#"{
            "main_meter_id": 7,
            "max_day_diff": 5,
            "periods": [{
                "begin_date": "2024-02-01",
                "end_date": "2024-02-29",
                "begin_reading_value": 10.5,
                "end_reading_value": 20.5,
                "consumed_energy_price": 3.0
            }]
        }"#;
        let request: BillingRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.periods[0].end_date, date!(2024 - 02 - 29));
        assert_eq!(request.periods[0].service_price, None);
    }

    #[test]
    fn day_diff_out_of_range_points_at_its_field() {
        let json = r#"{"main_meter_id": 1, "max_day_diff": 256, "periods": []}"#;
        let err = BillingRequest::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            BillingError::Input {
                field: BillingField::MaxDayDiff,
                ..
            }
        ));

        let json = r#"{"main_meter_id": 1, "max_day_diff": 255, "periods": []}"#;
        assert_eq!(BillingRequest::from_json(json).unwrap().max_day_diff, 255);
    }

    #[test]
    fn malformed_body_is_a_request_error() {
        for json in [
            r#"{"main_meter_id": "seven", "max_day_diff": 3, "periods": []}"#,
            r#"{"main_meter_id": 7, "max_day_diff": "three", "periods": []}"#,
            "not json",
        ] {
            let err = BillingRequest::from_json(json).unwrap_err();
            assert!(
                matches!(
                    err,
                    BillingError::Input {
                        field: BillingField::Request,
                        ..
                    }
                ),
                "{json}: {err}"
            );
            assert!(err.to_string().starts_with("request: "));
        }
    }
}
