use std::{fs::File, io::Read, path::PathBuf};

use csv::StringRecord;
use time::{macros::format_description, Date};

use crate::error::BillingError;
use crate::sources::history::ReadingHistory;

/// Sub-meter reading history stored as CSV.
///
/// Expected header columns (by name):
/// - sub_meter_id
/// - reading_date (YYYY-MM-DD)
/// - reading_value
pub struct ReadingCsvFile {
    path: PathBuf,
}

impl ReadingCsvFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Load every reading in the file as history of `main_meter_id`.
    pub fn load(&self, main_meter_id: i32) -> Result<ReadingHistory, BillingError> {
        let file = File::open(&self.path).map_err(|e| {
            BillingError::Source(format!("failed to open {}: {e}", self.path.display()))
        })?;
        let history = parse_history(main_meter_id, file)?;
        tracing::info!(
            path = %self.path.display(),
            readings = history.reading_count(),
            "loaded sub meter reading history"
        );
        Ok(history)
    }
}

fn record_to_reading(
    record: &StringRecord,
    headers: &StringRecord,
) -> Result<(i32, Date, f64), BillingError> {
    let get = |name: &str| -> Result<&str, BillingError> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .ok_or_else(|| BillingError::Source(format!("missing column '{name}' in CSV record")))
    };

    let id_str = get("sub_meter_id")?;
    let sub_meter_id: i32 = id_str
        .parse()
        .map_err(|e| BillingError::Source(format!("invalid sub_meter_id '{id_str}': {e}")))?;

    let date_str = get("reading_date")?;
    let date = Date::parse(date_str, format_description!("[year]-[month]-[day]"))
        .map_err(|e| BillingError::Source(format!("invalid reading_date '{date_str}': {e}")))?;

    let value_str = get("reading_value")?;
    let value: f64 = value_str
        .parse()
        .map_err(|e| BillingError::Source(format!("invalid reading_value '{value_str}': {e}")))?;

    Ok((sub_meter_id, date, value))
}

/// Parse CSV readings from any reader.
pub fn parse_history<R: Read>(main_meter_id: i32, reader: R) -> Result<ReadingHistory, BillingError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| BillingError::Source(format!("failed to read CSV headers: {e}")))?
        .clone();

    let mut history = ReadingHistory::new(main_meter_id);
    for result in rdr.records() {
        let record =
            result.map_err(|e| BillingError::Source(format!("failed to read CSV record: {e}")))?;
        match record_to_reading(&record, &headers) {
            Ok((sub_meter_id, date, value)) => history.record(sub_meter_id, date, value),
            Err(e) => {
                metrics::counter!("billing_csv_parse_errors_total").increment(1);
                return Err(e);
            }
        }
    }
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_client::domain::SubMeterReadingRow;
    use time::macros::date;

    #[test]
    fn parses_columns_by_name() {
        let csv = "reading_value,sub_meter_id,reading_date\n\
                   12.5,3,2024-01-31\n\
                   20, 3 ,2024-02-29\n\
                   7,4,2024-02-01\n";
        let history = parse_history(1, csv.as_bytes()).unwrap();
        assert_eq!(history.main_meter_id(), 1);
        assert_eq!(history.reading_count(), 3);

        let rows = history.select_window(date!(2024 - 02 - 01), date!(2024 - 02 - 29));
        assert_eq!(rows[0], SubMeterReadingRow::taken(3, 20.0, date!(2024 - 02 - 29)));
        assert!(rows.contains(&SubMeterReadingRow::taken(3, 12.5, date!(2024 - 01 - 31))));
        assert!(rows.contains(&SubMeterReadingRow::no_earlier_data(4)));
    }

    #[test]
    fn rejects_bad_dates() {
        let csv = "sub_meter_id,reading_date,reading_value\n1,31.01.2024,5\n";
        let err = parse_history(1, csv.as_bytes()).unwrap_err();
        assert!(matches!(err, BillingError::Source(ref m) if m.contains("reading_date")));
    }

    #[test]
    fn rejects_missing_column() {
        let csv = "sub_meter_id,reading_date\n1,2024-01-31\n";
        let err = parse_history(1, csv.as_bytes()).unwrap_err();
        assert!(matches!(err, BillingError::Source(ref m) if m.contains("reading_value")));
    }

    #[test]
    fn missing_file_is_a_source_error() {
        let err = ReadingCsvFile::new("/nonexistent/readings.csv").load(1).unwrap_err();
        assert!(matches!(err, BillingError::Source(_)));
        assert!(!err.is_user_facing());
    }
}
