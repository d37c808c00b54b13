pub mod csv_file;
pub mod history;
pub mod postgres;

pub use csv_file::ReadingCsvFile;
pub use history::ReadingHistory;
pub use postgres::PgReadingSource;
