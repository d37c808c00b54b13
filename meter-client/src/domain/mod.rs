pub mod billing;
pub mod sub_meter;

pub use billing::{
    BillingRecords, NewMainMeterBilling, NewMainMeterBillingPeriod, NewSubMeterBilling,
    NewSubMeterBillingPeriod,
};
pub use sub_meter::{SubMeter, SubMeterReadingRow};

// Calendar dates travel as `YYYY-MM-DD` in every serialized form.
#[cfg(feature = "serde")]
use time::Date;

#[cfg(feature = "serde")]
time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");
