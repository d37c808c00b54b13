use time::Date;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NewMainMeterBilling {
    pub main_meter_id: i32,
    pub max_day_diff: i32,
    #[cfg_attr(feature = "serde", serde(with = "super::iso_date"))]
    pub begin_date: Date,
    #[cfg_attr(feature = "serde", serde(with = "super::iso_date"))]
    pub end_date: Date,
    pub energy_consumption: f64,
    pub consumed_energy_price: f64,
    pub service_price: Option<f64>,
    pub advance_price: f64,
    pub total_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NewMainMeterBillingPeriod {
    #[cfg_attr(feature = "serde", serde(with = "super::iso_date"))]
    pub begin_date: Date,
    #[cfg_attr(feature = "serde", serde(with = "super::iso_date"))]
    pub end_date: Date,
    pub begin_reading_value: f64,
    pub end_reading_value: f64,
    pub energy_consumption: f64,
    pub consumed_energy_price: f64,
    pub service_price: Option<f64>,
    pub advance_price: f64,
    pub total_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NewSubMeterBilling {
    pub sub_meter_id: i32,
    pub energy_consumption: f64,
    pub consumed_energy_price: f64,
    pub service_price: Option<f64>,
    pub advance_price: f64,
    pub total_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NewSubMeterBillingPeriod {
    pub sub_meter_id: i32,
    /// Index into `BillingRecords::main_periods`.
    pub period_index: usize,
    pub energy_consumption: f64,
    pub consumed_energy_price: f64,
    pub service_price: Option<f64>,
    pub advance_price: f64,
    pub total_price: f64,
}

/// Everything one billing run writes, not yet bound to database ids.
///
/// `main_periods` are ordered earliest to latest; sub-meter rows are ordered
/// by period, then by sub-meter id.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BillingRecords {
    pub main_billing: NewMainMeterBilling,
    pub main_periods: Vec<NewMainMeterBillingPeriod>,
    pub sub_billings: Vec<NewSubMeterBilling>,
    pub sub_periods: Vec<NewSubMeterBillingPeriod>,
}

impl BillingRecords {
    pub fn sub_periods_of(&self, period_index: usize) -> impl Iterator<Item = &NewSubMeterBillingPeriod> {
        self.sub_periods
            .iter()
            .filter(move |p| p.period_index == period_index)
    }
}
