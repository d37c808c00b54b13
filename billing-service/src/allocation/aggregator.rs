use std::collections::BTreeMap;

use meter_client::domain::{
    BillingRecords, NewMainMeterBilling, NewMainMeterBillingPeriod, NewSubMeterBilling,
    NewSubMeterBillingPeriod, SubMeter,
};
use serde::Serialize;
use time::Date;

use super::engine::{PeriodAllocation, Share};
use super::period::BillingRequest;
use super::resolver::ResolvedReadings;
use crate::error::{BillingError, BillingField};

/// Result of one billing computation, ready to show or to persist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingStatement {
    pub records: BillingRecords,
    /// Display attributes of every billed sub-meter that is still listed
    /// under the main meter, by id.
    pub sub_meters: Vec<SubMeter>,
    pub break_points: usize,
    pub supplementary_break_points: usize,
    pub meter_rollbacks: usize,
    /// Content hash of `records`.
    pub fingerprint: String,
}

struct PricedShare {
    energy_consumption: f64,
    consumed_energy_price: f64,
    service_price: Option<f64>,
    advance_price: f64,
    total_price: f64,
}

impl PricedShare {
    fn new(share: &Share, service_price: Option<f64>) -> Self {
        let consumed_energy_price = share.consumed_energy_price;
        let service = service_price.unwrap_or(0.0);
        let advance_price = consumed_energy_price + service;
        Self {
            energy_consumption: share.energy_consumption,
            consumed_energy_price,
            service_price,
            advance_price,
            // TODO: subtract the advance price of the previous billing instead
            // of adding this billing's advance price a second time.
            total_price: consumed_energy_price + service + advance_price,
        }
    }
}

fn add_optional(total: &mut Option<f64>, value: Option<f64>) {
    if let Some(v) = value {
        *total.get_or_insert(0.0) += v;
    }
}

/// Price the allocated shares and roll them up into sub-meter billings and
/// the main-meter billing.
pub fn aggregate(
    request: &BillingRequest,
    resolved: &ResolvedReadings,
    allocations: &[PeriodAllocation],
    sub_meters: &[SubMeter],
) -> Result<BillingStatement, BillingError> {
    let periods = &request.periods;
    let (Some(earliest), Some(latest)) = (periods.first(), periods.last()) else {
        return Err(BillingError::input(
            BillingField::Periods,
            "No billing period provided.",
        ));
    };

    let mut main_periods: Vec<NewMainMeterBillingPeriod> = periods
        .iter()
        .map(|p| NewMainMeterBillingPeriod {
            begin_date: p.begin_date,
            end_date: p.end_date,
            begin_reading_value: p.begin_reading_value,
            end_reading_value: p.end_reading_value,
            energy_consumption: p.energy_consumption(),
            consumed_energy_price: p.consumed_energy_price,
            service_price: p.service_price,
            advance_price: 0.0,
            total_price: p.total_price(),
        })
        .collect();

    let mut ordered: Vec<&PeriodAllocation> = allocations.iter().collect();
    ordered.sort_by_key(|a| a.period_index);

    let mut sub_billings: BTreeMap<i32, NewSubMeterBilling> = BTreeMap::new();
    let mut sub_periods = Vec::new();
    for allocation in ordered {
        let Some(main_period) = main_periods.get_mut(allocation.period_index) else {
            return Err(BillingError::Internal(format!(
                "allocation for unknown billing period {}",
                allocation.period_index
            )));
        };

        for (&sub_meter_id, share) in &allocation.shares {
            let priced = PricedShare::new(share, allocation.service_price_per_sub_meter);

            main_period.advance_price += priced.advance_price;
            main_period.total_price += priced.advance_price;

            let billing = sub_billings
                .entry(sub_meter_id)
                .or_insert_with(|| NewSubMeterBilling {
                    sub_meter_id,
                    energy_consumption: 0.0,
                    consumed_energy_price: 0.0,
                    service_price: None,
                    advance_price: 0.0,
                    total_price: 0.0,
                });
            billing.energy_consumption += priced.energy_consumption;
            billing.consumed_energy_price += priced.consumed_energy_price;
            add_optional(&mut billing.service_price, priced.service_price);
            billing.advance_price += priced.advance_price;
            billing.total_price += priced.total_price;

            sub_periods.push(NewSubMeterBillingPeriod {
                sub_meter_id,
                period_index: allocation.period_index,
                energy_consumption: priced.energy_consumption,
                consumed_energy_price: priced.consumed_energy_price,
                service_price: priced.service_price,
                advance_price: priced.advance_price,
                total_price: priced.total_price,
            });
        }
    }

    let mut main_billing = NewMainMeterBilling {
        main_meter_id: request.main_meter_id,
        max_day_diff: i32::from(request.max_day_diff),
        begin_date: earliest.begin_date,
        end_date: latest.end_date,
        energy_consumption: 0.0,
        consumed_energy_price: 0.0,
        service_price: None,
        advance_price: 0.0,
        total_price: 0.0,
    };
    for p in &main_periods {
        main_billing.energy_consumption += p.energy_consumption;
        main_billing.consumed_energy_price += p.consumed_energy_price;
        add_optional(&mut main_billing.service_price, p.service_price);
        main_billing.advance_price += p.advance_price;
        main_billing.total_price += p.total_price;
    }

    let records = BillingRecords {
        main_billing,
        main_periods,
        sub_billings: sub_billings.into_values().collect(),
        sub_periods,
    };

    let mut billed: Vec<SubMeter> = sub_meters
        .iter()
        .filter(|sm| records.sub_billings.iter().any(|b| b.sub_meter_id == sm.id))
        .cloned()
        .collect();
    billed.sort_by_key(|sm| sm.id);

    Ok(BillingStatement {
        fingerprint: fingerprint(&records),
        records,
        sub_meters: billed,
        break_points: resolved.break_points.len(),
        supplementary_break_points: resolved.supplementary.len(),
        meter_rollbacks: resolved.rollbacks,
    })
}

fn hash_i64(hasher: &mut blake3::Hasher, v: i64) {
    hasher.update(&v.to_le_bytes());
}

fn hash_f64(hasher: &mut blake3::Hasher, v: f64) {
    hasher.update(&v.to_bits().to_le_bytes());
}

fn hash_opt_f64(hasher: &mut blake3::Hasher, v: Option<f64>) {
    match v {
        Some(x) => {
            hasher.update(&[1]);
            hash_f64(hasher, x);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn hash_date(hasher: &mut blake3::Hasher, d: Date) {
    hash_i64(hasher, i64::from(d.to_julian_day()));
}

fn hash_amounts(
    h: &mut blake3::Hasher,
    energy_consumption: f64,
    consumed_energy_price: f64,
    service_price: Option<f64>,
    advance_price: f64,
    total_price: f64,
) {
    hash_f64(h, energy_consumption);
    hash_f64(h, consumed_energy_price);
    hash_opt_f64(h, service_price);
    hash_f64(h, advance_price);
    hash_f64(h, total_price);
}

/// Bit-exact content hash of a record set; equal inputs give equal hashes.
pub fn fingerprint(records: &BillingRecords) -> String {
    let mut h = blake3::Hasher::new();

    let b = &records.main_billing;
    hash_i64(&mut h, i64::from(b.main_meter_id));
    hash_i64(&mut h, i64::from(b.max_day_diff));
    hash_date(&mut h, b.begin_date);
    hash_date(&mut h, b.end_date);
    hash_amounts(
        &mut h,
        b.energy_consumption,
        b.consumed_energy_price,
        b.service_price,
        b.advance_price,
        b.total_price,
    );

    for p in &records.main_periods {
        hash_date(&mut h, p.begin_date);
        hash_date(&mut h, p.end_date);
        hash_f64(&mut h, p.begin_reading_value);
        hash_f64(&mut h, p.end_reading_value);
        hash_amounts(
            &mut h,
            p.energy_consumption,
            p.consumed_energy_price,
            p.service_price,
            p.advance_price,
            p.total_price,
        );
    }

    for s in &records.sub_billings {
        hash_i64(&mut h, i64::from(s.sub_meter_id));
        hash_amounts(
            &mut h,
            s.energy_consumption,
            s.consumed_energy_price,
            s.service_price,
            s.advance_price,
            s.total_price,
        );
    }

    for s in &records.sub_periods {
        hash_i64(&mut h, i64::from(s.sub_meter_id));
        hash_i64(&mut h, s.period_index as i64);
        hash_amounts(
            &mut h,
            s.energy_consumption,
            s.consumed_energy_price,
            s.service_price,
            s.advance_price,
            s.total_price,
        );
    }

    h.finalize().to_hex().to_string()
}
