use std::collections::BTreeMap;

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool};

use crate::domain::{
    BillingRecords, NewMainMeterBilling, NewMainMeterBillingPeriod, NewSubMeterBilling,
    NewSubMeterBillingPeriod,
};

/// Insert a complete billing run and return the id of the main billing.
///
/// All rows are written inside one transaction: main billing, sub-meter
/// billings, main billing periods, then sub-meter billing periods. Dropping
/// the transaction on any error rolls everything back.
pub async fn insert_billing_records(pool: &PgPool, records: &BillingRecords) -> Result<i32> {
    let mut tx = pool.begin().await.context("begin billing transaction")?;

    let main_billing_id = insert_main_meter_billing(&mut tx, &records.main_billing).await?;

    let mut sub_billing_ids = BTreeMap::new();
    for sub_billing in &records.sub_billings {
        let id = insert_sub_meter_billing(&mut tx, main_billing_id, sub_billing).await?;
        sub_billing_ids.insert(sub_billing.sub_meter_id, id);
    }

    let mut period_ids = Vec::with_capacity(records.main_periods.len());
    for period in &records.main_periods {
        period_ids.push(insert_main_meter_billing_period(&mut tx, main_billing_id, period).await?);
    }

    for sub_period in &records.sub_periods {
        let period_id = period_ids
            .get(sub_period.period_index)
            .copied()
            .with_context(|| format!("no main meter billing period {}", sub_period.period_index))?;
        let sub_billing_id = sub_billing_ids
            .get(&sub_period.sub_meter_id)
            .copied()
            .with_context(|| {
                format!("no sub meter billing for sub meter {}", sub_period.sub_meter_id)
            })?;
        insert_sub_meter_billing_period(&mut tx, sub_billing_id, period_id, sub_period).await?;
    }

    tx.commit().await.context("commit billing transaction")?;

    Ok(main_billing_id)
}

async fn insert_main_meter_billing(conn: &mut PgConnection, b: &NewMainMeterBilling) -> Result<i32> {
    let id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO main_meter_billing (
            fk_main_meter,
            subid,
            max_day_diff,
            begin_date,
            end_date,
            energy_consumption,
            consumed_energy_price,
            service_price,
            advance_price,
            total_price
        )
        SELECT $1, COALESCE(MAX(subid), 0) + 1, $2, $3, $4, $5, $6, $7, $8, $9
        FROM main_meter_billing
        WHERE fk_main_meter = $1
        RETURNING id
        "#,
    )
    .bind(b.main_meter_id)
    .bind(b.max_day_diff)
    .bind(b.begin_date)
    .bind(b.end_date)
    .bind(b.energy_consumption)
    .bind(b.consumed_energy_price)
    .bind(b.service_price)
    .bind(b.advance_price)
    .bind(b.total_price)
    .fetch_one(conn)
    .await
    .context("insert main_meter_billing")?;

    Ok(id)
}

async fn insert_sub_meter_billing(
    conn: &mut PgConnection,
    main_billing_id: i32,
    b: &NewSubMeterBilling,
) -> Result<i32> {
    let id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO sub_meter_billing (
            fk_sub_meter,
            fk_main_billing,
            subid,
            energy_consumption,
            consumed_energy_price,
            service_price,
            advance_price,
            total_price
        )
        SELECT $1, $2, COALESCE(MAX(subid), 0) + 1, $3, $4, $5, $6, $7
        FROM sub_meter_billing
        WHERE fk_sub_meter = $1
        RETURNING id
        "#,
    )
    .bind(b.sub_meter_id)
    .bind(main_billing_id)
    .bind(b.energy_consumption)
    .bind(b.consumed_energy_price)
    .bind(b.service_price)
    .bind(b.advance_price)
    .bind(b.total_price)
    .fetch_one(conn)
    .await
    .context("insert sub_meter_billing")?;

    Ok(id)
}

async fn insert_main_meter_billing_period(
    conn: &mut PgConnection,
    main_billing_id: i32,
    p: &NewMainMeterBillingPeriod,
) -> Result<i32> {
    let id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO main_meter_billing_period (
            fk_main_billing,
            subid,
            begin_date,
            end_date,
            begin_reading_value,
            end_reading_value,
            energy_consumption,
            consumed_energy_price,
            service_price,
            advance_price,
            total_price
        )
        SELECT $1, COALESCE(MAX(subid), 0) + 1, $2, $3, $4, $5, $6, $7, $8, $9, $10
        FROM main_meter_billing_period
        WHERE fk_main_billing = $1
        RETURNING id
        "#,
    )
    .bind(main_billing_id)
    .bind(p.begin_date)
    .bind(p.end_date)
    .bind(p.begin_reading_value)
    .bind(p.end_reading_value)
    .bind(p.energy_consumption)
    .bind(p.consumed_energy_price)
    .bind(p.service_price)
    .bind(p.advance_price)
    .bind(p.total_price)
    .fetch_one(conn)
    .await
    .context("insert main_meter_billing_period")?;

    Ok(id)
}

async fn insert_sub_meter_billing_period(
    conn: &mut PgConnection,
    sub_billing_id: i32,
    main_billing_period_id: i32,
    p: &NewSubMeterBillingPeriod,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sub_meter_billing_period (
            fk_sub_billing,
            fk_main_billing_period,
            energy_consumption,
            consumed_energy_price,
            service_price,
            advance_price,
            total_price
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(sub_billing_id)
    .bind(main_billing_period_id)
    .bind(p.energy_consumption)
    .bind(p.consumed_energy_price)
    .bind(p.service_price)
    .bind(p.advance_price)
    .bind(p.total_price)
    .execute(conn)
    .await
    .context("insert sub_meter_billing_period")?;

    Ok(())
}
