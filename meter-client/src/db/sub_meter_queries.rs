use anyhow::Result;
use sqlx::PgPool;
use time::Date;

use crate::domain::{SubMeter, SubMeterReadingRow};

/// Fetch the readings of every sub-meter of a main meter inside
/// `[date_min, date_max]`, newest first.
///
/// Besides the window itself the result holds, per sub-meter, the first
/// reading after `date_max` and the last reading before `date_min`. A
/// sub-meter without any reading before `date_min` gets one row with
/// neither value nor date instead, sorted last.
pub async fn sub_meter_readings(
    pool: &PgPool,
    main_meter_id: i32,
    date_min: Date,
    date_max: Date,
) -> Result<Vec<SubMeterReadingRow>> {
    let rows = sqlx::query_as::<_, SubMeterReadingRow>(
        r#"
        WITH selected_sub_meter AS (
            SELECT  sub_meter.id
            FROM    sub_meter
            WHERE   fk_main_meter = $1
        )
        SELECT
            later_reading.sub_meter_id,
            sub_meter_reading.reading_value,
            sub_meter_reading.reading_date
        FROM (
            SELECT
                selected_sub_meter.id AS sub_meter_id,
                MIN(sub_meter_reading.reading_date) AS reading_date
            FROM selected_sub_meter
            JOIN sub_meter_reading
              ON selected_sub_meter.id = sub_meter_reading.fk_sub_meter
            WHERE sub_meter_reading.reading_date > $2
            GROUP BY selected_sub_meter.id
        ) later_reading
        LEFT JOIN sub_meter_reading
               ON later_reading.sub_meter_id = sub_meter_reading.fk_sub_meter
              AND later_reading.reading_date = sub_meter_reading.reading_date
        UNION
        SELECT
            selected_sub_meter.id AS sub_meter_id,
            sub_meter_reading.reading_value,
            sub_meter_reading.reading_date
        FROM selected_sub_meter
        JOIN sub_meter_reading
          ON selected_sub_meter.id = sub_meter_reading.fk_sub_meter
        WHERE sub_meter_reading.reading_date BETWEEN $3 AND $2
        UNION
        SELECT
            selected_sub_meter.id AS sub_meter_id,
            sub_meter_reading.reading_value,
            earlier_reading.reading_date
        FROM selected_sub_meter
        LEFT JOIN (
            SELECT
                selected_sub_meter.id AS sub_meter_id,
                MAX(sub_meter_reading.reading_date) AS reading_date
            FROM selected_sub_meter
            LEFT JOIN sub_meter_reading
                   ON selected_sub_meter.id = sub_meter_reading.fk_sub_meter
            WHERE sub_meter_reading.reading_date < $3
            GROUP BY selected_sub_meter.id
        ) earlier_reading
               ON selected_sub_meter.id = earlier_reading.sub_meter_id
        LEFT JOIN sub_meter_reading
               ON earlier_reading.sub_meter_id = sub_meter_reading.fk_sub_meter
              AND earlier_reading.reading_date = sub_meter_reading.reading_date
        ORDER BY reading_date DESC NULLS LAST
        "#,
    )
    .bind(main_meter_id)
    .bind(date_max)
    .bind(date_min)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// List the sub-meters of a main meter together with their owners' emails.
pub async fn list_sub_meters(pool: &PgPool, main_meter_id: i32) -> Result<Vec<SubMeter>> {
    let rows = sqlx::query_as::<_, SubMeter>(
        r#"
        SELECT
            sub_meter.id,
            sub_meter.subid AS sub_index,
            sub_meter.meter_id,
            app_user.email
        FROM sub_meter
        JOIN app_user ON sub_meter.fk_user = app_user.id
        WHERE sub_meter.fk_main_meter = $1
        ORDER BY sub_meter.subid
        "#,
    )
    .bind(main_meter_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
