use crate::model::holiday::Holiday;
use crate::utils::calendar::HolidayCalendar;
use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;

/// Holidays per calendar year. Writes through `/api/holidays` invalidate the year.
pub static HOLIDAY_CACHE: Lazy<Cache<i32, Arc<Vec<Holiday>>>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(16)
        .time_to_live(Duration::from_secs(3600))
        .build()
});

async fn load_year(pool: &MySqlPool, year: i32) -> Result<Vec<Holiday>, sqlx::Error> {
    sqlx::query_as::<_, Holiday>(
        r#"
        SELECT id, date, name, holiday_type, is_optional
        FROM holidays
        WHERE YEAR(date) = ?
        ORDER BY date
        "#,
    )
    .bind(year)
    .fetch_all(pool)
    .await
}

pub async fn holidays_for_year(pool: &MySqlPool, year: i32) -> Result<Arc<Vec<Holiday>>, sqlx::Error> {
    if let Some(cached) = HOLIDAY_CACHE.get(&year).await {
        return Ok(cached);
    }

    let holidays = Arc::new(load_year(pool, year).await?);
    HOLIDAY_CACHE.insert(year, holidays.clone()).await;
    Ok(holidays)
}

/// Calendar covering every year touched by `[from, to]`.
pub async fn calendar_between(
    pool: &MySqlPool,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<HolidayCalendar, sqlx::Error> {
    let mut all = Vec::new();
    for year in from.year().min(to.year())..=from.year().max(to.year()) {
        all.extend(holidays_for_year(pool, year).await?.iter().cloned());
    }
    Ok(HolidayCalendar::from_holidays(all.iter()))
}

pub async fn invalidate(year: i32) {
    HOLIDAY_CACHE.invalidate(&year).await;
}

/// Preload the current and next year.
pub async fn warmup_holiday_cache(pool: &MySqlPool, current_year: i32) -> Result<()> {
    let mut total = 0usize;
    for year in [current_year, current_year + 1] {
        total += holidays_for_year(pool, year).await?.len();
    }

    log::info!(
        "Holiday cache warmup complete: {} holidays for {}-{}",
        total,
        current_year,
        current_year + 1
    );
    Ok(())
}
