use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult, is_unique_violation},
    model::holiday::Holiday,
    utils::{
        calendar::{local_now, parse_date},
        holiday_cache,
    },
};
use actix_web::{HttpResponse, web};
use chrono::Datelike;
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams)]
pub struct YearQuery {
    /// Defaults to the current year
    pub year: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateHoliday {
    #[schema(example = "2026-08-15")]
    pub date: String,
    #[schema(example = "Independence Day")]
    pub name: String,
    #[schema(example = "National Holiday")]
    pub holiday_type: Option<String>,
    /// Optional holidays stay working days
    #[serde(default)]
    pub is_optional: bool,
}

/// Holidays of a year
#[utoipa::path(
    get,
    path = "/api/holidays",
    params(YearQuery),
    responses((status = 200, description = "Holidays ordered by date", body = [Holiday])),
    security(("bearer_auth" = [])),
    tag = "Holidays"
)]
pub async fn list_holidays(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<YearQuery>,
) -> ApiResult<HttpResponse> {
    let year = query
        .year
        .unwrap_or_else(|| local_now(config.tz_offset_minutes).year());
    let holidays = holiday_cache::holidays_for_year(pool.get_ref(), year).await?;
    Ok(HttpResponse::Ok().json(holidays.as_ref()))
}

/// Add a holiday
#[utoipa::path(
    post,
    path = "/api/holidays",
    request_body = CreateHoliday,
    responses(
        (status = 201, description = "Holiday added", body = Object, example = json!({"message": "Holiday added successfully", "id": 7})),
        (status = 400, description = "Invalid date or name"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "A holiday already exists on that date")
    ),
    security(("bearer_auth" = [])),
    tag = "Holidays"
)]
pub async fn create_holiday(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateHoliday>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let date = parse_date(&payload.date).ok_or_else(|| ApiError::bad_request("Invalid date, expected YYYY-MM-DD"))?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Holiday name is required"));
    }
    let holiday_type = payload
        .holiday_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("National Holiday");

    let id = sqlx::query("INSERT INTO holidays (date, name, holiday_type, is_optional) VALUES (?, ?, ?, ?)")
        .bind(date)
        .bind(name)
        .bind(holiday_type)
        .bind(payload.is_optional)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict(format!("A holiday already exists on {}", date))
            } else {
                e.into()
            }
        })?
        .last_insert_id();

    holiday_cache::invalidate(date.year()).await;
    info!(id, %date, name, "Holiday added");

    Ok(HttpResponse::Created().json(json!({"message": "Holiday added successfully", "id": id})))
}
