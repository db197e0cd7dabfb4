use crate::{
    api::{EmployeeKey, review::ensure_reviewer},
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::{
        attendance::Attendance,
        employee::Employee,
        regularization::Regularization,
        status::{PunchType, RequestAction, RequestStatus},
    },
    notify::Notifier,
    utils::{
        calendar::{local_now, parse_date, week_range},
        db_utils::{find_employee_by_id, require_employee},
        holiday_cache::calendar_between,
        hours::{
            Punch, average_active_minutes, break_minutes, effective_minutes, format_clock, format_minutes,
            format_week_diff, pair_punches, parse_clock, sum_punch_pairs,
        },
    },
};
use actix_web::{HttpResponse, web};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, MySqlPool};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

const ATTENDANCE_COLUMNS: &str =
    "id, employee_id, date, check_in, check_out, break_minutes, worked_hours, status, is_weekend, is_holiday";

const HISTORY_DAYS: i64 = 30;

#[derive(Deserialize, ToSchema)]
pub struct ClockReq {
    /// Admins may clock on behalf of another employee
    #[schema(value_type = Option<String>, example = "MW-001")]
    pub employee_id: Option<EmployeeKey>,
    #[schema(example = "Banjara Hills, Hyderabad")]
    pub location: Option<String>,
    /// `IN` or `OUT`; toggles when omitted
    #[serde(rename = "type")]
    #[schema(value_type = Option<String>, example = "IN")]
    pub punch_type: Option<PunchType>,
}

#[derive(Serialize, ToSchema)]
pub struct DaySummary {
    #[schema(example = "09:12 AM")]
    pub check_in: String,
    #[schema(example = "-")]
    pub check_out: String,
    #[schema(example = "-")]
    pub worked_hours: String,
    pub break_minutes: i32,
    #[schema(example = "Present")]
    pub status: String,
}

impl DaySummary {
    fn from_row(row: Option<&Attendance>) -> Self {
        let clock = |t: Option<NaiveTime>| t.map(format_clock).unwrap_or_else(|| "-".to_string());
        match row {
            Some(r) => DaySummary {
                check_in: clock(r.check_in),
                check_out: clock(r.check_out),
                worked_hours: r.worked_hours.clone().unwrap_or_else(|| "-".to_string()),
                break_minutes: r.break_minutes,
                status: r.status.clone(),
            },
            None => DaySummary {
                check_in: "-".into(),
                check_out: "-".into(),
                worked_hours: "-".into(),
                break_minutes: 0,
                status: "-".into(),
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ClockResponse {
    #[schema(example = "Clocked in successfully")]
    pub message: String,
    #[serde(rename = "type")]
    #[schema(example = "IN")]
    pub punch_type: String,
    #[schema(example = "09:12 AM")]
    pub time: String,
    /// The day is covered by an approved leave
    pub on_leave: bool,
    pub summary: DaySummary,
}

#[derive(FromRow)]
struct LogRow {
    punch_type: String,
    timestamp: NaiveDateTime,
}

impl LogRow {
    fn punch(&self) -> Option<Punch> {
        PunchType::from_str(&self.punch_type)
            .ok()
            .map(|kind| Punch::new(self.timestamp, kind))
    }
}

/// Change applied to the day's summary row by one punch.
#[derive(Debug, PartialEq)]
enum SummaryChange {
    CheckIn(NaiveTime),
    AddBreak(i32),
    CheckOut { at: NaiveTime, worked_hours: String },
    Unchanged,
}

fn next_punch(last: Option<PunchType>) -> PunchType {
    match last {
        Some(PunchType::In) => PunchType::Out,
        _ => PunchType::In,
    }
}

fn summary_change(
    check_in: Option<NaiveTime>,
    break_mins: i32,
    kind: PunchType,
    now: NaiveDateTime,
    last: Option<Punch>,
) -> SummaryChange {
    match (kind, check_in) {
        (PunchType::In, None) => SummaryChange::CheckIn(now.time()),
        (PunchType::In, Some(_)) => match last {
            Some(p) if p.kind == PunchType::Out && now > p.at => {
                let gap = ((now - p.at).num_seconds() as f64 / 60.0).round() as i32;
                SummaryChange::AddBreak(gap)
            }
            _ => SummaryChange::Unchanged,
        },
        (PunchType::Out, Some(first_in)) => SummaryChange::CheckOut {
            at: now.time(),
            worked_hours: format_minutes(effective_minutes(
                now.date().and_time(first_in),
                now,
                break_mins as i64,
            )),
        },
        (PunchType::Out, None) => SummaryChange::Unchanged,
    }
}

async fn fetch_day(pool: &MySqlPool, employee_id: u64, date: NaiveDate) -> Result<Option<Attendance>, sqlx::Error> {
    sqlx::query_as::<_, Attendance>(&format!(
        "SELECT {} FROM attendance WHERE employee_id = ? AND date = ?",
        ATTENDANCE_COLUMNS
    ))
    .bind(employee_id)
    .bind(date)
    .fetch_optional(pool)
    .await
}

async fn punches_between(
    pool: &MySqlPool,
    employee_id: u64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<BTreeMap<NaiveDate, Vec<Punch>>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LogRow>(
        r#"
        SELECT punch_type, timestamp
        FROM attendance_logs
        WHERE employee_id = ? AND date BETWEEN ? AND ?
        ORDER BY timestamp, id
        "#,
    )
    .bind(employee_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    let mut by_day: BTreeMap<NaiveDate, Vec<Punch>> = BTreeMap::new();
    for punch in rows.iter().filter_map(LogRow::punch) {
        by_day.entry(punch.at.date()).or_default().push(punch);
    }
    Ok(by_day)
}

async fn on_approved_leave(pool: &MySqlPool, employee_id: u64, date: NaiveDate) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM leaves
            WHERE employee_id = ? AND status = 'Approved' AND from_date <= ? AND to_date >= ?
        )
        "#,
    )
    .bind(employee_id)
    .bind(date)
    .bind(date)
    .fetch_one(pool)
    .await
}

/// Resolves a path key and checks the caller may read that employee's records.
async fn readable_employee(pool: &MySqlPool, auth: &AuthUser, key: &str) -> ApiResult<Employee> {
    let emp = require_employee(pool, key).await?;
    auth.require_self_or_reviewer(emp.id)?;
    Ok(emp)
}

async fn clock_target(pool: &MySqlPool, auth: &AuthUser, key: Option<&EmployeeKey>) -> ApiResult<Employee> {
    let emp = match key {
        Some(k) => require_employee(pool, &k.as_key()).await?,
        None => find_employee_by_id(pool, auth.require_employee_id()?)
            .await?
            .ok_or_else(|| ApiError::not_found("Employee not found"))?,
    };
    if !auth.is_admin() && auth.employee_id != Some(emp.id) {
        return Err(ApiError::forbidden("You can only clock in for yourself"));
    }
    if emp.is_inactive() {
        return Err(ApiError::forbidden("Your account is inactive. Please contact HR."));
    }
    Ok(emp)
}

/// Clock in or out
#[utoipa::path(
    post,
    path = "/api/attendance/clock",
    request_body = ClockReq,
    responses(
        (status = 200, description = "Punch recorded", body = ClockResponse),
        (status = 403, description = "Inactive account or another employee"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn clock(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<ClockReq>,
) -> ApiResult<HttpResponse> {
    let emp = clock_target(pool.get_ref(), &auth, payload.employee_id.as_ref()).await?;

    let now = local_now(config.tz_offset_minutes);
    let now = now.with_nanosecond(0).unwrap_or(now);
    let today = now.date();

    let calendar = calendar_between(pool.get_ref(), today, today).await?;
    let on_leave = on_approved_leave(pool.get_ref(), emp.id, today).await?;

    let mut tx = pool.begin().await?;

    let last = sqlx::query_as::<_, LogRow>(
        r#"
        SELECT punch_type, timestamp FROM attendance_logs
        WHERE employee_id = ? AND date = ?
        ORDER BY timestamp DESC, id DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(emp.id)
    .bind(today)
    .fetch_optional(&mut *tx)
    .await?
    .and_then(|row| row.punch());

    let kind = payload.punch_type.unwrap_or_else(|| next_punch(last.map(|p| p.kind)));

    sqlx::query(
        r#"
        INSERT INTO attendance_logs (employee_id, timestamp, punch_type, location, date)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(emp.id)
    .bind(now)
    .bind(kind.as_ref())
    .bind(&payload.location)
    .bind(today)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO attendance (employee_id, date, status, is_weekend, is_holiday)
        VALUES (?, ?, 'Present', ?, ?)
        ON DUPLICATE KEY UPDATE status = 'Present'
        "#,
    )
    .bind(emp.id)
    .bind(today)
    .bind(today.weekday() == Weekday::Sun)
    .bind(calendar.is_holiday(today))
    .execute(&mut *tx)
    .await?;

    let (check_in, break_mins): (Option<NaiveTime>, i32) = sqlx::query_as(
        "SELECT check_in, break_minutes FROM attendance WHERE employee_id = ? AND date = ? FOR UPDATE",
    )
    .bind(emp.id)
    .bind(today)
    .fetch_one(&mut *tx)
    .await?;

    match summary_change(check_in, break_mins, kind, now, last) {
        SummaryChange::CheckIn(at) => {
            sqlx::query("UPDATE attendance SET check_in = ? WHERE employee_id = ? AND date = ?")
                .bind(at)
                .bind(emp.id)
                .bind(today)
                .execute(&mut *tx)
                .await?;
        }
        SummaryChange::AddBreak(gap) => {
            sqlx::query(
                "UPDATE attendance SET break_minutes = break_minutes + ? WHERE employee_id = ? AND date = ?",
            )
            .bind(gap)
            .bind(emp.id)
            .bind(today)
            .execute(&mut *tx)
            .await?;
        }
        SummaryChange::CheckOut { at, worked_hours } => {
            sqlx::query(
                "UPDATE attendance SET check_out = ?, worked_hours = ? WHERE employee_id = ? AND date = ?",
            )
            .bind(at)
            .bind(worked_hours)
            .bind(emp.id)
            .bind(today)
            .execute(&mut *tx)
            .await?;
        }
        SummaryChange::Unchanged => {}
    }

    tx.commit().await?;

    let summary = fetch_day(pool.get_ref(), emp.id, today).await?;
    info!(employee_id = %emp.employee_id, punch = %kind, on_leave, "Attendance punch recorded");

    let message = match kind {
        PunchType::In => "Clocked in successfully",
        PunchType::Out => "Clocked out successfully",
    };

    Ok(HttpResponse::Ok().json(ClockResponse {
        message: message.to_string(),
        punch_type: kind.to_string(),
        time: format_clock(now.time()),
        on_leave,
        summary: DaySummary::from_row(summary.as_ref()),
    }))
}

/// Current punch state and today's summary
#[utoipa::path(
    get,
    path = "/api/attendance/status/{employee_id}",
    params(("employee_id" = String, Path, description = "Business code or numeric id")),
    responses(
        (status = 200, description = "Current state", body = Object, example = json!({
            "status": "IN",
            "last_punch": "09:12 AM",
            "summary": {"check_in": "09:12 AM", "check_out": "-", "worked_hours": "-", "break_minutes": 0, "status": "Present"}
        })),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let emp = readable_employee(pool.get_ref(), &auth, &path).await?;
    let today = local_now(config.tz_offset_minutes).date();

    let last = sqlx::query_as::<_, LogRow>(
        r#"
        SELECT punch_type, timestamp FROM attendance_logs
        WHERE employee_id = ?
        ORDER BY timestamp DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(emp.id)
    .fetch_optional(pool.get_ref())
    .await?
    .and_then(|row| row.punch());

    let clocked_in = last.is_some_and(|p| p.kind == PunchType::In && p.at.date() == today);
    let summary = fetch_day(pool.get_ref(), emp.id, today).await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": if clocked_in { "IN" } else { "OUT" },
        "last_punch": last.map(|p| format_clock(p.at.time())),
        "summary": DaySummary::from_row(summary.as_ref()),
    })))
}

/// Per-day minutes from punches; today's open interval runs to `now`.
fn daily_minutes(days: &BTreeMap<NaiveDate, Vec<Punch>>, from: NaiveDate, to: NaiveDate, now: NaiveDateTime) -> Vec<f64> {
    days.range(from..=to)
        .map(|(date, punches)| {
            let open_until = (*date == now.date()).then_some(now);
            sum_punch_pairs(punches, open_until)
        })
        .collect()
}

/// Week-over-week working hours
#[utoipa::path(
    get,
    path = "/api/attendance/stats/{employee_id}",
    params(("employee_id" = String, Path, description = "Business code or numeric id")),
    responses(
        (status = 200, description = "Weekly averages", body = Object, example = json!({
            "avg_working_hours": "8h 5m",
            "this_week_mins": 485,
            "last_week_mins": 420,
            "diff_label": "+1h 5m vs last week",
            "diff_status": "up"
        })),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let emp = readable_employee(pool.get_ref(), &auth, &path).await?;
    let now = local_now(config.tz_offset_minutes);

    let (this_monday, this_sunday) = week_range(now.date());
    let last_monday = this_monday - Duration::days(7);
    let last_sunday = this_monday - Duration::days(1);

    let days = punches_between(pool.get_ref(), emp.id, last_monday, this_sunday).await?;
    let this_week = average_active_minutes(&daily_minutes(&days, this_monday, this_sunday, now));
    let last_week = average_active_minutes(&daily_minutes(&days, last_monday, last_sunday, now));
    let (diff_label, diff_status) = format_week_diff(this_week, last_week);

    Ok(HttpResponse::Ok().json(json!({
        "avg_working_hours": format_minutes(this_week),
        "this_week_mins": this_week.floor() as i64,
        "last_week_mins": last_week.floor() as i64,
        "diff_label": diff_label,
        "diff_status": diff_status,
    })))
}

#[derive(Serialize, ToSchema)]
pub struct PairView {
    #[serde(rename = "in")]
    #[schema(example = "09:12 AM")]
    pub clock_in: String,
    #[serde(rename = "out")]
    #[schema(example = "01:05 PM")]
    pub clock_out: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDay {
    #[schema(example = "2026-03-02", value_type = String, format = "date")]
    pub date: NaiveDate,
    pub check_in: String,
    pub check_out: String,
    pub worked_hours: String,
    pub break_minutes: i64,
    pub status: String,
    pub is_weekend: bool,
    pub is_holiday: bool,
    pub pairs: Vec<PairView>,
}

fn history_day(row: &Attendance, punches: &[Punch]) -> HistoryDay {
    let still_open = punches.last().is_some_and(|p| p.kind == PunchType::In);
    let summary = DaySummary::from_row(Some(row));

    HistoryDay {
        date: row.date,
        check_in: summary.check_in,
        check_out: if still_open { "-".to_string() } else { summary.check_out },
        worked_hours: summary.worked_hours,
        break_minutes: if punches.is_empty() {
            row.break_minutes as i64
        } else {
            break_minutes(punches)
        },
        status: summary.status,
        is_weekend: row.is_weekend,
        is_holiday: row.is_holiday,
        pairs: pair_punches(punches)
            .into_iter()
            .map(|p| PairView {
                clock_in: format_clock(p.clock_in.time()),
                clock_out: p.clock_out.map(|t| format_clock(t.time())),
            })
            .collect(),
    }
}

/// Last 30 days of attendance, newest first
#[utoipa::path(
    get,
    path = "/api/attendance/history/{employee_id}",
    params(("employee_id" = String, Path, description = "Business code or numeric id")),
    responses((status = 200, description = "History", body = [HistoryDay]), (status = 404, description = "Employee not found")),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let emp = readable_employee(pool.get_ref(), &auth, &path).await?;
    let today = local_now(config.tz_offset_minutes).date();
    let since = today - Duration::days(HISTORY_DAYS - 1);

    let rows = sqlx::query_as::<_, Attendance>(&format!(
        r#"
        SELECT {} FROM attendance
        WHERE employee_id = ? AND date BETWEEN ? AND ?
        ORDER BY date DESC
        "#,
        ATTENDANCE_COLUMNS
    ))
    .bind(emp.id)
    .bind(since)
    .bind(today)
    .fetch_all(pool.get_ref())
    .await?;

    let punches = punches_between(pool.get_ref(), emp.id, since, today).await?;
    let days: Vec<HistoryDay> = rows
        .iter()
        .map(|row| history_day(row, punches.get(&row.date).map(Vec::as_slice).unwrap_or(&[])))
        .collect();

    Ok(HttpResponse::Ok().json(days))
}

#[derive(Deserialize, ToSchema)]
pub struct LocationReq {
    #[schema(example = 17.4126)]
    pub latitude: f64,
    #[schema(example = 78.4482)]
    pub longitude: f64,
}

/// Reverse geocode a coordinate
#[utoipa::path(
    post,
    path = "/api/attendance/resolve-location",
    request_body = LocationReq,
    responses(
        (status = 200, description = "Address", body = Object, example = json!({"address": "Banjara Hills, Hyderabad, Telangana, India"})),
        (status = 400, description = "Coordinates out of range"),
        (status = 502, description = "Geocoding provider failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn resolve_location(
    _auth: AuthUser,
    notifier: web::Data<Notifier>,
    payload: web::Json<LocationReq>,
) -> ApiResult<HttpResponse> {
    if !(-90.0..=90.0).contains(&payload.latitude) || !(-180.0..=180.0).contains(&payload.longitude) {
        return Err(ApiError::bad_request("Invalid coordinates"));
    }

    let address = notifier
        .reverse_geocode(payload.latitude, payload.longitude)
        .await
        .map_err(|e| {
            warn!(error = %e, "Reverse geocoding failed");
            ApiError::BadGateway(format!("Failed to resolve location: {}", e))
        })?;

    Ok(HttpResponse::Ok().json(json!({ "address": address })))
}

#[derive(Deserialize, ToSchema)]
pub struct RegularizeReq {
    #[schema(example = "2026-03-02")]
    pub date: String,
    #[schema(example = "06:30 PM")]
    pub check_out_time: String,
    #[serde(default)]
    #[schema(example = "Forgot to clock out")]
    pub reason: String,
}

/// Request a check-out correction
#[utoipa::path(
    post,
    path = "/api/attendance/regularize",
    request_body = RegularizeReq,
    responses(
        (status = 201, description = "Request submitted", body = Object, example = json!({"message": "Regularization request submitted", "id": 5})),
        (status = 400, description = "Invalid date/time, missing reason or no check-in"),
        (status = 409, description = "Pending request already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn regularize(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<RegularizeReq>,
) -> ApiResult<HttpResponse> {
    let employee_id = auth.require_employee_id()?;
    let today = local_now(config.tz_offset_minutes).date();

    let date = parse_date(&payload.date).ok_or_else(|| ApiError::bad_request("Invalid date, expected YYYY-MM-DD"))?;
    if date > today {
        return Err(ApiError::bad_request("Cannot regularize a future date"));
    }
    let check_out = parse_clock(&payload.check_out_time)
        .ok_or_else(|| ApiError::bad_request("Invalid check_out_time"))?;
    let reason = payload.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::bad_request("Reason is required"));
    }

    let day = fetch_day(pool.get_ref(), employee_id, date).await?;
    let check_in = day
        .and_then(|d| d.check_in)
        .ok_or_else(|| ApiError::bad_request("No check-in found for this date"))?;
    if check_out <= check_in {
        return Err(ApiError::bad_request("Check-out time must be after check-in"));
    }

    let pending: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM regularizations WHERE employee_id = ? AND date = ? AND status = 'Pending')",
    )
    .bind(employee_id)
    .bind(date)
    .fetch_one(pool.get_ref())
    .await?;
    if pending {
        return Err(ApiError::Conflict("A pending request already exists for this date".into()));
    }

    let id = sqlx::query(
        "INSERT INTO regularizations (employee_id, date, check_out_time, reason) VALUES (?, ?, ?, ?)",
    )
    .bind(employee_id)
    .bind(date)
    .bind(check_out)
    .bind(reason)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    Ok(HttpResponse::Created().json(json!({"message": "Regularization request submitted", "id": id})))
}

#[derive(Deserialize, IntoParams)]
pub struct RegularizationScope {
    /// `employee` (default) or `manager`
    pub role: Option<String>,
}

#[derive(Serialize, FromRow, ToSchema)]
pub struct RegularizationView {
    pub id: u64,
    pub employee_id: String,
    pub employee_name: String,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = String, example = "18:30:00")]
    pub check_out_time: NaiveTime,
    pub reason: Option<String>,
    pub status: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

const REGULARIZATION_VIEW: &str = r#"
    SELECT r.id, e.employee_id, TRIM(CONCAT(e.first_name, ' ', COALESCE(e.last_name, ''))) AS employee_name,
           r.date, r.check_out_time, r.reason, r.status, r.created_at
    FROM regularizations r
    JOIN employees e ON e.id = r.employee_id
"#;

/// Own requests, or pending requests to review
#[utoipa::path(
    get,
    path = "/api/attendance/regularization-requests/{employee_id}",
    params(("employee_id" = String, Path, description = "Business code or numeric id"), RegularizationScope),
    responses((status = 200, description = "Requests", body = [RegularizationView])),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn regularization_requests(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    query: web::Query<RegularizationScope>,
) -> ApiResult<HttpResponse> {
    let as_manager = query.role.as_deref().is_some_and(|r| r.eq_ignore_ascii_case("manager"));

    let rows = if as_manager && auth.is_admin() {
        sqlx::query_as::<_, RegularizationView>(&format!(
            "{} WHERE r.status = 'Pending' ORDER BY r.created_at DESC",
            REGULARIZATION_VIEW
        ))
        .fetch_all(pool.get_ref())
        .await?
    } else if as_manager {
        auth.require_manager_or_admin()?;
        let manager_id = auth.require_employee_id()?;
        sqlx::query_as::<_, RegularizationView>(&format!(
            r#"{} WHERE r.status = 'Pending'
              AND r.employee_id IN (
                  SELECT tm.employee_id FROM team_members tm
                  JOIN teams t ON t.id = tm.team_id
                  WHERE t.manager_id = ?
              )
            ORDER BY r.created_at DESC"#,
            REGULARIZATION_VIEW
        ))
        .bind(manager_id)
        .fetch_all(pool.get_ref())
        .await?
    } else {
        let emp = readable_employee(pool.get_ref(), &auth, &path).await?;
        sqlx::query_as::<_, RegularizationView>(&format!(
            "{} WHERE r.employee_id = ? ORDER BY r.created_at DESC",
            REGULARIZATION_VIEW
        ))
        .bind(emp.id)
        .fetch_all(pool.get_ref())
        .await?
    };

    Ok(HttpResponse::Ok().json(rows))
}

#[derive(Deserialize, ToSchema)]
pub struct RegularizationActionReq {
    #[schema(example = "Approve")]
    pub action: String,
}

/// Worked time once a correction fixes the check-out.
fn corrected_hours(date: NaiveDate, check_in: NaiveTime, check_out: NaiveTime, break_mins: i32) -> String {
    format_minutes(effective_minutes(
        date.and_time(check_in),
        date.and_time(check_out),
        break_mins as i64,
    ))
}

/// Approve or reject a regularization
#[utoipa::path(
    post,
    path = "/api/attendance/regularization/{id}/action",
    params(("id" = u64, Path, description = "Regularization id")),
    request_body = RegularizationActionReq,
    responses(
        (status = 200, description = "Decision applied"),
        (status = 400, description = "Invalid action or not pending"),
        (status = 403, description = "Manager/Admin only"),
        (status = 404, description = "Request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn regularization_action(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<RegularizationActionReq>,
) -> ApiResult<HttpResponse> {
    auth.require_manager_or_admin()?;
    let action = RequestAction::from_str(payload.action.trim())
        .map_err(|_| ApiError::bad_request("Action must be Approve or Reject"))?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;

    let request = sqlx::query_as::<_, Regularization>(
        r#"
        SELECT id, employee_id, date, check_out_time, reason, status, reviewed_by, created_at
        FROM regularizations WHERE id = ? FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Regularization request not found"))?;

    ensure_reviewer(&mut *tx, &auth, request.employee_id).await?;

    if request.status != RequestStatus::Pending.as_ref() {
        return Err(ApiError::bad_request(format!(
            "Request already processed (status: {})",
            request.status
        )));
    }

    let status = action.resulting_status();
    sqlx::query("UPDATE regularizations SET status = ?, reviewed_by = ? WHERE id = ?")
        .bind(status.as_ref())
        .bind(&auth.user_key)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if status == RequestStatus::Approved {
        let day: Option<(Option<NaiveTime>, i32)> = sqlx::query_as(
            "SELECT check_in, break_minutes FROM attendance WHERE employee_id = ? AND date = ? FOR UPDATE",
        )
        .bind(request.employee_id)
        .bind(request.date)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((Some(check_in), break_mins)) = day else {
            return Err(ApiError::bad_request("No check-in found for this date"));
        };

        sqlx::query(
            "UPDATE attendance SET check_out = ?, worked_hours = ? WHERE employee_id = ? AND date = ?",
        )
        .bind(request.check_out_time)
        .bind(corrected_hours(request.date, check_in, request.check_out_time, break_mins))
        .bind(request.employee_id)
        .bind(request.date)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(id, status = %status, reviewer = %auth.user_key, "Regularization decided");

    Ok(HttpResponse::Ok().json(json!({ "message": format!("Request {}", status.as_ref().to_lowercase()) })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{bearer, lazy_pool, seed_employee, seed_team};
    use crate::model::role::Role;
    use actix_web::{App, test};
    use serde_json::Value;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[::core::prelude::v1::test]
    fn punches_toggle() {
        assert_eq!(next_punch(None), PunchType::In);
        assert_eq!(next_punch(Some(PunchType::Out)), PunchType::In);
        assert_eq!(next_punch(Some(PunchType::In)), PunchType::Out);
    }

    #[::core::prelude::v1::test]
    fn first_in_sets_check_in() {
        assert_eq!(
            summary_change(None, 0, PunchType::In, at(9, 12), None),
            SummaryChange::CheckIn(time(9, 12))
        );
    }

    #[::core::prelude::v1::test]
    fn in_after_out_records_the_break() {
        let last = Punch::new(at(13, 0), PunchType::Out);
        assert_eq!(
            summary_change(Some(time(9, 0)), 0, PunchType::In, at(13, 45), Some(last)),
            SummaryChange::AddBreak(45)
        );
        // repeated IN without an OUT in between
        let last = Punch::new(at(9, 0), PunchType::In);
        assert_eq!(
            summary_change(Some(time(9, 0)), 0, PunchType::In, at(9, 5), Some(last)),
            SummaryChange::Unchanged
        );
    }

    #[::core::prelude::v1::test]
    fn out_recomputes_worked_hours_net_of_breaks() {
        let change = summary_change(Some(time(9, 0)), 45, PunchType::Out, at(18, 15), None);
        assert_eq!(
            change,
            SummaryChange::CheckOut {
                at: time(18, 15),
                worked_hours: "8h 30m".into()
            }
        );
        assert_eq!(
            summary_change(None, 0, PunchType::Out, at(18, 0), None),
            SummaryChange::Unchanged
        );
    }

    #[::core::prelude::v1::test]
    fn history_hides_check_out_while_open() {
        let row = Attendance {
            id: 1,
            employee_id: 1,
            date: at(0, 0).date(),
            check_in: Some(time(9, 0)),
            check_out: Some(time(13, 0)),
            break_minutes: 0,
            worked_hours: Some("4h 0m".into()),
            status: "Present".into(),
            is_weekend: false,
            is_holiday: false,
        };
        let punches = vec![
            Punch::new(at(9, 0), PunchType::In),
            Punch::new(at(13, 0), PunchType::Out),
            Punch::new(at(13, 40), PunchType::In),
        ];

        let day = history_day(&row, &punches);
        assert_eq!(day.check_out, "-");
        assert_eq!(day.break_minutes, 40);
        assert_eq!(day.pairs.len(), 2);
        assert_eq!(day.pairs[1].clock_out, None);

        let closed = history_day(&row, &punches[..2]);
        assert_eq!(closed.check_out, "01:00 PM");
    }

    #[::core::prelude::v1::test]
    fn daily_minutes_count_today_up_to_now() {
        let mut days = BTreeMap::new();
        days.insert(at(0, 0).date(), vec![Punch::new(at(9, 0), PunchType::In)]);
        let date = at(0, 0).date();
        assert_eq!(daily_minutes(&days, date, date, at(11, 30)), vec![150.0]);
    }

    #[::core::prelude::v1::test]
    fn corrected_hours_subtract_breaks() {
        let date = at(0, 0).date();
        assert_eq!(corrected_hours(date, time(9, 30), time(18, 30), 60), "8h 0m");
        assert_eq!(corrected_hours(date, time(9, 30), time(9, 0), 0), "0h 0m");
    }

    #[actix_web::test]
    async fn only_reviewers_decide_regularizations() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/regularization/{id}/action", web::post().to(regularization_action)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/regularization/3/action")
            .insert_header(bearer(Role::Employee, Some(4)))
            .set_json(json!({"action": "Approve"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 403);

        let req = test::TestRequest::post()
            .uri("/regularization/3/action")
            .insert_header(bearer(Role::Manager, Some(2)))
            .set_json(json!({"action": "maybe"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn regularize_rejects_bad_dates_before_touching_the_database() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/regularize", web::post().to(regularize)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/regularize")
            .insert_header(bearer(Role::Employee, Some(4)))
            .set_json(json!({"date": "yesterday", "check_out_time": "06:30 PM"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let req = test::TestRequest::post()
            .uri("/regularize")
            .insert_header(bearer(Role::Employee, Some(4)))
            .set_json(json!({"date": "2999-01-01", "check_out_time": "06:30 PM", "reason": "Forgot"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn regularize_requires_a_reason() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/regularize", web::post().to(regularize)),
        )
        .await;

        for body in [
            json!({"date": "2026-03-02", "check_out_time": "06:30 PM"}),
            json!({"date": "2026-03-02", "check_out_time": "06:30 PM", "reason": "   "}),
        ] {
            let req = test::TestRequest::post()
                .uri("/regularize")
                .insert_header(bearer(Role::Employee, Some(4)))
                .set_json(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 400);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "Reason is required");
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn clock_toggles_and_counts_the_break(pool: MySqlPool) {
        let emp = seed_employee(&pool, "MW-301").await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/clock", web::post().to(clock)),
        )
        .await;

        let punch = || {
            test::TestRequest::post()
                .uri("/clock")
                .insert_header(bearer(Role::Employee, Some(emp)))
                .set_json(json!({"location": "Office"}))
                .to_request()
        };

        let first: Value = test::call_and_read_body_json(&app, punch()).await;
        assert_eq!(first["type"], "IN");
        let check_in = first["summary"]["check_in"].clone();
        assert_ne!(check_in, "-");

        let second: Value = test::call_and_read_body_json(&app, punch()).await;
        assert_eq!(second["type"], "OUT");
        assert_eq!(second["summary"]["worked_hours"], "0h 0m");

        // pretend the IN happened 30 minutes ago and the OUT 20 minutes ago
        sqlx::query(
            r#"
            UPDATE attendance_logs
            SET timestamp = timestamp - INTERVAL (CASE punch_type WHEN 'IN' THEN 30 ELSE 20 END) MINUTE
            WHERE employee_id = ?
            "#,
        )
        .bind(emp)
        .execute(&pool)
        .await
        .unwrap();

        let third: Value = test::call_and_read_body_json(&app, punch()).await;
        assert_eq!(third["type"], "IN");
        assert_eq!(third["summary"]["break_minutes"], 20);
        assert_eq!(third["summary"]["check_in"], check_in);

        let logs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance_logs WHERE employee_id = ?")
            .bind(emp)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(logs, 3);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn regularizations_are_decided_by_the_applicants_manager(pool: MySqlPool) {
        let applicant = seed_employee(&pool, "MW-311").await;
        let own_manager = seed_employee(&pool, "MW-312").await;
        let other_manager = seed_employee(&pool, "MW-313").await;
        seed_team(&pool, "Support", Some(own_manager), &[applicant]).await;
        seed_team(&pool, "Sales", Some(other_manager), &[other_manager]).await;

        sqlx::query("INSERT INTO attendance (employee_id, date, check_in) VALUES (?, '2026-03-02', '09:30:00')")
            .bind(applicant)
            .execute(&pool)
            .await
            .unwrap();
        let id = sqlx::query(
            "INSERT INTO regularizations (employee_id, date, check_out_time, reason) VALUES (?, '2026-03-02', '18:30:00', 'Forgot')",
        )
        .bind(applicant)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_id();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/regularization/{id}/action", web::post().to(regularization_action)),
        )
        .await;
        let decide = |reviewer: u64| {
            test::TestRequest::post()
                .uri(&format!("/regularization/{}/action", id))
                .insert_header(bearer(Role::Manager, Some(reviewer)))
                .set_json(json!({"action": "Approve"}))
                .to_request()
        };

        assert_eq!(test::call_service(&app, decide(other_manager)).await.status(), 403);
        assert_eq!(test::call_service(&app, decide(applicant)).await.status(), 403);
        assert_eq!(test::call_service(&app, decide(own_manager)).await.status(), 200);

        let (status, worked): (String, Option<String>) = sqlx::query_as(
            "SELECT r.status, a.worked_hours FROM regularizations r JOIN attendance a ON a.employee_id = r.employee_id AND a.date = r.date WHERE r.id = ?",
        )
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(status, "Approved");
        assert_eq!(worked.as_deref(), Some("9h 0m"));
    }
}
