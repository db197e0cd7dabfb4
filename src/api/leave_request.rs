use crate::{
    api::{
        EmployeeKey,
        review::{
            ActionBody, Decision, EmailActionQuery, NewApplication, RequestKind, email_action_page, ensure_reviewer,
            has_open_overlap, notify_decision, parse_action, parse_range, spawn_review_email, verify_link,
        },
    },
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::{
        employee::{EMPLOYEE_COLUMNS, Employee},
        leave_request::{EmployeeLeaveBalance, LeaveRequest, LeaveType},
        status::{RequestAction, RequestStatus},
    },
    notify::Notifier,
    utils::{
        calendar::{Session, leave_days, local_now},
        db_utils::require_employee,
        holiday_cache::calendar_between,
    },
};
use actix_web::{HttpResponse, web};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, MySqlPool};
use std::collections::HashMap;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const LEAVE_COLUMNS: &str = "id, employee_id, leave_type, from_date, to_date, from_session, to_session, \
     days, reason, notify_to, status, created_at";

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyLeave {
    #[schema(value_type = String, example = "MW-001")]
    pub employee_id: EmployeeKey,
    #[serde(rename = "type")]
    #[schema(example = "CL")]
    pub leave_type: String,
    #[schema(example = "2026-03-02")]
    pub from_date: String,
    #[schema(example = "2026-03-03")]
    pub to_date: String,
    #[schema(value_type = Option<String>, example = "Full Day")]
    pub from_session: Option<Session>,
    #[schema(value_type = Option<String>, example = "First Half")]
    pub to_session: Option<Session>,
    pub reason: Option<String>,
    /// Comma separated names or emails of reviewers
    #[schema(example = "Ravi Kumar")]
    pub notify_to: Option<String>,
}

#[derive(Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaveView {
    pub id: u64,
    #[schema(example = "MW-001")]
    pub employee_id: String,
    #[schema(example = "Asha Rao")]
    pub employee_name: String,
    #[serde(rename = "type")]
    #[schema(example = "CL")]
    pub leave_type: String,
    #[schema(value_type = String, format = "date")]
    pub from_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub to_date: NaiveDate,
    pub from_session: String,
    pub to_session: String,
    #[schema(example = 1.5)]
    pub days: f64,
    pub reason: Option<String>,
    pub notify_to: Option<String>,
    #[schema(example = "Pending")]
    pub status: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

const LEAVE_VIEW: &str = r#"
    SELECT l.id, e.employee_id, TRIM(CONCAT(e.first_name, ' ', COALESCE(e.last_name, ''))) AS employee_name,
           l.leave_type, l.from_date, l.to_date, l.from_session, l.to_session, l.days,
           l.reason, l.notify_to, l.status, l.created_at
    FROM leaves l
    JOIN employees e ON e.id = l.employee_id
"#;

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct BalanceLine {
    #[schema(example = "CL")]
    pub code: String,
    #[schema(example = "Casual Leave")]
    pub name: String,
    pub allocated: f64,
    pub used: f64,
    pub pending: f64,
    pub available: f64,
    /// No ceiling applies (leave without pay)
    pub unlimited: bool,
}

#[derive(Deserialize, IntoParams)]
pub struct YearQuery {
    /// Defaults to the current year
    pub year: Option<i32>,
}

/// Whole years of service on `on`.
pub fn tenure_years(joining_date: Option<NaiveDate>, on: NaiveDate) -> u32 {
    joining_date.and_then(|j| on.years_since(j)).unwrap_or(0)
}

/// Yearly allocation of one leave type for an employee with `years` of service.
pub fn entitlement(leave_type: &LeaveType, years: u32) -> f64 {
    match leave_type.code.to_ascii_uppercase().as_str() {
        "EL" | "SCL" if years < 2 => 0.0,
        "LL" if years < 5 => 0.0,
        "PL" | "CO" | "LWP" => 0.0,
        _ => leave_type.default_days,
    }
}

fn year_start(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Balance per type. Types without a stored allocation fall back to the tenure entitlement.
fn balance_lines(
    types: &[LeaveType],
    stored: &[EmployeeLeaveBalance],
    pending: &HashMap<String, f64>,
    years: u32,
) -> Vec<BalanceLine> {
    types
        .iter()
        .map(|t| {
            let row = stored.iter().find(|b| b.leave_type.eq_ignore_ascii_case(&t.code));
            let allocated = row.map(|b| b.allocated_days).unwrap_or_else(|| entitlement(t, years));
            let used = row.map(|b| b.used_days).unwrap_or(0.0);
            let pending = pending.get(&t.code).copied().unwrap_or(0.0);
            BalanceLine {
                code: t.code.clone(),
                name: t.name.clone(),
                allocated,
                used,
                pending,
                available: (allocated - used - pending).max(0.0),
                unlimited: t.is_unlimited(),
            }
        })
        .collect()
}

async fn leave_types(pool: &MySqlPool) -> Result<Vec<LeaveType>, sqlx::Error> {
    sqlx::query_as::<_, LeaveType>("SELECT code, name, default_days, is_paid FROM leave_types ORDER BY code")
        .fetch_all(pool)
        .await
}

async fn balances_for(pool: &MySqlPool, emp: &Employee, year: i32) -> Result<Vec<BalanceLine>, sqlx::Error> {
    let types = leave_types(pool).await?;

    let stored = sqlx::query_as::<_, EmployeeLeaveBalance>(
        r#"
        SELECT employee_id, leave_type, year, allocated_days, used_days
        FROM employee_leave_balances
        WHERE employee_id = ? AND year = ?
        "#,
    )
    .bind(emp.id)
    .bind(year)
    .fetch_all(pool)
    .await?;

    let pending: HashMap<String, f64> = sqlx::query_as::<_, (String, f64)>(
        r#"
        SELECT leave_type, SUM(days)
        FROM leaves
        WHERE employee_id = ? AND status = 'Pending' AND YEAR(from_date) = ?
        GROUP BY leave_type
        "#,
    )
    .bind(emp.id)
    .bind(year)
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    Ok(balance_lines(&types, &stored, &pending, tenure_years(emp.joining_date, year_start(year))))
}

/// Apply for leave
#[utoipa::path(
    post,
    path = "/api/leaves/apply",
    request_body = ApplyLeave,
    responses(
        (status = 201, description = "Leave submitted", body = Object, example = json!({"message": "Leave applied successfully", "id": 12, "days": 1.5})),
        (status = 400, description = "Invalid dates, overlap or insufficient balance"),
        (status = 403, description = "Applying for someone else"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn apply_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    notifier: web::Data<Notifier>,
    payload: web::Json<ApplyLeave>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();
    let (from, to) = parse_range(&payload.from_date, &payload.to_date)?;
    let from_session = payload.from_session.unwrap_or_default();
    let to_session = payload.to_session.unwrap_or_default();

    let emp = require_employee(pool.get_ref(), &payload.employee_id.as_key()).await?;
    if !auth.is_admin() && auth.employee_id != Some(emp.id) {
        return Err(ApiError::forbidden("You can only apply leave for yourself"));
    }

    let code = payload.leave_type.trim().to_ascii_uppercase();
    let leave_type = leave_types(pool.get_ref())
        .await?
        .into_iter()
        .find(|t| t.code == code)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown leave type '{}'", payload.leave_type)))?;

    let calendar = calendar_between(pool.get_ref(), from, to).await?;
    let days = leave_days(&calendar, from, to, from_session, to_session);
    if days <= 0.0 {
        return Err(ApiError::bad_request("Selected dates contain no working days"));
    }

    if has_open_overlap(pool.get_ref(), RequestKind::Leave, emp.id, from, to).await? {
        return Err(ApiError::bad_request("Leave already applied for this date range"));
    }
    if has_open_overlap(pool.get_ref(), RequestKind::Wfh, emp.id, from, to).await? {
        return Err(ApiError::bad_request("A WFH request already exists for this date range"));
    }

    if !leave_type.is_unlimited() {
        let available = balances_for(pool.get_ref(), &emp, from.year())
            .await?
            .into_iter()
            .find(|b| b.code == leave_type.code)
            .map(|b| b.available)
            .unwrap_or(0.0);
        if days > available {
            return Err(ApiError::bad_request(format!(
                "Insufficient leave balance. Available: {} day(s), requested: {} day(s)",
                available, days
            )));
        }
    }

    let id = sqlx::query(
        r#"
        INSERT INTO leaves
            (employee_id, leave_type, from_date, to_date, from_session, to_session, days, reason, notify_to)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(emp.id)
    .bind(&leave_type.code)
    .bind(from)
    .bind(to)
    .bind(from_session.as_ref())
    .bind(to_session.as_ref())
    .bind(days)
    .bind(&payload.reason)
    .bind(&payload.notify_to)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    info!(id, employee_id = %emp.employee_id, leave_type = %leave_type.code, days, "Leave applied");

    spawn_review_email(
        pool.get_ref().clone(),
        config.get_ref().clone(),
        notifier.get_ref().clone(),
        NewApplication {
            kind: RequestKind::Leave,
            id,
            employee: emp,
            from,
            to,
            details: vec![("LEAVE TYPE", leave_type.name), ("DAYS", days.to_string())],
            reason: payload.reason,
            notify_to: payload.notify_to,
        },
    );

    Ok(HttpResponse::Created().json(json!({"message": "Leave applied successfully", "id": id, "days": days})))
}

/// Pending leave requests to review
#[utoipa::path(
    get,
    path = "/api/leaves/pending",
    responses((status = 200, description = "Pending requests", body = [LeaveView]), (status = 403, description = "Manager/Admin only")),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn pending_leaves(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    auth.require_manager_or_admin()?;

    let rows = if auth.is_admin() {
        sqlx::query_as::<_, LeaveView>(&format!(
            "{} WHERE l.status = 'Pending' ORDER BY l.created_at DESC",
            LEAVE_VIEW
        ))
        .fetch_all(pool.get_ref())
        .await?
    } else {
        sqlx::query_as::<_, LeaveView>(&format!(
            r#"{} WHERE l.status = 'Pending'
              AND l.employee_id IN (
                  SELECT tm.employee_id FROM team_members tm
                  JOIN teams t ON t.id = tm.team_id
                  WHERE t.manager_id = ?
              )
            ORDER BY l.created_at DESC"#,
            LEAVE_VIEW
        ))
        .bind(auth.require_employee_id()?)
        .fetch_all(pool.get_ref())
        .await?
    };

    Ok(HttpResponse::Ok().json(rows))
}

/// Leave balance per type
#[utoipa::path(
    get,
    path = "/api/leaves/balance/{employee_id}",
    params(("employee_id" = String, Path, description = "Business code or numeric id"), YearQuery),
    responses(
        (status = 200, description = "Balances", body = Object, example = json!({
            "year": 2026,
            "balances": [{"code": "CL", "name": "Casual Leave", "allocated": 12.0, "used": 2.0, "pending": 1.0, "available": 9.0, "unlimited": false}],
            "total": 9.0
        })),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<String>,
    query: web::Query<YearQuery>,
) -> ApiResult<HttpResponse> {
    let emp = require_employee(pool.get_ref(), &path).await?;
    auth.require_self_or_reviewer(emp.id)?;

    let year = query
        .year
        .unwrap_or_else(|| local_now(config.tz_offset_minutes).year());
    let balances = balances_for(pool.get_ref(), &emp, year).await?;
    let total: f64 = balances.iter().filter(|b| !b.unlimited).map(|b| b.available).sum();

    Ok(HttpResponse::Ok().json(json!({"year": year, "balances": balances, "total": total})))
}

/// An employee's leave requests, newest first
#[utoipa::path(
    get,
    path = "/api/leaves/{employee_id}",
    params(("employee_id" = String, Path, description = "Business code or numeric id")),
    responses((status = 200, description = "Requests", body = [LeaveView]), (status = 404, description = "Employee not found")),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn employee_leaves(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let emp = require_employee(pool.get_ref(), &path).await?;
    auth.require_self_or_reviewer(emp.id)?;

    let rows = sqlx::query_as::<_, LeaveView>(&format!(
        "{} WHERE l.employee_id = ? ORDER BY l.created_at DESC, l.id DESC",
        LEAVE_VIEW
    ))
    .bind(emp.id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

/// Applies a reviewer decision to a pending leave and books approved days.
/// `reviewer` is `None` for signed email links, which only reach resolved reviewers.
async fn decide(
    pool: &MySqlPool,
    notifier: &Notifier,
    reviewer: Option<&AuthUser>,
    id: u64,
    action: RequestAction,
) -> ApiResult<Decision> {
    let mut tx = pool.begin().await?;

    let leave = sqlx::query_as::<_, LeaveRequest>(&format!(
        "SELECT {} FROM leaves WHERE id = ? FOR UPDATE",
        LEAVE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Leave request not found"))?;

    if let Some(auth) = reviewer {
        ensure_reviewer(&mut *tx, auth, leave.employee_id).await?;
    }

    if leave.status != RequestStatus::Pending.as_ref() {
        return Ok(Decision::AlreadyProcessed(leave.status));
    }

    let status = action.resulting_status();
    sqlx::query("UPDATE leaves SET status = ? WHERE id = ?")
        .bind(status.as_ref())
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let emp = sqlx::query_as::<_, Employee>(&format!(
        "SELECT {} FROM employees WHERE id = ?",
        EMPLOYEE_COLUMNS
    ))
    .bind(leave.employee_id)
    .fetch_optional(&mut *tx)
    .await?;

    if status == RequestStatus::Approved {
        let year = leave.from_date.year();
        let leave_type = sqlx::query_as::<_, LeaveType>(
            "SELECT code, name, default_days, is_paid FROM leave_types WHERE code = ?",
        )
        .bind(&leave.leave_type)
        .fetch_one(&mut *tx)
        .await?;
        let years = tenure_years(emp.as_ref().and_then(|e| e.joining_date), year_start(year));

        sqlx::query(
            r#"
            INSERT INTO employee_leave_balances (employee_id, leave_type, year, allocated_days, used_days)
            VALUES (?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE used_days = used_days + VALUES(used_days)
            "#,
        )
        .bind(leave.employee_id)
        .bind(&leave.leave_type)
        .bind(year)
        .bind(entitlement(&leave_type, years))
        .bind(leave.days)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(id, status = %status, "Leave decided");

    notify_decision(
        notifier,
        RequestKind::Leave,
        emp.and_then(|e| e.email),
        status,
        leave.from_date,
        leave.to_date,
    );

    Ok(Decision::Done(status))
}

/// Approve or reject a leave request
#[utoipa::path(
    post,
    path = "/api/leaves/{id}/action",
    params(("id" = u64, Path, description = "Leave request id")),
    request_body = ActionBody,
    responses(
        (status = 200, description = "Decision applied", body = Object, example = json!({"message": "Leave approved", "status": "Approved"})),
        (status = 400, description = "Request already processed"),
        (status = 403, description = "Manager/Admin only"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_action(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    notifier: web::Data<Notifier>,
    path: web::Path<u64>,
    payload: web::Json<ActionBody>,
) -> ApiResult<HttpResponse> {
    auth.require_manager_or_admin()?;
    let status = decide(pool.get_ref(), notifier.get_ref(), Some(&auth), path.into_inner(), payload.action)
        .await?
        .into_status()?;

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Leave {}", status.as_ref().to_lowercase()),
        "status": status,
    })))
}

/// Cancel a pending or approved leave
#[utoipa::path(
    post,
    path = "/api/leaves/{id}/cancel",
    params(("id" = u64, Path, description = "Leave request id")),
    responses(
        (status = 200, description = "Leave cancelled"),
        (status = 400, description = "Not cancellable"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let mut tx = pool.begin().await?;

    let leave = sqlx::query_as::<_, LeaveRequest>(&format!(
        "SELECT {} FROM leaves WHERE id = ? FOR UPDATE",
        LEAVE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Leave request not found"))?;

    if !auth.is_admin() && auth.employee_id != Some(leave.employee_id) {
        return Err(ApiError::forbidden("You can only cancel your own leave"));
    }

    let was_approved = leave.status == RequestStatus::Approved.as_ref();
    if !was_approved && leave.status != RequestStatus::Pending.as_ref() {
        return Err(ApiError::bad_request(format!(
            "Only pending or approved leave can be cancelled (status: {})",
            leave.status
        )));
    }

    sqlx::query("UPDATE leaves SET status = 'Cancelled' WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if was_approved {
        sqlx::query(
            r#"
            UPDATE employee_leave_balances
            SET used_days = GREATEST(used_days - ?, 0)
            WHERE employee_id = ? AND leave_type = ? AND year = ?
            "#,
        )
        .bind(leave.days)
        .bind(leave.employee_id)
        .bind(&leave.leave_type)
        .bind(leave.from_date.year())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(id, restored = was_approved, "Leave cancelled");

    Ok(HttpResponse::Ok().json(json!({"message": "Leave cancelled successfully"})))
}

/// Approve or reject from an email link
#[utoipa::path(
    get,
    path = "/leaves/email-action/{id}/{action}",
    params(
        ("id" = u64, Path, description = "Leave request id"),
        ("action" = String, Path, description = "approve or reject"),
        EmailActionQuery
    ),
    responses(
        (status = 200, description = "HTML confirmation page", content_type = "text/html"),
        (status = 401, description = "Invalid or expired link", content_type = "text/html")
    ),
    tag = "Leave"
)]
pub async fn leave_email_action(
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    notifier: web::Data<Notifier>,
    path: web::Path<(u64, String)>,
    query: web::Query<EmailActionQuery>,
) -> HttpResponse {
    let (id, action) = path.into_inner();
    let outcome = decide_from_link(&pool, &config, &notifier, id, &action, query.token.as_deref()).await;
    email_action_page(RequestKind::Leave, outcome)
}

async fn decide_from_link(
    pool: &MySqlPool,
    config: &Config,
    notifier: &Notifier,
    id: u64,
    action: &str,
    token: Option<&str>,
) -> ApiResult<Decision> {
    verify_link(config, RequestKind::Leave, id, token)?;
    decide(pool, notifier, None, id, parse_action(action)?).await
}

/// Leave types
#[utoipa::path(
    get,
    path = "/api/leaves/types",
    responses((status = 200, description = "Leave types", body = [LeaveType])),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn list_leave_types(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(leave_types(pool.get_ref()).await?))
}

/// Tenure-based allocations for every employee
#[utoipa::path(
    post,
    path = "/api/leaves/allocations",
    params(YearQuery),
    responses(
        (status = 200, description = "Allocations written", body = Object, example = json!({"message": "Leave allocations updated", "year": 2026, "employees": 12})),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn allocate_leaves(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<YearQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let year = query
        .year
        .unwrap_or_else(|| local_now(config.tz_offset_minutes).year());

    let types = leave_types(pool.get_ref()).await?;
    let employees: Vec<(u64, Option<NaiveDate>)> =
        sqlx::query_as("SELECT id, joining_date FROM employees ORDER BY id")
            .fetch_all(pool.get_ref())
            .await?;

    let mut tx = pool.begin().await?;
    for (employee_id, joining_date) in &employees {
        let years = tenure_years(*joining_date, year_start(year));
        for t in &types {
            sqlx::query(
                r#"
                INSERT INTO employee_leave_balances (employee_id, leave_type, year, allocated_days, used_days)
                VALUES (?, ?, ?, ?, 0)
                ON DUPLICATE KEY UPDATE allocated_days = VALUES(allocated_days)
                "#,
            )
            .bind(*employee_id)
            .bind(&t.code)
            .bind(year)
            .bind(entitlement(t, years))
            .execute(&mut *tx)
            .await?;
        }
    }
    tx.commit().await?;

    info!(year, employees = employees.len(), "Leave allocations updated");

    Ok(HttpResponse::Ok().json(json!({
        "message": "Leave allocations updated",
        "year": year,
        "employees": employees.len(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::review::action_links;
    use crate::api::test_support::{bearer, lazy_pool, seed_employee, seed_team};
    use crate::model::role::Role;
    use actix_web::{App, test};
    use serde_json::Value;

    fn notifier() -> web::Data<Notifier> {
        web::Data::new(Notifier::new(&Config::for_tests()).unwrap())
    }

    fn lt(code: &str, days: f64) -> LeaveType {
        LeaveType {
            code: code.into(),
            name: format!("{} leave", code),
            default_days: days,
            is_paid: code != "LWP",
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[::core::prelude::v1::test]
    fn tenure_counts_whole_years() {
        assert_eq!(tenure_years(Some(d(2021, 6, 1)), d(2026, 1, 1)), 4);
        assert_eq!(tenure_years(Some(d(2021, 1, 1)), d(2026, 1, 1)), 5);
        assert_eq!(tenure_years(Some(d(2027, 1, 1)), d(2026, 1, 1)), 0);
        assert_eq!(tenure_years(None, d(2026, 1, 1)), 0);
    }

    #[::core::prelude::v1::test]
    fn entitlements_grow_with_tenure() {
        assert_eq!(entitlement(&lt("CL", 12.0), 0), 12.0);
        assert_eq!(entitlement(&lt("EL", 15.0), 1), 0.0);
        assert_eq!(entitlement(&lt("EL", 15.0), 2), 15.0);
        assert_eq!(entitlement(&lt("SCL", 3.0), 3), 3.0);
        assert_eq!(entitlement(&lt("LL", 90.0), 4), 0.0);
        assert_eq!(entitlement(&lt("LL", 90.0), 5), 90.0);
        assert_eq!(entitlement(&lt("LWP", 0.0), 10), 0.0);
    }

    #[::core::prelude::v1::test]
    fn balance_subtracts_used_and_pending() {
        let types = vec![lt("CL", 12.0), lt("EL", 15.0), lt("LWP", 0.0)];
        let stored = vec![EmployeeLeaveBalance {
            employee_id: 1,
            leave_type: "CL".into(),
            year: 2026,
            allocated_days: 10.0,
            used_days: 3.0,
        }];
        let pending = HashMap::from([("CL".to_string(), 1.5), ("EL".to_string(), 20.0)]);

        let lines = balance_lines(&types, &stored, &pending, 3);
        assert_eq!(lines[0].available, 5.5);
        assert_eq!(lines[1].allocated, 15.0);
        assert_eq!(lines[1].available, 0.0);
        assert!(lines[2].unlimited);
    }

    #[actix_web::test]
    async fn reviewer_endpoints_reject_employees() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .app_data(notifier())
                .route("/api/leaves/pending", web::get().to(pending_leaves))
                .route("/api/leaves/{id}/action", web::post().to(leave_action))
                .route("/api/leaves/allocations", web::post().to(allocate_leaves)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/leaves/pending")
            .insert_header(bearer(Role::Employee, Some(4)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::post()
            .uri("/api/leaves/7/action")
            .insert_header(bearer(Role::Employee, Some(4)))
            .set_json(json!({"action": "Approve"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::post()
            .uri("/api/leaves/allocations?year=2026")
            .insert_header(bearer(Role::Manager, Some(2)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);
    }

    #[actix_web::test]
    async fn apply_validates_dates_first() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .app_data(notifier())
                .route("/api/leaves/apply", web::post().to(apply_leave)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/leaves/apply")
            .insert_header(bearer(Role::Employee, Some(4)))
            .set_json(json!({"employeeId": "MW-004", "type": "CL", "fromDate": "2026-03-05", "toDate": "2026-03-02"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn email_links_need_a_valid_token() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .app_data(notifier())
                .route("/leaves/email-action/{id}/{action}", web::get().to(leave_email_action)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/leaves/email-action/7/approve?token=forged")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    async fn seed_leave(pool: &MySqlPool, employee_id: u64, status: &str) -> u64 {
        sqlx::query(
            r#"
            INSERT INTO leaves (employee_id, leave_type, from_date, to_date, days, reason, status)
            VALUES (?, 'CL', '2026-03-02', '2026-03-03', 2, 'Family function', ?)
            "#,
        )
        .bind(employee_id)
        .bind(status)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_id()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn only_the_applicants_manager_decides_and_approval_books_days(pool: MySqlPool) {
        let applicant = seed_employee(&pool, "MW-401").await;
        let own_manager = seed_employee(&pool, "MW-402").await;
        let other_manager = seed_employee(&pool, "MW-403").await;
        seed_team(&pool, "Design", Some(own_manager), &[applicant]).await;
        seed_team(&pool, "Finance", Some(other_manager), &[]).await;
        let id = seed_leave(&pool, applicant, "Pending").await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(web::Data::new(Config::for_tests()))
                .app_data(notifier())
                .route("/api/leaves/{id}/action", web::post().to(leave_action)),
        )
        .await;
        let decide = |reviewer: u64| {
            test::TestRequest::post()
                .uri(&format!("/api/leaves/{}/action", id))
                .insert_header(bearer(Role::Manager, Some(reviewer)))
                .set_json(json!({"action": "Approve"}))
                .to_request()
        };

        assert_eq!(test::call_service(&app, decide(other_manager)).await.status(), 403);
        assert_eq!(test::call_service(&app, decide(applicant)).await.status(), 403);

        let body: Value = test::call_and_read_body_json(&app, decide(own_manager)).await;
        assert_eq!(body["status"], "Approved");

        let (allocated, used): (f64, f64) = sqlx::query_as(
            "SELECT allocated_days, used_days FROM employee_leave_balances WHERE employee_id = ? AND leave_type = 'CL' AND year = 2026",
        )
        .bind(applicant)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(allocated, 12.0);
        assert_eq!(used, 2.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn email_link_after_a_decision_changes_nothing(pool: MySqlPool) {
        let applicant = seed_employee(&pool, "MW-411").await;
        let id = seed_leave(&pool, applicant, "Approved").await;

        let config = Config::for_tests();
        let (_, reject_url) = action_links(&config, RequestKind::Leave, id).unwrap();
        let token = reject_url.split("token=").nth(1).unwrap().to_string();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(web::Data::new(config))
                .app_data(notifier())
                .route("/leaves/email-action/{id}/{action}", web::get().to(leave_email_action)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/leaves/email-action/{}/reject?token={}", id, token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let page = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&page).contains("Request Already Processed"));

        let status: String = sqlx::query_scalar("SELECT status FROM leaves WHERE id = ?")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "Approved");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn apply_refuses_more_days_than_the_balance(pool: MySqlPool) {
        let emp = seed_employee(&pool, "MW-421").await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(web::Data::new(Config::for_tests()))
                .app_data(notifier())
                .route("/api/leaves/apply", web::post().to(apply_leave)),
        )
        .await;

        // 2 to 16 March: 13 working days once both Sundays are dropped
        let req = test::TestRequest::post()
            .uri("/api/leaves/apply")
            .insert_header(bearer(Role::Employee, Some(emp)))
            .set_json(json!({"employeeId": "MW-421", "type": "CL", "fromDate": "2026-03-02", "toDate": "2026-03-16"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body["error"],
            "Insufficient leave balance. Available: 12 day(s), requested: 13 day(s)"
        );

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leaves WHERE employee_id = ?")
            .bind(emp)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, 0);
    }
}
