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
        status::{RequestAction, RequestStatus},
        work_from_home::WorkFromHome,
    },
    notify::Notifier,
    utils::{
        calendar::{HolidayCalendar, first_sunday_in},
        db_utils::require_employee,
        holiday_cache::calendar_between,
    },
};
use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, MySqlPool};
use tracing::info;
use utoipa::ToSchema;

const WFH_COLUMNS: &str = "id, employee_id, from_date, to_date, days, reason, notify_to, status, created_at";

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyWfh {
    #[schema(value_type = String, example = "MW-001")]
    pub employee_id: EmployeeKey,
    #[schema(example = "2026-03-02")]
    pub from_date: String,
    #[schema(example = "2026-03-03")]
    pub to_date: String,
    pub reason: Option<String>,
    #[schema(example = "Ravi Kumar")]
    pub notify_to: Option<String>,
}

#[derive(Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WfhView {
    pub id: u64,
    #[schema(example = "MW-001")]
    pub employee_id: String,
    #[schema(example = "Asha Rao")]
    pub employee_name: String,
    #[schema(value_type = String, format = "date")]
    pub from_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub to_date: NaiveDate,
    pub days: f64,
    pub reason: Option<String>,
    pub notify_to: Option<String>,
    #[schema(example = "Pending")]
    pub status: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

const WFH_VIEW: &str = r#"
    SELECT w.id, e.employee_id, TRIM(CONCAT(e.first_name, ' ', COALESCE(e.last_name, ''))) AS employee_name,
           w.from_date, w.to_date, w.days, w.reason, w.notify_to, w.status, w.created_at
    FROM work_from_home w
    JOIN employees e ON e.id = w.employee_id
"#;

/// Calendar rules for a WFH range; returns the working-day count.
fn check_wfh_days(calendar: &HolidayCalendar, from: NaiveDate, to: NaiveDate) -> ApiResult<u32> {
    if let Some(sunday) = first_sunday_in(from, to) {
        return Err(ApiError::bad_request(format!(
            "WFH is not allowed on Sundays ({})",
            sunday
        )));
    }
    if let Some((_, name)) = calendar.first_holiday_in(from, to) {
        return Err(ApiError::bad_request(format!(
            "WFH is not allowed on public holidays: {}",
            name
        )));
    }
    Ok(calendar.count_working_days(from, to))
}

/// Apply to work from home
#[utoipa::path(
    post,
    path = "/api/wfh/apply",
    request_body = ApplyWfh,
    responses(
        (status = 201, description = "WFH submitted", body = Object, example = json!({"message": "WFH request submitted successfully", "id": 4})),
        (status = 400, description = "Invalid dates, Sunday, holiday or overlap"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "WFH"
)]
pub async fn apply_wfh(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    notifier: web::Data<Notifier>,
    payload: web::Json<ApplyWfh>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();

    let emp = require_employee(pool.get_ref(), &payload.employee_id.as_key()).await?;
    if !auth.is_admin() && auth.employee_id != Some(emp.id) {
        return Err(ApiError::forbidden("You can only apply WFH for yourself"));
    }

    let (from, to) = parse_range(&payload.from_date, &payload.to_date)?;
    let calendar = calendar_between(pool.get_ref(), from, to).await?;
    let days = check_wfh_days(&calendar, from, to)?;

    if has_open_overlap(pool.get_ref(), RequestKind::Wfh, emp.id, from, to).await? {
        return Err(ApiError::bad_request("You already have a WFH request for these dates"));
    }
    if has_open_overlap(pool.get_ref(), RequestKind::Leave, emp.id, from, to).await? {
        return Err(ApiError::bad_request("You have a leave request overlapping these dates"));
    }

    let id = sqlx::query(
        r#"
        INSERT INTO work_from_home (employee_id, from_date, to_date, days, reason, notify_to)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(emp.id)
    .bind(from)
    .bind(to)
    .bind(days as f64)
    .bind(&payload.reason)
    .bind(&payload.notify_to)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    info!(id, employee_id = %emp.employee_id, days, "WFH applied");

    spawn_review_email(
        pool.get_ref().clone(),
        config.get_ref().clone(),
        notifier.get_ref().clone(),
        NewApplication {
            kind: RequestKind::Wfh,
            id,
            employee: emp,
            from,
            to,
            details: vec![("DAYS", days.to_string())],
            reason: payload.reason,
            notify_to: payload.notify_to,
        },
    );

    Ok(HttpResponse::Created().json(json!({"message": "WFH request submitted successfully", "id": id})))
}

/// An employee's WFH requests, newest first
#[utoipa::path(
    get,
    path = "/api/wfh/{employee_id}",
    params(("employee_id" = String, Path, description = "Business code or numeric id")),
    responses((status = 200, description = "Requests", body = [WfhView]), (status = 404, description = "Employee not found")),
    security(("bearer_auth" = [])),
    tag = "WFH"
)]
pub async fn employee_wfh(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let emp = require_employee(pool.get_ref(), &path).await?;
    auth.require_self_or_reviewer(emp.id)?;

    let rows = sqlx::query_as::<_, WfhView>(&format!(
        "{} WHERE w.employee_id = ? ORDER BY w.created_at DESC, w.id DESC",
        WFH_VIEW
    ))
    .bind(emp.id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

/// Pending WFH requests to review
#[utoipa::path(
    get,
    path = "/api/wfh/pending",
    responses((status = 200, description = "Pending requests", body = [WfhView]), (status = 403, description = "Manager/Admin only")),
    security(("bearer_auth" = [])),
    tag = "WFH"
)]
pub async fn pending_wfh(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    auth.require_manager_or_admin()?;

    let rows = if auth.is_admin() {
        sqlx::query_as::<_, WfhView>(&format!(
            "{} WHERE w.status = 'Pending' ORDER BY w.created_at DESC",
            WFH_VIEW
        ))
        .fetch_all(pool.get_ref())
        .await?
    } else {
        sqlx::query_as::<_, WfhView>(&format!(
            r#"{} WHERE w.status = 'Pending'
              AND w.employee_id IN (
                  SELECT tm.employee_id FROM team_members tm
                  JOIN teams t ON t.id = tm.team_id
                  WHERE t.manager_id = ?
              )
            ORDER BY w.created_at DESC"#,
            WFH_VIEW
        ))
        .bind(auth.require_employee_id()?)
        .fetch_all(pool.get_ref())
        .await?
    };

    Ok(HttpResponse::Ok().json(rows))
}

/// `reviewer` is `None` for signed email links, which only reach resolved reviewers.
async fn decide(
    pool: &MySqlPool,
    notifier: &Notifier,
    reviewer: Option<&AuthUser>,
    id: u64,
    action: RequestAction,
) -> ApiResult<Decision> {
    let mut tx = pool.begin().await?;

    let wfh = sqlx::query_as::<_, WorkFromHome>(&format!(
        "SELECT {} FROM work_from_home WHERE id = ? FOR UPDATE",
        WFH_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("WFH request not found"))?;

    if let Some(auth) = reviewer {
        ensure_reviewer(&mut *tx, auth, wfh.employee_id).await?;
    }

    if wfh.status != RequestStatus::Pending.as_ref() {
        return Ok(Decision::AlreadyProcessed(wfh.status));
    }

    let status = action.resulting_status();
    sqlx::query("UPDATE work_from_home SET status = ? WHERE id = ?")
        .bind(status.as_ref())
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let email: Option<String> = sqlx::query_scalar("SELECT email FROM employees WHERE id = ?")
        .bind(wfh.employee_id)
        .fetch_optional(&mut *tx)
        .await?
        .flatten();

    tx.commit().await?;
    info!(id, status = %status, "WFH decided");

    notify_decision(notifier, RequestKind::Wfh, email, status, wfh.from_date, wfh.to_date);
    Ok(Decision::Done(status))
}

/// Approve or reject a WFH request
#[utoipa::path(
    post,
    path = "/api/wfh/{id}/action",
    params(("id" = u64, Path, description = "WFH request id")),
    request_body = ActionBody,
    responses(
        (status = 200, description = "Decision applied"),
        (status = 400, description = "Request already processed"),
        (status = 403, description = "Manager/Admin only"),
        (status = 404, description = "WFH request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "WFH"
)]
pub async fn wfh_action(
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
        "message": format!("WFH request {}", status.as_ref().to_lowercase()),
        "status": status,
    })))
}

/// Cancel a pending or approved WFH request
#[utoipa::path(
    post,
    path = "/api/wfh/{id}/cancel",
    params(("id" = u64, Path, description = "WFH request id")),
    responses(
        (status = 200, description = "WFH cancelled"),
        (status = 400, description = "Not cancellable"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "WFH request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "WFH"
)]
pub async fn cancel_wfh(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();

    let (employee_id, status): (u64, String) =
        sqlx::query_as("SELECT employee_id, status FROM work_from_home WHERE id = ?")
            .bind(id)
            .fetch_optional(pool.get_ref())
            .await?
            .ok_or_else(|| ApiError::not_found("WFH request not found"))?;

    if !auth.is_admin() && auth.employee_id != Some(employee_id) {
        return Err(ApiError::forbidden("You can only cancel your own WFH request"));
    }

    let cancelled = sqlx::query(
        "UPDATE work_from_home SET status = 'Cancelled' WHERE id = ? AND status IN ('Pending', 'Approved')",
    )
    .bind(id)
    .execute(pool.get_ref())
    .await?
    .rows_affected();

    if cancelled == 0 {
        return Err(ApiError::bad_request(format!(
            "Only pending or approved requests can be cancelled (status: {})",
            status
        )));
    }

    Ok(HttpResponse::Ok().json(json!({"message": "WFH request cancelled successfully"})))
}

/// Approve or reject from an email link
#[utoipa::path(
    get,
    path = "/wfh/email-action/{id}/{action}",
    params(
        ("id" = u64, Path, description = "WFH request id"),
        ("action" = String, Path, description = "approve or reject"),
        EmailActionQuery
    ),
    responses(
        (status = 200, description = "HTML confirmation page", content_type = "text/html"),
        (status = 401, description = "Invalid or expired link", content_type = "text/html")
    ),
    tag = "WFH"
)]
pub async fn wfh_email_action(
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    notifier: web::Data<Notifier>,
    path: web::Path<(u64, String)>,
    query: web::Query<EmailActionQuery>,
) -> HttpResponse {
    let (id, action) = path.into_inner();
    let outcome = decide_from_link(&pool, &config, &notifier, id, &action, query.token.as_deref()).await;
    email_action_page(RequestKind::Wfh, outcome)
}

async fn decide_from_link(
    pool: &MySqlPool,
    config: &Config,
    notifier: &Notifier,
    id: u64,
    action: &str,
    token: Option<&str>,
) -> ApiResult<Decision> {
    verify_link(config, RequestKind::Wfh, id, token)?;
    decide(pool, notifier, None, id, parse_action(action)?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{bearer, seed_employee, seed_team};
    use crate::model::holiday::Holiday;
    use crate::model::role::Role;
    use actix_web::{App, test};
    use serde_json::Value;

    fn notifier() -> web::Data<Notifier> {
        web::Data::new(Notifier::new(&Config::for_tests()).unwrap())
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn calendar() -> HolidayCalendar {
        let holi = Holiday {
            id: 1,
            date: d(4),
            name: "Holi".into(),
            holiday_type: "National Holiday".into(),
            is_optional: false,
        };
        HolidayCalendar::from_holidays([holi].iter())
    }

    #[::core::prelude::v1::test]
    fn wfh_range_counts_working_days() {
        assert_eq!(check_wfh_days(&calendar(), d(2), d(3)).unwrap(), 2);
        assert_eq!(check_wfh_days(&calendar(), d(5), d(7)).unwrap(), 3);
    }

    #[::core::prelude::v1::test]
    fn wfh_rejects_sundays_and_holidays() {
        let err = check_wfh_days(&calendar(), d(6), d(9)).unwrap_err();
        assert!(err.to_string().contains("not allowed on Sundays"));

        let err = check_wfh_days(&calendar(), d(3), d(5)).unwrap_err();
        assert_eq!(err.to_string(), "WFH is not allowed on public holidays: Holi");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn wfh_decisions_stay_within_the_managers_teams(pool: MySqlPool) {
        let applicant = seed_employee(&pool, "MW-501").await;
        let own_manager = seed_employee(&pool, "MW-502").await;
        let other_manager = seed_employee(&pool, "MW-503").await;
        seed_team(&pool, "Platform", Some(own_manager), &[applicant]).await;
        seed_team(&pool, "Marketing", Some(other_manager), &[]).await;

        let id = sqlx::query(
            "INSERT INTO work_from_home (employee_id, from_date, to_date, days) VALUES (?, '2026-03-02', '2026-03-03', 2)",
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
                .app_data(notifier())
                .route("/api/wfh/{id}/action", web::post().to(wfh_action)),
        )
        .await;
        let decide = |reviewer: u64| {
            test::TestRequest::post()
                .uri(&format!("/api/wfh/{}/action", id))
                .insert_header(bearer(Role::Manager, Some(reviewer)))
                .set_json(json!({"action": "Reject"}))
                .to_request()
        };

        assert_eq!(test::call_service(&app, decide(other_manager)).await.status(), 403);
        assert_eq!(test::call_service(&app, decide(applicant)).await.status(), 403);

        let body: Value = test::call_and_read_body_json(&app, decide(own_manager)).await;
        assert_eq!(body["status"], "Rejected");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn wfh_cannot_overlap_an_approved_leave(pool: MySqlPool) {
        let emp = seed_employee(&pool, "MW-511").await;
        sqlx::query(
            "INSERT INTO leaves (employee_id, leave_type, from_date, to_date, days, status) VALUES (?, 'SL', '2026-03-02', '2026-03-03', 2, 'Approved')",
        )
        .bind(emp)
        .execute(&pool)
        .await
        .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(web::Data::new(Config::for_tests()))
                .app_data(notifier())
                .route("/api/wfh/apply", web::post().to(apply_wfh)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/wfh/apply")
            .insert_header(bearer(Role::Employee, Some(emp)))
            .set_json(json!({"employeeId": "MW-511", "fromDate": "2026-03-03", "toDate": "2026-03-05"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "You have a leave request overlapping these dates");

        let wfh: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM work_from_home WHERE employee_id = ?")
            .bind(emp)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(wfh, 0);
    }
}
