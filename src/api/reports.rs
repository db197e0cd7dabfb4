//! Monthly attendance and leave report, viewed as JSON or mailed to managers
//! as an HTML attachment.

use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::employee::{EMPLOYEE_COLUMNS, Employee},
    notify::{Attachment, Notifier, OutgoingEmail, templates::escape_html},
    utils::{
        calendar::{HolidayCalendar, local_now, overlap, parse_date, report_period},
        holiday_cache::calendar_between,
    },
};
use actix_web::{HttpResponse, web};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, MySqlPool};
use std::collections::HashMap;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams)]
pub struct ReportQuery {
    /// Any date in the month to report on (`YYYY-MM-DD`), defaults to today
    pub date: Option<String>,
    /// Send only to this address instead of the managers
    pub test_email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct ReportRow {
    pub id: u64,
    #[schema(example = "MW-001")]
    pub employee_id: String,
    #[schema(example = "Asha Rao")]
    pub name: String,
    pub role: Option<String>,
    pub working_days: u32,
    pub present_days: u32,
    pub paid_leaves: f64,
    pub unpaid_leaves: f64,
}

#[derive(Serialize, ToSchema)]
pub struct MonthlyReport {
    #[schema(value_type = String, format = "date")]
    pub period_start: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub period_end: NaiveDate,
    pub rows: Vec<ReportRow>,
}

#[derive(FromRow, Clone)]
struct ApprovedLeave {
    employee_id: u64,
    leave_type: String,
    from_date: NaiveDate,
    to_date: NaiveDate,
    days: f64,
}

/// Days of `leave` charged inside `period`; never more than the request itself.
fn days_in_period(calendar: &HolidayCalendar, leave: &ApprovedLeave, period: (NaiveDate, NaiveDate)) -> f64 {
    match overlap((leave.from_date, leave.to_date), period) {
        Some((from, to)) => (calendar.count_working_days(from, to) as f64).min(leave.days),
        None => 0.0,
    }
}

fn build_rows(
    employees: &[Employee],
    present: &HashMap<u64, i64>,
    leaves: &[ApprovedLeave],
    calendar: &HolidayCalendar,
    period: (NaiveDate, NaiveDate),
) -> Vec<ReportRow> {
    let working_days = calendar.count_working_days(period.0, period.1);

    employees
        .iter()
        .map(|emp| {
            let (mut paid, mut unpaid) = (0.0, 0.0);
            for leave in leaves.iter().filter(|l| l.employee_id == emp.id) {
                let days = days_in_period(calendar, leave, period);
                if emp.is_intern() || leave.leave_type.eq_ignore_ascii_case("LWP") {
                    unpaid += days;
                } else {
                    paid += days;
                }
            }
            ReportRow {
                id: emp.id,
                employee_id: emp.employee_id.clone(),
                name: emp.full_name(),
                role: emp.role.clone(),
                working_days,
                present_days: present.get(&emp.id).copied().unwrap_or(0).max(0) as u32,
                paid_leaves: paid,
                unpaid_leaves: unpaid,
            }
        })
        .collect()
}

async fn monthly_report(pool: &MySqlPool, date: NaiveDate) -> ApiResult<MonthlyReport> {
    let (start, end) = report_period(date);

    let employees = sqlx::query_as::<_, Employee>(&format!(
        "SELECT {} FROM employees WHERE status <> 'Inactive' ORDER BY id",
        EMPLOYEE_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    let present: HashMap<u64, i64> = sqlx::query_as::<_, (u64, i64)>(
        r#"
        SELECT employee_id, COUNT(DISTINCT date)
        FROM attendance
        WHERE date BETWEEN ? AND ? AND check_in IS NOT NULL
        GROUP BY employee_id
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    let leaves = sqlx::query_as::<_, ApprovedLeave>(
        r#"
        SELECT employee_id, leave_type, from_date, to_date, days
        FROM leaves
        WHERE status = 'Approved' AND from_date <= ? AND to_date >= ?
        "#,
    )
    .bind(end)
    .bind(start)
    .fetch_all(pool)
    .await?;

    let calendar = calendar_between(pool, start, end).await?;

    Ok(MonthlyReport {
        period_start: start,
        period_end: end,
        rows: build_rows(&employees, &present, &leaves, &calendar, (start, end)),
    })
}

fn report_date(config: &Config, query: &ReportQuery) -> ApiResult<NaiveDate> {
    match query.date.as_deref() {
        Some(d) => parse_date(d).ok_or_else(|| ApiError::bad_request("Invalid date, expected YYYY-MM-DD")),
        None => Ok(local_now(config.tz_offset_minutes).date()),
    }
}

fn render_html(report: &MonthlyReport) -> String {
    let mut rows = String::new();
    for r in &report.rows {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&r.employee_id),
            escape_html(&r.name),
            escape_html(r.role.as_deref().unwrap_or("-")),
            r.working_days,
            r.present_days,
            r.paid_leaves,
            r.unpaid_leaves,
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Monthly Report</title></head>
<body style="font-family:Arial,sans-serif;">
<h2>Attendance Report: {start} to {end}</h2>
<table border="1" cellpadding="6" cellspacing="0" style="border-collapse:collapse;">
<tr style="background-color:#48327d;color:#ffffff;"><th>ID</th><th>Name</th><th>Role</th><th>Working Days</th><th>Present Days</th><th>Paid Leaves</th><th>Unpaid Leaves</th></tr>
{rows}</table>
</body>
</html>"#,
        start = report.period_start,
        end = report.period_end,
        rows = rows,
    )
}

/// Monthly report
#[utoipa::path(
    get,
    path = "/api/admin/monthly-report",
    params(ReportQuery),
    responses(
        (status = 200, description = "Report for the period ending on the 10th", body = MonthlyReport),
        (status = 400, description = "Invalid date"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn get_monthly_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<ReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let date = report_date(&config, &query)?;
    Ok(HttpResponse::Ok().json(monthly_report(pool.get_ref(), date).await?))
}

/// Email the monthly report
#[utoipa::path(
    post,
    path = "/api/admin/monthly-report/send",
    params(ReportQuery),
    responses(
        (status = 200, description = "Report sent", body = Object, example = json!({"message": "Report sent", "recipients": ["ravi.kumar@company.com"]})),
        (status = 400, description = "Invalid date or no recipients"),
        (status = 403, description = "Admin only"),
        (status = 502, description = "Email provider failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn send_monthly_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    notifier: web::Data<Notifier>,
    query: web::Query<ReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let date = report_date(&config, &query)?;

    let recipients: Vec<String> = match query.test_email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => vec![email.to_lowercase()],
        None => sqlx::query_scalar(
            r#"
            SELECT email FROM employees
            WHERE role LIKE '%Manager%' AND status <> 'Inactive' AND email IS NOT NULL AND email <> ''
            ORDER BY id
            "#,
        )
        .fetch_all(pool.get_ref())
        .await?,
    };
    if recipients.is_empty() {
        return Err(ApiError::bad_request("No report recipients found"));
    }

    let report = monthly_report(pool.get_ref(), date).await?;
    let html = render_html(&report);
    let subject = format!(
        "Monthly Attendance Report ({} to {})",
        report.period_start, report.period_end
    );

    let mut email = OutgoingEmail::to_first_cc_rest(
        subject,
        format!(
            "<p>Please find attached the attendance report for {} to {}.</p>",
            report.period_start, report.period_end
        ),
        recipients.clone(),
    );
    email.attachment = Some(Attachment {
        name: format!("monthly-report-{}.html", report.period_end),
        data: STANDARD.encode(html.as_bytes()),
        mime_type: "text/html".to_string(),
    });

    notifier.send_email(&email).await.map_err(|e| {
        warn!(error = %e, "Monthly report email failed");
        ApiError::BadGateway(format!("Failed to send report: {}", e))
    })?;

    info!(recipients = recipients.len(), "Monthly report sent");
    Ok(HttpResponse::Ok().json(json!({"message": "Report sent", "recipients": recipients})))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    fn employee(id: u64, role: &str) -> Employee {
        Employee {
            id,
            employee_id: format!("MW-{:03}", id),
            first_name: "Emp".into(),
            last_name: Some(id.to_string()),
            role: Some(role.into()),
            status: "Active".into(),
            location: None,
            email: None,
            contact: None,
            aadhar: None,
            qualification: None,
            joining_date: None,
            is_admin: false,
        }
    }

    fn leave(employee_id: u64, code: &str, from: NaiveDate, to: NaiveDate, days: f64) -> ApprovedLeave {
        ApprovedLeave {
            employee_id,
            leave_type: code.into(),
            from_date: from,
            to_date: to,
            days,
        }
    }

    #[test]
    fn leaves_split_into_paid_and_unpaid() {
        let period = (d(2, 11), d(3, 10));
        let calendar = HolidayCalendar::default();
        let employees = vec![employee(1, "Software Engineer"), employee(2, "Design Intern")];
        let present = HashMap::from([(1, 20)]);
        let leaves = vec![
            // Mon 9 .. Wed 11 March, only 9 and 10 fall in the period
            leave(1, "CL", d(3, 9), d(3, 11), 3.0),
            leave(1, "LWP", d(2, 16), d(2, 16), 1.0),
            leave(2, "SL", d(2, 17), d(2, 17), 0.5),
        ];

        let rows = build_rows(&employees, &present, &leaves, &calendar, period);
        assert_eq!(rows[0].paid_leaves, 2.0);
        assert_eq!(rows[0].unpaid_leaves, 1.0);
        assert_eq!(rows[0].present_days, 20);
        assert_eq!(rows[1].paid_leaves, 0.0);
        assert_eq!(rows[1].unpaid_leaves, 0.5);
        assert_eq!(rows[1].present_days, 0);
        // 28 days minus four Sundays
        assert_eq!(rows[0].working_days, 24);
    }

    #[test]
    fn html_report_escapes_names() {
        let report = MonthlyReport {
            period_start: d(2, 11),
            period_end: d(3, 10),
            rows: vec![ReportRow {
                id: 1,
                employee_id: "MW-001".into(),
                name: "A <b>Rao</b>".into(),
                role: None,
                working_days: 24,
                present_days: 22,
                paid_leaves: 1.0,
                unpaid_leaves: 0.0,
            }],
        };
        let html = render_html(&report);
        assert!(html.contains("2026-02-11 to 2026-03-10"));
        assert!(html.contains("A &lt;b&gt;Rao&lt;/b&gt;"));
    }

    #[actix_web::test]
    async fn report_endpoints_are_admin_only() {
        use crate::api::test_support::{bearer, lazy_pool};
        use crate::model::role::Role;
        use actix_web::{App, test};

        let config = Config::for_tests();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Notifier::new(&config).unwrap()))
                .app_data(web::Data::new(config))
                .route("/api/admin/monthly-report", web::get().to(get_monthly_report))
                .route("/api/admin/monthly-report/send", web::post().to(send_monthly_report)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/admin/monthly-report?date=2026-03-05")
            .insert_header(bearer(Role::Manager, Some(2)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::post()
            .uri("/api/admin/monthly-report/send")
            .insert_header(bearer(Role::Employee, Some(3)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::get()
            .uri("/api/admin/monthly-report?date=March")
            .insert_header(bearer(Role::Admin, None))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn report_leaves_out_inactive_employees(pool: MySqlPool) {
        use crate::api::test_support::{seed_employee, seed_employee_with};

        let active = seed_employee(&pool, "MW-601").await;
        let gone = seed_employee_with(&pool, "MW-602", None, "Inactive").await;
        for id in [active, gone] {
            sqlx::query("INSERT INTO attendance (employee_id, date, check_in) VALUES (?, '2026-03-02', '09:10:00')")
                .bind(id)
                .execute(&pool)
                .await
                .unwrap();
        }
        sqlx::query(
            "INSERT INTO leaves (employee_id, leave_type, from_date, to_date, days, status) VALUES (?, 'CL', '2026-03-03', '2026-03-04', 2, 'Approved')",
        )
        .bind(active)
        .execute(&pool)
        .await
        .unwrap();

        let report = monthly_report(&pool, d(3, 5)).await.unwrap();
        assert_eq!((report.period_start, report.period_end), (d(2, 11), d(3, 10)));
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].employee_id, "MW-601");
        assert_eq!(report.rows[0].present_days, 1);
        assert_eq!(report.rows[0].paid_leaves, 2.0);
    }
}
