//! Pieces shared by the leave and WFH approval workflows: date validation,
//! overlap checks, reviewer lookup, signed email links and the HTML pages
//! served to reviewers who click them.

use crate::{
    auth::{
        auth::AuthUser,
        jwt::{generate_action_token, verify_action_token},
    },
    config::Config,
    error::{ApiError, ApiResult},
    model::{employee::{Employee, full_name}, status::{RequestAction, RequestStatus}},
    notify::{
        Notifier, OutgoingEmail,
        templates::{ReviewRequest, action_done_page, already_processed_page, error_page, status_update},
    },
    utils::calendar::parse_date,
};
use actix_web::{HttpResponse, http::header::ContentType};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{MySqlConnection, MySqlPool};
use std::str::FromStr;
use tracing::warn;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Leave,
    Wfh,
}

impl RequestKind {
    pub fn label(self) -> &'static str {
        match self {
            RequestKind::Leave => "Leave",
            RequestKind::Wfh => "WFH",
        }
    }

    /// Audience claim of the signed email links.
    pub fn token_kind(self) -> &'static str {
        match self {
            RequestKind::Leave => "leave",
            RequestKind::Wfh => "wfh",
        }
    }

    fn path(self) -> &'static str {
        match self {
            RequestKind::Leave => "leaves",
            RequestKind::Wfh => "wfh",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            RequestKind::Leave => "leaves",
            RequestKind::Wfh => "work_from_home",
        }
    }
}

/// Reviewer decision body shared by both workflows.
#[derive(Deserialize, ToSchema)]
pub struct ActionBody {
    #[schema(value_type = String, example = "Approve")]
    pub action: RequestAction,
}

#[derive(Deserialize, IntoParams)]
pub struct EmailActionQuery {
    /// Signed token embedded in the email link
    pub token: Option<String>,
}

/// Result of applying a reviewer decision.
#[derive(Debug, PartialEq)]
pub enum Decision {
    Done(RequestStatus),
    /// The request had already left `Pending`; carries its current status.
    AlreadyProcessed(String),
}

impl Decision {
    /// API callers get a 400 for stale decisions.
    pub fn into_status(self) -> ApiResult<RequestStatus> {
        match self {
            Decision::Done(status) => Ok(status),
            Decision::AlreadyProcessed(status) => Err(ApiError::bad_request(format!(
                "Request already processed (status: {})",
                status
            ))),
        }
    }
}

pub fn parse_range(from: &str, to: &str) -> ApiResult<(NaiveDate, NaiveDate)> {
    let from = parse_date(from).ok_or_else(|| ApiError::bad_request("Invalid fromDate, expected YYYY-MM-DD"))?;
    let to = parse_date(to).ok_or_else(|| ApiError::bad_request("Invalid toDate, expected YYYY-MM-DD"))?;
    if to < from {
        return Err(ApiError::bad_request("End date cannot be before start date"));
    }
    Ok((from, to))
}

/// Whether the employee has a Pending or Approved request of `kind` touching `[from, to]`.
pub async fn has_open_overlap(
    pool: &MySqlPool,
    kind: RequestKind,
    employee_id: u64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(&format!(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM {}
            WHERE employee_id = ?
              AND status IN ('Pending', 'Approved')
              AND from_date <= ? AND to_date >= ?
        )
        "#,
        kind.table()
    ))
    .bind(employee_id)
    .bind(to)
    .bind(from)
    .fetch_one(pool)
    .await
}

/// Admins review anyone but themselves; managers only members of teams they manage.
/// Run inside the decision transaction, after the request row is locked.
pub async fn ensure_reviewer(
    conn: &mut MySqlConnection,
    auth: &AuthUser,
    applicant_id: u64,
) -> ApiResult<()> {
    if auth.employee_id == Some(applicant_id) {
        return Err(ApiError::forbidden("You cannot review your own request"));
    }
    if auth.is_admin() {
        return Ok(());
    }
    let Some(manager_id) = auth.employee_id else {
        return Err(ApiError::forbidden("Manager/Admin only"));
    };

    let manages = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM team_members tm
            JOIN teams t ON t.id = tm.team_id
            WHERE t.manager_id = ? AND tm.employee_id = ?
        )
        "#,
    )
    .bind(manager_id)
    .bind(applicant_id)
    .fetch_one(&mut *conn)
    .await?;

    if manages {
        Ok(())
    } else {
        Err(ApiError::forbidden("You can only review requests from members of your teams"))
    }
}

pub fn parse_action(action: &str) -> ApiResult<RequestAction> {
    RequestAction::from_str(action).map_err(|_| ApiError::bad_request("Action must be approve or reject"))
}

/// Approve and reject URLs for one request.
pub fn action_links(config: &Config, kind: RequestKind, id: u64) -> ApiResult<(String, String)> {
    let token = generate_action_token(kind.token_kind(), id, &config.jwt_secret, config.action_link_ttl)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to sign action link");
            ApiError::Internal
        })?;
    let base = config.public_base_url.trim_end_matches('/');
    let link = |action: &str| format!("{}/{}/email-action/{}/{}?token={}", base, kind.path(), id, action, token);
    Ok((link("approve"), link("reject")))
}

pub fn verify_link(config: &Config, kind: RequestKind, id: u64, token: Option<&str>) -> ApiResult<()> {
    match token {
        Some(t) if verify_action_token(t, kind.token_kind(), id, &config.jwt_secret) => Ok(()),
        _ => Err(ApiError::Unauthorized("Invalid or expired link".into())),
    }
}

/// HTML answer for a reviewer who clicked an email link.
pub fn email_action_page(kind: RequestKind, outcome: ApiResult<Decision>) -> HttpResponse {
    let (mut builder, body) = match outcome {
        Ok(Decision::Done(status)) => (HttpResponse::Ok(), action_done_page(kind.label(), status.as_ref())),
        Ok(Decision::AlreadyProcessed(status)) => (HttpResponse::Ok(), already_processed_page(kind.label(), &status)),
        Err(e) => {
            let builder = match &e {
                ApiError::NotFound(_) => HttpResponse::NotFound(),
                ApiError::Unauthorized(_) => HttpResponse::Unauthorized(),
                ApiError::BadRequest(_) => HttpResponse::BadRequest(),
                _ => HttpResponse::InternalServerError(),
            };
            (builder, error_page(&e.to_string()))
        }
    };
    builder.content_type(ContentType::html()).body(body)
}

/// Names or addresses listed in a `notifyTo` field.
pub fn split_notify_to(notify_to: &str) -> Vec<String> {
    notify_to
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Reviewer addresses in priority order: the people named in `notify_to`,
/// then the managers of the employee's teams, then admin employees, then the
/// configured admin address.
pub async fn reviewer_emails(
    pool: &MySqlPool,
    config: &Config,
    employee_id: u64,
    notify_to: Option<&str>,
) -> Result<Vec<String>, sqlx::Error> {
    let wanted = notify_to.map(split_notify_to).unwrap_or_default();

    if !wanted.is_empty() {
        let people: Vec<(String, Option<String>, String)> = sqlx::query_as(
            "SELECT first_name, last_name, email FROM employees WHERE email IS NOT NULL AND email <> ''",
        )
        .fetch_all(pool)
        .await?;

        let named: Vec<String> = people
            .into_iter()
            .filter(|(first, last, email)| {
                let name = full_name(first, last.as_deref()).to_lowercase();
                wanted.iter().any(|w| *w == name || *w == email.to_lowercase())
            })
            .map(|(_, _, email)| email)
            .collect();
        if !named.is_empty() {
            return Ok(dedup(named));
        }
    }

    let managers: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT m.email FROM team_members tm
        JOIN teams t ON t.id = tm.team_id
        JOIN employees m ON m.id = t.manager_id
        WHERE tm.employee_id = ? AND m.id <> ? AND m.email IS NOT NULL AND m.email <> ''
        "#,
    )
    .bind(employee_id)
    .bind(employee_id)
    .fetch_all(pool)
    .await?;
    if !managers.is_empty() {
        return Ok(dedup(managers));
    }

    let admins: Vec<String> = sqlx::query_scalar(
        "SELECT email FROM employees WHERE is_admin = TRUE AND email IS NOT NULL AND email <> ''",
    )
    .fetch_all(pool)
    .await?;
    if !admins.is_empty() {
        return Ok(dedup(admins));
    }

    Ok(vec![config.admin_email.clone()])
}

fn dedup(emails: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(emails.len());
    for e in emails {
        let e = e.trim().to_lowercase();
        if !out.contains(&e) {
            out.push(e);
        }
    }
    out
}

/// What reviewers are told about a new application.
pub struct NewApplication {
    pub kind: RequestKind,
    pub id: u64,
    pub employee: Employee,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub details: Vec<(&'static str, String)>,
    pub reason: Option<String>,
    pub notify_to: Option<String>,
}

/// Emails the reviewers in the background. Lookup and delivery failures are logged.
pub fn spawn_review_email(pool: MySqlPool, config: Config, notifier: Notifier, app: NewApplication) {
    actix_web::rt::spawn(async move {
        let recipients = match reviewer_emails(&pool, &config, app.employee.id, app.notify_to.as_deref()).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, request_id = app.id, "Reviewer lookup failed");
                return;
            }
        };
        let (approve_url, reject_url) = match action_links(&config, app.kind, app.id) {
            Ok(links) => links,
            Err(e) => {
                warn!(error = %e, request_id = app.id, "Action links unavailable");
                return;
            }
        };

        let name = app.employee.full_name();
        let review = ReviewRequest {
            kind: app.kind.label(),
            employee_name: &name,
            employee_code: &app.employee.employee_id,
            from: app.from,
            to: app.to,
            details: app.details,
            reason: app.reason.as_deref().unwrap_or("-"),
            approve_url,
            reject_url,
        };
        let email = OutgoingEmail::to_first_cc_rest(review.subject(), review.render(), recipients);

        if let Err(e) = notifier.send_email(&email).await {
            warn!(error = %e, request_id = app.id, "Review email failed");
        }
    });
}

/// Tells the employee about a decision, when they have an address.
pub fn notify_decision(
    notifier: &Notifier,
    kind: RequestKind,
    employee_email: Option<String>,
    status: RequestStatus,
    from: NaiveDate,
    to: NaiveDate,
) {
    if let Some(email) = employee_email.filter(|e| !e.trim().is_empty()) {
        let (subject, body) = status_update(kind.label(), status.as_ref(), from, to);
        notifier.spawn_email(OutgoingEmail::new(subject, body, vec![email]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn ranges_must_parse_and_be_ordered() {
        let (from, to) = parse_range("2026-03-02", "2026-03-04").unwrap();
        assert_eq!((to - from).num_days(), 2);

        let err = parse_range("2026-03-04", "2026-03-02").unwrap_err();
        assert_eq!(err.to_string(), "End date cannot be before start date");
        assert!(parse_range("03/02/2026", "2026-03-04").is_err());
    }

    #[test]
    fn links_carry_a_token_for_that_request_only() {
        let config = Config::for_tests();
        let (approve, reject) = action_links(&config, RequestKind::Wfh, 9).unwrap();
        assert!(approve.starts_with("http://localhost:8080/wfh/email-action/9/approve?token="));
        assert!(reject.contains("/wfh/email-action/9/reject?token="));

        let token = approve.split("token=").nth(1).unwrap();
        assert!(verify_link(&config, RequestKind::Wfh, 9, Some(token)).is_ok());
        assert!(verify_link(&config, RequestKind::Leave, 9, Some(token)).is_err());
        assert!(verify_link(&config, RequestKind::Wfh, 10, Some(token)).is_err());
        assert!(verify_link(&config, RequestKind::Wfh, 9, None).is_err());
    }

    #[test]
    fn notify_to_accepts_names_and_addresses() {
        assert_eq!(
            split_notify_to(" Ravi Kumar, lead@company.com;;"),
            vec!["ravi kumar".to_string(), "lead@company.com".to_string()]
        );
        assert!(split_notify_to(" , ").is_empty());
    }

    #[test]
    fn stale_decisions_are_bad_requests() {
        assert_eq!(Decision::Done(RequestStatus::Approved).into_status().unwrap(), RequestStatus::Approved);
        let err = Decision::AlreadyProcessed("Rejected".into()).into_status().unwrap_err();
        assert!(err.to_string().contains("already processed"));
    }

    #[actix_web::test]
    async fn processed_requests_render_a_page() {
        let resp = email_action_page(RequestKind::Leave, Ok(Decision::AlreadyProcessed("Approved".into())));
        assert_eq!(resp.status(), 200);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("Request Already Processed"));

        let resp = email_action_page(RequestKind::Wfh, Err(ApiError::Unauthorized("Invalid or expired link".into())));
        assert_eq!(resp.status(), 401);
    }
}
