use crate::{
    api::EmployeeKey,
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult, duplicate_key, is_unique_violation},
    model::{
        employee::{EMPLOYEE_COLUMNS, Employee},
        status::EmployeeStatus,
        team::Team,
    },
    notify::Notifier,
    utils::{
        calendar::{local_now, week_range},
        db_utils::{build_update_sql, execute_update, find_employee_by_id, require_employee, split_name},
        email_filter,
        hours::{WorkedHours, format_clock, is_on_time, on_time_cutoff, on_time_percentage, parse_clock},
    },
};
use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::{FromRow, MySqlPool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

const TEAM_UPDATABLE: &[&str] = &["name", "description", "manager_id", "shift_start", "shift_end"];

const MEMBER_UPDATABLE: &[&str] = &[
    "first_name",
    "last_name",
    "role",
    "status",
    "location",
    "email",
    "contact",
    "aadhar",
    "qualification",
    "joining_date",
    "is_admin",
];

/// Members shown on the dashboard when no team is selected.
const MEMBER_SAMPLE_SIZE: usize = 6;

#[derive(FromRow)]
struct TeamRow {
    id: u64,
    name: String,
    description: Option<String>,
    manager_id: Option<u64>,
    shift_start: String,
    shift_end: String,
    manager_first: Option<String>,
    manager_last: Option<String>,
    member_count: i64,
}

#[derive(Serialize, ToSchema)]
pub struct TeamResponse {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Platform")]
    pub name: String,
    pub description: Option<String>,
    pub manager_id: Option<u64>,
    #[schema(example = "Ravi Kumar")]
    pub manager_name: String,
    /// Active or remote members
    #[schema(example = 5)]
    pub member_count: i64,
    #[schema(example = "09:30 AM")]
    pub shift_start: String,
    #[schema(example = "06:30 PM")]
    pub shift_end: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateTeam {
    #[schema(example = "Platform")]
    pub name: String,
    pub description: Option<String>,
    pub manager_id: Option<u64>,
    #[schema(example = "09:30 AM")]
    pub shift_start: Option<String>,
    #[schema(example = "06:30 PM")]
    pub shift_end: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct AddMember {
    #[schema(value_type = String, example = "MW-001")]
    pub employee_id: EmployeeKey,
}

#[derive(Deserialize, IntoParams)]
pub struct TeamFilter {
    /// Restrict to one team
    pub team_id: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct MemberCard {
    pub id: u64,
    #[schema(example = "MW-001")]
    pub employee_id: String,
    #[schema(example = "Asha Rao")]
    pub name: String,
    pub role: Option<String>,
    #[schema(example = "Active")]
    pub status: String,
    pub location: Option<String>,
    pub email: Option<String>,
}

impl From<Employee> for MemberCard {
    fn from(e: Employee) -> Self {
        MemberCard {
            name: e.full_name(),
            id: e.id,
            employee_id: e.employee_id,
            role: e.role,
            status: e.status,
            location: e.location,
            email: e.email,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateMember {
    /// Business code; generated as `MW-<n>` when absent
    #[schema(example = "MW-014")]
    pub employee_id: Option<String>,
    /// Full name, split into first/last when those are absent
    #[schema(example = "Asha Rao")]
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub location: Option<String>,
    #[schema(example = "asha.rao@company.com")]
    pub email: Option<String>,
    pub contact: Option<String>,
    pub aadhar: Option<String>,
    pub qualification: Option<String>,
    #[schema(example = "2024-02-01", value_type = Option<String>, format = "date")]
    pub joining_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Serialize)]
pub struct RegistryEntry {
    #[serde(flatten)]
    pub employee: Employee,
    pub team_ids: Vec<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct TeamStats {
    pub total: usize,
    pub active: usize,
    #[serde(rename = "onLeave")]
    pub on_leave: usize,
    pub remote: usize,
    #[schema(example = "8h 12m")]
    pub avg_working_hours: String,
    #[schema(example = "75%")]
    pub on_time_arrival: String,
}

#[derive(FromRow)]
struct WeekRow {
    date: NaiveDate,
    check_in: Option<NaiveTime>,
    worked_hours: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Normalizes a shift time to `"09:30 AM"` form.
fn shift_time(value: Option<&str>, default: &str) -> ApiResult<String> {
    match non_empty(value) {
        None => Ok(default.to_string()),
        Some(v) => parse_clock(&v)
            .map(format_clock)
            .ok_or_else(|| ApiError::bad_request(format!("Invalid shift time '{}'", v))),
    }
}

async fn fetch_team(pool: &MySqlPool, id: u64) -> ApiResult<Team> {
    sqlx::query_as::<_, Team>(
        "SELECT id, name, description, manager_id, shift_start, shift_end, whatsapp_chat_id FROM teams WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Team not found"))
}

/// Admins edit any team; managers only their own.
async fn require_team_editor(pool: &MySqlPool, auth: &AuthUser, team_id: u64) -> ApiResult<Team> {
    let team = fetch_team(pool, team_id).await?;
    if auth.is_admin() || (team.manager_id.is_some() && team.manager_id == auth.employee_id) {
        Ok(team)
    } else {
        Err(ApiError::forbidden("Only admins or the team manager can change members"))
    }
}

fn spawn_group_creation(pool: MySqlPool, notifier: Notifier, team_id: u64, name: String, phones: Vec<String>) {
    actix_web::rt::spawn(async move {
        match notifier.create_whatsapp_group(&name, &phones).await {
            Ok(Some(chat_id)) => {
                if let Err(e) = sqlx::query("UPDATE teams SET whatsapp_chat_id = ? WHERE id = ?")
                    .bind(&chat_id)
                    .bind(team_id)
                    .execute(&pool)
                    .await
                {
                    warn!(error = %e, team_id, "Failed to store WhatsApp chat id");
                }
            }
            Ok(None) => warn!(team_id, "WhatsApp group created without a chat id"),
            Err(e) => warn!(error = %e, team_id, "WhatsApp group creation failed"),
        }
    });
}

/// List teams
#[utoipa::path(
    get,
    path = "/api/team",
    responses((status = 200, description = "All teams", body = [TeamResponse])),
    security(("bearer_auth" = [])),
    tag = "Team"
)]
pub async fn list_teams(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let rows = sqlx::query_as::<_, TeamRow>(
        r#"
        SELECT t.id, t.name, t.description, t.manager_id, t.shift_start, t.shift_end,
               m.first_name AS manager_first, m.last_name AS manager_last,
               (SELECT COUNT(*)
                  FROM team_members tm
                  JOIN employees e ON e.id = tm.employee_id
                 WHERE tm.team_id = t.id AND e.status IN ('Active', 'Remote')) AS member_count
        FROM teams t
        LEFT JOIN employees m ON m.id = t.manager_id
        ORDER BY t.id
        "#,
    )
    .fetch_all(pool.get_ref())
    .await?;

    let teams: Vec<TeamResponse> = rows
        .into_iter()
        .map(|r| TeamResponse {
            manager_name: r
                .manager_first
                .map(|f| crate::model::employee::full_name(&f, r.manager_last.as_deref()))
                .unwrap_or_else(|| "Unassigned".to_string()),
            id: r.id,
            name: r.name,
            description: r.description,
            manager_id: r.manager_id,
            member_count: r.member_count,
            shift_start: r.shift_start,
            shift_end: r.shift_end,
        })
        .collect();

    Ok(HttpResponse::Ok().json(teams))
}

/// Create team
#[utoipa::path(
    post,
    path = "/api/team",
    request_body = CreateTeam,
    responses(
        (status = 201, description = "Team created", body = Object, example = json!({"message": "Team created successfully", "id": 3})),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Duplicate team name")
    ),
    security(("bearer_auth" = [])),
    tag = "Team"
)]
pub async fn create_team(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    notifier: web::Data<Notifier>,
    payload: web::Json<CreateTeam>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let name = non_empty(Some(&payload.name)).ok_or_else(|| ApiError::bad_request("Team name is required"))?;
    let shift_start = shift_time(payload.shift_start.as_deref(), "09:30 AM")?;
    let shift_end = shift_time(payload.shift_end.as_deref(), "06:30 PM")?;

    let manager = match payload.manager_id {
        Some(id) => Some(
            find_employee_by_id(pool.get_ref(), id)
                .await?
                .ok_or_else(|| ApiError::bad_request("Manager not found"))?,
        ),
        None => None,
    };

    let result = sqlx::query(
        r#"
        INSERT INTO teams (name, description, manager_id, shift_start, shift_end)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&name)
    .bind(&payload.description)
    .bind(payload.manager_id)
    .bind(&shift_start)
    .bind(&shift_end)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict(format!("Team '{}' already exists", name))
        } else {
            e.into()
        }
    })?;

    let id = result.last_insert_id();
    info!(team_id = id, name = %name, "Team created");

    if notifier.whatsapp_enabled() {
        let phones = manager.and_then(|m| m.contact).into_iter().collect();
        spawn_group_creation(pool.get_ref().clone(), notifier.get_ref().clone(), id, name, phones);
    }

    Ok(HttpResponse::Created().json(json!({"message": "Team created successfully", "id": id})))
}

/// Update team
#[utoipa::path(
    put,
    path = "/api/team/{id}",
    params(("id" = u64, Path, description = "Team id")),
    request_body(content = Object, example = json!({"name": "Platform", "shift_start": "10:00 AM"})),
    responses(
        (status = 200, description = "Team updated"),
        (status = 400, description = "Invalid field"),
        (status = 404, description = "Team not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Team"
)]
pub async fn update_team(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();
    let mut payload = payload.into_inner();

    for key in ["shift_start", "shift_end"] {
        if let Some(v) = payload.get_mut(key) {
            let normalized = shift_time(v.as_str(), "")?;
            if normalized.is_empty() {
                return Err(ApiError::bad_request(format!("Invalid {}", key)));
            }
            *v = Value::String(normalized);
        }
    }

    let update = build_update_sql("teams", &payload, TEAM_UPDATABLE, "id", id)?;
    fetch_team(pool.get_ref(), id).await?;

    match payload.get("manager_id") {
        None | Some(Value::Null) => {}
        Some(v) => {
            let manager_id = v.as_u64().ok_or_else(|| ApiError::bad_request("Invalid manager_id"))?;
            find_employee_by_id(pool.get_ref(), manager_id)
                .await?
                .ok_or_else(|| ApiError::bad_request("Manager not found"))?;
        }
    }

    execute_update(pool.get_ref(), update).await.map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("Team name already exists".into())
        } else {
            e.into()
        }
    })?;

    Ok(HttpResponse::Ok().json(json!({"message": "Team updated successfully"})))
}

/// Delete team
#[utoipa::path(
    delete,
    path = "/api/team/{id}",
    params(("id" = u64, Path, description = "Team id")),
    responses((status = 200, description = "Team deleted"), (status = 404, description = "Team not found")),
    security(("bearer_auth" = [])),
    tag = "Team"
)]
pub async fn delete_team(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();
    fetch_team(pool.get_ref(), id).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM team_members WHERE team_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM teams WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(json!({"message": "Team deleted successfully"})))
}

/// Add a member to a team
#[utoipa::path(
    post,
    path = "/api/team/{id}/members",
    params(("id" = u64, Path, description = "Team id")),
    request_body = AddMember,
    responses(
        (status = 200, description = "Member added"),
        (status = 403, description = "Not admin or team manager"),
        (status = 404, description = "Team or employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Team"
)]
pub async fn add_team_member(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    notifier: web::Data<Notifier>,
    path: web::Path<u64>,
    payload: web::Json<AddMember>,
) -> ApiResult<HttpResponse> {
    let team = require_team_editor(pool.get_ref(), &auth, path.into_inner()).await?;
    let emp = require_employee(pool.get_ref(), &payload.employee_id.as_key()).await?;

    let inserted = sqlx::query("INSERT IGNORE INTO team_members (team_id, employee_id) VALUES (?, ?)")
        .bind(team.id)
        .bind(emp.id)
        .execute(pool.get_ref())
        .await?
        .rows_affected();

    if inserted > 0 {
        if let (Some(chat_id), Some(phone)) = (team.whatsapp_chat_id, emp.contact) {
            notifier.spawn_add_participant(chat_id, phone);
        }
    }

    Ok(HttpResponse::Ok().json(json!({"message": "Member added successfully"})))
}

/// Remove a member from a team
#[utoipa::path(
    delete,
    path = "/api/team/{id}/members/{employee_id}",
    params(
        ("id" = u64, Path, description = "Team id"),
        ("employee_id" = String, Path, description = "Business code or numeric id")
    ),
    responses(
        (status = 200, description = "Member removed"),
        (status = 403, description = "Not admin or team manager"),
        (status = 404, description = "Team, employee or membership not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Team"
)]
pub async fn remove_team_member(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    notifier: web::Data<Notifier>,
    path: web::Path<(u64, String)>,
) -> ApiResult<HttpResponse> {
    let (team_id, employee_key) = path.into_inner();
    let team = require_team_editor(pool.get_ref(), &auth, team_id).await?;
    let emp = require_employee(pool.get_ref(), &employee_key).await?;

    let removed = sqlx::query("DELETE FROM team_members WHERE team_id = ? AND employee_id = ?")
        .bind(team.id)
        .bind(emp.id)
        .execute(pool.get_ref())
        .await?
        .rows_affected();

    if removed == 0 {
        return Err(ApiError::not_found("Employee is not a member of this team"));
    }

    if let (Some(chat_id), Some(phone)) = (team.whatsapp_chat_id, emp.contact) {
        notifier.spawn_remove_participant(chat_id, phone);
    }

    Ok(HttpResponse::Ok().json(json!({"message": "Member removed successfully"})))
}

/// Member cards; a random sample when no team is given
#[utoipa::path(
    get,
    path = "/api/team/members",
    params(TeamFilter),
    responses((status = 200, description = "Members", body = [MemberCard])),
    security(("bearer_auth" = [])),
    tag = "Team"
)]
pub async fn list_members(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TeamFilter>,
) -> ApiResult<HttpResponse> {
    let members = match query.team_id {
        Some(team_id) => {
            sqlx::query_as::<_, Employee>(&format!(
                r#"
                SELECT {}
                FROM employees
                WHERE id IN (SELECT employee_id FROM team_members WHERE team_id = ?)
                ORDER BY id
                "#,
                EMPLOYEE_COLUMNS
            ))
            .bind(team_id)
            .fetch_all(pool.get_ref())
            .await?
        }
        None => {
            let all = sqlx::query_as::<_, Employee>(&format!(
                "SELECT {} FROM employees ORDER BY id",
                EMPLOYEE_COLUMNS
            ))
            .fetch_all(pool.get_ref())
            .await?;
            sample(all, MEMBER_SAMPLE_SIZE)
        }
    };

    let cards: Vec<MemberCard> = members.into_iter().map(MemberCard::from).collect();
    Ok(HttpResponse::Ok().json(cards))
}

fn sample<T>(mut items: Vec<T>, n: usize) -> Vec<T> {
    if items.len() <= n {
        return items;
    }
    items.shuffle(&mut rand::thread_rng());
    items.truncate(n);
    items
}

/// Duplicate-entry errors become 400s naming the field that collided.
fn duplicate_employee(e: sqlx::Error, code: &str, email: Option<&str>) -> ApiError {
    let key = duplicate_key(&e).map(str::to_owned);
    match (key.as_deref(), email) {
        (Some("email"), Some(email)) => {
            ApiError::bad_request(format!("Employee with email '{}' already exists.", email))
        }
        (Some(_), _) => ApiError::bad_request(format!("Employee '{}' already exists.", code)),
        (None, _) => e.into(),
    }
}

async fn next_employee_code(pool: &MySqlPool) -> Result<String, sqlx::Error> {
    let next: u64 = sqlx::query_scalar("SELECT CAST(COALESCE(MAX(id), 0) + 1 AS UNSIGNED) FROM employees")
        .fetch_one(pool)
        .await?;
    Ok(format!("MW-{:03}", next))
}

/// Register an employee
#[utoipa::path(
    post,
    path = "/api/team/members",
    request_body = CreateMember,
    responses(
        (status = 201, description = "Employee added", body = Object, example = json!({"message": "Employee added successfully", "id": 14})),
        (status = 400, description = "Invalid payload or duplicate email"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Team"
)]
pub async fn create_member(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateMember>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let (split_first, split_last) = payload.name.as_deref().map(split_name).unwrap_or_default();
    let first_name = non_empty(payload.first_name.as_deref())
        .or_else(|| non_empty(Some(&split_first)))
        .ok_or_else(|| ApiError::bad_request("Name is required"))?;
    let last_name = non_empty(payload.last_name.as_deref()).or_else(|| non_empty(Some(&split_last)));

    let email = non_empty(payload.email.as_deref()).map(|e| e.to_lowercase());
    if let Some(email) = &email {
        if email_filter::is_email_taken(pool.get_ref(), email, None).await? {
            return Err(ApiError::bad_request(format!(
                "Employee with email '{}' already exists.",
                email
            )));
        }
    }

    let code = match non_empty(payload.employee_id.as_deref()) {
        Some(code) => code,
        None => next_employee_code(pool.get_ref()).await?,
    };

    let result = sqlx::query(
        r#"
        INSERT INTO employees
            (employee_id, first_name, last_name, role, status, location, email,
             contact, aadhar, qualification, joining_date, is_admin)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&code)
    .bind(&first_name)
    .bind(&last_name)
    .bind(&payload.role)
    .bind(EmployeeStatus::Active.as_ref())
    .bind(&payload.location)
    .bind(&email)
    .bind(&payload.contact)
    .bind(&payload.aadhar)
    .bind(&payload.qualification)
    .bind(payload.joining_date)
    .bind(payload.is_admin)
    .execute(pool.get_ref())
    .await
    .map_err(|e| duplicate_employee(e, &code, email.as_deref()))?;

    if let Some(email) = &email {
        email_filter::insert(email);
    }

    let id = result.last_insert_id();
    info!(id, employee_id = %code, "Employee created");

    Ok(HttpResponse::Created().json(json!({"message": "Employee added successfully", "id": id})))
}

/// Partial update of an employee
#[utoipa::path(
    put,
    path = "/api/team/members/{id}",
    params(("id" = u64, Path, description = "Employee row id")),
    request_body(content = Object, example = json!({"role": "Team Lead", "status": "Remote"})),
    responses(
        (status = 200, description = "Employee updated"),
        (status = 400, description = "Invalid field or duplicate email"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Team"
)]
pub async fn update_member(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();
    let mut payload = payload.into_inner();

    if let Some(status) = payload.get("status") {
        let valid = status.as_str().map(|s| EmployeeStatus::from_str(s).is_ok()).unwrap_or(false);
        if !valid {
            return Err(ApiError::bad_request("Invalid status"));
        }
    }

    let new_email = match payload.get_mut("email") {
        Some(v) => match v.as_str().map(|s| s.trim().to_lowercase()) {
            Some(email) if !email.is_empty() => {
                *v = Value::String(email.clone());
                Some(email)
            }
            _ => {
                *v = Value::Null;
                None
            }
        },
        None => None,
    };

    let update = build_update_sql("employees", &payload, MEMBER_UPDATABLE, "id", id)?;

    let existing = find_employee_by_id(pool.get_ref(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    if let Some(email) = &new_email {
        if email_filter::is_email_taken(pool.get_ref(), email, Some(id)).await? {
            return Err(ApiError::bad_request(format!(
                "Employee with email '{}' already exists.",
                email
            )));
        }
    }

    execute_update(pool.get_ref(), update)
        .await
        .map_err(|e| duplicate_employee(e, &existing.employee_id, new_email.as_deref()))?;

    if payload.get("email").is_some() {
        if let Some(old) = existing.email.as_deref() {
            email_filter::remove(old);
        }
        if let Some(email) = &new_email {
            email_filter::insert(email);
        }
    }

    Ok(HttpResponse::Ok().json(json!({"message": "Employee updated successfully"})))
}

/// Delete an employee
#[utoipa::path(
    delete,
    path = "/api/team/members/{id}",
    params(("id" = u64, Path, description = "Employee row id")),
    responses((status = 200, description = "Employee deleted"), (status = 404, description = "Employee not found")),
    security(("bearer_auth" = [])),
    tag = "Team"
)]
pub async fn delete_member(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let existing = find_employee_by_id(pool.get_ref(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if let Some(email) = existing.email.as_deref() {
        email_filter::remove(email);
    }
    info!(id, employee_id = %existing.employee_id, "Employee deleted");

    Ok(HttpResponse::Ok().json(json!({"message": "Employee deleted successfully"})))
}

/// Full employee registry with team memberships
#[utoipa::path(
    get,
    path = "/api/team/registry",
    responses((status = 200, description = "Employees ordered by id", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Team"
)]
pub async fn registry(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let employees = sqlx::query_as::<_, Employee>(&format!(
        "SELECT {} FROM employees ORDER BY id",
        EMPLOYEE_COLUMNS
    ))
    .fetch_all(pool.get_ref())
    .await?;

    let memberships: Vec<(u64, u64)> =
        sqlx::query_as("SELECT employee_id, team_id FROM team_members ORDER BY team_id")
            .fetch_all(pool.get_ref())
            .await?;

    let mut teams_of: HashMap<u64, Vec<u64>> = HashMap::new();
    for (employee_id, team_id) in memberships {
        teams_of.entry(employee_id).or_default().push(team_id);
    }

    let entries: Vec<RegistryEntry> = employees
        .into_iter()
        .map(|employee| RegistryEntry {
            team_ids: teams_of.remove(&employee.id).unwrap_or_default(),
            employee,
        })
        .collect();

    Ok(HttpResponse::Ok().json(entries))
}

/// Distinct designations in use
#[utoipa::path(
    get,
    path = "/api/team/designations",
    responses((status = 200, description = "Sorted designations", body = [String])),
    security(("bearer_auth" = [])),
    tag = "Team"
)]
pub async fn designations(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let roles: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT TRIM(role) AS role FROM employees WHERE role IS NOT NULL AND TRIM(role) <> '' ORDER BY role",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(roles))
}

/// Average worked time and on-time share over this week's summary rows.
///
/// A row with no recorded hours that was checked into today runs up to `now`.
fn summarize_week(rows: &[WeekRow], now: NaiveDateTime, cutoff: NaiveTime) -> (String, String) {
    let mut total = 0i64;
    let mut present = 0u32;
    let mut on_time = 0u32;

    for row in rows {
        let mut minutes = WorkedHours::parse_or_zero(row.worked_hours.as_deref()).minutes();

        if minutes == 0 && row.date == now.date() {
            if let Some(check_in) = row.check_in {
                let start = now.date().and_time(check_in);
                if now > start {
                    minutes = (now - start).num_minutes();
                }
            }
        }

        if minutes > 0 {
            present += 1;
            total += minutes;
            if row.check_in.is_some_and(|c| is_on_time(c, cutoff)) {
                on_time += 1;
            }
        }
    }

    let avg = if present > 0 { total / present as i64 } else { 0 };
    (
        WorkedHours::from_minutes(avg).to_string(),
        on_time_percentage(on_time, present),
    )
}

/// Headcount and this week's attendance figures
#[utoipa::path(
    get,
    path = "/api/team/stats",
    params(TeamFilter),
    responses((status = 200, description = "Team statistics", body = TeamStats)),
    security(("bearer_auth" = [])),
    tag = "Team"
)]
pub async fn team_stats(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<TeamFilter>,
) -> ApiResult<HttpResponse> {
    let now = local_now(config.tz_offset_minutes);
    let (monday, _) = week_range(now.date());

    let (statuses, rows) = match query.team_id {
        Some(team_id) => {
            fetch_team(pool.get_ref(), team_id).await?;
            let statuses: Vec<String> = sqlx::query_scalar(
                r#"
                SELECT e.status FROM employees e
                JOIN team_members tm ON tm.employee_id = e.id
                WHERE tm.team_id = ?
                "#,
            )
            .bind(team_id)
            .fetch_all(pool.get_ref())
            .await?;
            let rows = sqlx::query_as::<_, WeekRow>(
                r#"
                SELECT a.date, a.check_in, a.worked_hours
                FROM attendance a
                JOIN team_members tm ON tm.employee_id = a.employee_id
                WHERE tm.team_id = ? AND a.date >= ?
                "#,
            )
            .bind(team_id)
            .bind(monday)
            .fetch_all(pool.get_ref())
            .await?;
            (statuses, rows)
        }
        None => {
            let statuses: Vec<String> = sqlx::query_scalar("SELECT status FROM employees")
                .fetch_all(pool.get_ref())
                .await?;
            let rows = sqlx::query_as::<_, WeekRow>(
                "SELECT date, check_in, worked_hours FROM attendance WHERE date >= ?",
            )
            .bind(monday)
            .fetch_all(pool.get_ref())
            .await?;
            (statuses, rows)
        }
    };

    let count = |s: EmployeeStatus| statuses.iter().filter(|v| v.as_str() == s.as_ref()).count();
    let (avg_working_hours, on_time_arrival) = summarize_week(&rows, now, on_time_cutoff());

    Ok(HttpResponse::Ok().json(TeamStats {
        total: statuses.len(),
        active: count(EmployeeStatus::Active),
        on_leave: count(EmployeeStatus::OnLeave),
        remote: count(EmployeeStatus::Remote),
        avg_working_hours,
        on_time_arrival,
    }))
}

/// Active headcount and today's absentees
#[utoipa::path(
    get,
    path = "/api/admin/dashboard-stats",
    responses(
        (status = 200, description = "Dashboard figures", body = Object, example = json!({
            "total_employees": 12,
            "absentees_count": 1,
            "absentees": [{"id": 4, "employee_id": "MW-004", "name": "Kiran Das", "role": "Designer", "status": "Active", "location": "Hyderabad", "email": null}]
        })),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn dashboard_stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let today = local_now(config.tz_offset_minutes).date();

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM employees WHERE status = 'Active'")
        .fetch_one(pool.get_ref())
        .await?;

    let absentees = sqlx::query_as::<_, Employee>(&format!(
        r#"
        SELECT {} FROM employees e
        WHERE e.status = 'Active'
          AND NOT EXISTS (
              SELECT 1 FROM attendance a
              WHERE a.employee_id = e.id AND a.date = ? AND a.check_in IS NOT NULL
          )
        ORDER BY e.id
        "#,
        EMPLOYEE_COLUMNS
    ))
    .bind(today)
    .fetch_all(pool.get_ref())
    .await?;

    let absentees: Vec<MemberCard> = absentees.into_iter().map(MemberCard::from).collect();

    Ok(HttpResponse::Ok().json(json!({
        "total_employees": total,
        "absentees_count": absentees.len(),
        "absentees": absentees,
    })))
}
