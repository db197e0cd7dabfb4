use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaveRequest {
    pub id: u64,
    pub employee_id: u64,
    pub leave_type: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub from_session: String,
    pub to_session: String,
    pub days: f64,
    pub reason: Option<String>,
    pub notify_to: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LeaveType {
    #[schema(example = "CL")]
    pub code: String,
    #[schema(example = "Casual Leave")]
    pub name: String,
    #[schema(example = 12.0)]
    pub default_days: f64,
    pub is_paid: bool,
}

impl LeaveType {
    /// Leave without pay has no allocation ceiling.
    pub fn is_unlimited(&self) -> bool {
        self.code.eq_ignore_ascii_case("LWP")
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmployeeLeaveBalance {
    pub employee_id: u64,
    pub leave_type: String,
    pub year: i32,
    pub allocated_days: f64,
    pub used_days: f64,
}
