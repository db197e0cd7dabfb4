use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Daily attendance summary, one row per employee and date.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attendance {
    pub id: u64,
    pub employee_id: u64,
    pub date: NaiveDate,
    pub check_in: Option<NaiveTime>,
    pub check_out: Option<NaiveTime>,
    pub break_minutes: i32,
    /// Denormalized "Xh Ym" string, refreshed on every OUT punch
    pub worked_hours: Option<String>,
    pub status: String,
    pub is_weekend: bool,
    pub is_holiday: bool,
}
