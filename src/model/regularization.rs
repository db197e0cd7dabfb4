use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Employee-submitted correction of a missing or wrong check-out.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Regularization {
    pub id: u64,
    pub employee_id: u64,
    pub date: NaiveDate,
    pub check_out_time: NaiveTime,
    pub reason: Option<String>,
    pub status: String,
    pub reviewed_by: Option<String>,
    pub created_at: NaiveDateTime,
}
