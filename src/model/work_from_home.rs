use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkFromHome {
    pub id: u64,
    pub employee_id: u64,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub days: f64,
    pub reason: Option<String>,
    pub notify_to: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
}
