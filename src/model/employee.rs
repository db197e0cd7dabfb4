use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Column list matching [`Employee`] for `query_as`.
pub const EMPLOYEE_COLUMNS: &str = "id, employee_id, first_name, last_name, role, status, location, \
     email, contact, aadhar, qualification, joining_date, is_admin";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "employee_id": "MW-001",
        "first_name": "Asha",
        "last_name": "Rao",
        "role": "Software Engineer",
        "status": "Active",
        "location": "Hyderabad",
        "email": "asha.rao@company.com",
        "contact": "+91 98765 43210",
        "aadhar": null,
        "qualification": "B.Tech",
        "joining_date": "2023-06-01",
        "is_admin": false
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    /// Business identifier shown across the portal
    #[schema(example = "MW-001")]
    pub employee_id: String,

    #[schema(example = "Asha")]
    pub first_name: String,

    #[schema(example = "Rao", nullable = true)]
    pub last_name: Option<String>,

    /// Designation, e.g. "Project Manager"
    #[schema(example = "Software Engineer", nullable = true)]
    pub role: Option<String>,

    #[schema(example = "Active")]
    pub status: String,

    #[schema(nullable = true)]
    pub location: Option<String>,

    #[schema(example = "asha.rao@company.com", nullable = true)]
    pub email: Option<String>,

    #[schema(example = "+91 98765 43210", nullable = true)]
    pub contact: Option<String>,

    #[schema(nullable = true)]
    pub aadhar: Option<String>,

    #[schema(nullable = true)]
    pub qualification: Option<String>,

    #[schema(example = "2023-06-01", value_type = Option<String>, format = "date")]
    pub joining_date: Option<NaiveDate>,

    pub is_admin: bool,
}

impl Employee {
    pub fn full_name(&self) -> String {
        full_name(&self.first_name, self.last_name.as_deref())
    }

    pub fn is_inactive(&self) -> bool {
        self.status == "Inactive"
    }

    pub fn is_intern(&self) -> bool {
        self.role
            .as_deref()
            .map(|r| r.to_lowercase().contains("intern"))
            .unwrap_or(false)
    }
}

pub fn full_name(first: &str, last: Option<&str>) -> String {
    match last {
        Some(l) if !l.trim().is_empty() => format!("{} {}", first, l.trim()),
        _ => first.to_string(),
    }
}
