use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Lifecycle of leave, WFH and regularization requests.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

/// Reviewer decision. Email links send lower-case actions, API bodies send `Approve`/`Reject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[strum(ascii_case_insensitive)]
pub enum RequestAction {
    Approve,
    Reject,
}

impl RequestAction {
    pub fn resulting_status(self) -> RequestStatus {
        match self {
            RequestAction::Approve => RequestStatus::Approved,
            RequestAction::Reject => RequestStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[strum(ascii_case_insensitive)]
pub enum PunchType {
    #[strum(serialize = "IN")]
    #[serde(rename = "IN")]
    In,
    #[strum(serialize = "OUT")]
    #[serde(rename = "OUT")]
    Out,
}

/// Employee presence state stored in `employees.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum EmployeeStatus {
    Active,
    Remote,
    #[strum(serialize = "On Leave")]
    OnLeave,
    Inactive,
}
