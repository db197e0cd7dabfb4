use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Team {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub manager_id: Option<u64>,
    #[schema(example = "09:30 AM")]
    pub shift_start: String,
    #[schema(example = "06:30 PM")]
    pub shift_end: String,
    #[serde(skip_serializing)]
    pub whatsapp_chat_id: Option<String>,
}
