use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: u64,
    pub author_id: Option<u64>,
    pub content: String,
    pub post_type: String,
    pub images: Json<Vec<String>>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: u64,
    pub post_id: u64,
    pub author_id: Option<u64>,
    pub content: String,
    pub created_at: NaiveDateTime,
}
