use crate::error::{ApiError, ApiResult};
use crate::model::employee::{EMPLOYEE_COLUMNS, Employee};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::MySqlPool;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// Only keys listed in `allowed` may appear in the payload.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[&str],
    id_column: &str,
    id_value: u64,
) -> ApiResult<SqlUpdate> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::bad_request("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }

    if let Some(unknown) = obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(ApiError::bad_request(format!("Field '{}' cannot be updated", unknown)));
    }

    let set_clause = obj
        .keys()
        .map(|k| format!("{} = ?", k))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!("UPDATE {} SET {} WHERE {} = ?", table, set_clause, id_column);

    let mut values = Vec::with_capacity(obj.len() + 1);

    // Convert JSON values → SqlValue
    for value in obj.values() {
        match value {
            Value::String(s) => {
                if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    values.push(SqlValue::Date(d));
                } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                    values.push(SqlValue::DateTime(dt));
                } else {
                    values.push(SqlValue::String(s.clone()));
                }
            }
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    values.push(SqlValue::I64(i));
                } else if let Some(f) = n.as_f64() {
                    values.push(SqlValue::F64(f));
                }
            }
            Value::Bool(b) => values.push(SqlValue::Bool(*b)),
            Value::Null => values.push(SqlValue::Null),
            _ => return Err(ApiError::bad_request("Unsupported JSON value type")),
        }
    }

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

/// Looks an employee up by business code first, then by numeric id.
pub async fn find_employee(pool: &MySqlPool, key: &str) -> Result<Option<Employee>, sqlx::Error> {
    let by_code = sqlx::query_as::<_, Employee>(&format!(
        "SELECT {} FROM employees WHERE employee_id = ?",
        EMPLOYEE_COLUMNS
    ))
    .bind(key)
    .fetch_optional(pool)
    .await?;

    if by_code.is_some() {
        return Ok(by_code);
    }

    match key.parse::<u64>() {
        Ok(id) => find_employee_by_id(pool, id).await,
        Err(_) => Ok(None),
    }
}

pub async fn find_employee_by_id(pool: &MySqlPool, id: u64) -> Result<Option<Employee>, sqlx::Error> {
    sqlx::query_as::<_, Employee>(&format!(
        "SELECT {} FROM employees WHERE id = ?",
        EMPLOYEE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn require_employee(pool: &MySqlPool, key: &str) -> ApiResult<Employee> {
    find_employee(pool, key)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))
}

/// `(first, rest)` from a free-form full name.
pub fn split_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALLOWED: &[&str] = &["first_name", "joining_date", "is_admin", "location"];

    #[test]
    fn builds_update_with_trailing_id() {
        let payload = json!({"first_name": "Asha", "joining_date": "2024-02-01", "is_admin": true});
        let update = build_update_sql("employees", &payload, ALLOWED, "id", 7).unwrap();

        assert!(update.sql.starts_with("UPDATE employees SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert_eq!(update.values.len(), 4);
        assert_eq!(update.values.last(), Some(&SqlValue::U64(7)));
        assert!(update.values.contains(&SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())));
    }

    #[test]
    fn rejects_unknown_columns_and_empty_payloads() {
        let err = build_update_sql("employees", &json!({"id; DROP": 1}), ALLOWED, "id", 1).unwrap_err();
        assert!(err.to_string().contains("cannot be updated"));

        assert!(build_update_sql("employees", &json!({}), ALLOWED, "id", 1).is_err());
        assert!(build_update_sql("employees", &json!([1, 2]), ALLOWED, "id", 1).is_err());
        assert!(build_update_sql("employees", &json!({"location": [1]}), ALLOWED, "id", 1).is_err());
    }

    #[test]
    fn null_clears_a_column() {
        let update = build_update_sql("employees", &json!({"location": null}), ALLOWED, "id", 3).unwrap();
        assert_eq!(update.values[0], SqlValue::Null);
    }

    #[test]
    fn splits_full_names() {
        assert_eq!(split_name("Asha Devi Rao"), ("Asha".into(), "Devi Rao".into()));
        assert_eq!(split_name("Asha"), ("Asha".into(), String::new()));
        assert_eq!(split_name(""), (String::new(), String::new()));
    }
}
