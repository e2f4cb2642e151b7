use crate::errors::InvalidParamsError;
use crate::model::json_type_name;
use crate::state::AppState;
use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FilterSqlParams {
    pub doc_id: String,
    pub table_id: String,
    /// Columns to select; all when omitted
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Equality filters, e.g. `{"organisation": "OPSIA", "actif": true}`
    #[serde(default)]
    pub where_conditions: Option<Map<String, Value>>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
}

fn default_sql_timeout() -> Option<u64> {
    Some(1000)
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteSqlParams {
    pub doc_id: String,
    /// A single SELECT statement (a leading WITH clause is allowed)
    pub sql_query: String,
    /// Positional arguments bound to `?` placeholders
    #[serde(default)]
    pub parameters: Option<Vec<Value>>,
    #[serde(default = "default_sql_timeout")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SqlQueryResponse {
    pub success: bool,
    pub message: String,
    pub doc_id: String,
    pub query: String,
    pub record_count: usize,
    pub records: Vec<Value>,
}

/// Trims the statement, drops one trailing `;` and rejects anything that is not
/// a `SELECT` or `WITH` query.
pub fn guard_select_query(tool: &'static str, raw: &str) -> Result<String, InvalidParamsError> {
    let trimmed = raw.trim();
    let statement = trimmed.strip_suffix(';').unwrap_or(trimmed);
    let lowered = statement.to_ascii_lowercase();
    if lowered.starts_with("select") || lowered.starts_with("with") {
        Ok(statement.to_string())
    } else {
        Err(InvalidParamsError::new(
            tool,
            "Only SELECT queries (optionally starting with a WITH clause) are allowed",
        )
        .with_path("sql_query"))
    }
}

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn where_clause(column: &str, value: &Value) -> Result<String, InvalidParamsError> {
    let condition = match value {
        Value::Null => format!("{column} IS NULL"),
        Value::Bool(flag) => format!("{column} = {}", u8::from(*flag)),
        Value::Number(number) => format!("{column} = {number}"),
        Value::String(text) => format!("{column} = {}", sql_literal(text)),
        other => {
            return Err(InvalidParamsError::new(
                "filter_sql_query",
                format!(
                    "condition on '{column}' must be a string, number, boolean or null, got {}",
                    json_type_name(other)
                ),
            )
            .with_path(format!("where_conditions.{column}")));
        }
    };
    Ok(condition)
}

pub fn build_filter_query(params: &FilterSqlParams) -> Result<String, InvalidParamsError> {
    let selected = match params.columns.as_deref() {
        Some(columns) if !columns.is_empty() => columns.join(", "),
        _ => "*".to_string(),
    };
    let mut query = format!("SELECT {selected} FROM {}", params.table_id);

    if let Some(conditions) = params.where_conditions.as_ref().filter(|c| !c.is_empty()) {
        let clauses = conditions
            .iter()
            .map(|(column, value)| where_clause(column, value))
            .collect::<Result<Vec<_>, _>>()?;
        query.push_str(" WHERE ");
        query.push_str(&clauses.join(" AND "));
    }
    if let Some(order_by) = params.order_by.as_deref().filter(|o| !o.is_empty()) {
        query.push_str(" ORDER BY ");
        query.push_str(order_by);
    }
    if let Some(limit) = params.limit.filter(|l| *l > 0) {
        query.push_str(&format!(" LIMIT {limit}"));
    }
    Ok(query)
}

pub async fn filter_sql_query(
    state: Arc<AppState>,
    params: FilterSqlParams,
) -> Result<SqlQueryResponse> {
    let query = build_filter_query(&params)?;
    let records = state
        .client()
        .sql(&params.doc_id, &json!({ "sql": query }))
        .await
        .context("error running filter query")?;
    Ok(SqlQueryResponse {
        success: true,
        message: "Filter query executed successfully".to_string(),
        doc_id: params.doc_id,
        query,
        record_count: records.len(),
        records,
    })
}

pub async fn execute_sql_query(
    state: Arc<AppState>,
    params: ExecuteSqlParams,
) -> Result<SqlQueryResponse> {
    let query = guard_select_query("execute_sql_query", &params.sql_query)?;

    let mut body = Map::new();
    body.insert("sql".into(), json!(query));
    if let Some(args) = params.parameters.filter(|args| !args.is_empty()) {
        body.insert("args".into(), Value::Array(args));
    }
    if let Some(timeout) = params.timeout_ms.filter(|t| *t > 0) {
        body.insert("timeout".into(), json!(timeout));
    }

    let records = state
        .client()
        .sql(&params.doc_id, &Value::Object(body))
        .await
        .context("error executing SQL query")?;
    Ok(SqlQueryResponse {
        success: true,
        message: "SQL query executed successfully".to_string(),
        doc_id: params.doc_id,
        query,
        record_count: records.len(),
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(where_conditions: Value) -> FilterSqlParams {
        FilterSqlParams {
            doc_id: "doc".into(),
            table_id: "Contacts".into(),
            columns: None,
            where_conditions: where_conditions.as_object().cloned(),
            order_by: None,
            limit: None,
        }
    }

    #[test]
    fn guard_strips_one_trailing_semicolon() {
        let query = guard_select_query("execute_sql_query", "  SELECT * FROM T; ").unwrap();
        assert_eq!(query, "SELECT * FROM T");
    }

    #[test]
    fn guard_accepts_with_clauses_in_any_case() {
        assert!(guard_select_query("t", "with x as (select 1) select * from x").is_ok());
        assert!(guard_select_query("t", "Select 1").is_ok());
    }

    #[test]
    fn guard_rejects_writes() {
        for statement in ["DELETE FROM T", "update T set a = 1", "  ; select 1", "DROP TABLE T;"] {
            let err = guard_select_query("execute_sql_query", statement).unwrap_err();
            assert_eq!(err.path(), Some("sql_query"), "{statement}");
        }
    }

    #[test]
    fn filter_query_quotes_and_escapes_values() {
        let mut params = filter(json!({"nom": "O'Brien", "actif": true, "age": 42, "ville": null}));
        params.columns = Some(vec!["nom".into(), "age".into()]);
        params.order_by = Some("age".into());
        params.limit = Some(10);
        assert_eq!(
            build_filter_query(&params).unwrap(),
            "SELECT nom, age FROM Contacts WHERE nom = 'O''Brien' AND actif = 1 AND age = 42 \
             AND ville IS NULL ORDER BY age LIMIT 10"
        );
    }

    #[test]
    fn filter_query_without_conditions_selects_everything() {
        assert_eq!(
            build_filter_query(&filter(Value::Null)).unwrap(),
            "SELECT * FROM Contacts"
        );
    }

    #[test]
    fn filter_query_rejects_nested_values() {
        let err = build_filter_query(&filter(json!({"tags": ["a"]}))).unwrap_err();
        assert_eq!(err.path(), Some("where_conditions.tags"));
    }
}
