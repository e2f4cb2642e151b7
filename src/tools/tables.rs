use crate::model::{StatusResponse, Table};
use crate::state::AppState;
use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListTablesParams {
    pub doc_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTableParams {
    pub doc_id: String,
    /// Generated by Grist when omitted
    #[serde(default)]
    pub table_id: Option<String>,
    /// Column definitions as `{"id": ..., "fields": {...}}`
    #[serde(default)]
    pub columns: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ModifyTableParams {
    pub doc_id: String,
    pub table_id: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CreateTableResponse {
    pub success: bool,
    pub message: String,
    pub tables: Vec<Value>,
}

fn default_columns() -> Vec<Value> {
    vec![
        json!({"id": "A", "fields": {"label": "Column A"}}),
        json!({"id": "B", "fields": {"label": "Column B"}}),
    ]
}

pub async fn list_tables(state: Arc<AppState>, params: ListTablesParams) -> Result<Vec<Table>> {
    state
        .client()
        .list_tables(&params.doc_id)
        .await
        .context("error listing tables")
}

pub async fn create_table(
    state: Arc<AppState>,
    params: CreateTableParams,
) -> Result<CreateTableResponse> {
    let mut table = Map::new();
    if let Some(table_id) = params.table_id.filter(|id| !id.is_empty()) {
        table.insert("id".into(), json!(table_id));
    }
    let columns = params
        .columns
        .filter(|columns| !columns.is_empty())
        .unwrap_or_else(default_columns);
    table.insert("columns".into(), Value::Array(columns));

    let tables = state
        .client()
        .create_tables(&params.doc_id, &json!({ "tables": [table] }))
        .await
        .context("error creating table")?;
    Ok(CreateTableResponse {
        success: true,
        message: format!("Table created successfully in document {}", params.doc_id),
        tables,
    })
}

pub async fn modify_table(state: Arc<AppState>, params: ModifyTableParams) -> Result<StatusResponse> {
    let body = json!({
        "tables": [{ "id": params.table_id, "fields": params.fields }]
    });
    state
        .client()
        .modify_tables(&params.doc_id, &body)
        .await
        .context("error modifying table")?;
    Ok(StatusResponse::ok(format!(
        "Table {} modified successfully",
        params.table_id
    )))
}
