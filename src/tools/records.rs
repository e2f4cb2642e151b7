use crate::api::{DeletionStrategy, shape_records_for_update};
use crate::errors::InvalidParamsError;
use crate::formula::{ColumnSuggestion, check_columns};
use crate::model::Record;
use crate::state::AppState;
use anyhow::{Context, Result};
use indexmap::{IndexMap, IndexSet};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListRecordsParams {
    pub doc_id: String,
    pub table_id: String,
    /// Column ids to sort by, comma separated; prefix with `-` for descending
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddRecordsParams {
    pub doc_id: String,
    pub table_id: String,
    /// Records keyed by column id, e.g. `[{"nom": "Dupont", "age": 35}]`
    pub records: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateRecordsParams {
    pub doc_id: String,
    pub table_id: String,
    /// Each record needs an `id`; other keys are column values
    pub records: Vec<Map<String, Value>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteRecordsParams {
    pub doc_id: String,
    pub table_id: String,
    pub record_ids: Vec<i64>,
    /// Blank the rows when neither delete endpoint accepts the request
    #[serde(default = "default_true")]
    pub allow_soft_clear: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AddRecordsResponse {
    pub success: bool,
    pub message: String,
    pub record_ids: Vec<i64>,
    pub records_count: usize,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct AddRecordsSafeResponse {
    pub success: bool,
    pub message: String,
    pub record_ids: Option<Vec<i64>>,
    pub records_count: Option<usize>,
    pub available_tables: Option<Vec<String>>,
    pub suggestion: Option<String>,
    pub missing_columns: Option<Vec<String>>,
    pub suggestions: Option<IndexMap<String, ColumnSuggestion>>,
    pub available_columns: Option<Vec<String>>,
    pub column_labels: Option<IndexMap<String, String>>,
    pub help: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct UpdateRecordsResponse {
    pub success: bool,
    pub message: String,
    pub record_ids: Vec<i64>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, JsonSchema)]
pub struct DeleteRecordsResponse {
    pub success: bool,
    pub message: String,
    pub deleted_ids: Option<Vec<i64>>,
    pub attempted_ids: Option<Vec<i64>>,
    pub strategy: Option<DeletionStrategy>,
    pub degraded: Option<bool>,
}

fn ensure_records(tool: &'static str, records: &[Map<String, Value>]) -> Result<()> {
    if records.is_empty() {
        return Err(InvalidParamsError::new(tool, "records must contain at least one record")
            .with_path("records")
            .into());
    }
    Ok(())
}

fn into_values(records: Vec<Map<String, Value>>) -> Vec<Value> {
    records.into_iter().map(Value::Object).collect()
}

/// Column names used across all records, in first-seen order.
fn referenced_columns(records: &[Map<String, Value>]) -> IndexSet<&str> {
    let mut names = IndexSet::new();
    for record in records {
        let fields = match record.get("fields") {
            Some(Value::Object(fields)) => fields,
            _ => record,
        };
        names.extend(fields.keys().map(String::as_str));
    }
    names
}

pub async fn list_records(state: Arc<AppState>, params: ListRecordsParams) -> Result<Vec<Record>> {
    state
        .client()
        .list_records(
            &params.doc_id,
            &params.table_id,
            params.sort.as_deref(),
            params.limit,
        )
        .await
        .context("error listing records")
}

pub async fn add_grist_records(
    state: Arc<AppState>,
    params: AddRecordsParams,
) -> Result<AddRecordsResponse> {
    ensure_records("add_grist_records", &params.records)?;
    let record_ids = state
        .client()
        .add_records(&params.doc_id, &params.table_id, &into_values(params.records))
        .await
        .context("error adding records")?;
    Ok(AddRecordsResponse {
        success: true,
        message: format!(
            "Successfully added {} records to table {}",
            record_ids.len(),
            params.table_id
        ),
        records_count: record_ids.len(),
        record_ids,
    })
}

pub async fn add_grist_records_safe(
    state: Arc<AppState>,
    params: AddRecordsParams,
) -> Result<AddRecordsSafeResponse> {
    ensure_records("add_grist_records_safe", &params.records)?;
    let client = state.client();

    let table = super::table_check(client, &params.doc_id, &params.table_id).await?;
    if !table.exists {
        return Ok(AddRecordsSafeResponse {
            message: table
                .error
                .unwrap_or_else(|| "Table validation failed".to_string()),
            available_tables: table.available_tables,
            suggestion: table.suggestion,
            help: Some("Use list_tables() to see all available tables".to_string()),
            ..AddRecordsSafeResponse::default()
        });
    }

    let columns = client
        .list_columns(&params.doc_id, &params.table_id)
        .await
        .context("could not validate columns")?;
    let check = check_columns(referenced_columns(&params.records), &columns);
    if !check.valid {
        return Ok(AddRecordsSafeResponse {
            message: "Some columns are invalid".to_string(),
            missing_columns: Some(check.missing_columns),
            suggestions: Some(check.suggestions),
            available_columns: Some(check.available_columns),
            column_labels: Some(check.column_labels),
            help: Some(
                "Use list_columns() to see all available columns and their IDs".to_string(),
            ),
            ..AddRecordsSafeResponse::default()
        });
    }

    let record_ids = client
        .add_records(&params.doc_id, &params.table_id, &into_values(params.records))
        .await
        .context("failed to add records")?;
    Ok(AddRecordsSafeResponse {
        success: true,
        message: format!(
            "Successfully added {} records to table {}",
            record_ids.len(),
            params.table_id
        ),
        records_count: Some(record_ids.len()),
        record_ids: Some(record_ids),
        ..AddRecordsSafeResponse::default()
    })
}

pub async fn update_grist_records(
    state: Arc<AppState>,
    params: UpdateRecordsParams,
) -> Result<UpdateRecordsResponse> {
    const TOOL: &str = "update_grist_records";
    ensure_records(TOOL, &params.records)?;
    let records = into_values(params.records);
    let shaped = shape_records_for_update(&records)
        .map_err(|e| InvalidParamsError::new(TOOL, e.to_string()).with_path("records"))?;

    let record_ids = state
        .client()
        .update_records(&params.doc_id, &params.table_id, shaped)
        .await
        .context("error updating records")?;
    Ok(UpdateRecordsResponse {
        success: true,
        message: format!(
            "Successfully updated {} records in table {}",
            record_ids.len(),
            params.table_id
        ),
        record_ids,
    })
}

pub async fn delete_grist_records(
    state: Arc<AppState>,
    params: DeleteRecordsParams,
) -> Result<DeleteRecordsResponse> {
    if params.record_ids.is_empty() {
        return Ok(DeleteRecordsResponse {
            success: false,
            message: "No record IDs provided for deletion".to_string(),
            deleted_ids: None,
            attempted_ids: Some(Vec::new()),
            strategy: None,
            degraded: None,
        });
    }

    let outcome = state
        .client()
        .delete_records_with_fallback(
            &params.doc_id,
            &params.table_id,
            &params.record_ids,
            params.allow_soft_clear,
        )
        .await;
    match outcome {
        Ok(strategy) => {
            let count = params.record_ids.len();
            let message = if strategy.is_degraded() {
                format!(
                    "{count} records in table {} were cleared, not removed: both delete endpoints were refused",
                    params.table_id
                )
            } else {
                format!(
                    "Successfully deleted {count} records from table {}",
                    params.table_id
                )
            };
            Ok(DeleteRecordsResponse {
                success: true,
                message,
                deleted_ids: Some(params.record_ids),
                attempted_ids: None,
                strategy: Some(strategy),
                degraded: Some(strategy.is_degraded()),
            })
        }
        Err(failure) => {
            tracing::error!(doc_id = %params.doc_id, table_id = %params.table_id, error = %failure, "record deletion failed");
            Ok(DeleteRecordsResponse {
                success: false,
                message: failure.to_string(),
                deleted_ids: None,
                attempted_ids: Some(params.record_ids),
                strategy: None,
                degraded: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn referenced_columns_reads_through_fields_wrappers() {
        let records = vec![
            object(json!({"nom": "Dupont", "age": 3})),
            object(json!({"fields": {"age": 4, "ville": "Lyon"}})),
        ];
        let names: Vec<&str> = referenced_columns(&records).into_iter().collect();
        assert_eq!(names, vec!["nom", "age", "ville"]);
    }

    #[test]
    fn empty_records_are_rejected_before_any_request() {
        let err = ensure_records("add_grist_records", &[]).unwrap_err();
        let params = err.downcast_ref::<InvalidParamsError>().expect("invalid params");
        assert_eq!(params.path(), Some("records"));
    }
}
