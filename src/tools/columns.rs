use crate::formula::{FormulaColumn, FormulaIssue};
use crate::model::{Column, StatusResponse};
use crate::state::AppState;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TableParams {
    pub doc_id: String,
    pub table_id: String,
}

fn any_type() -> String {
    "Any".to_string()
}

fn text_type() -> String {
    "Text".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateColumnParams {
    pub doc_id: String,
    pub table_id: String,
    #[serde(default)]
    pub column_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Grist column type (Text, Numeric, Int, Bool, Date, Choice, Ref:Table, ...)
    #[serde(default = "any_type")]
    pub column_type: String,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub is_formula: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ModifyColumnParams {
    pub doc_id: String,
    pub table_id: String,
    pub column_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub column_type: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub is_formula: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReplaceColumnsParams {
    pub doc_id: String,
    pub table_id: String,
    /// Column definitions as `{"id": ..., "fields": {...}}`
    pub columns: Vec<Value>,
    /// Do not add columns missing from the table
    #[serde(default)]
    pub noadd: bool,
    /// Do not update existing columns
    #[serde(default)]
    pub noupdate: bool,
    /// Remove columns not listed
    #[serde(default)]
    pub replaceall: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteColumnParams {
    pub doc_id: String,
    pub table_id: String,
    pub column_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ColumnConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default = "text_type")]
    pub column_type: String,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub is_formula: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateColumnWithFeedbackParams {
    pub doc_id: String,
    pub table_id: String,
    pub column_config: ColumnConfig,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ValidateFormulaParams {
    pub doc_id: String,
    pub table_id: String,
    /// Formula referencing columns as `$ColumnId`, e.g. `$Prix * 1.2`
    pub formula: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateFormulaColumnParams {
    pub doc_id: String,
    pub table_id: String,
    pub column_label: String,
    pub formula: String,
    #[serde(default = "any_type")]
    pub column_type: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CreateColumnResponse {
    pub success: bool,
    pub message: String,
    pub columns: Vec<Value>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct ColumnFeedbackResponse {
    pub success: bool,
    pub message: String,
    pub available_tables: Option<Vec<String>>,
    pub suggestion: Option<String>,
    pub column_final_id: Option<String>,
    pub column_label: Option<Value>,
    pub column_type: Option<Value>,
    pub column_config: Option<Map<String, Value>>,
    pub all_columns_count: Option<usize>,
    pub created_column_details: Option<Column>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct FormulaGuide {
    pub how_to_reference: &'static str,
    pub case_sensitive: &'static str,
    pub example: &'static str,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct FormulaHelpersResponse {
    pub success: bool,
    pub message: String,
    pub doc_id: String,
    pub table_id: String,
    pub formula_guide: FormulaGuide,
    pub columns: Vec<FormulaColumn>,
    pub quick_reference: IndexMap<String, String>,
    pub id_to_label_map: IndexMap<String, String>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, JsonSchema)]
pub struct ValidateFormulaResponse {
    pub success: bool,
    pub message: String,
    pub formula_valid: bool,
    pub original_formula: String,
    pub corrected_formula: Option<String>,
    pub auto_fix_available: Option<bool>,
    pub issues: Option<Vec<FormulaIssue>>,
    pub help: Option<String>,
    pub available_columns: Option<Vec<String>>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct FormulaCorrections {
    pub original: String,
    pub corrected: String,
    pub issues_fixed: Vec<FormulaIssue>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, JsonSchema)]
pub struct CreateFormulaColumnResponse {
    pub success: bool,
    pub message: String,
    pub column_id: Option<String>,
    pub final_formula: String,
    pub formula_corrections: Option<FormulaCorrections>,
}

pub async fn list_columns(state: Arc<AppState>, params: TableParams) -> Result<Vec<Column>> {
    state
        .client()
        .list_columns(&params.doc_id, &params.table_id)
        .await
        .context("error listing columns")
}

pub async fn create_column(
    state: Arc<AppState>,
    params: CreateColumnParams,
) -> Result<CreateColumnResponse> {
    let mut fields = Map::new();
    if let Some(label) = params.label.filter(|l| !l.is_empty()) {
        fields.insert("label".into(), json!(label));
    }
    if params.column_type != "Any" {
        fields.insert("type".into(), json!(params.column_type));
    }
    if let Some(formula) = params.formula.filter(|f| !f.is_empty()) {
        fields.insert("formula".into(), json!(formula));
    }
    if params.is_formula {
        fields.insert("isFormula".into(), json!(true));
    }

    let mut column = Map::new();
    if let Some(column_id) = params.column_id.filter(|id| !id.is_empty()) {
        column.insert("id".into(), json!(column_id));
    }
    column.insert("fields".into(), Value::Object(fields));

    let columns = state
        .client()
        .create_columns(
            &params.doc_id,
            &params.table_id,
            &json!({ "columns": [column] }),
        )
        .await
        .context("error creating column")?;
    Ok(CreateColumnResponse {
        success: true,
        message: format!("Column created successfully in table {}", params.table_id),
        columns,
    })
}

pub async fn modify_column(state: Arc<AppState>, params: ModifyColumnParams) -> Result<StatusResponse> {
    let mut fields = Map::new();
    if let Some(label) = params.label {
        fields.insert("label".into(), json!(label));
    }
    if let Some(column_type) = params.column_type {
        fields.insert("type".into(), json!(column_type));
    }
    if let Some(formula) = params.formula {
        fields.insert("formula".into(), json!(formula));
    }
    if let Some(is_formula) = params.is_formula {
        fields.insert("isFormula".into(), json!(is_formula));
    }
    if fields.is_empty() {
        return Ok(StatusResponse::failed("No modification data provided"));
    }

    let body = json!({ "columns": [{ "id": params.column_id, "fields": fields }] });
    state
        .client()
        .modify_columns(&params.doc_id, &params.table_id, &body)
        .await
        .context("error modifying column")?;
    Ok(StatusResponse::ok(format!(
        "Column {} modified successfully",
        params.column_id
    )))
}

pub async fn replace_columns(
    state: Arc<AppState>,
    params: ReplaceColumnsParams,
) -> Result<StatusResponse> {
    state
        .client()
        .replace_columns(
            &params.doc_id,
            &params.table_id,
            &json!({ "columns": params.columns }),
            params.noadd,
            params.noupdate,
            params.replaceall,
        )
        .await
        .context("error replacing columns")?;
    Ok(StatusResponse::ok(format!(
        "Columns of table {} replaced successfully",
        params.table_id
    )))
}

pub async fn delete_column(state: Arc<AppState>, params: DeleteColumnParams) -> Result<StatusResponse> {
    state
        .client()
        .delete_column(&params.doc_id, &params.table_id, &params.column_id)
        .await
        .context("error deleting column")?;
    Ok(StatusResponse::ok(format!(
        "Column {} deleted successfully from table {}",
        params.column_id, params.table_id
    )))
}

pub async fn create_column_with_feedback(
    state: Arc<AppState>,
    params: CreateColumnWithFeedbackParams,
) -> Result<ColumnFeedbackResponse> {
    let client = state.client();
    let check = super::table_check(client, &params.doc_id, &params.table_id).await?;
    if !check.exists {
        return Ok(ColumnFeedbackResponse {
            success: false,
            message: check.error.unwrap_or_else(|| "Table validation failed".to_string()),
            available_tables: check.available_tables,
            suggestion: check.suggestion,
            ..ColumnFeedbackResponse::default()
        });
    }

    let config = params.column_config;
    let mut fields = Map::new();
    if let Some(label) = &config.label {
        fields.insert("label".into(), json!(label));
    }
    fields.insert("type".into(), json!(config.column_type));
    if let Some(formula) = &config.formula {
        fields.insert("formula".into(), json!(formula));
    }
    if let Some(is_formula) = config.is_formula {
        fields.insert("isFormula".into(), json!(is_formula));
    }
    let mut column = Map::new();
    if let Some(id) = &config.id {
        column.insert("id".into(), json!(id));
    }
    column.insert("fields".into(), Value::Object(fields));

    let created = client
        .create_columns(
            &params.doc_id,
            &params.table_id,
            &json!({ "columns": [column] }),
        )
        .await
        .context("failed to create column")?;
    let columns = client
        .list_columns(&params.doc_id, &params.table_id)
        .await
        .context("failed to list columns after creation")?;

    let by_label = config.label.as_deref().and_then(|label| {
        columns
            .iter()
            .find(|col| col.fields.get("label").and_then(Value::as_str) == Some(label))
    });
    let created_id = created
        .first()
        .and_then(|col| col.get("id"))
        .and_then(Value::as_str);
    let found = by_label.or_else(|| {
        created_id.and_then(|id| columns.iter().find(|col| col.id == id))
    });

    Ok(ColumnFeedbackResponse {
        success: true,
        message: format!("Column created successfully in table {}", params.table_id),
        column_final_id: found.map(|col| col.id.clone()),
        column_label: found.and_then(|col| col.fields.get("label").cloned()),
        column_type: found.and_then(|col| col.fields.get("type").cloned()),
        column_config: found.map(|col| col.fields.clone()),
        all_columns_count: Some(columns.len()),
        created_column_details: found.cloned(),
        ..ColumnFeedbackResponse::default()
    })
}

pub async fn get_formula_helpers(
    state: Arc<AppState>,
    params: TableParams,
) -> Result<FormulaHelpersResponse> {
    let map = super::formula_map(state.client(), &params.doc_id, &params.table_id).await?;
    Ok(FormulaHelpersResponse {
        success: true,
        message: format!("Formula helpers for table {}", params.table_id),
        doc_id: params.doc_id,
        table_id: params.table_id,
        formula_guide: FormulaGuide {
            how_to_reference: "Use $ColumnID syntax in formulas",
            case_sensitive: "Column IDs are case-sensitive",
            example: "For addition: $Prix + $Taxe",
        },
        columns: map.columns,
        quick_reference: map.formula_references,
        id_to_label_map: map.id_to_label,
    })
}

pub async fn validate_formula(
    state: Arc<AppState>,
    params: ValidateFormulaParams,
) -> Result<ValidateFormulaResponse> {
    let map = super::formula_map(state.client(), &params.doc_id, &params.table_id).await?;
    let validation = map.validate(&params.formula);

    let has_issues = !validation.issues.is_empty();
    let available_columns = (!validation.valid).then(|| {
        map.columns
            .iter()
            .map(|col| format!("${} (label: {})", col.id, col.label))
            .collect()
    });
    Ok(ValidateFormulaResponse {
        success: true,
        message: if validation.valid {
            "Formula is valid".to_string()
        } else {
            format!("Found {} issue(s) in formula", validation.issues.len())
        },
        formula_valid: validation.valid,
        original_formula: validation.original_formula,
        auto_fix_available: validation.corrected_formula.as_ref().map(|_| true),
        corrected_formula: validation.corrected_formula,
        help: has_issues
            .then(|| "Issues found in formula - see corrected_formula for fixes".to_string()),
        issues: has_issues.then_some(validation.issues),
        available_columns,
    })
}

pub async fn create_column_with_formula_safe(
    state: Arc<AppState>,
    params: CreateFormulaColumnParams,
) -> Result<CreateFormulaColumnResponse> {
    let client = state.client();
    let map = super::formula_map(client, &params.doc_id, &params.table_id)
        .await
        .context("formula validation failed")?;
    let validation = map.validate(&params.formula);
    let final_formula = validation
        .corrected_formula
        .clone()
        .unwrap_or_else(|| params.formula.clone());
    if !validation.issues.is_empty() {
        tracing::info!(original = %params.formula, corrected = %final_formula, "formula auto-corrected");
    }

    let body = json!({
        "columns": [{
            "fields": {
                "label": params.column_label,
                "type": params.column_type,
                "formula": final_formula,
                "isFormula": true,
            }
        }]
    });
    client
        .create_columns(&params.doc_id, &params.table_id, &body)
        .await
        .context("could not create formula column")?;

    let columns = client
        .list_columns(&params.doc_id, &params.table_id)
        .await
        .context("could not list columns after creation")?;
    let column_id = columns
        .iter()
        .find(|col| col.fields.get("label").and_then(Value::as_str) == Some(&params.column_label))
        .map(|col| col.id.clone());

    let formula_corrections = (!validation.issues.is_empty()).then(|| FormulaCorrections {
        original: params.formula.clone(),
        corrected: final_formula.clone(),
        issues_fixed: validation.issues,
    });
    Ok(CreateFormulaColumnResponse {
        success: true,
        message: format!("Formula column '{}' created successfully", params.column_label),
        column_id,
        final_formula,
        formula_corrections,
    })
}
