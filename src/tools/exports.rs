use super::param_enums::{HeaderFormat, parse_choice};
use crate::state::AppState;
use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

const SQLITE_MIME: &str = "application/x-sqlite3";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

fn default_header_format() -> String {
    HeaderFormat::default().as_str().to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DownloadSqliteParams {
    pub doc_id: String,
    /// Drop document history to reduce file size
    #[serde(default)]
    pub remove_history: bool,
    /// Keep structure only, without data or history
    #[serde(default)]
    pub as_template: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DownloadExcelParams {
    pub doc_id: String,
    /// `label` or `colId`
    #[serde(default = "default_header_format")]
    pub header_format: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TableExportParams {
    pub doc_id: String,
    pub table_id: String,
    /// `label` or `colId`
    #[serde(default = "default_header_format")]
    pub header_format: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct BinaryExportResponse {
    pub success: bool,
    pub message: String,
    pub file_size: usize,
    pub format: &'static str,
    pub content_base64: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CsvExportResponse {
    pub success: bool,
    pub message: String,
    pub table_id: String,
    pub format: &'static str,
    pub content: String,
    pub size: usize,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct TableSchemaResponse {
    pub success: bool,
    pub message: String,
    pub table_id: String,
    pub schema: Value,
}

fn binary_export(message: String, format: &'static str, content: &[u8]) -> BinaryExportResponse {
    BinaryExportResponse {
        success: true,
        message,
        file_size: content.len(),
        format,
        content_base64: STANDARD.encode(content),
    }
}

pub async fn download_document_sqlite(
    state: Arc<AppState>,
    params: DownloadSqliteParams,
) -> Result<BinaryExportResponse> {
    let content = state
        .client()
        .download_doc(&params.doc_id, params.remove_history, params.as_template)
        .await
        .context("error downloading document")?;
    Ok(binary_export(
        format!("Document {} downloaded successfully as SQLite", params.doc_id),
        SQLITE_MIME,
        &content,
    ))
}

pub async fn download_document_excel(
    state: Arc<AppState>,
    params: DownloadExcelParams,
) -> Result<BinaryExportResponse> {
    let header: HeaderFormat =
        parse_choice("download_document_excel", "header_format", &params.header_format)?;
    let content = state
        .client()
        .download_doc_xlsx(&params.doc_id, header.as_str())
        .await
        .context("error downloading document")?;
    Ok(binary_export(
        format!("Document {} downloaded successfully as Excel", params.doc_id),
        XLSX_MIME,
        &content,
    ))
}

pub async fn download_table_csv(
    state: Arc<AppState>,
    params: TableExportParams,
) -> Result<CsvExportResponse> {
    let header: HeaderFormat =
        parse_choice("download_table_csv", "header_format", &params.header_format)?;
    let content = state
        .client()
        .download_table_csv(&params.doc_id, &params.table_id, header.as_str())
        .await
        .context("error downloading table")?;
    Ok(CsvExportResponse {
        success: true,
        message: format!("Table {} downloaded successfully as CSV", params.table_id),
        size: content.len(),
        table_id: params.table_id,
        format: "text/csv",
        content,
    })
}

pub async fn get_table_schema(
    state: Arc<AppState>,
    params: TableExportParams,
) -> Result<TableSchemaResponse> {
    let header: HeaderFormat =
        parse_choice("get_table_schema", "header_format", &params.header_format)?;
    let schema = state
        .client()
        .download_table_schema(&params.doc_id, &params.table_id, header.as_str())
        .await
        .context("error getting table schema")?;
    Ok(TableSchemaResponse {
        success: true,
        message: format!("Schema for table {} retrieved successfully", params.table_id),
        table_id: params.table_id,
        schema,
    })
}
