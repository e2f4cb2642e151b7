use crate::errors::InvalidParamsError;
use crate::model::{Document, StatusResponse};
use crate::state::AppState;
use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListDocumentsParams {
    pub workspace_id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DocParams {
    pub doc_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateDocumentParams {
    pub workspace_id: i64,
    pub name: String,
    #[serde(default)]
    pub is_pinned: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ModifyDocumentParams {
    pub doc_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_pinned: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MoveDocumentParams {
    pub doc_id: String,
    pub target_workspace_id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteDocumentHistoryParams {
    pub doc_id: String,
    /// Number of most recent actions to keep
    pub keep_actions: i64,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct DescribeDocumentResponse {
    pub success: bool,
    pub message: String,
    pub document: Value,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CreateDocumentResponse {
    pub success: bool,
    pub message: String,
    pub document_id: Value,
}

pub async fn list_documents(
    state: Arc<AppState>,
    params: ListDocumentsParams,
) -> Result<Vec<Document>> {
    state
        .client()
        .list_documents(params.workspace_id)
        .await
        .context("error listing documents")
}

pub async fn describe_document(
    state: Arc<AppState>,
    params: DocParams,
) -> Result<DescribeDocumentResponse> {
    let document = state
        .client()
        .describe_doc(&params.doc_id)
        .await
        .context("error describing document")?;
    Ok(DescribeDocumentResponse {
        success: true,
        message: format!("Document {} retrieved successfully", params.doc_id),
        document,
    })
}

pub async fn create_document(
    state: Arc<AppState>,
    params: CreateDocumentParams,
) -> Result<CreateDocumentResponse> {
    let document_id = state
        .client()
        .create_doc(params.workspace_id, &params.name, params.is_pinned)
        .await
        .context("error creating document")?;
    Ok(CreateDocumentResponse {
        success: true,
        message: format!(
            "Document '{}' created successfully in workspace {}",
            params.name, params.workspace_id
        ),
        document_id,
    })
}

pub async fn modify_document(
    state: Arc<AppState>,
    params: ModifyDocumentParams,
) -> Result<StatusResponse> {
    let mut body = Map::new();
    if let Some(name) = params.name {
        body.insert("name".into(), json!(name));
    }
    if let Some(is_pinned) = params.is_pinned {
        body.insert("isPinned".into(), json!(is_pinned));
    }
    if body.is_empty() {
        return Ok(StatusResponse::failed("No modification data provided"));
    }
    state
        .client()
        .modify_doc(&params.doc_id, &Value::Object(body))
        .await
        .context("error modifying document")?;
    Ok(StatusResponse::ok(format!(
        "Document {} modified successfully",
        params.doc_id
    )))
}

pub async fn delete_document(state: Arc<AppState>, params: DocParams) -> Result<StatusResponse> {
    state
        .client()
        .delete_doc(&params.doc_id)
        .await
        .context("error deleting document")?;
    Ok(StatusResponse::ok(format!(
        "Document {} deleted successfully",
        params.doc_id
    )))
}

pub async fn move_document(state: Arc<AppState>, params: MoveDocumentParams) -> Result<StatusResponse> {
    state
        .client()
        .move_doc(&params.doc_id, params.target_workspace_id)
        .await
        .context("error moving document")?;
    Ok(StatusResponse::ok(format!(
        "Document {} moved to workspace {} successfully",
        params.doc_id, params.target_workspace_id
    )))
}

pub async fn force_reload_document(state: Arc<AppState>, params: DocParams) -> Result<StatusResponse> {
    state
        .client()
        .force_reload_doc(&params.doc_id)
        .await
        .context("error reloading document")?;
    Ok(StatusResponse::ok(format!(
        "Document {} reloaded successfully",
        params.doc_id
    )))
}

pub async fn delete_document_history(
    state: Arc<AppState>,
    params: DeleteDocumentHistoryParams,
) -> Result<StatusResponse> {
    if params.keep_actions < 0 {
        return Err(InvalidParamsError::new(
            "delete_document_history",
            "keep_actions must be zero or greater",
        )
        .with_path("keep_actions")
        .into());
    }
    state
        .client()
        .delete_doc_history(&params.doc_id, params.keep_actions)
        .await
        .context("error deleting document history")?;
    Ok(StatusResponse::ok(format!(
        "History of document {} deleted, keeping the last {} actions",
        params.doc_id, params.keep_actions
    )))
}
