use crate::errors::InvalidParamsError;
use crate::state::AppState;
use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListAttachmentsParams {
    pub doc_id: String,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AttachmentParams {
    pub doc_id: String,
    pub attachment_id: i64,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UploadAttachmentParams {
    pub doc_id: String,
    pub filename: String,
    /// File content, standard base64 with padding
    pub content_base64: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ListAttachmentsResponse {
    pub success: bool,
    pub message: String,
    pub count: usize,
    pub attachments: Vec<Value>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AttachmentInfoResponse {
    pub success: bool,
    pub message: String,
    pub metadata: Value,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AttachmentDownloadResponse {
    pub success: bool,
    pub message: String,
    pub attachment_id: i64,
    pub file_size: usize,
    pub content_base64: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AttachmentUploadResponse {
    pub success: bool,
    pub message: String,
    pub attachment_ids: Vec<i64>,
    pub file_size: usize,
    pub content_type: String,
}

pub async fn list_attachments(
    state: Arc<AppState>,
    params: ListAttachmentsParams,
) -> Result<ListAttachmentsResponse> {
    let attachments = state
        .client()
        .list_attachments(&params.doc_id, params.sort.as_deref(), params.limit)
        .await
        .context("error listing attachments")?;
    Ok(ListAttachmentsResponse {
        success: true,
        message: format!("Found {} attachments", attachments.len()),
        count: attachments.len(),
        attachments,
    })
}

pub async fn get_attachment_info(
    state: Arc<AppState>,
    params: AttachmentParams,
) -> Result<AttachmentInfoResponse> {
    let metadata = state
        .client()
        .attachment_metadata(&params.doc_id, params.attachment_id)
        .await
        .context("error getting attachment info")?;
    Ok(AttachmentInfoResponse {
        success: true,
        message: format!("Attachment {} metadata retrieved", params.attachment_id),
        metadata,
    })
}

pub async fn download_attachment(
    state: Arc<AppState>,
    params: AttachmentParams,
) -> Result<AttachmentDownloadResponse> {
    let content = state
        .client()
        .download_attachment(&params.doc_id, params.attachment_id)
        .await
        .context("error downloading attachment")?;
    Ok(AttachmentDownloadResponse {
        success: true,
        message: format!("Attachment {} downloaded successfully", params.attachment_id),
        attachment_id: params.attachment_id,
        file_size: content.len(),
        content_base64: STANDARD.encode(&content),
    })
}

pub async fn upload_attachment(
    state: Arc<AppState>,
    params: UploadAttachmentParams,
) -> Result<AttachmentUploadResponse> {
    let content = STANDARD.decode(params.content_base64.trim()).map_err(|e| {
        InvalidParamsError::new("upload_attachment", format!("invalid base64 content: {e}"))
            .with_path("content_base64")
    })?;
    let file_size = content.len();

    let attachment_ids = state
        .client()
        .upload_attachment(&params.doc_id, &params.filename, content, &params.content_type)
        .await
        .context("error uploading attachment")?;
    Ok(AttachmentUploadResponse {
        success: true,
        message: format!("File '{}' uploaded successfully", params.filename),
        attachment_ids,
        file_size,
        content_type: params.content_type,
    })
}
