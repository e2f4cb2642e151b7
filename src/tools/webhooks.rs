use crate::model::StatusResponse;
use crate::state::AppState;
use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WebhookDocParams {
    pub doc_id: String,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateWebhookParams {
    pub doc_id: String,
    pub name: String,
    /// Endpoint receiving the POSTed payloads
    pub url: String,
    pub table_id: String,
    /// e.g. `["add", "update"]`
    pub event_types: Vec<String>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Bool column gating delivery until a record is ready
    #[serde(default)]
    pub is_ready_column: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ModifyWebhookParams {
    pub doc_id: String,
    pub webhook_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
    #[serde(default)]
    pub is_ready_column: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteWebhookParams {
    pub doc_id: String,
    pub webhook_id: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ListWebhooksResponse {
    pub success: bool,
    pub message: String,
    pub count: usize,
    pub webhooks: Vec<Value>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CreateWebhookResponse {
    pub success: bool,
    pub message: String,
    pub doc_id: String,
    pub webhook: Option<Value>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct DeleteWebhookResponse {
    pub success: bool,
    pub message: String,
    pub result: Value,
}

pub async fn list_webhooks(
    state: Arc<AppState>,
    params: WebhookDocParams,
) -> Result<ListWebhooksResponse> {
    let webhooks = state
        .client()
        .list_webhooks(&params.doc_id)
        .await
        .context("error listing webhooks")?;
    Ok(ListWebhooksResponse {
        success: true,
        message: format!("Found {} webhooks", webhooks.len()),
        count: webhooks.len(),
        webhooks,
    })
}

pub async fn create_webhook(
    state: Arc<AppState>,
    params: CreateWebhookParams,
) -> Result<CreateWebhookResponse> {
    let mut fields = Map::new();
    fields.insert("name".into(), json!(params.name));
    fields.insert("url".into(), json!(params.url));
    fields.insert("tableId".into(), json!(params.table_id));
    fields.insert("eventTypes".into(), json!(params.event_types));
    fields.insert("enabled".into(), json!(params.enabled));
    if let Some(memo) = params.memo.filter(|m| !m.is_empty()) {
        fields.insert("memo".into(), json!(memo));
    }
    if let Some(column) = params.is_ready_column.filter(|c| !c.is_empty()) {
        fields.insert("isReadyColumn".into(), json!(column));
    }

    let created = state
        .client()
        .create_webhooks(&params.doc_id, &[Value::Object(fields)])
        .await
        .context("error creating webhook")?;
    Ok(CreateWebhookResponse {
        success: true,
        message: format!("Webhook '{}' created successfully", params.name),
        doc_id: params.doc_id,
        webhook: created.into_iter().next(),
    })
}

pub async fn modify_webhook(state: Arc<AppState>, params: ModifyWebhookParams) -> Result<StatusResponse> {
    let mut fields = Map::new();
    if let Some(name) = params.name {
        fields.insert("name".into(), json!(name));
    }
    if let Some(url) = params.url {
        fields.insert("url".into(), json!(url));
    }
    if let Some(enabled) = params.enabled {
        fields.insert("enabled".into(), json!(enabled));
    }
    if let Some(memo) = params.memo {
        fields.insert("memo".into(), json!(memo));
    }
    if let Some(event_types) = params.event_types {
        fields.insert("eventTypes".into(), json!(event_types));
    }
    if let Some(column) = params.is_ready_column {
        fields.insert("isReadyColumn".into(), json!(column));
    }
    if fields.is_empty() {
        return Ok(StatusResponse::failed("No modification data provided"));
    }

    state
        .client()
        .modify_webhook(&params.doc_id, &params.webhook_id, &Value::Object(fields))
        .await
        .context("error modifying webhook")?;
    Ok(StatusResponse::ok(format!(
        "Webhook {} modified successfully",
        params.webhook_id
    )))
}

pub async fn delete_webhook(
    state: Arc<AppState>,
    params: DeleteWebhookParams,
) -> Result<DeleteWebhookResponse> {
    let result = state
        .client()
        .delete_webhook(&params.doc_id, &params.webhook_id)
        .await
        .context("error deleting webhook")?;
    Ok(DeleteWebhookResponse {
        success: true,
        message: format!("Webhook {} deleted successfully", params.webhook_id),
        result,
    })
}

pub async fn clear_webhook_queue(
    state: Arc<AppState>,
    params: WebhookDocParams,
) -> Result<StatusResponse> {
    state
        .client()
        .clear_webhook_queue(&params.doc_id)
        .await
        .context("error clearing webhook queue")?;
    Ok(StatusResponse::ok(format!(
        "Webhook queue cleared for document {}",
        params.doc_id
    )))
}
