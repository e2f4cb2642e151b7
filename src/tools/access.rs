use super::param_enums::{AccessLevel, parse_choice};
use crate::api::AccessTarget;
use crate::model::{OrgRef, StatusResponse};
use crate::state::AppState;
use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OrgAccessParams {
    pub org_id: OrgRef,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WorkspaceAccessParams {
    pub workspace_id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DocAccessParams {
    pub doc_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ModifyOrganizationAccessParams {
    pub org_id: OrgRef,
    pub user_email: String,
    /// owners, editors, viewers, members, or null to remove the user
    #[serde(default)]
    pub access_level: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ModifyWorkspaceAccessParams {
    pub workspace_id: i64,
    pub user_email: String,
    /// owners, editors, viewers, members, or null to remove the user
    #[serde(default)]
    pub access_level: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ModifyDocumentAccessParams {
    pub doc_id: String,
    pub user_email: String,
    /// owners, editors, viewers, members, or null to remove the user
    #[serde(default)]
    pub access_level: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AccessListResponse {
    pub success: bool,
    pub message: String,
    pub access: Value,
}

async fn list_access(state: &AppState, target: AccessTarget) -> Result<AccessListResponse> {
    let access = state
        .client()
        .list_access(&target)
        .await
        .context("error listing access")?;
    Ok(AccessListResponse {
        success: true,
        message: "Access list retrieved successfully".to_string(),
        access,
    })
}

async fn modify_access(
    state: &AppState,
    tool: &'static str,
    target: AccessTarget,
    email: &str,
    raw_level: Option<&str>,
) -> Result<StatusResponse> {
    let level = match raw_level {
        None => AccessLevel::Remove,
        Some(raw) => parse_choice::<AccessLevel>(tool, "access_level", raw)?,
    };
    state
        .client()
        .modify_access(&target, email, level.role())
        .await
        .context("error modifying access")?;
    let action = match level.role() {
        Some(role) => format!("set to {role}"),
        None => "removed".to_string(),
    };
    Ok(StatusResponse::ok(format!(
        "Access for {email} {action} successfully"
    )))
}

pub async fn list_organization_access(
    state: Arc<AppState>,
    params: OrgAccessParams,
) -> Result<AccessListResponse> {
    list_access(&state, AccessTarget::Org(params.org_id)).await
}

pub async fn list_workspace_access(
    state: Arc<AppState>,
    params: WorkspaceAccessParams,
) -> Result<AccessListResponse> {
    list_access(&state, AccessTarget::Workspace(params.workspace_id)).await
}

pub async fn list_document_access(
    state: Arc<AppState>,
    params: DocAccessParams,
) -> Result<AccessListResponse> {
    list_access(&state, AccessTarget::Doc(params.doc_id)).await
}

pub async fn modify_organization_access(
    state: Arc<AppState>,
    params: ModifyOrganizationAccessParams,
) -> Result<StatusResponse> {
    modify_access(
        &state,
        "modify_organization_access",
        AccessTarget::Org(params.org_id),
        &params.user_email,
        params.access_level.as_deref(),
    )
    .await
}

pub async fn modify_workspace_access(
    state: Arc<AppState>,
    params: ModifyWorkspaceAccessParams,
) -> Result<StatusResponse> {
    modify_access(
        &state,
        "modify_workspace_access",
        AccessTarget::Workspace(params.workspace_id),
        &params.user_email,
        params.access_level.as_deref(),
    )
    .await
}

pub async fn modify_document_access(
    state: Arc<AppState>,
    params: ModifyDocumentAccessParams,
) -> Result<StatusResponse> {
    modify_access(
        &state,
        "modify_document_access",
        AccessTarget::Doc(params.doc_id),
        &params.user_email,
        params.access_level.as_deref(),
    )
    .await
}
