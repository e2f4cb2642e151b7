use crate::model::{OrgRef, StatusResponse, Workspace};
use crate::state::AppState;
use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListWorkspacesParams {
    pub org_id: OrgRef,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WorkspaceParams {
    pub workspace_id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateWorkspaceParams {
    pub org_id: OrgRef,
    pub name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ModifyWorkspaceParams {
    pub workspace_id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct DescribeWorkspaceResponse {
    pub success: bool,
    pub message: String,
    pub workspace: Value,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CreateWorkspaceResponse {
    pub success: bool,
    pub message: String,
    pub workspace_id: Value,
}

pub async fn list_workspaces(
    state: Arc<AppState>,
    params: ListWorkspacesParams,
) -> Result<Vec<Workspace>> {
    state
        .client()
        .list_workspaces(&params.org_id)
        .await
        .context("error listing workspaces")
}

pub async fn describe_workspace(
    state: Arc<AppState>,
    params: WorkspaceParams,
) -> Result<DescribeWorkspaceResponse> {
    let workspace = state
        .client()
        .describe_workspace(params.workspace_id)
        .await
        .context("error describing workspace")?;
    Ok(DescribeWorkspaceResponse {
        success: true,
        message: format!("Workspace {} retrieved successfully", params.workspace_id),
        workspace,
    })
}

pub async fn create_workspace(
    state: Arc<AppState>,
    params: CreateWorkspaceParams,
) -> Result<CreateWorkspaceResponse> {
    let workspace_id = state
        .client()
        .create_workspace(&params.org_id, &params.name)
        .await
        .context("error creating workspace")?;
    Ok(CreateWorkspaceResponse {
        success: true,
        message: format!(
            "Workspace '{}' created successfully in organization {}",
            params.name, params.org_id
        ),
        workspace_id,
    })
}

pub async fn modify_workspace(
    state: Arc<AppState>,
    params: ModifyWorkspaceParams,
) -> Result<StatusResponse> {
    let Some(name) = params.name else {
        return Ok(StatusResponse::failed("No modification data provided"));
    };
    state
        .client()
        .modify_workspace(params.workspace_id, &json!({ "name": name }))
        .await
        .context("error modifying workspace")?;
    Ok(StatusResponse::ok(format!(
        "Workspace {} modified successfully",
        params.workspace_id
    )))
}

pub async fn delete_workspace(state: Arc<AppState>, params: WorkspaceParams) -> Result<StatusResponse> {
    state
        .client()
        .delete_workspace(params.workspace_id)
        .await
        .context("error deleting workspace")?;
    Ok(StatusResponse::ok(format!(
        "Workspace {} deleted successfully",
        params.workspace_id
    )))
}
