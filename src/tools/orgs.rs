use crate::model::{OrgRef, Organization, StatusResponse};
use crate::state::AppState;
use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OrgParams {
    /// Organization id or domain (e.g. `docs`, `current`)
    pub org_id: OrgRef,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ModifyOrganizationParams {
    pub org_id: OrgRef,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct DescribeOrganizationResponse {
    pub success: bool,
    pub message: String,
    pub organization: Value,
}

pub async fn list_organizations(state: Arc<AppState>) -> Result<Vec<Organization>> {
    state
        .client()
        .list_orgs()
        .await
        .context("error listing organizations")
}

pub async fn describe_organization(
    state: Arc<AppState>,
    params: OrgParams,
) -> Result<DescribeOrganizationResponse> {
    let organization = state
        .client()
        .describe_org(&params.org_id)
        .await
        .context("error describing organization")?;
    Ok(DescribeOrganizationResponse {
        success: true,
        message: format!("Organization {} retrieved successfully", params.org_id),
        organization,
    })
}

pub async fn modify_organization(
    state: Arc<AppState>,
    params: ModifyOrganizationParams,
) -> Result<StatusResponse> {
    let Some(name) = params.name else {
        return Ok(StatusResponse::failed("No modification data provided"));
    };
    state
        .client()
        .modify_org(&params.org_id, &json!({ "name": name }))
        .await
        .context("error modifying organization")?;
    Ok(StatusResponse::ok(format!(
        "Organization {} modified successfully",
        params.org_id
    )))
}

pub async fn delete_organization(state: Arc<AppState>, params: OrgParams) -> Result<StatusResponse> {
    state
        .client()
        .delete_org(&params.org_id)
        .await
        .context("error deleting organization")?;
    Ok(StatusResponse::ok(format!(
        "Organization {} deleted successfully",
        params.org_id
    )))
}
