use crate::config::{ServerConfig, TransportKind};
use crate::errors::{InvalidFormatError, InvalidParamsError};
use crate::state::AppState;
use crate::tools::{
    access, attachments, columns, documents, exports, forms, orgs, records, sql, tables, webhooks,
    workspaces,
};
use anyhow::{Context, Result, anyhow};
use rmcp::{
    ErrorData as McpError, ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::{
        stdio,
        streamable_http_server::{
            StreamableHttpServerConfig, StreamableHttpService,
            session::local::LocalSessionManager,
        },
    },
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const INSTRUCTIONS: &str = "\
Grist MCP: manage Grist organizations, workspaces, documents, tables, records and forms.

WORKFLOW:
1) list_organizations → list_workspaces → list_documents to locate a document
2) list_tables → list_columns (or get_formula_helpers) before touching data
3) list_records or filter_sql_query/execute_sql_query to read
4) add_grist_records_safe / update_grist_records / delete_grist_records to write

TOOL SELECTION:
- add_grist_records_safe: Validates the table and column names first and suggests close matches. \
Prefer it over add_grist_records when column ids are uncertain.
- update_grist_records: Records may be `{id, fields}` or flat `{id, ...values}`.
- delete_grist_records: Tries true deletion first. With allow_soft_clear=true a last-resort \
strategy blanks the rows instead and the response is flagged degraded.
- execute_sql_query: Read-only. Only statements starting with SELECT or WITH are accepted.
- validate_formula / create_column_with_formula_safe: Column references use `$ColumnId`. \
Case mistakes are corrected automatically; unknown columns get suggestions.
- Forms: get_form_help explains the JSON shapes; debug_grist_form_input shows how a blob is parsed.

RESPONSES:
- Every tool returns {success, message, ...}. Failures come back with success=false and the \
remote error text instead of raising.
- List tools return a bare JSON array.
- Binary exports and attachments are returned as base64.";

#[derive(Clone)]
pub struct GristServer {
    state: Arc<AppState>,
    tool_router: ToolRouter<GristServer>,
}

impl GristServer {
    pub fn new(config: Arc<ServerConfig>) -> Result<Self> {
        let state = Arc::new(AppState::new(config)?);
        Ok(Self::from_state(state))
    }

    pub fn from_state(state: Arc<AppState>) -> Self {
        Self {
            state,
            tool_router: Self::tool_router(),
        }
    }

    pub async fn run_stdio(self) -> Result<()> {
        let service = self
            .serve(stdio())
            .await
            .inspect_err(|error| tracing::error!("serving error: {:?}", error))?;
        service.waiting().await?;
        Ok(())
    }

    pub async fn run_http(self) -> Result<()> {
        let config = self.state.config();
        let server = self.clone();
        let service = StreamableHttpService::new(
            move || Ok(server.clone()),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig::default(),
        );
        let router = axum::Router::new().nest_service(&config.http_path, service);
        let listener = tokio::net::TcpListener::bind(config.http_bind_address)
            .await
            .with_context(|| format!("failed to bind {}", config.http_bind_address))?;
        tracing::info!(
            address = %config.http_bind_address,
            path = %config.http_path,
            "serving streamable http"
        );

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            signal.cancel();
        });

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled_owned().await })
            .await
            .context("http server error")?;
        Ok(())
    }

    pub async fn run(self) -> Result<()> {
        match self.state.config().transport {
            TransportKind::Stdio => self.run_stdio().await,
            TransportKind::Http => self.run_http().await,
        }
    }

    fn ensure_tool_enabled(&self, tool: &str) -> Result<()> {
        tracing::info!(tool = tool, "tool invocation requested");
        if self.state.config().is_tool_enabled(tool) {
            Ok(())
        } else {
            Err(ToolDisabledError::new(tool).into())
        }
    }

    async fn run_tool<T, F>(&self, tool: &str, fut: F) -> Result<CallToolResult, McpError>
    where
        F: Future<Output = Result<T>>,
        T: Serialize,
    {
        self.ensure_tool_enabled(tool)
            .map_err(|e| to_mcp_error_for_tool(tool, e))?;

        let outcome = if let Some(timeout_duration) = self.state.config().tool_timeout() {
            match tokio::time::timeout(timeout_duration, fut).await {
                Ok(result) => result,
                Err(_) => Err(anyhow!(
                    "tool '{}' timed out after {}ms",
                    tool,
                    timeout_duration.as_millis()
                )),
            }
        } else {
            fut.await
        };

        let payload = outcome.and_then(|value| self.to_payload(tool, &value));
        match payload {
            Ok(value) => into_call_result(value),
            Err(error) if is_policy_error(&error) => Err(to_mcp_error_for_tool(tool, error)),
            Err(error) => {
                tracing::error!(tool = tool, error = %format!("{error:#}"), "tool failed");
                Ok(CallToolResult::structured(failure_envelope(&error)))
            }
        }
    }

    fn to_payload<T: Serialize>(&self, tool: &str, value: &T) -> Result<Value> {
        let payload = serde_json::to_value(value)
            .map_err(|e| anyhow!("failed to serialize response for {}: {}", tool, e))?;
        self.ensure_response_size(tool, &payload)?;
        Ok(payload)
    }

    fn ensure_response_size(&self, tool: &str, value: &Value) -> Result<()> {
        let Some(limit) = self.state.config().max_response_bytes() else {
            return Ok(());
        };
        let payload = serde_json::to_vec(value)
            .map_err(|e| anyhow!("failed to serialize response for {}: {}", tool, e))?;
        if payload.len() > limit {
            return Err(ResponseTooLargeError::new(tool, payload.len(), limit).into());
        }
        Ok(())
    }
}

#[tool_router]
impl GristServer {
    #[tool(
        name = "list_organizations",
        description = "List the organizations the API key can access"
    )]
    pub async fn list_organizations(&self) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "list_organizations",
            orgs::list_organizations(self.state.clone()),
        )
        .await
    }

    #[tool(
        name = "describe_organization",
        description = "Get the details of one organization"
    )]
    pub async fn describe_organization(
        &self,
        Parameters(params): Parameters<orgs::OrgParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "describe_organization",
            orgs::describe_organization(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "modify_organization", description = "Rename an organization")]
    pub async fn modify_organization(
        &self,
        Parameters(params): Parameters<orgs::ModifyOrganizationParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "modify_organization",
            orgs::modify_organization(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "delete_organization", description = "Delete an organization")]
    pub async fn delete_organization(
        &self,
        Parameters(params): Parameters<orgs::OrgParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "delete_organization",
            orgs::delete_organization(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "list_workspaces",
        description = "List the workspaces of an organization"
    )]
    pub async fn list_workspaces(
        &self,
        Parameters(params): Parameters<workspaces::ListWorkspacesParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "list_workspaces",
            workspaces::list_workspaces(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "describe_workspace",
        description = "Get a workspace and its documents"
    )]
    pub async fn describe_workspace(
        &self,
        Parameters(params): Parameters<workspaces::WorkspaceParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "describe_workspace",
            workspaces::describe_workspace(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "create_workspace",
        description = "Create a workspace in an organization"
    )]
    pub async fn create_workspace(
        &self,
        Parameters(params): Parameters<workspaces::CreateWorkspaceParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "create_workspace",
            workspaces::create_workspace(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "modify_workspace", description = "Rename a workspace")]
    pub async fn modify_workspace(
        &self,
        Parameters(params): Parameters<workspaces::ModifyWorkspaceParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "modify_workspace",
            workspaces::modify_workspace(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "delete_workspace", description = "Delete a workspace")]
    pub async fn delete_workspace(
        &self,
        Parameters(params): Parameters<workspaces::WorkspaceParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "delete_workspace",
            workspaces::delete_workspace(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "list_documents",
        description = "List the documents of a workspace"
    )]
    pub async fn list_documents(
        &self,
        Parameters(params): Parameters<documents::ListDocumentsParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "list_documents",
            documents::list_documents(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "describe_document", description = "Get the details of a document")]
    pub async fn describe_document(
        &self,
        Parameters(params): Parameters<documents::DocParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "describe_document",
            documents::describe_document(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "create_document",
        description = "Create an empty document in a workspace"
    )]
    pub async fn create_document(
        &self,
        Parameters(params): Parameters<documents::CreateDocumentParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "create_document",
            documents::create_document(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "modify_document",
        description = "Rename or pin/unpin a document"
    )]
    pub async fn modify_document(
        &self,
        Parameters(params): Parameters<documents::ModifyDocumentParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "modify_document",
            documents::modify_document(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "delete_document", description = "Delete a document")]
    pub async fn delete_document(
        &self,
        Parameters(params): Parameters<documents::DocParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "delete_document",
            documents::delete_document(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "move_document",
        description = "Move a document to another workspace"
    )]
    pub async fn move_document(
        &self,
        Parameters(params): Parameters<documents::MoveDocumentParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "move_document",
            documents::move_document(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "force_reload_document",
        description = "Force the document engine to reload a document"
    )]
    pub async fn force_reload_document(
        &self,
        Parameters(params): Parameters<documents::DocParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "force_reload_document",
            documents::force_reload_document(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "delete_document_history",
        description = "Truncate document history, keeping the latest keep_actions actions"
    )]
    pub async fn delete_document_history(
        &self,
        Parameters(params): Parameters<documents::DeleteDocumentHistoryParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "delete_document_history",
            documents::delete_document_history(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "list_tables", description = "List the tables of a document")]
    pub async fn list_tables(
        &self,
        Parameters(params): Parameters<tables::ListTablesParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool("list_tables", tables::list_tables(self.state.clone(), params))
            .await
    }

    #[tool(
        name = "create_table",
        description = "Create a table (defaults to columns A and B)"
    )]
    pub async fn create_table(
        &self,
        Parameters(params): Parameters<tables::CreateTableParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "create_table",
            tables::create_table(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "modify_table", description = "Update the metadata fields of a table")]
    pub async fn modify_table(
        &self,
        Parameters(params): Parameters<tables::ModifyTableParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "modify_table",
            tables::modify_table(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "list_columns",
        description = "List the columns of a table with their ids, labels and types"
    )]
    pub async fn list_columns(
        &self,
        Parameters(params): Parameters<columns::TableParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "list_columns",
            columns::list_columns(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "create_column", description = "Add a column to a table")]
    pub async fn create_column(
        &self,
        Parameters(params): Parameters<columns::CreateColumnParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "create_column",
            columns::create_column(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "modify_column",
        description = "Change a column's label, type or formula"
    )]
    pub async fn modify_column(
        &self,
        Parameters(params): Parameters<columns::ModifyColumnParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "modify_column",
            columns::modify_column(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "replace_columns",
        description = "Add or update many columns at once (noadd/noupdate/replaceall flags)"
    )]
    pub async fn replace_columns(
        &self,
        Parameters(params): Parameters<columns::ReplaceColumnsParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "replace_columns",
            columns::replace_columns(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "delete_column", description = "Delete a column")]
    pub async fn delete_column(
        &self,
        Parameters(params): Parameters<columns::DeleteColumnParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "delete_column",
            columns::delete_column(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "create_column_with_feedback",
        description = "Create a column after checking the table exists, then report the final id Grist assigned"
    )]
    pub async fn create_column_with_feedback(
        &self,
        Parameters(params): Parameters<columns::CreateColumnWithFeedbackParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "create_column_with_feedback",
            columns::create_column_with_feedback(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "get_formula_helpers",
        description = "Formula syntax guide plus the `$id` reference for every column of a table"
    )]
    pub async fn get_formula_helpers(
        &self,
        Parameters(params): Parameters<columns::TableParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "get_formula_helpers",
            columns::get_formula_helpers(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "validate_formula",
        description = "Check `$column` references in a formula and propose a corrected formula"
    )]
    pub async fn validate_formula(
        &self,
        Parameters(params): Parameters<columns::ValidateFormulaParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "validate_formula",
            columns::validate_formula(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "create_column_with_formula_safe",
        description = "Validate and auto-correct a formula, then create the formula column"
    )]
    pub async fn create_column_with_formula_safe(
        &self,
        Parameters(params): Parameters<columns::CreateFormulaColumnParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "create_column_with_formula_safe",
            columns::create_column_with_formula_safe(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "list_records",
        description = "List the records of a table (optional sort and limit)"
    )]
    pub async fn list_records(
        &self,
        Parameters(params): Parameters<records::ListRecordsParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "list_records",
            records::list_records(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "add_grist_records",
        description = "Add records; each record is a column→value map or {fields: {...}}"
    )]
    pub async fn add_grist_records(
        &self,
        Parameters(params): Parameters<records::AddRecordsParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "add_grist_records",
            records::add_grist_records(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "add_grist_records_safe",
        description = "Add records after validating the table and column names, with suggestions on mismatch"
    )]
    pub async fn add_grist_records_safe(
        &self,
        Parameters(params): Parameters<records::AddRecordsParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "add_grist_records_safe",
            records::add_grist_records_safe(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "update_grist_records",
        description = "Update records given as {id, fields} or flat {id, ...values}"
    )]
    pub async fn update_grist_records(
        &self,
        Parameters(params): Parameters<records::UpdateRecordsParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "update_grist_records",
            records::update_grist_records(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "delete_grist_records",
        description = "Delete records by id, falling back to alternate endpoints and optionally to clearing rows"
    )]
    pub async fn delete_grist_records(
        &self,
        Parameters(params): Parameters<records::DeleteRecordsParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "delete_grist_records",
            records::delete_grist_records(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "filter_sql_query",
        description = "Build and run a SELECT with equality filters, ordering and limit"
    )]
    pub async fn filter_sql_query(
        &self,
        Parameters(params): Parameters<sql::FilterSqlParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "filter_sql_query",
            sql::filter_sql_query(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "execute_sql_query",
        description = "Run a read-only SQL query (SELECT or WITH only) with optional parameters"
    )]
    pub async fn execute_sql_query(
        &self,
        Parameters(params): Parameters<sql::ExecuteSqlParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "execute_sql_query",
            sql::execute_sql_query(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "list_organization_access",
        description = "List the users with access to an organization"
    )]
    pub async fn list_organization_access(
        &self,
        Parameters(params): Parameters<access::OrgAccessParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "list_organization_access",
            access::list_organization_access(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "modify_organization_access",
        description = "Set or remove (null) a user's access level on an organization"
    )]
    pub async fn modify_organization_access(
        &self,
        Parameters(params): Parameters<access::ModifyOrganizationAccessParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "modify_organization_access",
            access::modify_organization_access(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "list_workspace_access",
        description = "List the users with access to a workspace"
    )]
    pub async fn list_workspace_access(
        &self,
        Parameters(params): Parameters<access::WorkspaceAccessParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "list_workspace_access",
            access::list_workspace_access(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "modify_workspace_access",
        description = "Set or remove (null) a user's access level on a workspace"
    )]
    pub async fn modify_workspace_access(
        &self,
        Parameters(params): Parameters<access::ModifyWorkspaceAccessParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "modify_workspace_access",
            access::modify_workspace_access(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "list_document_access",
        description = "List the users with access to a document"
    )]
    pub async fn list_document_access(
        &self,
        Parameters(params): Parameters<access::DocAccessParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "list_document_access",
            access::list_document_access(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "modify_document_access",
        description = "Set or remove (null) a user's access level on a document"
    )]
    pub async fn modify_document_access(
        &self,
        Parameters(params): Parameters<access::ModifyDocumentAccessParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "modify_document_access",
            access::modify_document_access(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "download_document_sqlite",
        description = "Download a document as a SQLite file (base64)"
    )]
    pub async fn download_document_sqlite(
        &self,
        Parameters(params): Parameters<exports::DownloadSqliteParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "download_document_sqlite",
            exports::download_document_sqlite(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "download_document_excel",
        description = "Download a document as an Excel workbook (base64)"
    )]
    pub async fn download_document_excel(
        &self,
        Parameters(params): Parameters<exports::DownloadExcelParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "download_document_excel",
            exports::download_document_excel(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "download_table_csv", description = "Export one table as CSV text")]
    pub async fn download_table_csv(
        &self,
        Parameters(params): Parameters<exports::TableExportParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "download_table_csv",
            exports::download_table_csv(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "get_table_schema",
        description = "Get the frictionless data-package schema of a table"
    )]
    pub async fn get_table_schema(
        &self,
        Parameters(params): Parameters<exports::TableExportParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "get_table_schema",
            exports::get_table_schema(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "list_attachments",
        description = "List the attachments stored in a document"
    )]
    pub async fn list_attachments(
        &self,
        Parameters(params): Parameters<attachments::ListAttachmentsParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "list_attachments",
            attachments::list_attachments(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "get_attachment_info", description = "Get the metadata of an attachment")]
    pub async fn get_attachment_info(
        &self,
        Parameters(params): Parameters<attachments::AttachmentParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "get_attachment_info",
            attachments::get_attachment_info(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "download_attachment",
        description = "Download an attachment's content (base64)"
    )]
    pub async fn download_attachment(
        &self,
        Parameters(params): Parameters<attachments::AttachmentParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "download_attachment",
            attachments::download_attachment(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "upload_attachment",
        description = "Upload a file given as base64 and return the new attachment ids"
    )]
    pub async fn upload_attachment(
        &self,
        Parameters(params): Parameters<attachments::UploadAttachmentParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "upload_attachment",
            attachments::upload_attachment(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "list_webhooks", description = "List the webhooks of a document")]
    pub async fn list_webhooks(
        &self,
        Parameters(params): Parameters<webhooks::WebhookDocParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "list_webhooks",
            webhooks::list_webhooks(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "create_webhook",
        description = "Create a webhook firing on table events"
    )]
    pub async fn create_webhook(
        &self,
        Parameters(params): Parameters<webhooks::CreateWebhookParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "create_webhook",
            webhooks::create_webhook(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "modify_webhook", description = "Update the settings of a webhook")]
    pub async fn modify_webhook(
        &self,
        Parameters(params): Parameters<webhooks::ModifyWebhookParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "modify_webhook",
            webhooks::modify_webhook(self.state.clone(), params),
        )
        .await
    }

    #[tool(name = "delete_webhook", description = "Delete a webhook")]
    pub async fn delete_webhook(
        &self,
        Parameters(params): Parameters<webhooks::DeleteWebhookParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "delete_webhook",
            webhooks::delete_webhook(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "clear_webhook_queue",
        description = "Drop all pending webhook deliveries of a document"
    )]
    pub async fn clear_webhook_queue(
        &self,
        Parameters(params): Parameters<webhooks::WebhookDocParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "clear_webhook_queue",
            webhooks::clear_webhook_queue(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "create_grist_form",
        description = "Create a form table from a JSON field list, with optional validation rules and options"
    )]
    pub async fn create_grist_form(
        &self,
        Parameters(params): Parameters<forms::CreateFormParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "create_grist_form",
            forms::create_grist_form(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "create_grist_form_from_template",
        description = "Create a form from a template: event_registration, survey, contact or application"
    )]
    pub async fn create_grist_form_from_template(
        &self,
        Parameters(params): Parameters<forms::CreateFormFromTemplateParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "create_grist_form_from_template",
            forms::create_grist_form_from_template(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "get_grist_form_responses",
        description = "Read form submissions as records, a summary or per-field stats"
    )]
    pub async fn get_grist_form_responses(
        &self,
        Parameters(params): Parameters<forms::FormResponsesParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "get_grist_form_responses",
            forms::get_grist_form_responses(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "get_grist_form_structure",
        description = "Describe a form's fields, validation rules and options"
    )]
    pub async fn get_grist_form_structure(
        &self,
        Parameters(params): Parameters<forms::FormParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "get_grist_form_structure",
            forms::get_grist_form_structure(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "update_grist_form",
        description = "Add, update or remove form fields and upsert form options"
    )]
    pub async fn update_grist_form(
        &self,
        Parameters(params): Parameters<forms::UpdateFormParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "update_grist_form",
            forms::update_grist_form(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "generate_grist_form_url",
        description = "Build the public or private URL of a form"
    )]
    pub async fn generate_grist_form_url(
        &self,
        Parameters(params): Parameters<forms::FormUrlParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "generate_grist_form_url",
            forms::generate_grist_form_url(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "get_form_help",
        description = "Explain the JSON formats accepted by the form tools (fields, options, validation, templates, all)"
    )]
    pub async fn get_form_help(
        &self,
        Parameters(params): Parameters<forms::FormHelpParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "get_form_help",
            forms::get_form_help(self.state.clone(), params),
        )
        .await
    }

    #[tool(
        name = "debug_grist_form_input",
        description = "Show how a JSON blob passed to the form tools is parsed"
    )]
    pub async fn debug_grist_form_input(
        &self,
        Parameters(params): Parameters<forms::DebugFormInputParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool(
            "debug_grist_form_input",
            forms::debug_grist_form_input(self.state.clone(), params),
        )
        .await
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for GristServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(INSTRUCTIONS.to_string()),
            ..ServerInfo::default()
        }
    }
}

/// Objects go out as structured content, bare lists as JSON text.
fn into_call_result(value: Value) -> Result<CallToolResult, McpError> {
    match value {
        Value::Array(_) => Ok(CallToolResult::success(vec![Content::json(value)?])),
        other => Ok(CallToolResult::structured(other)),
    }
}

fn is_policy_error(error: &anyhow::Error) -> bool {
    error.is::<ToolDisabledError>() || error.is::<ResponseTooLargeError>()
}

fn to_mcp_error_for_tool(tool: &str, error: anyhow::Error) -> McpError {
    if is_policy_error(&error) {
        return McpError::invalid_request(error.to_string(), None);
    }
    McpError::internal_error(format!("tool '{tool}' failed: {error:#}"), None)
}

fn failure_envelope(error: &anyhow::Error) -> Value {
    let mut envelope = Map::new();
    envelope.insert("success".into(), Value::Bool(false));
    envelope.insert("message".into(), Value::String(format!("{error:#}")));
    if let Some(invalid) = error.downcast_ref::<InvalidParamsError>() {
        if let Some(path) = invalid.path() {
            envelope.insert("path".into(), Value::String(path.to_string()));
        }
        if !invalid.valid_values().is_empty() {
            envelope.insert(
                "valid_values".into(),
                Value::from(invalid.valid_values().to_vec()),
            );
        }
    } else if let Some(format) = error.downcast_ref::<InvalidFormatError>() {
        envelope.insert("path".into(), Value::String(format.field().to_string()));
    }
    Value::Object(envelope)
}

#[derive(Debug, Error)]
#[error("tool '{tool_name}' is disabled by server configuration")]
struct ToolDisabledError {
    tool_name: String,
}

impl ToolDisabledError {
    fn new(tool_name: &str) -> Self {
        Self {
            tool_name: tool_name.to_ascii_lowercase(),
        }
    }
}

#[derive(Debug, Error)]
#[error(
    "tool '{tool_name}' response too large ({size} bytes > {limit} bytes); reduce request size or page results"
)]
struct ResponseTooLargeError {
    tool_name: String,
    size: usize,
    limit: usize,
}

impl ResponseTooLargeError {
    fn new(tool_name: &str, size: usize, limit: usize) -> Self {
        Self {
            tool_name: tool_name.to_ascii_lowercase(),
            size,
            limit,
        }
    }
}
