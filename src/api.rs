//! Typed Grist endpoints layered over [`GristClient`].

use crate::client::{GristClient, GristError, RequestProfile};
use crate::model::{Column, Document, OrgRef, Organization, Record, Table, Workspace};
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::fmt;
use strum::Display;
use thiserror::Error;

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, GristError> {
    serde_json::from_value(value).map_err(|source| GristError::Decode {
        path: path.to_string(),
        source,
    })
}

/// `value[key]` as an array, or empty when the key is missing.
fn take_array(value: &mut Value, key: &str) -> Value {
    match value.get_mut(key).map(Value::take) {
        Some(array @ Value::Array(_)) => array,
        _ => Value::Array(Vec::new()),
    }
}

fn ids_of(records: &[Value]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|record| record.get("id").and_then(Value::as_i64))
        .collect()
}

#[derive(Debug, Error)]
pub enum RecordShapeError {
    #[error("record #{index} must be an object")]
    NotObject { index: usize },
    #[error("each record must contain an 'id' field (record #{index})")]
    MissingId { index: usize },
}

/// Records for `POST .../records`: sent as-is when every one already has
/// `fields`, otherwise each is wrapped as `{"fields": record}`.
pub fn shape_records_for_add(records: &[Value]) -> Vec<Value> {
    if records.iter().all(|record| record.get("fields").is_some()) {
        return records.to_vec();
    }
    records
        .iter()
        .map(|record| json!({ "fields": record }))
        .collect()
}

/// Records for `PATCH .../records`. `{"id": 1, "a": 2}` becomes
/// `{"id": 1, "fields": {"a": 2}}`; input is left untouched.
pub fn shape_records_for_update(records: &[Value]) -> Result<Vec<Value>, RecordShapeError> {
    let already_shaped = records
        .iter()
        .all(|record| record.get("id").is_some() && record.get("fields").is_some());
    if already_shaped {
        return Ok(records.to_vec());
    }

    records
        .iter()
        .enumerate()
        .map(|(offset, record)| {
            let index = offset + 1;
            let object = record
                .as_object()
                .ok_or(RecordShapeError::NotObject { index })?;
            let id = object
                .get("id")
                .cloned()
                .ok_or(RecordShapeError::MissingId { index })?;
            let fields: Map<String, Value> = object
                .iter()
                .filter(|(key, _)| key.as_str() != "id")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            Ok(json!({ "id": id, "fields": fields }))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema, Display)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStrategy {
    #[strum(to_string = "data/delete")]
    BulkDelete,
    #[strum(to_string = "records DELETE")]
    RecordsDelete,
    #[strum(to_string = "soft clear")]
    SoftClear,
}

impl DeletionStrategy {
    pub fn is_degraded(self) -> bool {
        matches!(self, DeletionStrategy::SoftClear)
    }
}

#[derive(Debug)]
pub struct DeletionFailure {
    pub attempts: Vec<(DeletionStrategy, GristError)>,
}

impl fmt::Display for DeletionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("all deletion strategies failed: ")?;
        for (position, (strategy, error)) in self.attempts.iter().enumerate() {
            if position > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{strategy}: {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DeletionFailure {}

/// Whose access list an access call targets.
#[derive(Debug, Clone)]
pub enum AccessTarget {
    Org(OrgRef),
    Workspace(i64),
    Doc(String),
}

impl AccessTarget {
    fn path(&self) -> String {
        match self {
            AccessTarget::Org(org) => format!("/orgs/{org}/access"),
            AccessTarget::Workspace(id) => format!("/workspaces/{id}/access"),
            AccessTarget::Doc(doc) => format!("/docs/{doc}/access"),
        }
    }
}

fn flag_query(flags: &[(&'static str, bool)]) -> Vec<(&'static str, String)> {
    flags
        .iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| (*name, "true".to_string()))
        .collect()
}

impl GristClient {
    pub async fn list_orgs(&self) -> Result<Vec<Organization>, GristError> {
        tracing::debug!("listing organizations");
        let data = self.get("/orgs", &[]).await?;
        if !data.is_array() {
            tracing::warn!(response = %data, "unexpected organizations response");
            return Ok(Vec::new());
        }
        decode("/orgs", data)
    }

    pub async fn describe_org(&self, org: &OrgRef) -> Result<Value, GristError> {
        self.get(&format!("/orgs/{org}"), &[]).await
    }

    pub async fn modify_org(&self, org: &OrgRef, body: &Value) -> Result<(), GristError> {
        self.patch(&format!("/orgs/{org}"), body).await.map(drop)
    }

    pub async fn delete_org(&self, org: &OrgRef) -> Result<(), GristError> {
        self.delete(&format!("/orgs/{org}")).await.map(drop)
    }

    pub async fn list_workspaces(&self, org: &OrgRef) -> Result<Vec<Workspace>, GristError> {
        let path = format!("/orgs/{org}/workspaces");
        let data = self.get(&path, &[]).await?;
        if !data.is_array() {
            tracing::warn!(response = %data, "unexpected workspaces response");
            return Ok(Vec::new());
        }
        decode(&path, data)
    }

    pub async fn describe_workspace(&self, workspace_id: i64) -> Result<Value, GristError> {
        self.get(&format!("/workspaces/{workspace_id}"), &[]).await
    }

    /// Returns the new workspace id as Grist reports it.
    pub async fn create_workspace(&self, org: &OrgRef, name: &str) -> Result<Value, GristError> {
        self.post(&format!("/orgs/{org}/workspaces"), &json!({ "name": name }))
            .await
    }

    pub async fn modify_workspace(&self, workspace_id: i64, body: &Value) -> Result<(), GristError> {
        self.patch(&format!("/workspaces/{workspace_id}"), body)
            .await
            .map(drop)
    }

    pub async fn delete_workspace(&self, workspace_id: i64) -> Result<(), GristError> {
        self.delete(&format!("/workspaces/{workspace_id}"))
            .await
            .map(drop)
    }

    pub async fn list_documents(&self, workspace_id: i64) -> Result<Vec<Document>, GristError> {
        let path = format!("/workspaces/{workspace_id}");
        let mut data = self.get(&path, &[]).await?;
        if data.get("docs").is_none() {
            tracing::warn!(workspace_id, "workspace response has no 'docs' key");
            return Ok(Vec::new());
        }
        decode(&path, take_array(&mut data, "docs"))
    }

    pub async fn describe_doc(&self, doc_id: &str) -> Result<Value, GristError> {
        self.get(&format!("/docs/{doc_id}"), &[]).await
    }

    /// Returns the new document id as Grist reports it.
    pub async fn create_doc(
        &self,
        workspace_id: i64,
        name: &str,
        is_pinned: bool,
    ) -> Result<Value, GristError> {
        self.post(
            &format!("/workspaces/{workspace_id}/docs"),
            &json!({ "name": name, "isPinned": is_pinned }),
        )
        .await
    }

    pub async fn modify_doc(&self, doc_id: &str, body: &Value) -> Result<(), GristError> {
        self.patch(&format!("/docs/{doc_id}"), body).await.map(drop)
    }

    pub async fn delete_doc(&self, doc_id: &str) -> Result<(), GristError> {
        self.delete(&format!("/docs/{doc_id}")).await.map(drop)
    }

    pub async fn move_doc(&self, doc_id: &str, workspace_id: i64) -> Result<(), GristError> {
        self.patch(
            &format!("/docs/{doc_id}/move"),
            &json!({ "workspace": workspace_id }),
        )
        .await
        .map(drop)
    }

    pub async fn force_reload_doc(&self, doc_id: &str) -> Result<(), GristError> {
        self.post_empty(&format!("/docs/{doc_id}/force-reload"))
            .await
            .map(drop)
    }

    pub async fn delete_doc_history(&self, doc_id: &str, keep: i64) -> Result<(), GristError> {
        self.post(&format!("/docs/{doc_id}/states/remove"), &json!({ "keep": keep }))
            .await
            .map(drop)
    }

    pub async fn list_tables(&self, doc_id: &str) -> Result<Vec<Table>, GristError> {
        let path = format!("/docs/{doc_id}/tables");
        let mut data = self.get(&path, &[]).await?;
        decode(&path, take_array(&mut data, "tables"))
    }

    pub async fn create_tables(&self, doc_id: &str, tables: &Value) -> Result<Vec<Value>, GristError> {
        let path = format!("/docs/{doc_id}/tables");
        let mut data = self.post(&path, tables).await?;
        decode(&path, take_array(&mut data, "tables"))
    }

    pub async fn modify_tables(&self, doc_id: &str, tables: &Value) -> Result<(), GristError> {
        self.patch(&format!("/docs/{doc_id}/tables"), tables)
            .await
            .map(drop)
    }

    pub async fn list_columns(&self, doc_id: &str, table_id: &str) -> Result<Vec<Column>, GristError> {
        let path = format!("/docs/{doc_id}/tables/{table_id}/columns");
        let mut data = self.get(&path, &[]).await?;
        decode(&path, take_array(&mut data, "columns"))
    }

    pub async fn create_columns(
        &self,
        doc_id: &str,
        table_id: &str,
        columns: &Value,
    ) -> Result<Vec<Value>, GristError> {
        let path = format!("/docs/{doc_id}/tables/{table_id}/columns");
        let mut data = self.post(&path, columns).await?;
        decode(&path, take_array(&mut data, "columns"))
    }

    pub async fn modify_columns(
        &self,
        doc_id: &str,
        table_id: &str,
        columns: &Value,
    ) -> Result<(), GristError> {
        self.patch(&format!("/docs/{doc_id}/tables/{table_id}/columns"), columns)
            .await
            .map(drop)
    }

    pub async fn replace_columns(
        &self,
        doc_id: &str,
        table_id: &str,
        columns: &Value,
        noadd: bool,
        noupdate: bool,
        replaceall: bool,
    ) -> Result<(), GristError> {
        let query = flag_query(&[
            ("noadd", noadd),
            ("noupdate", noupdate),
            ("replaceall", replaceall),
        ]);
        self.put(
            &format!("/docs/{doc_id}/tables/{table_id}/columns"),
            &query,
            columns,
        )
        .await
        .map(drop)
    }

    pub async fn delete_column(
        &self,
        doc_id: &str,
        table_id: &str,
        column_id: &str,
    ) -> Result<(), GristError> {
        self.delete(&format!("/docs/{doc_id}/tables/{table_id}/columns/{column_id}"))
            .await
            .map(drop)
    }

    pub async fn list_records(
        &self,
        doc_id: &str,
        table_id: &str,
        sort: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<Record>, GristError> {
        let mut query = Vec::new();
        if let Some(sort) = sort.filter(|s| !s.is_empty()) {
            query.push(("sort", sort.to_string()));
        }
        if let Some(limit) = limit.filter(|l| *l > 0) {
            query.push(("limit", limit.to_string()));
        }
        tracing::debug!(doc_id, table_id, ?query, "listing records");
        let path = format!("/docs/{doc_id}/tables/{table_id}/records");
        let mut data = self.get(&path, &query).await?;
        decode(&path, take_array(&mut data, "records"))
    }

    pub async fn add_records(
        &self,
        doc_id: &str,
        table_id: &str,
        records: &[Value],
    ) -> Result<Vec<i64>, GristError> {
        let body = json!({ "records": shape_records_for_add(records) });
        let mut data = self
            .post(&format!("/docs/{doc_id}/tables/{table_id}/records"), &body)
            .await?;
        let created = take_array(&mut data, "records");
        Ok(created.as_array().map(|r| ids_of(r)).unwrap_or_default())
    }

    /// `records` must already be in `{id, fields}` shape.
    pub async fn update_records(
        &self,
        doc_id: &str,
        table_id: &str,
        records: Vec<Value>,
    ) -> Result<Vec<i64>, GristError> {
        let sent_ids = ids_of(&records);
        let data = self
            .patch(
                &format!("/docs/{doc_id}/tables/{table_id}/records"),
                &json!({ "records": records }),
            )
            .await?;
        match data.get("records").and_then(Value::as_array) {
            Some(updated) => Ok(ids_of(updated)),
            None if data.is_null() => {
                tracing::debug!("empty update response, reporting the ids sent");
                Ok(sent_ids)
            }
            None => {
                tracing::warn!(response = %data, "unexpected update response, reporting the ids sent");
                Ok(sent_ids)
            }
        }
    }

    /// Tries a bulk delete, then a records DELETE, then (when allowed) a soft
    /// clear that blanks the rows instead of removing them.
    pub async fn delete_records_with_fallback(
        &self,
        doc_id: &str,
        table_id: &str,
        record_ids: &[i64],
        allow_soft_clear: bool,
    ) -> Result<DeletionStrategy, DeletionFailure> {
        let table_path = format!("/docs/{doc_id}/tables/{table_id}");
        let mut attempts = Vec::new();

        match self
            .post(&format!("{table_path}/data/delete"), record_ids)
            .await
        {
            Ok(_) => return Ok(DeletionStrategy::BulkDelete),
            Err(error) => {
                tracing::warn!(%error, "bulk delete failed, trying records DELETE");
                attempts.push((DeletionStrategy::BulkDelete, error));
            }
        }

        let by_id: Vec<Value> = record_ids.iter().map(|id| json!({ "id": id })).collect();
        match self
            .delete_with_body(&format!("{table_path}/records"), &json!({ "records": by_id }))
            .await
        {
            Ok(_) => return Ok(DeletionStrategy::RecordsDelete),
            Err(error) => {
                tracing::warn!(%error, "records DELETE failed");
                attempts.push((DeletionStrategy::RecordsDelete, error));
            }
        }

        if !allow_soft_clear {
            return Err(DeletionFailure { attempts });
        }

        let blanked: Vec<Value> = record_ids
            .iter()
            .map(|id| json!({ "id": id, "fields": {} }))
            .collect();
        match self
            .patch(&format!("{table_path}/records"), &json!({ "records": blanked }))
            .await
        {
            Ok(_) => {
                tracing::warn!(
                    doc_id,
                    table_id,
                    count = record_ids.len(),
                    "records were soft-cleared, not deleted"
                );
                Ok(DeletionStrategy::SoftClear)
            }
            Err(error) => {
                attempts.push((DeletionStrategy::SoftClear, error));
                Err(DeletionFailure { attempts })
            }
        }
    }

    pub async fn sql(&self, doc_id: &str, body: &Value) -> Result<Vec<Value>, GristError> {
        let path = format!("/docs/{doc_id}/sql");
        let mut data = self.post(&path, body).await?;
        decode(&path, take_array(&mut data, "records"))
    }

    pub async fn list_access(&self, target: &AccessTarget) -> Result<Value, GristError> {
        self.get(&target.path(), &[]).await
    }

    /// `level` of `None` removes the user.
    pub async fn modify_access(
        &self,
        target: &AccessTarget,
        email: &str,
        level: Option<&str>,
    ) -> Result<(), GristError> {
        let body = json!({ "delta": { "users": { email: level } } });
        self.patch(&target.path(), &body).await.map(drop)
    }

    pub async fn download_doc(
        &self,
        doc_id: &str,
        nohistory: bool,
        template: bool,
    ) -> Result<Vec<u8>, GristError> {
        let query = flag_query(&[("nohistory", nohistory), ("template", template)]);
        self.get_bytes(
            &format!("/docs/{doc_id}/download"),
            &query,
            RequestProfile::Download,
        )
        .await
    }

    pub async fn download_doc_xlsx(&self, doc_id: &str, header: &str) -> Result<Vec<u8>, GristError> {
        self.get_bytes(
            &format!("/docs/{doc_id}/download/xlsx"),
            &[("header", header.to_string())],
            RequestProfile::Bulk,
        )
        .await
    }

    pub async fn download_table_csv(
        &self,
        doc_id: &str,
        table_id: &str,
        header: &str,
    ) -> Result<String, GristError> {
        self.get_text(
            &format!("/docs/{doc_id}/download/csv"),
            &[("tableId", table_id.to_string()), ("header", header.to_string())],
            RequestProfile::Download,
        )
        .await
    }

    pub async fn download_table_schema(
        &self,
        doc_id: &str,
        table_id: &str,
        header: &str,
    ) -> Result<Value, GristError> {
        self.get(
            &format!("/docs/{doc_id}/download/table-schema"),
            &[("tableId", table_id.to_string()), ("header", header.to_string())],
        )
        .await
    }

    pub async fn list_attachments(
        &self,
        doc_id: &str,
        sort: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<Value>, GristError> {
        let mut query = Vec::new();
        if let Some(sort) = sort.filter(|s| !s.is_empty()) {
            query.push(("sort", sort.to_string()));
        }
        if let Some(limit) = limit.filter(|l| *l > 0) {
            query.push(("limit", limit.to_string()));
        }
        let path = format!("/docs/{doc_id}/attachments");
        let mut data = self.get(&path, &query).await?;
        decode(&path, take_array(&mut data, "records"))
    }

    pub async fn attachment_metadata(&self, doc_id: &str, attachment_id: i64) -> Result<Value, GristError> {
        self.get(&format!("/docs/{doc_id}/attachments/{attachment_id}"), &[])
            .await
    }

    pub async fn download_attachment(&self, doc_id: &str, attachment_id: i64) -> Result<Vec<u8>, GristError> {
        self.get_bytes(
            &format!("/docs/{doc_id}/attachments/{attachment_id}/download"),
            &[],
            RequestProfile::Download,
        )
        .await
    }

    pub async fn upload_attachment(
        &self,
        doc_id: &str,
        filename: &str,
        content: Vec<u8>,
        content_type: &str,
    ) -> Result<Vec<i64>, GristError> {
        let part = reqwest::multipart::Part::bytes(content)
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = reqwest::multipart::Form::new().part("upload", part);
        let path = format!("/docs/{doc_id}/attachments");
        let data = self.post_multipart(&path, form).await?;
        decode(&path, data)
    }

    pub async fn list_webhooks(&self, doc_id: &str) -> Result<Vec<Value>, GristError> {
        let path = format!("/docs/{doc_id}/webhooks");
        let mut data = self.get(&path, &[]).await?;
        decode(&path, take_array(&mut data, "webhooks"))
    }

    pub async fn create_webhooks(&self, doc_id: &str, webhooks: &[Value]) -> Result<Vec<Value>, GristError> {
        let body = json!({
            "webhooks": webhooks.iter().map(|fields| json!({ "fields": fields })).collect::<Vec<_>>()
        });
        let path = format!("/docs/{doc_id}/webhooks");
        let mut data = self.post(&path, &body).await?;
        decode(&path, take_array(&mut data, "webhooks"))
    }

    pub async fn modify_webhook(&self, doc_id: &str, webhook_id: &str, body: &Value) -> Result<(), GristError> {
        self.patch(&format!("/docs/{doc_id}/webhooks/{webhook_id}"), body)
            .await
            .map(drop)
    }

    pub async fn delete_webhook(&self, doc_id: &str, webhook_id: &str) -> Result<Value, GristError> {
        self.delete(&format!("/docs/{doc_id}/webhooks/{webhook_id}"))
            .await
    }

    pub async fn clear_webhook_queue(&self, doc_id: &str) -> Result<(), GristError> {
        self.delete(&format!("/docs/{doc_id}/webhooks/queue"))
            .await
            .map(drop)
    }
}
