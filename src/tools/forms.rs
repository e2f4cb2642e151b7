use super::param_enums::{ResponseFormat, parse_choice};
use crate::errors::InvalidParamsError;
use crate::forms::help::{HelpSection, JSON_FORMAT_HELP, help_for};
use crate::forms::rules::parse_validation_column_id;
use crate::forms::{
    self, FormError, FormField, FormOptions, FormTemplate, ResponseStats, ValidationRule,
    email_rules, parse_rule_sets, sanitize_identifier, validate_form_fields,
};
use crate::model::{Record, json_type_name};
use crate::normalize::{expect_array, normalize};
use crate::state::AppState;
use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use strum::VariantNames;

type RuleSets = IndexMap<String, Vec<ValidationRule>>;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateFormParams {
    pub doc_id: String,
    /// Becomes the table id once non-word characters are replaced by `_`
    pub form_name: String,
    /// Array of `{name, label, type?, widget?, required?, options?, description?}`;
    /// a JSON string is accepted too
    pub fields_json: Value,
    #[serde(default)]
    pub form_options_json: Option<Value>,
    /// Map of field name to `[{type, params?, error_message?}]`
    #[serde(default)]
    pub validation_rules_json: Option<Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateFormFromTemplateParams {
    pub doc_id: String,
    pub form_name: String,
    /// event_registration, survey, contact or application
    pub template_type: String,
    #[serde(default)]
    pub custom_fields_json: Option<Value>,
    #[serde(default)]
    pub form_options_json: Option<Value>,
}

fn default_format_type() -> String {
    ResponseFormat::default().to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FormResponsesParams {
    pub doc_id: String,
    pub form_id: String,
    /// records, summary or stats
    #[serde(default = "default_format_type")]
    pub format_type: String,
    #[serde(default)]
    pub include_validation: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FormParams {
    pub doc_id: String,
    pub form_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateFormParams {
    pub doc_id: String,
    pub form_id: String,
    #[serde(default)]
    pub fields_to_add_json: Option<Value>,
    /// Map of field name to `{label?, type?, widget?, required?, options?, description?}`
    #[serde(default)]
    pub fields_to_update_json: Option<Value>,
    /// Array of field names
    #[serde(default)]
    pub fields_to_remove_json: Option<Value>,
    #[serde(default)]
    pub form_options_json: Option<Value>,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FormUrlParams {
    pub doc_id: String,
    pub form_id: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_help_type() -> String {
    HelpSection::All.to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FormHelpParams {
    /// all, fields, options, validation or templates
    #[serde(default = "default_help_type")]
    pub format_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DebugFormInputParams {
    pub input_json: Value,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CreateFormResponse {
    pub success: bool,
    pub message: String,
    pub form_id: String,
    pub document_id: String,
    pub fields_count: usize,
    pub validation_count: usize,
    pub form_url: String,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, JsonSchema)]
pub struct FormResponsesResponse {
    pub success: bool,
    pub message: String,
    pub form_id: String,
    pub responses_count: Option<usize>,
    pub columns: Option<Vec<String>>,
    pub responses: Option<Vec<Record>>,
    pub summary: Option<Vec<Map<String, Value>>>,
    #[serialize_always]
    #[serde(flatten)]
    pub stats: Option<ResponseStats>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct FormStructureResponse {
    pub success: bool,
    pub message: String,
    pub form_id: String,
    pub document_id: String,
    pub fields: Vec<Value>,
    pub validation_rules: IndexMap<String, Vec<Value>>,
    pub form_options: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct FormChanges {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub options_updated: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct UpdateFormResponse {
    pub success: bool,
    pub message: String,
    pub form_id: String,
    pub document_id: String,
    pub changes: FormChanges,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct FormUrlResponse {
    pub success: bool,
    pub message: String,
    pub form_url: String,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, JsonSchema)]
pub struct FormHelpResponse {
    pub success: bool,
    pub message: String,
    pub available_types: Option<Vec<&'static str>>,
    #[serde(flatten)]
    pub sections: Map<String, Value>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct DebugFormInputResponse {
    pub success: bool,
    pub message: String,
    pub parsed: Value,
    pub original_type: &'static str,
    pub guide: &'static str,
}

fn invalid_form(tool: &'static str, field: &str, error: FormError) -> anyhow::Error {
    let params = InvalidParamsError::new(tool, error.to_string()).with_path(field);
    let params = match error {
        FormError::UnknownTemplate { available, .. } => params.with_valid_values(available),
        FormError::UnknownRule(_) => {
            params.with_valid_values(forms::ValidationKind::VARIANTS.iter().copied())
        }
        _ => params,
    };
    params.into()
}

fn lenient_options(raw: Option<&Value>) -> Option<FormOptions> {
    match normalize(raw, Value::Null) {
        Value::Null => None,
        value => FormOptions::from_value(value)
            .inspect_err(|error| tracing::warn!(%error, "ignoring unparseable form options"))
            .ok(),
    }
}

fn lenient_rules(raw: Option<&Value>) -> RuleSets {
    match normalize(raw, Value::Null) {
        Value::Null => RuleSets::new(),
        Value::Object(map) => parse_rule_sets(map)
            .inspect_err(|error| tracing::warn!(%error, "ignoring unparseable validation rules"))
            .unwrap_or_default(),
        other => {
            tracing::warn!(
                found = json_type_name(&other),
                "ignoring validation rules: expected an object"
            );
            RuleSets::new()
        }
    }
}

/// Validation columns for `rules`. An unknown rule type fails here, before any request.
fn validation_columns(tool: &'static str, table_id: &str, rules: &RuleSets) -> Result<Vec<Value>> {
    let mut columns = Vec::new();
    for (field, field_rules) in rules {
        let column_id = sanitize_identifier(field);
        for rule in field_rules {
            let column = rule
                .to_column(table_id, &column_id)
                .map_err(|e| invalid_form(tool, "validation_rules_json", e))?;
            columns.push(column);
        }
    }
    Ok(columns)
}

async fn create_side_tables(state: &AppState, doc_id: &str, form_id: &str, options: &FormOptions) {
    let client = state.client();
    let config_id = forms::config_table_id(form_id);
    let config = async {
        client.create_tables(doc_id, &forms::config_table(form_id)).await?;
        let rows: Vec<Value> = options
            .config_entries()
            .into_iter()
            .map(|(option, value)| json!({ "fields": { "Option": option, "Value": value } }))
            .collect();
        client.add_records(doc_id, &config_id, &rows).await
    };
    if let Err(error) = config.await {
        tracing::warn!(%error, table = %config_id, "could not create form config table");
    }

    let Some(description) = &options.description else {
        return;
    };
    let description_id = forms::description_table_id(form_id);
    let stored = async {
        client
            .create_tables(doc_id, &forms::description_table(form_id))
            .await?;
        client
            .add_records(
                doc_id,
                &description_id,
                &[json!({ "fields": { "Description": description } })],
            )
            .await
    };
    if let Err(error) = stored.await {
        tracing::warn!(%error, table = %description_id, "could not create form description table");
    }
}

async fn create_form(
    state: &AppState,
    tool: &'static str,
    doc_id: &str,
    form_name: &str,
    fields: Vec<FormField>,
    options: Option<FormOptions>,
    rules: RuleSets,
) -> Result<CreateFormResponse> {
    let form_id = sanitize_identifier(form_name);
    let rule_columns = validation_columns(tool, &form_id, &rules)?;

    let mut columns: Vec<Value> = fields.iter().map(FormField::to_column).collect();
    columns.push(forms::timestamp_column());
    let client = state.client();
    client
        .create_tables(
            doc_id,
            &json!({ "tables": [{ "id": form_id, "columns": columns }] }),
        )
        .await
        .context("error creating form table")?;
    tracing::info!(doc_id, form_id = %form_id, fields = fields.len(), "form table created");

    if !rule_columns.is_empty() {
        client
            .create_columns(doc_id, &form_id, &json!({ "columns": rule_columns }))
            .await
            .context("error adding validation columns")?;
    }
    if let Some(options) = &options {
        create_side_tables(state, doc_id, &form_id, options).await;
    }

    Ok(CreateFormResponse {
        success: true,
        message: format!("Form '{form_name}' created successfully"),
        fields_count: fields.len(),
        validation_count: rule_columns.len(),
        form_url: format!("{}/doc/{doc_id}", state.config().public_base_url()),
        document_id: doc_id.to_string(),
        form_id,
    })
}

pub async fn create_grist_form(
    state: Arc<AppState>,
    params: CreateFormParams,
) -> Result<CreateFormResponse> {
    const TOOL: &str = "create_grist_form";
    let raw_fields = expect_array(Some(&params.fields_json), "fields_json")
        .map_err(|e| invalid_form(TOOL, "fields_json", e.into()))?;
    let fields =
        validate_form_fields(raw_fields).map_err(|e| invalid_form(TOOL, "fields_json", e))?;
    let options = lenient_options(params.form_options_json.as_ref());
    let rules = lenient_rules(params.validation_rules_json.as_ref());

    create_form(
        &state,
        TOOL,
        &params.doc_id,
        &params.form_name,
        fields,
        options,
        rules,
    )
    .await
}

pub async fn create_grist_form_from_template(
    state: Arc<AppState>,
    params: CreateFormFromTemplateParams,
) -> Result<CreateFormResponse> {
    const TOOL: &str = "create_grist_form_from_template";
    let template = FormTemplate::from_name(&params.template_type)
        .map_err(|e| invalid_form(TOOL, "template_type", e))?;

    let mut fields = template.fields();
    match normalize(params.custom_fields_json.as_ref(), Value::Null) {
        Value::Null => {}
        Value::Array(raw) => {
            let custom = validate_form_fields(raw)
                .map_err(|e| invalid_form(TOOL, "custom_fields_json", e))?;
            fields.extend(custom);
        }
        other => tracing::warn!(
            found = json_type_name(&other),
            "ignoring custom fields: expected an array"
        ),
    }
    let rules = email_rules(&fields);
    let options = lenient_options(params.form_options_json.as_ref());

    create_form(
        &state,
        TOOL,
        &params.doc_id,
        &params.form_name,
        fields,
        options,
        rules,
    )
    .await
}

pub async fn get_grist_form_responses(
    state: Arc<AppState>,
    params: FormResponsesParams,
) -> Result<FormResponsesResponse> {
    let format: ResponseFormat =
        parse_choice("get_grist_form_responses", "format_type", &params.format_type)?;
    let client = state.client();
    let mut columns = client
        .list_columns(&params.doc_id, &params.form_id)
        .await
        .context("error reading form columns")?;
    if !params.include_validation {
        columns.retain(|column| !column.is_validation_column());
    }
    let records = client
        .list_records(&params.doc_id, &params.form_id, None, None)
        .await
        .context("error reading form responses")?;

    let mut response = FormResponsesResponse {
        success: true,
        message: format!("{} responses for form {}", records.len(), params.form_id),
        form_id: params.form_id,
        responses_count: None,
        columns: None,
        responses: None,
        summary: None,
        stats: None,
    };
    match format {
        ResponseFormat::Records => {
            response.responses_count = Some(records.len());
            response.columns = Some(columns.iter().map(|column| column.id.clone()).collect());
            response.responses = Some(records);
        }
        ResponseFormat::Summary => {
            response.responses_count = Some(records.len());
            response.summary = Some(forms::summarize_responses(&columns, &records));
        }
        ResponseFormat::Stats => {
            response.stats = Some(forms::response_stats(&columns, &records));
        }
    }
    Ok(response)
}

/// Options stored in `{form}_Config` and `{form}_Description`; missing tables
/// simply contribute nothing.
async fn stored_form_options(state: &AppState, doc_id: &str, form_id: &str) -> Map<String, Value> {
    let client = state.client();
    let mut options = Map::new();

    match client
        .list_records(doc_id, &forms::config_table_id(form_id), None, None)
        .await
    {
        Ok(records) => {
            for record in records {
                let option = record.fields.get("Option").and_then(Value::as_str);
                let value = record.fields.get("Value").and_then(Value::as_str);
                if let (Some(option), Some(value)) = (option.filter(|o| !o.is_empty()), value) {
                    options.insert(option.to_string(), forms::coerce_option_value(value));
                }
            }
        }
        Err(error) => tracing::debug!(%error, form_id, "no readable form config table"),
    }

    match client
        .list_records(doc_id, &forms::description_table_id(form_id), None, None)
        .await
    {
        Ok(records) => {
            if let Some(first) = records.first() {
                let description = first.fields.get("Description").cloned().unwrap_or(json!(""));
                options.insert("description".into(), description);
            }
        }
        Err(error) => tracing::debug!(%error, form_id, "no readable form description table"),
    }
    options
}

pub async fn get_grist_form_structure(
    state: Arc<AppState>,
    params: FormParams,
) -> Result<FormStructureResponse> {
    let columns = state
        .client()
        .list_columns(&params.doc_id, &params.form_id)
        .await
        .context("error reading form columns")?;

    let mut validation_rules: IndexMap<String, Vec<Value>> = IndexMap::new();
    for column in columns.iter().filter(|column| column.is_validation_column()) {
        let Some((field, kind)) = parse_validation_column_id(&column.id) else {
            continue;
        };
        let error_message = column
            .fields
            .get("label")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Validation {kind}"));
        validation_rules
            .entry(field)
            .or_default()
            .push(json!({ "type": kind, "error_message": error_message }));
    }
    let form_options = stored_form_options(&state, &params.doc_id, &params.form_id).await;

    Ok(FormStructureResponse {
        success: true,
        message: format!("Structure of form {} retrieved", params.form_id),
        fields: forms::fields_from_columns(&columns),
        validation_rules,
        form_options,
        form_id: params.form_id,
        document_id: params.doc_id,
    })
}

async fn upsert_form_options(
    state: &AppState,
    doc_id: &str,
    form_id: &str,
    options: &FormOptions,
) -> Result<()> {
    let client = state.client();
    let config_id = forms::config_table_id(form_id);
    let existing = match client.list_records(doc_id, &config_id, None, None).await {
        Ok(records) => records,
        Err(error) => {
            tracing::debug!(%error, table = %config_id, "config table missing, creating it");
            client
                .create_tables(doc_id, &forms::config_table(form_id))
                .await
                .context("error creating form config table")?;
            Vec::new()
        }
    };

    let (updates, additions) = forms::config_upserts(&options.config_entries(), &existing);
    if !updates.is_empty() {
        client
            .update_records(doc_id, &config_id, updates)
            .await
            .context("error updating form options")?;
    }
    if !additions.is_empty() {
        client
            .add_records(doc_id, &config_id, &additions)
            .await
            .context("error adding form options")?;
    }
    Ok(())
}

fn field_names(raw: Value) -> Vec<String> {
    let items = match raw {
        Value::Array(items) => items,
        single => vec![single],
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(name),
            other => {
                tracing::warn!(found = %other, "ignoring field name that is not a string");
                None
            }
        })
        .collect()
}

pub async fn update_grist_form(
    state: Arc<AppState>,
    params: UpdateFormParams,
) -> Result<UpdateFormResponse> {
    let client = state.client();
    let (doc_id, form_id) = (params.doc_id.as_str(), params.form_id.as_str());
    let mut changes = FormChanges::default();

    if let Value::Array(raw) = normalize(params.fields_to_add_json.as_ref(), Value::Null) {
        let mut columns = Vec::new();
        for (offset, item) in raw.into_iter().enumerate() {
            match validate_form_fields(vec![item]) {
                Ok(mut valid) => {
                    if let Some(field) = valid.pop() {
                        columns.push(field.to_column());
                        changes.added.push(field.name);
                    }
                }
                Err(error) => tracing::warn!(%error, index = offset + 1, "skipping field to add"),
            }
        }
        if !columns.is_empty() {
            client
                .create_columns(doc_id, form_id, &json!({ "columns": columns }))
                .await
                .context("error adding form fields")?;
        }
    }

    if let Value::Object(updates) = normalize(params.fields_to_update_json.as_ref(), Value::Null) {
        let columns = client
            .list_columns(doc_id, form_id)
            .await
            .context("error reading form columns")?;
        for (name, update) in updates {
            let column_id = sanitize_identifier(&name);
            let Some(column) = columns.iter().find(|column| column.id == column_id) else {
                tracing::warn!(column_id = %column_id, "column to update not found");
                continue;
            };
            let Value::Object(update) = update else {
                tracing::warn!(field = %name, "ignoring field update that is not an object");
                continue;
            };
            let fields = forms::field_update(column, &update);
            if fields.is_empty() {
                tracing::debug!(field = %name, "field update changes nothing");
                continue;
            }
            let body = json!({ "columns": [{ "id": column_id, "fields": fields }] });
            match client.modify_columns(doc_id, form_id, &body).await {
                Ok(()) => changes.updated.push(name),
                Err(error) => tracing::error!(%error, field = %name, "field update failed"),
            }
        }
    }

    match normalize(params.fields_to_remove_json.as_ref(), Value::Null) {
        Value::Null => {}
        raw => {
            for name in field_names(raw) {
                let column_id = sanitize_identifier(&name);
                match client.delete_column(doc_id, form_id, &column_id).await {
                    Ok(()) => changes.removed.push(name),
                    Err(error) => tracing::error!(%error, field = %name, "field removal failed"),
                }
            }
        }
    }

    if let Some(options) = lenient_options(params.form_options_json.as_ref()) {
        match upsert_form_options(&state, doc_id, form_id, &options).await {
            Ok(()) => changes.options_updated = true,
            Err(error) => tracing::error!(error = %format!("{error:#}"), "form options update failed"),
        }
    }

    Ok(UpdateFormResponse {
        success: true,
        message: format!(
            "Form {form_id} updated: {} added, {} updated, {} removed",
            changes.added.len(),
            changes.updated.len(),
            changes.removed.len()
        ),
        form_id: params.form_id.clone(),
        document_id: params.doc_id.clone(),
        changes,
    })
}

pub async fn generate_grist_form_url(
    state: Arc<AppState>,
    params: FormUrlParams,
) -> Result<FormUrlResponse> {
    let base_url = state.config().public_base_url();
    let form_url = if params.is_public {
        forms::public_form_url(&base_url, &params.doc_id, &params.form_id)
    } else {
        let document = state
            .client()
            .describe_doc(&params.doc_id)
            .await
            .context("error reading document")?;
        let org_id = match document.pointer("/workspace/org/id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(anyhow!(
                    "document {} does not report its organization",
                    params.doc_id
                ));
            }
        };
        forms::private_form_url(&base_url, &org_id, &params.doc_id, &params.form_id)
    };
    Ok(FormUrlResponse {
        success: true,
        message: format!("URL generated for form {}", params.form_id),
        form_url,
    })
}

pub async fn get_form_help(
    _state: Arc<AppState>,
    params: FormHelpParams,
) -> Result<FormHelpResponse> {
    let Ok(section) = params.format_type.parse::<HelpSection>() else {
        return Ok(FormHelpResponse {
            success: false,
            message: format!("Unknown help type: {}", params.format_type),
            available_types: Some(HelpSection::VARIANTS.to_vec()),
            sections: Map::new(),
        });
    };
    Ok(FormHelpResponse {
        success: true,
        message: format!("Form help: {section}"),
        available_types: None,
        sections: help_for(section),
    })
}

pub async fn debug_grist_form_input(
    _state: Arc<AppState>,
    params: DebugFormInputParams,
) -> Result<DebugFormInputResponse> {
    let parsed = normalize(Some(&params.input_json), Value::Null);
    Ok(DebugFormInputResponse {
        success: true,
        message: format!("Input parsed as {}", json_type_name(&parsed)),
        original_type: json_type_name(&params.input_json),
        parsed,
        guide: JSON_FORMAT_HELP,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_blobs_drop_garbage() {
        assert!(lenient_options(Some(&json!("not json at all"))).is_none());
        assert!(lenient_rules(Some(&json!("[1, 2]"))).is_empty());

        let options = lenient_options(Some(&json!("{\"allow_multiple\": \"false\"}"))).unwrap();
        assert!(!options.allow_multiple);
    }

    #[test]
    fn unknown_rule_types_fail_before_any_request() {
        let rules = lenient_rules(Some(&json!({"Email": [{"type": "is_shiny"}]})));
        let err = validation_columns("create_grist_form", "Contact", &rules).unwrap_err();
        let params = err.downcast_ref::<InvalidParamsError>().unwrap();
        assert_eq!(params.path(), Some("validation_rules_json"));
        assert!(params.valid_values().iter().any(|v| v == "email_format"));
    }

    #[test]
    fn field_names_accept_a_single_string() {
        assert_eq!(field_names(json!("Email")), vec!["Email"]);
        assert_eq!(field_names(json!(["A", 3, "B"])), vec!["A", "B"]);
    }
}
