//! Grist forms are ordinary tables: one column per question, formula columns
//! for validation, plus optional `{form}_Config` and `{form}_Description` side
//! tables. This module builds those column payloads and reads them back.

pub mod help;
pub mod rules;
pub mod templates;

use crate::errors::InvalidFormatError;
use crate::model::{Column, Record};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

pub use rules::{ValidationKind, ValidationRule, parse_rule_sets};
pub use templates::{FormTemplate, email_rules};

/// Prefix of the formula columns that hold validation results.
pub const VALIDATION_PREFIX: &str = "Valid_";
pub const TIMESTAMP_COLUMN: &str = "Timestamp";
pub const SUBMITTED_AT_KEY: &str = "Soumis le";

pub const FIELD_TYPES: [&str; 10] = [
    "Text",
    "Int",
    "Bool",
    "Date",
    "DateTime",
    "Choice",
    "ChoiceList",
    "Attachments",
    "Ref",
    "Numeric",
];

static NON_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("identifier pattern"));

#[derive(Debug, Error)]
pub enum FormError {
    #[error(transparent)]
    InvalidFormat(#[from] InvalidFormatError),

    #[error("field #{index} must be an object")]
    FieldNotObject { index: usize },

    #[error("field #{index} is missing required keys: {}", .keys.join(", "))]
    MissingKeys { index: usize, keys: Vec<&'static str> },

    #[error("field #{index} is malformed: {source}")]
    MalformedField {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("form options must be an object")]
    OptionsNotObject,

    #[error("malformed form options: {0}")]
    MalformedOptions(#[source] serde_json::Error),

    #[error("malformed validation rules for '{field}': {source}")]
    MalformedRules {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported validation type: {0}")]
    UnknownRule(String),

    #[error("unknown template type: {name}. Available: {}", .available.join(", "))]
    UnknownTemplate {
        name: String,
        available: Vec<&'static str>,
    },
}

fn default_field_type() -> String {
    "Text".to_string()
}

fn default_widget() -> String {
    "TextBox".to_string()
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default = "default_widget")]
    pub widget: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
    #[serde(default)]
    pub description: Option<String>,
}

impl FormField {
    pub fn new(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            field_type: default_field_type(),
            widget: default_widget(),
            required: false,
            default: None,
            options: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_type(mut self, field_type: &str) -> Self {
        self.field_type = field_type.to_string();
        self
    }

    pub fn with_widget(mut self, widget: &str) -> Self {
        self.widget = widget.to_string();
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        if let Value::Object(map) = options {
            self.options = Some(map);
        }
        self
    }

    pub fn column_id(&self) -> String {
        sanitize_identifier(&self.name)
    }

    /// `widgetOptions` as Grist stores it: a JSON-encoded string.
    pub fn widget_options(&self) -> String {
        let mut options = Map::new();
        options.insert("widget".into(), json!(self.widget));
        options.insert("alignment".into(), json!("left"));
        options.insert("formRequired".into(), json!(self.required));
        options.insert("question".into(), json!(format!("{}:", self.label)));
        if let Some(extra) = &self.options {
            for (key, value) in extra {
                options.insert(key.clone(), value.clone());
            }
        }
        Value::Object(options).to_string()
    }

    pub fn to_column(&self) -> Value {
        json!({
            "id": self.column_id(),
            "fields": {
                "label": self.label,
                "type": self.field_type,
                "widgetOptions": self.widget_options(),
                "description": self.description.clone().unwrap_or_default(),
            }
        })
    }
}

fn default_theme() -> String {
    "default".to_string()
}

fn default_allow_multiple() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormOptions {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub success_message: Option<String>,
    #[serde(default = "default_allow_multiple")]
    pub allow_multiple: bool,
    #[serde(default)]
    pub notification_email: Option<String>,
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            description: None,
            success_message: None,
            allow_multiple: default_allow_multiple(),
            notification_email: None,
            theme: default_theme(),
        }
    }
}

const TEXT_OPTIONS: [&str; 4] = ["description", "success_message", "notification_email", "theme"];

impl FormOptions {
    /// Accepts loosely typed input: string booleans and non-string text values.
    pub fn from_value(value: Value) -> Result<Self, FormError> {
        let Value::Object(mut map) = value else {
            return Err(FormError::OptionsNotObject);
        };
        if let Some(Value::String(flag)) = map.get("allow_multiple") {
            let flag = truthy(flag);
            map.insert("allow_multiple".into(), Value::Bool(flag));
        }
        for key in TEXT_OPTIONS {
            if let Some(value) = map.get_mut(key) {
                if !value.is_string() && !value.is_null() {
                    *value = Value::String(value.to_string());
                }
            }
        }
        serde_json::from_value(Value::Object(map)).map_err(FormError::MalformedOptions)
    }

    /// Rows of the `{form}_Config` table, skipping unset options.
    pub fn config_entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = Vec::new();
        if let Some(description) = &self.description {
            entries.push(("description", description.clone()));
        }
        if let Some(message) = &self.success_message {
            entries.push(("success_message", message.clone()));
        }
        entries.push(("allow_multiple", self.allow_multiple.to_string()));
        if let Some(email) = &self.notification_email {
            entries.push(("notification_email", email.clone()));
        }
        entries.push(("theme", self.theme.clone()));
        entries
    }
}

fn truthy(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "oui"
    )
}

pub fn sanitize_identifier(name: &str) -> String {
    NON_IDENTIFIER.replace_all(name, "_").into_owned()
}

/// Checks and coerces raw field objects into [`FormField`]s.
pub fn validate_form_fields(raw: Vec<Value>) -> Result<Vec<FormField>, FormError> {
    raw.into_iter()
        .enumerate()
        .map(|(offset, value)| {
            let index = offset + 1;
            let Value::Object(mut field) = value else {
                return Err(FormError::FieldNotObject { index });
            };

            let missing: Vec<&'static str> = ["name", "label"]
                .into_iter()
                .filter(|key| !field.contains_key(*key))
                .collect();
            if !missing.is_empty() {
                return Err(FormError::MissingKeys {
                    index,
                    keys: missing,
                });
            }

            if let Some(Value::String(flag)) = field.get("required") {
                let flag = truthy(flag);
                field.insert("required".into(), Value::Bool(flag));
            }

            if let Some(Value::String(name)) = field.get("name") {
                let sanitized = sanitize_identifier(name);
                if &sanitized != name {
                    tracing::warn!(field = %name, sanitized = %sanitized, "field name sanitized");
                    field.insert("name".into(), Value::String(sanitized));
                }
            }

            if let Some(field_type) = field.get("type") {
                let known = field_type
                    .as_str()
                    .is_some_and(|name| FIELD_TYPES.contains(&name));
                if !known {
                    tracing::warn!(field_type = %field_type, "unknown field type, using Text");
                    field.insert("type".into(), json!("Text"));
                }
            }

            serde_json::from_value(Value::Object(field))
                .map_err(|source| FormError::MalformedField { index, source })
        })
        .collect()
}

pub fn timestamp_column() -> Value {
    json!({
        "id": TIMESTAMP_COLUMN,
        "fields": {
            "label": "Date de soumission",
            "type": "DateTime:UTC",
            "isFormula": true,
            "formula": "NOW()",
        }
    })
}

pub fn config_table_id(form_id: &str) -> String {
    format!("{form_id}_Config")
}

pub fn description_table_id(form_id: &str) -> String {
    format!("{form_id}_Description")
}

pub fn config_table(form_id: &str) -> Value {
    json!({
        "tables": [{
            "id": config_table_id(form_id),
            "columns": [
                {"id": "Option", "fields": {"label": "Option", "type": "Text"}},
                {"id": "Value", "fields": {"label": "Valeur", "type": "Text"}},
            ]
        }]
    })
}

pub fn description_table(form_id: &str) -> Value {
    json!({
        "tables": [{
            "id": description_table_id(form_id),
            "columns": [
                {"id": "Description", "fields": {"label": "Description", "type": "Text"}},
            ]
        }]
    })
}

pub fn public_form_url(base_url: &str, doc_id: &str, form_id: &str) -> String {
    format!("{base_url}/s/{doc_id}/p/form-{form_id}")
}

pub fn private_form_url(base_url: &str, org_id: &str, doc_id: &str, form_id: &str) -> String {
    format!("{base_url}/o/{org_id}/doc/{doc_id}#form/{form_id}")
}

fn is_answer_column(column: &Column) -> bool {
    !column.is_validation_column() && column.id != TIMESTAMP_COLUMN
}

/// One map per response with the answers plus the submission time.
pub fn summarize_responses(columns: &[Column], records: &[Record]) -> Vec<Map<String, Value>> {
    records
        .iter()
        .map(|record| {
            let mut summary = Map::new();
            for column in columns.iter().filter(|c| is_answer_column(c)) {
                let value = record.fields.get(&column.id).cloned().unwrap_or(Value::Null);
                summary.insert(column.id.clone(), value);
            }
            if let Some(submitted) = record.fields.get(TIMESTAMP_COLUMN) {
                summary.insert(SUBMITTED_AT_KEY.to_string(), submitted.clone());
            }
            summary
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldStats {
    Numeric {
        avg: f64,
        min: Value,
        max: Value,
        count: usize,
    },
    Choice {
        count: usize,
        distribution: IndexMap<String, usize>,
    },
    Count {
        count: usize,
    },
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ResponseStats {
    pub total_responses: usize,
    pub fields_stats: IndexMap<String, FieldStats>,
}

pub fn response_stats(columns: &[Column], records: &[Record]) -> ResponseStats {
    let mut fields_stats = IndexMap::new();
    for column in columns.iter().filter(|c| is_answer_column(c)) {
        let values: Vec<&Value> = records
            .iter()
            .filter_map(|record| record.fields.get(&column.id))
            .filter(|value| !value.is_null())
            .collect();
        let base_type = column.column_type().split(':').next().unwrap_or_default();

        match base_type {
            "Int" | "Numeric" => {
                if let Some(stats) = numeric_stats(&values) {
                    fields_stats.insert(column.id.clone(), stats);
                }
            }
            "Choice" | "ChoiceList" => {
                let mut distribution: IndexMap<String, usize> = IndexMap::new();
                for value in &values {
                    let choices: Vec<&Value> = match value {
                        Value::Array(items) => items.iter().collect(),
                        single => vec![*single],
                    };
                    for choice in choices {
                        let key = choice
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| choice.to_string());
                        *distribution.entry(key).or_default() += 1;
                    }
                }
                fields_stats.insert(
                    column.id.clone(),
                    FieldStats::Choice {
                        count: values.len(),
                        distribution,
                    },
                );
            }
            _ => {
                fields_stats.insert(column.id.clone(), FieldStats::Count { count: values.len() });
            }
        }
    }
    ResponseStats {
        total_responses: records.len(),
        fields_stats,
    }
}

fn numeric_stats(values: &[&Value]) -> Option<FieldStats> {
    let numbers: Vec<(f64, &Value)> = values
        .iter()
        .filter_map(|value| value.as_f64().map(|n| (n, *value)))
        .collect();
    let (first, rest) = numbers.split_first()?;
    let mut min = first;
    let mut max = first;
    for entry in rest {
        if entry.0 < min.0 {
            min = entry;
        }
        if entry.0 > max.0 {
            max = entry;
        }
    }
    let sum: f64 = numbers.iter().map(|(n, _)| n).sum();
    Some(FieldStats::Numeric {
        avg: sum / numbers.len() as f64,
        min: min.1.clone(),
        max: max.1.clone(),
        count: numbers.len(),
    })
}

/// Reads a column's `widgetOptions` back into a map; garbage yields an empty map.
pub fn parse_widget_options(column: &Column) -> Map<String, Value> {
    match column.fields.get("widgetOptions") {
        Some(Value::String(text)) => serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default(),
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

/// Question fields of a form, reconstructed from its columns.
pub fn fields_from_columns(columns: &[Column]) -> Vec<Value> {
    columns
        .iter()
        .filter(|c| is_answer_column(c))
        .map(|column| {
            let widget_options = parse_widget_options(column);
            let mut field = Map::new();
            field.insert("name".into(), json!(column.id));
            field.insert("label".into(), json!(column.label()));
            field.insert("type".into(), json!(column.column_type()));
            field.insert(
                "widget".into(),
                widget_options.get("widget").cloned().unwrap_or(json!("TextBox")),
            );
            field.insert(
                "required".into(),
                widget_options.get("formRequired").cloned().unwrap_or(json!(false)),
            );
            field.insert(
                "description".into(),
                column.fields.get("description").cloned().unwrap_or(json!("")),
            );
            if let Some(choices) = widget_options.get("choices").filter(|c| !is_empty_value(c)) {
                field.insert("options".into(), json!({"choices": choices}));
            }
            Value::Object(field)
        })
        .collect()
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// Option values read back from the config table; `"true"`/`"false"` become booleans.
pub fn coerce_option_value(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("true") {
        Value::Bool(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Value::Bool(false)
    } else {
        Value::String(raw.to_string())
    }
}

const WIDGET_KEYS: [&str; 3] = ["widget", "required", "options"];
const COLUMN_KEYS: [&str; 3] = ["label", "type", "description"];

/// Column fields to PATCH for an edited question. `widget`, `required` and
/// `options` are merged into the stored widgetOptions; `label`, `type` and
/// `description` are copied as-is. Only changed keys are returned.
pub fn field_update(column: &Column, updates: &Map<String, Value>) -> Map<String, Value> {
    let mut changed = Map::new();
    if WIDGET_KEYS.iter().any(|key| updates.contains_key(*key)) {
        let current = parse_widget_options(column);
        let mut widget_options = current.clone();
        if let Some(widget) = updates.get("widget") {
            widget_options.insert("widget".into(), widget.clone());
        }
        if let Some(required) = updates.get("required") {
            let required = match required {
                Value::String(flag) => Value::Bool(truthy(flag)),
                other => other.clone(),
            };
            widget_options.insert("formRequired".into(), required);
        }
        if let Some(Value::Object(options)) = updates.get("options") {
            for (key, value) in options {
                widget_options.insert(key.clone(), value.clone());
            }
        }
        if widget_options != current {
            changed.insert(
                "widgetOptions".into(),
                Value::String(Value::Object(widget_options).to_string()),
            );
        }
    }
    for key in COLUMN_KEYS {
        if let Some(value) = updates.get(key).filter(|value| column.fields.get(key) != Some(*value)) {
            changed.insert(key.into(), value.clone());
        }
    }
    changed
}

/// Splits option rows into PATCHes of existing `_Config` records and new rows.
pub fn config_upserts(
    entries: &[(&'static str, String)],
    existing: &[Record],
) -> (Vec<Value>, Vec<Value>) {
    let mut updates = Vec::new();
    let mut additions = Vec::new();
    for (option, value) in entries {
        let current = existing
            .iter()
            .find(|record| record.fields.get("Option").and_then(Value::as_str) == Some(*option));
        match current {
            Some(record) => updates.push(json!({ "id": record.id, "fields": { "Value": value } })),
            None => additions.push(json!({ "fields": { "Option": option, "Value": value } })),
        }
    }
    (updates, additions)
}
