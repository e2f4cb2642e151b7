use super::{FormError, VALIDATION_PREFIX};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};

/// Kinds of validation a form field can carry. Each one becomes a Bool formula
/// column that is true when the answer is invalid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, VariantNames,
)]
#[strum(serialize_all = "snake_case")]
pub enum ValidationKind {
    EmailFormat,
    UniqueValue,
    Required,
    MinLength,
    MaxLength,
    MinValue,
    MaxValue,
    PatternMatch,
    DateAfter,
    DateBefore,
    InList,
}

impl ValidationKind {
    fn template(self) -> &'static str {
        match self {
            ValidationKind::EmailFormat => {
                r"not re.match(r'^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+.[a-zA-Z0-9-.]+$', ${column_id})"
            }
            ValidationKind::UniqueValue => {
                "len({table_id}.lookupRecords({column_id}=${column_id})) > 1"
            }
            ValidationKind::Required => "${column_id} is None or ${column_id} == ''",
            ValidationKind::MinLength => "len(str(${column_id} or '')) < {min_length}",
            ValidationKind::MaxLength => "len(str(${column_id} or '')) > {max_length}",
            ValidationKind::MinValue => "${column_id} < {min_value}",
            ValidationKind::MaxValue => "${column_id} > {max_value}",
            ValidationKind::PatternMatch => "not re.match(r'{pattern}', str(${column_id} or ''))",
            ValidationKind::DateAfter => "${column_id} < {date}",
            ValidationKind::DateBefore => "${column_id} > {date}",
            ValidationKind::InList => "${column_id} not in [{values}]",
        }
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Python formula flagging invalid values of `column_id`.
    pub fn formula(self, table_id: &str, column_id: &str, params: &Map<String, Value>) -> String {
        let mut formula = self
            .template()
            .replace("{table_id}", table_id)
            .replace("{column_id}", column_id);
        for (key, value) in params {
            let rendered = if key == "values" {
                match value {
                    Value::Array(items) => items
                        .iter()
                        .map(python_literal)
                        .collect::<Vec<_>>()
                        .join(", "),
                    other => python_literal(other),
                }
            } else {
                python_literal(value)
            };
            formula = formula.replace(&format!("{{{key}}}"), &rendered);
        }
        formula
    }
}

fn python_literal(value: &Value) -> String {
    match value {
        Value::String(text) => format!("\"{text}\""),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationRule {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ValidationRule {
    pub fn new(kind: ValidationKind, error_message: Option<&str>) -> Self {
        Self {
            kind: kind.to_string(),
            params: None,
            error_message: error_message.map(str::to_string),
        }
    }

    pub fn validation_kind(&self) -> Result<ValidationKind, FormError> {
        self.kind
            .parse()
            .map_err(|_| FormError::UnknownRule(self.kind.clone()))
    }

    /// Column payload for this rule on `column_id` of `table_id`.
    pub fn to_column(&self, table_id: &str, column_id: &str) -> Result<Value, FormError> {
        let kind = self.validation_kind()?;
        let params = self.params.clone().unwrap_or_default();
        let widget_options = json!({
            "widget": "CheckBox",
            "rulesOptions": [{"fillColor": "#FFDDDD"}],
        });
        Ok(json!({
            "id": validation_column_id(column_id, kind),
            "fields": {
                "label": self
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("Validation {kind}")),
                "type": "Bool",
                "isFormula": true,
                "formula": kind.formula(table_id, column_id, &params),
                "widgetOptions": widget_options.to_string(),
            }
        }))
    }
}

pub fn validation_column_id(column_id: &str, kind: ValidationKind) -> String {
    format!("{VALIDATION_PREFIX}{column_id}_{kind}")
}

/// Splits `Valid_{field}_{kind}` back into its parts. Known kinds are matched as
/// suffixes so field names containing underscores survive.
pub fn parse_validation_column_id(column_id: &str) -> Option<(String, String)> {
    let rest = column_id.strip_prefix(VALIDATION_PREFIX)?;
    for kind in ValidationKind::VARIANTS {
        if let Some(field) = rest.strip_suffix(kind).and_then(|f| f.strip_suffix('_')) {
            if !field.is_empty() {
                return Some((field.to_string(), (*kind).to_string()));
            }
        }
    }
    let (field, kind) = rest.split_once('_')?;
    Some((field.to_string(), kind.to_string()))
}

/// Rules keyed by field name. Every rule list must decode; rule types are
/// checked later, when the column is built.
pub fn parse_rule_sets(
    raw: Map<String, Value>,
) -> Result<IndexMap<String, Vec<ValidationRule>>, FormError> {
    raw.into_iter()
        .map(|(field, rules)| {
            let rules = match rules {
                Value::Array(_) => rules,
                single @ Value::Object(_) => Value::Array(vec![single]),
                other => other,
            };
            serde_json::from_value::<Vec<ValidationRule>>(rules)
                .map(|rules| (field.clone(), rules))
                .map_err(|source| FormError::MalformedRules { field, source })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn parameters_are_substituted() {
        assert_eq!(
            ValidationKind::MinLength.formula("Contact", "Nom", &params(json!({"min_length": 3}))),
            "len(str($Nom or '')) < 3"
        );
        assert_eq!(
            ValidationKind::InList.formula(
                "Contact",
                "Mode",
                &params(json!({"values": ["A", "B", 3]}))
            ),
            "$Mode not in [\"A\", \"B\", 3]"
        );
        assert_eq!(
            ValidationKind::DateAfter.formula("T", "Debut", &params(json!({"date": "2024-01-01"}))),
            "$Debut < \"2024-01-01\""
        );
        assert_eq!(
            ValidationKind::UniqueValue.formula("Inscription", "Email", &Map::new()),
            "len(Inscription.lookupRecords(Email=$Email)) > 1"
        );
    }

    #[test]
    fn rule_becomes_bool_formula_column() {
        let rule = ValidationRule {
            kind: "min_value".into(),
            params: Some(params(json!({"min_value": 18}))),
            error_message: None,
        };
        let column = rule.to_column("Inscription", "Age").unwrap();
        assert_eq!(column["id"], "Valid_Age_min_value");
        assert_eq!(column["fields"]["label"], "Validation min_value");
        assert_eq!(column["fields"]["formula"], "$Age < 18");
        assert_eq!(column["fields"]["type"], "Bool");
        let widget: Value =
            serde_json::from_str(column["fields"]["widgetOptions"].as_str().unwrap()).unwrap();
        assert_eq!(widget["rulesOptions"][0]["fillColor"], "#FFDDDD");
    }

    #[test]
    fn unknown_rule_is_rejected() {
        let rule = ValidationRule {
            kind: "is_prime".into(),
            params: None,
            error_message: None,
        };
        assert_matches!(rule.to_column("T", "N"), Err(FormError::UnknownRule(kind)) if kind == "is_prime");
    }

    #[test]
    fn column_ids_round_trip_with_underscored_fields() {
        assert_eq!(
            parse_validation_column_id("Valid_Date_naissance_date_before"),
            Some(("Date_naissance".to_string(), "date_before".to_string()))
        );
        assert_eq!(
            parse_validation_column_id("Valid_Email_email_format"),
            Some(("Email".to_string(), "email_format".to_string()))
        );
        assert_eq!(parse_validation_column_id("Email"), None);
    }

    #[test]
    fn rule_sets_accept_single_objects() {
        let sets = parse_rule_sets(params(json!({
            "Email": {"type": "email_format"},
            "Age": [{"type": "min_value", "params": {"min_value": 18}}]
        })))
        .unwrap();
        assert_eq!(sets["Email"].len(), 1);
        assert_eq!(sets["Age"][0].kind, "min_value");

        let err = parse_rule_sets(params(json!({"Age": "min_value"}))).unwrap_err();
        assert_matches!(err, FormError::MalformedRules { field, .. } if field == "Age");
    }
}
