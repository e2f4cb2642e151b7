use super::{FormTemplate, ValidationKind};
use serde_json::{Map, Value, json};
use strum::{Display, EnumString, VariantNames};

pub const JSON_FORMAT_HELP: &str = r#"ACCEPTED JSON FORMATS
---------------------
JSON parameters may be given in two forms:

1. A structured value (array or object)
   fields_json = [{"name": "Nom", "label": "Your name", "required": true}]

2. A standard JSON string
   fields_json = "[{\"name\":\"Nom\",\"label\":\"Your name\",\"required\":true}]"

Avoid doubly escaped strings such as "\"{\\\"name\\\":\\\"Nom\\\"}\"".

FIELD STRUCTURE
---------------
Every field needs at least:
- name: field identifier (letters, digits and underscore)
- label: text shown on the form

Optional keys:
- type: data type (Text, Int, Bool, Date, ...)
- widget: widget kind (TextBox, Dropdown, ...)
- required: whether an answer is mandatory (true/false)
- options: widget specific options
- description: help text for the field
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, VariantNames)]
#[strum(serialize_all = "snake_case")]
pub enum HelpSection {
    All,
    Fields,
    Options,
    Validation,
    Templates,
}

fn section(kind: HelpSection) -> Value {
    match kind {
        HelpSection::Fields => json!({
            "description": "Structure of form fields",
            "required_props": ["name", "label"],
            "optional_props": ["type", "widget", "required", "options", "description"],
            "example": [
                {"name": "Nom", "label": "Your name", "required": true},
                {"name": "Email", "label": "Email", "required": true},
                {"name": "Message", "label": "Your message", "widget": "TextArea"}
            ],
            "json_example": "[{\"name\":\"Nom\",\"label\":\"Your name\",\"required\":true}]"
        }),
        HelpSection::Options => json!({
            "description": "Form-wide options",
            "props": ["description", "success_message", "allow_multiple", "notification_email", "theme"],
            "example": {
                "description": "Contact form",
                "success_message": "Thanks for your message!",
                "allow_multiple": true
            }
        }),
        HelpSection::Validation => json!({
            "description": "Field validation rules",
            "rules": ValidationKind::VARIANTS,
            "example": {
                "Email": [
                    {"type": "email_format", "error_message": "Invalid email format"}
                ],
                "Age": [
                    {"type": "min_value", "params": {"min_value": 18}, "error_message": "You must be at least 18"}
                ]
            }
        }),
        HelpSection::Templates => json!({
            "description": "Predefined form templates",
            "available": FormTemplate::VARIANTS,
            "example_usage": "create_grist_form_from_template('abc123', 'Registration', 'event_registration')"
        }),
        HelpSection::All => Value::Null,
    }
}

/// Help payload for one section, or all of them.
pub fn help_for(kind: HelpSection) -> Map<String, Value> {
    let mut help = Map::new();
    help.insert("help".into(), json!(JSON_FORMAT_HELP));
    let sections = match kind {
        HelpSection::All => vec![
            HelpSection::Fields,
            HelpSection::Options,
            HelpSection::Validation,
            HelpSection::Templates,
        ],
        single => vec![single],
    };
    for section_kind in sections {
        help.insert(section_kind.to_string(), section(section_kind));
    }
    help
}
