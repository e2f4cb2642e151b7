use thiserror::Error;

/// A request rejected locally, before anything reaches the Grist API.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct InvalidParamsError {
    tool: &'static str,
    message: String,
    path: Option<String>,
    valid_values: Vec<String>,
}

impl InvalidParamsError {
    pub fn new(tool: &'static str, message: impl Into<String>) -> Self {
        Self {
            tool,
            message: message.into(),
            path: None,
            valid_values: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_valid_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn tool(&self) -> &'static str {
        self.tool
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn valid_values(&self) -> &[String] {
        &self.valid_values
    }
}

/// Raised by strict normalization when a required JSON blob cannot be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid format for '{field}': {reason} (input: {preview})")]
pub struct InvalidFormatError {
    field: String,
    reason: String,
    preview: String,
}

const PREVIEW_CHARS: usize = 100;

impl InvalidFormatError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>, input: &str) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
            preview: preview(input),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn preview(&self) -> &str {
        &self.preview
    }
}

fn preview(input: &str) -> String {
    let mut chars = input.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_truncated_after_one_hundred_chars() {
        let long = "x".repeat(150);
        let err = InvalidFormatError::new("fields_json", "not JSON", &long);
        assert_eq!(err.preview().len(), 103);
        assert!(err.preview().ends_with("..."));

        let short = InvalidFormatError::new("fields_json", "not JSON", "abc");
        assert_eq!(short.preview(), "abc");
    }

    #[test]
    fn invalid_params_carries_valid_values() {
        let err = InvalidParamsError::new("download_table_csv", "bad header")
            .with_path("header_format")
            .with_valid_values(["label", "colId"]);
        assert_eq!(err.valid_values(), &["label".to_string(), "colId".to_string()]);
        assert_eq!(err.path(), Some("header_format"));
        assert_eq!(err.to_string(), "bad header");
    }
}
