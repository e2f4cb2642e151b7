use crate::errors::InvalidParamsError;
use std::str::FromStr;
use strum::{Display, EnumString, VariantNames};

/// Parses a free-form string parameter into one of a fixed set of choices.
/// Unknown values become an [`InvalidParamsError`] listing what is accepted.
pub fn parse_choice<T>(tool: &'static str, field: &str, raw: &str) -> Result<T, InvalidParamsError>
where
    T: FromStr + VariantNames,
{
    raw.parse::<T>().map_err(|_| {
        InvalidParamsError::new(
            tool,
            format!(
                "Invalid {field} '{raw}'. Must be one of: {}",
                T::VARIANTS.join(", ")
            ),
        )
        .with_path(field)
        .with_valid_values(T::VARIANTS.iter().copied())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, VariantNames)]
pub enum AccessLevel {
    #[strum(serialize = "owners")]
    Owners,
    #[strum(serialize = "editors")]
    Editors,
    #[strum(serialize = "viewers")]
    Viewers,
    #[strum(serialize = "members")]
    Members,
    #[strum(serialize = "null")]
    Remove,
}

impl AccessLevel {
    /// Role sent to Grist; `None` revokes access.
    pub fn role(self) -> Option<&'static str> {
        match self {
            Self::Owners => Some("owners"),
            Self::Editors => Some("editors"),
            Self::Viewers => Some("viewers"),
            Self::Members => Some("members"),
            Self::Remove => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, VariantNames)]
pub enum HeaderFormat {
    #[default]
    #[strum(serialize = "label")]
    Label,
    #[strum(serialize = "colId")]
    ColId,
}

impl HeaderFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::ColId => "colId",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, VariantNames)]
#[strum(serialize_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Records,
    Summary,
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_format_is_case_sensitive() {
        assert_eq!(
            parse_choice::<HeaderFormat>("t", "header_format", "colId").unwrap(),
            HeaderFormat::ColId
        );
        let err = parse_choice::<HeaderFormat>("t", "header_format", "colid").unwrap_err();
        assert_eq!(err.valid_values(), &["label".to_string(), "colId".to_string()]);
        assert_eq!(err.path(), Some("header_format"));
    }

    #[test]
    fn null_access_level_revokes() {
        let level = parse_choice::<AccessLevel>("t", "access_level", "null").unwrap();
        assert_eq!(level.role(), None);
        assert_eq!(AccessLevel::Editors.role(), Some("editors"));
        assert!(parse_choice::<AccessLevel>("t", "access_level", "admins").is_err());
    }
}
