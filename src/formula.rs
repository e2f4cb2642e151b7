//! Column lookups for formula authoring.
//!
//! Grist formulas reference columns as `$ColumnId`. Agents tend to write labels or
//! get the case wrong, so [`FormulaColumnMap::validate`] lints every reference
//! against the live column list: case slips are rewritten, unknown names get the
//! closest known id as a suggestion.

use crate::model::{Column, Table};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::HashMap;

static COLUMN_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("column reference pattern"));

/// Minimum similarity for a suggestion.
pub const SUGGESTION_CUTOFF: f64 = 0.6;

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FormulaColumn {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub formula_ref: String,
}

#[derive(Debug, Clone, Default, Serialize, JsonSchema)]
pub struct FormulaColumnMap {
    pub columns: Vec<FormulaColumn>,
    pub id_to_label: IndexMap<String, String>,
    pub label_to_id: IndexMap<String, String>,
    pub formula_references: IndexMap<String, String>,
    pub case_variants: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormulaIssue {
    CaseError {
        found: String,
        correct: String,
        message: String,
    },
    UnknownColumn {
        found: String,
        message: String,
        suggestion: Option<String>,
        available_columns: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FormulaValidation {
    pub valid: bool,
    pub original_formula: String,
    pub corrected_formula: Option<String>,
    pub issues: Vec<FormulaIssue>,
}

impl FormulaColumnMap {
    pub fn from_columns(columns: &[Column]) -> Self {
        let mut map = FormulaColumnMap::default();
        for column in columns {
            let id = column.id.clone();
            let label = column.label().to_string();
            let reference = format!("${id}");

            map.columns.push(FormulaColumn {
                id: id.clone(),
                label: label.clone(),
                column_type: column.column_type().to_string(),
                formula_ref: reference.clone(),
            });
            map.id_to_label.insert(id.clone(), label.clone());
            map.label_to_id.insert(label.clone(), id.clone());
            map.formula_references.insert(label.clone(), reference);
            map.case_variants.insert(id.to_lowercase(), id.clone());
            map.case_variants.insert(label.to_lowercase(), id);
        }
        map
    }

    pub fn column_ids(&self) -> impl Iterator<Item = &str> {
        self.id_to_label.keys().map(String::as_str)
    }

    /// Lints `$Column` references. Each distinct token is reported once.
    pub fn validate(&self, formula: &str) -> FormulaValidation {
        let mut issues = Vec::new();
        let mut corrections: HashMap<String, String> = HashMap::new();
        let mut seen: Vec<&str> = Vec::new();

        for captures in COLUMN_REF.captures_iter(formula) {
            let Some(token) = captures.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if self.id_to_label.contains_key(token) || seen.contains(&token) {
                continue;
            }
            seen.push(token);

            if let Some(correct) = self.case_variants.get(&token.to_lowercase()) {
                issues.push(FormulaIssue::CaseError {
                    found: format!("${token}"),
                    correct: format!("${correct}"),
                    message: format!("Case mismatch: use ${correct} instead of ${token}"),
                });
                corrections.insert(token.to_string(), correct.clone());
            } else {
                let suggestion = closest_match(token, self.column_ids(), SUGGESTION_CUTOFF)
                    .map(|id| format!("${id}"));
                issues.push(FormulaIssue::UnknownColumn {
                    found: format!("${token}"),
                    message: format!("Column ${token} not found"),
                    suggestion,
                    available_columns: self.column_ids().map(|id| format!("${id}")).collect(),
                });
            }
        }

        let corrected_formula = if corrections.is_empty() {
            None
        } else {
            let rewritten = COLUMN_REF.replace_all(formula, |caps: &Captures| {
                match corrections.get(&caps[1]) {
                    Some(correct) => format!("${correct}"),
                    None => caps[0].to_string(),
                }
            });
            Some(rewritten.into_owned()).filter(|fixed| fixed != formula)
        };

        FormulaValidation {
            valid: issues.is_empty(),
            original_formula: formula.to_string(),
            corrected_formula,
            issues,
        }
    }
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TableCheck {
    pub exists: bool,
    pub error: Option<String>,
    pub available_tables: Option<Vec<String>>,
    pub suggestion: Option<String>,
}

pub fn check_table(doc_id: &str, table_id: &str, tables: &[Table]) -> TableCheck {
    if tables.iter().any(|table| table.id == table_id) {
        return TableCheck {
            exists: true,
            error: None,
            available_tables: None,
            suggestion: None,
        };
    }
    let ids: Vec<String> = tables.iter().map(|table| table.id.clone()).collect();
    let suggestion =
        closest_match(table_id, ids.iter().map(String::as_str), SUGGESTION_CUTOFF).map(str::to_string);
    TableCheck {
        exists: false,
        error: Some(format!("Table '{table_id}' not found in document {doc_id}")),
        available_tables: Some(ids),
        suggestion,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    LabelVsId,
    Typo,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ColumnSuggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub suggestion: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ColumnCheck {
    pub valid: bool,
    pub missing_columns: Vec<String>,
    pub suggestions: IndexMap<String, ColumnSuggestion>,
    pub available_columns: Vec<String>,
    pub column_labels: IndexMap<String, String>,
}

/// A label used in place of an id still fails the check, with a `label_vs_id` hint.
pub fn check_columns<'a, I>(names: I, columns: &[Column]) -> ColumnCheck
where
    I: IntoIterator<Item = &'a str>,
{
    let available_columns: Vec<String> = columns.iter().map(|col| col.id.clone()).collect();
    let column_labels: IndexMap<String, String> = columns
        .iter()
        .map(|col| (col.label().to_string(), col.id.clone()))
        .collect();

    let mut missing_columns = Vec::new();
    let mut suggestions = IndexMap::new();
    for name in names {
        if available_columns.iter().any(|id| id == name) {
            continue;
        }
        if let Some(id) = column_labels.get(name) {
            suggestions.insert(
                name.to_string(),
                ColumnSuggestion {
                    kind: SuggestionKind::LabelVsId,
                    suggestion: id.clone(),
                    message: format!("Use column ID '{id}' instead of label '{name}'"),
                },
            );
            continue;
        }
        missing_columns.push(name.to_string());
        if let Some(closest) =
            closest_match(name, available_columns.iter().map(String::as_str), SUGGESTION_CUTOFF)
        {
            suggestions.insert(
                name.to_string(),
                ColumnSuggestion {
                    kind: SuggestionKind::Typo,
                    suggestion: closest.to_string(),
                    message: format!("Did you mean '{closest}'?"),
                },
            );
        }
    }

    ColumnCheck {
        valid: missing_columns.is_empty() && suggestions.is_empty(),
        missing_columns,
        suggestions,
        available_columns,
        column_labels,
    }
}

/// Best candidate scoring at least `cutoff`; ties go to the lexically greater candidate.
pub fn closest_match<'a, I>(word: &str, candidates: I, cutoff: f64) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(f64, &'a str)> = None;
    for candidate in candidates {
        let score = similarity_ratio(word, candidate);
        if score < cutoff {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_score, best_candidate)) => {
                score > best_score || (score == best_score && candidate > best_candidate)
            }
        };
        if better {
            best = Some((score, candidate));
        }
    }
    best.map(|(_, candidate)| candidate)
}

/// Ratcliff/Obershelp similarity: `2 * matched / (len(a) + len(b))`.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let (start_a, start_b, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matched_chars(&a[..start_a], &b[..start_b])
        + matched_chars(&a[start_a + len..], &b[start_b + len..])
}

fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut previous = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut current = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                let run = previous[j] + 1;
                current[j + 1] = run;
                if run > best.2 {
                    best = (i + 1 - run, j + 1 - run, run);
                }
            }
        }
        previous = current;
    }
    best
}
