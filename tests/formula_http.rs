use anyhow::Result;
use grist_mcp::formula::FormulaIssue;
use grist_mcp::tools::columns::{
    CreateFormulaColumnParams, TableParams, ValidateFormulaParams,
    create_column_with_formula_safe, get_formula_helpers, validate_formula,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;

const COLUMNS: &str = "/api/docs/doc1/tables/Produits/columns";

async fn mount_columns(grist: &support::MockGrist, columns: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(COLUMNS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "columns": columns })))
        .mount(grist.server())
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn case_mistakes_are_corrected() -> Result<()> {
    let grist = support::MockGrist::start().await;
    mount_columns(
        &grist,
        json!([
            {"id": "Prix", "fields": {"label": "Prix", "type": "Numeric"}},
            {"id": "Taxe", "fields": {"label": "Taxe", "type": "Numeric"}}
        ]),
    )
    .await;

    let response = validate_formula(
        grist.state(),
        ValidateFormulaParams {
            doc_id: "doc1".into(),
            table_id: "Produits".into(),
            formula: "$prix + $Taxe".into(),
        },
    )
    .await?;

    assert!(!response.formula_valid);
    assert_eq!(response.corrected_formula.as_deref(), Some("$Prix + $Taxe"));
    assert_eq!(response.auto_fix_available, Some(true));
    let issues = response.issues.expect("issues");
    assert_eq!(issues.len(), 1);
    assert!(matches!(
        &issues[0],
        FormulaIssue::CaseError { found, correct, .. } if found == "$prix" && correct == "$Prix"
    ));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn unknown_columns_get_the_closest_suggestion() -> Result<()> {
    let grist = support::MockGrist::start().await;
    mount_columns(
        &grist,
        json!([
            {"id": "Remise2", "fields": {"label": "Remise 2", "type": "Numeric"}},
            {"id": "Total", "fields": {"label": "Total", "type": "Numeric"}}
        ]),
    )
    .await;

    let response = validate_formula(
        grist.state(),
        ValidateFormulaParams {
            doc_id: "doc1".into(),
            table_id: "Produits".into(),
            formula: "$Remise".into(),
        },
    )
    .await?;

    assert!(!response.formula_valid);
    let issues = response.issues.expect("issues");
    assert!(matches!(
        &issues[0],
        FormulaIssue::UnknownColumn { found, suggestion: Some(s), .. }
            if found == "$Remise" && s == "$Remise2"
    ));
    let available = response.available_columns.expect("available columns");
    assert!(available.contains(&"$Remise2 (label: Remise 2)".to_string()));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn helpers_map_labels_to_references() -> Result<()> {
    let grist = support::MockGrist::start().await;
    mount_columns(
        &grist,
        json!([{"id": "Prix_HT", "fields": {"label": "Prix HT", "type": "Numeric"}}]),
    )
    .await;

    let response = get_formula_helpers(
        grist.state(),
        TableParams {
            doc_id: "doc1".into(),
            table_id: "Produits".into(),
        },
    )
    .await?;

    assert_eq!(response.quick_reference.get("Prix HT").map(String::as_str), Some("$Prix_HT"));
    assert_eq!(response.id_to_label_map.get("Prix_HT").map(String::as_str), Some("Prix HT"));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn safe_formula_column_uses_the_corrected_formula() -> Result<()> {
    let grist = support::MockGrist::start().await;
    mount_columns(
        &grist,
        json!([
            {"id": "Prix", "fields": {"label": "Prix", "type": "Numeric"}},
            {"id": "TTC", "fields": {"label": "TTC", "type": "Numeric", "formula": "$Prix * 1.2"}}
        ]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(COLUMNS))
        .and(body_json(json!({
            "columns": [{
                "fields": {"label": "TTC", "type": "Numeric", "formula": "$Prix * 1.2", "isFormula": true}
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"columns": [{"id": "TTC"}]})))
        .expect(1)
        .mount(grist.server())
        .await;

    let response = create_column_with_formula_safe(
        grist.state(),
        CreateFormulaColumnParams {
            doc_id: "doc1".into(),
            table_id: "Produits".into(),
            column_label: "TTC".into(),
            formula: "$PRIX * 1.2".into(),
            column_type: "Numeric".into(),
        },
    )
    .await?;

    assert!(response.success);
    assert_eq!(response.final_formula, "$Prix * 1.2");
    assert_eq!(response.column_id.as_deref(), Some("TTC"));
    let corrections = response.formula_corrections.expect("corrections");
    assert_eq!(corrections.original, "$PRIX * 1.2");
    Ok(())
}
