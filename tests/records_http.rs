use anyhow::Result;
use grist_mcp::api::DeletionStrategy;
use grist_mcp::tools::records::{
    AddRecordsParams, DeleteRecordsParams, UpdateRecordsParams, add_grist_records,
    add_grist_records_safe, delete_grist_records, update_grist_records,
};
use serde_json::{Map, Value, json};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;

const RECORDS: &str = "/api/docs/doc1/tables/Clients/records";

fn record(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("record object")
}

#[tokio::test(flavor = "current_thread")]
async fn add_wraps_bare_records_and_reports_created_ids() -> Result<()> {
    let grist = support::MockGrist::start().await;
    Mock::given(method("POST"))
        .and(path(RECORDS))
        .and(header("authorization", "Bearer test-key-0123456789"))
        .and(body_json(json!({"records": [{"fields": {"nom": "Dupont"}}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": [{"id": 12}]})))
        .expect(1)
        .mount(grist.server())
        .await;

    let response = add_grist_records(
        grist.state(),
        AddRecordsParams {
            doc_id: "doc1".into(),
            table_id: "Clients".into(),
            records: vec![record(json!({"nom": "Dupont"}))],
        },
    )
    .await?;

    assert!(response.success);
    assert_eq!(response.record_ids, vec![12]);
    assert_eq!(response.records_count, 1);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn add_rejects_empty_record_list_without_calling_grist() -> Result<()> {
    let grist = support::MockGrist::start().await;

    let err = add_grist_records(
        grist.state(),
        AddRecordsParams {
            doc_id: "doc1".into(),
            table_id: "Clients".into(),
            records: Vec::new(),
        },
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("at least one record"));
    assert!(grist.received_bodies().await.is_empty());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn delete_with_no_ids_fails_without_calling_grist() -> Result<()> {
    let grist = support::MockGrist::start().await;

    let response = delete_grist_records(
        grist.state(),
        DeleteRecordsParams {
            doc_id: "doc1".into(),
            table_id: "Clients".into(),
            record_ids: vec![],
            allow_soft_clear: true,
        },
    )
    .await?;

    assert!(!response.success);
    assert_eq!(response.message, "No record IDs provided for deletion");
    assert_eq!(response.attempted_ids, Some(vec![]));
    assert!(response.strategy.is_none());
    assert!(grist.received_bodies().await.is_empty());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn safe_add_reports_missing_columns_with_suggestions() -> Result<()> {
    let grist = support::MockGrist::start().await;
    Mock::given(method("GET"))
        .and(path("/api/docs/doc1/tables"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"tables": [{"id": "Clients", "fields": {}}]})),
        )
        .mount(grist.server())
        .await;
    Mock::given(method("GET"))
        .and(path("/api/docs/doc1/tables/Clients/columns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "columns": [
                {"id": "Nom", "fields": {"label": "Nom", "type": "Text"}},
                {"id": "Email", "fields": {"label": "Email", "type": "Text"}}
            ]
        })))
        .mount(grist.server())
        .await;
    Mock::given(method("POST"))
        .and(path(RECORDS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": [{"id": 1}]})))
        .expect(0)
        .mount(grist.server())
        .await;

    let response = add_grist_records_safe(
        grist.state(),
        AddRecordsParams {
            doc_id: "doc1".into(),
            table_id: "Clients".into(),
            records: vec![record(json!({"Nom": "Dupont", "Emial": "d@x.fr"}))],
        },
    )
    .await?;

    assert!(!response.success);
    assert_eq!(response.missing_columns, Some(vec!["Emial".to_string()]));
    let available = response.available_columns.expect("available columns");
    assert!(available.contains(&"Email".to_string()));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn safe_add_reports_unknown_table() -> Result<()> {
    let grist = support::MockGrist::start().await;
    Mock::given(method("GET"))
        .and(path("/api/docs/doc1/tables"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"tables": [{"id": "Clients", "fields": {}}]})),
        )
        .mount(grist.server())
        .await;

    let response = add_grist_records_safe(
        grist.state(),
        AddRecordsParams {
            doc_id: "doc1".into(),
            table_id: "Client".into(),
            records: vec![record(json!({"Nom": "Dupont"}))],
        },
    )
    .await?;

    assert!(!response.success);
    assert_eq!(response.available_tables, Some(vec!["Clients".to_string()]));
    assert_eq!(response.suggestion.as_deref(), Some("Clients"));
    assert!(response.help.is_some());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn update_moves_flat_values_under_fields() -> Result<()> {
    let grist = support::MockGrist::start().await;
    Mock::given(method("PATCH"))
        .and(path(RECORDS))
        .and(body_json(json!({"records": [{"id": 1, "fields": {"nom": "X"}}]})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(grist.server())
        .await;

    let response = update_grist_records(
        grist.state(),
        UpdateRecordsParams {
            doc_id: "doc1".into(),
            table_id: "Clients".into(),
            records: vec![record(json!({"id": 1, "nom": "X"}))],
        },
    )
    .await?;

    assert!(response.success);
    assert_eq!(response.record_ids, vec![1]);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn update_without_id_is_rejected_locally() -> Result<()> {
    let grist = support::MockGrist::start().await;

    let result = update_grist_records(
        grist.state(),
        UpdateRecordsParams {
            doc_id: "doc1".into(),
            table_id: "Clients".into(),
            records: vec![record(json!({"nom": "X"}))],
        },
    )
    .await;

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("'id'"));
    assert!(grist.received_bodies().await.is_empty());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn delete_walks_the_fallback_chain_down_to_soft_clear() -> Result<()> {
    let grist = support::MockGrist::start().await;
    Mock::given(method("POST"))
        .and(path("/api/docs/doc1/tables/Clients/data/delete"))
        .and(body_json(json!([7])))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such endpoint"))
        .expect(1)
        .mount(grist.server())
        .await;
    Mock::given(method("DELETE"))
        .and(path(RECORDS))
        .and(body_json(json!({"records": [{"id": 7}]})))
        .respond_with(ResponseTemplate::new(405).set_body_string("method not allowed"))
        .expect(1)
        .mount(grist.server())
        .await;
    Mock::given(method("PATCH"))
        .and(path(RECORDS))
        .and(body_json(json!({"records": [{"id": 7, "fields": {}}]})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(grist.server())
        .await;

    let response = delete_grist_records(
        grist.state(),
        DeleteRecordsParams {
            doc_id: "doc1".into(),
            table_id: "Clients".into(),
            record_ids: vec![7],
            allow_soft_clear: true,
        },
    )
    .await?;

    assert!(response.success);
    assert_eq!(response.strategy, Some(DeletionStrategy::SoftClear));
    assert_eq!(response.degraded, Some(true));
    assert!(response.message.contains("cleared, not removed"));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn delete_failure_mentions_every_strategy() -> Result<()> {
    let grist = support::MockGrist::start().await;
    Mock::given(method("POST"))
        .and(path("/api/docs/doc1/tables/Clients/data/delete"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(grist.server())
        .await;
    Mock::given(method("DELETE"))
        .and(path(RECORDS))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(grist.server())
        .await;
    Mock::given(method("PATCH"))
        .and(path(RECORDS))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(grist.server())
        .await;

    let response = delete_grist_records(
        grist.state(),
        DeleteRecordsParams {
            doc_id: "doc1".into(),
            table_id: "Clients".into(),
            record_ids: vec![7],
            allow_soft_clear: true,
        },
    )
    .await?;

    assert!(!response.success);
    assert!(response.message.contains("data/delete"));
    assert!(response.message.contains("records DELETE"));
    assert!(response.message.contains("soft clear"));
    assert_eq!(response.attempted_ids, Some(vec![7]));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn delete_stops_before_soft_clear_when_disallowed() -> Result<()> {
    let grist = support::MockGrist::start().await;
    Mock::given(method("POST"))
        .and(path("/api/docs/doc1/tables/Clients/data/delete"))
        .respond_with(ResponseTemplate::new(404))
        .mount(grist.server())
        .await;
    Mock::given(method("DELETE"))
        .and(path(RECORDS))
        .respond_with(ResponseTemplate::new(404))
        .mount(grist.server())
        .await;
    Mock::given(method("PATCH"))
        .and(path(RECORDS))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(grist.server())
        .await;

    let response = delete_grist_records(
        grist.state(),
        DeleteRecordsParams {
            doc_id: "doc1".into(),
            table_id: "Clients".into(),
            record_ids: vec![7],
            allow_soft_clear: false,
        },
    )
    .await?;

    assert!(!response.success);
    assert!(!response.message.contains("soft clear"));
    Ok(())
}
