use anyhow::Result;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use grist_mcp::tools::access::{ModifyDocumentAccessParams, modify_document_access};
use grist_mcp::tools::attachments::{UploadAttachmentParams, upload_attachment};
use grist_mcp::tools::exports::{
    DownloadExcelParams, TableExportParams, download_document_excel, download_table_csv,
};
use rmcp::handler::server::wrapper::Parameters;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

mod support;

#[tokio::test(flavor = "current_thread")]
async fn null_access_level_removes_the_user() -> Result<()> {
    let grist = support::MockGrist::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/docs/doc1/access"))
        .and(body_json(json!({"delta": {"users": {"ana@example.com": null}}})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(grist.server())
        .await;

    let response = modify_document_access(
        grist.state(),
        ModifyDocumentAccessParams {
            doc_id: "doc1".into(),
            user_email: "ana@example.com".into(),
            access_level: None,
        },
    )
    .await?;

    assert!(response.success);
    assert_eq!(response.message, "Access for ana@example.com removed successfully");
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn invalid_access_level_lists_valid_values() -> Result<()> {
    let grist = support::MockGrist::start().await;
    let server = grist.grist_server();

    let result = server
        .modify_document_access(Parameters(ModifyDocumentAccessParams {
            doc_id: "doc1".into(),
            user_email: "ana@example.com".into(),
            access_level: Some("admins".into()),
        }))
        .await
        .expect("envelope");

    let envelope = result.structured_content.expect("structured content");
    assert_eq!(envelope["success"], json!(false));
    assert_eq!(envelope["path"], json!("access_level"));
    let valid = envelope["valid_values"].as_array().expect("valid values");
    assert!(valid.contains(&json!("editors")));
    assert!(grist.received_bodies().await.is_empty());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn csv_export_passes_table_and_header() -> Result<()> {
    let grist = support::MockGrist::start().await;
    Mock::given(method("GET"))
        .and(path("/api/docs/doc1/download/csv"))
        .and(query_param("tableId", "Clients"))
        .and(query_param("header", "colId"))
        .respond_with(ResponseTemplate::new(200).set_body_string("nom,age\nDupont,35\n"))
        .expect(1)
        .mount(grist.server())
        .await;

    let response = download_table_csv(
        grist.state(),
        TableExportParams {
            doc_id: "doc1".into(),
            table_id: "Clients".into(),
            header_format: "colId".into(),
        },
    )
    .await?;

    assert_eq!(response.content, "nom,age\nDupont,35\n");
    assert_eq!(response.size, 19);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn excel_export_is_base64_encoded() -> Result<()> {
    let grist = support::MockGrist::start().await;
    let bytes = vec![0x50, 0x4b, 0x03, 0x04, 0xff];
    Mock::given(method("GET"))
        .and(path("/api/docs/doc1/download/xlsx"))
        .and(query_param("header", "label"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.clone()))
        .mount(grist.server())
        .await;

    let params: DownloadExcelParams = serde_json::from_value(json!({"doc_id": "doc1"}))?;
    let response = download_document_excel(grist.state(), params).await?;

    assert_eq!(response.file_size, 5);
    assert_eq!(STANDARD.decode(&response.content_base64)?, bytes);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn bad_header_format_is_rejected_locally() -> Result<()> {
    let grist = support::MockGrist::start().await;

    let err = download_table_csv(
        grist.state(),
        TableExportParams {
            doc_id: "doc1".into(),
            table_id: "Clients".into(),
            header_format: "title".into(),
        },
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("title"));
    assert!(grist.received_bodies().await.is_empty());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn upload_sends_multipart_and_returns_ids() -> Result<()> {
    let grist = support::MockGrist::start().await;
    Mock::given(method("POST"))
        .and(path("/api/docs/doc1/attachments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([42])))
        .expect(1)
        .mount(grist.server())
        .await;

    let response = upload_attachment(
        grist.state(),
        UploadAttachmentParams {
            doc_id: "doc1".into(),
            filename: "note.txt".into(),
            content_base64: STANDARD.encode(b"bonjour"),
            content_type: "text/plain".into(),
        },
    )
    .await?;

    assert_eq!(response.attachment_ids, vec![42]);
    assert_eq!(response.file_size, 7);

    let requests = grist.server().received_requests().await.unwrap_or_default();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"upload\""));
    assert!(body.contains("bonjour"));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn invalid_base64_never_reaches_grist() -> Result<()> {
    let grist = support::MockGrist::start().await;

    let result = upload_attachment(
        grist.state(),
        UploadAttachmentParams {
            doc_id: "doc1".into(),
            filename: "note.txt".into(),
            content_base64: "***".into(),
            content_type: "text/plain".into(),
        },
    )
    .await;

    assert!(result.is_err());
    assert!(grist.received_bodies().await.is_empty());
    Ok(())
}
