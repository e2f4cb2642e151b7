use anyhow::Result;
use grist_mcp::tools::forms::{
    CreateFormFromTemplateParams, CreateFormParams, FormResponsesParams, FormUrlParams,
    UpdateFormParams, create_grist_form, create_grist_form_from_template,
    generate_grist_form_url, get_grist_form_responses, update_grist_form,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;

async fn mount_table_creation(grist: &support::MockGrist) {
    Mock::given(method("POST"))
        .and(path("/api/docs/doc1/tables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tables": [{"id": "Form"}]})))
        .mount(grist.server())
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn form_from_stringified_fields_creates_table_and_validation_columns() -> Result<()> {
    let grist = support::MockGrist::start().await;
    mount_table_creation(&grist).await;
    Mock::given(method("POST"))
        .and(path("/api/docs/doc1/tables/Inscription_2024/columns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"columns": [{"id": "x"}]})))
        .expect(1)
        .mount(grist.server())
        .await;

    let fields = r#"[{"name": "email", "label": "Email", "required": "oui"}, {"name": "age", "label": "Age", "type": "Int"}]"#;
    let response = create_grist_form(
        grist.state(),
        CreateFormParams {
            doc_id: "doc1".into(),
            form_name: "Inscription 2024".into(),
            fields_json: Value::String(fields.into()),
            form_options_json: None,
            validation_rules_json: Some(json!({"email": [{"type": "email_format"}]})),
        },
    )
    .await?;

    assert!(response.success);
    assert_eq!(response.form_id, "Inscription_2024");
    assert_eq!(response.fields_count, 2);
    assert_eq!(response.validation_count, 1);
    assert_eq!(response.form_url, format!("{}/doc/doc1", grist.server().uri()));

    let bodies = grist.received_bodies().await;
    let table = &bodies[0]["tables"][0];
    assert_eq!(table["id"], json!("Inscription_2024"));
    let columns = table["columns"].as_array().expect("columns");
    assert_eq!(columns.len(), 3);
    assert_eq!(columns[2]["id"], json!("Timestamp"));
    assert_eq!(columns[2]["fields"]["formula"], json!("NOW()"));

    let widget: Value = serde_json::from_str(columns[0]["fields"]["widgetOptions"].as_str().unwrap())?;
    assert_eq!(widget["formRequired"], json!(true));
    assert_eq!(widget["question"], json!("Email:"));
    assert_eq!(widget["alignment"], json!("left"));

    let rule_column = &bodies[1]["columns"][0];
    assert_eq!(rule_column["id"], json!("Valid_email_email_format"));
    assert_eq!(rule_column["fields"]["type"], json!("Bool"));
    assert!(rule_column["fields"]["formula"].as_str().unwrap().contains("$email"));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn unknown_rule_type_fails_before_any_request() -> Result<()> {
    let grist = support::MockGrist::start().await;

    let err = create_grist_form(
        grist.state(),
        CreateFormParams {
            doc_id: "doc1".into(),
            form_name: "Survey".into(),
            fields_json: json!([{"name": "nom", "label": "Nom"}]),
            form_options_json: None,
            validation_rules_json: Some(json!({"nom": {"type": "palindrome"}})),
        },
    )
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("palindrome"));
    assert!(grist.received_bodies().await.is_empty());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn unknown_template_lists_available_ones() -> Result<()> {
    let grist = support::MockGrist::start().await;

    let err = create_grist_form_from_template(
        grist.state(),
        CreateFormFromTemplateParams {
            doc_id: "doc1".into(),
            form_name: "Quiz".into(),
            template_type: "quiz".into(),
            custom_fields_json: None,
            form_options_json: None,
        },
    )
    .await
    .unwrap_err();

    let message = format!("{err:#}");
    assert!(message.contains("quiz"));
    assert!(message.contains("event_registration"));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn stats_aggregate_numeric_and_choice_answers() -> Result<()> {
    let grist = support::MockGrist::start().await;
    Mock::given(method("GET"))
        .and(path("/api/docs/doc1/tables/Survey/columns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "columns": [
                {"id": "age", "fields": {"label": "Age", "type": "Int"}},
                {"id": "choix", "fields": {"label": "Choix", "type": "Choice"}},
                {"id": "Valid_age_min_value", "fields": {"label": "Age min", "type": "Bool"}},
                {"id": "Timestamp", "fields": {"label": "Date de soumission", "type": "DateTime:UTC"}}
            ]
        })))
        .mount(grist.server())
        .await;
    Mock::given(method("GET"))
        .and(path("/api/docs/doc1/tables/Survey/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [
                {"id": 1, "fields": {"age": 20, "choix": "A"}},
                {"id": 2, "fields": {"age": 40, "choix": "B"}},
                {"id": 3, "fields": {"age": 30, "choix": "A"}}
            ]
        })))
        .mount(grist.server())
        .await;

    let response = get_grist_form_responses(
        grist.state(),
        FormResponsesParams {
            doc_id: "doc1".into(),
            form_id: "Survey".into(),
            format_type: "stats".into(),
            include_validation: false,
        },
    )
    .await?;

    let body = serde_json::to_value(&response)?;
    assert_eq!(body["total_responses"], json!(3));
    assert_eq!(body["fields_stats"]["age"]["avg"], json!(30.0));
    assert_eq!(body["fields_stats"]["age"]["min"], json!(20));
    assert_eq!(body["fields_stats"]["age"]["max"], json!(40));
    assert_eq!(body["fields_stats"]["choix"]["distribution"], json!({"A": 2, "B": 1}));
    assert!(body["fields_stats"].get("Timestamp").is_none());
    assert!(body["fields_stats"].get("Valid_age_min_value").is_none());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn form_urls_are_public_or_scoped_to_the_org() -> Result<()> {
    let grist = support::MockGrist::start().await;
    Mock::given(method("GET"))
        .and(path("/api/docs/doc1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "doc1", "workspace": {"id": 5, "org": {"id": 3}}})),
        )
        .expect(1)
        .mount(grist.server())
        .await;
    let base = grist.server().uri();

    let public = generate_grist_form_url(
        grist.state(),
        FormUrlParams {
            doc_id: "doc1".into(),
            form_id: "Survey".into(),
            is_public: true,
        },
    )
    .await?;
    assert_eq!(public.form_url, format!("{base}/s/doc1/p/form-Survey"));

    let private = generate_grist_form_url(
        grist.state(),
        FormUrlParams {
            doc_id: "doc1".into(),
            form_id: "Survey".into(),
            is_public: false,
        },
    )
    .await?;
    assert_eq!(private.form_url, format!("{base}/o/3/doc/doc1#form/Survey"));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn form_update_patches_only_fields_that_change() -> Result<()> {
    let grist = support::MockGrist::start().await;
    Mock::given(method("GET"))
        .and(path("/api/docs/doc1/tables/Survey/columns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "columns": [
                {"id": "nom", "fields": {"label": "Nom", "type": "Text"}},
                {"id": "age", "fields": {"label": "Age", "type": "Int"}},
                {"id": "ville", "fields": {"label": "Ville", "type": "Text"}}
            ]
        })))
        .mount(grist.server())
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/docs/doc1/tables/Survey/columns"))
        .and(body_json(json!({"columns": [{"id": "age", "fields": {"label": "Âge"}}]})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(grist.server())
        .await;

    let response = update_grist_form(
        grist.state(),
        UpdateFormParams {
            doc_id: "doc1".into(),
            form_id: "Survey".into(),
            fields_to_add_json: None,
            fields_to_update_json: Some(json!({
                "nom": {"label": "Nom", "type": "Text"},
                "age": {"label": "Âge"},
                "ville": {"foo": 1}
            })),
            fields_to_remove_json: None,
            form_options_json: None,
        },
    )
    .await?;

    assert!(response.success);
    assert_eq!(response.changes.updated, vec!["age".to_string()]);
    let patches = grist
        .server()
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.method.as_str() == "PATCH")
        .count();
    assert_eq!(patches, 1);
    Ok(())
}
