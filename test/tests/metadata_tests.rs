//! Service provider metadata endpoint tests, using the bundled toolkit.


use std::sync::Arc;

use actix_web::http::header::CONTENT_TYPE;
use actix_web::http::StatusCode;
use actix_web::test;

use actix_shibboleth_core::http::security::SettingsToolkit;
use common::{body_string, create_test_app, test_config, TestContext, SP_ENTITY_ID};

fn settings_context() -> TestContext {
    TestContext::new(Arc::new(SettingsToolkit::new()), test_config())
}

fn metadata_request(provider_id: &str) -> test::TestRequest {
    test::TestRequest::get().uri(&format!("/shibboleth/metadata/{}", provider_id))
}

#[actix_web::test]
async fn test_metadata_served_as_xml() {
    let ctx = settings_context();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, metadata_request("hzdr").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("text/xml")
    );

    let body = body_string(resp).await;
    assert!(body.contains(&format!(r#"entityID="{}""#, SP_ENTITY_ID)));
    assert!(body.contains("md:SPSSODescriptor"));
    assert!(body.contains("md:AssertionConsumerService"));
    assert!(body.contains("sso-support@hzdr.de"));
}

#[actix_web::test]
async fn test_metadata_errors_are_listed_in_body() {
    let ctx = settings_context();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, metadata_request("broken").to_request()).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(resp).await, "sp_entityId_not_found, sp_acs_not_found");
}

#[actix_web::test]
async fn test_metadata_unknown_provider_not_found() {
    let ctx = settings_context();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, metadata_request("nope").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_metadata_without_saml_path_is_server_error() {
    let ctx = settings_context();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, metadata_request("unconfigured").to_request()).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(resp).await, "Bad server configuration.");
}
