//! End-to-end callbacks through the bundled settings toolkit.


use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::test;
use base64::prelude::*;

use actix_shibboleth_core::http::security::{SecurityEventType, SettingsToolkit};
use common::{
    callback_request, create_test_app, location, login_request, relay_state, saml_response,
    test_config, unsigned_saml_response, ReferencedIds, TestContext, IDP_ENTITY_ID,
    SP_ENTITY_ID,
};

fn settings_context() -> TestContext {
    let toolkit = SettingsToolkit::new().with_signature_verifier(Arc::new(ReferencedIds));
    TestContext::new(Arc::new(toolkit), test_config())
}

#[actix_web::test]
async fn test_valid_response_logs_in() {
    let ctx = settings_context();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(
        &app,
        login_request("/shibboleth/login/hzdr?next=/records/7").to_request(),
    )
    .await;
    let state = relay_state(&location(&resp));

    let response = saml_response(IDP_ENTITY_ID, SP_ENTITY_ID);
    let resp = test::call_service(&app, callback_request(&response, Some(&state)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/records/7");

    let accounts = ctx.accounts.all().await;
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].username, "jdoe");
    assert_eq!(accounts[0].full_name, "Jane Doe");
}

#[actix_web::test]
async fn test_wrong_audience_is_forbidden() {
    let ctx = settings_context();
    let app = create_test_app(&ctx).await;

    let response = saml_response(IDP_ENTITY_ID, "https://other-sp.example/metadata");
    let resp = test::call_service(&app, callback_request(&response, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let failures = ctx
        .events
        .get_events_by_type(&SecurityEventType::AuthenticationFailure);
    assert_eq!(failures.len(), 1);
    assert!(failures[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("not a valid audience"));
    assert!(ctx.accounts.is_empty().await);
}

#[actix_web::test]
async fn test_wrong_issuer_is_forbidden() {
    let ctx = settings_context();
    let app = create_test_app(&ctx).await;

    let response = saml_response("https://idp.evil.example/idp", SP_ENTITY_ID);
    let resp = test::call_service(&app, callback_request(&response, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_garbage_response_is_bad_request() {
    let ctx = settings_context();
    let app = create_test_app(&ctx).await;

    let garbage = BASE64_STANDARD.encode("<not-saml");
    let resp = test::call_service(&app, callback_request(&garbage, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(&app, callback_request("%%%", None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_unsigned_response_is_forbidden() {
    let ctx = settings_context();
    let app = create_test_app(&ctx).await;

    let response = unsigned_saml_response(IDP_ENTITY_ID, SP_ENTITY_ID);
    let resp = test::call_service(&app, callback_request(&response, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let failures = ctx
        .events
        .get_events_by_type(&SecurityEventType::AuthenticationFailure);
    assert_eq!(failures.len(), 1);
    assert!(failures[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("No Signature found"));
    assert!(ctx.accounts.is_empty().await);
}

#[actix_web::test]
async fn test_toolkit_without_verifier_is_forbidden() {
    let ctx = TestContext::new(Arc::new(SettingsToolkit::new()), test_config());
    let app = create_test_app(&ctx).await;

    let response = saml_response(IDP_ENTITY_ID, SP_ENTITY_ID);
    let resp = test::call_service(&app, callback_request(&response, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(ctx.accounts.is_empty().await);
}
