//! Login endpoint tests.
//!
//! `/shibboleth/login/{provider_id}` signs a relay state and redirects to the IdP.


use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::test;
use base64::prelude::*;

use actix_shibboleth_core::http::security::{
    session_fingerprint, SecurityEventType, SettingsToolkit, StateTokenError,
};
use common::{
    create_test_app, location, login_request, relay_state, test_config, TestContext, PEER,
};

fn fingerprint() -> String {
    session_fingerprint(Some(&common::peer(PEER).ip().to_string()), None)
}

// =============================================================================
// Configuration Errors
// =============================================================================

#[actix_web::test]
async fn test_login_unknown_provider_not_found() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, login_request("/shibboleth/login/nope/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_login_provider_without_saml_path_is_server_error() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(
        &app,
        login_request("/shibboleth/login/unconfigured/").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(common::body_string(resp).await, "Bad server configuration.");
}

#[actix_web::test]
async fn test_login_unreadable_settings_is_server_error() {
    let config = test_config().remote_app(
        "missing",
        actix_shibboleth_core::http::security::RemoteAppConfig::new("Missing")
            .saml_path(common::fixture("does-not-exist")),
    );
    let ctx = TestContext::new(Arc::new(SettingsToolkit::new()), config);
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, login_request("/shibboleth/login/missing").to_request()).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// =============================================================================
// Redirect To The IdP
// =============================================================================

#[actix_web::test]
async fn test_login_redirects_with_signed_relay_state() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(
        &app,
        login_request("/shibboleth/login/hzdr/?next=/deposit/new?c=x").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let url = location(&resp);
    assert!(url.starts_with("https://idp.example.org/sso?"));

    let state = ctx
        .handshake
        .signer()
        .verify(&relay_state(&url), "hzdr", &fingerprint(), 300)
        .unwrap();
    assert_eq!(state.provider_id, "hzdr");
    assert_eq!(state.redirect_target, "/deposit/new?c=x");
    assert_eq!(
        ctx.events.event_types(),
        vec![SecurityEventType::LoginInitiated]
    );
}

#[actix_web::test]
async fn test_login_without_trailing_slash_and_via_post() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, login_request("/shibboleth/login/hzdr").to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let req = test::TestRequest::post()
        .uri("/shibboleth/login/hzdr/")
        .peer_addr(common::peer(PEER))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
}

#[actix_web::test]
async fn test_login_strips_foreign_host_from_next() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(
        &app,
        login_request("/shibboleth/login/hzdr?next=http%3A%2F%2Fevil.example%2Fp%3Fq%3D1")
            .to_request(),
    )
    .await;

    let state = ctx
        .handshake
        .signer()
        .verify(&relay_state(&location(&resp)), "hzdr", &fingerprint(), 300)
        .unwrap();
    assert_eq!(state.redirect_target, "/p?q=1");
}

#[actix_web::test]
async fn test_login_next_never_becomes_scheme_relative() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(
        &app,
        login_request(
            "/shibboleth/login/hzdr?next=http%3A%2F%2Fevil.example%2F%2Fevil2.example%2Fp%3Fq%3D1",
        )
        .to_request(),
    )
    .await;

    let state = ctx
        .handshake
        .signer()
        .verify(&relay_state(&location(&resp)), "hzdr", &fingerprint(), 300)
        .unwrap();
    assert_eq!(state.redirect_target, "/evil2.example/p?q=1");
    assert!(!state.redirect_target.starts_with("//"));
}

#[actix_web::test]
async fn test_login_keeps_allowed_host_in_next() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(
        &app,
        login_request("/shibboleth/login/hzdr?next=https%3A%2F%2Fallowed.example%2Fp%3Fq%3D1")
            .to_request(),
    )
    .await;

    let state = ctx
        .handshake
        .signer()
        .verify(&relay_state(&location(&resp)), "hzdr", &fingerprint(), 300)
        .unwrap();
    assert_eq!(state.redirect_target, "https://allowed.example/p?q=1");
}

#[actix_web::test]
async fn test_login_falls_back_to_referer() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let req = login_request("/shibboleth/login/hzdr")
        .insert_header(("Referer", "http://localhost:8080/records/42"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    let state = ctx
        .handshake
        .signer()
        .verify(&relay_state(&location(&resp)), "hzdr", &fingerprint(), 300)
        .unwrap();
    assert_eq!(state.redirect_target, "/records/42");
}

#[actix_web::test]
async fn test_relay_state_bound_to_provider() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, login_request("/shibboleth/login/hzdr").to_request()).await;
    let result = ctx
        .handshake
        .signer()
        .verify(&relay_state(&location(&resp)), "broken", &fingerprint(), 300);
    assert_eq!(result.unwrap_err(), StateTokenError::Mismatch);
}

// =============================================================================
// Bundled Toolkit
// =============================================================================

#[actix_web::test]
async fn test_settings_toolkit_builds_authn_request() {
    let ctx = TestContext::new(Arc::new(SettingsToolkit::new()), test_config());
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, login_request("/shibboleth/login/hzdr/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let url = url::Url::parse(&location(&resp)).unwrap();
    assert_eq!(url.host_str(), Some("idp.hzdr.de"));
    assert_eq!(url.path(), "/idp/profile/SAML2/Redirect/SSO");

    let saml_request = url
        .query_pairs()
        .find(|(k, _)| k == "SAMLRequest")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    // Raw DEFLATE output, not the XML itself.
    let compressed = BASE64_STANDARD.decode(saml_request).unwrap();
    assert!(!compressed.starts_with(b"<samlp:AuthnRequest"));
    assert!(!relay_state(url.as_str()).is_empty());
}
