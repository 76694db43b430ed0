//! Assertion consumer service tests.
//!
//! Covers relay state checks, IdP verdicts, account provisioning and the
//! resulting session.


use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::test;

use actix_shibboleth_core::http::security::SecurityEventType;
use common::{
    callback_request, create_test_app, location, login_request, relay_state, session_cookie,
    test_config, FakeToolkit, TestContext, Verdict, OTHER_PEER,
};

/// Runs the login endpoint and returns the relay state it issued.
async fn issue_relay_state<S>(app: &S, uri: &str) -> String
where
    S: actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
    >,
{
    let resp = test::call_service(app, login_request(uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    relay_state(&location(&resp))
}

// =============================================================================
// Relay State
// =============================================================================

#[actix_web::test]
async fn test_callback_without_relay_state_goes_to_default() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, callback_request("fake", None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/");
}

#[actix_web::test]
async fn test_callback_redirects_to_relay_state_target() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let state = issue_relay_state(&app, "/shibboleth/login/hzdr/?next=/test/redirect").await;
    let resp = test::call_service(&app, callback_request("fake", Some(&state)).to_request()).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(location(&resp).ends_with("/test/redirect"));
}

#[actix_web::test]
async fn test_callback_rejects_tampered_relay_state() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let mut state = issue_relay_state(&app, "/shibboleth/login/hzdr/?next=/x").await;
    let last = state.pop().unwrap();
    state.push(if last == 'A' { 'B' } else { 'A' });

    let resp = test::call_service(&app, callback_request("fake", Some(&state)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(ctx
        .events
        .event_types()
        .contains(&SecurityEventType::InvalidStateToken));
    assert!(ctx.accounts.is_empty().await);
}

#[actix_web::test]
async fn test_callback_rejects_relay_state_from_other_client() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let state = issue_relay_state(&app, "/shibboleth/login/hzdr/").await;
    let req = callback_request("fake", Some(&state))
        .peer_addr(common::peer(OTHER_PEER))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(common::body_string(resp).await, "Bad Request");
}

#[actix_web::test]
async fn test_callback_with_state_check_disabled_falls_back() {
    let config = test_config().require_state_token(false);
    let ctx = TestContext::new(Arc::new(FakeToolkit::accepting()), config);
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(
        &app,
        callback_request("fake", Some("not-a-token")).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/");

    let types = ctx.events.event_types();
    assert!(types.contains(&SecurityEventType::StateCheckBypassed));
    assert!(types.contains(&SecurityEventType::AuthenticationSuccess));
}

// =============================================================================
// IdP Verdicts
// =============================================================================

#[actix_web::test]
async fn test_callback_rejected_assertion_is_forbidden() {
    let toolkit = FakeToolkit::with_verdict(Verdict::Reject("audience mismatch"));
    let ctx = TestContext::new(Arc::new(toolkit), test_config());
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, callback_request("fake", None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(common::body_string(resp).await, "Forbidden");

    let failures = ctx
        .events
        .get_events_by_type(&SecurityEventType::AuthenticationFailure);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].error.as_deref(), Some("audience mismatch"));
}

#[actix_web::test]
async fn test_callback_unprocessable_response_is_bad_request() {
    let toolkit = FakeToolkit::with_verdict(Verdict::Unprocessable);
    let ctx = TestContext::new(Arc::new(toolkit), test_config());
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, callback_request("fake", None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_callback_get_without_response_is_bad_request() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(
        &app,
        login_request("/shibboleth/authorized/hzdr/").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_callback_missing_attribute_is_server_error() {
    let mut attributes = common::jane_attributes();
    attributes.remove("eppn");
    let toolkit = FakeToolkit::with_verdict(Verdict::Accept(attributes));
    let ctx = TestContext::new(Arc::new(toolkit), test_config());
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, callback_request("fake", None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(ctx.accounts.is_empty().await);

    let failures = ctx
        .events
        .get_events_by_type(&SecurityEventType::AuthenticationFailure);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].error.as_deref(), Some("missing attribute 'eppn'"));
}

#[actix_web::test]
async fn test_callback_unknown_provider_not_found() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let req = test::TestRequest::post()
        .uri("/shibboleth/authorized/nope")
        .peer_addr(common::peer(common::PEER))
        .set_form(vec![("SAMLResponse", "fake")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Account Provisioning
// =============================================================================

#[actix_web::test]
async fn test_callback_creates_account_then_reuses_it() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, callback_request("fake", None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let accounts = ctx.accounts.all().await;
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].username, "jdoe");
    assert_eq!(accounts[0].email, "jane@hzdr.de");
    assert!(accounts[0].is_linked_to("hzdr", "jdoe@hzdr.de"));

    let resp = test::call_service(&app, callback_request("fake", None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(ctx.accounts.len().await, 1);

    let created = ctx
        .events
        .get_events_by_type(&SecurityEventType::AccountCreated);
    assert_eq!(created.len(), 1);
    assert_eq!(
        ctx.events
            .get_events_by_type(&SecurityEventType::AuthenticationSuccess)
            .len(),
        2
    );
}

#[actix_web::test]
async fn test_callback_links_existing_account_by_email() {
    let ctx = TestContext::fake();
    ctx.accounts
        .add_account("Jane@HZDR.de", "jane", "Jane Doe")
        .await
        .unwrap();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, callback_request("fake", None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let accounts = ctx.accounts.all().await;
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].username, "jane");
    assert!(accounts[0].is_linked_to("hzdr", "jdoe@hzdr.de"));
    assert!(ctx
        .events
        .event_types()
        .contains(&SecurityEventType::AccountLinked));
}

#[actix_web::test]
async fn test_callback_provisioning_failure_redirects_to_landing_page() {
    let ctx = TestContext::fake();
    ctx.accounts
        .add_account("someone.else@example.org", "jdoe", "Someone Else")
        .await
        .unwrap();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, callback_request("fake", None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/login");
    assert!(ctx
        .events
        .event_types()
        .contains(&SecurityEventType::AccountProvisioningFailed));
}

#[actix_web::test]
async fn test_callback_provisioning_failure_uses_configured_landing_page() {
    let config = test_config().unauthorized_url("/signup-closed");
    let ctx = TestContext::new(Arc::new(FakeToolkit::accepting()), config);
    ctx.accounts
        .add_account("someone.else@example.org", "jdoe", "Someone Else")
        .await
        .unwrap();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, callback_request("fake", None).to_request()).await;
    assert_eq!(location(&resp), "/signup-closed");
}

// =============================================================================
// Session
// =============================================================================

#[actix_web::test]
async fn test_callback_logs_account_into_session() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, callback_request("fake", None).to_request()).await;
    let cookie = session_cookie(&resp).expect("session cookie");

    let req = test::TestRequest::get().uri("/whoami").cookie(cookie).to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "jdoe");
}

#[actix_web::test]
async fn test_failed_callback_logs_out_previous_session() {
    let ctx = TestContext::fake();
    let app = create_test_app(&ctx).await;

    let resp = test::call_service(&app, callback_request("fake", None).to_request()).await;
    let cookie = session_cookie(&resp).expect("session cookie");

    let resp = test::call_service(
        &app,
        callback_request("fake", Some("forged.token"))
            .cookie(cookie)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let cookie = session_cookie(&resp).expect("updated session cookie");

    let req = test::TestRequest::get().uri("/whoami").cookie(cookie).to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "anonymous");
    assert!(ctx
        .events
        .event_types()
        .contains(&SecurityEventType::SessionInvalidated));
}
