//! Shibboleth SSO demo application.
//!
//! Reads the configuration from `$SHIBBOLETH_CONFIG` (default
//! `shibboleth.json`; `saml_path` entries are resolved against the working
//! directory) and serves the SSO routes under `/shibboleth`.
//!
//! No XML signature verifier ships with the demo, so every callback is
//! refused. Setting `SHIBBOLETH_INSECURE_ACCEPT_UNSIGNED=1` accepts unsigned
//! responses against a local test IdP; never set it in production.
//!
//! ```text
//! RUST_LOG=info,security_audit=info cargo run -p actix-shibboleth-test
//! ```

use std::io;
use std::sync::Arc;

use actix_session::storage::CookieSessionStore;
use actix_session::{Session, SessionMiddleware};
use actix_web::cookie::Key;
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use tracing_subscriber::EnvFilter;

use actix_shibboleth_core::http::security::{
    web as sso, AuditLogger, InMemoryAccountStore, SettingsToolkit, ShibbolethConfig,
    SsoHandshake,
};

#[get("/")]
async fn home(session: Session, handshake: web::Data<SsoHandshake>) -> impl Responder {
    match handshake.get_session_login().current_account(&session) {
        Some(account) => HttpResponse::Ok().body(format!(
            "Welcome, {} <{}> (via {})",
            account.full_name, account.email, account.provider_id
        )),
        None => HttpResponse::Ok().body("Not logged in. Try /login"),
    }
}

#[get("/login")]
async fn login_page(handshake: web::Data<SsoHandshake>) -> impl Responder {
    let mut ids: Vec<&str> = handshake.registry().ids().collect();
    ids.sort_unstable();
    let links: Vec<String> = ids
        .iter()
        .map(|id| format!("{}/login/{}/?next=/", sso::DEFAULT_SCOPE, id))
        .collect();
    HttpResponse::Ok().body(links.join("\n"))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("SHIBBOLETH_CONFIG").unwrap_or_else(|_| "shibboleth.json".to_string());
    let config = ShibbolethConfig::from_json_file(&config_path)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let accept_unsigned = std::env::var("SHIBBOLETH_INSECURE_ACCEPT_UNSIGNED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if accept_unsigned {
        tracing::warn!("accepting unsigned SAML responses; do not use outside local testing");
    }
    let toolkit = SettingsToolkit::new().insecure_accept_unsigned(accept_unsigned);

    let handshake = SsoHandshake::new(
        &config,
        Arc::new(toolkit),
        Arc::new(InMemoryAccountStore::new()),
    )
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?
    .audit_logger(AuditLogger::with_tracing());
    let handshake = web::Data::new(handshake);

    tracing::info!(
        config = %config_path,
        providers = handshake.registry().len(),
        "starting SSO demo on http://127.0.0.1:8080"
    );

    // Sessions do not survive a restart.
    let key = Key::generate();

    HttpServer::new(move || {
        App::new()
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), key.clone())
                    .cookie_secure(false)
                    .build(),
            )
            .app_data(handshake.clone())
            .service(home)
            .service(login_page)
            .configure(sso::configure)
    })
    .bind("127.0.0.1:8080")?
    .run()
    .await
}
