//! Shibboleth/SAML single sign-on for actix-web.
//!
//! The crate signs a short-lived relay state, hands the SAML work to a
//! [`SamlToolkit`](http::security::SamlToolkit), maps the asserted attributes
//! onto a local account and logs it into an `actix-session` session.
//!
//! ```rust,ignore
//! use actix_shibboleth_core::http::security::{
//!     web, AuditLogger, InMemoryAccountStore, SettingsToolkit, ShibbolethConfig, SsoHandshake,
//! };
//!
//! let config = ShibbolethConfig::from_json_file("shibboleth.json")?;
//! let handshake = SsoHandshake::new(
//!     &config,
//!     Arc::new(SettingsToolkit::new()),
//!     Arc::new(InMemoryAccountStore::new()),
//! )?
//! .audit_logger(AuditLogger::with_tracing());
//! let handshake = actix_web::web::Data::new(handshake);
//!
//! HttpServer::new(move || {
//!     App::new()
//!         .wrap(SessionMiddleware::new(CookieSessionStore::default(), key.clone()))
//!         .app_data(handshake.clone())
//!         .configure(web::configure)
//! })
//! ```

pub mod http;
