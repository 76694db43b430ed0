//! actix-web routes for the SSO endpoints.
//!
//! | Route | Methods | Success |
//! |---|---|---|
//! | `/login/{provider_id}` | GET, POST | 302 to the IdP |
//! | `/authorized/{provider_id}` | GET, POST | 302 to the post-login target |
//! | `/metadata/{provider_id}` | GET | 200 `text/xml` |
//!
//! Failures are rendered by [`SsoError`]'s `ResponseError` implementation.
//! The handlers expect an [`SsoHandshake`] in app data and `SessionMiddleware`
//! around the scope.
//!
//! # Example
//! ```rust,ignore
//! App::new()
//!     .wrap(SessionMiddleware::new(CookieSessionStore::default(), key))
//!     .app_data(web::Data::new(handshake))
//!     .configure(actix_shibboleth_core::http::security::web::configure)
//! ```

use std::collections::HashMap;

use actix_session::Session;
use actix_web::http::header::{LOCATION, REFERER};
use actix_web::{web, HttpRequest, HttpResponse};

use crate::http::error::SsoError;
use crate::http::security::handshake::{SsoHandshake, SsoRequest};

/// Path the routes are mounted under by [`configure`].
pub const DEFAULT_SCOPE: &str = "/shibboleth";

/// Mounts the SSO routes under [`DEFAULT_SCOPE`].
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(scope(DEFAULT_SCOPE));
}

/// The SSO routes under a custom path.
pub fn scope(path: &str) -> actix_web::Scope {
    web::scope(path)
        .service(
            web::resource(["/login/{provider_id}", "/login/{provider_id}/"])
                .route(web::get().to(login))
                .route(web::post().to(login)),
        )
        .service(
            web::resource(["/authorized/{provider_id}", "/authorized/{provider_id}/"])
                .route(web::get().to(authorized))
                .route(web::post().to(authorized)),
        )
        .service(web::resource("/metadata/{provider_id}").route(web::get().to(metadata)))
}

/// Redirects the browser to the IdP.
///
/// The post-login target is the `next` query parameter, or the `Referer`
/// header when there is none.
pub async fn login(
    req: HttpRequest,
    path: web::Path<String>,
    handshake: web::Data<SsoHandshake>,
) -> Result<HttpResponse, SsoError> {
    let provider_id = path.into_inner();
    let request = SsoRequest::from_http_request(&req, HashMap::new());

    let next = request.saml.get_data.get("next").cloned().or_else(|| {
        req.headers()
            .get(REFERER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    let url = handshake.init_login(&provider_id, &request, next.as_deref())?;
    Ok(HttpResponse::Found()
        .insert_header((LOCATION, url))
        .finish())
}

/// Assertion consumer service.
pub async fn authorized(
    req: HttpRequest,
    path: web::Path<String>,
    form: Option<web::Form<HashMap<String, String>>>,
    session: Session,
    handshake: web::Data<SsoHandshake>,
) -> Result<HttpResponse, SsoError> {
    let provider_id = path.into_inner();
    let form = form.map(web::Form::into_inner).unwrap_or_default();
    let request = SsoRequest::from_http_request(&req, form);

    let outcome = handshake
        .complete_callback(&provider_id, &request, &session)
        .await?;
    Ok(HttpResponse::Found()
        .insert_header((LOCATION, outcome.redirect_to))
        .finish())
}

/// Service provider metadata.
pub async fn metadata(
    req: HttpRequest,
    path: web::Path<String>,
    handshake: web::Data<SsoHandshake>,
) -> Result<HttpResponse, SsoError> {
    let provider_id = path.into_inner();
    let request = SsoRequest::from_http_request(&req, HashMap::new());

    let xml = handshake.metadata(&provider_id, &request)?;
    Ok(HttpResponse::Ok().content_type("text/xml").body(xml))
}
