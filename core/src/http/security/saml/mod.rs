//! SAML 2.0 toolkit boundary.
//!
//! The SSO endpoints never parse SAML themselves. They describe the inbound
//! request as a [`SamlRequest`], hand it to a [`SamlToolkit`] together with the
//! provider's settings directory, and interpret the verdict of the resulting
//! [`SamlAuth`]:
//!
//! - [`SamlAuth::build_login_redirect`]: URL of the IdP carrying the relay state
//! - [`SamlAuth::verify_callback`]: errors, authentication flag and attributes
//! - [`SamlAuth::build_service_metadata`]: SP metadata XML and its errors
//!
//! [`SettingsToolkit`] is the bundled implementation, driven by a
//! python3-saml style `settings.json`. It does not verify XML signatures
//! itself; see its docs.
//!
//! # Example
//!
//! ```rust,ignore
//! let toolkit = SettingsToolkit::new();
//! let auth = toolkit.init(&SamlRequest::from_http_request(&req, form), saml_path)?;
//! let url = auth.build_login_redirect(&relay_state)?;
//! ```

use std::collections::HashMap;
use std::path::Path;

use actix_web::web::Query;
use actix_web::HttpRequest;

mod settings;
mod toolkit;
mod xml;

pub use settings::{
    ContactPerson, Endpoint, IdpSettings, Organization, SamlSettings, SecuritySettings,
    SpSettings, ADVANCED_SETTINGS_FILE, SETTINGS_FILE,
};
pub use toolkit::{
    AuthnRequest, SamlAssertion, SamlResponse, SettingsAuth, SettingsToolkit, SignatureVerifier,
};

// =============================================================================
// Protocol constants
// =============================================================================

/// SAML 2.0 binding types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamlBinding {
    /// HTTP Redirect binding (GET with query parameters)
    #[default]
    HttpRedirect,
    /// HTTP POST binding (form submission)
    HttpPost,
}

impl SamlBinding {
    /// Get the URN for this binding
    pub fn as_urn(&self) -> &'static str {
        match self {
            SamlBinding::HttpRedirect => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect",
            SamlBinding::HttpPost => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST",
        }
    }
}

/// SAML status codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamlStatusCode {
    Success,
    Requester,
    Responder,
    VersionMismatch,
    AuthnFailed,
    InvalidNameIdPolicy,
    NoAuthnContext,
    Unknown(String),
}

impl SamlStatusCode {
    /// Parse status code from URN
    pub fn from_urn(urn: &str) -> Self {
        match urn {
            "urn:oasis:names:tc:SAML:2.0:status:Success" => SamlStatusCode::Success,
            "urn:oasis:names:tc:SAML:2.0:status:Requester" => SamlStatusCode::Requester,
            "urn:oasis:names:tc:SAML:2.0:status:Responder" => SamlStatusCode::Responder,
            "urn:oasis:names:tc:SAML:2.0:status:VersionMismatch" => SamlStatusCode::VersionMismatch,
            "urn:oasis:names:tc:SAML:2.0:status:AuthnFailed" => SamlStatusCode::AuthnFailed,
            "urn:oasis:names:tc:SAML:2.0:status:InvalidNameIDPolicy" => {
                SamlStatusCode::InvalidNameIdPolicy
            }
            "urn:oasis:names:tc:SAML:2.0:status:NoAuthnContext" => SamlStatusCode::NoAuthnContext,
            other => SamlStatusCode::Unknown(other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SamlStatusCode::Success)
    }
}

// =============================================================================
// Request description
// =============================================================================

/// Inbound HTTP request as seen by the SAML toolkit.
#[derive(Debug, Clone, Default)]
pub struct SamlRequest {
    pub https: bool,
    /// Host header value, possibly with port
    pub http_host: String,
    pub server_port: Option<u16>,
    /// Request path
    pub script_name: String,
    /// Query parameters
    pub get_data: HashMap<String, String>,
    /// Form parameters
    pub post_data: HashMap<String, String>,
}

impl SamlRequest {
    /// Describes `req`, with `post_data` taken from its parsed form body.
    pub fn from_http_request(req: &HttpRequest, post_data: HashMap<String, String>) -> Self {
        let conn = req.connection_info();
        let http_host = conn.host().to_string();
        let server_port = http_host
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok());
        let get_data = Query::<HashMap<String, String>>::from_query(req.query_string())
            .map(Query::into_inner)
            .unwrap_or_default();

        Self {
            https: conn.scheme() == "https",
            http_host,
            server_port,
            script_name: req.path().to_string(),
            get_data,
            post_data,
        }
    }

    /// Request URL without the query string.
    pub fn self_url_no_query(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        let default_port = if self.https { 443 } else { 80 };
        let host_has_port = self.http_host.contains(':');
        match self.server_port {
            Some(port) if port != default_port && !host_has_port => {
                format!("{}://{}:{}{}", scheme, self.http_host, port, self.script_name)
            }
            _ => format!("{}://{}{}", scheme, self.http_host, self.script_name),
        }
    }

    /// Form parameter, falling back to the query string.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.post_data
            .get(name)
            .or_else(|| self.get_data.get(name))
            .map(String::as_str)
    }
}

// =============================================================================
// Toolkit contract
// =============================================================================

/// Creates per-request SAML handles for a provider.
pub trait SamlToolkit: Send + Sync {
    /// Loads the provider settings from `saml_path` and binds them to `request`.
    fn init(&self, request: &SamlRequest, saml_path: &Path)
        -> Result<Box<dyn SamlAuth>, SamlError>;
}

/// SAML operations for one request against one provider.
pub trait SamlAuth: Send {
    /// URL of the IdP single sign-on service carrying `relay_state`.
    fn build_login_redirect(&self, relay_state: &str) -> Result<String, SamlError>;

    /// Processes the IdP response contained in the request.
    ///
    /// `Err` means the response could not be processed at all. A response that
    /// was processed and rejected is `Ok` with a non-empty `errors`.
    fn verify_callback(&self) -> Result<CallbackVerification, SamlError>;

    /// Service provider metadata for this provider.
    fn build_service_metadata(&self) -> ServiceMetadata;
}

/// Verdict on an IdP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackVerification {
    pub errors: Vec<String>,
    /// Detail for the last error. Logged, never sent to the client.
    pub error_reason: Option<String>,
    pub authenticated: bool,
    pub attributes: HashMap<String, Vec<String>>,
    pub name_id: Option<String>,
    pub session_index: Option<String>,
}

impl CallbackVerification {
    /// Accepted assertion.
    pub fn accepted(attributes: HashMap<String, Vec<String>>, name_id: Option<String>) -> Self {
        Self {
            authenticated: true,
            attributes,
            name_id,
            ..Default::default()
        }
    }

    /// Rejected assertion with one error code and its reason.
    pub fn rejected(error: &str, reason: impl Into<String>) -> Self {
        Self {
            errors: vec![error.to_string()],
            error_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.authenticated
    }
}

/// Generated service provider metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceMetadata {
    pub xml: String,
    pub errors: Vec<String>,
}

// =============================================================================
// Errors
// =============================================================================

/// SAML toolkit error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamlError {
    /// Settings are present but unusable for the requested operation
    Configuration(String),
    /// The IdP response could not be processed
    Processing(String),
    /// Settings files are missing or unreadable
    Settings(String),
}

impl std::fmt::Display for SamlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamlError::Configuration(msg) => write!(f, "SAML configuration error: {}", msg),
            SamlError::Processing(msg) => write!(f, "SAML response processing error: {}", msg),
            SamlError::Settings(msg) => write!(f, "SAML settings error: {}", msg),
        }
    }
}

impl std::error::Error for SamlError {}
