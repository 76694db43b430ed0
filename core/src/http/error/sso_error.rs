use actix_web::http::header::LOCATION;
use actix_web::{error, http::StatusCode, HttpResponse, HttpResponseBuilder};
use derive_more::{Display, Error};

use crate::http::security::state_token::StateTokenError;

/// Failure of a single SSO request.
///
/// Every variant maps to exactly one HTTP outcome. State and assertion
/// failures render a generic body so a client cannot tell which validation
/// step rejected it.
#[derive(Debug, Display, Error)]
pub enum SsoError {
    /// No provider with this id is configured.
    #[display("unknown identity provider '{provider_id}'")]
    UnknownProvider { provider_id: String },

    /// The provider exists but lacks required settings.
    #[display("bad server configuration: {reason}")]
    BadServerConfig { reason: String },

    /// The SAML toolkit could not be initialised for this request.
    #[display("SAML toolkit error: {reason}")]
    SamlToolkit { reason: String },

    /// The SAML toolkit could not process the callback at all.
    #[display("SAML response could not be processed: {reason}")]
    SamlProcessing { reason: String },

    /// The toolkit processed the assertion and rejected it.
    #[display("assertion rejected")]
    AssertionInvalid { errors: Vec<String> },

    /// The relay state token failed verification.
    #[display("invalid state token: {_0}")]
    StateInvalid(StateTokenError),

    /// A mapped attribute was absent from the verified assertion.
    #[display("required attribute '{name}' missing from assertion")]
    MissingAttribute { name: String },

    /// The account store could not find, link or create the local account.
    #[display("account provisioning failed: {reason}")]
    AccountProvisioningFailed { reason: String, landing_page: String },

    /// The generated service provider metadata did not validate.
    #[display("invalid service provider metadata")]
    MetadataInvalid { errors: Vec<String> },
}

impl From<StateTokenError> for SsoError {
    fn from(err: StateTokenError) -> Self {
        SsoError::StateInvalid(err)
    }
}

impl SsoError {
    /// Body sent to the client. Never includes validation detail.
    fn public_message(&self) -> String {
        match self {
            SsoError::UnknownProvider { .. } => "Not Found".to_string(),
            SsoError::BadServerConfig { .. } => "Bad server configuration.".to_string(),
            SsoError::SamlToolkit { .. } | SsoError::MissingAttribute { .. } => {
                "Internal Server Error".to_string()
            }
            SsoError::SamlProcessing { .. } | SsoError::StateInvalid(_) => {
                "Bad Request".to_string()
            }
            SsoError::AssertionInvalid { .. } => "Forbidden".to_string(),
            SsoError::AccountProvisioningFailed { .. } => String::new(),
            SsoError::MetadataInvalid { errors } => errors.join(", "),
        }
    }
}

impl error::ResponseError for SsoError {
    fn status_code(&self) -> StatusCode {
        match *self {
            SsoError::UnknownProvider { .. } => StatusCode::NOT_FOUND,
            SsoError::BadServerConfig { .. }
            | SsoError::SamlToolkit { .. }
            | SsoError::MissingAttribute { .. }
            | SsoError::MetadataInvalid { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            SsoError::SamlProcessing { .. } | SsoError::StateInvalid(_) => StatusCode::BAD_REQUEST,
            SsoError::AssertionInvalid { .. } => StatusCode::FORBIDDEN,
            SsoError::AccountProvisioningFailed { .. } => StatusCode::FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            SsoError::AccountProvisioningFailed { landing_page, .. } => {
                HttpResponse::Found()
                    .insert_header((LOCATION, landing_page.as_str()))
                    .finish()
            }
            _ => HttpResponseBuilder::new(self.status_code()).body(self.public_message()),
        }
    }
}
