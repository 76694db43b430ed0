//! Shibboleth/SAML single sign-on.
//!
//! # Module Structure
//!
//! - `state_token` - Signed relay state carried through the IdP round trip
//! - `redirect` - Post-login redirect allow-list
//! - `provider` - Configuration and the immutable provider table
//! - `saml` - SAML toolkit contract and the bundled settings-file toolkit
//! - `account` - Attribute mapping and local account resolution
//! - `session` - Browser fingerprint and session login with fixation protection
//! - `audit` - Security audit events
//! - `handshake` - Login, callback and metadata orchestration
//! - `web` - actix-web routes

pub mod account;
pub mod audit;
pub mod handshake;
pub mod provider;
pub mod redirect;
pub mod saml;
pub mod session;
pub mod state_token;
pub mod web;

// Re-exports for convenience
pub use account::{
    AccountError, AccountResolution, AccountStore, ExternalIdentity, InMemoryAccountStore,
    LocalAccount,
};
pub use audit::{
    AuditLogger, InMemoryEventStore, SecurityEvent, SecurityEventHandler, SecurityEventSeverity,
    SecurityEventType, TracingHandler,
};
pub use handshake::{CallbackOutcome, SsoHandshake, SsoRequest};
pub use provider::{
    AttributeMapping, ConfigError, IdentityProviderConfig, ProviderRegistry, RemoteAppConfig,
    ShibbolethConfig,
};
pub use redirect::RedirectValidator;
pub use saml::{
    CallbackVerification, SamlAuth, SamlError, SamlRequest, SamlToolkit, ServiceMetadata,
    SettingsToolkit, SignatureVerifier,
};
pub use session::{
    session_fingerprint, SessionAccount, SessionConfig, SessionError, SessionFixationStrategy,
    SessionLogin,
};
pub use state_token::{StateToken, StateTokenError, StateTokenSigner};
