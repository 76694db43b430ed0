//! Error types surfaced by the SSO endpoints.

pub mod sso_error;

pub use sso_error::SsoError;
