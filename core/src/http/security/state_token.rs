//! Signed relay-state tokens.
//!
//! The state token carries the provider id, the browser session fingerprint
//! and the post-login redirect target through the IdP round trip. Nothing is
//! stored server-side: the HMAC is the only integrity guarantee, so every
//! instance behind a load balancer must share the same secret.
//!
//! # Token format
//!
//! ```text
//! base64url(json payload) "." base64url(HMAC-SHA256(secret, encoded payload))
//! ```
//!
//! # Example
//! ```
//! use actix_shibboleth_core::http::security::state_token::StateTokenSigner;
//!
//! let signer = StateTokenSigner::new("change-me").unwrap();
//! let token = signer.issue("idp1", "fingerprint", "/dashboard");
//!
//! let state = signer.verify(&token, "idp1", "fingerprint", 300).unwrap();
//! assert_eq!(state.redirect_target, "/dashboard");
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use derive_more::{Display, Error};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::http::security::provider::ConfigError;

type HmacSha256 = Hmac<Sha256>;

/// Default state token lifetime in seconds.
pub const DEFAULT_STATE_EXPIRES: u64 = 300;

const SEPARATOR: char = '.';

/// Decoded contents of a verified state token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateToken {
    #[serde(rename = "app")]
    pub provider_id: String,
    #[serde(rename = "sid")]
    pub session_fingerprint: String,
    #[serde(rename = "next")]
    pub redirect_target: String,
    #[serde(rename = "iat")]
    pub issued_at: u64,
}

/// Why a state token was rejected.
///
/// Callers may branch on the kind for logging, but all kinds surface to the
/// client as the same generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum StateTokenError {
    #[display("malformed state token")]
    Malformed,
    #[display("state token signature mismatch")]
    BadSignature,
    #[display("state token expired")]
    Expired,
    #[display("state token does not match this request")]
    Mismatch,
}

/// Issues and verifies state tokens with a process-wide secret.
///
/// Built once at startup and shared by reference.
#[derive(Clone)]
pub struct StateTokenSigner {
    mac: HmacSha256,
}

impl StateTokenSigner {
    /// Create a signer keyed with `secret`.
    ///
    /// An empty secret is rejected.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| ConfigError::EmptySecret)?;
        Ok(Self { mac })
    }

    /// Issue a token stamped with the current time.
    pub fn issue(&self, provider_id: &str, session_fingerprint: &str, redirect_target: &str) -> String {
        self.issue_at(provider_id, session_fingerprint, redirect_target, now_secs())
    }

    /// Issue a token stamped with `issued_at` (seconds since the UNIX epoch).
    pub fn issue_at(
        &self,
        provider_id: &str,
        session_fingerprint: &str,
        redirect_target: &str,
        issued_at: u64,
    ) -> String {
        let state = StateToken {
            provider_id: provider_id.to_string(),
            session_fingerprint: session_fingerprint.to_string(),
            redirect_target: redirect_target.to_string(),
            issued_at,
        };
        // Serializing a struct of strings and integers cannot fail.
        let payload = serde_json::to_vec(&state).unwrap_or_default();
        let encoded = URL_SAFE_NO_PAD.encode(payload);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(encoded.as_bytes()));
        format!("{}{}{}", encoded, SEPARATOR, signature)
    }

    /// Verify `token` against the current time.
    pub fn verify(
        &self,
        token: &str,
        expected_provider_id: &str,
        expected_session_fingerprint: &str,
        max_age_seconds: u64,
    ) -> Result<StateToken, StateTokenError> {
        self.verify_at(
            token,
            expected_provider_id,
            expected_session_fingerprint,
            max_age_seconds,
            now_secs(),
        )
    }

    /// Verify `token` as if the current time were `now`.
    ///
    /// Checks run in order: structure, signature, payload, age, binding.
    /// A token exactly `max_age_seconds` old is still accepted.
    pub fn verify_at(
        &self,
        token: &str,
        expected_provider_id: &str,
        expected_session_fingerprint: &str,
        max_age_seconds: u64,
        now: u64,
    ) -> Result<StateToken, StateTokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(StateTokenError::Malformed);
        }

        let (encoded, signature) = token
            .split_once(SEPARATOR)
            .ok_or(StateTokenError::Malformed)?;
        if encoded.is_empty() || signature.contains(SEPARATOR) {
            return Err(StateTokenError::Malformed);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| StateTokenError::Malformed)?;
        let expected = self.sign(encoded.as_bytes());
        if !bool::from(expected.as_slice().ct_eq(signature.as_slice())) {
            return Err(StateTokenError::BadSignature);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| StateTokenError::Malformed)?;
        let state: StateToken =
            serde_json::from_slice(&payload).map_err(|_| StateTokenError::Malformed)?;

        if now.saturating_sub(state.issued_at) > max_age_seconds {
            return Err(StateTokenError::Expired);
        }

        if state.provider_id != expected_provider_id
            || state.session_fingerprint != expected_session_fingerprint
        {
            return Err(StateTokenError::Mismatch);
        }

        Ok(state)
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

impl fmt::Debug for StateTokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTokenSigner").finish_non_exhaustive()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
