//! Session handling for SSO logins.
//!
//! # Features
//! - Browser fingerprint bound into the relay state token
//! - Store the resolved local account in the session after a callback
//! - Session fixation protection (migrate, new session, or none)
//! - Integration with actix-session
//!
//! # Example
//! ```rust,ignore
//! use actix_shibboleth_core::http::security::session::{
//!     SessionConfig, SessionFixationStrategy, SessionLogin
//! };
//! use actix_session::SessionMiddleware;
//! use actix_session::storage::CookieSessionStore;
//!
//! let session_middleware = SessionMiddleware::new(
//!     CookieSessionStore::default(),
//!     cookie_key.clone()
//! );
//!
//! let login = SessionLogin::new(
//!     SessionConfig::new().fixation_strategy(SessionFixationStrategy::MigrateSession),
//! );
//!
//! App::new()
//!     .wrap(session_middleware)
//!     .app_data(web::Data::new(login))
//! ```

use actix_session::Session;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::http::security::account::LocalAccount;

/// Fingerprint of the browser session a state token is bound to.
///
/// Hex SHA-512 of `"{client_ip}|{user_agent}"`. Missing parts are hashed as
/// empty strings, so a client without a `User-Agent` still gets a stable
/// fingerprint.
pub fn session_fingerprint(client_ip: Option<&str>, user_agent: Option<&str>) -> String {
    let mut hasher = Sha512::new();
    hasher.update(client_ip.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(user_agent.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

// =============================================================================
// Session Fixation Strategy
// =============================================================================

/// Strategy for session fixation protection.
///
/// Applied every time an SSO callback logs a user in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionFixationStrategy {
    /// Create a new session and migrate all attributes from the old session.
    #[default]
    MigrateSession,

    /// Create a new session without migrating attributes.
    NewSession,

    /// No session fixation protection.
    /// **WARNING**: This is insecure and should only be used for testing.
    None,
}

// =============================================================================
// Session Account Data
// =============================================================================

/// Serializable account data stored in session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAccount {
    pub account_id: u64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    /// Provider that authenticated this session
    pub provider_id: String,
}

impl SessionAccount {
    pub fn from_account(account: &LocalAccount, provider_id: &str) -> Self {
        Self {
            account_id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            full_name: account.full_name.clone(),
            provider_id: provider_id.to_string(),
        }
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Session keys and fixation strategy.
///
/// # Example
/// ```rust,ignore
/// let config = SessionConfig::new()
///     .account_key("sso_account")
///     .fixation_strategy(SessionFixationStrategy::NewSession);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session key for the account data
    account_key: String,
    /// Session key for the authentication flag
    authenticated_key: String,
    fixation_strategy: SessionFixationStrategy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfig {
    /// Create a new session configuration with default keys.
    pub fn new() -> Self {
        Self {
            account_key: "shibboleth_account".to_string(),
            authenticated_key: "shibboleth_authenticated".to_string(),
            fixation_strategy: SessionFixationStrategy::MigrateSession,
        }
    }

    pub fn account_key(mut self, key: &str) -> Self {
        self.account_key = key.to_string();
        self
    }

    pub fn authenticated_key(mut self, key: &str) -> Self {
        self.authenticated_key = key.to_string();
        self
    }

    pub fn fixation_strategy(mut self, strategy: SessionFixationStrategy) -> Self {
        self.fixation_strategy = strategy;
        self
    }

    pub fn get_account_key(&self) -> &str {
        &self.account_key
    }

    pub fn get_authenticated_key(&self) -> &str {
        &self.authenticated_key
    }

    pub fn get_fixation_strategy(&self) -> SessionFixationStrategy {
        self.fixation_strategy
    }
}

// =============================================================================
// Session Login
// =============================================================================

/// Establishes and tears down the local session of an SSO user.
///
/// # Requirements
/// - `SessionMiddleware` must be configured in your application
#[derive(Debug, Clone, Default)]
pub struct SessionLogin {
    config: SessionConfig,
}

impl SessionLogin {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Store the account in the session with session fixation protection.
    ///
    /// This method:
    /// 1. Applies session fixation protection based on configuration
    /// 2. Stores account data in the session
    /// 3. Sets the authenticated flag
    pub fn login(
        &self,
        session: &Session,
        account: &LocalAccount,
        provider_id: &str,
    ) -> Result<SessionAccount, SessionError> {
        self.apply_fixation_protection(session);

        let session_account = SessionAccount::from_account(account, provider_id);
        session
            .insert(&self.config.account_key, &session_account)
            .map_err(|e| SessionError::InsertError(e.to_string()))?;
        session
            .insert(&self.config.authenticated_key, true)
            .map_err(|e| SessionError::InsertError(e.to_string()))?;

        Ok(session_account)
    }

    fn apply_fixation_protection(&self, session: &Session) {
        match self.config.fixation_strategy {
            SessionFixationStrategy::MigrateSession => session.renew(),
            // purge() would discard the inserts that follow
            SessionFixationStrategy::NewSession => {
                session.clear();
                session.renew();
            }
            SessionFixationStrategy::None => {}
        }
    }

    /// Remove the account from the session.
    pub fn logout(&self, session: &Session) {
        session.remove(&self.config.account_key);
        session.remove(&self.config.authenticated_key);
    }

    pub fn is_authenticated(&self, session: &Session) -> bool {
        session
            .get::<bool>(&self.config.authenticated_key)
            .ok()
            .flatten()
            .unwrap_or(false)
    }

    /// Account stored by the last successful login, if any.
    pub fn current_account(&self, session: &Session) -> Option<SessionAccount> {
        if !self.is_authenticated(session) {
            return None;
        }
        session
            .get::<SessionAccount>(&self.config.account_key)
            .ok()
            .flatten()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

// =============================================================================
// Session Error
// =============================================================================

/// Session-related errors.
#[derive(Debug)]
pub enum SessionError {
    /// Error inserting data into session
    InsertError(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::InsertError(e) => write!(f, "Session insert error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}
