//! SSO handshake orchestration.
//!
//! [`SsoHandshake`] drives the three SSO operations for a provider:
//!
//! - [`SsoHandshake::init_login`]: sign a relay state and build the IdP redirect
//! - [`SsoHandshake::complete_callback`]: verify the assertion and relay state,
//!   resolve the local account and log it into the session
//! - [`SsoHandshake::metadata`]: generate the SP metadata
//!
//! No state is kept between login and callback. The relay state token carries
//! the provider id, the browser fingerprint and the post-login target, and its
//! signature is the only integrity guarantee.
//!
//! # Example
//! ```rust,ignore
//! let handshake = SsoHandshake::new(&config, Arc::new(SettingsToolkit::new()), store)?
//!     .audit_logger(AuditLogger::with_tracing());
//!
//! App::new()
//!     .wrap(SessionMiddleware::new(CookieSessionStore::default(), key))
//!     .app_data(web::Data::new(handshake))
//!     .configure(web::configure)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use actix_session::Session;
use actix_web::http::header::USER_AGENT;
use actix_web::HttpRequest;
use tracing::{debug, info, instrument, warn};

use crate::http::error::SsoError;
use crate::http::security::account::{self, AccountError, AccountResolution, AccountStore};
use crate::http::security::audit::{AuditLogger, SecurityEvent};
use crate::http::security::provider::{
    ConfigError, IdentityProviderConfig, ProviderRegistry, ShibbolethConfig,
};
use crate::http::security::saml::{SamlAuth, SamlRequest, SamlToolkit};
use crate::http::security::session::{session_fingerprint, SessionAccount, SessionLogin};
use crate::http::security::state_token::StateTokenSigner;

// =============================================================================
// Request context
// =============================================================================

/// An inbound SSO request: the SAML view plus the browser identity.
#[derive(Debug, Clone, Default)]
pub struct SsoRequest {
    pub saml: SamlRequest,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl SsoRequest {
    /// Describes `req`, with `form` taken from its parsed body.
    pub fn from_http_request(req: &HttpRequest, form: HashMap<String, String>) -> Self {
        Self {
            saml: SamlRequest::from_http_request(req, form),
            client_ip: req.peer_addr().map(|addr| addr.ip().to_string()),
            user_agent: req
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }

    /// Fingerprint of the browser session behind this request.
    pub fn fingerprint(&self) -> String {
        session_fingerprint(self.client_ip.as_deref(), self.user_agent.as_deref())
    }

    fn annotate(&self, event: SecurityEvent) -> SecurityEvent {
        let mut event = event.path(self.saml.script_name.clone());
        if let Some(ip) = &self.client_ip {
            event = event.ip_address(ip.clone());
        }
        if let Some(ua) = &self.user_agent {
            event = event.user_agent(ua.clone());
        }
        event
    }
}

/// Result of a completed callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackOutcome {
    /// Where to send the browser next
    pub redirect_to: String,
    /// Account now stored in the session
    pub account: SessionAccount,
}

// =============================================================================
// Handshake
// =============================================================================

/// Coordinates the SAML toolkit, the state token signer and the account store.
///
/// Built once at startup and shared between workers.
pub struct SsoHandshake {
    registry: ProviderRegistry,
    signer: StateTokenSigner,
    toolkit: Arc<dyn SamlToolkit>,
    accounts: Arc<dyn AccountStore>,
    session_login: SessionLogin,
    audit: AuditLogger,
    state_expires: u64,
    require_state_token: bool,
    default_redirect: String,
    unauthorized_url: String,
}

impl SsoHandshake {
    /// Validates `config` and builds the provider table and signer from it.
    pub fn new(
        config: &ShibbolethConfig,
        toolkit: Arc<dyn SamlToolkit>,
        accounts: Arc<dyn AccountStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if !config.require_state_token {
            warn!("state token verification is disabled; do not run this in production");
        }

        Ok(Self {
            registry: ProviderRegistry::from_config(config),
            signer: StateTokenSigner::new(&config.secret_key)?,
            toolkit,
            accounts,
            session_login: SessionLogin::default(),
            audit: AuditLogger::new(),
            state_expires: config.state_expires,
            require_state_token: config.require_state_token,
            default_redirect: config.default_redirect.clone(),
            unauthorized_url: config.unauthorized_url.clone(),
        })
    }

    pub fn session_login(mut self, session_login: SessionLogin) -> Self {
        self.session_login = session_login;
        self
    }

    pub fn audit_logger(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn signer(&self) -> &StateTokenSigner {
        &self.signer
    }

    pub fn get_session_login(&self) -> &SessionLogin {
        &self.session_login
    }

    /// Builds the IdP redirect URL for a login request.
    ///
    /// `next` is the requested post-login target. Foreign hosts are reduced to
    /// their path and query; an absent target becomes the default redirect.
    #[instrument(skip(self, request, next))]
    pub fn init_login(
        &self,
        provider_id: &str,
        request: &SsoRequest,
        next: Option<&str>,
    ) -> Result<String, SsoError> {
        let provider = self.registry.get(provider_id)?;
        let auth = self.init_toolkit(&provider, request)?;

        let target = match next.filter(|n| !n.is_empty()) {
            Some(next) => provider.redirect_validator().sanitize(Some(next)),
            None => self.default_redirect.clone(),
        };
        let relay_state = self
            .signer
            .issue(provider_id, &request.fingerprint(), &target);

        let url = auth
            .build_login_redirect(&relay_state)
            .map_err(|e| SsoError::SamlToolkit {
                reason: e.to_string(),
            })?;

        debug!(target_url = %target, "issued relay state");
        self.audit.log(
            request.annotate(SecurityEvent::login_initiated(provider_id).detail("next", target)),
        );
        Ok(url)
    }

    /// Handles the IdP callback and logs the resolved account in.
    ///
    /// Any authenticated session is logged out first, so a failed callback
    /// never leaves the previous identity in place.
    #[instrument(skip(self, request, session))]
    pub async fn complete_callback(
        &self,
        provider_id: &str,
        request: &SsoRequest,
        session: &Session,
    ) -> Result<CallbackOutcome, SsoError> {
        if self.session_login.is_authenticated(session) {
            self.session_login.logout(session);
            debug!("logged out existing session before callback");
            self.audit
                .log(request.annotate(SecurityEvent::session_invalidated(provider_id)));
        }

        let provider = self.registry.get(provider_id)?;
        let auth = self.init_toolkit(&provider, request)?;

        let verification = auth.verify_callback().map_err(|e| {
            warn!(error = %e, "SAML response could not be processed");
            self.audit.log(request.annotate(SecurityEvent::authentication_failure(
                provider_id,
                &e.to_string(),
            )));
            SsoError::SamlProcessing {
                reason: e.to_string(),
            }
        })?;

        if !verification.is_valid() {
            let reason = verification
                .error_reason
                .clone()
                .unwrap_or_else(|| "not authenticated".to_string());
            warn!(errors = ?verification.errors, reason = %reason, "assertion rejected");
            self.audit.log(request.annotate(
                SecurityEvent::authentication_failure(provider_id, &reason)
                    .detail("errors", verification.errors.join(",")),
            ));
            return Err(SsoError::AssertionInvalid {
                errors: verification.errors,
            });
        }

        let redirect_to = self.check_relay_state(&provider, request)?;

        let identity =
            account::resolve(&verification.attributes, &provider.attribute_mapping, provider_id)
                .map_err(|e| match e {
                    AccountError::MissingAttribute { name } => {
                        warn!(attribute = %name, "mapped attribute missing from assertion");
                        self.audit.log(request.annotate(SecurityEvent::authentication_failure(
                            provider_id,
                            &format!("missing attribute '{}'", name),
                        )));
                        SsoError::MissingAttribute { name }
                    }
                    other => self.provisioning_failed(provider_id, request, other.to_string()),
                })?;

        let resolution = account::resolve_local_account(self.accounts.as_ref(), &identity)
            .await
            .map_err(|e| self.provisioning_failed(provider_id, request, e.to_string()))?;

        match &resolution {
            AccountResolution::Existing(_) => {}
            AccountResolution::LinkedByEmail(account) => {
                warn!(
                    username = %account.username,
                    external_id = %identity.external_id,
                    "linked external identity to existing account by email"
                );
                self.audit.log(request.annotate(SecurityEvent::account_linked(
                    provider_id,
                    &account.username,
                    &identity.external_id,
                )));
            }
            AccountResolution::Created(account) => {
                info!(username = %account.username, "registered new account");
                self.audit.log(request.annotate(SecurityEvent::account_created(
                    provider_id,
                    &account.username,
                    &identity.external_id,
                )));
            }
        }

        let account = self
            .session_login
            .login(session, resolution.account(), provider_id)
            .map_err(|e| self.provisioning_failed(provider_id, request, e.to_string()))?;

        info!(username = %account.username, redirect_to = %redirect_to, "SSO login complete");
        self.audit.log(request.annotate(SecurityEvent::authentication_success(
            provider_id,
            &account.username,
        )));

        Ok(CallbackOutcome {
            redirect_to,
            account,
        })
    }

    /// Service provider metadata XML for a provider.
    #[instrument(skip(self, request))]
    pub fn metadata(&self, provider_id: &str, request: &SsoRequest) -> Result<String, SsoError> {
        let provider = self.registry.get(provider_id)?;
        let auth = self.init_toolkit(&provider, request)?;

        let metadata = auth.build_service_metadata();
        if !metadata.errors.is_empty() {
            warn!(errors = ?metadata.errors, "service provider metadata invalid");
            return Err(SsoError::MetadataInvalid {
                errors: metadata.errors,
            });
        }
        Ok(metadata.xml)
    }

    fn init_toolkit(
        &self,
        provider: &IdentityProviderConfig,
        request: &SsoRequest,
    ) -> Result<Box<dyn SamlAuth>, SsoError> {
        let saml_path = provider.trust_anchor_path()?;
        self.toolkit.init(&request.saml, saml_path).map_err(|e| {
            warn!(error = %e, "SAML toolkit initialisation failed");
            SsoError::SamlToolkit {
                reason: e.to_string(),
            }
        })
    }

    /// Post-login target carried by the relay state.
    ///
    /// An absent relay state yields the default redirect. A present one must
    /// verify, unless state checking is disabled.
    fn check_relay_state(
        &self,
        provider: &IdentityProviderConfig,
        request: &SsoRequest,
    ) -> Result<String, SsoError> {
        let Some(relay_state) = request.saml.param("RelayState") else {
            return Ok(self.default_redirect.clone());
        };

        match self.signer.verify(
            relay_state,
            &provider.id,
            &request.fingerprint(),
            self.state_expires,
        ) {
            Ok(state) => Ok(state.redirect_target),
            Err(kind) if self.require_state_token => {
                warn!(kind = %kind, "relay state rejected");
                self.audit.log(request.annotate(SecurityEvent::invalid_state_token(
                    &provider.id,
                    &format!("{:?}", kind),
                )));
                Err(SsoError::StateInvalid(kind))
            }
            Err(kind) => {
                warn!(kind = %kind, "relay state rejected, continuing because state checks are disabled");
                self.audit.log(request.annotate(SecurityEvent::state_check_bypassed(
                    &provider.id,
                    &format!("{:?}", kind),
                )));
                Ok(self.default_redirect.clone())
            }
        }
    }

    fn provisioning_failed(
        &self,
        provider_id: &str,
        request: &SsoRequest,
        reason: String,
    ) -> SsoError {
        warn!(reason = %reason, "account provisioning failed");
        self.audit.log(request.annotate(SecurityEvent::account_provisioning_failed(
            provider_id,
            &reason,
        )));
        SsoError::AccountProvisioningFailed {
            reason,
            landing_page: self.unauthorized_url.clone(),
        }
    }
}

impl std::fmt::Debug for SsoHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoHandshake")
            .field("registry", &self.registry)
            .field("state_expires", &self.state_expires)
            .field("require_state_token", &self.require_state_token)
            .finish_non_exhaustive()
    }
}
