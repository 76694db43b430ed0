//! Identity provider configuration.
//!
//! `ShibbolethConfig` is the deserializable configuration of the whole SSO
//! surface. At startup it is turned into a `ProviderRegistry`, an immutable
//! table consulted on every request by provider id.
//!
//! # Example
//! ```
//! use actix_shibboleth_core::http::security::provider::{
//!     AttributeMapping, ProviderRegistry, RemoteAppConfig, ShibbolethConfig,
//! };
//!
//! let config = ShibbolethConfig::new("change-me")
//!     .state_expires(600)
//!     .allowed_host("hzdr.de")
//!     .remote_app(
//!         "hzdr",
//!         RemoteAppConfig::new("HZDR")
//!             .saml_path("/etc/shibboleth/hzdr")
//!             .mappings(AttributeMapping::new("mail", "cn", "eppn")),
//!     );
//!
//! let registry = ProviderRegistry::from_config(&config);
//! assert!(registry.get("hzdr").is_ok());
//! assert!(registry.get("unknown").is_err());
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::http::error::SsoError;
use crate::http::security::redirect::{RedirectValidator, DEFAULT_REDIRECT};
use crate::http::security::state_token::DEFAULT_STATE_EXPIRES;

// =============================================================================
// Attribute Mapping
// =============================================================================

/// Translation from canonical account fields to IdP attribute names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub email: String,
    pub full_name: String,
    pub user_unique_id: String,
}

impl AttributeMapping {
    pub fn new(email: &str, full_name: &str, user_unique_id: &str) -> Self {
        Self {
            email: email.to_string(),
            full_name: full_name.to_string(),
            user_unique_id: user_unique_id.to_string(),
        }
    }
}

// =============================================================================
// Remote App Configuration
// =============================================================================

/// Configuration of one remote identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAppConfig {
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Short description
    #[serde(default)]
    pub description: String,
    /// Directory holding the SAML toolkit settings for this provider
    #[serde(default)]
    pub saml_path: Option<PathBuf>,
    /// Attribute name mapping
    pub mappings: AttributeMapping,
    /// Additional redirect hosts accepted for this provider
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

impl RemoteAppConfig {
    /// Creates a provider entry with the conventional eduPerson mapping.
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            description: String::new(),
            saml_path: None,
            mappings: AttributeMapping::new(
                "urn:oid:0.9.2342.19200300.100.1.3",
                "urn:oid:2.16.840.1.113730.3.1.241",
                "urn:oid:1.3.6.1.4.1.5923.1.1.1.6",
            ),
            allowed_hosts: Vec::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn saml_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.saml_path = Some(path.into());
        self
    }

    pub fn mappings(mut self, mappings: AttributeMapping) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn allowed_host(mut self, host: &str) -> Self {
        self.allowed_hosts.push(host.to_string());
        self
    }
}

// =============================================================================
// Shibboleth Configuration
// =============================================================================

/// Top-level SSO configuration.
///
/// `secret_key` signs state tokens and must be identical on every instance
/// serving the same callback URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShibbolethConfig {
    /// Process-wide signing secret
    pub secret_key: String,
    /// State token lifetime in seconds
    #[serde(default = "default_state_expires")]
    pub state_expires: u64,
    /// Reject callbacks whose relay state fails verification
    #[serde(default = "default_require_state_token")]
    pub require_state_token: bool,
    /// Redirect hosts accepted for every provider
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    /// Redirect used when the request carries none
    #[serde(default = "default_redirect")]
    pub default_redirect: String,
    /// Landing page when the local account cannot be provisioned
    #[serde(default = "default_unauthorized_url")]
    pub unauthorized_url: String,
    /// Remote identity providers keyed by id
    #[serde(default)]
    pub remote_apps: HashMap<String, RemoteAppConfig>,
}

fn default_state_expires() -> u64 {
    DEFAULT_STATE_EXPIRES
}

fn default_require_state_token() -> bool {
    true
}

fn default_redirect() -> String {
    DEFAULT_REDIRECT.to_string()
}

fn default_unauthorized_url() -> String {
    "/login".to_string()
}

impl ShibbolethConfig {
    /// Creates a configuration with the given secret and no providers.
    pub fn new(secret_key: &str) -> Self {
        Self {
            secret_key: secret_key.to_string(),
            state_expires: default_state_expires(),
            require_state_token: default_require_state_token(),
            allowed_hosts: Vec::new(),
            default_redirect: default_redirect(),
            unauthorized_url: default_unauthorized_url(),
            remote_apps: HashMap::new(),
        }
    }

    /// Loads the configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&content)
    }

    /// Parses the configuration from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn state_expires(mut self, seconds: u64) -> Self {
        self.state_expires = seconds;
        self
    }

    /// Disables state token enforcement. Local testing only.
    pub fn require_state_token(mut self, required: bool) -> Self {
        self.require_state_token = required;
        self
    }

    pub fn allowed_host(mut self, host: &str) -> Self {
        self.allowed_hosts.push(host.to_string());
        self
    }

    pub fn default_redirect(mut self, target: &str) -> Self {
        self.default_redirect = target.to_string();
        self
    }

    pub fn unauthorized_url(mut self, url: &str) -> Self {
        self.unauthorized_url = url.to_string();
        self
    }

    pub fn remote_app(mut self, id: &str, app: RemoteAppConfig) -> Self {
        self.remote_apps.insert(id.to_string(), app);
        self
    }

    /// Validates the configuration.
    ///
    /// A provider without `saml_path` is accepted here; requests for it fail
    /// at runtime with a server configuration error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        if self.state_expires == 0 {
            return Err(ConfigError::Invalid("state_expires must be positive".into()));
        }
        for (id, app) in &self.remote_apps {
            if id.is_empty() || id.contains('/') {
                return Err(ConfigError::Invalid(format!("invalid provider id '{}'", id)));
            }
            let m = &app.mappings;
            if m.email.is_empty() || m.full_name.is_empty() || m.user_unique_id.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' has an incomplete attribute mapping",
                    id
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Provider Registry
// =============================================================================

/// Resolved, immutable configuration of one identity provider.
#[derive(Debug, Clone)]
pub struct IdentityProviderConfig {
    pub id: String,
    pub title: String,
    pub description: String,
    pub attribute_mapping: AttributeMapping,
    trust_anchor_path: Option<PathBuf>,
    redirect_validator: RedirectValidator,
}

impl IdentityProviderConfig {
    /// Path to the SAML settings, or `BadServerConfig` when not configured.
    pub fn trust_anchor_path(&self) -> Result<&Path, SsoError> {
        self.trust_anchor_path
            .as_deref()
            .ok_or_else(|| SsoError::BadServerConfig {
                reason: format!("provider '{}' has no saml_path", self.id),
            })
    }

    /// Redirect validator combining global and provider allow-lists.
    pub fn redirect_validator(&self) -> &RedirectValidator {
        &self.redirect_validator
    }
}

/// Immutable lookup table of configured providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<IdentityProviderConfig>>,
}

impl ProviderRegistry {
    /// Builds the registry once at startup.
    pub fn from_config(config: &ShibbolethConfig) -> Self {
        let providers = config
            .remote_apps
            .iter()
            .map(|(id, app)| {
                let validator = RedirectValidator::new(
                    config.allowed_hosts.iter().chain(app.allowed_hosts.iter()),
                );
                let provider = IdentityProviderConfig {
                    id: id.clone(),
                    title: app.title.clone(),
                    description: app.description.clone(),
                    attribute_mapping: app.mappings.clone(),
                    trust_anchor_path: app.saml_path.clone(),
                    redirect_validator: validator,
                };
                (id.clone(), Arc::new(provider))
            })
            .collect();
        Self { providers }
    }

    /// Looks up a provider, failing with `UnknownProvider` when absent.
    pub fn get(&self, provider_id: &str) -> Result<Arc<IdentityProviderConfig>, SsoError> {
        self.providers
            .get(provider_id)
            .cloned()
            .ok_or_else(|| SsoError::UnknownProvider {
                provider_id: provider_id.to_string(),
            })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

// =============================================================================
// Config Error
// =============================================================================

/// Configuration loading error.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// The signing secret is empty
    EmptySecret,
    /// The configuration file could not be read
    Io { path: PathBuf, reason: String },
    /// The configuration is not valid JSON for this schema
    Parse(String),
    /// A value is out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EmptySecret => write!(f, "secret_key must not be empty"),
            ConfigError::Io { path, reason } => {
                write!(f, "cannot read {}: {}", path.display(), reason)
            }
            ConfigError::Parse(msg) => write!(f, "invalid configuration: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
