//! Service provider settings loaded from a provider's `saml_path`.
//!
//! The directory layout follows the python3-saml convention:
//!
//! ```text
//! <saml_path>/settings.json           sp, idp, strict, debug
//! <saml_path>/advanced_settings.json  security, contactPerson, organization (optional)
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use super::{SamlBinding, SamlError};

pub const SETTINGS_FILE: &str = "settings.json";
pub const ADVANCED_SETTINGS_FILE: &str = "advanced_settings.json";

const NAMEID_UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified";

/// Location and binding of a SAML endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub binding: String,
}

impl Endpoint {
    fn binding_or(&self, default: SamlBinding) -> String {
        if self.binding.is_empty() {
            default.as_urn().to_string()
        } else {
            self.binding.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpSettings {
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub assertion_consumer_service: Endpoint,
    #[serde(default)]
    pub single_logout_service: Option<Endpoint>,
    #[serde(rename = "NameIDFormat", default = "default_name_id_format")]
    pub name_id_format: String,
    #[serde(default)]
    pub x509cert: String,
    #[serde(default)]
    pub private_key: String,
}

impl SpSettings {
    pub fn acs_binding(&self) -> String {
        self.assertion_consumer_service
            .binding_or(SamlBinding::HttpPost)
    }

    pub fn sls_binding(&self) -> Option<String> {
        self.single_logout_service
            .as_ref()
            .map(|e| e.binding_or(SamlBinding::HttpRedirect))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpSettings {
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub single_sign_on_service: Endpoint,
    #[serde(default)]
    pub single_logout_service: Option<Endpoint>,
    #[serde(default)]
    pub x509cert: String,
    #[serde(default)]
    pub cert_fingerprint: Option<String>,
}

/// `security` section of the advanced settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecuritySettings {
    pub authn_requests_signed: bool,
    pub want_assertions_signed: bool,
    pub want_messages_signed: bool,
    pub want_assertions_encrypted: bool,
    pub want_name_id: bool,
    pub want_attribute_statement: bool,
    pub sign_metadata: bool,
    pub metadata_valid_until: Option<String>,
    pub metadata_cache_duration: Option<String>,
    /// Accepted clock skew for time conditions, in seconds
    pub allowed_clock_drift: i64,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            authn_requests_signed: false,
            want_assertions_signed: false,
            want_messages_signed: false,
            want_assertions_encrypted: false,
            want_name_id: true,
            want_attribute_statement: true,
            sign_metadata: false,
            metadata_valid_until: None,
            metadata_cache_duration: None,
            allowed_clock_drift: 300,
        }
    }
}

impl SecuritySettings {
    /// Whether some part of an inbound response must carry a verified signature.
    pub fn requires_signature(&self) -> bool {
        self.want_assertions_signed || self.want_messages_signed
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPerson {
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub email_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Organization {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub displayname: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvancedSettings {
    #[serde(default)]
    security: Option<SecuritySettings>,
    #[serde(default)]
    contact_person: BTreeMap<String, ContactPerson>,
    #[serde(default)]
    organization: BTreeMap<String, Organization>,
}

/// Settings of one service provider / identity provider pair.
#[derive(Debug, Clone, Deserialize)]
pub struct SamlSettings {
    /// Enforce destination, audience, NameID and attribute statement checks
    #[serde(default = "default_strict")]
    pub strict: bool,
    #[serde(default)]
    pub debug: bool,
    pub sp: SpSettings,
    pub idp: IdpSettings,
    #[serde(default)]
    pub security: SecuritySettings,
    #[serde(default, rename = "contactPerson")]
    pub contact_person: BTreeMap<String, ContactPerson>,
    #[serde(default)]
    pub organization: BTreeMap<String, Organization>,
}

fn default_strict() -> bool {
    true
}

fn default_name_id_format() -> String {
    NAMEID_UNSPECIFIED.to_string()
}

impl SamlSettings {
    /// Loads `settings.json` and, when present, `advanced_settings.json`.
    pub fn load(saml_path: &Path) -> Result<Self, SamlError> {
        let settings_file = saml_path.join(SETTINGS_FILE);
        let content = fs::read_to_string(&settings_file).map_err(|e| {
            SamlError::Settings(format!("cannot read {}: {}", settings_file.display(), e))
        })?;
        let mut settings = Self::from_json(&content)?;

        let advanced_file = saml_path.join(ADVANCED_SETTINGS_FILE);
        if advanced_file.is_file() {
            let content = fs::read_to_string(&advanced_file).map_err(|e| {
                SamlError::Settings(format!("cannot read {}: {}", advanced_file.display(), e))
            })?;
            let advanced: AdvancedSettings = serde_json::from_str(&content).map_err(|e| {
                SamlError::Settings(format!("invalid {}: {}", ADVANCED_SETTINGS_FILE, e))
            })?;
            if let Some(security) = advanced.security {
                settings.security = security;
            }
            settings.contact_person.extend(advanced.contact_person);
            settings.organization.extend(advanced.organization);
        }

        Ok(settings)
    }

    pub fn from_json(content: &str) -> Result<Self, SamlError> {
        serde_json::from_str(content)
            .map_err(|e| SamlError::Settings(format!("invalid {}: {}", SETTINGS_FILE, e)))
    }

    /// Problems with the service provider half, as error codes.
    pub fn check_sp_settings(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let sp = &self.sp;

        if sp.entity_id.is_empty() {
            errors.push("sp_entityId_not_found".to_string());
        }
        if sp.assertion_consumer_service.url.is_empty() {
            errors.push("sp_acs_not_found".to_string());
        } else if !is_http_url(&sp.assertion_consumer_service.url) {
            errors.push("sp_acs_url_invalid".to_string());
        }
        if let Some(sls) = &sp.single_logout_service {
            if !sls.url.is_empty() && !is_http_url(&sls.url) {
                errors.push("sp_sls_url_invalid".to_string());
            }
        }
        let needs_sp_cert = self.security.authn_requests_signed
            || self.security.want_assertions_encrypted
            || self.security.sign_metadata;
        if needs_sp_cert && (sp.x509cert.is_empty() || sp.private_key.is_empty()) {
            errors.push("sp_cert_not_found_and_required".to_string());
        }
        for (kind, contact) in &self.contact_person {
            if contact.given_name.is_empty() || contact.email_address.is_empty() {
                errors.push(format!("contact_not_enough_data_{}", kind));
            }
        }
        for (lang, org) in &self.organization {
            if org.name.is_empty() || org.displayname.is_empty() || org.url.is_empty() {
                errors.push(format!("organization_not_enough_data_{}", lang));
            }
        }
        errors
    }

    /// Problems with the identity provider half, as error codes.
    pub fn check_idp_settings(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let idp = &self.idp;

        if idp.entity_id.is_empty() {
            errors.push("idp_entityId_not_found".to_string());
        }
        if idp.single_sign_on_service.url.is_empty() {
            errors.push("idp_sso_not_found".to_string());
        } else if !is_http_url(&idp.single_sign_on_service.url) {
            errors.push("idp_sso_url_invalid".to_string());
        }
        let has_fingerprint = idp.cert_fingerprint.as_deref().is_some_and(|f| !f.is_empty());
        if self.security.requires_signature() && idp.x509cert.is_empty() && !has_fingerprint {
            errors.push("idp_cert_or_fingerprint_not_found_and_required".to_string());
        }
        errors
    }
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}
