//! Bundled SAML toolkit driven by a settings directory.
//!
//! Supports the HTTP-Redirect binding for AuthnRequests and the HTTP-POST
//! binding for responses. Structural, status, issuer, time, destination and
//! audience checks are done here.
//!
//! XML signatures are checked by a pluggable [`SignatureVerifier`]. Without
//! one, every response is rejected. Attributes are only read from an
//! assertion whose `ID`, or whose enclosing response's `ID`, the verifier
//! reports as signed, and documents with a DTD or duplicated `ID` attributes
//! are refused outright.
//!
//! [`SettingsToolkit::insecure_accept_unsigned`] turns the signature check
//! off for local testing. It has no effect when the settings demand signed
//! responses.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rand::RngCore;

use super::settings::SamlSettings;
use super::xml;
use super::{
    CallbackVerification, SamlAuth, SamlBinding, SamlError, SamlRequest, SamlStatusCode,
    SamlToolkit, ServiceMetadata,
};

/// Error code reported for every rejected response.
pub const INVALID_RESPONSE: &str = "invalid_response";

const METADATA_VALID_FOR_SECS: i64 = 2 * 24 * 3600;
const METADATA_CACHE_DURATION: &str = "PT604800S";

/// Verifies XML signatures on IdP responses.
pub trait SignatureVerifier: Send + Sync {
    /// Checks the enveloped signatures in `response_xml` against the IdP
    /// certificate and returns the `ID` of every element a valid signature
    /// references.
    ///
    /// An invalid signature is an `Err`. A signature that does not verify
    /// must never contribute an `ID`.
    fn verify(&self, response_xml: &str, idp_cert: &str) -> Result<Vec<String>, String>;
}

// =============================================================================
// Toolkit
// =============================================================================

/// [`SamlToolkit`] reading `settings.json` from each provider's `saml_path`.
#[derive(Clone, Default)]
pub struct SettingsToolkit {
    verifier: Option<Arc<dyn SignatureVerifier>>,
    accept_unsigned: bool,
}

impl SettingsToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a signature verifier used for every response.
    pub fn with_signature_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Accepts responses without checking any signature when no verifier is
    /// installed and the settings do not demand signatures.
    ///
    /// Anyone able to POST to the assertion consumer service can then log in
    /// as any identity. Local testing only.
    pub fn insecure_accept_unsigned(mut self, accept: bool) -> Self {
        self.accept_unsigned = accept;
        self
    }
}

impl SamlToolkit for SettingsToolkit {
    fn init(
        &self,
        request: &SamlRequest,
        saml_path: &Path,
    ) -> Result<Box<dyn SamlAuth>, SamlError> {
        let settings = SamlSettings::load(saml_path)?;
        Ok(Box::new(
            SettingsAuth::new(settings, request.clone(), self.verifier.clone())
                .insecure_accept_unsigned(self.accept_unsigned),
        ))
    }
}

/// [`SamlAuth`] over loaded settings.
pub struct SettingsAuth {
    settings: SamlSettings,
    request: SamlRequest,
    verifier: Option<Arc<dyn SignatureVerifier>>,
    accept_unsigned: bool,
}

impl SettingsAuth {
    pub fn new(
        settings: SamlSettings,
        request: SamlRequest,
        verifier: Option<Arc<dyn SignatureVerifier>>,
    ) -> Self {
        Self {
            settings,
            request,
            verifier,
            accept_unsigned: false,
        }
    }

    /// See [`SettingsToolkit::insecure_accept_unsigned`].
    pub fn insecure_accept_unsigned(mut self, accept: bool) -> Self {
        self.accept_unsigned = accept;
        self
    }

    pub fn settings(&self) -> &SamlSettings {
        &self.settings
    }

    /// Processes the POSTed `SAMLResponse` as if the current time were `now`.
    pub fn process_response_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<CallbackVerification, SamlError> {
        let encoded = self.request.post_data.get("SAMLResponse").ok_or_else(|| {
            SamlError::Processing(
                "SAML Response not found, only the HTTP-POST binding is supported".into(),
            )
        })?;
        let xml = decode_post_binding(encoded)?;
        let response = SamlResponse::from_xml(&xml)?;

        match self.validate(&response, &xml, now) {
            Ok(assertion) => {
                let mut verification = CallbackVerification::accepted(
                    assertion.attributes.clone(),
                    assertion.name_id.clone(),
                );
                verification.session_index = assertion.session_index.clone();
                Ok(verification)
            }
            Err(reason) => Ok(CallbackVerification::rejected(INVALID_RESPONSE, reason)),
        }
    }

    fn validate<'r>(
        &self,
        response: &'r SamlResponse,
        xml: &str,
        now: DateTime<Utc>,
    ) -> Result<&'r SamlAssertion, String> {
        let settings = &self.settings;
        let security = &settings.security;
        let drift = Duration::seconds(security.allowed_clock_drift);

        if response.version != "2.0" {
            return Err("Unsupported SAML version".into());
        }
        if response.id.is_empty() {
            return Err("Missing ID attribute on SAML Response".into());
        }
        if !response.status_code.is_success() {
            let mut reason = format!(
                "The status code of the Response was not Success, was {:?}",
                response.status_code
            );
            if let Some(message) = &response.status_message {
                reason.push_str(&format!(" -> {}", message));
            }
            return Err(reason);
        }
        if response.encrypted_assertions > 0 {
            return Err("Encrypted assertions are not supported".into());
        }
        let assertion = match response.assertions.as_slice() {
            [single] => single,
            _ => return Err("SAML Response must contain 1 assertion".into()),
        };

        self.check_signature(response, assertion, xml)?;

        for issuer in &response.issuers {
            if issuer != &settings.idp.entity_id {
                return Err(format!(
                    "Invalid issuer in the Assertion/Response (expected '{}', received '{}')",
                    settings.idp.entity_id, issuer
                ));
            }
        }

        if let Some(not_before) = &assertion.not_before {
            let not_before = parse_instant(not_before)?;
            if not_before > now + drift {
                return Err("Could not validate timestamp: not yet valid. Check system clock.".into());
            }
        }
        if let Some(not_on_or_after) = &assertion.not_on_or_after {
            let not_on_or_after = parse_instant(not_on_or_after)?;
            if not_on_or_after + drift <= now {
                return Err("Could not validate timestamp: expired. Check system clock.".into());
            }
        }

        if settings.strict {
            let current_url = self.request.self_url_no_query();

            if let Some(destination) = &response.destination {
                if destination.is_empty() {
                    return Err("The response has an empty Destination value".into());
                }
                if destination != &current_url {
                    return Err(format!(
                        "The response was received at {} instead of {}",
                        current_url, destination
                    ));
                }
            }

            if !assertion.audiences.is_empty()
                && !assertion.audiences.contains(&settings.sp.entity_id)
            {
                return Err(format!(
                    "{} is not a valid audience for this Response",
                    settings.sp.entity_id
                ));
            }

            if let Some(recipient) = &assertion.recipient {
                if recipient != &current_url {
                    return Err("A valid SubjectConfirmation was not found on this Response".into());
                }
            }
            if let Some(deadline) = &assertion.confirmation_not_on_or_after {
                if parse_instant(deadline)? + drift <= now {
                    return Err("A valid SubjectConfirmation was not found on this Response".into());
                }
            }

            if security.want_name_id && assertion.name_id.as_deref().unwrap_or("").is_empty() {
                return Err("NameID not found in the assertion of the Response".into());
            }
            if security.want_attribute_statement && !assertion.has_attribute_statement {
                return Err("There is no AttributeStatement on the Response".into());
            }
        }

        if let Some(name) = &assertion.duplicate_attribute {
            return Err(format!(
                "Found an Attribute element with duplicated Name '{}'",
                name
            ));
        }

        Ok(assertion)
    }

    fn check_signature(
        &self,
        response: &SamlResponse,
        assertion: &SamlAssertion,
        xml: &str,
    ) -> Result<(), String> {
        let security = &self.settings.security;
        let Some(verifier) = &self.verifier else {
            if self.accept_unsigned && !security.requires_signature() {
                return Ok(());
            }
            return Err("No signature verifier is installed. SAML Response rejected".into());
        };

        if !response.signed {
            return Err("No Signature found. SAML Response rejected".into());
        }
        if let Some(id) = xml::duplicate_id(xml) {
            return Err(format!("Duplicated ID attribute '{}' found", id));
        }

        let signed_ids = verifier.verify(xml, &self.settings.idp.x509cert)?;
        let covers = |id: &str| !id.is_empty() && signed_ids.iter().any(|s| s == id);
        let message_signed = covers(&response.id);
        let assertion_signed = covers(&assertion.id);

        if security.want_messages_signed && !message_signed {
            return Err("The Message of the Response is not signed and the SP requires it".into());
        }
        if security.want_assertions_signed && !assertion_signed {
            return Err("The Assertion of the Response is not signed and the SP requires it".into());
        }
        if !message_signed && !assertion_signed {
            return Err("No signature covers the Assertion. SAML Response rejected".into());
        }
        Ok(())
    }

    /// SP metadata with `validUntil` computed from `now`.
    pub fn sp_metadata_at(&self, now: DateTime<Utc>) -> String {
        let settings = &self.settings;
        let sp = &settings.sp;
        let security = &settings.security;

        let valid_until = security.metadata_valid_until.clone().unwrap_or_else(|| {
            format_instant(now + Duration::seconds(METADATA_VALID_FOR_SECS))
        });
        let cache_duration = security
            .metadata_cache_duration
            .clone()
            .unwrap_or_else(|| METADATA_CACHE_DURATION.to_string());

        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        out.push_str(&format!(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" validUntil="{}" cacheDuration="{}" entityID="{}">"#,
            xml::escape(&valid_until),
            xml::escape(&cache_duration),
            xml::escape(&sp.entity_id)
        ));
        out.push_str(&format!(
            r#"<md:SPSSODescriptor AuthnRequestsSigned="{}" WantAssertionsSigned="{}" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">"#,
            security.authn_requests_signed, security.want_assertions_signed
        ));

        let cert = format_cert(&sp.x509cert);
        if !cert.is_empty() {
            for usage in ["signing", "encryption"] {
                out.push_str(&format!(
                    r#"<md:KeyDescriptor use="{}"><ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>"#,
                    usage, cert
                ));
            }
        }

        if let (Some(sls), Some(binding)) = (&sp.single_logout_service, sp.sls_binding()) {
            if !sls.url.is_empty() {
                out.push_str(&format!(
                    r#"<md:SingleLogoutService Binding="{}" Location="{}"/>"#,
                    xml::escape(&binding),
                    xml::escape(&sls.url)
                ));
            }
        }

        out.push_str(&format!(
            r#"<md:NameIDFormat>{}</md:NameIDFormat>"#,
            xml::escape(&sp.name_id_format)
        ));
        out.push_str(&format!(
            r#"<md:AssertionConsumerService Binding="{}" Location="{}" index="1"/>"#,
            xml::escape(&sp.acs_binding()),
            xml::escape(&sp.assertion_consumer_service.url)
        ));
        out.push_str("</md:SPSSODescriptor>");

        if !settings.organization.is_empty() {
            out.push_str("<md:Organization>");
            for (lang, org) in &settings.organization {
                out.push_str(&format!(
                    r#"<md:OrganizationName xml:lang="{}">{}</md:OrganizationName>"#,
                    xml::escape(lang),
                    xml::escape(&org.name)
                ));
            }
            for (lang, org) in &settings.organization {
                out.push_str(&format!(
                    r#"<md:OrganizationDisplayName xml:lang="{}">{}</md:OrganizationDisplayName>"#,
                    xml::escape(lang),
                    xml::escape(&org.displayname)
                ));
            }
            for (lang, org) in &settings.organization {
                out.push_str(&format!(
                    r#"<md:OrganizationURL xml:lang="{}">{}</md:OrganizationURL>"#,
                    xml::escape(lang),
                    xml::escape(&org.url)
                ));
            }
            out.push_str("</md:Organization>");
        }

        for (kind, contact) in &settings.contact_person {
            out.push_str(&format!(
                r#"<md:ContactPerson contactType="{}"><md:GivenName>{}</md:GivenName><md:EmailAddress>{}</md:EmailAddress></md:ContactPerson>"#,
                xml::escape(kind),
                xml::escape(&contact.given_name),
                xml::escape(&contact.email_address)
            ));
        }

        out.push_str("</md:EntityDescriptor>");
        out
    }
}

impl SamlAuth for SettingsAuth {
    fn build_login_redirect(&self, relay_state: &str) -> Result<String, SamlError> {
        let mut errors = self.settings.check_sp_settings();
        errors.extend(self.settings.check_idp_settings());
        if !errors.is_empty() {
            return Err(SamlError::Configuration(errors.join(", ")));
        }
        if self.settings.security.authn_requests_signed {
            return Err(SamlError::Configuration(
                "signed AuthnRequests are not supported".into(),
            ));
        }
        AuthnRequest::new(&self.settings).to_redirect_url(Some(relay_state))
    }

    fn verify_callback(&self) -> Result<CallbackVerification, SamlError> {
        self.process_response_at(Utc::now())
    }

    fn build_service_metadata(&self) -> ServiceMetadata {
        let now = Utc::now();
        let xml = self.sp_metadata_at(now);
        let mut errors = self.settings.check_sp_settings();
        errors.extend(validate_metadata(&xml, now));
        ServiceMetadata { xml, errors }
    }
}

/// Structural checks on SP metadata, as error codes.
pub fn validate_metadata(metadata: &str, now: DateTime<Utc>) -> Vec<String> {
    if metadata.trim().is_empty() {
        return vec!["empty".to_string()];
    }
    if !xml::is_well_formed(metadata) {
        return vec!["invalid_xml".to_string()];
    }
    if xml::root_name(metadata) != Some("EntityDescriptor") {
        return vec!["noEntityDescriptor_xml".to_string()];
    }

    let mut errors = Vec::new();
    if xml::elements(metadata, "SPSSODescriptor").len() != 1 {
        errors.push("onlySPSSODescriptor_allowed_xml".to_string());
    }
    let valid_until = xml::element(metadata, "EntityDescriptor").and_then(|e| e.attr("validUntil"));
    if let Some(valid_until) = valid_until {
        match parse_instant(&valid_until) {
            Ok(instant) if instant < now => errors.push("expired_xml".to_string()),
            Ok(_) => {}
            Err(_) => errors.push("invalid_validUntil_xml".to_string()),
        }
    }
    errors
}

// =============================================================================
// AuthnRequest
// =============================================================================

/// SAML AuthnRequest
#[derive(Debug, Clone)]
pub struct AuthnRequest {
    pub id: String,
    /// Issue instant (ISO 8601)
    pub issue_instant: String,
    /// SP entity ID
    pub issuer: String,
    /// IdP SSO URL
    pub destination: String,
    pub acs_url: String,
    /// Binding the IdP should answer with
    pub protocol_binding: SamlBinding,
    pub name_id_format: String,
    pub force_authn: bool,
    pub is_passive: bool,
}

impl AuthnRequest {
    pub fn new(settings: &SamlSettings) -> Self {
        Self::new_at(settings, Utc::now())
    }

    pub fn new_at(settings: &SamlSettings, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            issue_instant: format_instant(now),
            issuer: settings.sp.entity_id.clone(),
            destination: settings.idp.single_sign_on_service.url.clone(),
            acs_url: settings.sp.assertion_consumer_service.url.clone(),
            protocol_binding: SamlBinding::HttpPost,
            name_id_format: settings.sp.name_id_format.clone(),
            force_authn: false,
            is_passive: false,
        }
    }

    pub fn force_authn(mut self, force: bool) -> Self {
        self.force_authn = force;
        self
    }

    pub fn is_passive(mut self, passive: bool) -> Self {
        self.is_passive = passive;
        self
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{}" Version="2.0" IssueInstant="{}" Destination="{}" AssertionConsumerServiceURL="{}" ProtocolBinding="{}""#,
            self.id,
            self.issue_instant,
            xml::escape(&self.destination),
            xml::escape(&self.acs_url),
            self.protocol_binding.as_urn()
        ));
        if self.force_authn {
            out.push_str(r#" ForceAuthn="true""#);
        }
        if self.is_passive {
            out.push_str(r#" IsPassive="true""#);
        }
        out.push('>');
        out.push_str(&format!(
            r#"<saml:Issuer>{}</saml:Issuer>"#,
            xml::escape(&self.issuer)
        ));
        out.push_str(&format!(
            r#"<samlp:NameIDPolicy Format="{}" AllowCreate="true"/>"#,
            xml::escape(&self.name_id_format)
        ));
        out.push_str("</samlp:AuthnRequest>");
        out
    }

    /// URL for the HTTP-Redirect binding (raw DEFLATE, base64, URL-encoded).
    pub fn to_redirect_url(&self, relay_state: Option<&str>) -> Result<String, SamlError> {
        let encoded = deflate_and_encode(&self.to_xml())?;
        let separator = if self.destination.contains('?') { '&' } else { '?' };

        let mut url = format!(
            "{}{}SAMLRequest={}",
            self.destination,
            separator,
            urlencoding::encode(&encoded)
        );
        if let Some(state) = relay_state {
            url.push_str(&format!("&RelayState={}", urlencoding::encode(state)));
        }
        Ok(url)
    }
}

// =============================================================================
// Response parsing
// =============================================================================

/// SAML Response
#[derive(Debug, Clone)]
pub struct SamlResponse {
    pub id: String,
    pub version: String,
    pub in_response_to: Option<String>,
    pub destination: Option<String>,
    /// Issuers of the response and its assertions
    pub issuers: Vec<String>,
    pub status_code: SamlStatusCode,
    pub status_message: Option<String>,
    pub assertions: Vec<SamlAssertion>,
    pub encrypted_assertions: usize,
    /// Whether any `Signature` element is present
    pub signed: bool,
}

/// SAML Assertion
#[derive(Debug, Clone, Default)]
pub struct SamlAssertion {
    pub id: String,
    pub name_id: Option<String>,
    pub session_index: Option<String>,
    pub not_before: Option<String>,
    pub not_on_or_after: Option<String>,
    pub recipient: Option<String>,
    pub confirmation_not_on_or_after: Option<String>,
    pub audiences: Vec<String>,
    pub has_attribute_statement: bool,
    pub attributes: HashMap<String, Vec<String>>,
    /// First attribute name that occurred more than once
    pub duplicate_attribute: Option<String>,
}

impl SamlResponse {
    /// Parses a decoded `samlp:Response` document.
    pub fn from_xml(doc: &str) -> Result<Self, SamlError> {
        if xml::has_doctype(doc) {
            return Err(SamlError::Processing("DTDs are not allowed in SAML messages".into()));
        }
        if !xml::is_well_formed(doc) {
            return Err(SamlError::Processing("response is not well-formed XML".into()));
        }
        if xml::root_name(doc) != Some("Response") {
            return Err(SamlError::Processing("document is not a SAML Response".into()));
        }
        let response = xml::element(doc, "Response")
            .ok_or_else(|| SamlError::Processing("document is not a SAML Response".into()))?;

        let status = xml::element(response.inner, "StatusCode");
        let status_code = status
            .and_then(|s| s.attr("Value"))
            .map(|v| SamlStatusCode::from_urn(&v))
            .unwrap_or_else(|| SamlStatusCode::Unknown(String::new()));
        let status_message = xml::element(response.inner, "StatusMessage").map(|e| e.text());

        Ok(Self {
            id: response.attr("ID").unwrap_or_default(),
            version: response.attr("Version").unwrap_or_default(),
            in_response_to: response.attr("InResponseTo"),
            destination: response.attr("Destination"),
            issuers: xml::elements(response.inner, "Issuer")
                .iter()
                .map(xml::Element::text)
                .collect(),
            status_code,
            status_message,
            assertions: xml::elements(response.inner, "Assertion")
                .iter()
                .map(SamlAssertion::from_element)
                .collect(),
            encrypted_assertions: xml::elements(response.inner, "EncryptedAssertion").len(),
            signed: xml::element(response.inner, "Signature").is_some(),
        })
    }

    pub fn is_success(&self) -> bool {
        self.status_code.is_success()
    }
}

impl SamlAssertion {
    fn from_element(assertion: &xml::Element<'_>) -> Self {
        let inner = assertion.inner;
        let conditions = xml::element(inner, "Conditions");
        let confirmation = xml::element(inner, "SubjectConfirmationData");
        let statement = xml::element(inner, "AttributeStatement");

        let mut attributes: HashMap<String, Vec<String>> = HashMap::new();
        let mut duplicate_attribute = None;
        if let Some(statement) = &statement {
            for attribute in xml::elements(statement.inner, "Attribute") {
                let Some(name) = attribute.attr("Name") else {
                    continue;
                };
                let values = xml::elements(attribute.inner, "AttributeValue")
                    .iter()
                    .map(xml::Element::text)
                    .collect();
                if attributes.contains_key(&name) {
                    duplicate_attribute.get_or_insert(name);
                } else {
                    attributes.insert(name, values);
                }
            }
        }

        Self {
            id: assertion.attr("ID").unwrap_or_default(),
            name_id: xml::element(inner, "NameID").map(|e| e.text()),
            session_index: xml::element(inner, "AuthnStatement").and_then(|e| e.attr("SessionIndex")),
            not_before: conditions.and_then(|c| c.attr("NotBefore")),
            not_on_or_after: conditions.and_then(|c| c.attr("NotOnOrAfter")),
            recipient: confirmation.and_then(|c| c.attr("Recipient")),
            confirmation_not_on_or_after: confirmation.and_then(|c| c.attr("NotOnOrAfter")),
            audiences: xml::elements(inner, "Audience")
                .iter()
                .map(xml::Element::text)
                .collect(),
            has_attribute_statement: statement.is_some(),
            attributes,
            duplicate_attribute,
        }
    }
}

// =============================================================================
// Helper functions
// =============================================================================

fn generate_id() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("_{}", hex::encode(bytes))
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| format!("Invalid timestamp '{}'", value))
}

fn format_cert(cert: &str) -> String {
    cert.replace("-----BEGIN CERTIFICATE-----", "")
        .replace("-----END CERTIFICATE-----", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

fn deflate_and_encode(xml: &str) -> Result<String, SamlError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .map_err(|e| SamlError::Configuration(format!("DEFLATE error: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| SamlError::Configuration(format!("DEFLATE error: {}", e)))?;
    Ok(STANDARD.encode(compressed))
}

fn decode_post_binding(encoded: &str) -> Result<String, SamlError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = STANDARD
        .decode(compact)
        .map_err(|e| SamlError::Processing(format!("Base64 decode error: {}", e)))?;
    String::from_utf8(decoded)
        .map_err(|e| SamlError::Processing(format!("UTF-8 decode error: {}", e)))
}
