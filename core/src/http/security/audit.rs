//! Security audit trail for SSO handshakes.
//!
//! Every outcome of a login or callback is reported as a [`SecurityEvent`] to
//! the handlers registered on an [`AuditLogger`]. The logger is passed to the
//! handshake explicitly; there is no process-wide instance.
//!
//! # Example
//!
//! ```ignore
//! use actix_shibboleth_core::http::security::audit::{AuditLogger, SecurityEvent, TracingHandler};
//!
//! let audit_logger = AuditLogger::new()
//!     .add_handler(TracingHandler::new())
//!     .with_handler(|event| metrics.record(event.event_type.to_string()));
//!
//! audit_logger.log(SecurityEvent::login_initiated("hzdr").ip_address("192.168.1.1"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use rand::Rng;

/// Security event types for audit logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEventType {
    /// Browser sent to the IdP
    LoginInitiated,
    /// Callback accepted and local session established
    AuthenticationSuccess,
    /// Callback rejected by the SAML toolkit
    AuthenticationFailure,
    /// Relay state failed verification
    InvalidStateToken,
    /// Relay state failed verification but state checking is disabled
    StateCheckBypassed,
    /// Existing session logged out at the start of a callback
    SessionInvalidated,
    /// External identity attached to an existing account by email
    AccountLinked,
    /// Local account registered for a new external identity
    AccountCreated,
    /// Account store could not provide a local account
    AccountProvisioningFailed,
    /// Custom security event
    Custom(String),
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityEventType::LoginInitiated => write!(f, "LOGIN_INITIATED"),
            SecurityEventType::AuthenticationSuccess => write!(f, "AUTHENTICATION_SUCCESS"),
            SecurityEventType::AuthenticationFailure => write!(f, "AUTHENTICATION_FAILURE"),
            SecurityEventType::InvalidStateToken => write!(f, "INVALID_STATE_TOKEN"),
            SecurityEventType::StateCheckBypassed => write!(f, "STATE_CHECK_BYPASSED"),
            SecurityEventType::SessionInvalidated => write!(f, "SESSION_INVALIDATED"),
            SecurityEventType::AccountLinked => write!(f, "ACCOUNT_LINKED"),
            SecurityEventType::AccountCreated => write!(f, "ACCOUNT_CREATED"),
            SecurityEventType::AccountProvisioningFailed => {
                write!(f, "ACCOUNT_PROVISIONING_FAILED")
            }
            SecurityEventType::Custom(name) => write!(f, "CUSTOM_{}", name.to_uppercase()),
        }
    }
}

/// Severity level of security events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SecurityEventSeverity {
    /// Informational (successful operations)
    #[default]
    Info,
    /// Warning (potential issues)
    Warning,
    /// Error (failed operations)
    Error,
    /// Critical (security threats)
    Critical,
}

impl fmt::Display for SecurityEventSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityEventSeverity::Info => write!(f, "INFO"),
            SecurityEventSeverity::Warning => write!(f, "WARNING"),
            SecurityEventSeverity::Error => write!(f, "ERROR"),
            SecurityEventSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl SecurityEventType {
    /// Get the default severity for this event type.
    pub fn default_severity(&self) -> SecurityEventSeverity {
        match self {
            SecurityEventType::LoginInitiated
            | SecurityEventType::AuthenticationSuccess
            | SecurityEventType::SessionInvalidated
            | SecurityEventType::AccountCreated
            | SecurityEventType::Custom(_) => SecurityEventSeverity::Info,

            SecurityEventType::AccountLinked | SecurityEventType::StateCheckBypassed => {
                SecurityEventSeverity::Warning
            }

            SecurityEventType::AuthenticationFailure
            | SecurityEventType::AccountProvisioningFailed => SecurityEventSeverity::Error,

            SecurityEventType::InvalidStateToken => SecurityEventSeverity::Critical,
        }
    }
}

/// A security audit event.
#[derive(Debug, Clone)]
pub struct SecurityEvent {
    /// Unique event ID
    pub id: String,
    /// Event timestamp (Unix epoch milliseconds)
    pub timestamp: i64,
    pub event_type: SecurityEventType,
    pub severity: SecurityEventSeverity,
    /// Identity provider the request was addressed to
    pub provider_id: Option<String>,
    /// Local username (if known)
    pub username: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub path: Option<String>,
    pub details: HashMap<String, String>,
    /// Error message (for failure events)
    pub error: Option<String>,
}

impl SecurityEvent {
    /// Create a new security event.
    pub fn new(event_type: SecurityEventType) -> Self {
        Self {
            id: generate_event_id(),
            timestamp: Utc::now().timestamp_millis(),
            severity: event_type.default_severity(),
            event_type,
            provider_id: None,
            username: None,
            ip_address: None,
            user_agent: None,
            path: None,
            details: HashMap::new(),
            error: None,
        }
    }

    pub fn provider_id(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the severity (overrides default).
    pub fn severity(mut self, severity: SecurityEventSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    // Convenience constructors

    pub fn login_initiated(provider_id: &str) -> Self {
        Self::new(SecurityEventType::LoginInitiated).provider_id(provider_id)
    }

    pub fn authentication_success(provider_id: &str, username: &str) -> Self {
        Self::new(SecurityEventType::AuthenticationSuccess)
            .provider_id(provider_id)
            .username(username)
    }

    pub fn authentication_failure(provider_id: &str, reason: &str) -> Self {
        Self::new(SecurityEventType::AuthenticationFailure)
            .provider_id(provider_id)
            .error(reason)
    }

    /// Relay state rejected; `kind` names the failed check.
    pub fn invalid_state_token(provider_id: &str, kind: &str) -> Self {
        Self::new(SecurityEventType::InvalidStateToken)
            .provider_id(provider_id)
            .detail("kind", kind)
    }

    pub fn state_check_bypassed(provider_id: &str, kind: &str) -> Self {
        Self::new(SecurityEventType::StateCheckBypassed)
            .provider_id(provider_id)
            .detail("kind", kind)
    }

    pub fn session_invalidated(provider_id: &str) -> Self {
        Self::new(SecurityEventType::SessionInvalidated).provider_id(provider_id)
    }

    pub fn account_linked(provider_id: &str, username: &str, external_id: &str) -> Self {
        Self::new(SecurityEventType::AccountLinked)
            .provider_id(provider_id)
            .username(username)
            .detail("external_id", external_id)
    }

    pub fn account_created(provider_id: &str, username: &str, external_id: &str) -> Self {
        Self::new(SecurityEventType::AccountCreated)
            .provider_id(provider_id)
            .username(username)
            .detail("external_id", external_id)
    }

    pub fn account_provisioning_failed(provider_id: &str, reason: &str) -> Self {
        Self::new(SecurityEventType::AccountProvisioningFailed)
            .provider_id(provider_id)
            .error(reason)
    }

    /// Format the event as a log line.
    pub fn to_log_line(&self) -> String {
        let mut parts = vec![
            format!("[{}]", self.severity),
            format!("[{}]", self.event_type),
        ];

        if let Some(ref provider_id) = self.provider_id {
            parts.push(format!("provider={}", provider_id));
        }
        if let Some(ref username) = self.username {
            parts.push(format!("user={}", username));
        }
        if let Some(ref ip) = self.ip_address {
            parts.push(format!("ip={}", ip));
        }
        if let Some(ref path) = self.path {
            parts.push(format!("path={}", path));
        }
        if let Some(ref error) = self.error {
            parts.push(format!("error=\"{}\"", error));
        }
        let mut details: Vec<_> = self.details.iter().collect();
        details.sort();
        for (k, v) in details {
            parts.push(format!("{}={}", k, v));
        }

        parts.join(" ")
    }

    /// Format the event as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.to_log_line())
    }
}

impl serde::Serialize for SecurityEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("SecurityEvent", 11)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("event_type", &self.event_type.to_string())?;
        state.serialize_field("severity", &self.severity.to_string())?;
        state.serialize_field("provider_id", &self.provider_id)?;
        state.serialize_field("username", &self.username)?;
        state.serialize_field("ip_address", &self.ip_address)?;
        state.serialize_field("user_agent", &self.user_agent)?;
        state.serialize_field("path", &self.path)?;
        state.serialize_field("details", &self.details)?;
        state.serialize_field("error", &self.error)?;
        state.end()
    }
}

fn generate_event_id() -> String {
    let timestamp = Utc::now().timestamp_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp, random)
}

// =============================================================================
// Handlers
// =============================================================================

/// Trait for handling security events.
pub trait SecurityEventHandler: Send + Sync {
    fn handle(&self, event: &SecurityEvent);
}

/// Emits each event through `tracing` under the `security_audit` target.
#[derive(Debug, Default)]
pub struct TracingHandler {
    min_severity: SecurityEventSeverity,
}

impl TracingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set minimum severity to log.
    pub fn min_severity(mut self, severity: SecurityEventSeverity) -> Self {
        self.min_severity = severity;
        self
    }
}

impl SecurityEventHandler for TracingHandler {
    fn handle(&self, event: &SecurityEvent) {
        if event.severity < self.min_severity {
            return;
        }
        let line = event.to_log_line();
        let event_type = event.event_type.to_string();
        match event.severity {
            SecurityEventSeverity::Info => {
                tracing::info!(target: "security_audit", event_type = %event_type, "{}", line)
            }
            SecurityEventSeverity::Warning => {
                tracing::warn!(target: "security_audit", event_type = %event_type, "{}", line)
            }
            SecurityEventSeverity::Error | SecurityEventSeverity::Critical => {
                tracing::error!(target: "security_audit", event_type = %event_type, "{}", line)
            }
        }
    }
}

/// Handler that calls a closure.
pub struct ClosureHandler<F>
where
    F: Fn(&SecurityEvent) + Send + Sync,
{
    handler: F,
}

impl<F> ClosureHandler<F>
where
    F: Fn(&SecurityEvent) + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> SecurityEventHandler for ClosureHandler<F>
where
    F: Fn(&SecurityEvent) + Send + Sync,
{
    fn handle(&self, event: &SecurityEvent) {
        (self.handler)(event);
    }
}

/// In-memory event store for testing and debugging.
///
/// Clones share the same buffer, so a clone can be registered with the
/// logger while the original is inspected.
#[derive(Clone)]
pub struct InMemoryEventStore {
    events: Arc<Mutex<Vec<SecurityEvent>>>,
    max_events: usize,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            max_events: 10000,
        }
    }

    /// Set maximum events to keep. The oldest events are dropped first.
    pub fn max_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }

    pub fn get_events(&self) -> Vec<SecurityEvent> {
        self.lock().clone()
    }

    pub fn get_events_by_type(&self, event_type: &SecurityEventType) -> Vec<SecurityEvent> {
        self.lock()
            .iter()
            .filter(|e| &e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Event types in the order they were logged.
    pub fn event_types(&self) -> Vec<SecurityEventType> {
        self.lock().iter().map(|e| e.event_type.clone()).collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SecurityEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SecurityEventHandler for InMemoryEventStore {
    fn handle(&self, event: &SecurityEvent) {
        let mut events = self.lock();
        events.push(event.clone());
        if events.len() > self.max_events {
            events.remove(0);
        }
    }
}

// =============================================================================
// Audit Logger
// =============================================================================

/// Dispatches events to every registered handler.
#[derive(Clone)]
pub struct AuditLogger {
    handlers: Vec<Arc<dyn SecurityEventHandler>>,
    enabled: bool,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Create a new audit logger with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            enabled: true,
        }
    }

    /// Create an audit logger that forwards to `tracing`.
    pub fn with_tracing() -> Self {
        Self::new().add_handler(TracingHandler::new())
    }

    pub fn add_handler<H: SecurityEventHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Add a closure as event handler.
    pub fn with_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&SecurityEvent) + Send + Sync + 'static,
    {
        self.add_handler(ClosureHandler::new(handler))
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn log(&self, event: SecurityEvent) {
        if !self.enabled {
            return;
        }

        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

impl fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLogger")
            .field("handlers", &self.handlers.len())
            .field("enabled", &self.enabled)
            .finish()
    }
}
