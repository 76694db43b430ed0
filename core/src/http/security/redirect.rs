//! Post-login redirect target validation (open-redirect protection).
//!
//! A redirect target either stays same-origin or points at a host on the
//! allow-list. Anything else is reduced to its path and query, so the caller
//! never receives a cross-origin redirect string.
//!
//! # Usage
//!
//! ```
//! use actix_shibboleth_core::http::security::redirect::RedirectValidator;
//!
//! let validator = RedirectValidator::builder().allow("hzdr.de").build();
//!
//! assert_eq!(validator.sanitize(Some("/deposit/new?c=rodare")), "/deposit/new?c=rodare");
//! assert_eq!(
//!     validator.sanitize(Some("https://hzdr.de/path?parameter=test")),
//!     "https://hzdr.de/path?parameter=test"
//! );
//! assert_eq!(
//!     validator.sanitize(Some("http://fzr.de/path?parameter=test")),
//!     "/path?parameter=test"
//! );
//! assert_eq!(validator.sanitize(None), "/");
//! ```

use std::collections::HashSet;

use url::Url;

/// Target used when no usable redirect was supplied.
pub const DEFAULT_REDIRECT: &str = "/";

// Base for resolving relative candidates. Never emitted.
const PLACEHOLDER_BASE: &str = "http://redirect.invalid/";
const PLACEHOLDER_HOST: &str = "redirect.invalid";

/// Restricts redirect targets to same-origin paths and allow-listed hosts.
#[derive(Debug, Clone, Default)]
pub struct RedirectValidator {
    allowed_hosts: HashSet<String>,
}

impl RedirectValidator {
    /// Creates a validator for the given hosts.
    ///
    /// Hosts are compared case-insensitively and without port.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_hosts: hosts
                .into_iter()
                .map(|h| normalize_host(h.as_ref()))
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Creates a builder for more complex configuration.
    pub fn builder() -> RedirectValidatorBuilder {
        RedirectValidatorBuilder::default()
    }

    /// Returns the allow-listed hosts.
    pub fn allowed_hosts(&self) -> &HashSet<String> {
        &self.allowed_hosts
    }

    /// Checks whether `host` is on the allow-list.
    pub fn is_allowed(&self, host: &str) -> bool {
        self.allowed_hosts.contains(&normalize_host(host))
    }

    /// Returns a redirect target that is safe to send to the browser.
    pub fn sanitize(&self, candidate: Option<&str>) -> String {
        sanitize(candidate, &self.allowed_hosts)
    }
}

/// Builder for `RedirectValidator`.
#[derive(Debug, Clone, Default)]
pub struct RedirectValidatorBuilder {
    allowed_hosts: Vec<String>,
}

impl RedirectValidatorBuilder {
    /// Adds an allowed host.
    pub fn allow(mut self, host: &str) -> Self {
        self.allowed_hosts.push(host.to_string());
        self
    }

    /// Adds multiple allowed hosts.
    pub fn allow_all<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_hosts
            .extend(hosts.into_iter().map(|h| h.as_ref().to_string()));
        self
    }

    /// Builds the validator.
    pub fn build(self) -> RedirectValidator {
        RedirectValidator::new(self.allowed_hosts)
    }
}

/// Sanitizes a redirect candidate against `allowed_hosts`.
///
/// `allowed_hosts` must already be lowercase.
///
/// - absent or empty: `"/"`
/// - relative path: unchanged
/// - http(s) URL on an allowed host: unchanged
/// - http(s) URL on any other host: path and query only
/// - any other scheme: `"/"`
///
/// Scheme-relative (`//host/...`) and backslash forms are treated as URLs with
/// a host, because that is how browsers follow them.
pub fn sanitize(candidate: Option<&str>, allowed_hosts: &HashSet<String>) -> String {
    let candidate = match candidate.map(str::trim) {
        Some(c) if !c.is_empty() => c,
        _ => return DEFAULT_REDIRECT.to_string(),
    };

    match Url::parse(candidate) {
        Ok(url) => {
            if !matches!(url.scheme(), "http" | "https") {
                return DEFAULT_REDIRECT.to_string();
            }
            match url.host_str() {
                Some(host) if allowed_hosts.contains(&normalize_host(host)) => {
                    candidate.to_string()
                }
                Some(_) => path_and_query(&url),
                None => DEFAULT_REDIRECT.to_string(),
            }
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let Ok(base) = Url::parse(PLACEHOLDER_BASE) else {
                return DEFAULT_REDIRECT.to_string();
            };
            match base.join(candidate) {
                Ok(resolved) => match resolved.host_str() {
                    Some(PLACEHOLDER_HOST) => candidate.to_string(),
                    Some(host) if allowed_hosts.contains(&normalize_host(host)) => {
                        candidate.to_string()
                    }
                    _ => path_and_query(&resolved),
                },
                Err(_) => DEFAULT_REDIRECT.to_string(),
            }
        }
        Err(_) => DEFAULT_REDIRECT.to_string(),
    }
}

/// Path and query of `url`, leading slashes collapsed so the result can never
/// be read as a scheme-relative URL.
fn path_and_query(url: &Url) -> String {
    let path = format!("/{}", url.path().trim_start_matches(['/', '\\']));
    match url.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}
