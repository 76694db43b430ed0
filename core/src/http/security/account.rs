//! Mapping verified SAML attributes onto local accounts.
//!
//! Two steps run after the toolkit has accepted an assertion:
//!
//! 1. [`resolve`] turns the raw attribute map into an [`ExternalIdentity`]
//!    using the provider's [`AttributeMapping`]. Pure, no I/O.
//! 2. [`resolve_local_account`] finds or creates the matching local account
//!    through an [`AccountStore`].
//!
//! # Account linking policy
//!
//! When no account is linked to `(provider_id, external_id)` yet, an existing
//! account with the same email is linked to the new identity. This trusts the
//! IdP to assert only verified email addresses: an IdP that lets users choose
//! their email can take over any local account with that address. Deployments
//! federating with such IdPs should supply a store whose `find_by_email`
//! returns `None`.
//!
//! # Example
//! ```ignore
//! let identity = account::resolve(&attributes, &provider.attribute_mapping, &provider.id)?;
//! let resolution = account::resolve_local_account(store.as_ref(), &identity).await?;
//! session_login.login(&session, resolution.account())?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::http::security::provider::AttributeMapping;

// =============================================================================
// External Identity
// =============================================================================

/// Identity asserted by an IdP, after attribute mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub email: String,
    pub full_name: String,
    /// Value of the mapped `user_unique_id` attribute
    pub external_id: String,
    pub provider_id: String,
    /// Local username candidate, `external_id` up to the first `@`
    pub username: String,
}

/// Maps raw assertion attributes to an [`ExternalIdentity`].
///
/// Only the first value of a multi-valued attribute is used. An attribute that
/// is absent, has no values, or whose first value is empty is reported as
/// missing. So is a unique ID with nothing before its realm (`@hzdr.de`).
pub fn resolve(
    attributes: &HashMap<String, Vec<String>>,
    mapping: &AttributeMapping,
    provider_id: &str,
) -> Result<ExternalIdentity, AccountError> {
    let email = first_value(attributes, &mapping.email)?;
    let full_name = first_value(attributes, &mapping.full_name)?;
    let external_id = first_value(attributes, &mapping.user_unique_id)?;
    let username = username_candidate(&external_id);
    if username.is_empty() {
        return Err(AccountError::MissingAttribute {
            name: mapping.user_unique_id.clone(),
        });
    }

    Ok(ExternalIdentity {
        email,
        full_name,
        external_id,
        provider_id: provider_id.to_string(),
        username,
    })
}

fn first_value(
    attributes: &HashMap<String, Vec<String>>,
    name: &str,
) -> Result<String, AccountError> {
    attributes
        .get(name)
        .and_then(|values| values.first())
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or_else(|| AccountError::MissingAttribute {
            name: name.to_string(),
        })
}

fn username_candidate(external_id: &str) -> String {
    external_id
        .split('@')
        .next()
        .unwrap_or(external_id)
        .to_string()
}

// =============================================================================
// Local Account
// =============================================================================

/// Link between a local account and an IdP identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalIdLink {
    pub provider_id: String,
    pub external_id: String,
}

/// Account owned by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    pub id: u64,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub external_ids: Vec<ExternalIdLink>,
}

impl LocalAccount {
    pub fn is_linked_to(&self, provider_id: &str, external_id: &str) -> bool {
        self.external_ids
            .iter()
            .any(|l| l.provider_id == provider_id && l.external_id == external_id)
    }
}

/// How [`resolve_local_account`] arrived at the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountResolution {
    /// Already linked to this external identity
    Existing(LocalAccount),
    /// Found by email and linked to this external identity
    LinkedByEmail(LocalAccount),
    /// Registered from the external identity
    Created(LocalAccount),
}

impl AccountResolution {
    pub fn account(&self) -> &LocalAccount {
        match self {
            AccountResolution::Existing(a)
            | AccountResolution::LinkedByEmail(a)
            | AccountResolution::Created(a) => a,
        }
    }

    pub fn into_account(self) -> LocalAccount {
        match self {
            AccountResolution::Existing(a)
            | AccountResolution::LinkedByEmail(a)
            | AccountResolution::Created(a) => a,
        }
    }
}

// =============================================================================
// Account Error
// =============================================================================

/// Account resolution and storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum AccountError {
    #[display("required attribute '{name}' missing")]
    MissingAttribute { name: String },

    #[display("an account with email '{email}' already exists")]
    EmailTaken { email: String },

    #[display("username '{username}' is already taken")]
    UsernameTaken { username: String },

    #[display("account {account_id} not found")]
    NotFound { account_id: u64 },

    #[display("account storage error: {reason}")]
    Storage { reason: String },
}

// =============================================================================
// Account Store
// =============================================================================

/// Persistence of local accounts and their external identity links.
///
/// # Example
/// ```rust,ignore
/// #[async_trait]
/// impl AccountStore for PgAccountStore {
///     async fn find_by_external_id(
///         &self,
///         provider_id: &str,
///         external_id: &str,
///     ) -> Result<Option<LocalAccount>, AccountError> {
///         sqlx::query_as!(/* ... */)
///             .fetch_optional(&self.pool)
///             .await
///             .map_err(|e| AccountError::Storage { reason: e.to_string() })
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Account linked to `(provider_id, external_id)`.
    async fn find_by_external_id(
        &self,
        provider_id: &str,
        external_id: &str,
    ) -> Result<Option<LocalAccount>, AccountError>;

    /// Account registered with `email`.
    async fn find_by_email(&self, email: &str) -> Result<Option<LocalAccount>, AccountError>;

    /// Registers a new account linked to `identity`.
    async fn create_account(&self, identity: &ExternalIdentity)
        -> Result<LocalAccount, AccountError>;

    /// Links `identity` to an existing account and returns the updated account.
    async fn link_external_id(
        &self,
        account_id: u64,
        identity: &ExternalIdentity,
    ) -> Result<LocalAccount, AccountError>;
}

/// Finds or provisions the local account for `identity`.
///
/// Lookup order: existing link, then email (see the module docs), then
/// auto-registration.
pub async fn resolve_local_account(
    store: &dyn AccountStore,
    identity: &ExternalIdentity,
) -> Result<AccountResolution, AccountError> {
    if let Some(account) = store
        .find_by_external_id(&identity.provider_id, &identity.external_id)
        .await?
    {
        return Ok(AccountResolution::Existing(account));
    }

    if let Some(account) = store.find_by_email(&identity.email).await? {
        let linked = store.link_external_id(account.id, identity).await?;
        return Ok(AccountResolution::LinkedByEmail(linked));
    }

    let created = store.create_account(identity).await?;
    Ok(AccountResolution::Created(created))
}

// =============================================================================
// In-Memory Account Store
// =============================================================================

#[derive(Default)]
struct Accounts {
    by_id: HashMap<u64, LocalAccount>,
    next_id: u64,
}

/// In-memory implementation of [`AccountStore`].
///
/// Email lookups are case-insensitive.
#[derive(Clone, Default)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<Accounts>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account with no external links.
    pub async fn add_account(
        &self,
        email: &str,
        username: &str,
        full_name: &str,
    ) -> Result<LocalAccount, AccountError> {
        let mut accounts = self.accounts.write().await;
        Self::insert(&mut accounts, email, username, full_name, Vec::new())
    }

    pub async fn get(&self, account_id: u64) -> Option<LocalAccount> {
        self.accounts.read().await.by_id.get(&account_id).cloned()
    }

    pub async fn all(&self) -> Vec<LocalAccount> {
        let accounts = self.accounts.read().await;
        let mut all: Vec<_> = accounts.by_id.values().cloned().collect();
        all.sort_by_key(|a| a.id);
        all
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn insert(
        accounts: &mut Accounts,
        email: &str,
        username: &str,
        full_name: &str,
        external_ids: Vec<ExternalIdLink>,
    ) -> Result<LocalAccount, AccountError> {
        if accounts
            .by_id
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(email))
        {
            return Err(AccountError::EmailTaken {
                email: email.to_string(),
            });
        }
        if accounts.by_id.values().any(|a| a.username == username) {
            return Err(AccountError::UsernameTaken {
                username: username.to_string(),
            });
        }

        accounts.next_id += 1;
        let account = LocalAccount {
            id: accounts.next_id,
            email: email.to_string(),
            username: username.to_string(),
            full_name: full_name.to_string(),
            external_ids,
        };
        accounts.by_id.insert(account.id, account.clone());
        Ok(account)
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_external_id(
        &self,
        provider_id: &str,
        external_id: &str,
    ) -> Result<Option<LocalAccount>, AccountError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .by_id
            .values()
            .find(|a| a.is_linked_to(provider_id, external_id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<LocalAccount>, AccountError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .by_id
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_account(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<LocalAccount, AccountError> {
        let mut accounts = self.accounts.write().await;
        let link = ExternalIdLink {
            provider_id: identity.provider_id.clone(),
            external_id: identity.external_id.clone(),
        };
        Self::insert(
            &mut accounts,
            &identity.email,
            &identity.username,
            &identity.full_name,
            vec![link],
        )
    }

    async fn link_external_id(
        &self,
        account_id: u64,
        identity: &ExternalIdentity,
    ) -> Result<LocalAccount, AccountError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .by_id
            .get_mut(&account_id)
            .ok_or(AccountError::NotFound { account_id })?;

        if !account.is_linked_to(&identity.provider_id, &identity.external_id) {
            account.external_ids.push(ExternalIdLink {
                provider_id: identity.provider_id.clone(),
                external_id: identity.external_id.clone(),
            });
        }
        Ok(account.clone())
    }
}
