//! Credential holder shared by the remote store and the recording client.
//!
//! Login flows are out of scope; something else hands us a bearer token.
//! Any collaborator that sees HTTP 401 calls [`AuthSession::clear`] and the
//! rest of the engine falls back to local-only operation.

use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Stable account identifier, used to namespace the local store.
    pub account: String,
    pub token: String,
}

#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    inner: Arc<RwLock<Option<Credentials>>>,
}

impl AuthSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_credentials(account: impl Into<String>, token: impl Into<String>) -> Self {
        let session = Self::default();
        session.set(account, token);
        session
    }

    pub fn set(&self, account: impl Into<String>, token: impl Into<String>) {
        let creds = Credentials {
            account: account.into(),
            token: token.into(),
        };
        match self.inner.write() {
            Ok(mut guard) => *guard = Some(creds),
            Err(poisoned) => *poisoned.into_inner() = Some(creds),
        }
    }

    pub fn clear(&self) {
        let had = match self.inner.write() {
            Ok(mut guard) => guard.take().is_some(),
            Err(poisoned) => poisoned.into_inner().take().is_some(),
        };
        if had {
            tracing::warn!("credentials cleared after authentication failure");
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.credentials().map(|c| c.token)
    }

    pub fn account(&self) -> Option<String> {
        self.credentials().map(|c| c.account)
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials().is_some()
    }
}

/// Thin wrapper around the OS keyring for credential storage.
pub mod keyring_store {
    use crate::error::Result;

    const SERVICE: &str = "pomosync";

    pub fn get(key: &str) -> Result<Option<String>> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(key: &str, value: &str) -> Result<()> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    pub fn delete(key: &str) -> Result<()> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
