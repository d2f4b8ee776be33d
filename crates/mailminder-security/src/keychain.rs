use crate::{OAuthTokenResult, SecurityError};
use chrono::{DateTime, Duration, Utc};
use mailminder_core::AccessToken;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct SecretStore {
    service_name: String,
}

#[derive(Debug, Clone)]
pub struct SecretKey {
    pub namespace: String,
    pub id: String,
}

impl SecretKey {
    pub fn as_username(&self) -> String {
        format!("{}:{}", self.namespace, self.id)
    }
}

impl SecretStore {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn set(&self, key: &SecretKey, value: &str) -> Result<(), SecurityError> {
        let entry = keyring::Entry::new(&self.service_name, &key.as_username())?;
        entry.set_password(value)?;
        Ok(())
    }

    pub fn get(&self, key: &SecretKey) -> Result<Option<String>, SecurityError> {
        let entry = keyring::Entry::new(&self.service_name, &key.as_username())?;
        match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn delete(&self, key: &SecretKey) -> Result<(), SecurityError> {
        let entry = keyring::Entry::new(&self.service_name, &key.as_username())?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

/// Tokens within this margin of their expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// A cached access token with what is needed to judge and renew it.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub access_token: AccessToken,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// A token with no known lifetime.
    pub fn new(access_token: AccessToken) -> Self {
        Self {
            access_token,
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Stamps a token endpoint result with its absolute expiry.
    pub fn issued(result: OAuthTokenResult, now: DateTime<Utc>) -> Self {
        let expires_at = result
            .expires_in_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| now + Duration::seconds(secs));
        Self {
            access_token: result.access_token,
            refresh_token: result.refresh_token,
            expires_at,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => at - Duration::seconds(EXPIRY_SKEW_SECS) > now,
            None => true,
        }
    }
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &self.access_token)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Where acquired access tokens are kept between silent lookups.
pub trait TokenCache: Send + Sync {
    fn load(&self) -> Result<Option<CachedToken>, SecurityError>;
    fn store(&self, entry: &CachedToken) -> Result<(), SecurityError>;
    /// Drops the entry if `token` is its access token.
    fn clear(&self, token: &AccessToken) -> Result<(), SecurityError>;
}

/// Keychain form of a [`CachedToken`].
#[derive(Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Entries that are not JSON hold a bare access token.
    fn decode(raw: String) -> Self {
        serde_json::from_str(&raw).unwrap_or(Self {
            access_token: raw,
            refresh_token: None,
            expires_at: None,
        })
    }
}

impl From<StoredToken> for CachedToken {
    fn from(stored: StoredToken) -> Self {
        Self {
            access_token: AccessToken::new(stored.access_token),
            refresh_token: stored.refresh_token,
            expires_at: stored.expires_at,
        }
    }
}

impl From<&CachedToken> for StoredToken {
    fn from(entry: &CachedToken) -> Self {
        Self {
            access_token: entry.access_token.secret().to_string(),
            refresh_token: entry.refresh_token.clone(),
            expires_at: entry.expires_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeychainTokenCache {
    secrets: SecretStore,
    key: SecretKey,
}

impl KeychainTokenCache {
    pub fn new(secrets: SecretStore, account: impl Into<String>) -> Self {
        Self {
            secrets,
            key: SecretKey {
                namespace: "oauth_access_token".to_string(),
                id: account.into(),
            },
        }
    }
}

impl TokenCache for KeychainTokenCache {
    fn load(&self) -> Result<Option<CachedToken>, SecurityError> {
        Ok(self
            .secrets
            .get(&self.key)?
            .map(|raw| StoredToken::decode(raw).into()))
    }

    fn store(&self, entry: &CachedToken) -> Result<(), SecurityError> {
        let raw = serde_json::to_string(&StoredToken::from(entry))?;
        self.secrets.set(&self.key, &raw)
    }

    fn clear(&self, token: &AccessToken) -> Result<(), SecurityError> {
        match self.load()? {
            Some(cached) if cached.access_token == *token => self.secrets.delete(&self.key),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl MemoryTokenCache {
    pub fn with_token(token: AccessToken) -> Self {
        Self::with_entry(CachedToken::new(token))
    }

    pub fn with_entry(entry: CachedToken) -> Self {
        Self {
            slot: Mutex::new(Some(entry)),
        }
    }
}

impl TokenCache for MemoryTokenCache {
    fn load(&self) -> Result<Option<CachedToken>, SecurityError> {
        Ok(self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn store(&self, entry: &CachedToken) -> Result<(), SecurityError> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(entry.clone());
        Ok(())
    }

    fn clear(&self, token: &AccessToken) -> Result<(), SecurityError> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().map(|entry| &entry.access_token) == Some(token) {
            *slot = None;
        }
        Ok(())
    }
}
