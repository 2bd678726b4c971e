use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const SESSION_TOKEN_FIELD: &str = "sessionToken";

/// Long-lived access key pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticCredential {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Session credentials minted by the token-exchange service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryCredential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// Absolute expiry as milliseconds since the unix epoch.
    #[serde(default)]
    pub expiration: i64,
}

impl TemporaryCredential {
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.expiration) * 1_000_000).ok()
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at().is_some_and(|expiry| expiry <= now)
    }
}

/// Credential material kept in the secret store.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SecretToken {
    Permanent(StaticCredential),
    Temporary(TemporaryCredential),
}

impl SecretToken {
    /// Parse a stored secret. Payloads carrying a `sessionToken` field are
    /// temporary credentials, everything else is a static key pair.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if value.get(SESSION_TOKEN_FIELD).is_some() {
            serde_json::from_value(value).map(SecretToken::Temporary)
        } else {
            serde_json::from_value(value).map(SecretToken::Permanent)
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn access_key_id(&self) -> &str {
        match self {
            SecretToken::Permanent(token) => &token.access_key_id,
            SecretToken::Temporary(token) => &token.access_key_id,
        }
    }

    pub fn secret_access_key(&self) -> &str {
        match self {
            SecretToken::Permanent(token) => &token.secret_access_key,
            SecretToken::Temporary(token) => &token.secret_access_key,
        }
    }

    pub fn session_token(&self) -> Option<&str> {
        match self {
            SecretToken::Permanent(_) => None,
            SecretToken::Temporary(token) => Some(&token.session_token),
        }
    }

    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        match self {
            SecretToken::Permanent(_) => None,
            SecretToken::Temporary(token) => token.expires_at(),
        }
    }
}

impl fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for TemporaryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretToken::Permanent(token) => token.fmt(f),
            SecretToken::Temporary(token) => token.fmt(f),
        }
    }
}
