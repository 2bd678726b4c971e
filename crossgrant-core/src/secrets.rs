use async_trait::async_trait;
use crossgrant_spec::{Error, Result, SecretToken};
use uuid::Uuid;

use crate::retry::RetryPolicy;

/// Key/value store holding credential material.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Stored value, or `None` when the key is unknown.
    async fn resolve(&self, key: &str) -> Result<Option<String>>;

    /// Create or overwrite the value under `key`.
    async fn store(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Resolve and parse the credentials stored under `key`.
pub async fn resolve_secret_token(
    store: &dyn SecretStore,
    retry: &RetryPolicy,
    key: &str,
) -> Result<SecretToken> {
    let raw = retry
        .run("resolve_secret", || store.resolve(key))
        .await?
        .ok_or_else(|| Error::SecretUnresolvable { key: key.to_string() })?;

    SecretToken::from_json(&raw).map_err(|err| Error::InvalidSecret {
        key: key.to_string(),
        reason: err.to_string(),
    })
}

/// Key the temporary credentials of a provisioning request are stored under.
pub fn temporary_secret_key(resource_definition_id: &str) -> String {
    format!(
        "resourceDefinition-{resource_definition_id}-secret-{}",
        Uuid::new_v4()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySecretStore;

    #[tokio::test]
    async fn resolves_stored_key_pair() {
        let store = MemorySecretStore::new();
        store
            .store("k", r#"{"accessKeyId":"AKIA","secretAccessKey":"s"}"#)
            .await
            .unwrap();

        let token = resolve_secret_token(&store, &RetryPolicy::immediate(0), "k")
            .await
            .unwrap();
        assert_eq!(token.access_key_id(), "AKIA");
    }

    #[tokio::test]
    async fn unknown_key_is_unresolvable() {
        let store = MemorySecretStore::new();
        let err = resolve_secret_token(&store, &RetryPolicy::immediate(0), "missing")
            .await
            .unwrap_err();
        assert_eq!(err, Error::SecretUnresolvable { key: "missing".into() });
    }

    #[tokio::test]
    async fn unparsable_secret_is_rejected() {
        let store = MemorySecretStore::new();
        store.store("k", "plain text").await.unwrap();
        let err = resolve_secret_token(&store, &RetryPolicy::immediate(0), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSecret { ref key, .. } if key == "k"));
    }

    #[test]
    fn temporary_keys_are_unique_per_call() {
        let first = temporary_secret_key("rd-1");
        let second = temporary_secret_key("rd-1");
        assert!(first.starts_with("resourceDefinition-rd-1-secret-"));
        assert_ne!(first, second);
    }
}
