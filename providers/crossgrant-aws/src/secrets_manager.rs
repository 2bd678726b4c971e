use async_trait::async_trait;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use crossgrant_core::SecretStore;
use crossgrant_spec::{Error, RemoteErrorKind, Result, Service};
use tracing::{debug, warn};

use crate::errors::remote_error;

/// Longest secret name Secrets Manager accepts.
const KEY_SIZE_LIMIT: usize = 512;
/// Truncation length leaving room for the appended hash.
const TRUNCATED_KEY_LEN: usize = 500;

/// Secret store backed by AWS Secrets Manager. Keys are sanitised into valid
/// secret names and optionally prefixed.
#[derive(Clone)]
pub struct AwsSecretsManagerStore {
    client: SecretsManagerClient,
    prefix: Option<String>,
}

impl AwsSecretsManagerStore {
    pub fn new(client: SecretsManagerClient, prefix: Option<String>) -> Self {
        Self { client, prefix }
    }

    fn secret_name(&self, key: &str) -> String {
        let key = sanitize_key(key);
        match self.prefix.as_deref() {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key,
        }
    }

    async fn put_new_version(&self, name: &str, value: &str) -> Result<()> {
        self.client
            .put_secret_value()
            .secret_id(name)
            .secret_string(value)
            .send()
            .await
            .map_err(|err| remote_error(Service::Secrets, "put_secret_value", err))?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for AwsSecretsManagerStore {
    async fn resolve(&self, key: &str) -> Result<Option<String>> {
        let name = self.secret_name(key);
        match self.client.get_secret_value().secret_id(&name).send().await {
            Ok(output) => Ok(output.secret_string().map(str::to_string)),
            Err(err) => {
                let err = remote_error(Service::Secrets, "get_secret_value", err);
                if err.kind == RemoteErrorKind::NotFound {
                    debug!(secret = %name, "secret not found");
                    Ok(None)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn store(&self, key: &str, value: &str) -> Result<()> {
        let name = self.secret_name(key);
        let created = self
            .client
            .create_secret()
            .name(&name)
            .secret_string(value)
            .send()
            .await;
        match created {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = remote_error(Service::Secrets, "create_secret", err);
                if err.is_already_exists() {
                    self.put_new_version(&name, value).await
                } else {
                    Err(Error::from(err))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_secret()
            .secret_id(self.secret_name(key))
            .force_delete_without_recovery(true)
            .send()
            .await
            .map_err(|err| remote_error(Service::Secrets, "delete_secret", err))?;
        Ok(())
    }
}

/// Map any key onto a valid secret name. Characters outside
/// `[A-Za-z0-9/_+.@-]` become `-`, keys longer than the service limit are
/// truncated, and whenever the key changed the 32-bit polynomial hash of the
/// original key is appended to keep distinct keys apart.
pub fn sanitize_key(key: &str) -> String {
    let mut changed = false;
    let mut chars: Vec<char> = key.chars().collect();
    if chars.len() > KEY_SIZE_LIMIT {
        chars.truncate(TRUNCATED_KEY_LEN);
        changed = true;
    }

    let mut sanitized: String = chars
        .into_iter()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '+' | '.' | '@' | '-') {
                c
            } else {
                changed = true;
                '-'
            }
        })
        .collect();

    if changed {
        sanitized.push('_');
        sanitized.push_str(&string_hash(key).to_string());
        warn!(sanitized = %sanitized, "secret key rewritten into a valid secret name");
    }
    sanitized
}

/// `h = 31 * h + unit` over the UTF-16 code units, wrapping at 32 bits.
fn string_hash(value: &str) -> i32 {
    value
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_keys_are_unchanged() {
        for valid in ['_', '+', '-', '@', '/', '.'] {
            let key = format!("valid{valid}key");
            assert_eq!(sanitize_key(&key), key);
        }
        let generated = "resourceDefinition-5f0c2f5e-secret-0a1b2c3d-4e5f";
        assert_eq!(sanitize_key(generated), generated);
    }

    #[test]
    fn invalid_characters_are_replaced_and_hashed() {
        assert_eq!(sanitize_key("invalid#key"), "invalid-key_-954620461");
        assert_eq!(sanitize_key("resourceDefinition-1 2"), "resourceDefinition-1-2_379118647");
    }

    #[test]
    fn non_ascii_letters_are_replaced() {
        assert_eq!(sanitize_key("café"), "caf-_3045921");
    }

    #[test]
    fn long_keys_are_cut_to_fit() {
        let key = "-".repeat(10_000);
        let sanitized = sanitize_key(&key);
        assert_eq!(sanitized, format!("{}_-1704821504", "-".repeat(500)));
        assert_eq!(sanitized.len(), KEY_SIZE_LIMIT);

        let fits = "-".repeat(500);
        assert_eq!(sanitize_key(&fits), fits);
    }

    #[test]
    fn hash_matches_the_polynomial_definition() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("ab"), 97 * 31 + 98);
    }
}
