//! AWS backends for crossgrant: IAM roles, STS sessions, S3 bucket policies
//! and a Secrets Manager secret store.

use std::env;
use std::sync::Arc;

use anyhow::Result;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use aws_types::SdkConfig;
use aws_types::region::Region;
use crossgrant_core::{ClientAccessor, SecretStore};
use tracing::info;

mod accessor;
mod errors;
mod iam;
mod s3;
mod secrets_manager;
mod sts;

pub use accessor::AwsClientAccessor;
pub use errors::{classify, remote_error};
pub use iam::AwsIdentity;
pub use s3::AwsBucket;
pub use secrets_manager::{AwsSecretsManagerStore, sanitize_key};
pub use sts::AwsToken;

const REGION_ENV: &str = "CROSSGRANT_AWS_REGION";
const ENDPOINT_ENV: &str = "CROSSGRANT_AWS_ENDPOINT";
const SECRET_PREFIX_ENV: &str = "CROSSGRANT_AWS_SECRET_PREFIX";
const SM_ENDPOINT_ENV: &str = "CROSSGRANT_AWS_SM_ENDPOINT";

/// Settings read from the environment on top of the default AWS chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsProviderConfig {
    pub region: Option<String>,
    /// Endpoint for IAM, STS and S3 when a data address names none.
    pub endpoint: Option<String>,
    pub secret_prefix: Option<String>,
    pub secrets_endpoint: Option<String>,
}

impl AwsProviderConfig {
    pub fn from_env() -> Self {
        Self {
            region: non_blank(REGION_ENV),
            endpoint: non_blank(ENDPOINT_ENV),
            secret_prefix: non_blank(SECRET_PREFIX_ENV),
            secrets_endpoint: non_blank(SM_ENDPOINT_ENV),
        }
    }

    /// Read the settings and load the shared SDK configuration.
    pub async fn load_from_env() -> Result<(Self, SdkConfig)> {
        let config = Self::from_env();
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(Region::new(region));
        }
        let shared = loader.load().await;
        Ok((config, shared))
    }

    pub fn build_accessor(&self, shared: &SdkConfig) -> Arc<dyn ClientAccessor> {
        Arc::new(AwsClientAccessor::new(shared.clone(), self.endpoint.clone()))
    }

    pub fn build_secret_store(&self, shared: &SdkConfig) -> Arc<dyn SecretStore> {
        let mut builder = aws_sdk_secretsmanager::config::Builder::from(shared);
        if let Some(endpoint) = self.secrets_endpoint.as_deref() {
            builder = builder.endpoint_url(endpoint);
        }
        let client = SecretsManagerClient::from_conf(builder.build());
        Arc::new(AwsSecretsManagerStore::new(client, self.secret_prefix.clone()))
    }
}

/// Client accessor and secret store wired from the environment.
pub struct AwsComponents {
    pub accessor: Arc<dyn ClientAccessor>,
    pub secrets: Arc<dyn SecretStore>,
}

pub async fn build_components() -> Result<AwsComponents> {
    let (config, shared) = AwsProviderConfig::load_from_env().await?;
    info!(
        region = ?shared.region().map(|region| region.to_string()),
        endpoint = ?config.endpoint,
        "aws backends configured"
    );
    Ok(AwsComponents {
        accessor: config.build_accessor(&shared),
        secrets: config.build_secret_store(&shared),
    })
}

fn non_blank(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
