use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_iam::Client as IamClient;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_sts::Client as StsClient;
use aws_types::SdkConfig;
use aws_types::region::Region;
use crossgrant_core::remote::{
    BucketPolicyService, ClientAccessor, ClientCache, ClientTarget, IdentityService, TokenService,
};
use crossgrant_spec::{Result, SecretToken};
use tracing::debug;

use crate::iam::AwsIdentity;
use crate::s3::AwsBucket;
use crate::sts::AwsToken;

const CREDENTIALS_PROVIDER: &str = "crossgrant";

/// Client accessor building SDK clients from one shared configuration, with a
/// region and endpoint per target.
pub struct AwsClientAccessor {
    shared: SdkConfig,
    default_endpoint: Option<String>,
    iam: ClientCache<IamClient>,
    sts: ClientCache<StsClient>,
    s3: ClientCache<S3Client>,
}

impl AwsClientAccessor {
    /// `default_endpoint` applies to targets that carry no endpoint override.
    pub fn new(shared: SdkConfig, default_endpoint: Option<String>) -> Self {
        Self {
            shared,
            default_endpoint,
            iam: ClientCache::new(),
            sts: ClientCache::new(),
            s3: ClientCache::new(),
        }
    }

    fn endpoint<'a>(&'a self, target: &'a ClientTarget) -> Option<&'a str> {
        target
            .endpoint_override
            .as_deref()
            .or(self.default_endpoint.as_deref())
    }

    pub(crate) fn iam_config(&self, target: &ClientTarget) -> aws_sdk_iam::Config {
        let mut builder = aws_sdk_iam::config::Builder::from(&self.shared)
            .region(Region::new(target.region.clone()));
        if let Some(endpoint) = self.endpoint(target) {
            builder = builder.endpoint_url(endpoint);
        }
        builder.build()
    }

    pub(crate) fn sts_config(&self, target: &ClientTarget) -> aws_sdk_sts::Config {
        let mut builder = aws_sdk_sts::config::Builder::from(&self.shared)
            .region(Region::new(target.region.clone()));
        if let Some(endpoint) = self.endpoint(target) {
            builder = builder.endpoint_url(endpoint);
        }
        builder.build()
    }

    pub(crate) fn s3_config(
        &self,
        target: &ClientTarget,
        credentials: Option<&SecretToken>,
    ) -> aws_sdk_s3::Config {
        let mut builder = aws_sdk_s3::config::Builder::from(&self.shared)
            .region(Region::new(target.region.clone()));
        if let Some(endpoint) = self.endpoint(target) {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        if let Some(token) = credentials {
            builder = builder.credentials_provider(static_credentials(token));
        }
        builder.build()
    }

    async fn iam_client(&self, target: &ClientTarget) -> Result<IamClient> {
        self.iam
            .get_or_try_insert(target, || async {
                debug!(region = %target.region, "building iam client");
                Ok(IamClient::from_conf(self.iam_config(target)))
            })
            .await
    }

    async fn sts_client(&self, target: &ClientTarget) -> Result<StsClient> {
        self.sts
            .get_or_try_insert(target, || async {
                debug!(region = %target.region, "building sts client");
                Ok(StsClient::from_conf(self.sts_config(target)))
            })
            .await
    }
}

fn static_credentials(token: &SecretToken) -> Credentials {
    Credentials::new(
        token.access_key_id(),
        token.secret_access_key(),
        token.session_token().map(str::to_string),
        token.expires_at().map(SystemTime::from),
        CREDENTIALS_PROVIDER,
    )
}

#[async_trait]
impl ClientAccessor for AwsClientAccessor {
    async fn identity_client(&self, target: &ClientTarget) -> Result<Arc<dyn IdentityService>> {
        let iam = self.iam_client(target).await?;
        let sts = self.sts_client(target).await?;
        Ok(Arc::new(AwsIdentity::new(iam, sts)))
    }

    async fn token_client(&self, target: &ClientTarget) -> Result<Arc<dyn TokenService>> {
        let sts = self.sts_client(target).await?;
        Ok(Arc::new(AwsToken::new(sts)))
    }

    async fn bucket_client(&self, target: &ClientTarget) -> Result<Arc<dyn BucketPolicyService>> {
        let s3 = self
            .s3
            .get_or_try_insert(target, || async {
                debug!(region = %target.region, "building s3 client");
                Ok(S3Client::from_conf(self.s3_config(target, None)))
            })
            .await?;
        Ok(Arc::new(AwsBucket::new(s3)))
    }

    async fn ephemeral_bucket_client(
        &self,
        target: &ClientTarget,
        credentials: &SecretToken,
    ) -> Result<Arc<dyn BucketPolicyService>> {
        debug!(region = %target.region, "building s3 client with destination credentials");
        let s3 = S3Client::from_conf(self.s3_config(target, Some(credentials)));
        Ok(Arc::new(AwsBucket::new(s3)))
    }

    async fn shutdown(&self) {
        self.iam.clear().await;
        self.sts.clear().await;
        self.s3.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_config::BehaviorVersion;
    use aws_credential_types::provider::ProvideCredentials;
    use crossgrant_spec::{StaticCredential, TemporaryCredential};

    fn accessor() -> AwsClientAccessor {
        let shared = SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        AwsClientAccessor::new(shared, None)
    }

    #[test]
    fn configs_follow_the_target_region() {
        let accessor = accessor();
        let target = ClientTarget::new("eu-west-1", None);
        assert_eq!(
            accessor.s3_config(&target, None).region(),
            Some(&Region::new("eu-west-1"))
        );
        assert_eq!(
            accessor.iam_config(&ClientTarget::global(None)).region(),
            Some(&Region::new("aws-global"))
        );
        assert_eq!(
            accessor.sts_config(&target).region(),
            Some(&Region::new("eu-west-1"))
        );
    }

    #[tokio::test]
    async fn ephemeral_config_uses_the_given_credentials() {
        let accessor = accessor();
        let token = SecretToken::Temporary(TemporaryCredential {
            access_key_id: "AKIA-TEMP".into(),
            secret_access_key: "secret".into(),
            session_token: "session".into(),
            expiration: 4_102_444_800_000,
        });
        let config = accessor.s3_config(&ClientTarget::new("us-east-1", None), Some(&token));
        let provider = config.credentials_provider().unwrap();
        let credentials = provider.provide_credentials().await.unwrap();

        assert_eq!(credentials.access_key_id(), "AKIA-TEMP");
        assert_eq!(credentials.session_token(), Some("session"));
        assert!(credentials.expiry().is_some());
    }

    #[tokio::test]
    async fn permanent_credentials_have_no_session() {
        let accessor = accessor();
        let token = SecretToken::Permanent(StaticCredential {
            access_key_id: "AKIA-STATIC".into(),
            secret_access_key: "secret".into(),
        });
        let config = accessor.s3_config(&ClientTarget::new("us-east-1", None), Some(&token));
        let credentials = config
            .credentials_provider()
            .unwrap()
            .provide_credentials()
            .await
            .unwrap();

        assert_eq!(credentials.access_key_id(), "AKIA-STATIC");
        assert_eq!(credentials.session_token(), None);
        assert_eq!(credentials.expiry(), None);
    }
}
