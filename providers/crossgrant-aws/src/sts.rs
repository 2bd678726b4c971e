use async_trait::async_trait;
use aws_sdk_sts::Client as StsClient;
use crossgrant_core::remote::TokenService;
use crossgrant_spec::{RemoteError, Service, TemporaryCredential};

use crate::errors::remote_error;

/// Token-exchange service backed by STS.
#[derive(Clone)]
pub struct AwsToken {
    sts: StsClient,
}

impl AwsToken {
    pub fn new(sts: StsClient) -> Self {
        Self { sts }
    }
}

#[async_trait]
impl TokenService for AwsToken {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<TemporaryCredential, RemoteError> {
        const OP: &str = "assume_role";
        let output = self
            .sts
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .send()
            .await
            .map_err(|err| remote_error(Service::Token, OP, err))?;

        let credentials = output.credentials().ok_or_else(|| {
            RemoteError::permanent(Service::Token, OP, "response carried no credentials")
        })?;
        let expiration = credentials
            .expiration()
            .to_millis()
            .map_err(|err| RemoteError::permanent(Service::Token, OP, err.to_string()))?;

        Ok(TemporaryCredential {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration,
        })
    }
}
