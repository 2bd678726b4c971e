use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use crossgrant_core::remote::{BucketPolicyService, StoredPolicy};
use crossgrant_spec::{RemoteError, Service};
use tracing::debug;

use crate::errors::{error_code, remote_error};

const NO_SUCH_BUCKET_POLICY: &str = "NoSuchBucketPolicy";

/// Bucket-policy service backed by S3.
///
/// S3 has no conditional bucket-policy writes: reads carry no revision and
/// writes ignore the expected one.
#[derive(Clone)]
pub struct AwsBucket {
    s3: S3Client,
}

impl AwsBucket {
    pub fn new(s3: S3Client) -> Self {
        Self { s3 }
    }
}

#[async_trait]
impl BucketPolicyService for AwsBucket {
    async fn get_policy(&self, bucket: &str) -> Result<Option<StoredPolicy>, RemoteError> {
        match self.s3.get_bucket_policy().bucket(bucket).send().await {
            Ok(output) => Ok(output.policy().map(|document| StoredPolicy {
                document: document.to_string(),
                revision: None,
            })),
            Err(err) if error_code(&err) == Some(NO_SUCH_BUCKET_POLICY) => {
                debug!(bucket, "no bucket policy");
                Ok(None)
            }
            Err(err) => Err(remote_error(Service::Bucket, "get_bucket_policy", err)),
        }
    }

    async fn put_policy(
        &self,
        bucket: &str,
        document: &str,
        _expected: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.s3
            .put_bucket_policy()
            .bucket(bucket)
            .policy(document)
            .send()
            .await
            .map_err(|err| remote_error(Service::Bucket, "put_bucket_policy", err))?;
        Ok(())
    }

    async fn delete_policy(&self, bucket: &str, _expected: Option<&str>) -> Result<(), RemoteError> {
        self.s3
            .delete_bucket_policy()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| remote_error(Service::Bucket, "delete_bucket_policy", err))?;
        Ok(())
    }
}
