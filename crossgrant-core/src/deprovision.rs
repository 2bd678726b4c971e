//! Reverse pipeline: removes the bucket-policy statement, the role policy and
//! the role created for a grant. Missing pieces are tolerated so the pipeline
//! can run against partially provisioned grants and be retried.

use std::sync::Arc;

use crossgrant_spec::{Error, ProvisionedGrant, RemoteError, Result, Step, keys};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::bucket_policy::{BucketPolicyUpdate, PolicyOutcome};
use crate::config::ProvisionConfig;
use crate::locks::BucketLocks;
use crate::provision::{Progress, destination_bucket_client};
use crate::remote::{ClientAccessor, ClientTarget};
use crate::retry::RetryPolicy;
use crate::secrets::SecretStore;

pub struct Deprovisioner {
    accessor: Arc<dyn ClientAccessor>,
    secrets: Arc<dyn SecretStore>,
    config: ProvisionConfig,
    retry: RetryPolicy,
    locks: Arc<BucketLocks>,
}

impl Deprovisioner {
    pub fn new(
        accessor: Arc<dyn ClientAccessor>,
        secrets: Arc<dyn SecretStore>,
        config: ProvisionConfig,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            accessor,
            secrets,
            config,
            retry,
            locks: BucketLocks::shared(),
        }
    }

    /// Use a separate lock registry instead of the process-wide one.
    pub fn with_locks(mut self, locks: Arc<BucketLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn locks(&self) -> Arc<BucketLocks> {
        self.locks.clone()
    }

    pub async fn deprovision(&self, grant: &ProvisionedGrant) -> Result<()> {
        let span = info_span!(
            "deprovision",
            flow_id = %grant.flow_id(),
            resource = %grant.role.name
        );
        self.run(grant).instrument(span).await
    }

    async fn run(&self, grant: &ProvisionedGrant) -> Result<()> {
        let mut progress = Progress::new("deprovision");
        let retry = &self.retry;
        let name = grant.role.name.as_str();
        let request = &grant.request;
        let destination = &request.destination;

        let bucket_client = progress
            .step(
                Step::ResolveCredentials,
                destination_bucket_client(
                    self.accessor.as_ref(),
                    self.secrets.as_ref(),
                    retry,
                    destination,
                ),
            )
            .await?;

        progress
            .step(Step::RemoveBucketStatement, async {
                let bucket = destination.bucket_name().ok_or(Error::MissingProperty {
                    location: "destination",
                    field: keys::BUCKET_NAME,
                })?;
                let _guard = self.locks.lock(destination.endpoint_override(), bucket).await;
                let outcome = BucketPolicyUpdate::new(
                    bucket_client.as_ref(),
                    retry,
                    bucket,
                    self.config.policy_update_attempts,
                )
                .remove(name)
                .await?;
                match outcome {
                    PolicyOutcome::Unchanged => {
                        warn!(bucket, sid = name, "no bucket policy statement to remove")
                    }
                    outcome => debug!(bucket, ?outcome, "revoked bucket access"),
                }
                Ok(())
            })
            .await?;

        let identity = progress
            .step(Step::DeleteRolePolicy, async {
                let identity = self
                    .accessor
                    .identity_client(&ClientTarget::global(request.source.endpoint_override()))
                    .await?;
                let deleted = retry
                    .run("delete_role_policy", || identity.delete_role_policy(name, name))
                    .await;
                tolerate_missing(deleted, "role policy", name)?;
                Ok(identity)
            })
            .await?;

        progress
            .step(Step::DeleteRole, async {
                let deleted = retry
                    .run("delete_role", || identity.delete_role(name))
                    .await;
                tolerate_missing(deleted, "role", name)
            })
            .await?;

        info!("grant deprovisioned");
        Ok(())
    }
}

fn tolerate_missing(
    result: std::result::Result<(), RemoteError>,
    what: &str,
    name: &str,
) -> Result<()> {
    match result {
        Err(err) if err.is_not_found() => {
            warn!(name, "{what} already gone");
            Ok(())
        }
        other => Ok(other?),
    }
}
