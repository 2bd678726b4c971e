//! Forward pipeline: grants a source-side role write access to the
//! destination bucket and mints temporary credentials for it.

use std::future::Future;
use std::sync::Arc;

use crossgrant_spec::{
    DataAddress, Error, ProvisionRequest, ProvisionedGrant, ProvisionedRole, Result, SecretToken,
    Step,
};
use tracing::{Instrument, Span, debug, error, field, info, info_span, warn};

use crate::bucket_policy::BucketPolicyUpdate;
use crate::config::ProvisionConfig;
use crate::identifier::ResourceName;
use crate::locks::BucketLocks;
use crate::policy::{bucket_policy_statement, cross_account_role_policy, trust_policy};
use crate::remote::{
    BucketPolicyService, ClientAccessor, ClientTarget, CreateRole, IdentityService, RoleTag,
};
use crate::retry::RetryPolicy;
use crate::secrets::{SecretStore, resolve_secret_token, temporary_secret_key};
use crate::validation::validate_request;

pub const TAG_CREATED_BY: &str = "created-by";
pub const TAG_COMPONENT_ID: &str = "edc:component-id";
pub const TAG_TRANSFER_PROCESS_ID: &str = "edc:transfer-process-id";

/// Steps of one pipeline run that finished, for reporting an abort.
pub(crate) struct Progress {
    operation: &'static str,
    completed: Vec<Step>,
}

impl Progress {
    pub(crate) fn new(operation: &'static str) -> Self {
        Self {
            operation,
            completed: Vec::new(),
        }
    }

    /// Await `work` as `step`. A failure ends the run: completed steps are
    /// logged and returned with the cause, nothing is rolled back.
    pub(crate) async fn step<T>(
        &mut self,
        step: Step,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        debug!(step = %step, "step started");
        match work.await {
            Ok(value) => {
                self.completed.push(step);
                Ok(value)
            }
            Err(source) => {
                let completed: Vec<&str> = self.completed.iter().map(Step::as_str).collect();
                error!(
                    operation = self.operation,
                    step = %step,
                    ?completed,
                    error = %source,
                    "pipeline aborted"
                );
                Err(Error::Aborted {
                    operation: self.operation,
                    step,
                    completed: self.completed.clone(),
                    source: Box::new(source),
                })
            }
        }
    }
}

/// Bucket client for `destination`: an ephemeral client when the location
/// names its own credentials, the shared client otherwise.
pub(crate) async fn destination_bucket_client(
    accessor: &dyn ClientAccessor,
    secrets: &dyn SecretStore,
    retry: &RetryPolicy,
    destination: &DataAddress,
) -> Result<Arc<dyn BucketPolicyService>> {
    let target = ClientTarget::of(destination, "destination")?;
    match destination.key_name() {
        Some(key) => {
            let credentials = resolve_secret_token(secrets, retry, key).await?;
            accessor.ephemeral_bucket_client(&target, &credentials).await
        }
        None => accessor.bucket_client(&target).await,
    }
}

/// Runs the provisioning pipeline. Cheap to share; concurrent runs on the
/// same destination bucket serialise their policy updates.
pub struct Provisioner {
    accessor: Arc<dyn ClientAccessor>,
    secrets: Arc<dyn SecretStore>,
    config: ProvisionConfig,
    retry: RetryPolicy,
    locks: Arc<BucketLocks>,
}

impl Provisioner {
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

    pub async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionedGrant> {
        let span = info_span!(
            "provision",
            flow_id = %request.flow_id,
            resource = field::Empty
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &ProvisionRequest) -> Result<ProvisionedGrant> {
        let mut progress = Progress::new("provision");
        let retry = &self.retry;

        let name = progress
            .step(Step::Validate, async {
                self.config.validate()?;
                validate_request(request)?;
                ResourceName::for_flow(&request.flow_id)
            })
            .await?;
        Span::current().record("resource", name.as_str());

        let source = &request.source;
        let destination = &request.destination;
        // Validation guarantees these.
        let source_bucket = source.bucket_name().unwrap_or_default();
        let source_object = source.object_name().unwrap_or_default();
        let destination_bucket = destination.bucket_name().unwrap_or_default();
        let destination_object = destination.object_name().unwrap_or_default();

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

        let (identity, caller_arn) = progress
            .step(Step::IdentifyCaller, async {
                let identity = self
                    .accessor
                    .identity_client(&ClientTarget::global(source.endpoint_override()))
                    .await?;
                let caller_arn = retry
                    .run("get_caller_identity", || identity.caller_arn())
                    .await?;
                Ok((identity, caller_arn))
            })
            .await?;
        debug!(caller = %caller_arn, "resolved calling principal");

        let role = progress
            .step(Step::CreateRole, async {
                let definition = self.role_definition(&name, &request.flow_id, &caller_arn)?;
                self.create_or_reuse_role(identity.as_ref(), &definition).await
            })
            .await?;
        info!(role = %role.arn, "role ready");

        progress
            .step(Step::AttachRolePolicy, async {
                let document = cross_account_role_policy(
                    source_bucket,
                    source_object,
                    destination_bucket,
                    destination_object,
                )
                .to_json()
                .map_err(|err| Error::MalformedPolicy(err.to_string()))?;
                retry
                    .run("put_role_policy", || {
                        identity.put_role_policy(name.as_str(), name.as_str(), &document)
                    })
                    .await?;
                Ok(())
            })
            .await?;

        progress
            .step(Step::UpdateBucketPolicy, async {
                let statement = bucket_policy_statement(name.as_str(), &role.arn, destination_bucket);
                let _guard = self
                    .locks
                    .lock(destination.endpoint_override(), destination_bucket)
                    .await;
                let outcome = BucketPolicyUpdate::new(
                    bucket_client.as_ref(),
                    retry,
                    destination_bucket,
                    self.config.policy_update_attempts,
                )
                .merge(&statement)
                .await?;
                debug!(bucket = destination_bucket, ?outcome, "granted bucket access");
                Ok(())
            })
            .await?;

        let credentials = progress
            .step(Step::AssumeRole, async {
                let tokens = self
                    .accessor
                    .token_client(&ClientTarget::of(source, "source")?)
                    .await?;
                Ok(retry
                    .run("assume_role", || tokens.assume_role(&role.arn, name.as_str()))
                    .await?)
            })
            .await?;

        let secret_key = progress
            .step(Step::StoreCredentials, async {
                let key = temporary_secret_key(&request.id);
                let value = SecretToken::Temporary(credentials)
                    .to_json()
                    .map_err(|err| Error::SecretStore(err.to_string()))?;
                retry
                    .run("store_secret", || self.secrets.store(&key, &value))
                    .await?;
                Ok(key)
            })
            .await?;

        info!(secret_key = %secret_key, "grant provisioned");
        Ok(ProvisionedGrant::new(request.clone(), role, secret_key))
    }

    fn role_definition(
        &self,
        name: &ResourceName,
        flow_id: &str,
        caller_arn: &str,
    ) -> Result<CreateRole> {
        let trust_policy = trust_policy(caller_arn)
            .to_json()
            .map_err(|err| Error::MalformedPolicy(err.to_string()))?;
        Ok(CreateRole {
            name: name.to_string(),
            trust_policy,
            description: format!("Role for EDC transfer: {name}"),
            max_session_duration: self.config.max_role_session_duration,
            tags: vec![
                RoleTag::new(TAG_CREATED_BY, &self.config.creator),
                RoleTag::new(TAG_COMPONENT_ID, &self.config.component_id),
                RoleTag::new(TAG_TRANSFER_PROCESS_ID, flow_id),
            ],
        })
    }

    async fn create_or_reuse_role(
        &self,
        identity: &dyn IdentityService,
        definition: &CreateRole,
    ) -> Result<ProvisionedRole> {
        let created = self
            .retry
            .run("create_role", || identity.create_role(definition))
            .await;
        match created {
            Ok(role) => Ok(role),
            Err(err) if err.is_already_exists() => {
                warn!(role = %definition.name, "role exists from an earlier attempt, reusing it");
                Ok(self
                    .retry
                    .run("get_role", || identity.get_role(&definition.name))
                    .await?)
            }
            Err(err) => Err(err.into()),
        }
    }
}
