//! In-process stand-ins for the remote services and the secret store.
//!
//! `MemoryCloud` keeps roles and bucket policies in one shared state, hands
//! out clients through the regular [`ClientAccessor`] interface and supports
//! fault injection per operation, so pipelines can be exercised end to end
//! without network access.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use crossgrant_spec::{
    Error, PolicyDocument, ProvisionedRole, RemoteError, RemoteErrorKind, Result, SecretToken,
    Service, TemporaryCredential,
};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::remote::{
    BucketPolicyService, ClientAccessor, ClientCache, ClientTarget, CreateRole, IdentityService,
    StoredPolicy, TokenService,
};
use crate::secrets::SecretStore;

pub const DEFAULT_ACCOUNT: &str = "111111111111";
pub const DEFAULT_CALLER_ARN: &str = "arn:aws:iam::111111111111:user/transfer";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Secret store backed by a map.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<BTreeMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        lock(&self.secrets).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.secrets).keys().cloned().collect()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn resolve(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    async fn store(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.secrets).insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        lock(&self.secrets).remove(key);
        Ok(())
    }
}

/// A role as held by the in-memory identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRole {
    pub role: ProvisionedRole,
    pub definition: CreateRole,
    /// Inline policies by name.
    pub policies: BTreeMap<String, String>,
}

#[derive(Debug)]
struct StoredBucketPolicy {
    document: String,
    revision: u64,
}

type Hook = Box<dyn FnOnce(&MemoryCloud) + Send>;

#[derive(Default)]
struct CloudState {
    caller_arn: String,
    roles: BTreeMap<String, MemoryRole>,
    policies: HashMap<String, StoredBucketPolicy>,
    next_revision: u64,
    policy_writes: u64,
    faults: HashMap<&'static str, VecDeque<RemoteErrorKind>>,
    hooks: HashMap<&'static str, VecDeque<Hook>>,
    calls: Vec<&'static str>,
    ephemeral_keys: Vec<String>,
}

/// Shared in-memory identity, token and bucket services.
#[derive(Clone)]
pub struct MemoryCloud {
    state: Arc<Mutex<CloudState>>,
    identity_clients: Arc<ClientCache<Arc<MemoryIdentity>>>,
    token_clients: Arc<ClientCache<Arc<MemoryToken>>>,
    bucket_clients: Arc<ClientCache<Arc<MemoryBucket>>>,
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCloud {
    pub fn new() -> Self {
        let state = CloudState {
            caller_arn: DEFAULT_CALLER_ARN.to_string(),
            ..CloudState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            identity_clients: Arc::new(ClientCache::new()),
            token_clients: Arc::new(ClientCache::new()),
            bucket_clients: Arc::new(ClientCache::new()),
        }
    }

    pub fn with_caller_arn(self, arn: impl Into<String>) -> Self {
        lock(&self.state).caller_arn = arn.into();
        self
    }

    pub fn identity_service(&self) -> MemoryIdentity {
        MemoryIdentity {
            cloud: self.clone(),
        }
    }

    pub fn token_service(&self) -> MemoryToken {
        MemoryToken {
            cloud: self.clone(),
        }
    }

    pub fn bucket_service(&self) -> MemoryBucket {
        MemoryBucket {
            cloud: self.clone(),
        }
    }

    /// Fail the next `times` calls of `operation` with an error of `kind`.
    pub fn fail_next(&self, operation: &'static str, kind: RemoteErrorKind, times: usize) {
        lock(&self.state)
            .faults
            .entry(operation)
            .or_default()
            .extend(std::iter::repeat_n(kind, times));
    }

    /// Run `hook` right before the next call of `operation` is served.
    pub fn before_next<F>(&self, operation: &'static str, hook: F)
    where
        F: FnOnce(&MemoryCloud) + Send + 'static,
    {
        lock(&self.state)
            .hooks
            .entry(operation)
            .or_default()
            .push_back(Box::new(hook));
    }

    /// Operations served so far, in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.state).calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    pub fn role(&self, name: &str) -> Option<MemoryRole> {
        lock(&self.state).roles.get(name).cloned()
    }

    pub fn role_names(&self) -> Vec<String> {
        lock(&self.state).roles.keys().cloned().collect()
    }

    pub fn bucket_policy(&self, bucket: &str) -> Option<PolicyDocument> {
        let state = lock(&self.state);
        let stored = state.policies.get(bucket)?;
        PolicyDocument::from_json(&stored.document).ok()
    }

    pub fn set_bucket_policy(&self, bucket: &str, document: &PolicyDocument) {
        let raw = document.to_json().unwrap_or_default();
        self.set_raw_bucket_policy(bucket, &raw);
    }

    /// Store a policy verbatim, bypassing the write counter.
    pub fn set_raw_bucket_policy(&self, bucket: &str, document: &str) {
        let mut state = lock(&self.state);
        state.next_revision += 1;
        let revision = state.next_revision;
        state.policies.insert(
            bucket.to_string(),
            StoredBucketPolicy {
                document: document.to_string(),
                revision,
            },
        );
    }

    /// Successful policy puts and deletes served through the bucket service.
    pub fn policy_writes(&self) -> u64 {
        lock(&self.state).policy_writes
    }

    /// Access key ids ephemeral bucket clients were built with.
    pub fn ephemeral_access_keys(&self) -> Vec<String> {
        lock(&self.state).ephemeral_keys.clone()
    }

    pub async fn cached_clients(&self) -> usize {
        self.identity_clients.len().await
            + self.token_clients.len().await
            + self.bucket_clients.len().await
    }

    /// Record the call, run pending hooks and pop an injected fault.
    fn enter(&self, service: Service, operation: &'static str) -> std::result::Result<(), RemoteError> {
        let hook = {
            let mut state = lock(&self.state);
            state.calls.push(operation);
            state.hooks.get_mut(operation).and_then(VecDeque::pop_front)
        };
        if let Some(hook) = hook {
            hook(self);
        }

        let fault = lock(&self.state)
            .faults
            .get_mut(operation)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(kind) => Err(RemoteError::new(service, operation, kind, "injected fault")),
            None => Ok(()),
        }
    }
}

/// Identity service view of a [`MemoryCloud`].
#[derive(Clone)]
pub struct MemoryIdentity {
    cloud: MemoryCloud,
}

#[async_trait]
impl IdentityService for MemoryIdentity {
    async fn caller_arn(&self) -> std::result::Result<String, RemoteError> {
        self.cloud.enter(Service::Identity, "get_caller_identity")?;
        Ok(lock(&self.cloud.state).caller_arn.clone())
    }

    async fn create_role(
        &self,
        role: &CreateRole,
    ) -> std::result::Result<ProvisionedRole, RemoteError> {
        const OP: &str = "create_role";
        self.cloud.enter(Service::Identity, OP)?;
        let mut state = lock(&self.cloud.state);
        if state.roles.contains_key(&role.name) {
            return Err(RemoteError::new(
                Service::Identity,
                OP,
                RemoteErrorKind::AlreadyExists,
                format!("role with name {} already exists", role.name),
            ));
        }

        let provisioned = ProvisionedRole {
            name: role.name.clone(),
            arn: format!("arn:aws:iam::{DEFAULT_ACCOUNT}:role/{}", role.name),
            id: format!("AROA{}", Uuid::new_v4().simple()).to_uppercase(),
        };
        state.roles.insert(
            role.name.clone(),
            MemoryRole {
                role: provisioned.clone(),
                definition: role.clone(),
                policies: BTreeMap::new(),
            },
        );
        Ok(provisioned)
    }

    async fn get_role(&self, name: &str) -> std::result::Result<ProvisionedRole, RemoteError> {
        const OP: &str = "get_role";
        self.cloud.enter(Service::Identity, OP)?;
        lock(&self.cloud.state)
            .roles
            .get(name)
            .map(|role| role.role.clone())
            .ok_or_else(|| no_such_role(OP, name))
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> std::result::Result<(), RemoteError> {
        const OP: &str = "put_role_policy";
        self.cloud.enter(Service::Identity, OP)?;
        let mut state = lock(&self.cloud.state);
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| no_such_role(OP, role_name))?;
        role.policies
            .insert(policy_name.to_string(), document.to_string());
        Ok(())
    }

    async fn delete_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> std::result::Result<(), RemoteError> {
        const OP: &str = "delete_role_policy";
        self.cloud.enter(Service::Identity, OP)?;
        let mut state = lock(&self.cloud.state);
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| no_such_role(OP, role_name))?;
        match role.policies.remove(policy_name) {
            Some(_) => Ok(()),
            None => Err(RemoteError::not_found(
                Service::Identity,
                OP,
                format!("role policy {policy_name} not found"),
            )),
        }
    }

    async fn delete_role(&self, name: &str) -> std::result::Result<(), RemoteError> {
        const OP: &str = "delete_role";
        self.cloud.enter(Service::Identity, OP)?;
        let mut state = lock(&self.cloud.state);
        let role = state.roles.get(name).ok_or_else(|| no_such_role(OP, name))?;
        if !role.policies.is_empty() {
            return Err(RemoteError::permanent(
                Service::Identity,
                OP,
                "cannot delete entity, must delete policies first",
            ));
        }
        state.roles.remove(name);
        Ok(())
    }
}

fn no_such_role(operation: &'static str, name: &str) -> RemoteError {
    RemoteError::not_found(
        Service::Identity,
        operation,
        format!("the role with name {name} cannot be found"),
    )
}

/// Token service view of a [`MemoryCloud`].
#[derive(Clone)]
pub struct MemoryToken {
    cloud: MemoryCloud,
}

#[async_trait]
impl TokenService for MemoryToken {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> std::result::Result<TemporaryCredential, RemoteError> {
        const OP: &str = "assume_role";
        self.cloud.enter(Service::Token, OP)?;
        let state = lock(&self.cloud.state);
        let role = state
            .roles
            .values()
            .find(|role| role.role.arn == role_arn)
            .ok_or_else(|| {
                RemoteError::permanent(
                    Service::Token,
                    OP,
                    format!("not authorized to assume {role_arn}"),
                )
            })?;

        let lifetime = Duration::seconds(i64::from(role.definition.max_session_duration));
        let expiration = OffsetDateTime::now_utc() + lifetime;
        Ok(TemporaryCredential {
            access_key_id: format!("ASIA{}", &Uuid::new_v4().simple().to_string()[..16])
                .to_uppercase(),
            secret_access_key: Uuid::new_v4().simple().to_string(),
            session_token: format!("{session_name}:{}", Uuid::new_v4()),
            expiration: (expiration.unix_timestamp_nanos() / 1_000_000) as i64,
        })
    }
}

/// Bucket service view of a [`MemoryCloud`], with revision-checked writes.
#[derive(Clone)]
pub struct MemoryBucket {
    cloud: MemoryCloud,
}

impl MemoryBucket {
    fn check_revision(
        state: &CloudState,
        operation: &'static str,
        bucket: &str,
        expected: Option<&str>,
    ) -> std::result::Result<(), RemoteError> {
        let Some(expected) = expected else {
            return Ok(());
        };
        let current = state.policies.get(bucket).map(|stored| stored.revision.to_string());
        if current.as_deref() == Some(expected) {
            Ok(())
        } else {
            Err(RemoteError::new(
                Service::Bucket,
                operation,
                RemoteErrorKind::Conflict,
                format!("policy of {bucket} is no longer at revision {expected}"),
            ))
        }
    }
}

#[async_trait]
impl BucketPolicyService for MemoryBucket {
    async fn get_policy(
        &self,
        bucket: &str,
    ) -> std::result::Result<Option<StoredPolicy>, RemoteError> {
        self.cloud.enter(Service::Bucket, "get_bucket_policy")?;
        Ok(lock(&self.cloud.state)
            .policies
            .get(bucket)
            .map(|stored| StoredPolicy {
                document: stored.document.clone(),
                revision: Some(stored.revision.to_string()),
            }))
    }

    async fn put_policy(
        &self,
        bucket: &str,
        document: &str,
        expected: Option<&str>,
    ) -> std::result::Result<(), RemoteError> {
        const OP: &str = "put_bucket_policy";
        self.cloud.enter(Service::Bucket, OP)?;
        if let Err(err) = PolicyDocument::from_json(document) {
            return Err(RemoteError::permanent(
                Service::Bucket,
                OP,
                format!("MalformedPolicy: {err}"),
            ));
        }

        let mut state = lock(&self.cloud.state);
        Self::check_revision(&state, OP, bucket, expected)?;
        state.next_revision += 1;
        let revision = state.next_revision;
        state.policies.insert(
            bucket.to_string(),
            StoredBucketPolicy {
                document: document.to_string(),
                revision,
            },
        );
        state.policy_writes += 1;
        Ok(())
    }

    async fn delete_policy(
        &self,
        bucket: &str,
        expected: Option<&str>,
    ) -> std::result::Result<(), RemoteError> {
        const OP: &str = "delete_bucket_policy";
        self.cloud.enter(Service::Bucket, OP)?;
        let mut state = lock(&self.cloud.state);
        if !state.policies.contains_key(bucket) {
            return Err(RemoteError::not_found(
                Service::Bucket,
                OP,
                format!("the bucket policy of {bucket} does not exist"),
            ));
        }
        Self::check_revision(&state, OP, bucket, expected)?;
        state.policies.remove(bucket);
        state.policy_writes += 1;
        Ok(())
    }
}

#[async_trait]
impl ClientAccessor for MemoryCloud {
    async fn identity_client(&self, target: &ClientTarget) -> Result<Arc<dyn IdentityService>> {
        let client = self
            .identity_clients
            .get_or_try_insert(target, || async { Ok(Arc::new(self.identity_service())) })
            .await?;
        Ok(client)
    }

    async fn token_client(&self, target: &ClientTarget) -> Result<Arc<dyn TokenService>> {
        let client = self
            .token_clients
            .get_or_try_insert(target, || async { Ok(Arc::new(self.token_service())) })
            .await?;
        Ok(client)
    }

    async fn bucket_client(&self, target: &ClientTarget) -> Result<Arc<dyn BucketPolicyService>> {
        let client = self
            .bucket_clients
            .get_or_try_insert(target, || async { Ok(Arc::new(self.bucket_service())) })
            .await?;
        Ok(client)
    }

    async fn ephemeral_bucket_client(
        &self,
        _target: &ClientTarget,
        credentials: &SecretToken,
    ) -> Result<Arc<dyn BucketPolicyService>> {
        if credentials.access_key_id().is_empty() {
            return Err(Error::Invalid(
                "credentials".into(),
                "access key id is empty".into(),
            ));
        }
        lock(&self.state)
            .ephemeral_keys
            .push(credentials.access_key_id().to_string());
        Ok(Arc::new(self.bucket_service()))
    }

    async fn shutdown(&self) {
        self.identity_clients.clear().await;
        self.token_clients.clear().await;
        self.bucket_clients.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossgrant_spec::StaticCredential;

    fn create(name: &str) -> CreateRole {
        CreateRole {
            name: name.into(),
            trust_policy: "{}".into(),
            description: "test".into(),
            max_session_duration: 3600,
            tags: Vec::new(),
        }
    }

    #[tokio::test]
    async fn roles_are_unique_by_name() {
        let identity = MemoryCloud::new().identity_service();
        let role = identity.create_role(&create("r")).await.unwrap();
        assert_eq!(role.arn, "arn:aws:iam::111111111111:role/r");

        let err = identity.create_role(&create("r")).await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(identity.get_role("r").await.unwrap(), role);
    }

    #[tokio::test]
    async fn role_with_inline_policy_cannot_be_deleted() {
        let identity = MemoryCloud::new().identity_service();
        identity.create_role(&create("r")).await.unwrap();
        identity.put_role_policy("r", "r", "{}").await.unwrap();

        assert!(identity.delete_role("r").await.is_err());
        identity.delete_role_policy("r", "r").await.unwrap();
        identity.delete_role("r").await.unwrap();
        assert!(identity.delete_role("r").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn stale_revision_is_a_conflict() {
        let bucket = MemoryCloud::new().bucket_service();
        bucket.put_policy("dst", r#"{"Statement":[]}"#, None).await.unwrap();
        let stored = bucket.get_policy("dst").await.unwrap().unwrap();

        bucket
            .put_policy("dst", r#"{"Statement":[]}"#, stored.revision.as_deref())
            .await
            .unwrap();
        let err = bucket
            .put_policy("dst", r#"{"Statement":[]}"#, stored.revision.as_deref())
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let cloud = MemoryCloud::new();
        cloud.fail_next("get_bucket_policy", RemoteErrorKind::Transient, 2);
        let bucket = cloud.bucket_service();

        assert!(bucket.get_policy("dst").await.unwrap_err().is_transient());
        assert!(bucket.get_policy("dst").await.unwrap_err().is_transient());
        assert_eq!(bucket.get_policy("dst").await.unwrap(), None);
        assert_eq!(cloud.call_count("get_bucket_policy"), 3);
    }

    #[tokio::test]
    async fn accessor_caches_clients_but_not_ephemeral_ones() {
        let cloud = MemoryCloud::new();
        let target = ClientTarget::new("eu-central-1", None);

        cloud.bucket_client(&target).await.unwrap();
        cloud.bucket_client(&target).await.unwrap();
        cloud.identity_client(&ClientTarget::global(None)).await.unwrap();
        assert_eq!(cloud.cached_clients().await, 2);

        let credentials = SecretToken::Permanent(StaticCredential {
            access_key_id: "AKIADEST".into(),
            secret_access_key: "s".into(),
        });
        cloud.ephemeral_bucket_client(&target, &credentials).await.unwrap();
        cloud.ephemeral_bucket_client(&target, &credentials).await.unwrap();
        assert_eq!(cloud.cached_clients().await, 2);
        assert_eq!(cloud.ephemeral_access_keys(), vec!["AKIADEST", "AKIADEST"]);

        cloud.shutdown().await;
        assert_eq!(cloud.cached_clients().await, 0);
    }

    #[tokio::test]
    async fn assumed_credentials_expire_with_the_role_session() {
        let cloud = MemoryCloud::new();
        let role = cloud.identity_service().create_role(&create("r")).await.unwrap();
        let credentials = cloud
            .token_service()
            .assume_role(&role.arn, "r")
            .await
            .unwrap();

        let now = OffsetDateTime::now_utc();
        assert!(!credentials.is_expired_at(now));
        assert!(credentials.is_expired_at(now + Duration::hours(2)));
    }
}
