//! Capabilities for reaching the identity, token-exchange and bucket services.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use crossgrant_spec::{
    DataAddress, Error, ProvisionedRole, RemoteError, Result, SecretToken, TemporaryCredential,
    keys,
};
use tokio::sync::Mutex;

/// Region the identity service is addressed in.
pub const GLOBAL_REGION: &str = "aws-global";

/// Region and optional endpoint override a client is built for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientTarget {
    pub region: String,
    pub endpoint_override: Option<String>,
}

impl ClientTarget {
    pub fn new(region: impl Into<String>, endpoint_override: Option<&str>) -> Self {
        Self {
            region: region.into(),
            endpoint_override: endpoint_override.map(str::to_string),
        }
    }

    /// Target for the global identity service behind the given endpoint.
    pub fn global(endpoint_override: Option<&str>) -> Self {
        Self::new(GLOBAL_REGION, endpoint_override)
    }

    /// Target of the service that hosts `address`.
    pub fn of(address: &DataAddress, location: &'static str) -> Result<Self> {
        let region = address.region().ok_or(Error::MissingProperty {
            location,
            field: keys::REGION,
        })?;
        Ok(Self::new(region, address.endpoint_override()))
    }
}

/// Role creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRole {
    pub name: String,
    pub trust_policy: String,
    pub description: String,
    pub max_session_duration: i32,
    pub tags: Vec<RoleTag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTag {
    pub key: String,
    pub value: String,
}

impl RoleTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Bucket policy as stored remotely, with the revision it was read at when
/// the service supports conditional writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPolicy {
    pub document: String,
    pub revision: Option<String>,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// ARN of the principal the client is authenticated as.
    async fn caller_arn(&self) -> std::result::Result<String, RemoteError>;

    async fn create_role(&self, role: &CreateRole)
    -> std::result::Result<ProvisionedRole, RemoteError>;

    async fn get_role(&self, name: &str) -> std::result::Result<ProvisionedRole, RemoteError>;

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> std::result::Result<(), RemoteError>;

    async fn delete_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> std::result::Result<(), RemoteError>;

    async fn delete_role(&self, name: &str) -> std::result::Result<(), RemoteError>;
}

#[async_trait]
pub trait TokenService: Send + Sync {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> std::result::Result<TemporaryCredential, RemoteError>;
}

#[async_trait]
pub trait BucketPolicyService: Send + Sync {
    /// `None` when the bucket has no policy.
    async fn get_policy(&self, bucket: &str)
    -> std::result::Result<Option<StoredPolicy>, RemoteError>;

    /// Replace the policy. With `expected` set, fails with a conflict if the
    /// policy moved past that revision.
    async fn put_policy(
        &self,
        bucket: &str,
        document: &str,
        expected: Option<&str>,
    ) -> std::result::Result<(), RemoteError>;

    async fn delete_policy(
        &self,
        bucket: &str,
        expected: Option<&str>,
    ) -> std::result::Result<(), RemoteError>;
}

/// Hands out service clients. Clients for the same target are shared;
/// ephemeral clients carry caller-supplied credentials and are never shared.
#[async_trait]
pub trait ClientAccessor: Send + Sync {
    async fn identity_client(&self, target: &ClientTarget) -> Result<Arc<dyn IdentityService>>;

    async fn token_client(&self, target: &ClientTarget) -> Result<Arc<dyn TokenService>>;

    async fn bucket_client(&self, target: &ClientTarget) -> Result<Arc<dyn BucketPolicyService>>;

    async fn ephemeral_bucket_client(
        &self,
        target: &ClientTarget,
        credentials: &SecretToken,
    ) -> Result<Arc<dyn BucketPolicyService>>;

    /// Release every cached client.
    async fn shutdown(&self);
}

/// Clients keyed by target, built on first use.
#[derive(Debug)]
pub struct ClientCache<T> {
    clients: Mutex<HashMap<ClientTarget, T>>,
}

impl<T> Default for ClientCache<T> {
    fn default() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> ClientCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached client for `target`, building it with `build` when absent. A
    /// failed build caches nothing.
    pub async fn get_or_try_insert<F, Fut>(&self, target: &ClientTarget, build: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(target) {
            return Ok(client.clone());
        }
        let client = build().await?;
        clients.insert(target.clone(), client.clone());
        Ok(client)
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.clients.lock().await.clear();
    }
}
