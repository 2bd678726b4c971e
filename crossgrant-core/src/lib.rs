//! Provisioning and deprovisioning of temporary cross-account grants that let
//! a source-side role copy an object into a destination bucket.

pub mod bucket_policy;
pub mod config;
pub mod deprovision;
pub mod generator;
pub mod identifier;
pub mod locks;
pub mod memory;
pub mod policy;
pub mod provision;
pub mod remote;
pub mod retry;
pub mod secrets;
pub mod telemetry;
pub mod validation;

pub use bucket_policy::{BucketPolicyUpdate, PolicyOutcome, PolicyWrite};
pub use config::ProvisionConfig;
pub use deprovision::Deprovisioner;
pub use generator::{can_generate, destination_key, generate};
pub use identifier::{ResourceName, resource_identifier};
pub use locks::BucketLocks;
pub use memory::{MemoryCloud, MemorySecretStore};
pub use provision::Provisioner;
pub use remote::{
    BucketPolicyService, ClientAccessor, ClientCache, ClientTarget, CreateRole, GLOBAL_REGION,
    IdentityService, RoleTag, StoredPolicy, TokenService,
};
pub use retry::RetryPolicy;
pub use secrets::{SecretStore, resolve_secret_token, temporary_secret_key};
