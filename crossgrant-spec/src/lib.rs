//! Shared types for cross-account transfer grants: locations, requests,
//! grants, credentials, policy documents and the error surface.

pub mod address;
pub mod credentials;
pub mod error;
pub mod grant;
pub mod policy;

pub use address::{DataAddress, DataFlow, S3_TYPE, keys};
pub use credentials::{SecretToken, StaticCredential, TemporaryCredential};
pub use error::{Error, RemoteError, RemoteErrorKind, Result, Retryable, Service};
pub use grant::{ProvisionRequest, ProvisionedGrant, ProvisionedRole, Step};
pub use policy::{Effect, OneOrMany, POLICY_VERSION, PolicyDocument, Principal, Statement};

pub mod prelude {
    pub use crate::{
        DataAddress, Error, PolicyDocument, ProvisionRequest, ProvisionedGrant, RemoteError,
        Result, SecretToken, Statement,
    };
}
