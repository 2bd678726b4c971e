use std::fmt;

use thiserror::Error;

use crate::grant::Step;

/// Result alias for grant operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Remote service a [`RemoteError`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Identity,
    Token,
    Bucket,
    Secrets,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Identity => "identity",
            Service::Token => "token",
            Service::Bucket => "bucket",
            Service::Secrets => "secrets",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a remote failure, used to decide between retrying,
/// tolerating and aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// Throttling, temporary unavailability, network trouble. Safe to retry.
    Transient,
    /// The addressed entity does not exist.
    NotFound,
    /// The entity to create exists already.
    AlreadyExists,
    /// A conditional write lost against a concurrent writer.
    Conflict,
    /// Anything else. Never retried.
    Permanent,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteErrorKind::Transient => "transient",
            RemoteErrorKind::NotFound => "not found",
            RemoteErrorKind::AlreadyExists => "already exists",
            RemoteErrorKind::Conflict => "conflict",
            RemoteErrorKind::Permanent => "permanent",
        })
    }
}

/// Failure reported by one of the remote services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{service} {operation} failed ({kind}): {message}")]
pub struct RemoteError {
    pub service: Service,
    pub operation: &'static str,
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(
        service: Service,
        operation: &'static str,
        kind: RemoteErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service,
            operation,
            kind,
            message: message.into(),
        }
    }

    pub fn transient(service: Service, operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(service, operation, RemoteErrorKind::Transient, message)
    }

    pub fn not_found(service: Service, operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(service, operation, RemoteErrorKind::NotFound, message)
    }

    pub fn permanent(service: Service, operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(service, operation, RemoteErrorKind::Permanent, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind == RemoteErrorKind::Transient
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == RemoteErrorKind::Conflict
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == RemoteErrorKind::AlreadyExists
    }
}

/// Canonical error surface of the provisioning pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("'{field}' is a mandatory attribute of the {location} address")]
    MissingProperty {
        location: &'static str,
        field: &'static str,
    },
    #[error("invalid {0}: {1}")]
    Invalid(String, String),
    #[error("failed to resolve secret with key '{key}'")]
    SecretUnresolvable { key: String },
    #[error("failed to parse secret with key '{key}': {reason}")]
    InvalidSecret { key: String, reason: String },
    #[error("secret store error: {0}")]
    SecretStore(String),
    #[error("malformed policy document: {0}")]
    MalformedPolicy(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("bucket policy of '{bucket}' changed concurrently on each of {attempts} attempts")]
    PolicyContention { bucket: String, attempts: u32 },
    #[error("{operation} aborted at step '{step}': {source}")]
    Aborted {
        operation: &'static str,
        step: Step,
        completed: Vec<Step>,
        source: Box<Error>,
    },
}

impl Error {
    /// Remote error at the root of this error, if any.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Error::Remote(err) => Some(err),
            Error::Aborted { source, .. } => source.remote(),
            _ => None,
        }
    }
}

/// Errors that may be safe to retry.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for RemoteError {
    fn is_transient(&self) -> bool {
        RemoteError::is_transient(self)
    }
}

impl Retryable for Error {
    fn is_transient(&self) -> bool {
        matches!(self, Error::Remote(err) if err.is_transient())
    }
}
