//! Mapping of SDK failures onto the remote error taxonomy.

use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_smithy_types::error::display::DisplayErrorContext;
use crossgrant_spec::{RemoteError, RemoteErrorKind, Service};

const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottled",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "SlowDown",
    "ServiceUnavailable",
    "ServiceFailure",
    "InternalError",
    "InternalFailure",
    "InternalServiceError",
    "RequestTimeout",
    "RequestTimeoutException",
    "PriorRequestNotComplete",
    "OperationAborted",
    "ConcurrentModification",
    "IDPCommunicationError",
];

const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchEntity",
    "NoSuchBucketPolicy",
    "ResourceNotFoundException",
];

const ALREADY_EXISTS_CODES: &[&str] = &["EntityAlreadyExists", "ResourceExistsException"];

const CONFLICT_CODES: &[&str] = &["PreconditionFailed", "ConditionalRequestConflict"];

/// Classify a service error response.
///
/// Freshly created roles take a while to propagate: until then the token
/// service denies assuming them and the bucket service rejects them as
/// principals. Both are retried.
pub fn classify(
    service: Service,
    code: Option<&str>,
    message: Option<&str>,
    status: Option<u16>,
) -> RemoteErrorKind {
    let message = message.unwrap_or_default();
    match code {
        Some(code) if TRANSIENT_CODES.contains(&code) => RemoteErrorKind::Transient,
        Some(code) if NOT_FOUND_CODES.contains(&code) => RemoteErrorKind::NotFound,
        Some(code) if ALREADY_EXISTS_CODES.contains(&code) => RemoteErrorKind::AlreadyExists,
        Some(code) if CONFLICT_CODES.contains(&code) => RemoteErrorKind::Conflict,
        Some("AccessDenied") if service == Service::Token => RemoteErrorKind::Transient,
        Some("MalformedPolicy") if service == Service::Bucket && message.contains("Invalid principal") => {
            RemoteErrorKind::Transient
        }
        _ => match status {
            Some(429) => RemoteErrorKind::Transient,
            Some(status) if status >= 500 => RemoteErrorKind::Transient,
            _ => RemoteErrorKind::Permanent,
        },
    }
}

/// Convert an SDK failure into a [`RemoteError`]. Transport-level failures
/// (timeouts, dispatch and response errors) count as transient.
pub fn remote_error<E>(service: Service, operation: &'static str, err: SdkError<E>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let kind = match &err {
        SdkError::ServiceError(context) => classify(
            service,
            context.err().code(),
            context.err().message(),
            Some(context.raw().status().as_u16()),
        ),
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            RemoteErrorKind::Transient
        }
        _ => RemoteErrorKind::Permanent,
    };
    RemoteError::new(
        service,
        operation,
        kind,
        DisplayErrorContext(&err).to_string(),
    )
}

/// Error code of a service error response, if any.
pub(crate) fn error_code<E>(err: &SdkError<E>) -> Option<&str>
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::ServiceError(context) => context.err().code(),
        _ => None,
    }
}
