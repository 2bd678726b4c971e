//! Read-merge-write of a bucket policy under concurrent writers.

use crossgrant_spec::{Error, PolicyDocument, Result, Statement};
use tracing::{debug, warn};

use crate::policy::{empty_bucket_policy, merge_statement, remove_statements};
use crate::remote::BucketPolicyService;
use crate::retry::RetryPolicy;

/// What to do with a bucket policy after editing it.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyWrite {
    Put(PolicyDocument),
    Delete,
    Unchanged,
}

/// What an update ended up doing remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOutcome {
    Written,
    Deleted,
    Unchanged,
}

/// Edits one bucket's policy with bounded re-reads on lost conditional writes.
pub struct BucketPolicyUpdate<'a> {
    client: &'a dyn BucketPolicyService,
    retry: &'a RetryPolicy,
    bucket: &'a str,
    attempts: u32,
}

impl<'a> BucketPolicyUpdate<'a> {
    pub fn new(
        client: &'a dyn BucketPolicyService,
        retry: &'a RetryPolicy,
        bucket: &'a str,
        attempts: u32,
    ) -> Self {
        Self {
            client,
            retry,
            bucket,
            attempts: attempts.max(1),
        }
    }

    /// Add `statement`, creating the policy if the bucket has none.
    pub async fn merge(&self, statement: &Statement) -> Result<PolicyOutcome> {
        self.apply(|current| {
            let mut document = current.unwrap_or_else(empty_bucket_policy);
            merge_statement(&mut document, statement.clone());
            PolicyWrite::Put(document)
        })
        .await
    }

    /// Remove every statement with `sid`; an emptied policy is deleted.
    pub async fn remove(&self, sid: &str) -> Result<PolicyOutcome> {
        self.apply(|current| {
            let Some(mut document) = current else {
                return PolicyWrite::Unchanged;
            };
            if remove_statements(&mut document, sid) == 0 {
                PolicyWrite::Unchanged
            } else if document.is_empty() {
                PolicyWrite::Delete
            } else {
                PolicyWrite::Put(document)
            }
        })
        .await
    }

    /// Run `edit` against the current policy (`None` when the bucket has
    /// none) and write the result back conditionally.
    pub async fn apply<F>(&self, mut edit: F) -> Result<PolicyOutcome>
    where
        F: FnMut(Option<PolicyDocument>) -> PolicyWrite,
    {
        let bucket = self.bucket;
        for attempt in 1..=self.attempts {
            let stored = self
                .retry
                .run("get_bucket_policy", || self.client.get_policy(bucket))
                .await?;

            let (current, revision) = match stored {
                Some(stored) => {
                    let document = PolicyDocument::from_json(&stored.document)
                        .map_err(|err| Error::MalformedPolicy(format!("bucket '{bucket}': {err}")))?;
                    (Some(document), stored.revision)
                }
                None => {
                    debug!(bucket, "bucket has no policy");
                    (None, None)
                }
            };
            let revision = revision.as_deref();

            let written = match edit(current) {
                PolicyWrite::Unchanged => return Ok(PolicyOutcome::Unchanged),
                PolicyWrite::Put(document) => {
                    let raw = document
                        .to_json()
                        .map_err(|err| Error::MalformedPolicy(err.to_string()))?;
                    self.retry
                        .run("put_bucket_policy", || {
                            self.client.put_policy(bucket, &raw, revision)
                        })
                        .await
                        .map(|()| PolicyOutcome::Written)
                }
                PolicyWrite::Delete => self
                    .retry
                    .run("delete_bucket_policy", || {
                        self.client.delete_policy(bucket, revision)
                    })
                    .await
                    .map(|()| PolicyOutcome::Deleted)
                    .or_else(|err| {
                        if err.is_not_found() {
                            warn!(bucket, "bucket policy already gone");
                            Ok(PolicyOutcome::Deleted)
                        } else {
                            Err(err)
                        }
                    }),
            };

            match written {
                Ok(outcome) => {
                    debug!(bucket, attempt, ?outcome, "bucket policy updated");
                    return Ok(outcome);
                }
                Err(err) if err.is_conflict() => {
                    warn!(bucket, attempt, "bucket policy changed concurrently, re-reading");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(Error::PolicyContention {
            bucket: bucket.to_string(),
            attempts: self.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCloud;
    use crate::policy::bucket_policy_statement;
    use crate::remote::StoredPolicy;
    use async_trait::async_trait;
    use crossgrant_spec::{RemoteError, RemoteErrorKind, Service};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn statement(sid: &str) -> Statement {
        bucket_policy_statement(sid, &format!("arn:aws:iam::1:role/{sid}"), "dst")
    }

    #[tokio::test]
    async fn merge_into_missing_policy_creates_it() {
        let cloud = MemoryCloud::new();
        let client = cloud.bucket_service();
        let retry = RetryPolicy::immediate(0);

        let outcome = BucketPolicyUpdate::new(&client, &retry, "dst", 3)
            .merge(&statement("X"))
            .await
            .unwrap();

        assert_eq!(outcome, PolicyOutcome::Written);
        let document = cloud.bucket_policy("dst").unwrap();
        assert_eq!(document.statements, vec![statement("X")]);
    }

    #[tokio::test]
    async fn removing_last_statement_deletes_policy() {
        let cloud = MemoryCloud::new();
        cloud.set_bucket_policy("dst", &PolicyDocument::new(vec![statement("X")]));
        let client = cloud.bucket_service();
        let retry = RetryPolicy::immediate(0);

        let outcome = BucketPolicyUpdate::new(&client, &retry, "dst", 3)
            .remove("X")
            .await
            .unwrap();

        assert_eq!(outcome, PolicyOutcome::Deleted);
        assert!(cloud.bucket_policy("dst").is_none());
    }

    #[tokio::test]
    async fn removing_unknown_sid_writes_nothing() {
        let cloud = MemoryCloud::new();
        cloud.set_bucket_policy("dst", &PolicyDocument::new(vec![statement("A")]));
        let client = cloud.bucket_service();
        let retry = RetryPolicy::immediate(0);
        let writes_before = cloud.policy_writes();

        let outcome = BucketPolicyUpdate::new(&client, &retry, "dst", 3)
            .remove("X")
            .await
            .unwrap();

        assert_eq!(outcome, PolicyOutcome::Unchanged);
        assert_eq!(cloud.policy_writes(), writes_before);
    }

    #[tokio::test]
    async fn malformed_remote_policy_is_reported() {
        let cloud = MemoryCloud::new();
        cloud.set_raw_bucket_policy("dst", "{not json");
        let client = cloud.bucket_service();
        let retry = RetryPolicy::immediate(0);

        let err = BucketPolicyUpdate::new(&client, &retry, "dst", 3)
            .merge(&statement("X"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedPolicy(_)));
    }

    /// Loses every conditional write.
    struct AlwaysConflicting {
        reads: AtomicU32,
    }

    #[async_trait]
    impl BucketPolicyService for AlwaysConflicting {
        async fn get_policy(&self, _bucket: &str) -> std::result::Result<Option<StoredPolicy>, RemoteError> {
            let read = self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(Some(StoredPolicy {
                document: PolicyDocument::new(Vec::new()).to_json().unwrap(),
                revision: Some(read.to_string()),
            }))
        }

        async fn put_policy(
            &self,
            _bucket: &str,
            _document: &str,
            _expected: Option<&str>,
        ) -> std::result::Result<(), RemoteError> {
            Err(RemoteError::new(
                Service::Bucket,
                "put_bucket_policy",
                RemoteErrorKind::Conflict,
                "revision moved",
            ))
        }

        async fn delete_policy(
            &self,
            _bucket: &str,
            _expected: Option<&str>,
        ) -> std::result::Result<(), RemoteError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn contention_is_bounded() {
        let client = AlwaysConflicting {
            reads: AtomicU32::new(0),
        };
        let retry = RetryPolicy::immediate(0);

        let err = BucketPolicyUpdate::new(&client, &retry, "dst", 4)
            .merge(&statement("X"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            Error::PolicyContention {
                bucket: "dst".into(),
                attempts: 4
            }
        );
        assert_eq!(client.reads.load(Ordering::SeqCst), 4);
    }
}
