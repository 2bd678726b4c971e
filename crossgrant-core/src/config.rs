use std::env;
use std::str::FromStr;
use std::time::Duration;

use crossgrant_spec::{Error, Result};
use serde::Deserialize;

use crate::retry::RetryPolicy;

pub const RETRY_MAX_ENV: &str = "CROSSGRANT_RETRY_MAX";
pub const RETRY_BASE_DELAY_ENV: &str = "CROSSGRANT_RETRY_BASE_DELAY_MS";
pub const RETRY_MAX_DELAY_ENV: &str = "CROSSGRANT_RETRY_MAX_DELAY_MS";
pub const ROLE_MAX_SESSION_ENV: &str = "CROSSGRANT_ROLE_MAX_SESSION_SECS";
pub const COMPONENT_ID_ENV: &str = "CROSSGRANT_COMPONENT_ID";
pub const CREATOR_ENV: &str = "CROSSGRANT_CREATOR";
pub const POLICY_UPDATE_ATTEMPTS_ENV: &str = "CROSSGRANT_POLICY_UPDATE_ATTEMPTS";

const DEFAULT_MAX_RETRIES: u32 = 10;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 20_000;
const DEFAULT_ROLE_MAX_SESSION_SECS: i32 = 3600;
const DEFAULT_COMPONENT_ID: &str = "crossgrant";
const DEFAULT_CREATOR: &str = "EDC";
const DEFAULT_POLICY_UPDATE_ATTEMPTS: u32 = 5;

/// IAM accepts maximum session durations between one and twelve hours.
const ROLE_SESSION_RANGE: std::ops::RangeInclusive<i32> = 3600..=43200;

/// Settings shared by the provisioning and deprovisioning pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProvisionConfig {
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Maximum session duration of created roles, in seconds.
    pub max_role_session_duration: i32,
    /// Recorded on every created role as `edc:component-id`.
    pub component_id: String,
    /// Recorded on every created role as `created-by`.
    pub creator: String,
    pub policy_update_attempts: u32,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            max_role_session_duration: DEFAULT_ROLE_MAX_SESSION_SECS,
            component_id: DEFAULT_COMPONENT_ID.to_string(),
            creator: DEFAULT_CREATOR.to_string(),
            policy_update_attempts: DEFAULT_POLICY_UPDATE_ATTEMPTS,
        }
    }
}

impl ProvisionConfig {
    /// Defaults overridden by any `CROSSGRANT_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            max_retries: parsed_env(RETRY_MAX_ENV, defaults.max_retries),
            retry_base_delay_ms: parsed_env(RETRY_BASE_DELAY_ENV, defaults.retry_base_delay_ms),
            retry_max_delay_ms: parsed_env(RETRY_MAX_DELAY_ENV, defaults.retry_max_delay_ms),
            max_role_session_duration: parsed_env(
                ROLE_MAX_SESSION_ENV,
                defaults.max_role_session_duration,
            ),
            component_id: string_env(COMPONENT_ID_ENV).unwrap_or(defaults.component_id),
            creator: string_env(CREATOR_ENV).unwrap_or(defaults.creator),
            policy_update_attempts: parsed_env(
                POLICY_UPDATE_ATTEMPTS_ENV,
                defaults.policy_update_attempts,
            ),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !ROLE_SESSION_RANGE.contains(&self.max_role_session_duration) {
            return Err(Error::Invalid(
                "max role session duration".into(),
                format!(
                    "{}s is outside {}..={}",
                    self.max_role_session_duration,
                    ROLE_SESSION_RANGE.start(),
                    ROLE_SESSION_RANGE.end()
                ),
            ));
        }
        if self.policy_update_attempts == 0 {
            return Err(Error::Invalid(
                "policy update attempts".into(),
                "must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }
}

fn string_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parsed_env<T: FromStr>(name: &str, default: T) -> T {
    string_env(name)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
