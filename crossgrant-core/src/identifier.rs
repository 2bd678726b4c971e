use std::fmt;

use crossgrant_spec::{Error, Result};

const PREFIX: &str = "edc-transfer_";
/// IAM caps role names and session names at 64 characters.
const MAX_LEN: usize = 64;

/// Name shared by every remote object belonging to one transfer: role name,
/// role-policy name, bucket-policy statement Sid and role session name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceName(String);

impl ResourceName {
    /// Derive the name for a flow, rejecting ids IAM would refuse.
    pub fn for_flow(flow_id: &str) -> Result<Self> {
        if flow_id.trim().is_empty() {
            return Err(Error::Invalid("flow id".into(), "must not be empty".into()));
        }

        let name = resource_identifier(flow_id);
        if name.len() > MAX_LEN {
            return Err(Error::Invalid(
                "flow id".into(),
                format!("'{name}' exceeds {MAX_LEN} characters"),
            ));
        }
        if !name.chars().all(is_iam_name_char) {
            return Err(Error::Invalid(
                "flow id".into(),
                format!("'{flow_id}' contains characters not allowed in role names"),
            ));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deterministic resource identifier for a flow id.
pub fn resource_identifier(flow_id: &str) -> String {
    format!("{PREFIX}{flow_id}")
}

fn is_iam_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '=' | ',' | '.' | '@' | '_' | '-')
}
