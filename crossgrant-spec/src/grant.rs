use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::{DataAddress, keys};

/// Input of the provisioning pipeline for one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    /// Resource definition id, unique per generated request.
    pub id: String,
    pub flow_id: String,
    pub source: DataAddress,
    /// Destination with the effective object key already applied.
    pub destination: DataAddress,
}

/// Role created on the source side for one grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedRole {
    pub name: String,
    pub arn: String,
    pub id: String,
}

/// Output of the provisioning pipeline, consumed once by deprovisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedGrant {
    pub request: ProvisionRequest,
    /// Destination whose `keyName` references the minted temporary credentials.
    pub destination: DataAddress,
    pub role: ProvisionedRole,
    pub secret_key: String,
}

impl ProvisionedGrant {
    pub fn new(request: ProvisionRequest, role: ProvisionedRole, secret_key: String) -> Self {
        let destination = request
            .destination
            .clone()
            .with(keys::KEY_NAME, secret_key.clone());
        Self {
            request,
            destination,
            role,
            secret_key,
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.request.flow_id
    }
}

/// Named stages of the two pipelines, reported when a run aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Validate,
    ResolveCredentials,
    IdentifyCaller,
    CreateRole,
    AttachRolePolicy,
    UpdateBucketPolicy,
    AssumeRole,
    StoreCredentials,
    RemoveBucketStatement,
    DeleteRolePolicy,
    DeleteRole,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Validate => "validate",
            Step::ResolveCredentials => "resolve-credentials",
            Step::IdentifyCaller => "identify-caller",
            Step::CreateRole => "create-role",
            Step::AttachRolePolicy => "attach-role-policy",
            Step::UpdateBucketPolicy => "update-bucket-policy",
            Step::AssumeRole => "assume-role",
            Step::StoreCredentials => "store-credentials",
            Step::RemoveBucketStatement => "remove-bucket-statement",
            Step::DeleteRolePolicy => "delete-role-policy",
            Step::DeleteRole => "delete-role",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
