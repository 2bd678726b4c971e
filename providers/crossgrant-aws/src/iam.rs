use async_trait::async_trait;
use aws_sdk_iam::Client as IamClient;
use aws_sdk_iam::types::{Role, Tag};
use aws_sdk_sts::Client as StsClient;
use crossgrant_core::remote::{CreateRole, IdentityService};
use crossgrant_spec::{ProvisionedRole, RemoteError, Service};
use tracing::debug;

use crate::errors::remote_error;

/// Identity service backed by IAM, with STS answering who the caller is.
#[derive(Clone)]
pub struct AwsIdentity {
    iam: IamClient,
    sts: StsClient,
}

impl AwsIdentity {
    pub fn new(iam: IamClient, sts: StsClient) -> Self {
        Self { iam, sts }
    }
}

fn provisioned(role: &Role) -> ProvisionedRole {
    ProvisionedRole {
        name: role.role_name().to_string(),
        arn: role.arn().to_string(),
        id: role.role_id().to_string(),
    }
}

fn missing_role(operation: &'static str) -> RemoteError {
    RemoteError::permanent(Service::Identity, operation, "response carried no role")
}

#[async_trait]
impl IdentityService for AwsIdentity {
    async fn caller_arn(&self) -> Result<String, RemoteError> {
        const OP: &str = "get_caller_identity";
        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|err| remote_error(Service::Identity, OP, err))?;
        output
            .arn()
            .map(str::to_string)
            .ok_or_else(|| RemoteError::permanent(Service::Identity, OP, "response carried no arn"))
    }

    async fn create_role(&self, role: &CreateRole) -> Result<ProvisionedRole, RemoteError> {
        const OP: &str = "create_role";
        let tags = role
            .tags
            .iter()
            .map(|tag| Tag::builder().key(&tag.key).value(&tag.value).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| RemoteError::permanent(Service::Identity, OP, err.to_string()))?;

        let output = self
            .iam
            .create_role()
            .role_name(&role.name)
            .assume_role_policy_document(&role.trust_policy)
            .description(&role.description)
            .max_session_duration(role.max_session_duration)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|err| remote_error(Service::Identity, OP, err))?;
        debug!(role = %role.name, "created role");
        output.role().map(provisioned).ok_or_else(|| missing_role(OP))
    }

    async fn get_role(&self, name: &str) -> Result<ProvisionedRole, RemoteError> {
        const OP: &str = "get_role";
        let output = self
            .iam
            .get_role()
            .role_name(name)
            .send()
            .await
            .map_err(|err| remote_error(Service::Identity, OP, err))?;
        output.role().map(provisioned).ok_or_else(|| missing_role(OP))
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), RemoteError> {
        self.iam
            .put_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .policy_document(document)
            .send()
            .await
            .map_err(|err| remote_error(Service::Identity, "put_role_policy", err))?;
        Ok(())
    }

    async fn delete_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> Result<(), RemoteError> {
        self.iam
            .delete_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .send()
            .await
            .map_err(|err| remote_error(Service::Identity, "delete_role_policy", err))?;
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> Result<(), RemoteError> {
        self.iam
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map_err(|err| remote_error(Service::Identity, "delete_role", err))?;
        Ok(())
    }
}
