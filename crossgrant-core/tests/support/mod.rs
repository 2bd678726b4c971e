#![allow(dead_code)]

use std::sync::Arc;

use crossgrant_core::{
    Deprovisioner, MemoryCloud, MemorySecretStore, ProvisionConfig, Provisioner, RetryPolicy,
    SecretStore,
};
use crossgrant_spec::{DataAddress, ProvisionRequest, keys};

pub const DESTINATION_KEY: &str = "k";
pub const DESTINATION_CREDENTIALS: &str =
    r#"{"accessKeyId":"AKIADESTINATION","secretAccessKey":"destination-secret"}"#;

pub struct Harness {
    pub cloud: MemoryCloud,
    pub secrets: Arc<MemorySecretStore>,
    pub provisioner: Provisioner,
    pub deprovisioner: Deprovisioner,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(ProvisionConfig::default()).await
    }

    pub async fn with_config(config: ProvisionConfig) -> Self {
        let cloud = MemoryCloud::new();
        let secrets = Arc::new(MemorySecretStore::new());
        secrets
            .store(DESTINATION_KEY, DESTINATION_CREDENTIALS)
            .await
            .unwrap();

        let retry = RetryPolicy::immediate(config.max_retries);
        let provisioner = Provisioner::new(Arc::new(cloud.clone()), secrets.clone(), config.clone())
            .with_retry(retry);
        let deprovisioner = Deprovisioner::new(Arc::new(cloud.clone()), secrets.clone(), config)
            .with_retry(retry)
            .with_locks(provisioner.locks());

        Self {
            cloud,
            secrets,
            provisioner,
            deprovisioner,
        }
    }
}

pub fn source() -> DataAddress {
    DataAddress::s3("eu-central-1", "src").with(keys::OBJECT_NAME, "a.txt")
}

pub fn destination() -> DataAddress {
    DataAddress::s3("eu-central-1", "dst")
        .with(keys::OBJECT_NAME, "a.txt")
        .with(keys::KEY_NAME, DESTINATION_KEY)
}

pub fn request(flow_id: &str) -> ProvisionRequest {
    ProvisionRequest {
        id: format!("rd-{flow_id}"),
        flow_id: flow_id.to_string(),
        source: source(),
        destination: destination(),
    }
}
