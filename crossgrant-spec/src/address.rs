use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Storage scheme of S3-compatible bucket locations.
pub const S3_TYPE: &str = "AmazonS3";

/// Well-known property keys of a [`DataAddress`].
pub mod keys {
    pub const TYPE: &str = "type";
    pub const REGION: &str = "region";
    pub const BUCKET_NAME: &str = "bucketName";
    pub const OBJECT_NAME: &str = "objectName";
    pub const FOLDER_NAME: &str = "folderName";
    pub const ENDPOINT_OVERRIDE: &str = "endpointOverride";
    pub const KEY_NAME: &str = "keyName";
}

/// Location descriptor: an open property bag with typed accessors for the
/// keys this system understands. Blank values read as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataAddress {
    properties: BTreeMap<String, String>,
}

impl DataAddress {
    pub fn new(kind: impl Into<String>) -> Self {
        Self::default().with(keys::TYPE, kind)
    }

    /// Shorthand for an S3 bucket location.
    pub fn s3(region: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self::new(S3_TYPE)
            .with(keys::REGION, region)
            .with(keys::BUCKET_NAME, bucket)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn kind(&self) -> Option<&str> {
        self.property(keys::TYPE)
    }

    pub fn region(&self) -> Option<&str> {
        self.property(keys::REGION)
    }

    pub fn bucket_name(&self) -> Option<&str> {
        self.property(keys::BUCKET_NAME)
    }

    pub fn object_name(&self) -> Option<&str> {
        self.property(keys::OBJECT_NAME)
    }

    pub fn folder_name(&self) -> Option<&str> {
        self.property(keys::FOLDER_NAME)
    }

    pub fn endpoint_override(&self) -> Option<&str> {
        self.property(keys::ENDPOINT_OVERRIDE)
    }

    /// Secret store key of the credentials to use for this location.
    pub fn key_name(&self) -> Option<&str> {
        self.property(keys::KEY_NAME)
    }
}

/// A transfer as seen by the resource definition generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFlow {
    pub id: String,
    pub source: DataAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<DataAddress>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_properties_read_as_absent() {
        let address = DataAddress::s3("eu-central-1", "dst")
            .with(keys::FOLDER_NAME, "  ")
            .with(keys::OBJECT_NAME, "a.txt");

        assert_eq!(address.kind(), Some(S3_TYPE));
        assert_eq!(address.object_name(), Some("a.txt"));
        assert_eq!(address.folder_name(), None);
        assert_eq!(address.key_name(), None);
    }

    #[test]
    fn serializes_as_flat_property_map() {
        let address = DataAddress::s3("eu-central-1", "dst").with(keys::KEY_NAME, "k");
        let json = serde_json::to_value(&address).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "AmazonS3",
                "region": "eu-central-1",
                "bucketName": "dst",
                "keyName": "k"
            })
        );
        let back: DataAddress = serde_json::from_value(json).unwrap();
        assert_eq!(back, address);
    }
}
