//! Turns a data flow into a provisioning request when both ends are S3
//! locations reachable through the same endpoint.

use crossgrant_spec::{DataAddress, DataFlow, ProvisionRequest, S3_TYPE, keys};
use uuid::Uuid;

/// Whether a cross-account grant can be provisioned between the two locations.
pub fn can_generate(source: &DataAddress, destination: &DataAddress) -> bool {
    source.kind() == Some(S3_TYPE)
        && destination.kind() == Some(S3_TYPE)
        && source.endpoint_override() == destination.endpoint_override()
}

/// Build the provisioning request for a flow, or `None` if the flow has no
/// destination or the locations are not eligible.
pub fn generate(flow: &DataFlow) -> Option<ProvisionRequest> {
    let destination = flow.destination.as_ref()?;
    if !can_generate(&flow.source, destination) {
        return None;
    }

    let object = destination.object_name().or(flow.source.object_name());
    let mut destination = destination.clone();
    if let Some(object) = object {
        let key = destination_key(object, destination.folder_name());
        destination.set(keys::OBJECT_NAME, key);
    }

    Some(ProvisionRequest {
        id: Uuid::new_v4().to_string(),
        flow_id: flow.id.clone(),
        source: flow.source.clone(),
        destination,
    })
}

/// Object key inside the destination bucket.
pub fn destination_key(object: &str, folder: Option<&str>) -> String {
    match folder {
        None => object.to_string(),
        Some(folder) if folder.ends_with('/') => format!("{folder}{object}"),
        Some(folder) => format!("{folder}/{object}"),
    }
}
