use crossgrant_spec::{DataAddress, Error, ProvisionRequest, Result, keys};

const SOURCE: &str = "source";
const DESTINATION: &str = "destination";

/// Check that a source location names the object to copy.
pub fn validate_source(address: &DataAddress) -> Result<()> {
    require(address, SOURCE, keys::BUCKET_NAME)?;
    require(address, SOURCE, keys::REGION)?;
    require(address, SOURCE, keys::OBJECT_NAME)
}

/// Check that a destination location names the object to write.
pub fn validate_destination(address: &DataAddress) -> Result<()> {
    require(address, DESTINATION, keys::BUCKET_NAME)?;
    require(address, DESTINATION, keys::REGION)?;
    require(address, DESTINATION, keys::OBJECT_NAME)
}

pub fn validate_request(request: &ProvisionRequest) -> Result<()> {
    validate_source(&request.source)?;
    validate_destination(&request.destination)
}

fn require(address: &DataAddress, location: &'static str, field: &'static str) -> Result<()> {
    match address.property(field) {
        Some(_) => Ok(()),
        None => Err(Error::MissingProperty { location, field }),
    }
}
