use crate::domain::GatewayClass;
use crate::errors::{Error, Result};

/// Parameters are not supported, so any `parametersRef` is rejected.
pub fn validate_gateway_class(class: &GatewayClass) -> Result<()> {
    if let Some(params) = &class.spec.parameters_ref {
        return Err(Error::validation_field(
            format!("parametersRef to {} {:?} is not supported", params.kind, params.name),
            "spec.parametersRef",
        ));
    }
    Ok(())
}
