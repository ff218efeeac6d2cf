//! Gateway validation: class reference, listeners and addresses.

use super::validate_hostname;
use crate::cache::CacheSnapshot;
use crate::domain::{
    is_condition_true, AddressType, Gateway, Listener, NamespacedName, ObjectReference, ProtocolType,
    CONDITION_ADMITTED, GATEWAY_API_GROUP, KIND_HTTP_ROUTE,
};
use crate::errors::{Error, ErrorAggregate, Result};
use std::collections::HashSet;
use std::net::IpAddr;

pub fn validate_gateway(gateway: &Gateway, cache: &CacheSnapshot) -> Result<()> {
    let mut errors = Vec::new();

    let class_name = &gateway.spec.gateway_class_name;
    match cache.gateway_class(class_name) {
        None => errors.push(Error::reference("GatewayClass", class_name, "gatewayclass does not exist")),
        Some(class) if !is_condition_true(&class.status.conditions, CONDITION_ADMITTED) => {
            errors.push(Error::reference("GatewayClass", class_name, "gatewayclass is not admitted"))
        }
        Some(_) => {}
    }

    errors.extend(validate_listeners(gateway, cache));
    errors.extend(validate_addresses(gateway));

    ErrorAggregate::maybe(errors)
}

fn validate_listeners(gateway: &Gateway, cache: &CacheSnapshot) -> Vec<Error> {
    let listeners = &gateway.spec.listeners;
    let mut errors = Vec::new();
    if listeners.is_empty() {
        errors.push(Error::validation_field("at least one listener is required", "spec.listeners"));
        return errors;
    }

    let mut ports = HashSet::new();
    for (i, listener) in listeners.iter().enumerate() {
        let field = format!("spec.listeners[{}]", i);

        if !ports.insert(listener.port) {
            errors.push(Error::validation_field(
                format!("port {} is non-unique", listener.port),
                format!("{}.port", field),
            ));
        }

        match listener.protocol {
            ProtocolType::Http => {}
            ProtocolType::Https | ProtocolType::Tls => {
                if let Err(e) = validate_listener_tls(gateway, listener, &field, cache) {
                    errors.push(e);
                }
            }
            other => errors.push(Error::validation_field(
                format!("invalid listener protocol {:?}", other.to_string()),
                format!("{}.protocol", field),
            )),
        }

        if let Some(group) = &listener.routes.group {
            if group != GATEWAY_API_GROUP {
                errors.push(Error::validation_field(
                    format!("invalid route group {:?}", group),
                    format!("{}.routes.group", field),
                ));
            }
        }
        if listener.routes.kind != KIND_HTTP_ROUTE {
            errors.push(Error::validation_field(
                format!("invalid route kind {:?}", listener.routes.kind),
                format!("{}.routes.kind", field),
            ));
        }

        if let Some(hostname) = &listener.hostname {
            if let Err(e) = validate_hostname(hostname, &format!("{}.hostname", field)) {
                errors.push(e);
            }
        }
    }
    errors
}

/// Certificate ref must name an existing core Secret holding a TLS keypair.
/// A missing Secret is a reference error since it may still be created.
fn validate_listener_tls(gateway: &Gateway, listener: &Listener, field: &str, cache: &CacheSnapshot) -> Result<()> {
    let certificate_ref = listener
        .tls
        .as_ref()
        .ok_or_else(|| {
            Error::validation_field(
                format!("listener TLS is required when protocol is {:?}", listener.protocol.to_string()),
                format!("{}.tls", field),
            )
        })?
        .certificate_ref
        .as_ref()
        .ok_or_else(|| {
            Error::validation_field("certificateRef is required", format!("{}.tls.certificateRef", field))
        })?;

    if !certificate_ref.is_secret_ref() {
        return Err(Error::validation_field(
            format!(
                "unsupported certificateRef group {:?} kind {:?}",
                certificate_ref.group, certificate_ref.kind
            ),
            format!("{}.tls.certificateRef", field),
        ));
    }

    let key = certificate_key(gateway, certificate_ref);
    let secret = cache
        .lookup_secret(&key)
        .ok_or_else(|| Error::reference("Secret", key.to_string(), "secret does not exist"))?;
    secret.validate_tls().map_err(|e| {
        Error::validation_field(format!("invalid TLS secret: {}", e), format!("{}.tls.certificateRef", field))
    })
}

/// Secret referenced by a listener; an unset namespace means the gateway's own
pub fn certificate_key(gateway: &Gateway, certificate_ref: &ObjectReference) -> NamespacedName {
    let namespace = certificate_ref.namespace.clone().unwrap_or_else(|| gateway.metadata.namespace.clone());
    NamespacedName::new(namespace, certificate_ref.name.clone())
}

fn validate_addresses(gateway: &Gateway) -> Vec<Error> {
    gateway
        .spec
        .addresses
        .iter()
        .enumerate()
        .filter_map(|(i, address)| {
            let field = format!("spec.addresses[{}]", i);
            match address.type_.unwrap_or(AddressType::IPAddress) {
                AddressType::IPAddress if address.value.parse::<IpAddr>().is_ok() => None,
                AddressType::IPAddress => Some(Error::validation_field(
                    format!("invalid IP address {:?}", address.value),
                    format!("{}.value", field),
                )),
                AddressType::NamedAddress => Some(Error::validation_field(
                    "only IPAddress addresses are supported",
                    format!("{}.type", field),
                )),
            }
        })
        .collect()
}
