//! # Validation Module
//!
//! Pure validators over a cache snapshot. They never mutate anything and
//! never retry: each returns `Ok(())`, a single error, or an
//! [`ErrorAggregate`](crate::errors::ErrorAggregate) holding every fault
//! found in one pass. Missing or not-yet-admitted references are retryable;
//! everything else needs a spec edit.

pub mod envoy;
pub mod gateway;
pub mod gateway_class;
pub mod http_route;

pub use envoy::validate_envoy;
pub use gateway::validate_gateway;
pub use gateway_class::validate_gateway_class;
pub use http_route::{route_binding, validate_http_route, RouteBinding};

use crate::errors::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::net::IpAddr;

lazy_static! {
    /// RFC 1123 subdomain, lowercase
    static ref DNS_SUBDOMAIN_REGEX: Regex =
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap();
}

const MAX_HOSTNAME_LEN: usize = 253;

/// Hostnames are DNS subdomains, optionally with a leading `*.` label.
/// IP addresses are rejected.
pub fn validate_hostname(hostname: &str, field: &str) -> Result<()> {
    if hostname.parse::<IpAddr>().is_ok() {
        return Err(Error::validation_field(
            format!("hostname {:?} must not be an IP address", hostname),
            field,
        ));
    }

    let bare = hostname.strip_prefix("*.").unwrap_or(hostname);
    if bare.is_empty() || bare.len() > MAX_HOSTNAME_LEN || !DNS_SUBDOMAIN_REGEX.is_match(bare) {
        return Err(Error::validation_field(
            format!("hostname {:?} is not a valid DNS subdomain", hostname),
            field,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostnames() {
        assert!(validate_hostname("example.com", "hostname").is_ok());
        assert!(validate_hostname("*.example.com", "hostname").is_ok());
        assert!(validate_hostname("10.0.0.1", "hostname").is_err());
        assert!(validate_hostname("::1", "hostname").is_err());
        assert!(validate_hostname("Example.com", "hostname").is_err());
        assert!(validate_hostname("*", "hostname").is_err());
        assert!(validate_hostname("foo..bar", "hostname").is_err());
    }
}
