//! Secret records. Only the shape of TLS material is checked.

use super::meta::ObjectMeta;
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";
pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

const PEM_BEGIN: &str = "-----BEGIN ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(rename = "type")]
    pub type_: String,
    /// Values are PEM text, not base64
    pub data: BTreeMap<String, String>,
}

impl Default for Secret {
    fn default() -> Self {
        Self { metadata: ObjectMeta::default(), type_: "Opaque".to_string(), data: BTreeMap::new() }
    }
}

impl Secret {
    pub fn tls<N, M, C, K>(namespace: N, name: M, cert: C, key: K) -> Self
    where
        N: Into<String>,
        M: Into<String>,
        C: Into<String>,
        K: Into<String>,
    {
        let mut data = BTreeMap::new();
        data.insert(TLS_CERT_KEY.to_string(), cert.into());
        data.insert(TLS_PRIVATE_KEY_KEY.to_string(), key.into());
        Self { metadata: ObjectMeta::new(namespace, name), type_: SECRET_TYPE_TLS.to_string(), data }
    }

    pub fn certificate_chain(&self) -> Option<&str> {
        self.data.get(TLS_CERT_KEY).map(String::as_str)
    }

    pub fn private_key(&self) -> Option<&str> {
        self.data.get(TLS_PRIVATE_KEY_KEY).map(String::as_str)
    }

    /// Check the secret looks like a TLS keypair without parsing it
    pub fn validate_tls(&self) -> Result<()> {
        if self.type_ != SECRET_TYPE_TLS {
            return Err(Error::validation(format!(
                "secret {} has type {:?}, expected {:?}",
                self.metadata.key(),
                self.type_,
                SECRET_TYPE_TLS
            )));
        }

        for key in [TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY] {
            match self.data.get(key) {
                Some(value) if value.contains(PEM_BEGIN) => {}
                Some(_) => {
                    return Err(Error::validation(format!(
                        "secret {} key {:?} is not PEM encoded",
                        self.metadata.key(),
                        key
                    )))
                }
                None => {
                    return Err(Error::validation(format!(
                        "secret {} is missing key {:?}",
                        self.metadata.key(),
                        key
                    )))
                }
            }
        }

        Ok(())
    }
}
