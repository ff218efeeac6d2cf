//! YAML and JSON manifests used to seed a store.

use super::ObjectStore;
use crate::domain::Resource;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Decode every YAML document in `input`. Empty documents are skipped.
pub fn parse_manifests(input: &str) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for document in serde_yaml::Deserializer::from_str(input) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        resources.push(serde_yaml::from_value(value)?);
    }
    Ok(resources)
}

/// Decode a JSON manifest holding one object or an array of objects
pub fn parse_json_manifest(input: &str) -> Result<Vec<Resource>> {
    match serde_json::from_str::<serde_json::Value>(input)? {
        serde_json::Value::Array(items) => {
            items.into_iter().map(|item| serde_json::from_value(item).map_err(Error::from)).collect()
        }
        value => Ok(vec![serde_json::from_value(value)?]),
    }
}

fn manifest_extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str()).filter(|ext| matches!(*ext, "yaml" | "yml" | "json"))
}

/// Read all `*.yaml`, `*.yml` and `*.json` files in `dir`, sorted by file name
pub fn load_manifests(dir: &Path) -> Result<Vec<Resource>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| manifest_extension(path).is_some())
        .collect();
    paths.sort();

    let mut resources = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(&path)?;
        let parsed = match manifest_extension(&path) {
            Some("json") => parse_json_manifest(&content),
            _ => parse_manifests(&content),
        };
        let parsed = parsed.map_err(|e| {
            Error::config(format!("Failed to parse manifest {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), count = parsed.len(), "Loaded manifest");
        resources.extend(parsed);
    }
    Ok(resources)
}

/// Create every resource in `store`, skipping ones that already exist
pub async fn seed<S: ObjectStore + ?Sized>(store: &S, resources: Vec<Resource>) -> Result<usize> {
    let mut created = 0;
    for resource in resources {
        let kind = resource.kind();
        let key = resource.key();
        match store.create(resource).await {
            Ok(_) => created += 1,
            Err(Error::Conflict(_)) => warn!(kind = %kind, key = %key, "Manifest object already exists"),
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceKind;
    use crate::store::InMemoryStore;
    use std::io::Write;

    const MANIFEST: &str = r#"
kind: GatewayClass
metadata:
  name: contour
spec:
  controller: meridian.dev/gateway-controller
---
kind: Service
metadata:
  namespace: default
  name: echo
spec:
  ports:
    - name: http
      port: 80
      targetPort: 8080
---
"#;

    #[test]
    fn parses_multi_document_yaml() {
        let resources = parse_manifests(MANIFEST).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].kind(), ResourceKind::GatewayClass);
        assert_eq!(resources[1].kind(), ResourceKind::Service);
    }

    #[test]
    fn unknown_kind_is_error() {
        assert!(parse_manifests("kind: Pod\nmetadata:\n  name: x\n").is_err());
    }

    #[test]
    fn parses_json_object_and_array() {
        let single = r#"{"kind": "Secret", "metadata": {"namespace": "default", "name": "tls"}}"#;
        assert_eq!(parse_json_manifest(single).unwrap()[0].kind(), ResourceKind::Secret);

        let many = r#"[{"kind": "Envoy", "metadata": {"namespace": "a", "name": "e"}},
                       {"kind": "Service", "metadata": {"namespace": "a", "name": "s"}}]"#;
        assert_eq!(parse_json_manifest(many).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn loads_directory_and_seeds_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("00-base.yaml")).unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();
        std::fs::write(
            dir.path().join("10-secret.json"),
            r#"{"kind": "Secret", "metadata": {"namespace": "default", "name": "tls"}}"#,
        )
        .unwrap();

        let resources = load_manifests(dir.path()).unwrap();
        assert_eq!(resources.len(), 3);
        assert_eq!(resources[2].kind(), ResourceKind::Secret);

        let store = InMemoryStore::new();
        assert_eq!(seed(&store, resources.clone()).await.unwrap(), 3);
        assert_eq!(seed(&store, resources).await.unwrap(), 0);
        assert_eq!(store.count(ResourceKind::Service), 1);
    }
}
