use crate::domain::{Envoy, Resource, ENVOY_FINALIZER};
use crate::errors::{Error, Result};
use crate::store::ObjectStore;
use tracing::debug;

fn into_envoy(resource: Resource) -> Result<Envoy> {
    match resource {
        Resource::Envoy(envoy) => Ok(envoy),
        other => Err(Error::internal(format!("store returned a {} for an Envoy update", other.kind()))),
    }
}

/// Add the cleanup finalizer before any owned object is created
pub async fn ensure_finalizer(store: &dyn ObjectStore, envoy: &Envoy) -> Result<Envoy> {
    if envoy.metadata.has_finalizer(ENVOY_FINALIZER) {
        return Ok(envoy.clone());
    }

    let mut updated = envoy.clone();
    updated.metadata.finalizers.push(ENVOY_FINALIZER.to_string());
    let stored = into_envoy(store.update(updated.into()).await?)?;
    debug!(envoy = %stored.metadata.key(), "Added finalizer");
    Ok(stored)
}

/// Remove the cleanup finalizer once owned objects are gone
pub async fn ensure_finalizer_removed(store: &dyn ObjectStore, envoy: &Envoy) -> Result<()> {
    if !envoy.metadata.has_finalizer(ENVOY_FINALIZER) {
        return Ok(());
    }

    let mut updated = envoy.clone();
    updated.metadata.finalizers.retain(|f| f != ENVOY_FINALIZER);
    match store.update(updated.into()).await {
        Ok(_) => {
            debug!(envoy = %envoy.metadata.key(), "Removed finalizer");
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NamespacedName, ObjectMeta, ResourceKind};
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn finalizer_round_trip_releases_deletion() {
        let store = InMemoryStore::new();
        let created = store
            .create(Envoy { metadata: ObjectMeta::new("projectcontour", "contour"), ..Default::default() }.into())
            .await
            .unwrap();
        let envoy = into_envoy(created).unwrap();

        let with_finalizer = ensure_finalizer(&store, &envoy).await.unwrap();
        assert!(with_finalizer.metadata.has_finalizer(ENVOY_FINALIZER));
        // second call is a no-op
        ensure_finalizer(&store, &with_finalizer).await.unwrap();

        let key = NamespacedName::new("projectcontour", "contour");
        store.delete(ResourceKind::Envoy, &key).await.unwrap();
        let deleting = into_envoy(store.get(ResourceKind::Envoy, &key).await.unwrap()).unwrap();
        assert!(deleting.metadata.is_deleting());

        ensure_finalizer_removed(&store, &deleting).await.unwrap();
        assert!(store.get(ResourceKind::Envoy, &key).await.unwrap_err().is_not_found());
    }
}
