//! # Envoy Snapshots
//!
//! Translation of the DAG into Envoy xDS resources and the versioned cache
//! that publishes them to observers.

pub mod resources;
pub mod snapshot;

pub use resources::{
    BuiltResource, CLUSTER_TYPE_URL, HTTPS_LISTENER_NAME, HTTP_LISTENER_NAME, LISTENER_TYPE_URL,
    ROUTE_TYPE_URL, SECRET_TYPE_URL, SNAPSHOT_TYPE_URLS,
};
pub use snapshot::{ChannelObserver, Snapshot, SnapshotCache, SnapshotObserver};
