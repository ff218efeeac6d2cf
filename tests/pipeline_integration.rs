//! End-to-end tests: objects written to the store flow through the
//! pipeline into status conditions and Envoy snapshots.

mod common;

use common::{eventually, fast_config, gateway_class, http_gateway, https_gateway, route, service, tls_secret};
use meridian::domain::{
    find_condition, Condition, ConditionStatus, Envoy, LabelSelector, NamespacedName, ObjectMeta, Resource,
    ResourceKind, CONDITION_ADMITTED, CONDITION_AVAILABLE, CONDITION_READY, OWNING_ENVOY_NAME_LABEL,
};
use meridian::provision::service::ENVOY_SERVICE_NAME;
use meridian::store::{InMemoryStore, ObjectStore};
use meridian::xds::{SnapshotCache, CLUSTER_TYPE_URL, ROUTE_TYPE_URL, SECRET_TYPE_URL};
use meridian::{ControlPlane, MetricsRecorder};
use std::sync::Arc;
use std::time::Duration;
use tracing_test::traced_test;

const WAIT: Duration = Duration::from_secs(5);

async fn condition(
    store: &InMemoryStore,
    kind: ResourceKind,
    key: &NamespacedName,
    type_: &str,
) -> Option<Condition> {
    let resource = store.get(kind, key).await.ok()?;
    find_condition(resource.conditions()?, type_).cloned()
}

async fn condition_is(
    store: &InMemoryStore,
    kind: ResourceKind,
    key: &NamespacedName,
    type_: &str,
    status: ConditionStatus,
) -> bool {
    condition(store, kind, key, type_).await.is_some_and(|c| c.status == status)
}

fn cluster_names(snapshots: &SnapshotCache) -> Vec<String> {
    snapshots.resources(CLUSTER_TYPE_URL).1.into_iter().map(|r| r.name).collect()
}

async fn seed_gateway(store: &InMemoryStore) {
    store.create(gateway_class("contour").into()).await.unwrap();
    store.create(http_gateway("projectcontour", "contour", "contour").into()).await.unwrap();
}

#[traced_test]
#[tokio::test]
async fn route_is_admitted_and_programmed() {
    let store = Arc::new(InMemoryStore::new());
    seed_gateway(&store).await;
    store.create(service("default", "kuard", 80).into()).await.unwrap();
    store.create(route("default", "kuard", "kuard.example.com", "/", "kuard", 80).into()).await.unwrap();

    let plane = ControlPlane::start(&fast_config(), store.clone(), MetricsRecorder::new()).await.unwrap();

    let class_key = NamespacedName::cluster_scoped("contour");
    assert!(
        eventually(WAIT, || condition_is(
            &store,
            ResourceKind::GatewayClass,
            &class_key,
            CONDITION_ADMITTED,
            ConditionStatus::True
        ))
        .await
    );

    let gateway_key = NamespacedName::new("projectcontour", "contour");
    assert!(
        eventually(WAIT, || condition_is(
            &store,
            ResourceKind::Gateway,
            &gateway_key,
            CONDITION_READY,
            ConditionStatus::True
        ))
        .await
    );

    let route_key = NamespacedName::new("default", "kuard");
    assert!(
        eventually(WAIT, || condition_is(
            &store,
            ResourceKind::HttpRoute,
            &route_key,
            CONDITION_ADMITTED,
            ConditionStatus::True
        ))
        .await
    );

    let snapshots = plane.snapshots.clone();
    assert!(
        eventually(WAIT, || {
            let snapshots = snapshots.clone();
            async move { cluster_names(&snapshots).contains(&"default/kuard/80".to_string()) }
        })
        .await
    );
    let (version, routes) = snapshots.resources(ROUTE_TYPE_URL);
    assert!(version >= 1);
    assert!(!routes.is_empty());
    assert!(plane.latest_dag().unwrap().virtual_host("kuard.example.com").is_some());

    plane.shutdown().await;
}

#[traced_test]
#[tokio::test]
async fn missing_service_converges_once_created() {
    let store = Arc::new(InMemoryStore::new());
    seed_gateway(&store).await;
    store.create(route("default", "kuard", "kuard.example.com", "/", "kuard", 80).into()).await.unwrap();

    let plane = ControlPlane::start(&fast_config(), store.clone(), MetricsRecorder::new()).await.unwrap();

    let route_key = NamespacedName::new("default", "kuard");
    let (s, key) = (store.as_ref(), &route_key);
    assert!(
        eventually(WAIT, || async move {
            condition(s, ResourceKind::HttpRoute, key, CONDITION_ADMITTED)
                .await
                .is_some_and(|c| c.status == ConditionStatus::False && c.reason == "ReferenceNotFound")
        })
        .await
    );
    assert!(cluster_names(&plane.snapshots).is_empty());

    store.create(service("default", "kuard", 80).into()).await.unwrap();

    assert!(
        eventually(WAIT, || condition_is(
            &store,
            ResourceKind::HttpRoute,
            &route_key,
            CONDITION_ADMITTED,
            ConditionStatus::True
        ))
        .await
    );
    let snapshots = plane.snapshots.clone();
    assert!(
        eventually(WAIT, || {
            let snapshots = snapshots.clone();
            async move { cluster_names(&snapshots) == vec!["default/kuard/80".to_string()] }
        })
        .await
    );

    plane.shutdown().await;
}

#[traced_test]
#[tokio::test]
async fn gateway_waits_for_its_certificate_secret() {
    let store = Arc::new(InMemoryStore::new());
    store.create(gateway_class("contour").into()).await.unwrap();
    store
        .create(https_gateway("projectcontour", "contour", "contour", "contour-tls").into())
        .await
        .unwrap();

    let plane = ControlPlane::start(&fast_config(), store.clone(), MetricsRecorder::new()).await.unwrap();

    let gateway_key = NamespacedName::new("projectcontour", "contour");
    let (s, key) = (store.as_ref(), &gateway_key);
    assert!(
        eventually(WAIT, || async move {
            condition(s, ResourceKind::Gateway, key, CONDITION_READY)
                .await
                .is_some_and(|c| {
                    c.status == ConditionStatus::False
                        && c.reason == "ReferenceNotFound"
                        && c.message.contains("projectcontour/contour-tls")
                })
        })
        .await
    );

    store.create(tls_secret("projectcontour", "contour-tls").into()).await.unwrap();

    assert!(
        eventually(WAIT, || condition_is(
            &store,
            ResourceKind::Gateway,
            &gateway_key,
            CONDITION_READY,
            ConditionStatus::True
        ))
        .await
    );
    let snapshots = plane.snapshots.clone();
    assert!(
        eventually(WAIT, || {
            let snapshots = snapshots.clone();
            async move { !snapshots.resources(SECRET_TYPE_URL).1.is_empty() }
        })
        .await
    );

    plane.shutdown().await;
}

#[traced_test]
#[tokio::test]
async fn route_outside_listener_selector_is_not_admitted_until_bound() {
    let store = Arc::new(InMemoryStore::new());
    store.create(gateway_class("contour").into()).await.unwrap();
    let mut gateway = http_gateway("projectcontour", "contour", "contour");
    gateway.spec.listeners[0].routes.selector = LabelSelector::from_labels([("app", "web")]);
    store.create(gateway.into()).await.unwrap();
    store.create(service("default", "kuard", 80).into()).await.unwrap();
    store.create(route("default", "kuard", "kuard.example.com", "/", "kuard", 80).into()).await.unwrap();

    let plane = ControlPlane::start(&fast_config(), store.clone(), MetricsRecorder::new()).await.unwrap();

    let route_key = NamespacedName::new("default", "kuard");
    let (s, key) = (store.as_ref(), &route_key);
    assert!(
        eventually(WAIT, || async move {
            condition(s, ResourceKind::HttpRoute, key, CONDITION_ADMITTED)
                .await
                .is_some_and(|c| c.status == ConditionStatus::False && c.reason == "NotBound")
        })
        .await
    );
    assert!(cluster_names(&plane.snapshots).is_empty());

    // widen the listener to accept every route
    let gateway_key = NamespacedName::new("projectcontour", "contour");
    let Resource::Gateway(mut gateway) = store.get(ResourceKind::Gateway, &gateway_key).await.unwrap() else {
        panic!("expected a gateway");
    };
    gateway.spec.listeners[0].routes.selector = LabelSelector::default();
    store.update(gateway.into()).await.unwrap();

    assert!(
        eventually(WAIT, || condition_is(
            &store,
            ResourceKind::HttpRoute,
            &route_key,
            CONDITION_ADMITTED,
            ConditionStatus::True
        ))
        .await
    );
    let snapshots = plane.snapshots.clone();
    assert!(
        eventually(WAIT, || {
            let snapshots = snapshots.clone();
            async move { cluster_names(&snapshots) == vec!["default/kuard/80".to_string()] }
        })
        .await
    );

    plane.shutdown().await;
}

#[traced_test]
#[tokio::test]
async fn foreign_gateway_class_is_left_alone() {
    let store = Arc::new(InMemoryStore::new());
    let mut foreign = gateway_class("other");
    foreign.spec.controller = "example.com/other-controller".into();
    store.create(foreign.into()).await.unwrap();
    store.create(gateway_class("contour").into()).await.unwrap();

    let plane = ControlPlane::start(&fast_config(), store.clone(), MetricsRecorder::new()).await.unwrap();

    let ours = NamespacedName::cluster_scoped("contour");
    assert!(
        eventually(WAIT, || condition_is(
            &store,
            ResourceKind::GatewayClass,
            &ours,
            CONDITION_ADMITTED,
            ConditionStatus::True
        ))
        .await
    );
    let theirs = NamespacedName::cluster_scoped("other");
    assert!(condition(&store, ResourceKind::GatewayClass, &theirs, CONDITION_ADMITTED).await.is_none());

    plane.shutdown().await;
}

#[traced_test]
#[tokio::test]
async fn envoy_provisions_and_releases_its_service() {
    let store = Arc::new(InMemoryStore::new());
    let plane = ControlPlane::start(&fast_config(), store.clone(), MetricsRecorder::new()).await.unwrap();

    let envoy = Envoy { metadata: ObjectMeta::new("projectcontour", "contour"), ..Default::default() };
    let envoy_key = envoy.metadata.key();
    store.create(envoy.into()).await.unwrap();

    let service_key = NamespacedName::new("projectcontour", ENVOY_SERVICE_NAME);
    let (s, svc) = (store.as_ref(), &service_key);
    assert!(eventually(WAIT, || async move { s.get(ResourceKind::Service, svc).await.is_ok() }).await);
    let owned = store.get(ResourceKind::Service, &service_key).await.unwrap();
    assert_eq!(owned.meta().labels.get(OWNING_ENVOY_NAME_LABEL).map(String::as_str), Some("contour"));

    assert!(
        eventually(WAIT, || condition_is(
            &store,
            ResourceKind::Envoy,
            &envoy_key,
            CONDITION_AVAILABLE,
            ConditionStatus::True
        ))
        .await
    );

    store.delete(ResourceKind::Envoy, &envoy_key).await.unwrap();
    let envoy = &envoy_key;
    assert!(
        eventually(WAIT, || async move {
            s.get(ResourceKind::Envoy, envoy).await.is_err() && s.get(ResourceKind::Service, svc).await.is_err()
        })
        .await
    );

    plane.shutdown().await;
}

#[traced_test]
#[tokio::test]
async fn burst_of_changes_coalesces_into_few_snapshots() {
    let store = Arc::new(InMemoryStore::new());
    seed_gateway(&store).await;

    let mut config = fast_config();
    config.scheduler.holdoff_delay_ms = 100;
    config.scheduler.holdoff_max_delay_ms = 1000;
    let plane = ControlPlane::start(&config, store.clone(), MetricsRecorder::new()).await.unwrap();

    let snapshots = plane.snapshots.clone();
    assert!(
        eventually(WAIT, || {
            let snapshots = snapshots.clone();
            async move { snapshots.current_version() >= 1 }
        })
        .await
    );
    // let status writes from startup settle
    tokio::time::sleep(Duration::from_millis(300)).await;
    let before = snapshots.current_version();

    for i in 0..20 {
        store.create(service("default", &format!("svc-{i}"), 80).into()).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(600)).await;

    let rebuilds = snapshots.current_version() - before;
    assert!(rebuilds >= 1);
    assert!(rebuilds < 20, "expected coalesced rebuilds, got {rebuilds}");

    plane.shutdown().await;
}
