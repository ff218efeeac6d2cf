//! Attaches HTTPRoutes bound to the watched Gateway.

use super::{DagDraft, PathMatchCondition, Processor, Route, WeightedCluster};
use crate::cache::CacheSnapshot;
use crate::domain::{HttpRoute, HttpRouteForwardTo, NamespacedName, PathMatchType, ResourceKind};
use crate::validation::http_route::listener_binds;
use std::sync::Arc;

const NAME: &str = "gatewayapi";

#[derive(Debug, Default, Clone, Copy)]
pub struct GatewayApiProcessor;

impl Processor for GatewayApiProcessor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, draft: &mut DagDraft, cache: &CacheSnapshot) {
        let Some(gateway) = cache.gateway() else {
            draft.error(NAME, None, "gateway is not defined");
            return;
        };

        let mut bound = Vec::new();
        for route in cache.http_routes() {
            let source = Some((ResourceKind::HttpRoute, route.metadata.key()));
            let mut matched = false;
            for listener in &gateway.spec.listeners {
                match listener_binds(listener, route) {
                    Ok(true) => {
                        matched = true;
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => draft.error(
                        NAME,
                        source.clone(),
                        format!("error validating routes against listener selector: {}", e),
                    ),
                }
            }
            if matched {
                bound.push(Arc::clone(route));
            }
        }

        for route in bound {
            compute_http_route(draft, cache, &route);
        }
    }
}

fn compute_http_route(draft: &mut DagDraft, cache: &CacheSnapshot, route: &HttpRoute) {
    let key = route.metadata.key();
    let source = || Some((ResourceKind::HttpRoute, key.clone()));

    if route.spec.tls.is_some() {
        draft.error(NAME, source(), "NOT IMPLEMENTED: route TLS configuration is ignored");
    }

    let hosts = route.spec.effective_hosts();

    for (index, rule) in route.spec.rules.iter().enumerate() {
        let mut prefixes = Vec::new();
        for m in rule.effective_matches() {
            match m.path.type_ {
                PathMatchType::Prefix => prefixes.push(m.path.value_or_root().to_string()),
                other => draft.error(
                    NAME,
                    source(),
                    format!("NOT IMPLEMENTED: rule {} path match type {} is not supported", index, other),
                ),
            }
        }

        let mut clusters = Vec::new();
        for forward in &rule.forward_to {
            let Some((service, port)) = routable_target(draft, &key, index, forward) else {
                continue;
            };
            let service_key = NamespacedName::new(key.namespace.clone(), service);
            match draft.ensure_service(&service_key, port, cache) {
                Ok(cluster) => clusters.push(WeightedCluster { cluster, weight: forward.weight }),
                Err(e) => draft.error(NAME, source(), e.to_string()),
            }
        }

        if clusters.is_empty() {
            draft.error(
                NAME,
                source(),
                format!("rule {} rejected: no resolvable forwardTo destinations", index),
            );
            continue;
        }

        for prefix in prefixes {
            if let Some(dag_route) = Route::new(PathMatchCondition::Prefix(prefix), clusters.clone()) {
                draft.attach_route(&hosts, &dag_route);
            }
        }
    }
}

fn routable_target<'a>(
    draft: &mut DagDraft,
    key: &NamespacedName,
    index: usize,
    forward: &'a HttpRouteForwardTo,
) -> Option<(&'a str, u32)> {
    let source = Some((ResourceKind::HttpRoute, key.clone()));
    let Some(service) = forward.service_name.as_deref() else {
        draft.error(NAME, source, format!("rule {} forwardTo is missing serviceName", index));
        return None;
    };
    let Some(port) = forward.port else {
        draft.error(NAME, source, format!("rule {} forwardTo {} is missing port", index, service));
        return None;
    };
    Some((service, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{GatewaySelection, ResourceCache};
    use crate::dag::{Dag, DagBuilder};
    use crate::domain::{
        Gateway, GatewaySpec, HttpPathMatch, HttpRouteMatch, HttpRouteRule, HttpRouteSpec,
        LabelSelector, Listener, ObjectMeta, RouteBindingSelector, Service, ServicePort, ServiceSpec,
    };

    fn cache() -> ResourceCache {
        let cache = ResourceCache::new(GatewaySelection {
            gateway: Some(NamespacedName::new("projectcontour", "contour")),
            controller_name: String::new(),
        });
        for name in ["kuard", "echo"] {
            cache.insert(
                &Service {
                    metadata: ObjectMeta::new("default", name),
                    spec: ServiceSpec {
                        ports: vec![ServicePort { name: "http".into(), port: 80, target_port: 8080, ..Default::default() }],
                        ..Default::default()
                    },
                }
                .into(),
            );
        }
        cache
    }

    fn gateway(selectors: Vec<LabelSelector>) -> Gateway {
        Gateway {
            metadata: ObjectMeta::new("projectcontour", "contour"),
            spec: GatewaySpec {
                gateway_class_name: "contour".into(),
                listeners: selectors
                    .into_iter()
                    .enumerate()
                    .map(|(i, selector)| Listener {
                        port: 80 + i as u32,
                        routes: RouteBindingSelector { selector, ..Default::default() },
                        ..Default::default()
                    })
                    .collect(),
                addresses: vec![],
            },
            ..Default::default()
        }
    }

    fn route(name: &str, labels: &[(&str, &str)], hostnames: &[&str], rules: Vec<HttpRouteRule>) -> HttpRoute {
        HttpRoute {
            metadata: ObjectMeta::new("default", name)
                .with_labels(labels.iter().map(|(k, v)| (k.to_string(), v.to_string()))),
            spec: HttpRouteSpec {
                hostnames: hostnames.iter().map(|h| h.to_string()).collect(),
                rules,
                tls: None,
            },
            ..Default::default()
        }
    }

    fn rule(prefix: &str, forward: Vec<HttpRouteForwardTo>) -> HttpRouteRule {
        HttpRouteRule {
            matches: vec![HttpRouteMatch { path: HttpPathMatch::prefix(prefix) }],
            forward_to: forward,
        }
    }

    fn build(cache: &ResourceCache) -> Dag {
        DagBuilder::new(vec![Box::new(GatewayApiProcessor)]).build(&cache.snapshot())
    }

    #[test]
    fn missing_gateway_is_diagnostic_only() {
        let cache = cache();
        cache.insert(&route("r", &[], &[], vec![rule("/", vec![HttpRouteForwardTo::service("kuard", 80)])]).into());
        let dag = build(&cache);
        assert_eq!(dag.virtual_hosts().count(), 0);
        assert_eq!(dag.diagnostics()[0].message, "gateway is not defined");
    }

    #[test]
    fn empty_selector_binds_to_wildcard_host() {
        let cache = cache();
        cache.insert(&gateway(vec![LabelSelector::default()]).into());
        cache.insert(&route("r", &[], &[], vec![rule("/", vec![HttpRouteForwardTo::service("kuard", 80)])]).into());

        let dag = build(&cache);
        let vhost = dag.virtual_host("*").unwrap();
        assert_eq!(vhost.routes().len(), 1);
        assert_eq!(vhost.routes()[0].path, PathMatchCondition::Prefix("/".into()));
        assert_eq!(vhost.routes()[0].clusters()[0].cluster.name(), "default/kuard/80");
    }

    #[test]
    fn selector_filters_routes() {
        let cache = cache();
        cache.insert(&gateway(vec![LabelSelector::from_labels([("app", "filter")])]).into());
        cache.insert(
            &route("match", &[("app", "filter")], &["a.example.com"], vec![rule("/", vec![HttpRouteForwardTo::service("kuard", 80)])])
                .into(),
        );
        cache.insert(
            &route("other", &[("app", "other")], &["b.example.com"], vec![rule("/", vec![HttpRouteForwardTo::service("kuard", 80)])])
                .into(),
        );

        let dag = build(&cache);
        assert!(dag.virtual_host("a.example.com").is_some());
        assert!(dag.virtual_host("b.example.com").is_none());
    }

    #[test]
    fn route_fans_out_across_hosts_and_prefixes() {
        let cache = cache();
        cache.insert(&gateway(vec![LabelSelector::default()]).into());
        let mut r = rule("/", vec![HttpRouteForwardTo::service("kuard", 80), HttpRouteForwardTo::service("echo", 80)]);
        r.matches.push(HttpRouteMatch { path: HttpPathMatch::prefix("/api") });
        cache.insert(&route("r", &[], &["a.example.com", "b.example.com"], vec![r]).into());

        let dag = build(&cache);
        for host in ["a.example.com", "b.example.com"] {
            let vhost = dag.virtual_host(host).unwrap();
            assert_eq!(vhost.routes().len(), 2);
            assert_eq!(vhost.routes()[0].clusters().len(), 2);
        }
        assert_eq!(dag.clusters().len(), 2);
    }

    #[test]
    fn rule_with_only_portless_targets_is_rejected() {
        let cache = cache();
        cache.insert(&gateway(vec![LabelSelector::default()]).into());
        let forward = HttpRouteForwardTo { service_name: Some("kuard".into()), port: None, weight: 1 };
        cache.insert(&route("r", &[], &[], vec![rule("/", vec![forward.clone(), forward])]).into());

        let dag = build(&cache);
        assert_eq!(dag.virtual_hosts().count(), 0);
        assert!(dag.diagnostics().iter().any(|d| d.message.contains("rejected")));
        assert_eq!(dag.diagnostics().iter().filter(|d| d.message.contains("missing port")).count(), 2);
    }

    #[test]
    fn bad_target_does_not_sink_siblings() {
        let cache = cache();
        cache.insert(&gateway(vec![LabelSelector::default()]).into());
        let missing_name = HttpRouteForwardTo { service_name: None, port: Some(80), weight: 1 };
        let missing_service = HttpRouteForwardTo::service("nope", 80);
        cache.insert(
            &route("r", &[], &[], vec![rule("/", vec![missing_name, missing_service, HttpRouteForwardTo::service("kuard", 80)])])
                .into(),
        );

        let dag = build(&cache);
        let vhost = dag.virtual_host("*").unwrap();
        assert_eq!(vhost.routes()[0].clusters().len(), 1);
        assert_eq!(dag.diagnostics().len(), 2);
    }

    #[test]
    fn non_prefix_match_is_not_implemented() {
        let cache = cache();
        cache.insert(&gateway(vec![LabelSelector::default()]).into());
        let mut r = rule("/", vec![HttpRouteForwardTo::service("kuard", 80)]);
        r.matches = vec![HttpRouteMatch {
            path: HttpPathMatch { type_: PathMatchType::Exact, value: Some("/exact".into()) },
        }];
        cache.insert(&route("r", &[], &[], vec![r]).into());

        let dag = build(&cache);
        assert_eq!(dag.virtual_hosts().count(), 0);
        assert!(dag.diagnostics()[0].message.starts_with("NOT IMPLEMENTED"));
    }

    #[test]
    fn route_matching_two_listeners_is_processed_once() {
        let cache = cache();
        cache.insert(&gateway(vec![LabelSelector::default(), LabelSelector::default()]).into());
        cache.insert(&route("r", &[], &[], vec![rule("/", vec![HttpRouteForwardTo::service("kuard", 80)])]).into());

        let dag = build(&cache);
        assert_eq!(dag.virtual_host("*").unwrap().routes().len(), 1);
    }
}
