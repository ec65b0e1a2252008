//! Pure `(ingress, cluster snapshot, config, defaults) -> LBModel`
//! derivation. Grounded on `original_source/src/ingress/spec.go`
//! (`NewIngressLBSpec`, `setupBackendSetsForSpec`) and
//! `original_source/src/ingress/sharable_helpers.go`.
//!
//! This module does no I/O: every cluster lookup (services, nodes,
//! secrets, discovered subnet) is resolved by the caller ahead of time
//! and passed in via `BuilderInputs`. That keeps the derivation itself
//! total and suspension-free, per §5.

use std::collections::BTreeMap;

use crate::annotations::*;
use crate::cluster::{Node, Secret, SecretType, Service};
use crate::config::Defaults;
use crate::error::{Error, Result};
use crate::match_expr::{self, IngressPath, PathType as MatchPathType};
use crate::model::*;
use crate::naming;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressBackendRef {
    pub service_name: String,
    pub port_number: u16,
    pub port_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressPathRule {
    pub path: String,
    pub path_type: MatchPathType,
    pub backend: IngressBackendRef,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressRule {
    pub host: String,
    pub paths: Vec<IngressPathRule>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressTls {
    pub hosts: Vec<String>,
    pub secret_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ingress {
    pub name: String,
    pub namespace: String,
    pub ingress_class_name: Option<String>,
    pub annotations: BTreeMap<String, String>,
    pub tls: Vec<IngressTls>,
    pub rules: Vec<IngressRule>,
    pub default_backend: Option<IngressBackendRef>,
}

/// Everything the derivation needs, pre-fetched by the caller.
pub struct BuilderInputs<'a> {
    pub ingress: &'a Ingress,
    pub services: &'a BTreeMap<String, Service>,
    pub nodes: &'a [Node],
    pub secrets: &'a BTreeMap<String, Secret>,
    pub resolved_subnet_ids: Vec<String>,
    pub defaults: &'a Defaults,
}

pub struct BuildOutput {
    pub model: LbModel,
    pub services: BTreeMap<String, Service>,
    pub service_nodes: BTreeMap<String, Vec<Node>>,
}

/// Validates an ingress has at least one rule or a default backend, and
/// its class matches the configured one.
fn validate_ingress(ingress: &Ingress, defaults: &Defaults) -> Result<()> {
    if ingress.rules.is_empty() && ingress.default_backend.is_none() {
        return Err(Error::InvalidInput(
            "ingress must have at least one rule or a default backend".to_string(),
        ));
    }
    if let Some(class) = &ingress.ingress_class_name {
        if *class != defaults.ingress_class {
            return Err(Error::InvalidInput(format!(
                "ingress class {class} does not match configured class {}",
                defaults.ingress_class
            )));
        }
    }
    Ok(())
}

fn resolve_shape(ingress: &Ingress, defaults: &Defaults) -> Result<LbShape> {
    let shape = get(&ingress.annotations, LOAD_BALANCER_SHAPE).unwrap_or_else(|| defaults.default_lb_shape.clone());
    if shape.to_lowercase() != "flexible" {
        return Ok(LbShape::Named(shape));
    }
    let flex_min = get_u32(&ingress.annotations, LOAD_BALANCER_SHAPE_FLEX_MIN);
    let flex_max = get_u32(&ingress.annotations, LOAD_BALANCER_SHAPE_FLEX_MAX);
    let (min, max) = match (flex_min, flex_max) {
        (None, None) => (defaults.default_flex_shape_min_mbps, defaults.default_flex_shape_max_mbps),
        (Some(min), Some(max)) => (min, max),
        _ => {
            return Err(Error::InvalidInput(format!(
                "{LOAD_BALANCER_SHAPE}=flexible requires both {LOAD_BALANCER_SHAPE_FLEX_MIN} and {LOAD_BALANCER_SHAPE_FLEX_MAX} to be set"
            )))
        }
    };
    Ok(LbShape::flexible(min, max))
}

fn resolve_internal(ingress: &Ingress) -> Result<bool> {
    match get_bool(&ingress.annotations, LOAD_BALANCER_INTERNAL) {
        Some(v) => Ok(v),
        None => Ok(false),
    }
}

fn resolve_reserved_ip(ingress: &Ingress, internal: bool) -> Result<Option<String>> {
    let Some(ip) = get(&ingress.annotations, LOAD_BALANCER_RESERVED_IP) else {
        return Ok(None);
    };
    if ip.is_empty() {
        return Ok(None);
    }
    ip.parse::<std::net::IpAddr>()
        .map_err(|_| Error::InvalidInput(format!("invalid value {ip:?} provided for LoadBalancerIP")))?;
    if internal {
        return Err(Error::InvalidInput(
            "cannot create a private load balancer with a reserved IP".to_string(),
        ));
    }
    Ok(Some(ip))
}

fn resolve_network_security_group_ids(ingress: &Ingress) -> Result<Vec<String>> {
    let mut ids = get_csv(&ingress.annotations, LOAD_BALANCER_NETWORK_SECURITY_GROUPS);
    ids.sort();
    ids.dedup();
    if ids.len() > 5 {
        return Err(Error::InvalidInput(
            "invalid number of Network Security Groups (max 5)".to_string(),
        ));
    }
    Ok(ids)
}

fn resolve_subnet_ids(ingress: &Ingress, resolved: &[String]) -> Vec<String> {
    let mut ids = Vec::new();
    if let Some(s1) = get(&ingress.annotations, LOAD_BALANCER_SUBNET_1) {
        ids.push(s1);
    }
    if let Some(s2) = get(&ingress.annotations, LOAD_BALANCER_SUBNET_2) {
        ids.push(s2);
    }
    if !ids.is_empty() {
        return ids;
    }
    resolved.to_vec()
}

fn lb_policy(ingress: &Ingress) -> LbPolicy {
    get(&ingress.annotations, LOAD_BALANCER_POLICY)
        .map(|v| LbPolicy::from_annotation(&v))
        .unwrap_or(LbPolicy::RoundRobin)
}

/// Resolves `oci-load-balancer-backend-protocol`, defaulting to HTTP.
/// Grounded on `original_source/pkg/cloudprovider/providers/oci/load_balancer_spec.go`'s
/// `AnnotationLoadBalancerBEProtocol` handling, which accepts only "HTTP"
/// or "TCP" case-insensitively and rejects anything else.
fn backend_protocol(ingress: &Ingress) -> Result<BackendSetProtocol> {
    match get(&ingress.annotations, LOAD_BALANCER_BACKEND_PROTOCOL) {
        None => Ok(BackendSetProtocol::Http),
        Some(v) if v.eq_ignore_ascii_case("http") => Ok(BackendSetProtocol::Http),
        Some(v) if v.eq_ignore_ascii_case("tcp") => Ok(BackendSetProtocol::Tcp),
        Some(v) => Err(Error::InvalidInput(format!(
            "invalid backend protocol {v:?} requested for load balancer backend set, only 'HTTP' and 'TCP' are supported"
        ))),
    }
}

fn health_checker(ingress: &Ingress, service: &Service, protocol: BackendSetProtocol) -> HealthChecker {
    let retries = get_u32(&ingress.annotations, LOAD_BALANCER_HEALTH_CHECK_RETRIES).unwrap_or(HealthChecker::DEFAULT_RETRIES);
    let interval_ms = get_u32(&ingress.annotations, LOAD_BALANCER_HEALTH_CHECK_INTERVAL).unwrap_or(HealthChecker::DEFAULT_INTERVAL_MS);
    let timeout_ms = get_u32(&ingress.annotations, LOAD_BALANCER_HEALTH_CHECK_TIMEOUT).unwrap_or(HealthChecker::DEFAULT_TIMEOUT_MS);
    if let Some((path, port)) = service.health_check_override() {
        return HealthChecker {
            protocol,
            port,
            url_path: Some(path),
            retries,
            interval_ms,
            timeout_ms,
        };
    }
    HealthChecker {
        protocol,
        port: 0,
        url_path: if protocol == BackendSetProtocol::Http { Some("/".to_string()) } else { None },
        retries,
        interval_ms,
        timeout_ms,
    }
}

/// Derives the content-addressed certificate name and parses the leaf
/// certificate's signature for its digest, per §3/§4.3 step 7.
fn build_certificate(namespace: &str, secret_name: &str, secret: &Secret) -> Result<Certificate> {
    if secret.secret_type != SecretType::Tls {
        return Err(Error::InvalidInput(format!("secret {namespace}/{secret_name} is not of type TLS")));
    }
    let (_, cert) = x509_parser::parse_x509_certificate(&secret.tls_cert)
        .map_err(|e| Error::InvalidInput(format!("failed to parse tls certificate from secret {secret_name}: {e}")))?;
    let signature = cert.signature_value.as_ref();
    let ns_name = format!("{namespace}/{secret_name}").replace('/', "_");
    let name = format!("{ns_name}_{}", naming::byte_alphanumeric_digest(signature, 22));
    Ok(Certificate {
        name,
        public_certificate: String::from_utf8_lossy(&secret.tls_cert).to_string(),
        private_key: String::from_utf8_lossy(&secret.tls_key).to_string(),
        ca_certificate: None,
        passphrase: None,
    })
}

/// Resolves `oci-load-balancer-connection-idle-timeout` (milliseconds).
/// `None` leaves the LB's own default in place.
fn connection_idle_timeout(ingress: &Ingress) -> Option<i64> {
    get_i64(&ingress.annotations, LOAD_BALANCER_CONNECTION_IDLE_TIMEOUT)
}

fn listener_for_host(
    host: &str,
    hostname: Option<&HostnameDetail>,
    ssl_config: Option<SslConfig>,
    connection_idle_timeout: Option<i64>,
) -> (String, Listener) {
    let (protocol, port) = if ssl_config.is_some() {
        (ListenerProtocol::Http2, 443)
    } else {
        (ListenerProtocol::Http, 80)
    };
    let listener = Listener {
        default_backend_set_name: DUMMY_BACKEND_SET_NAME.to_string(),
        protocol,
        port,
        hostname_names: hostname.map(|h| vec![h.name.clone()]).unwrap_or_default(),
        ssl_config,
        routing_policy_name: None,
        rule_set_names: Vec::new(),
        connection_idle_timeout,
    }
    .normalized();
    (naming::listener_name(host), listener)
}

pub fn build_model(inputs: &BuilderInputs<'_>) -> Result<BuildOutput> {
    let ingress = inputs.ingress;
    let defaults = inputs.defaults;
    validate_ingress(ingress, defaults)?;

    let internal = resolve_internal(ingress)?;
    let shape = resolve_shape(ingress, defaults)?;
    let reserved_ip = resolve_reserved_ip(ingress, internal)?;
    let nsg_ids = resolve_network_security_group_ids(ingress)?;
    let subnet_ids = resolve_subnet_ids(ingress, &inputs.resolved_subnet_ids);
    if subnet_ids.is_empty() {
        return Err(Error::InvalidInput("could not resolve any load balancer subnet ids".to_string()));
    }

    let mut hosts_with_tls: BTreeMap<String, String> = BTreeMap::new();
    for tls in &ingress.tls {
        for host in &tls.hosts {
            hosts_with_tls.insert(host.clone(), tls.secret_name.clone());
        }
    }

    let name = naming::lb_name(&defaults.load_balancer_prefix, &ingress.namespace, &ingress.name);
    let mut model = LbModel::new(name, shape, subnet_ids);
    model.internal = internal;
    model.load_balancer_ip = reserved_ip;
    model.network_security_group_ids = nsg_ids;

    let mut services_used: BTreeMap<String, Service> = BTreeMap::new();
    let mut service_nodes: BTreeMap<String, Vec<Node>> = BTreeMap::new();
    let mut backend_set_names: BTreeMap<String, String> = BTreeMap::new();
    let backend_protocol = backend_protocol(ingress)?;
    let idle_timeout = connection_idle_timeout(ingress);

    let mut resolve_backend = |backend: &IngressBackendRef, model: &mut LbModel| -> Result<String> {
        let cache_key = format!("{}:{}:{}", backend.service_name, backend.port_number, backend.port_name);
        if let Some(name) = backend_set_names.get(&cache_key) {
            return Ok(name.clone());
        }
        let service = inputs
            .services
            .get(&backend.service_name)
            .ok_or_else(|| Error::NotFound(format!("service {}/{}", ingress.namespace, backend.service_name)))?;
        let node_port = service.resolve_node_port(backend.port_number, &backend.port_name)?;
        let backend_set_name = naming::backend_set_name(&backend.service_name, "TCP", node_port);
        if !model.backend_sets.contains_key(&backend_set_name) {
            let backends = inputs
                .nodes
                .iter()
                .map(|n| Backend::new(n.internal_ip.clone(), node_port))
                .collect();
            model.backend_sets.insert(
                backend_set_name.clone(),
                BackendSet {
                    policy: lb_policy(ingress),
                    backends,
                    health_checker: health_checker(ingress, service, backend_protocol),
                    ssl_config: None,
                },
            );
        }
        services_used.insert(backend.service_name.clone(), service.clone());
        service_nodes.insert(backend.service_name.clone(), inputs.nodes.to_vec());
        backend_set_names.insert(cache_key, backend_set_name.clone());
        Ok(backend_set_name)
    };

    for rule in &ingress.rules {
        let host = rule.host.clone();
        let mut routing_rules = Vec::new();
        for path in &rule.paths {
            let backend_set_name = resolve_backend(&path.backend, &mut model)?;
            let ingress_path = IngressPath {
                path: path.path.clone(),
                path_type: path.path_type.clone(),
                backend_set_name: backend_set_name.clone(),
            };
            let rule = match_expr::compile_routing_rule(&ingress_path, &host)?;
            routing_rules.push(RoutingRule {
                name: rule.name,
                condition: rule.condition,
                backend_set_name: rule.backend_set_name,
            });
        }

        let ssl_config = if let Some(secret_name) = hosts_with_tls.get(&host) {
            let secret = inputs
                .secrets
                .get(secret_name)
                .ok_or_else(|| Error::NotFound(format!("secret {}/{secret_name}", ingress.namespace)))?;
            let cert = build_certificate(&ingress.namespace, secret_name, secret)?;
            let cert_name = cert.name.clone();
            model.certificates.entry(cert_name.clone()).or_insert(cert);
            Some(SslConfig {
                certificate_name: cert_name,
                verify_peer_certificate: false,
                cipher_suite_name: None,
            })
        } else {
            None
        };

        let hostname = if host.is_empty() {
            None
        } else {
            let hostname_name = naming::hostname_name(&host);
            model
                .hostname_details
                .entry(hostname_name.clone())
                .or_insert_with(|| HostnameDetail {
                    name: hostname_name.clone(),
                    hostname: host.clone(),
                });
            model.hostname_details.get(&hostname_name).cloned()
        };

        let (listener_name, mut listener) = listener_for_host(&host, hostname.as_ref(), ssl_config, idle_timeout);
        let routing_policy_name = naming::routing_policy_name(&host);
        listener.routing_policy_name = Some(routing_policy_name.clone());

        let policy = model
            .routing_policies
            .entry(routing_policy_name.clone())
            .or_insert_with(|| RoutingPolicy::new(routing_policy_name.clone()));
        for r in routing_rules {
            policy.add_rule(r);
        }

        model.listeners.insert(listener_name, listener);
    }

    if let Some(default_backend) = &ingress.default_backend {
        let backend_set_name = resolve_backend(default_backend, &mut model)?;
        model.listeners.insert(
            DEFAULT_BACKEND_LISTENER_NAME.to_string(),
            Listener {
                default_backend_set_name: backend_set_name.clone(),
                protocol: ListenerProtocol::Http,
                port: 80,
                hostname_names: Vec::new(),
                ssl_config: None,
                routing_policy_name: None,
                rule_set_names: Vec::new(),
                connection_idle_timeout: idle_timeout,
            },
        );
        for policy in model.routing_policies.values_mut() {
            policy.append_default_backend_rule(&backend_set_name);
        }
    } else {
        model.listeners.insert(
            SANS_VIRTUAL_HOST_LISTENER_NAME.to_string(),
            Listener {
                default_backend_set_name: DUMMY_BACKEND_SET_NAME.to_string(),
                protocol: ListenerProtocol::Http,
                port: 80,
                hostname_names: Vec::new(),
                ssl_config: None,
                routing_policy_name: None,
                rule_set_names: Vec::new(),
                connection_idle_timeout: idle_timeout,
            },
        );
    }

    let force_redirect = match get_bool(&ingress.annotations, FORCE_HTTPS_REDIRECT) {
        Some(v) => v,
        None => defaults.force_https_redirection_by_default,
    };
    if !hosts_with_tls.is_empty() && force_redirect {
        let rule_set = RuleSet {
            name: HTTPS_REDIRECT_RULE_SET_NAME.to_string(),
            items: vec![RuleSetItem::https_redirect()],
        };
        model.rule_sets.insert(HTTPS_REDIRECT_RULE_SET_NAME.to_string(), rule_set);
        let hostname_names: Vec<String> = hosts_with_tls.keys().map(|h| naming::hostname_name(h)).collect();
        model.listeners.insert(
            HTTPS_REDIRECT_LISTENER_NAME.to_string(),
            Listener {
                default_backend_set_name: DUMMY_BACKEND_SET_NAME.to_string(),
                protocol: ListenerProtocol::Http,
                port: 80,
                hostname_names,
                ssl_config: None,
                routing_policy_name: None,
                rule_set_names: vec![HTTPS_REDIRECT_RULE_SET_NAME.to_string()],
                connection_idle_timeout: idle_timeout,
            },
        );
    }

    model
        .validate_invariants()
        .map_err(|msg| Error::invariant(Box::leak(msg.into_boxed_str())))?;

    Ok(BuildOutput {
        model,
        services: services_used,
        service_nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ServicePort, ServiceProtocol};

    fn basic_service() -> Service {
        Service {
            name: "web".into(),
            namespace: "default".into(),
            ports: vec![ServicePort {
                name: "http".into(),
                protocol: ServiceProtocol::Tcp,
                port: 80,
                node_port: Some(31000),
            }],
            health_check_node_port: None,
            health_check_path: None,
        }
    }

    fn basic_inputs<'a>(
        ingress: &'a Ingress,
        services: &'a BTreeMap<String, Service>,
        nodes: &'a [Node],
        secrets: &'a BTreeMap<String, Secret>,
        defaults: &'a Defaults,
    ) -> BuilderInputs<'a> {
        BuilderInputs {
            ingress,
            services,
            nodes,
            secrets,
            resolved_subnet_ids: vec!["subnet-a".into()],
            defaults,
        }
    }

    fn simple_ingress() -> Ingress {
        Ingress {
            name: "app".into(),
            namespace: "default".into(),
            ingress_class_name: Some("oci".into()),
            annotations: BTreeMap::new(),
            tls: Vec::new(),
            rules: vec![IngressRule {
                host: "example.com".into(),
                paths: vec![IngressPathRule {
                    path: "/".into(),
                    path_type: MatchPathType::Prefix,
                    backend: IngressBackendRef {
                        service_name: "web".into(),
                        port_number: 80,
                        port_name: String::new(),
                    },
                }],
            }],
            default_backend: None,
        }
    }

    #[test]
    fn builds_a_minimal_http_model() {
        let ingress = simple_ingress();
        let services = BTreeMap::from([("web".to_string(), basic_service())]);
        let nodes = vec![Node { name: "n1".into(), internal_ip: "10.0.0.1".into() }];
        let secrets = BTreeMap::new();
        let defaults = Defaults::default();
        let inputs = basic_inputs(&ingress, &services, &nodes, &secrets, &defaults);

        let out = build_model(&inputs).unwrap();
        assert!(out.model.listeners.contains_key(&naming::listener_name("example.com")));
        assert!(out.model.backend_sets.len() >= 2);
        out.model.validate_invariants().unwrap();
    }

    #[test]
    fn build_is_deterministic_for_identical_inputs() {
        let ingress = simple_ingress();
        let services = BTreeMap::from([("web".to_string(), basic_service())]);
        let nodes = vec![Node { name: "n1".into(), internal_ip: "10.0.0.1".into() }];
        let secrets = BTreeMap::new();
        let defaults = Defaults::default();

        let inputs_a = basic_inputs(&ingress, &services, &nodes, &secrets, &defaults);
        let a = build_model(&inputs_a).unwrap().model;
        let inputs_b = basic_inputs(&ingress, &services, &nodes, &secrets, &defaults);
        let b = build_model(&inputs_b).unwrap().model;
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_ingress_with_no_rules_and_no_default_backend() {
        let mut ingress = simple_ingress();
        ingress.rules.clear();
        let services = BTreeMap::new();
        let nodes = Vec::new();
        let secrets = BTreeMap::new();
        let defaults = Defaults::default();
        let inputs = basic_inputs(&ingress, &services, &nodes, &secrets, &defaults);
        assert!(build_model(&inputs).is_err());
    }

    #[test]
    fn rejects_mismatched_ingress_class() {
        let mut ingress = simple_ingress();
        ingress.ingress_class_name = Some("nginx".into());
        let services = BTreeMap::from([("web".to_string(), basic_service())]);
        let nodes = Vec::new();
        let secrets = BTreeMap::new();
        let defaults = Defaults::default();
        let inputs = basic_inputs(&ingress, &services, &nodes, &secrets, &defaults);
        assert!(build_model(&inputs).is_err());
    }

    #[test]
    fn default_backend_rule_is_appended_to_every_policy() {
        let mut ingress = simple_ingress();
        ingress.default_backend = Some(IngressBackendRef {
            service_name: "web".into(),
            port_number: 80,
            port_name: String::new(),
        });
        let services = BTreeMap::from([("web".to_string(), basic_service())]);
        let nodes = vec![Node { name: "n1".into(), internal_ip: "10.0.0.1".into() }];
        let secrets = BTreeMap::new();
        let defaults = Defaults::default();
        let inputs = basic_inputs(&ingress, &services, &nodes, &secrets, &defaults);
        let out = build_model(&inputs).unwrap();
        assert!(out.model.listeners.contains_key(DEFAULT_BACKEND_LISTENER_NAME));
        for policy in out.model.routing_policies.values() {
            assert_eq!(policy.rules.last().unwrap().name, DEFAULT_BACKEND_ROUTE_NAME);
        }
    }

    #[test]
    fn sans_virtual_host_listener_used_without_default_backend() {
        let ingress = simple_ingress();
        let services = BTreeMap::from([("web".to_string(), basic_service())]);
        let nodes = vec![Node { name: "n1".into(), internal_ip: "10.0.0.1".into() }];
        let secrets = BTreeMap::new();
        let defaults = Defaults::default();
        let inputs = basic_inputs(&ingress, &services, &nodes, &secrets, &defaults);
        let out = build_model(&inputs).unwrap();
        assert!(out.model.listeners.contains_key(SANS_VIRTUAL_HOST_LISTENER_NAME));
    }

    #[test]
    fn reserved_ip_rejected_when_internal() {
        let mut ingress = simple_ingress();
        ingress
            .annotations
            .insert(format!("{INGRESS_ANNOTATION_PREFIX}{LOAD_BALANCER_INTERNAL}"), "true".into());
        ingress
            .annotations
            .insert(format!("{INGRESS_ANNOTATION_PREFIX}{LOAD_BALANCER_RESERVED_IP}"), "10.0.0.5".into());
        let services = BTreeMap::from([("web".to_string(), basic_service())]);
        let nodes = vec![Node { name: "n1".into(), internal_ip: "10.0.0.1".into() }];
        let secrets = BTreeMap::new();
        let defaults = Defaults::default();
        let inputs = basic_inputs(&ingress, &services, &nodes, &secrets, &defaults);
        assert!(build_model(&inputs).is_err());
    }

    #[test]
    fn missing_service_is_not_found() {
        let ingress = simple_ingress();
        let services = BTreeMap::new();
        let nodes = Vec::new();
        let secrets = BTreeMap::new();
        let defaults = Defaults::default();
        let inputs = basic_inputs(&ingress, &services, &nodes, &secrets, &defaults);
        assert!(matches!(build_model(&inputs), Err(Error::NotFound(_))));
    }

    #[test]
    fn connection_idle_timeout_annotation_is_applied_to_every_listener() {
        let mut ingress = simple_ingress();
        ingress.annotations.insert(
            format!("{INGRESS_ANNOTATION_PREFIX}{LOAD_BALANCER_CONNECTION_IDLE_TIMEOUT}"),
            "1200".into(),
        );
        let services = BTreeMap::from([("web".to_string(), basic_service())]);
        let nodes = vec![Node { name: "n1".into(), internal_ip: "10.0.0.1".into() }];
        let secrets = BTreeMap::new();
        let defaults = Defaults::default();
        let inputs = basic_inputs(&ingress, &services, &nodes, &secrets, &defaults);
        let out = build_model(&inputs).unwrap();
        for listener in out.model.listeners.values() {
            assert_eq!(listener.connection_idle_timeout, Some(1200));
        }
    }

    #[test]
    fn backend_protocol_annotation_defaults_to_http() {
        let ingress = simple_ingress();
        let services = BTreeMap::from([("web".to_string(), basic_service())]);
        let nodes = vec![Node { name: "n1".into(), internal_ip: "10.0.0.1".into() }];
        let secrets = BTreeMap::new();
        let defaults = Defaults::default();
        let inputs = basic_inputs(&ingress, &services, &nodes, &secrets, &defaults);
        let out = build_model(&inputs).unwrap();
        let backend_set_name = naming::backend_set_name("web", "TCP", 31000);
        assert_eq!(
            out.model.backend_sets[&backend_set_name].health_checker.protocol,
            BackendSetProtocol::Http
        );
    }

    #[test]
    fn backend_protocol_annotation_honors_tcp() {
        let mut ingress = simple_ingress();
        ingress
            .annotations
            .insert(format!("{INGRESS_ANNOTATION_PREFIX}{LOAD_BALANCER_BACKEND_PROTOCOL}"), "TCP".into());
        let services = BTreeMap::from([("web".to_string(), basic_service())]);
        let nodes = vec![Node { name: "n1".into(), internal_ip: "10.0.0.1".into() }];
        let secrets = BTreeMap::new();
        let defaults = Defaults::default();
        let inputs = basic_inputs(&ingress, &services, &nodes, &secrets, &defaults);
        let out = build_model(&inputs).unwrap();
        let backend_set_name = naming::backend_set_name("web", "TCP", 31000);
        let health_checker = &out.model.backend_sets[&backend_set_name].health_checker;
        assert_eq!(health_checker.protocol, BackendSetProtocol::Tcp);
        assert_eq!(health_checker.url_path, None);
    }

    #[test]
    fn backend_protocol_annotation_rejects_unknown_values() {
        let mut ingress = simple_ingress();
        ingress
            .annotations
            .insert(format!("{INGRESS_ANNOTATION_PREFIX}{LOAD_BALANCER_BACKEND_PROTOCOL}"), "UDP".into());
        let services = BTreeMap::from([("web".to_string(), basic_service())]);
        let nodes = vec![Node { name: "n1".into(), internal_ip: "10.0.0.1".into() }];
        let secrets = BTreeMap::new();
        let defaults = Defaults::default();
        let inputs = basic_inputs(&ingress, &services, &nodes, &secrets, &defaults);
        assert!(matches!(build_model(&inputs), Err(Error::InvalidInput(_))));
    }
}
