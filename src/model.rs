//! The desired-state value type produced by the spec builder (§3 of
//! SPEC_FULL.md) and consumed by the diff engine and dispatcher. Grounded
//! on `original_source/src/ingress/spec.go` and the OCI LB SDK shapes it
//! builds (`loadbalancer.LoadBalancer`, `.Listener`, `.BackendSet`, ...).

use std::collections::BTreeMap;

pub const DUMMY_BACKEND_SET_NAME: &str = "dummy";
pub const DEFAULT_BACKEND_ROUTE_NAME: &str = "default-backend-route";
pub const HTTPS_REDIRECT_RULE_SET_NAME: &str = "https_301_redirection";
pub const HTTPS_REDIRECT_LISTENER_NAME: &str = "http-to-https-redirector";
pub const DEFAULT_BACKEND_LISTENER_NAME: &str = "DefaultBackend-http";
pub const SANS_VIRTUAL_HOST_LISTENER_NAME: &str = "Sans-VirtualHost-HTTP";

pub const SHAPE_MIN_MBPS: u32 = 10;
pub const SHAPE_MAX_MBPS: u32 = 8192;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LbShape {
    Named(String),
    Flexible { min_mbps: u32, max_mbps: u32 },
}

impl LbShape {
    pub fn flexible(min_mbps: u32, max_mbps: u32) -> LbShape {
        let min_mbps = min_mbps.clamp(SHAPE_MIN_MBPS, SHAPE_MAX_MBPS);
        let max_mbps = max_mbps.clamp(SHAPE_MIN_MBPS, SHAPE_MAX_MBPS).max(min_mbps);
        LbShape::Flexible { min_mbps, max_mbps }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerProtocol {
    Http,
    Http2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LbPolicy {
    RoundRobin,
    LeastConnections,
    IpHash,
}

impl LbPolicy {
    pub fn from_annotation(value: &str) -> LbPolicy {
        match value {
            "LEAST_CONNECTIONS" => LbPolicy::LeastConnections,
            "IP_HASH" => LbPolicy::IpHash,
            _ => LbPolicy::RoundRobin,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SslConfig {
    pub certificate_name: String,
    pub verify_peer_certificate: bool,
    pub cipher_suite_name: Option<String>,
}

/// Vendor default HTTP2 cipher suite, applied when an HTTP2 listener's
/// `sslConfig` doesn't name one (HTTP2 listeners support only this one).
pub const HTTP2_DEFAULT_CIPHER_SUITE: &str = "oci-default-http2-ssl-cipher-suite-v1";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listener {
    pub default_backend_set_name: String,
    pub protocol: ListenerProtocol,
    pub port: u16,
    pub hostname_names: Vec<String>,
    pub ssl_config: Option<SslConfig>,
    pub routing_policy_name: Option<String>,
    pub rule_set_names: Vec<String>,
    /// `oci-load-balancer-connection-idle-timeout`, milliseconds. `None`
    /// leaves the OCI default in place.
    pub connection_idle_timeout: Option<i64>,
}

impl Listener {
    /// Enforces the HTTP2 ⇒ sslConfig + default cipher-suite invariant.
    pub fn normalized(mut self) -> Listener {
        if self.protocol == ListenerProtocol::Http2 {
            let ssl = self
                .ssl_config
                .get_or_insert_with(|| SslConfig {
                    certificate_name: String::new(),
                    verify_peer_certificate: false,
                    cipher_suite_name: None,
                });
            if ssl.cipher_suite_name.is_none() {
                ssl.cipher_suite_name = Some(HTTP2_DEFAULT_CIPHER_SUITE.to_string());
            }
        }
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendSetProtocol {
    Http,
    Tcp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Backend {
    pub ip: String,
    pub port: u16,
    pub weight: u32,
}

impl Backend {
    pub fn new(ip: impl Into<String>, port: u16) -> Backend {
        Backend {
            ip: ip.into(),
            port,
            weight: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthChecker {
    pub protocol: BackendSetProtocol,
    pub port: u16,
    pub url_path: Option<String>,
    pub retries: u32,
    pub interval_ms: u32,
    pub timeout_ms: u32,
}

impl HealthChecker {
    pub const DEFAULT_RETRIES: u32 = 3;
    pub const DEFAULT_INTERVAL_MS: u32 = 10_000;
    pub const DEFAULT_TIMEOUT_MS: u32 = 3_000;

    /// The always-failing health check bound to the `dummy` backend set.
    pub fn noop() -> HealthChecker {
        HealthChecker {
            protocol: BackendSetProtocol::Http,
            port: 0,
            url_path: None,
            retries: Self::DEFAULT_RETRIES,
            interval_ms: Self::DEFAULT_INTERVAL_MS,
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendSet {
    pub policy: LbPolicy,
    pub backends: Vec<Backend>,
    pub health_checker: HealthChecker,
    pub ssl_config: Option<SslConfig>,
}

impl BackendSet {
    pub fn dummy() -> BackendSet {
        BackendSet {
            policy: LbPolicy::RoundRobin,
            backends: Vec::new(),
            health_checker: HealthChecker::noop(),
            ssl_config: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingRule {
    pub name: String,
    pub condition: String,
    pub backend_set_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingPolicy {
    pub name: String,
    pub condition_language_version: String,
    pub rules: Vec<RoutingRule>,
}

impl RoutingPolicy {
    pub fn new(name: impl Into<String>) -> RoutingPolicy {
        RoutingPolicy {
            name: name.into(),
            condition_language_version: "V1".to_string(),
            rules: Vec::new(),
        }
    }

    /// Appends a rule, skipping (and warning on) a duplicate name.
    pub fn add_rule(&mut self, rule: RoutingRule) {
        if self.rules.iter().any(|r| r.name == rule.name) {
            tracing::warn!(policy = %self.name, rule = %rule.name, "duplicate routing rule name, keeping first");
            return;
        }
        self.rules.push(rule);
    }

    /// Appends the default-backend catch-all, which must sort last so
    /// host/path rules are evaluated first.
    pub fn append_default_backend_rule(&mut self, backend_set_name: &str) {
        self.rules.retain(|r| r.name != DEFAULT_BACKEND_ROUTE_NAME);
        self.rules.push(RoutingRule {
            name: DEFAULT_BACKEND_ROUTE_NAME.to_string(),
            condition: "all(http.request.url.path sw '/')".to_string(),
            backend_set_name: backend_set_name.to_string(),
        });
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleSetItem {
    Redirect {
        response_code: u16,
        target_protocol: String,
        target_host: String,
        target_port: u16,
        target_path: String,
        target_query: String,
    },
}

impl RuleSetItem {
    /// The single redirect rule used by the HTTPS-redirect rule set. The
    /// `/` and `?` prefixes on path/query are literal: the LB substitutes
    /// `{path}`/`{query}` without them.
    pub fn https_redirect() -> RuleSetItem {
        RuleSetItem::Redirect {
            response_code: 301,
            target_protocol: "https".to_string(),
            target_host: "{host}".to_string(),
            target_port: 443,
            target_path: "/{path}".to_string(),
            target_query: "?{query}".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleSet {
    pub name: String,
    pub items: Vec<RuleSetItem>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostnameDetail {
    pub name: String,
    pub hostname: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    pub name: String,
    pub public_certificate: String,
    pub private_key: String,
    pub ca_certificate: Option<String>,
    pub passphrase: Option<String>,
}

/// Coarse lifecycle state of a live load balancer, as reported by the LB
/// service. Desired-state models built by the spec builder are never in
/// any state but `Active` since they don't represent a live resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LbLifecycleState {
    Creating,
    Active,
    Updating,
    Failed,
    Deleting,
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LbModel {
    /// The provider-assigned OCID once created; `None` for a freshly
    /// built desired-state model that hasn't been reconciled yet.
    pub id: Option<String>,
    pub lifecycle_state: LbLifecycleState,
    pub name: String,
    pub shape: LbShape,
    pub internal: bool,
    pub subnet_ids: Vec<String>,
    pub load_balancer_ip: Option<String>,
    pub network_security_group_ids: Vec<String>,
    pub listeners: BTreeMap<String, Listener>,
    pub backend_sets: BTreeMap<String, BackendSet>,
    pub routing_policies: BTreeMap<String, RoutingPolicy>,
    pub rule_sets: BTreeMap<String, RuleSet>,
    pub hostname_details: BTreeMap<String, HostnameDetail>,
    pub certificates: BTreeMap<String, Certificate>,
    pub freeform_tags: BTreeMap<String, String>,
}

impl LbModel {
    pub fn new(name: impl Into<String>, shape: LbShape, subnet_ids: Vec<String>) -> LbModel {
        let mut m = LbModel {
            id: None,
            lifecycle_state: LbLifecycleState::Active,
            name: name.into(),
            shape,
            internal: false,
            subnet_ids,
            load_balancer_ip: None,
            network_security_group_ids: Vec::new(),
            listeners: BTreeMap::new(),
            backend_sets: BTreeMap::new(),
            routing_policies: BTreeMap::new(),
            rule_sets: BTreeMap::new(),
            hostname_details: BTreeMap::new(),
            certificates: BTreeMap::new(),
            freeform_tags: BTreeMap::new(),
        };
        m.backend_sets
            .insert(DUMMY_BACKEND_SET_NAME.to_string(), BackendSet::dummy());
        m
    }

    /// Validates the referential invariants in SPEC_FULL.md §3. Panics
    /// (`Error::Invariant`-worthy condition) rather than returning — these
    /// can only fail if the spec builder itself has a bug.
    pub fn validate_invariants(&self) -> Result<(), String> {
        for (lname, listener) in &self.listeners {
            if !self.backend_sets.contains_key(&listener.default_backend_set_name) {
                return Err(format!(
                    "listener {lname} references missing backend set {}",
                    listener.default_backend_set_name
                ));
            }
            if let Some(policy) = &listener.routing_policy_name {
                if !self.routing_policies.contains_key(policy) {
                    return Err(format!("listener {lname} references missing routing policy {policy}"));
                }
            }
            for hostname in &listener.hostname_names {
                if !self.hostname_details.contains_key(hostname) {
                    return Err(format!("listener {lname} references missing hostname {hostname}"));
                }
            }
            for rule_set in &listener.rule_set_names {
                if !self.rule_sets.contains_key(rule_set) {
                    return Err(format!("listener {lname} references missing rule set {rule_set}"));
                }
            }
            if let Some(ssl) = &listener.ssl_config {
                if !ssl.certificate_name.is_empty() && !self.certificates.contains_key(&ssl.certificate_name) {
                    return Err(format!(
                        "listener {lname} references missing certificate {}",
                        ssl.certificate_name
                    ));
                }
            }
        }
        for (pname, policy) in &self.routing_policies {
            for rule in &policy.rules {
                if !self.backend_sets.contains_key(&rule.backend_set_name) {
                    return Err(format!(
                        "routing policy {pname} rule {} references missing backend set {}",
                        rule.name, rule.backend_set_name
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_model_always_has_dummy_backend_set() {
        let m = LbModel::new("lb", LbShape::Named("flexible".into()), vec!["subnet1".into()]);
        assert!(m.backend_sets.contains_key(DUMMY_BACKEND_SET_NAME));
    }

    #[test]
    fn flexible_shape_clamps_into_bounds() {
        let shape = LbShape::flexible(1, 100_000);
        assert_eq!(shape, LbShape::Flexible { min_mbps: SHAPE_MIN_MBPS, max_mbps: SHAPE_MAX_MBPS });
    }

    #[test]
    fn flexible_shape_enforces_max_ge_min() {
        let shape = LbShape::flexible(500, 100);
        assert_eq!(shape, LbShape::Flexible { min_mbps: 500, max_mbps: 500 });
    }

    #[test]
    fn http2_listener_gets_default_cipher_suite() {
        let listener = Listener {
            default_backend_set_name: "bs".into(),
            protocol: ListenerProtocol::Http2,
            port: 443,
            hostname_names: vec![],
            ssl_config: None,
            routing_policy_name: None,
            rule_set_names: vec![],
            connection_idle_timeout: None,
        }
        .normalized();
        let ssl = listener.ssl_config.unwrap();
        assert_eq!(ssl.cipher_suite_name.as_deref(), Some(HTTP2_DEFAULT_CIPHER_SUITE));
    }

    #[test]
    fn validate_invariants_catches_dangling_backend_set_reference() {
        let mut m = LbModel::new("lb", LbShape::Named("100Mbps".into()), vec!["s1".into()]);
        m.listeners.insert(
            "l1".into(),
            Listener {
                default_backend_set_name: "missing".into(),
                protocol: ListenerProtocol::Http,
                port: 80,
                hostname_names: vec![],
                ssl_config: None,
                routing_policy_name: None,
                rule_set_names: vec![],
                connection_idle_timeout: None,
            },
        );
        assert!(m.validate_invariants().is_err());
    }

    #[test]
    fn append_default_backend_rule_is_idempotent_and_last() {
        let mut policy = RoutingPolicy::new("p1");
        policy.add_rule(RoutingRule {
            name: "r1".into(),
            condition: "http.request.url.path eq '/x'".into(),
            backend_set_name: "bs1".into(),
        });
        policy.append_default_backend_rule("dummy");
        policy.append_default_backend_rule("dummy");
        assert_eq!(policy.rules.len(), 2);
        assert_eq!(policy.rules.last().unwrap().name, DEFAULT_BACKEND_ROUTE_NAME);
    }

    #[test]
    fn duplicate_rule_name_keeps_first() {
        let mut policy = RoutingPolicy::new("p1");
        policy.add_rule(RoutingRule {
            name: "r1".into(),
            condition: "a".into(),
            backend_set_name: "bs1".into(),
        });
        policy.add_rule(RoutingRule {
            name: "r1".into(),
            condition: "b".into(),
            backend_set_name: "bs2".into(),
        });
        assert_eq!(policy.rules.len(), 1);
        assert_eq!(policy.rules[0].condition, "a");
    }
}
