//! Ingress annotation keys and typed accessors. Grounded on
//! `original_source/pkg/cloudprovider/providers/oci/annotations.go`.

use std::collections::BTreeMap;

pub const INGRESS_ANNOTATION_PREFIX: &str = "ingress.beta.kubernetes.io/";

pub const LOAD_BALANCER_INTERNAL: &str = "oci-load-balancer-internal";
pub const LOAD_BALANCER_SHAPE: &str = "oci-load-balancer-shape";
pub const LOAD_BALANCER_SHAPE_FLEX_MIN: &str = "oci-load-balancer-shape-flex-min";
pub const LOAD_BALANCER_SHAPE_FLEX_MAX: &str = "oci-load-balancer-shape-flex-max";
pub const LOAD_BALANCER_SUBNET_1: &str = "oci-load-balancer-subnet1";
pub const LOAD_BALANCER_SUBNET_2: &str = "oci-load-balancer-subnet2";
pub const LOAD_BALANCER_CONNECTION_IDLE_TIMEOUT: &str = "oci-load-balancer-connection-idle-timeout";
pub const LOAD_BALANCER_HEALTH_CHECK_RETRIES: &str = "oci-load-balancer-health-check-retries";
pub const LOAD_BALANCER_HEALTH_CHECK_INTERVAL: &str = "oci-load-balancer-health-check-interval";
pub const LOAD_BALANCER_HEALTH_CHECK_TIMEOUT: &str = "oci-load-balancer-health-check-timeout";
pub const LOAD_BALANCER_NETWORK_SECURITY_GROUPS: &str = "oci-network-security-groups";
pub const LOAD_BALANCER_POLICY: &str = "oci-load-balancer-policy";
pub const LOAD_BALANCER_BACKEND_PROTOCOL: &str = "oci-load-balancer-backend-protocol";
pub const LOAD_BALANCER_RESERVED_IP: &str = "oci-load-balancer-reserved-ip";
pub const FORCE_HTTPS_REDIRECT: &str = "force-https-redirect";

/// Looks up `ingress.beta.kubernetes.io/<name>` in an object's annotation
/// map.
pub fn get(annotations: &BTreeMap<String, String>, name: &str) -> Option<String> {
    annotations
        .get(&format!("{INGRESS_ANNOTATION_PREFIX}{name}"))
        .cloned()
}

pub fn get_lowercase(annotations: &BTreeMap<String, String>, name: &str) -> Option<String> {
    get(annotations, name).map(|v| v.to_lowercase())
}

pub fn get_bool(annotations: &BTreeMap<String, String>, name: &str) -> Option<bool> {
    get_lowercase(annotations, name).and_then(|v| v.parse().ok())
}

pub fn get_u32(annotations: &BTreeMap<String, String>, name: &str) -> Option<u32> {
    get(annotations, name).and_then(|v| v.parse().ok())
}

pub fn get_i64(annotations: &BTreeMap<String, String>, name: &str) -> Option<i64> {
    get(annotations, name).and_then(|v| v.parse().ok())
}

pub fn get_csv(annotations: &BTreeMap<String, String>, name: &str) -> Vec<String> {
    get(annotations, name)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
