//! Deterministic, length-bounded identifiers for LB sub-resources and a
//! stable content digest. Grounded on `original_source/src/utils/utils.go`
//! (`ByteAlphaNumericDigest`, `SafeSlice`) and
//! `original_source/src/ingress/helpers.go` /
//! `original_source/pkg/cloudprovider/providers/oci/modified__.go`.

use base64::Engine as _;
use md5::{Digest, Md5};
use regex::Regex;
use std::sync::OnceLock;

/// Bounds-clamped substring. Never panics on out-of-range indices.
pub fn safe_slice(s: &str, start: usize, end: usize) -> String {
    let len = s.chars().count();
    if start >= len || end < start {
        return String::new();
    }
    let end = end.min(len);
    s.chars().skip(start).take(end - start).collect()
}

/// Digest of exactly `length` characters drawn from `[A-Za-z0-9]`.
///
/// Computed as MD5 -> base64 -> strip `=` -> replace `/`->`a`, `+`->`b`;
/// if the leading char is a digit, rotate it to the back by adding
/// `('a'+'9'-d)`; if shorter than requested, extend by feeding the
/// current digest back into the same function.
pub fn byte_alphanumeric_digest(bytes: &[u8], length: usize) -> String {
    fn one_round(bytes: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(bytes);
        let hash = hasher.finalize();
        let encoded = base64::engine::general_purpose::STANDARD.encode(hash);
        let encoded = encoded.trim_end_matches('=');
        encoded.replace('/', "a").replace('+', "b")
    }

    let mut digest = one_round(bytes);
    if let Some(first) = digest.chars().next() {
        if first.is_ascii_digit() {
            let rotated = (b'a' + b'9' - first as u8) as char;
            digest = format!("{}{}", &digest[first.len_utf8()..], rotated);
        }
    }
    while digest.len() < length {
        digest.push_str(&one_round(digest.as_bytes()));
    }
    safe_slice(&digest, 0, length)
}

fn listener_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,255}$").unwrap())
}

fn routing_policy_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{1,31}$").unwrap())
}

/// `any-host` if host is empty; else `lower(host)` with `*.` -> `STAR`
/// and `.` -> `DOT`; truncated + digest-suffixed past 240 chars.
pub fn listener_name(host: &str) -> String {
    if host.is_empty() {
        return "any-host".to_string();
    }
    let lower = host.to_lowercase();
    let mut name = lower.replace("*.", "STAR").replace('.', "DOT");
    if name.len() > 240 {
        let prefix = safe_slice(&name, 0, 240);
        let suffix = byte_alphanumeric_digest(host.as_bytes(), 15);
        name = safe_slice(&format!("{prefix}{suffix}"), 0, 255);
    }
    if !listener_name_re().is_match(&name) {
        panic!("invalid listener name derived from host {host:?}: {name:?}");
    }
    name
}

/// `lower(host)`; `*.`->`S_`; `.`->`_`; `-`->`_`; collapse `__`->`_`; a
/// leading digit is prefixed with `X_`; then
/// `safeSlice(name,0,25)+"_"+digest(host,32)` truncated to 32.
pub fn routing_policy_name(host: &str) -> String {
    let mut name = host.to_lowercase();
    name = name.replace("*.", "S_").replace('.', "_").replace('-', "_");
    name = name.replace("__", "_");
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        name = format!("X_{name}");
    }
    let digest = byte_alphanumeric_digest(host.as_bytes(), 32);
    let name = safe_slice(&format!("{}_{}", safe_slice(&name, 0, 25), digest), 0, 32);
    if !routing_policy_name_re().is_match(&name) {
        panic!("invalid routing policy name derived from host {host:?}: {name:?}");
    }
    name
}

/// `serviceName[0..K] + "_" + proto[0]+port + "_" + digest(serviceName,32)`,
/// truncated to 32.
pub fn backend_set_name(service_name: &str, proto: &str, port: u16) -> String {
    let proto_letter = proto.chars().next().unwrap_or('T');
    let port_str = format!("{proto_letter}{port}");
    let min_padding_len = 6usize;
    let max_service_name_len = 32usize
        .saturating_sub(port_str.len())
        .saturating_sub(min_padding_len)
        .saturating_sub(2);
    let digest = byte_alphanumeric_digest(service_name.as_bytes(), 32);
    let name = format!(
        "{}_{}_{}",
        safe_slice(service_name, 0, max_service_name_len),
        port_str,
        digest
    );
    safe_slice(&name, 0, 32)
}

/// `host`; if >240 chars, first 240 + 15-char digest, truncated to 255.
pub fn hostname_name(host: &str) -> String {
    if host.len() > 240 {
        let prefix = safe_slice(host, 0, 240);
        let suffix = byte_alphanumeric_digest(host.as_bytes(), 15);
        safe_slice(&format!("{prefix}{suffix}"), 0, 255)
    } else {
        host.to_string()
    }
}

/// LB display name: `<prefix>_<namespace>_<ingressName>`, truncated to
/// 1024 chars. `prefix` already has its trailing `_` normalized by the
/// caller (see `config::Defaults::load_balancer_prefix`).
pub fn lb_name(prefix: &str, namespace: &str, ingress_name: &str) -> String {
    let name = format!("{prefix}{namespace}_{ingress_name}");
    safe_slice(&name, 0, 1024)
}
