//! Compiles Kubernetes `Ingress` host/path match semantics into the LB's
//! routing-rule predicate language. Grounded on
//! `original_source/src/ingress/routing_rule.go`.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Mirrors `networking.v1.HTTPIngressPath.pathType`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathType {
    Exact,
    Prefix,
    ImplementationSpecific,
}

/// One path rule within an `Ingress` host block, reduced to what the
/// compiler needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressPath {
    pub path: String,
    pub path_type: PathType,
    pub backend_set_name: String,
}

/// A compiled routing rule ready to hand to the LB API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingRule {
    pub name: String,
    pub condition: String,
    pub backend_set_name: String,
}

const DEFAULT_BACKEND_ROUTE_NAME: &str = "default-backend-route";

/// The catch-all rule forwarding unmatched `/` traffic to a backend set.
pub fn default_backend_routing_rule(backend_set_name: &str) -> RoutingRule {
    RoutingRule {
        name: DEFAULT_BACKEND_ROUTE_NAME.to_string(),
        condition: "all(http.request.url.path sw '/')".to_string(),
        backend_set_name: backend_set_name.to_string(),
    }
}

/// Compiles a single ingress path (plus its enclosing host, if any) into
/// a routing rule. The rule name is a digest of `(path, path_type,
/// backend_set_name)`, capped at 22 chars to leave headroom under the LB's
/// 32-char, `^[a-zA-Z_][a-zA-Z_0-9]*$` name limit.
pub fn compile_routing_rule(ingress_path: &IngressPath, host: &str) -> Result<RoutingRule> {
    let hash_input = format!(
        "{}\u{1}{:?}\u{1}{}",
        ingress_path.path, ingress_path.path_type, ingress_path.backend_set_name
    );
    let mut rule_name = crate::naming::byte_alphanumeric_digest(hash_input.as_bytes(), 22);
    if rule_name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        rule_name = format!("r{rule_name}");
        rule_name.truncate(22);
    }

    let mut conditions = Vec::new();
    if !host.is_empty() {
        if let Some(hostname_condition) = hostname_condition(host) {
            conditions.push(hostname_condition);
        }
    }

    match ingress_path.path_type {
        PathType::Exact => {
            conditions.push(format!("http.request.url.path eq '{}'", ingress_path.path));
        }
        PathType::Prefix => {
            conditions.push(format!("http.request.url.path sw '{}'", ingress_path.path));
        }
        PathType::ImplementationSpecific => {
            let custom = process_implementation_specific_path(&ingress_path.path)?;
            if combinator_re().is_match(&custom) {
                if let Some(inner) = all_wrapper_re()
                    .captures(&custom)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str())
                {
                    conditions.extend(inner.split(',').map(|s| s.to_string()));
                } else {
                    conditions = vec![custom];
                }
            } else {
                conditions.push(custom);
            }
        }
    }

    // Single-condition case is emitted unwrapped, not re-wrapped in an
    // outer `all(...)`. For a single-condition `ImplementationSpecific`
    // path with no host (e.g. `*example*`), this reproduces
    // `original_source/src/ingress/routing_rule.go`'s collapse to
    // `conditions[0]` rather than spec.md §8 scenario 4's literal
    // `all(http.request.url.path cw 'example')` — deliberately kept
    // faithful to the original over the listed scenario; see DESIGN.md's
    // Open Question resolutions.
    let condition = if conditions.len() == 1 {
        conditions.into_iter().next().unwrap()
    } else {
        format!("all({})", conditions.join(","))
    };

    Ok(RoutingRule {
        name: rule_name,
        condition,
        backend_set_name: ingress_path.backend_set_name.clone(),
    })
}

fn combinator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(not )?(any|all)\(").unwrap())
}

fn all_wrapper_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^all\((.*)\)$").unwrap())
}

/// Kubernetes Ingress host matching: wildcard hosts (`*.example.com`) are
/// handled by the listener's hostname scope, not a per-rule header match —
/// the LB rule language has no `ew` matcher over header map values.
fn hostname_condition(host: &str) -> Option<String> {
    if host.starts_with("*.") {
        return None;
    }
    Some(format!("http.request.headers[(i 'Host')] eq (i '{host}')"))
}

fn middle_wildcard_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^*]+\*[^*]+$").unwrap())
}

fn leading_wildcard_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\*[^*]+$").unwrap())
}

fn trailing_wildcard_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^*]+\*$").unwrap())
}

fn bracketing_wildcard_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\*+[^*]+\*+$").unwrap())
}

/// Lowers `PathType::ImplementationSpecific` path values into a predicate.
/// A `condition:` prefix passes its remainder through verbatim so operators
/// can hand-author arbitrary LB predicates. Otherwise the value must parse
/// as a bare URL path (no scheme/host/query/fragment) with at most the
/// glob shapes the LB's `sw`/`ew`/`cw`/`eq` matchers can express.
fn process_implementation_specific_path(path_value: &str) -> Result<String> {
    if path_value.is_empty() {
        return Err(Error::InvalidInput(format!("invalid path {path_value:?}")));
    }
    const CONDITION_PREFIX: &str = "condition:";
    if let Some(rest) = path_value.strip_prefix(CONDITION_PREFIX) {
        let rest = rest.trim();
        if !rest.is_empty() {
            return Ok(rest.to_string());
        }
    }

    // `Url::parse` only accepts absolute references; success here means the
    // caller embedded a scheme/host rather than a bare path, which the LB
    // rule language has no way to express as a match condition.
    if Url::parse(path_value).is_ok() {
        return Err(Error::InvalidInput(format!("invalid path {path_value:?}")));
    }
    let base = Url::parse("http://placeholder.invalid").unwrap();
    let parsed = base
        .join(path_value)
        .map_err(|e| Error::InvalidInput(format!("invalid path {path_value:?}: {e}")))?;
    if !parsed.query().unwrap_or("").is_empty() || parsed.fragment().is_some_and(|f| !f.is_empty())
    {
        return Err(Error::InvalidInput(format!("invalid path {path_value:?}")));
    }
    let path = path_value.split(['?', '#']).next().unwrap_or(path_value);

    if !path.contains('*') {
        return Ok(format!("all(http.request.url.path eq '{path}')"));
    }
    if middle_wildcard_re().is_match(path) {
        let mut parts = path.splitn(2, '*');
        let prefix = parts.next().unwrap();
        let suffix = parts.next().unwrap();
        return Ok(format!(
            "all(http.request.url.path sw '{prefix}', http.request.url.path ew '{suffix}')"
        ));
    }
    if leading_wildcard_re().is_match(path) {
        return Ok(format!("all(http.request.url.path ew '{}')", &path[1..]));
    }
    if trailing_wildcard_re().is_match(path) {
        return Ok(format!(
            "all(http.request.url.path sw '{}')",
            &path[..path.len() - 1]
        ));
    }
    if bracketing_wildcard_re().is_match(path) {
        return Ok(format!(
            "all(http.request.url.path cw '{}')",
            &path[1..path.len() - 1]
        ));
    }
    Err(Error::InvalidInput(format!("invalid path {path_value:?}")))
}
