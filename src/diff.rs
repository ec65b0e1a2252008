//! Generic set-difference over keyed sub-resource maps, with per-kind
//! equality predicates. Grounded on `original_source/src/utils/utils.go`
//! (`MapCompare`) and the per-kind update rules spelled out across
//! `original_source/src/manager/manager.go`.

use std::collections::BTreeMap;

use crate::model::{Certificate, HostnameDetail, RoutingPolicy, RuleSet};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diff<K> {
    pub to_create: Vec<K>,
    pub to_remove: Vec<K>,
    pub to_update: Vec<K>,
}

impl<K> Default for Diff<K> {
    fn default() -> Diff<K> {
        Diff {
            to_create: Vec::new(),
            to_remove: Vec::new(),
            to_update: Vec::new(),
        }
    }
}

/// `toCreate = desired \ live`, `toRemove = live \ desired`, `toUpdate =
/// { k in both : !same(desired[k], live[k]) }`.
pub fn diff_maps<K, V>(
    desired: &BTreeMap<K, V>,
    live: &BTreeMap<K, V>,
    same: impl Fn(&V, &V) -> bool,
) -> Diff<K>
where
    K: Ord + Clone,
{
    let mut out = Diff::default();
    for key in desired.keys() {
        if !live.contains_key(key) {
            out.to_create.push(key.clone());
        }
    }
    for key in live.keys() {
        if !desired.contains_key(key) {
            out.to_remove.push(key.clone());
        }
    }
    for (key, desired_value) in desired {
        if let Some(live_value) = live.get(key) {
            if !same(desired_value, live_value) {
                out.to_update.push(key.clone());
            }
        }
    }
    out
}

/// RoutingPolicy: deep-equal on rules *and* condition language version.
pub fn routing_policy_same(a: &RoutingPolicy, b: &RoutingPolicy) -> bool {
    a.condition_language_version == b.condition_language_version && a.rules == b.rules
}

/// RuleSet: equal on items only.
pub fn rule_set_same(a: &RuleSet, b: &RuleSet) -> bool {
    a.items == b.items
}

/// Hostname: identity by name suffices; the intersection is always
/// "unchanged" because names are content-derived from the host.
pub fn hostname_same(_a: &HostnameDetail, _b: &HostnameDetail) -> bool {
    true
}

/// Certificate: equal on public cert and CA cert. Because names are
/// content-derived, the intersection must always be empty in practice —
/// callers should treat a non-empty mismatching intersection as an
/// `Error::Invariant`.
pub fn certificate_same(a: &Certificate, b: &Certificate) -> bool {
    a.public_certificate == b.public_certificate && a.ca_certificate == b.ca_certificate
}
