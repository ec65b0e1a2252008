//! The non-annotation half of subnet resolution for a load balancer:
//! configured default, else auto-discovery from the host instance's VCN,
//! with the caching described in §5. (The annotation-override layer on
//! top of this lives in `spec_builder::resolve_subnet_ids`.) Grounded on
//! `original_source/src/ingress/spec.go`
//! (`getLoadBalancerSubnetIds`, `tryFindLoadbalancerSubnet`).

use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::lb_client::{InstanceMetadataProvider, NetworkingClient};

const SUBNET_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct CachedSubnets {
    subnets: Vec<crate::lb_client::Subnet>,
    fetched_at: Instant,
}

/// Process-wide caches for subnet discovery: the `ListSubnets` result per
/// VCN (24h TTL) and the first-discovered LB subnet id, memoized for the
/// process lifetime once any discovery succeeds. Both are behind a
/// `RwLock` since many reconciles may race to populate them; the original's
/// equivalents are a `cache.Store` TTL cache and a package-level `var`.
#[derive(Default)]
pub struct SubnetCache {
    list_by_vcn: RwLock<std::collections::HashMap<String, CachedSubnets>>,
    discovered_lb_subnet_id: RwLock<Option<String>>,
}

impl SubnetCache {
    pub fn new() -> SubnetCache {
        SubnetCache::default()
    }

    async fn list_subnets_cached(
        &self,
        networking: &dyn NetworkingClient,
        compartment_id: &str,
        vcn_id: &str,
    ) -> Result<Vec<crate::lb_client::Subnet>> {
        if let Some(cached) = self.list_by_vcn.read().unwrap().get(vcn_id) {
            if cached.fetched_at.elapsed() < SUBNET_CACHE_TTL {
                return Ok(cached.subnets.clone());
            }
        }
        let subnets = networking.list_subnets(compartment_id, vcn_id).await?;
        self.list_by_vcn.write().unwrap().insert(
            vcn_id.to_string(),
            CachedSubnets { subnets: subnets.clone(), fetched_at: Instant::now() },
        );
        Ok(subnets)
    }

    /// Finds a public subnet in the host instance's VCN, falling back to
    /// the instance's own subnet. The first-seen result is memoized for
    /// the process lifetime regardless of which subnet iteration order
    /// produced it (§9 open question (c): discovery order is unspecified).
    pub async fn discover_lb_subnet_id(
        &self,
        metadata: &dyn InstanceMetadataProvider,
        networking: &dyn NetworkingClient,
    ) -> Result<String> {
        if let Some(id) = self.discovered_lb_subnet_id.read().unwrap().clone() {
            return Ok(id);
        }
        let meta = metadata.get().await?;
        let instance_vnic = networking
            .get_primary_vnic_for_instance(&meta.compartment_id, &meta.instance_id)
            .await?;
        let instance_subnet = networking.get_subnet(&instance_vnic.subnet_id).await?;
        let subnets = self
            .list_subnets_cached(networking, &meta.compartment_id, &instance_subnet.vcn_id)
            .await?;

        let chosen = subnets
            .iter()
            .find(|s| !s.prohibit_public_ip_on_vnic)
            .map(|s| {
                tracing::info!(vcn_id = %instance_subnet.vcn_id, subnet_id = %s.id, "found public subnet, choosing it as load balancer subnet");
                s.id.clone()
            })
            .unwrap_or_else(|| {
                tracing::warn!(vcn_id = %instance_subnet.vcn_id, subnet_id = %instance_vnic.subnet_id, "no public subnets found, choosing instance subnet as load balancer subnet");
                instance_vnic.subnet_id.clone()
            });

        *self.discovered_lb_subnet_id.write().unwrap() = Some(chosen.clone());
        Ok(chosen)
    }
}

/// Resolves the non-annotation fallback subnet ids per §4.3 step 4:
/// configured defaults beat auto-discovery. The per-ingress annotation
/// override (`oci-load-balancer-subnet1/2`) is applied on top of this
/// result by the pure spec builder (`spec_builder::resolve_subnet_ids`),
/// which never does I/O; this function is the impure half the reconciler
/// calls before invoking the builder.
pub async fn resolve_fallback_subnet_ids(
    configured_defaults: &[String],
    cache: &SubnetCache,
    metadata: &dyn InstanceMetadataProvider,
    networking: &dyn NetworkingClient,
) -> Result<Vec<String>> {
    if !configured_defaults.is_empty() {
        return Ok(configured_defaults.to_vec());
    }
    tracing::warn!("no default load balancer subnet configured, trying to discover one from the instance VCN");
    let discovered = cache.discover_lb_subnet_id(metadata, networking).await?;
    if discovered.is_empty() {
        return Err(Error::InvalidInput("could not resolve any load balancer subnet ids".to_string()));
    }
    Ok(vec![discovered])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lb_client::{InstanceMetadata, Subnet, Vnic};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeMetadata;
    #[async_trait]
    impl InstanceMetadataProvider for FakeMetadata {
        async fn get(&self) -> Result<InstanceMetadata> {
            Ok(InstanceMetadata { instance_id: "inst-1".into(), compartment_id: "compartment-1".into() })
        }
    }

    struct FakeNetworking {
        list_calls: AtomicUsize,
        public_subnet: bool,
    }

    #[async_trait]
    impl NetworkingClient for FakeNetworking {
        async fn get_primary_vnic_for_instance(&self, _c: &str, _i: &str) -> Result<Vnic> {
            Ok(Vnic { id: "vnic-1".into(), subnet_id: "subnet-instance".into() })
        }
        async fn get_subnet(&self, subnet_id: &str) -> Result<Subnet> {
            Ok(Subnet { id: subnet_id.to_string(), vcn_id: "vcn-1".into(), prohibit_public_ip_on_vnic: true })
        }
        async fn list_subnets(&self, _c: &str, _vcn: &str) -> Result<Vec<Subnet>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                Subnet { id: "subnet-private".into(), vcn_id: "vcn-1".into(), prohibit_public_ip_on_vnic: true },
                if self.public_subnet {
                    Subnet { id: "subnet-public".into(), vcn_id: "vcn-1".into(), prohibit_public_ip_on_vnic: false }
                } else {
                    Subnet { id: "subnet-private-2".into(), vcn_id: "vcn-1".into(), prohibit_public_ip_on_vnic: true }
                },
            ])
        }
        async fn get_reserved_ip_ocid_by_address(&self, _c: &str, _ip: &str) -> Result<String> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn configured_defaults_used_when_present() {
        let cache = SubnetCache::new();
        let meta = FakeMetadata;
        let net = FakeNetworking { list_calls: AtomicUsize::new(0), public_subnet: true };
        let ids = resolve_fallback_subnet_ids(&["default-subnet".into()], &cache, &meta, &net)
            .await
            .unwrap();
        assert_eq!(ids, vec!["default-subnet".to_string()]);
        assert_eq!(net.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn discovery_prefers_public_subnet() {
        let cache = SubnetCache::new();
        let meta = FakeMetadata;
        let net = FakeNetworking { list_calls: AtomicUsize::new(0), public_subnet: true };
        let ids = resolve_fallback_subnet_ids(&[], &cache, &meta, &net).await.unwrap();
        assert_eq!(ids, vec!["subnet-public".to_string()]);
    }

    #[tokio::test]
    async fn discovery_falls_back_to_instance_subnet_without_public_subnet() {
        let cache = SubnetCache::new();
        let meta = FakeMetadata;
        let net = FakeNetworking { list_calls: AtomicUsize::new(0), public_subnet: false };
        let ids = resolve_fallback_subnet_ids(&[], &cache, &meta, &net).await.unwrap();
        assert_eq!(ids, vec!["subnet-instance".to_string()]);
    }

    #[tokio::test]
    async fn discovery_is_memoized_across_calls() {
        let cache = SubnetCache::new();
        let meta = FakeMetadata;
        let net = FakeNetworking { list_calls: AtomicUsize::new(0), public_subnet: true };
        let first = resolve_fallback_subnet_ids(&[], &cache, &meta, &net).await.unwrap();
        let second = resolve_fallback_subnet_ids(&[], &cache, &meta, &net).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(net.list_calls.load(Ordering::SeqCst), 1);
    }
}
