//! Stand-in implementations of the external collaborators spec.md §6 and
//! §1 name as out of scope: the raw OCI load balancer wire client, the
//! OCI networking client, and the instance metadata service. None of
//! those live in this crate's dependency stack (adding a wire client
//! would mean fabricating one, which this codebase avoids), so this
//! module exists purely to let the binary link and run the reconciler
//! end to end against the real `kube`-backed `ClusterAccessor`. A real
//! deployment swaps these for SDK-backed implementations of the same
//! traits; nothing else in the crate depends on them being these ones.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::lb_client::{
    InstanceMetadata, InstanceMetadataProvider, LbClient, ListenerBackendReconciler, NetworkingClient, Subnet, Vnic, WorkRequest,
};
use crate::model::{Certificate, HostnameDetail, LbModel, RoutingPolicy, RuleSet};

fn not_configured(what: &str) -> Error {
    Error::InvalidInput(format!("{what}: no wire client configured for this deployment"))
}

/// `LbClient` stand-in: every call fails clearly rather than silently
/// pretending to talk to a load balancer service.
pub struct UnconfiguredLbClient;

#[async_trait]
impl LbClient for UnconfiguredLbClient {
    async fn get_load_balancer_by_name(&self, _compartment_id: &str, _name: &str) -> Result<Option<LbModel>> {
        Err(not_configured("get_load_balancer_by_name"))
    }
    async fn create_load_balancer(&self, _desired: &LbModel) -> Result<String> {
        Err(not_configured("create_load_balancer"))
    }
    async fn delete_load_balancer(&self, _lb_id: &str) -> Result<String> {
        Err(not_configured("delete_load_balancer"))
    }
    async fn create_routing_policy(&self, _lb_id: &str, _policy: &RoutingPolicy) -> Result<String> {
        Err(not_configured("create_routing_policy"))
    }
    async fn update_routing_policy(&self, _lb_id: &str, _policy: &RoutingPolicy) -> Result<String> {
        Err(not_configured("update_routing_policy"))
    }
    async fn delete_routing_policy(&self, _lb_id: &str, _name: &str) -> Result<String> {
        Err(not_configured("delete_routing_policy"))
    }
    async fn create_rule_set(&self, _lb_id: &str, _rule_set: &RuleSet) -> Result<String> {
        Err(not_configured("create_rule_set"))
    }
    async fn update_rule_set(&self, _lb_id: &str, _rule_set: &RuleSet) -> Result<String> {
        Err(not_configured("update_rule_set"))
    }
    async fn delete_rule_set(&self, _lb_id: &str, _name: &str) -> Result<String> {
        Err(not_configured("delete_rule_set"))
    }
    async fn create_hostname(&self, _lb_id: &str, _hostname: &HostnameDetail) -> Result<String> {
        Err(not_configured("create_hostname"))
    }
    async fn delete_hostname(&self, _lb_id: &str, _name: &str) -> Result<String> {
        Err(not_configured("delete_hostname"))
    }
    async fn create_certificate(&self, _lb_id: &str, _certificate: &Certificate) -> Result<String> {
        Err(not_configured("create_certificate"))
    }
    async fn delete_certificate(&self, _lb_id: &str, _name: &str) -> Result<String> {
        Err(not_configured("delete_certificate"))
    }
    async fn get_work_request(&self, _work_request_id: &str) -> Result<WorkRequest> {
        Err(not_configured("get_work_request"))
    }
}

/// `ListenerBackendReconciler` stand-in for the opaque listener/backend
/// convergence hook (§4.5 step 3).
pub struct UnconfiguredListenerBackendReconciler;

#[async_trait]
impl ListenerBackendReconciler for UnconfiguredListenerBackendReconciler {
    async fn update_load_balancer(&self, _lb_id: &str, _live: &LbModel, _desired: &LbModel) -> Result<()> {
        Err(not_configured("update_load_balancer"))
    }
}

/// `NetworkingClient` stand-in for subnet discovery.
pub struct UnconfiguredNetworkingClient;

#[async_trait]
impl NetworkingClient for UnconfiguredNetworkingClient {
    async fn get_primary_vnic_for_instance(&self, _compartment_id: &str, _instance_id: &str) -> Result<Vnic> {
        Err(not_configured("get_primary_vnic_for_instance"))
    }
    async fn get_subnet(&self, _subnet_id: &str) -> Result<Subnet> {
        Err(not_configured("get_subnet"))
    }
    async fn list_subnets(&self, _compartment_id: &str, _vcn_id: &str) -> Result<Vec<Subnet>> {
        Err(not_configured("list_subnets"))
    }
    async fn get_reserved_ip_ocid_by_address(&self, _compartment_id: &str, _ip_address: &str) -> Result<String> {
        Err(not_configured("get_reserved_ip_ocid_by_address"))
    }
}

/// `InstanceMetadataProvider` stand-in; a real deployment reads this from
/// the cloud's local instance metadata endpoint.
pub struct UnconfiguredInstanceMetadataProvider;

#[async_trait]
impl InstanceMetadataProvider for UnconfiguredInstanceMetadataProvider {
    async fn get(&self) -> Result<InstanceMetadata> {
        Err(not_configured("instance metadata"))
    }
}
