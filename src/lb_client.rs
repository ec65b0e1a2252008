//! Collaborator interfaces for the external LB service, the networking
//! service, and instance metadata discovery. Grounded on
//! `original_source/pkg/oci/client/client.go`,
//! `original_source/pkg/oci/client/loadbalancer_extra.go`, and
//! `original_source/src/ingress/spec.go`'s `tryFindLoadbalancerSubnet`.
//! §6 treats these as out-of-core external collaborators; the core only
//! depends on these trait boundaries.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Certificate, HostnameDetail, LbModel, RoutingPolicy, RuleSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkRequestState {
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkRequest {
    pub id: String,
    pub state: WorkRequestState,
    pub message: Option<String>,
}

/// An async, work-request-based LB API client. Every mutating call
/// returns an opaque work-request id that must be polled via
/// `get_work_request` to completion (see `work_request::drive`).
#[async_trait]
pub trait LbClient: Send + Sync {
    async fn get_load_balancer_by_name(&self, compartment_id: &str, name: &str) -> Result<Option<LbModel>>;

    async fn create_load_balancer(&self, desired: &LbModel) -> Result<String>;
    async fn delete_load_balancer(&self, lb_id: &str) -> Result<String>;

    async fn create_routing_policy(&self, lb_id: &str, policy: &RoutingPolicy) -> Result<String>;
    async fn update_routing_policy(&self, lb_id: &str, policy: &RoutingPolicy) -> Result<String>;
    async fn delete_routing_policy(&self, lb_id: &str, name: &str) -> Result<String>;

    async fn create_rule_set(&self, lb_id: &str, rule_set: &RuleSet) -> Result<String>;
    async fn update_rule_set(&self, lb_id: &str, rule_set: &RuleSet) -> Result<String>;
    async fn delete_rule_set(&self, lb_id: &str, name: &str) -> Result<String>;

    async fn create_hostname(&self, lb_id: &str, hostname: &HostnameDetail) -> Result<String>;
    async fn delete_hostname(&self, lb_id: &str, name: &str) -> Result<String>;

    async fn create_certificate(&self, lb_id: &str, certificate: &Certificate) -> Result<String>;
    async fn delete_certificate(&self, lb_id: &str, name: &str) -> Result<String>;

    async fn get_work_request(&self, work_request_id: &str) -> Result<WorkRequest>;
}

/// Opaque hook that converges listeners and backend sets to the desired
/// state. Invoked twice per reconcile per §4.5 step 3; kept separate from
/// `LbClient` because it is implemented by the surrounding collaborator
/// and not part of the core.
#[async_trait]
pub trait ListenerBackendReconciler: Send + Sync {
    async fn update_load_balancer(&self, lb_id: &str, live: &LbModel, desired: &LbModel) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vnic {
    pub id: String,
    pub subnet_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subnet {
    pub id: String,
    pub vcn_id: String,
    pub prohibit_public_ip_on_vnic: bool,
}

#[async_trait]
pub trait NetworkingClient: Send + Sync {
    async fn get_primary_vnic_for_instance(&self, compartment_id: &str, instance_id: &str) -> Result<Vnic>;
    async fn get_subnet(&self, subnet_id: &str) -> Result<Subnet>;
    async fn list_subnets(&self, compartment_id: &str, vcn_id: &str) -> Result<Vec<Subnet>>;

    /// Resolves a reserved public IP's OCID from its address, for the
    /// `oci-load-balancer-reserved-ip` annotation.
    async fn get_reserved_ip_ocid_by_address(&self, compartment_id: &str, ip_address: &str) -> Result<String>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceMetadata {
    pub instance_id: String,
    pub compartment_id: String,
}

#[async_trait]
pub trait InstanceMetadataProvider: Send + Sync {
    async fn get(&self) -> Result<InstanceMetadata>;
}
