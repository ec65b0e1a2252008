mod annotations;
mod cluster;
mod collaborators;
mod config;
mod controller;
mod diff;
mod dispatcher;
mod error;
mod lb_client;
mod manager;
mod match_expr;
mod model;
mod naming;
mod ratelimit;
mod reconciler;
mod spec_builder;
mod subnet_discovery;
mod work_request;

use std::sync::Arc;

use kube::Client;

use crate::cluster::KubeClusterAccessor;
use crate::collaborators::{
    UnconfiguredInstanceMetadataProvider, UnconfiguredLbClient, UnconfiguredListenerBackendReconciler, UnconfiguredNetworkingClient,
};
use crate::config::Defaults;
use crate::manager::Manager;
use crate::reconciler::Reconciler;
use crate::subnet_discovery::SubnetCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let defaults = Arc::new(Defaults::from_env());
    tracing::info!(ingress_class = %defaults.ingress_class, compartment_id = %defaults.compartment_id, "starting oci-lb-ingress-controller");

    let client = Client::try_default().await?;
    let cluster = Arc::new(KubeClusterAccessor::new(client.clone(), ""));

    // The OCI LB/networking wire client and the instance metadata reader
    // are out of scope (see collaborators.rs); swap these for real
    // SDK-backed implementations to run against an actual cloud account.
    let lb_client = Arc::new(UnconfiguredLbClient);
    let listener_backend = Arc::new(UnconfiguredListenerBackendReconciler);
    let networking = Arc::new(UnconfiguredNetworkingClient);
    let metadata = Arc::new(UnconfiguredInstanceMetadataProvider);
    let subnet_cache = Arc::new(SubnetCache::new());

    let manager = Arc::new(Manager::new(lb_client, listener_backend));
    let reconciler = Arc::new(Reconciler::new(cluster, manager, defaults, subnet_cache, metadata, networking));

    controller::run_controller(client, reconciler).await
}
