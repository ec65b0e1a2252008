//! Per-ingress reconciliation: converts a watched `Ingress` into the pure
//! `spec_builder::Ingress` representation, gathers the cluster state and
//! subnet ids the builder needs, derives the desired `LbModel`, and hands
//! it to the `Manager` to converge. Grounded on
//! `original_source/src/controller/reconciller.go` (`reconciler.Reconcile`).
//!
//! Unlike the original's single `mgr.mu` mutex serializing every
//! ingress's convergence against every other, this keeps one lock per
//! ingress key so unrelated ingresses reconcile concurrently — see
//! SPEC_FULL.md's note on this as an intentional improvement.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use k8s_openapi::api::networking::v1::Ingress as K8sIngress;
use tokio::sync::Mutex as AsyncMutex;

use crate::cluster::{ClusterAccessor, Service};
use crate::config::Defaults;
use crate::error::{Error, Result};
use crate::lb_client::{InstanceMetadataProvider, NetworkingClient};
use crate::manager::Manager;
use crate::match_expr::PathType;
use crate::naming;
use crate::spec_builder::{self, BuilderInputs, Ingress, IngressBackendRef, IngressPathRule, IngressRule, IngressTls};
use crate::subnet_discovery::{self, SubnetCache};

/// Drives a single ingress's convergence against the load balancer.
/// One `Reconciler` is shared across every watched ingress; state private
/// to a single key (the per-key lock) lives in `key_locks`, while the
/// subnet cache and manager are process-wide.
pub struct Reconciler {
    cluster: Arc<dyn ClusterAccessor>,
    manager: Arc<Manager>,
    defaults: Arc<Defaults>,
    subnet_cache: Arc<SubnetCache>,
    metadata: Arc<dyn InstanceMetadataProvider>,
    networking: Arc<dyn NetworkingClient>,
    key_locks: std::sync::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Reconciler {
    pub fn new(
        cluster: Arc<dyn ClusterAccessor>,
        manager: Arc<Manager>,
        defaults: Arc<Defaults>,
        subnet_cache: Arc<SubnetCache>,
        metadata: Arc<dyn InstanceMetadataProvider>,
        networking: Arc<dyn NetworkingClient>,
    ) -> Reconciler {
        Reconciler {
            cluster,
            manager,
            defaults,
            subnet_cache,
            metadata,
            networking,
            key_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        self.key_locks
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Reconciles one ingress. `ingress` is `None` when the watched object
    /// no longer exists (§4.8: a cache-get `NotFound` maps to delete).
    /// Returns the live load balancer's assigned IP on success, or `None`
    /// when the ingress (and its load balancer) were deleted.
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
        ingress: Option<&K8sIngress>,
    ) -> Result<Option<String>> {
        let key = format!("{namespace}/{name}");
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let compartment_id = self.defaults.compartment_id.clone();
        let lb_name = naming::lb_name(&self.defaults.load_balancer_prefix, namespace, name);
        // No external cancellation source at this layer: a reconcile call
        // runs to completion or fails, it is never interrupted mid-flight.
        let (_cancel_tx, mut cancel_rx) = tokio::sync::watch::channel(false);

        let Some(ingress) = ingress else {
            tracing::info!(%namespace, %name, "ingress no longer exists, deleting load balancer");
            self.manager.delete_ingress(&compartment_id, &lb_name, &mut cancel_rx).await?;
            return Ok(None);
        };

        tracing::info!(%namespace, %name, "converging load balancer");
        let converted = convert_ingress(ingress)?;
        let (services, nodes, secrets) = self.gather_cluster_inputs(&converted).await?;
        let fallback_subnet_ids = subnet_discovery::resolve_fallback_subnet_ids(
            &self.defaults.default_subnet_ids,
            &self.subnet_cache,
            self.metadata.as_ref(),
            self.networking.as_ref(),
        )
        .await?;

        let inputs = BuilderInputs {
            ingress: &converted,
            services: &services,
            nodes: &nodes,
            secrets: &secrets,
            resolved_subnet_ids: fallback_subnet_ids,
            defaults: self.defaults.as_ref(),
        };
        let output = spec_builder::build_model(&inputs)?;

        let ingress_uid = ingress.metadata.uid.clone().unwrap_or_default();
        let live = self
            .manager
            .update_or_create_ingress(&compartment_id, name, namespace, &ingress_uid, &output.model, &mut cancel_rx)
            .await?;

        Ok(live.load_balancer_ip)
    }

    async fn gather_cluster_inputs(
        &self,
        ingress: &Ingress,
    ) -> Result<(BTreeMap<String, Service>, Vec<crate::cluster::Node>, BTreeMap<String, crate::cluster::Secret>)> {
        let mut services = BTreeMap::new();
        for backend in referenced_service_names(ingress) {
            if services.contains_key(&backend) {
                continue;
            }
            let svc = self.cluster.get_service(&ingress.namespace, &backend).await?;
            services.insert(backend, svc);
        }

        let nodes = self.cluster.list_nodes().await?;

        let mut secrets = BTreeMap::new();
        for tls in &ingress.tls {
            if secrets.contains_key(&tls.secret_name) {
                continue;
            }
            let secret = self.cluster.get_secret(&ingress.namespace, &tls.secret_name).await?;
            secrets.insert(tls.secret_name.clone(), secret);
        }

        Ok((services, nodes, secrets))
    }
}

fn referenced_service_names(ingress: &Ingress) -> Vec<String> {
    let mut names = Vec::new();
    if let Some(default_backend) = &ingress.default_backend {
        names.push(default_backend.service_name.clone());
    }
    for rule in &ingress.rules {
        for path in &rule.paths {
            names.push(path.backend.service_name.clone());
        }
    }
    names
}

/// Converts the wire `networking.k8s.io/v1` Ingress into the pure
/// `spec_builder::Ingress` the builder consumes, decoupling the builder
/// from `k8s_openapi`'s representation.
pub fn convert_ingress(ingress: &K8sIngress) -> Result<Ingress> {
    let name = ingress
        .metadata
        .name
        .clone()
        .ok_or_else(|| Error::InvalidInput("ingress has no name".to_string()))?;
    let namespace = ingress.metadata.namespace.clone().unwrap_or_default();
    let annotations: BTreeMap<String, String> = ingress.metadata.annotations.clone().unwrap_or_default().into_iter().collect();

    let spec = ingress
        .spec
        .clone()
        .ok_or_else(|| Error::InvalidInput(format!("ingress {namespace}/{name} has no spec")))?;

    let default_backend = spec
        .default_backend
        .as_ref()
        .and_then(|b| b.service.as_ref())
        .map(|svc| IngressBackendRef {
            service_name: svc.name.clone(),
            port_number: svc.port.as_ref().and_then(|p| p.number).unwrap_or(0).max(0) as u16,
            port_name: svc.port.as_ref().and_then(|p| p.name.clone()).unwrap_or_default(),
        });

    let tls = spec
        .tls
        .unwrap_or_default()
        .into_iter()
        .map(|t| IngressTls { hosts: t.hosts.unwrap_or_default(), secret_name: t.secret_name.unwrap_or_default() })
        .collect();

    let mut rules = Vec::new();
    for rule in spec.rules.unwrap_or_default() {
        let host = rule.host.unwrap_or_default();
        let http = match rule.http {
            Some(http) => http,
            None => continue,
        };
        let mut paths = Vec::new();
        for path in http.paths {
            let Some(service) = path.backend.service.as_ref() else {
                continue;
            };
            paths.push(IngressPathRule {
                path: path.path.unwrap_or_else(|| "/".to_string()),
                path_type: convert_path_type(&path.path_type),
                backend: IngressBackendRef {
                    service_name: service.name.clone(),
                    port_number: service.port.as_ref().and_then(|p| p.number).unwrap_or(0).max(0) as u16,
                    port_name: service.port.as_ref().and_then(|p| p.name.clone()).unwrap_or_default(),
                },
            });
        }
        rules.push(IngressRule { host, paths });
    }

    Ok(Ingress {
        name,
        namespace,
        ingress_class_name: spec.ingress_class_name,
        annotations,
        tls,
        rules,
        default_backend,
    })
}

fn convert_path_type(path_type: &str) -> PathType {
    match path_type {
        "Exact" => PathType::Exact,
        "Prefix" => PathType::Prefix,
        _ => PathType::ImplementationSpecific,
    }
}
