//! Converts a desired `LbModel` into create/update/delete calls against
//! the `LbClient`, drives each mutation's work request to a terminal
//! state, and patches the in-memory live model so later diff steps in
//! the same convergence see the change without refetching. Grounded on
//! `original_source/src/manager/manager.go` (`lbManager`).

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::diff::{self, diff_maps};
use crate::dispatcher::{ActionDispatcher, Verb};
use crate::error::{Error, Result};
use crate::lb_client::{LbClient, ListenerBackendReconciler};
use crate::model::{Certificate, HostnameDetail, LbLifecycleState, LbModel, RoutingPolicy, RuleSet};
use crate::work_request::{self, CancellationToken};

/// Maps Kubernetes ingresses to OCI-style load balancers: the sole
/// downstream surface the reconciler drives (§6 "Manager").
pub struct Manager {
    lb_client: Arc<dyn LbClient>,
    listener_backend: Arc<dyn ListenerBackendReconciler>,
}

impl Manager {
    pub fn new(lb_client: Arc<dyn LbClient>, listener_backend: Arc<dyn ListenerBackendReconciler>) -> Manager {
        Manager { lb_client, listener_backend }
    }

    pub async fn try_get_load_balancer_by_name(&self, compartment_id: &str, name: &str) -> Result<Option<LbModel>> {
        self.lb_client.get_load_balancer_by_name(compartment_id, name).await
    }

    /// Looks up the LB by its deterministic display name and deletes it
    /// if present; a missing LB is treated as already deleted.
    pub async fn delete_ingress(
        &self,
        compartment_id: &str,
        lb_name: &str,
        cancel: &mut CancellationToken,
    ) -> Result<()> {
        let Some(lb) = self.try_get_load_balancer_by_name(compartment_id, lb_name).await? else {
            tracing::warn!(lb_name, "no load balancer exists to delete");
            return Ok(());
        };
        let lb_id = lb.id.clone().ok_or_else(|| Error::invariant("live load balancer missing id"))?;
        tracing::info!(lb_id = %lb_id, lb_name, "deleting load balancer");
        let wr_id = self.lb_client.delete_load_balancer(&lb_id).await?;
        work_request::drive(self.lb_client.as_ref(), &wr_id, cancel, || async {}).await?;
        tracing::info!(lb_id = %lb_id, "load balancer deleted");
        Ok(())
    }

    /// Creates the LB if one with `desired.name` doesn't exist yet, then
    /// converges it (new or pre-existing) to `desired`. Returns the
    /// resulting live view, including the assigned IP address.
    pub async fn update_or_create_ingress(
        &self,
        compartment_id: &str,
        ingress_name: &str,
        ingress_namespace: &str,
        ingress_uid: &str,
        desired: &LbModel,
        cancel: &mut CancellationToken,
    ) -> Result<LbModel> {
        let existing = self.try_get_load_balancer_by_name(compartment_id, &desired.name).await?;
        let live = match existing {
            None => {
                self.create_load_balancer(compartment_id, ingress_name, ingress_namespace, ingress_uid, desired, cancel)
                    .await?
            }
            Some(lb) => match lb.lifecycle_state {
                LbLifecycleState::Failed => {
                    return Err(Error::LbFailed(lb.id.unwrap_or_else(|| desired.name.clone())));
                }
                LbLifecycleState::Deleting => {
                    return Err(Error::LbDeleting(lb.id.unwrap_or_else(|| desired.name.clone())));
                }
                _ => lb,
            },
        };
        self.update_load_balancer(compartment_id, live, desired, cancel).await
    }

    /// The create API doesn't accept routing-policy attachments on
    /// listeners (they don't exist yet); strip them here and let the
    /// update pass that immediately follows attach them.
    async fn create_load_balancer(
        &self,
        compartment_id: &str,
        ingress_name: &str,
        ingress_namespace: &str,
        ingress_uid: &str,
        desired: &LbModel,
        cancel: &mut CancellationToken,
    ) -> Result<LbModel> {
        tracing::info!(lb_name = %desired.name, "creating load balancer");
        let mut create_spec = desired.clone();
        for listener in create_spec.listeners.values_mut() {
            listener.routing_policy_name = None;
        }
        create_spec.freeform_tags.insert("IngressName".to_string(), ingress_name.to_string());
        create_spec.freeform_tags.insert("IngressNamespace".to_string(), ingress_namespace.to_string());
        create_spec.freeform_tags.insert("IngressUID".to_string(), ingress_uid.to_string());

        let wr_id = self.lb_client.create_load_balancer(&create_spec).await?;
        work_request::drive(self.lb_client.as_ref(), &wr_id, cancel, || async {}).await?;

        let live = self
            .lb_client
            .get_load_balancer_by_name(compartment_id, &desired.name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("load balancer {} not found right after creation", desired.name)))?;
        tracing::info!(lb_id = ?live.id, lb_name = %desired.name, "load balancer created");
        Ok(live)
    }

    /// Runs the fixed sub-resource convergence order from §4.5: create
    /// prerequisites, attach routing policies, delegate listeners and
    /// backend sets to the external reconciliation hook, finish
    /// remaining updates, then delete what's orphaned.
    async fn update_load_balancer(
        &self,
        compartment_id: &str,
        live: LbModel,
        desired: &LbModel,
        cancel: &mut CancellationToken,
    ) -> Result<LbModel> {
        let lb_id = live.id.clone().ok_or_else(|| Error::invariant("live load balancer missing id"))?;
        let live = Arc::new(Mutex::new(live));

        let mut dispatcher = ActionDispatcher::new();
        self.enqueue_routing_policy_actions(&mut dispatcher, &live, &lb_id, desired, cancel).await;
        self.enqueue_rule_set_actions(&mut dispatcher, &live, &lb_id, desired, cancel).await;
        self.enqueue_hostname_actions(&mut dispatcher, &live, &lb_id, desired, cancel).await;
        self.enqueue_certificate_actions(&mut dispatcher, &live, &lb_id, desired, cancel).await?;

        // Best-effort pre-pass: a routing policy about to be updated may
        // reference a backend set the listener/backend-set reconcile
        // below hasn't created yet. Errors here are swallowed; the
        // load-bearing call happens once routing policies are attached.
        {
            let snapshot = live.lock().await.clone();
            let _ = self.listener_backend.update_load_balancer(&lb_id, &snapshot, desired).await;
        }
        if let Ok(Some(refreshed)) = self.lb_client.get_load_balancer_by_name(compartment_id, &desired.name).await {
            *live.lock().await = refreshed;
        }

        dispatcher.run(Verb::Create, &[]).await?;
        dispatcher.run(Verb::Update, &["routingpolicy"]).await?;

        {
            let snapshot = live.lock().await.clone();
            self.listener_backend.update_load_balancer(&lb_id, &snapshot, desired).await?;
        }

        dispatcher.run(Verb::Update, &[]).await?;
        dispatcher.run(Verb::Delete, &[]).await?;

        let final_live = live.lock().await.clone();
        Ok(final_live)
    }

    async fn enqueue_routing_policy_actions(
        &self,
        dispatcher: &mut ActionDispatcher,
        live: &Arc<Mutex<LbModel>>,
        lb_id: &str,
        desired: &LbModel,
        cancel: &CancellationToken,
    ) {
        let live_policies = live.lock().await.routing_policies.clone();
        let d = diff_maps(&desired.routing_policies, &live_policies, diff::routing_policy_same);

        for name in d.to_create {
            let policy: RoutingPolicy = desired.routing_policies[&name].clone();
            let client = self.lb_client.clone();
            let live = live.clone();
            let lb_id = lb_id.to_string();
            let mut cancel = cancel.clone();
            dispatcher.add(
                Verb::Create,
                "routingpolicy",
                Box::pin(async move {
                    let wr_id = client.create_routing_policy(&lb_id, &policy).await?;
                    work_request::drive(client.as_ref(), &wr_id, &mut cancel, || async move {
                        live.lock().await.routing_policies.insert(policy.name.clone(), policy);
                    })
                    .await
                }),
            );
        }
        for name in d.to_update {
            let policy: RoutingPolicy = desired.routing_policies[&name].clone();
            let client = self.lb_client.clone();
            let live = live.clone();
            let lb_id = lb_id.to_string();
            let mut cancel = cancel.clone();
            dispatcher.add(
                Verb::Update,
                "routingpolicy",
                Box::pin(async move {
                    let wr_id = client.update_routing_policy(&lb_id, &policy).await?;
                    work_request::drive(client.as_ref(), &wr_id, &mut cancel, || async move {
                        live.lock().await.routing_policies.insert(policy.name.clone(), policy);
                    })
                    .await
                }),
            );
        }
        for name in d.to_remove {
            let client = self.lb_client.clone();
            let live = live.clone();
            let lb_id = lb_id.to_string();
            let mut cancel = cancel.clone();
            dispatcher.add(
                Verb::Delete,
                "routingpolicy",
                Box::pin(async move {
                    let wr_id = client.delete_routing_policy(&lb_id, &name).await?;
                    work_request::drive(client.as_ref(), &wr_id, &mut cancel, || async move {
                        live.lock().await.routing_policies.remove(&name);
                    })
                    .await
                }),
            );
        }
    }

    async fn enqueue_rule_set_actions(
        &self,
        dispatcher: &mut ActionDispatcher,
        live: &Arc<Mutex<LbModel>>,
        lb_id: &str,
        desired: &LbModel,
        cancel: &CancellationToken,
    ) {
        let live_rule_sets = live.lock().await.rule_sets.clone();
        let d = diff_maps(&desired.rule_sets, &live_rule_sets, diff::rule_set_same);

        for name in d.to_create {
            let rule_set: RuleSet = desired.rule_sets[&name].clone();
            let client = self.lb_client.clone();
            let live = live.clone();
            let lb_id = lb_id.to_string();
            let mut cancel = cancel.clone();
            dispatcher.add(
                Verb::Create,
                "ruleset",
                Box::pin(async move {
                    let wr_id = client.create_rule_set(&lb_id, &rule_set).await?;
                    work_request::drive(client.as_ref(), &wr_id, &mut cancel, || async move {
                        live.lock().await.rule_sets.insert(rule_set.name.clone(), rule_set);
                    })
                    .await
                }),
            );
        }
        for name in d.to_update {
            let rule_set: RuleSet = desired.rule_sets[&name].clone();
            let client = self.lb_client.clone();
            let live = live.clone();
            let lb_id = lb_id.to_string();
            let mut cancel = cancel.clone();
            dispatcher.add(
                Verb::Update,
                "ruleset",
                Box::pin(async move {
                    let wr_id = client.update_rule_set(&lb_id, &rule_set).await?;
                    work_request::drive(client.as_ref(), &wr_id, &mut cancel, || async move {
                        live.lock().await.rule_sets.insert(rule_set.name.clone(), rule_set);
                    })
                    .await
                }),
            );
        }
        for name in d.to_remove {
            let client = self.lb_client.clone();
            let live = live.clone();
            let lb_id = lb_id.to_string();
            let mut cancel = cancel.clone();
            dispatcher.add(
                Verb::Delete,
                "ruleset",
                Box::pin(async move {
                    let wr_id = client.delete_rule_set(&lb_id, &name).await?;
                    work_request::drive(client.as_ref(), &wr_id, &mut cancel, || async move {
                        live.lock().await.rule_sets.remove(&name);
                    })
                    .await
                }),
            );
        }
    }

    async fn enqueue_hostname_actions(
        &self,
        dispatcher: &mut ActionDispatcher,
        live: &Arc<Mutex<LbModel>>,
        lb_id: &str,
        desired: &LbModel,
        cancel: &CancellationToken,
    ) {
        let live_hostnames = live.lock().await.hostname_details.clone();
        let d = diff_maps(&desired.hostname_details, &live_hostnames, diff::hostname_same);

        for name in d.to_create {
            let hostname: HostnameDetail = desired.hostname_details[&name].clone();
            let client = self.lb_client.clone();
            let live = live.clone();
            let lb_id = lb_id.to_string();
            let mut cancel = cancel.clone();
            dispatcher.add(
                Verb::Create,
                "hostname",
                Box::pin(async move {
                    let wr_id = client.create_hostname(&lb_id, &hostname).await?;
                    work_request::drive(client.as_ref(), &wr_id, &mut cancel, || async move {
                        live.lock().await.hostname_details.insert(hostname.name.clone(), hostname);
                    })
                    .await
                }),
            );
        }
        for name in d.to_remove {
            let client = self.lb_client.clone();
            let live = live.clone();
            let lb_id = lb_id.to_string();
            let mut cancel = cancel.clone();
            dispatcher.add(
                Verb::Delete,
                "hostname",
                Box::pin(async move {
                    let wr_id = client.delete_hostname(&lb_id, &name).await?;
                    work_request::drive(client.as_ref(), &wr_id, &mut cancel, || async move {
                        live.lock().await.hostname_details.remove(&name);
                    })
                    .await
                }),
            );
        }
    }

    /// Certificates are content-addressed: `to_update` should always be
    /// empty since a name collision with differing content can only
    /// mean a digest collision or a builder bug — either way an
    /// `Invariant`, not something to silently overwrite (there is no
    /// update API for an existing certificate, only create+delete).
    async fn enqueue_certificate_actions(
        &self,
        dispatcher: &mut ActionDispatcher,
        live: &Arc<Mutex<LbModel>>,
        lb_id: &str,
        desired: &LbModel,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let live_certs = live.lock().await.certificates.clone();
        let d = diff_maps(&desired.certificates, &live_certs, diff::certificate_same);
        if !d.to_update.is_empty() {
            return Err(Error::invariant("certificate update requested but certificates are content-addressed and immutable"));
        }

        for name in d.to_create {
            let cert: Certificate = desired.certificates[&name].clone();
            let client = self.lb_client.clone();
            let live = live.clone();
            let lb_id = lb_id.to_string();
            let mut cancel = cancel.clone();
            dispatcher.add(
                Verb::Create,
                "certificate",
                Box::pin(async move {
                    let wr_id = client.create_certificate(&lb_id, &cert).await?;
                    work_request::drive(client.as_ref(), &wr_id, &mut cancel, || async move {
                        live.lock().await.certificates.insert(cert.name.clone(), cert);
                    })
                    .await
                }),
            );
        }
        for name in d.to_remove {
            let client = self.lb_client.clone();
            let live = live.clone();
            let lb_id = lb_id.to_string();
            let mut cancel = cancel.clone();
            dispatcher.add(
                Verb::Delete,
                "certificate",
                Box::pin(async move {
                    let wr_id = client.delete_certificate(&lb_id, &name).await?;
                    work_request::drive(client.as_ref(), &wr_id, &mut cancel, || async move {
                        live.lock().await.certificates.remove(&name);
                    })
                    .await
                }),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lb_client::{WorkRequest, WorkRequestState};
    use crate::model::{LbShape, RoutingRule, DUMMY_BACKEND_SET_NAME};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::watch;

    /// In-memory `LbClient` keyed by display name; work requests
    /// complete instantly on the next poll.
    struct FakeLbClient {
        lbs: Mutex<BTreeMap<String, LbModel>>,
        next_id: AtomicUsize,
    }

    impl FakeLbClient {
        fn new() -> FakeLbClient {
            FakeLbClient { lbs: Mutex::new(BTreeMap::new()), next_id: AtomicUsize::new(1) }
        }

        fn new_wr_id(&self) -> String {
            format!("wr-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn get_mut(&self, lb_id: &str) -> tokio::sync::MutexGuard<'_, BTreeMap<String, LbModel>> {
            let guard = self.lbs.lock().await;
            assert!(guard.values().any(|lb| lb.id.as_deref() == Some(lb_id)), "unknown lb_id {lb_id}");
            guard
        }
    }

    #[async_trait]
    impl LbClient for FakeLbClient {
        async fn get_load_balancer_by_name(&self, _c: &str, name: &str) -> Result<Option<LbModel>> {
            Ok(self.lbs.lock().await.get(name).cloned())
        }

        async fn create_load_balancer(&self, desired: &LbModel) -> Result<String> {
            let mut lb = desired.clone();
            lb.id = Some(format!("ocid1.loadbalancer.{}", lb.name));
            lb.load_balancer_ip = Some("10.1.1.1".to_string());
            self.lbs.lock().await.insert(lb.name.clone(), lb);
            Ok(self.new_wr_id())
        }

        async fn delete_load_balancer(&self, lb_id: &str) -> Result<String> {
            let mut guard = self.lbs.lock().await;
            guard.retain(|_, lb| lb.id.as_deref() != Some(lb_id));
            Ok(self.new_wr_id())
        }

        async fn create_routing_policy(&self, lb_id: &str, policy: &RoutingPolicy) -> Result<String> {
            let mut guard = self.get_mut(lb_id).await;
            for lb in guard.values_mut().filter(|lb| lb.id.as_deref() == Some(lb_id)) {
                lb.routing_policies.insert(policy.name.clone(), policy.clone());
            }
            Ok(self.new_wr_id())
        }
        async fn update_routing_policy(&self, lb_id: &str, policy: &RoutingPolicy) -> Result<String> {
            self.create_routing_policy(lb_id, policy).await
        }
        async fn delete_routing_policy(&self, lb_id: &str, name: &str) -> Result<String> {
            let mut guard = self.get_mut(lb_id).await;
            for lb in guard.values_mut().filter(|lb| lb.id.as_deref() == Some(lb_id)) {
                lb.routing_policies.remove(name);
            }
            Ok(self.new_wr_id())
        }

        async fn create_rule_set(&self, _id: &str, _r: &RuleSet) -> Result<String> {
            Ok(self.new_wr_id())
        }
        async fn update_rule_set(&self, _id: &str, _r: &RuleSet) -> Result<String> {
            Ok(self.new_wr_id())
        }
        async fn delete_rule_set(&self, _id: &str, _n: &str) -> Result<String> {
            Ok(self.new_wr_id())
        }
        async fn create_hostname(&self, _id: &str, _h: &HostnameDetail) -> Result<String> {
            Ok(self.new_wr_id())
        }
        async fn delete_hostname(&self, _id: &str, _n: &str) -> Result<String> {
            Ok(self.new_wr_id())
        }
        async fn create_certificate(&self, _id: &str, _c: &Certificate) -> Result<String> {
            Ok(self.new_wr_id())
        }
        async fn delete_certificate(&self, _id: &str, _n: &str) -> Result<String> {
            Ok(self.new_wr_id())
        }

        async fn get_work_request(&self, id: &str) -> Result<WorkRequest> {
            Ok(WorkRequest { id: id.to_string(), state: WorkRequestState::Succeeded, message: None })
        }
    }

    struct FakeListenerBackendReconciler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ListenerBackendReconciler for FakeListenerBackendReconciler {
        async fn update_load_balancer(&self, _lb_id: &str, _live: &LbModel, _desired: &LbModel) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn desired_model(name: &str) -> LbModel {
        let mut m = LbModel::new(name, LbShape::Named("flexible".into()), vec!["subnet-a".into()]);
        let mut policy = RoutingPolicy::new("example_com");
        policy.add_rule(RoutingRule {
            name: "r1".into(),
            condition: "http.request.url.path eq '/'".into(),
            backend_set_name: DUMMY_BACKEND_SET_NAME.into(),
        });
        m.routing_policies.insert(policy.name.clone(), policy);
        m
    }

    fn no_cancel() -> CancellationToken {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn delete_ingress_is_a_no_op_when_lb_is_missing() {
        let client = Arc::new(FakeLbClient::new());
        let hook = Arc::new(FakeListenerBackendReconciler { calls: AtomicUsize::new(0) });
        let mgr = Manager::new(client, hook);
        let mut cancel = no_cancel();
        mgr.delete_ingress("compartment-1", "missing-lb", &mut cancel).await.unwrap();
    }

    #[tokio::test]
    async fn update_or_create_ingress_creates_then_converges_a_new_lb() {
        let client = Arc::new(FakeLbClient::new());
        let hook = Arc::new(FakeListenerBackendReconciler { calls: AtomicUsize::new(0) });
        let mgr = Manager::new(client.clone(), hook.clone());
        let desired = desired_model("lb1");
        let mut cancel = no_cancel();

        let live = mgr
            .update_or_create_ingress("compartment-1", "app", "default", "uid-1", &desired, &mut cancel)
            .await
            .unwrap();

        assert_eq!(live.load_balancer_ip.as_deref(), Some("10.1.1.1"));
        assert!(live.routing_policies.contains_key("example_com"));
        // listener/backend-set hook runs once best-effort, once load-bearing
        assert_eq!(hook.calls.load(Ordering::SeqCst), 2);

        let stored = client.get_load_balancer_by_name("compartment-1", "lb1").await.unwrap().unwrap();
        assert_eq!(stored.freeform_tags.get("IngressName").map(String::as_str), Some("app"));
        assert_eq!(stored.freeform_tags.get("IngressUID").map(String::as_str), Some("uid-1"));
    }

    #[tokio::test]
    async fn update_or_create_ingress_rejects_a_failed_lb() {
        let client = Arc::new(FakeLbClient::new());
        {
            let mut lb = desired_model("lb1");
            lb.id = Some("ocid1.loadbalancer.lb1".into());
            lb.lifecycle_state = LbLifecycleState::Failed;
            client.lbs.lock().await.insert(lb.name.clone(), lb);
        }
        let hook = Arc::new(FakeListenerBackendReconciler { calls: AtomicUsize::new(0) });
        let mgr = Manager::new(client, hook);
        let desired = desired_model("lb1");
        let mut cancel = no_cancel();

        let result = mgr.update_or_create_ingress("compartment-1", "app", "default", "uid-1", &desired, &mut cancel).await;
        assert!(matches!(result, Err(Error::LbFailed(_))));
    }

    #[tokio::test]
    async fn delete_ingress_deletes_an_existing_lb() {
        let client = Arc::new(FakeLbClient::new());
        let hook = Arc::new(FakeListenerBackendReconciler { calls: AtomicUsize::new(0) });
        let mgr = Manager::new(client.clone(), hook);
        let desired = desired_model("lb1");
        let mut cancel = no_cancel();
        mgr.update_or_create_ingress("compartment-1", "app", "default", "uid-1", &desired, &mut cancel)
            .await
            .unwrap();

        mgr.delete_ingress("compartment-1", "lb1", &mut cancel).await.unwrap();
        assert!(client.get_load_balancer_by_name("compartment-1", "lb1").await.unwrap().is_none());
    }
}
