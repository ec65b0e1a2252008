//! Watches `networking.k8s.io/v1` Ingress objects and drives each one
//! through the `Reconciler`, writing the resulting load balancer IP back
//! to `status.loadBalancer.ingress`. Grounded on
//! `ASoldo-rust_operator/src/controller.rs`'s `Controller::new(...).run(...)`
//! wiring and `original_source/src/controller/reconciller.go`'s
//! not-found-means-delete branch.
//!
//! The original relies on controller-runtime enqueueing a reconcile for
//! an ingress's key even after it's gone, so `cache.Get` returning
//! NotFound is enough to trigger `DeleteIngress`. kube-rs's `Controller`
//! only calls `reconcile` for objects still in its reflector store, so
//! this uses the same finalizer pattern `ASoldo-rust_operator` already
//! uses for its own child-resource cleanup to get one last reconcile
//! with `deletion_timestamp` set before the ingress is actually removed.

use std::{sync::Arc, time::Duration};

use futures_util::StreamExt;
use kube::{
    Api, Client, Resource, ResourceExt,
    api::{Patch, PatchParams},
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
};
use tracing::{error, info, warn};

use k8s_openapi::api::networking::v1::Ingress;

use crate::error::Error;
use crate::reconciler::Reconciler;

const FINALIZER: &str = "oci-lb-ingress-controller.io/finalizer";

#[derive(Clone)]
struct Ctx {
    client: Client,
    reconciler: Arc<Reconciler>,
}

pub async fn run_controller(client: Client, reconciler: Arc<Reconciler>) -> anyhow::Result<()> {
    let ingresses: Api<Ingress> = Api::all(client.clone());
    let ctx = Arc::new(Ctx { client, reconciler });

    Controller::new(ingresses, Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((objref, _action)) => info!(ingress = %objref.name, "reconciled"),
                Err(e) => error!("reconcile failed: {e:?}"),
            }
        })
        .await;

    Ok(())
}

async fn reconcile(ingress: Arc<Ingress>, ctx: Arc<Ctx>) -> Result<Action, Error> {
    let namespace = ingress.namespace().unwrap_or_else(|| "default".to_string());
    let name = ingress.name_any();

    if ingress.meta().deletion_timestamp.is_some() {
        ctx.reconciler.reconcile(&namespace, &name, None).await?;
        set_finalizer(&ctx.client, &namespace, &name, false).await?;
        return Ok(Action::await_change());
    }
    set_finalizer(&ctx.client, &namespace, &name, true).await?;

    let result = ctx.reconciler.reconcile(&namespace, &name, Some(&ingress)).await;
    let ip = match result {
        Ok(ip) => ip,
        Err(e) if e.is_retryable() => {
            warn!(%namespace, %name, error = %e, "retryable reconcile error");
            return Err(e);
        }
        Err(e) => {
            error!(%namespace, %name, error = %e, "non-retryable reconcile error");
            return Err(e);
        }
    };

    if let Some(ip) = ip {
        patch_status(&ctx.client, &namespace, &name, &ip).await?;
    }

    Ok(Action::requeue(Duration::from_secs(30)))
}

async fn set_finalizer(client: &Client, namespace: &str, name: &str, present: bool) -> Result<(), Error> {
    let api: Api<Ingress> = Api::namespaced(client.clone(), namespace);
    let finalizers: Vec<&str> = if present { vec![FINALIZER] } else { vec![] };
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(|e| Error::Retryable(format!("patching ingress finalizer: {e}")))?;
    Ok(())
}

async fn patch_status(client: &Client, namespace: &str, name: &str, ip: &str) -> Result<(), Error> {
    let api: Api<Ingress> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({
        "status": { "loadBalancer": { "ingress": [{ "ip": ip }] } }
    });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(|e| Error::Retryable(format!("patching ingress status: {e}")))?;
    Ok(())
}

fn error_policy(ingress: Arc<Ingress>, err: &Error, _ctx: Arc<Ctx>) -> Action {
    warn!(ingress = %ingress.name_any(), error = %err, "requeuing after error");
    if err.is_retryable() {
        Action::requeue(Duration::from_secs(5))
    } else {
        Action::requeue(Duration::from_secs(60))
    }
}
