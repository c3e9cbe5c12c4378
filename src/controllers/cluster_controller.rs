/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/controllers/cluster_controller.rs
*
* This file implements the controller for the dockyards `Cluster` resource.
* Its only job is to keep the bootstrap RBAC Workload of each Cluster in
* sync; the Workload itself is described in `rbac_workload.rs`.
*
* Architecture:
* - The controller runtime invokes `reconcile` for every change to a Cluster
*   and guarantees a single in-flight reconciliation per Cluster.
* - `reconcile` re-reads the Cluster from the controller's reflector cache and
*   stops early when it is gone, being deleted, or has no owning
*   Organization. Otherwise it hands over to the synthesizer.
* - Every error is returned unchanged. Retries are the runtime's business:
*   `error_policy` counts the failure and requeues the Cluster after a fixed
*   delay.
* - The whole reconciliation runs under a deadline; when it expires the
*   in-flight store call is dropped and `Error::Timeout` is returned.
* - `run` builds the production collaborators (KubeStore, ConfigMapConfig,
*   Metrics), waits for the first configuration snapshot and drives the
*   `Controller` until a termination signal arrives.
*
* SPDX-License-Identifier: Apache-2.0
*/

use super::rbac_workload::synthesize_rbac_workload;
use crate::ancestry::{OwnerResolver, StoreOwnerResolver};
use crate::config::{ConfigMapConfig, ConfigProvider, Settings};
use crate::crds::Cluster;
use crate::metrics::{self, Metrics};
use crate::registry::TypeRegistry;
use crate::store::{KubeStore, OperationResult, Store};
use crate::{Error, Result};
use futures::stream::StreamExt;
use kube::{api::ListParams, Api, Client, ResourceExt};
use kube_runtime::{controller::Action, reflector, reflector::ObjectRef, watcher, Controller};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(60);

/// The context required by the reconciler.
pub struct Context<S> {
    pub store: Arc<S>,
    /// Clusters as last seen by the controller's watch.
    pub clusters: reflector::Store<Cluster>,
    pub resolver: Arc<dyn OwnerResolver>,
    pub config: Arc<dyn ConfigProvider>,
    pub metrics: Arc<Metrics>,
    pub reconcile_timeout: Duration,
    pub error_requeue: Duration,
}

impl<S: Store + 'static> Context<S> {
    /// Resolves owners through the same store the reconciler writes to.
    pub fn new(
        store: Arc<S>,
        config: Arc<dyn ConfigProvider>,
        clusters: reflector::Store<Cluster>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            resolver: Arc::new(StoreOwnerResolver::new(store.clone())),
            store,
            clusters,
            config,
            metrics,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            error_requeue: DEFAULT_ERROR_REQUEUE,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn OwnerResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_timeouts(mut self, reconcile_timeout: Duration, error_requeue: Duration) -> Self {
        self.reconcile_timeout = reconcile_timeout;
        self.error_requeue = error_requeue;
        self
    }
}

#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
pub async fn reconcile<S: Store + 'static>(cluster: Arc<Cluster>, ctx: Arc<Context<S>>) -> Result<Action> {
    let _timer = ctx.metrics.count_and_measure();
    let namespace = cluster.namespace().ok_or(Error::MissingObjectKey("namespace"))?;
    let name = cluster.name_any();

    match tokio::time::timeout(ctx.reconcile_timeout, reconcile_key(&*ctx, &namespace, &name)).await {
        Ok(result) => result.map(|_| Action::await_change()),
        Err(_) => Err(Error::Timeout(ctx.reconcile_timeout)),
    }
}

/// Reconciles the Cluster `namespace/name`. Returns `None` when there was
/// nothing to do.
pub async fn reconcile_key<S: Store>(
    ctx: &Context<S>,
    namespace: &str,
    name: &str,
) -> Result<Option<OperationResult>> {
    let Some(cluster) = ctx.clusters.get(&ObjectRef::new(name).within(namespace)) else {
        debug!("cluster no longer exists");
        return Ok(None);
    };

    if cluster.metadata.deletion_timestamp.is_some() {
        debug!("cluster is being deleted");
        return Ok(None);
    }

    let owner = ctx.resolver.owner_organization(&cluster).await?;
    if owner.is_none() {
        info!("ignoring cluster without owner organization");
        return Ok(None);
    }

    synthesize_rbac_workload(ctx.store.as_ref(), ctx.config.as_ref(), &cluster)
        .await
        .map(Some)
}

pub fn error_policy<S>(cluster: Arc<Cluster>, error: &Error, ctx: Arc<Context<S>>) -> Action {
    warn!(
        cluster = %cluster.name_any(),
        namespace = %cluster.namespace().unwrap_or_default(),
        reason = error.metric_label(),
        "Reconciliation failed: {}",
        error
    );
    ctx.metrics.count_failure(error);
    Action::requeue(ctx.error_requeue)
}

/// Watches every Cluster and reconciles it until SIGTERM/SIGINT. In-flight
/// reconciliations are allowed to finish before this returns.
pub async fn run(client: Client, settings: &Settings) -> Result<()> {
    let store = Arc::new(KubeStore::new(client.clone(), Arc::new(TypeRegistry::dockyards())));

    let clusters = Api::<Cluster>::all(client.clone());
    if let Err(e) = clusters.list(&ListParams::default().limit(1)).await {
        error!("Cluster CRD is not queryable; {e:?}. Is the CRD installed?");
        return Err(e.into());
    }

    let metrics = Arc::new(Metrics::new()?);
    let metrics_server = tokio::spawn(metrics::serve(metrics.clone(), settings.metrics_addr));

    let config = ConfigMapConfig::start(client, &settings.dockyards_namespace, &settings.config_map);
    if tokio::time::timeout(settings.reconcile_timeout(), config.ready()).await.is_err() {
        warn!(
            config_map = %settings.config_map,
            "Configuration not observed yet, starting without it"
        );
    }

    let controller = Controller::new(clusters, watcher::Config::default().any_semantic()).shutdown_on_signal();
    let ctx = Arc::new(
        Context::new(store, Arc::new(config), controller.store(), metrics)
            .with_timeouts(settings.reconcile_timeout(), settings.error_requeue()),
    );

    controller
        .run(reconcile::<KubeStore>, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled Cluster {}", obj),
                Err(e) => warn!("Cluster reconcile error: {}", e),
            }
        })
        .await;

    metrics_server.abort();
    Ok(())
}
