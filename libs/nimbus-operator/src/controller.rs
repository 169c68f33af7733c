//! Wires the three unit kinds' reconcile loops (§4.8, §4.14) to `kube::runtime::Controller`,
//! sharing one client, one CD driver, one bundle source and one metrics registry across all
//! three watches — the same `State`/`Context` split the teacher's single-CRD controller used,
//! generalized to run three controllers out of one process.

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::{controller::Controller, watcher::Config};
use kube::{api::Api, client::Client};
use tokio::sync::RwLock;
use tracing::{error, info, trace};

use crate::crd::{Cluster, ControlPlane, Project};
use crate::metrics::Metrics;
use crate::migrations;
use crate::reconcile::{self, Context, Diagnostics};

/// State shared between the controllers and the `/health`+`/metrics` web server (§4.14).
#[derive(Clone)]
pub struct State {
    diagnostics: Arc<RwLock<Diagnostics>>,
    metrics: Arc<Metrics>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
            metrics: Arc::new(Metrics::default()),
        }
    }
}

impl State {
    /// Builds state around an already-created `Metrics` (so the caller can register
    /// client-level metrics into the same `prometheus_client::Registry` first).
    pub fn new(metrics: Metrics) -> Self {
        Self {
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
            metrics: Arc::new(metrics),
        }
    }

    pub fn metrics(&self) -> String {
        let mut buffer = String::new();
        let registry = &*self.metrics.registry;
        prometheus_client::encoding::text::encode(&mut buffer, registry).unwrap();
        buffer
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    fn to_context(
        &self,
        client: Client,
        cd_driver: Arc<dyn nimbus_cd::CdDriver>,
        bundles: Arc<dyn nimbus_bundle::BundleProvider>,
        argocd_like: bool,
    ) -> Arc<Context> {
        Arc::new(Context {
            client,
            cd_driver,
            bundles,
            metrics: self.metrics.clone(),
            diagnostics: self.diagnostics.clone(),
            argocd_like,
        })
    }
}

async fn run_one<U>(client: Client, ctx: Arc<Context>)
where
    U: reconcile::Unit,
{
    let api = Api::<U>::all(client.clone());
    if let Err(e) = api.list(&kube::api::ListParams::default().limit(1)).await {
        error!(kind = U::KIND, error = %e, "CRD is not queryable; is it installed?");
        std::process::exit(1);
    }
    trace!(kind = U::KIND, "starting controller");
    Controller::new(api, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile::reconcile::<U>, reconcile::error_policy::<U>, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

/// Runs the split-brain migrations (§4.8), then all three unit kinds' controllers concurrently
/// until shutdown. Each controller watches its own CRD independently; there is no ordering
/// dependency between `Project`/`ControlPlane`/`Cluster` at the watch layer — only the
/// provisioner tree each one builds encodes the hierarchy.
pub async fn run(
    client: Client,
    cd_driver: Arc<dyn nimbus_cd::CdDriver>,
    bundles: Arc<dyn nimbus_bundle::BundleProvider>,
    argocd_like: bool,
    state: State,
) {
    if let Err(e) = migrations::run(&client, &migrations::control_plane_migrations()).await {
        error!(error = %e, "split-brain migration pass failed");
    }
    info!("split-brain migrations complete");

    let project_ctx = state.to_context(client.clone(), cd_driver.clone(), bundles.clone(), argocd_like);
    let control_plane_ctx = state.to_context(client.clone(), cd_driver.clone(), bundles.clone(), argocd_like);
    let cluster_ctx = state.to_context(client.clone(), cd_driver, bundles, argocd_like);

    tokio::join!(
        run_one::<Project>(client.clone(), project_ctx),
        run_one::<ControlPlane>(client.clone(), control_plane_ctx),
        run_one::<Cluster>(client, cluster_ctx),
    );
}
