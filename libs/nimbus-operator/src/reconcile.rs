//! The generic reconcile loop shared by all three unit kinds (§4.8): attach the finalizer and
//! record first-visit, build the unit's provisioner tree, bound it by a deadline, and translate
//! the resulting [`nimbus_provisioner::Outcome`] into controller-runtime `Action`s and status
//! conditions. Grounded on the teacher's own `reconcile`/`error_policy` pair, generalized over a
//! [`Unit`] trait instead of being written once per CRD.

use std::sync::Arc;
use std::time::Duration;

use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::{Resource, ResourceExt};
use nimbus_bundle::BundleProvider;
use nimbus_cd::CdDriver;
use nimbus_outcome::{Outcome as ProvisionOutcome, ValueOutcome};
use nimbus_provisioner::{ProvisionCtx, Provisioner};
use nimbus_remote::RemoteCluster;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{field, instrument, warn, Span};

use crate::conditions::{self, AVAILABLE, REASON_PROVISIONED, REASON_PROVISIONING};
use crate::crd::{UnitStatus, FINALIZER};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::telemetry;

/// Requeue period once a unit is `Available=True`: units are otherwise only re-checked on a
/// watch event, but a slow periodic pass catches drift the watch stream missed (§4.8).
pub const HEALTHY_REQUEUE: Duration = Duration::from_secs(5 * 60);
/// Requeue period while a `provision`/`deprovision` call yielded.
pub const YIELD_REQUEUE: Duration = Duration::from_secs(5);
/// Requeue period after a terminal error, so a persistently broken unit doesn't hot-loop.
pub const ERROR_REQUEUE: Duration = Duration::from_secs(60);

/// The fixed grace period every unit kind's deprovision gets, independent of `spec.timeout`
/// (§4.8 step 4b, §5).
pub const DEPROVISION_GRACE: Duration = Duration::from_secs(5 * 60);

/// The provision deadline used when a unit sets no `spec.timeoutSeconds` of its own (§5).
pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Unifies `Project`/`ControlPlane`/`Cluster` behind the one thing the reconcile loop actually
/// needs from each: its status, its configured timeout, the provisioner tree it composes into,
/// and (only for `Cluster`) the remote to garbage-collect orphaned children against.
#[async_trait::async_trait]
pub trait Unit:
    kube::Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>
    + Clone
    + std::fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: &'static str;

    fn status(&self) -> Option<&UnitStatus>;

    fn timeout(&self) -> Option<Duration>;

    /// Builds this unit's provisioner tree (§4.9). Pure: it may call out to `bundles` to resolve
    /// named entries, but it never itself talks to the Kubernetes API or the CD driver — that
    /// only happens once the tree returned here is driven with a [`ProvisionCtx`].
    fn build_tree(&self, bundles: &dyn BundleProvider) -> Result<Box<dyn Provisioner>>;

    /// The remote whose orphaned cluster-api children should be garbage-collected after a
    /// successful provision (§4.10). Only `Cluster` overrides this.
    fn remote_for_gc(&self) -> Option<RemoteCluster> {
        None
    }

    /// Runs the orphan GC (§4.10) against `client`, scoped to `namespace`. Only `Cluster`
    /// overrides this; the default is a no-op so `Project`/`ControlPlane` never pay for it.
    async fn collect_orphans(&self, _client: &kube::Client, _namespace: &str) -> Result<()> {
        Ok(())
    }
}

/// Everything every unit kind's reconcile loop needs, shared across all three controllers running
/// in the same process (§4.14): one host client, one CD driver, one bundle source, one metrics
/// registry.
pub struct Context {
    pub client: kube::Client,
    pub cd_driver: Arc<dyn CdDriver>,
    pub bundles: Arc<dyn BundleProvider>,
    pub metrics: Arc<Metrics>,
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Gates the workload-pool orphan GC (§4.10), which assumes ArgoCD-shaped cluster-api
    /// resources; set `false` for any future driver kind that doesn't produce them the same way.
    pub argocd_like: bool,
}

/// Lightweight health/debug state exposed over `/health` (§4.14), generalized across whichever
/// unit kind reconciled most recently rather than split per controller.
#[derive(Clone, Debug, serde::Serialize)]
pub struct Diagnostics {
    pub last_event: chrono::DateTime<chrono::Utc>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self { last_event: chrono::Utc::now() }
    }
}

async fn patch_status<U: Unit>(api: &Api<U>, name: &str, status: UnitStatus) -> Result<()> {
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

async fn record_terminal<U: Unit>(
    api: &Api<U>,
    name: &str,
    status: Option<&UnitStatus>,
    observed_generation: Option<i64>,
    error: Error,
) -> Result<Action> {
    let mut status = status.cloned().unwrap_or_default();
    conditions::set(
        &mut status,
        AVAILABLE,
        false,
        error.condition_reason(),
        error.to_string(),
        observed_generation,
    );
    patch_status(api, name, status).await?;
    Err(error)
}

async fn apply<U: Unit>(unit: Arc<U>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = unit
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(unit.name_any()))?;
    let name = unit.name_any();
    let api: Api<U> = Api::namespaced(ctx.client.clone(), &namespace);
    let generation = unit.meta().generation;

    if conditions::get(unit.status().unwrap_or(&UnitStatus::default()), AVAILABLE).is_none() {
        let mut status = unit.status().cloned().unwrap_or_default();
        conditions::set(&mut status, AVAILABLE, false, REASON_PROVISIONING, "provisioning started", generation);
        patch_status(&api, &name, status).await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let tree = unit.build_tree(ctx.bundles.as_ref())?;
    let timeout = unit.timeout().unwrap_or(DEFAULT_PROVISION_TIMEOUT);
    let cancellation = CancellationToken::new();
    let provision_ctx = ProvisionCtx::new(ctx.client.clone(), ctx.cd_driver.clone(), cancellation.clone());

    let outcome = match tokio::time::timeout(timeout, tree.provision(&provision_ctx)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            cancellation.cancel();
            return record_terminal(&api, &name, unit.status(), generation, Error::TimedOut(name.clone())).await;
        }
    };

    match outcome {
        ProvisionOutcome::Ok => {
            if let Some(remote) = unit.remote_for_gc() {
                if ctx.argocd_like {
                    match provision_ctx.with_remote(remote).target_client().await {
                        ValueOutcome::Ok(client) => {
                            if let Err(e) = unit.collect_orphans(&client, &namespace).await {
                                warn!(unit = %name, error = %e, "workload-pool orphan GC failed");
                            }
                        }
                        ValueOutcome::Yield => {}
                        ValueOutcome::Err(e) => {
                            warn!(unit = %name, error = %e, "could not reach remote for orphan GC");
                        }
                    }
                }
            }

            let mut status = unit.status().cloned().unwrap_or_default();
            let changed = conditions::set(&mut status, AVAILABLE, true, REASON_PROVISIONED, "provisioned", generation);
            if changed {
                patch_status(&api, &name, status).await?;
            }
            Ok(Action::requeue(HEALTHY_REQUEUE))
        }
        ProvisionOutcome::Yield => Ok(Action::requeue(YIELD_REQUEUE)),
        ProvisionOutcome::Err(e) => record_terminal(&api, &name, unit.status(), generation, e.into()).await,
    }
}

async fn cleanup<U: Unit>(unit: Arc<U>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = unit
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(unit.name_any()))?;
    let name = unit.name_any();
    let api: Api<U> = Api::namespaced(ctx.client.clone(), &namespace);
    let generation = unit.meta().generation;

    let tree = unit.build_tree(ctx.bundles.as_ref())?;
    let cancellation = CancellationToken::new();
    let provision_ctx = ProvisionCtx::new(ctx.client.clone(), ctx.cd_driver.clone(), cancellation.clone());

    let outcome = match tokio::time::timeout(DEPROVISION_GRACE, tree.deprovision(&provision_ctx)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            cancellation.cancel();
            return record_terminal(&api, &name, unit.status(), generation, Error::TimedOut(name.clone())).await;
        }
    };

    match outcome {
        ProvisionOutcome::Ok => Ok(Action::await_change()),
        ProvisionOutcome::Yield => Ok(Action::requeue(YIELD_REQUEUE)),
        ProvisionOutcome::Err(e) => record_terminal(&api, &name, unit.status(), generation, e.into()).await,
    }
}

/// Drives one reconcile of `unit` to completion (§4.8): the [`finalizer`] helper attaches the
/// system finalizer before the first `Apply` and strips it once a `Cleanup` succeeds, so step 2's
/// "attach the finalizer on first visit" and step 4d's "remove it once deprovision succeeds" need
/// no hand-rolled bookkeeping here.
#[instrument(skip(unit, ctx), fields(trace_id = field::Empty, kind = U::KIND, name = %unit.name_any()))]
pub async fn reconcile<U: Unit>(unit: Arc<U>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(&trace_id);
    ctx.diagnostics.write().await.last_event = chrono::Utc::now();

    let namespace = unit
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(unit.name_any()))?;
    let api: Api<U> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER, unit, |event| {
        let ctx = ctx.clone();
        async move {
            match event {
                FinalizerEvent::Apply(unit) => apply(unit, ctx).await,
                FinalizerEvent::Cleanup(unit) => cleanup(unit, ctx).await,
            }
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

/// The `kube::runtime::Controller` error policy shared by all three unit kinds: records the
/// failure metric and backs off, distinguishing a deliberate cancel/timeout from a generic error
/// only by how soon it retries (§4.8, §7).
pub fn error_policy<U: Unit>(unit: Arc<U>, error: &Error, ctx: Arc<Context>) -> Action {
    ctx.metrics.reconcile.set_failure(&unit, error);
    Action::requeue(ERROR_REQUEUE)
}
