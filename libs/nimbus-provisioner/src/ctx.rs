//! The explicit carrier threaded through every `provision`/`deprovision` call: the CD driver
//! handle, the host cluster's client, the current remote (if any) and target namespace, and the
//! reconcile-scoped remote-cluster refcount registry (§9 "Context as carrier").

use std::collections::HashMap;
use std::sync::Arc;

use kube::config::{KubeConfigOptions, Kubeconfig as KubeRsKubeconfig};
use nimbus_cd::CdDriver;
use nimbus_outcome::ValueOutcome;
use nimbus_remote::RemoteCluster;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Per-remote refcounting state for [`crate::remote::RemoteClusterProvisioner`] (§4.6, §5):
/// registration happens on the 0→1 transition of `refs`, deregistration once `completed` catches
/// up to `refs`. Neither count is ever decremented on its own — both only grow until the whole
/// registry is dropped at the end of one reconcile.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct RefEntry {
    pub refs: u32,
    pub completed: u32,
}

/// Owned by one reconcile, passed down through the provisioner tree — never a process-wide
/// global (§9).
#[derive(Default)]
pub struct RemoteRegistry {
    entries: Mutex<HashMap<nimbus_cd::ResourceIdentifier, RefEntry>>,
}

impl RemoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the refcount for `id` and reports whether this call observed the 0→1
    /// transition (the caller registers the remote exactly when this is `true`).
    pub(crate) async fn acquire(&self, id: &nimbus_cd::ResourceIdentifier) -> bool {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(id.clone()).or_default();
        let first = entry.refs == 0;
        entry.refs += 1;
        first
    }

    /// Increments the completion count for `id` and reports whether it now equals the refcount
    /// (the caller deregisters the remote exactly when this is `true`).
    pub(crate) async fn release(&self, id: &nimbus_cd::ResourceIdentifier) -> bool {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(id.clone()).or_default();
        entry.completed += 1;
        entry.completed >= entry.refs
    }
}

/// Threaded through every node of the provisioner tree for the duration of one reconcile.
/// Cloning is cheap: the CD driver handle, host client, and registry are all reference-counted or
/// internally `Clone`.
#[derive(Clone)]
pub struct ProvisionCtx {
    host_client: kube::Client,
    cd_driver: Arc<dyn CdDriver>,
    remote: Option<RemoteCluster>,
    namespace: Option<String>,
    background_delete: bool,
    registry: Arc<RemoteRegistry>,
    cancellation: CancellationToken,
}

impl ProvisionCtx {
    pub fn new(
        host_client: kube::Client,
        cd_driver: Arc<dyn CdDriver>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            host_client,
            cd_driver,
            remote: None,
            namespace: None,
            background_delete: false,
            registry: Arc::new(RemoteRegistry::new()),
            cancellation,
        }
    }

    /// A copy of this context with `remote` pushed into scope, for `OnRemote`'s child (§4.6).
    pub fn with_remote(&self, remote: RemoteCluster) -> Self {
        Self {
            remote: Some(remote),
            ..self.clone()
        }
    }

    /// A copy of this context with the target namespace set, for `InNamespace`'s child (§4.6).
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..self.clone()
        }
    }

    /// A copy of this context with `background_delete` set, for `BackgroundDelete`'s child
    /// (§4.6).
    pub fn with_background_delete(&self) -> Self {
        Self {
            background_delete: true,
            ..self.clone()
        }
    }

    pub fn cd_driver(&self) -> &Arc<dyn CdDriver> {
        &self.cd_driver
    }

    pub fn remote(&self) -> Option<&RemoteCluster> {
        self.remote.as_ref()
    }

    pub fn namespace(&self, scope: &str) -> Result<&str> {
        self.namespace
            .as_deref()
            .ok_or_else(|| Error::NoNamespaceInScope(scope.to_string()))
    }

    pub fn background_delete(&self) -> bool {
        self.background_delete
    }

    pub fn registry(&self) -> &Arc<RemoteRegistry> {
        &self.registry
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The client for the current target: the host client if no remote is in scope (the ambient
    /// case Project/ControlPlane namespace work runs under), otherwise a one-off client built
    /// from the in-scope remote's resolved kubeconfig. Yields while the remote's credentials
    /// aren't yet discoverable (§4.5).
    pub async fn target_client(&self) -> ValueOutcome<kube::Client, Error> {
        let Some(remote) = &self.remote else {
            return ValueOutcome::Ok(self.host_client.clone());
        };
        match remote.config(&self.host_client).await {
            ValueOutcome::Ok(kubeconfig) => match client_from_kubeconfig(&kubeconfig).await {
                Ok(client) => ValueOutcome::Ok(client),
                Err(e) => ValueOutcome::Err(e),
            },
            ValueOutcome::Yield => ValueOutcome::Yield,
            ValueOutcome::Err(e) => ValueOutcome::Err(Error::Remote(e)),
        }
    }

    pub fn host_client(&self) -> &kube::Client {
        &self.host_client
    }
}

/// Builds a one-off `kube::Client` from a resolved remote kubeconfig, by round-tripping through
/// `kube::config::Kubeconfig`'s own YAML parsing rather than hand-assembling a `Config` — this
/// keeps all the kubeconfig-shape knowledge in `kube` itself.
async fn client_from_kubeconfig(kubeconfig: &nimbus_cd::Kubeconfig) -> Result<kube::Client> {
    let raw = kubeconfig
        .to_yaml()
        .map_err(|e| Error::InvalidRemoteKubeconfig(e.to_string()))?;
    let parsed: KubeRsKubeconfig = serde_yaml::from_slice(&raw)
        .map_err(|e| Error::InvalidRemoteKubeconfig(e.to_string()))?;
    let config = kube::Config::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::InvalidRemoteKubeconfig(e.to_string()))?;
    kube::Client::try_from(config).map_err(Error::Kube)
}
