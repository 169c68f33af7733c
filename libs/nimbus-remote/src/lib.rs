//! Generates a stable identity for, and on demand a kubeconfig for, the cluster a provisioner
//! targets: the host cluster itself, a nested virtual cluster, or a workload cluster produced by
//! cluster-api (§4.5).

pub mod error;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::ResourceExt;
use nimbus_cd::{Kubeconfig, ResourceIdentifier};
use nimbus_outcome::ValueOutcome;
use tracing::debug;

pub use error::Error;

pub type ConfigOutcome = ValueOutcome<Kubeconfig, Error>;

/// The priority-ordered identity labels that scope a [`ResourceIdentifier`] (§3, GLOSSARY).
#[derive(Debug, Clone, Default)]
pub struct IdentityLabels {
    pub organization: String,
    pub project: String,
    pub control_plane: Option<String>,
    pub cluster: Option<String>,
}

impl IdentityLabels {
    fn as_label_map(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("organization".to_string(), self.organization.clone());
        labels.insert("project".to_string(), self.project.clone());
        if let Some(cp) = &self.control_plane {
            labels.insert("control-plane".to_string(), cp.clone());
        }
        if let Some(cluster) = &self.cluster {
            labels.insert("cluster".to_string(), cluster.clone());
        }
        labels
    }
}

/// A handle to a target Kubernetes API: either the host cluster the operator runs on, a virtual
/// cluster nested inside it, or a workload cluster cluster-api has produced (§3, §4.5).
#[derive(Debug, Clone)]
pub enum RemoteCluster {
    InCluster {
        identity: IdentityLabels,
    },
    VirtualCluster {
        /// Namespace in the host cluster holding the virtual cluster's kubeconfig secret.
        host_namespace: String,
        control_plane_name: String,
        /// Optional rewrite of the kubeconfig's server to the virtual cluster's externally
        /// reachable LoadBalancer/Service address, when the in-secret server isn't reachable
        /// from outside the host cluster's pod network.
        external_server: Option<String>,
        identity: IdentityLabels,
    },
    WorkloadCluster {
        /// Namespace in the host cluster holding the cluster-api-produced kubeconfig secret.
        host_namespace: String,
        release_name: String,
        identity: IdentityLabels,
    },
}

impl RemoteCluster {
    /// A [`ResourceIdentifier`] stable across reconciles: a fixed name per variant plus the
    /// owning unit's identity labels (§4.5).
    pub fn id(&self) -> ResourceIdentifier {
        let (name, labels) = match self {
            RemoteCluster::InCluster { identity } => ("in-cluster", identity),
            RemoteCluster::VirtualCluster { identity, .. } => ("vcluster", identity),
            RemoteCluster::WorkloadCluster { identity, .. } => ("kubernetes", identity),
        };
        ResourceIdentifier::new(name).with_labels(labels.as_label_map())
    }

    /// `vc-<controlPlaneName>` / `<releaseName>-kubeconfig`, per §6.
    fn secret_name(&self) -> Option<String> {
        match self {
            RemoteCluster::InCluster { .. } => None,
            RemoteCluster::VirtualCluster {
                control_plane_name, ..
            } => Some(format!("vc-{control_plane_name}")),
            RemoteCluster::WorkloadCluster { release_name, .. } => {
                Some(format!("{release_name}-kubeconfig"))
            }
        }
    }

    fn host_namespace(&self) -> Option<&str> {
        match self {
            RemoteCluster::InCluster { .. } => None,
            RemoteCluster::VirtualCluster { host_namespace, .. } => Some(host_namespace),
            RemoteCluster::WorkloadCluster { host_namespace, .. } => Some(host_namespace),
        }
    }

    /// Resolves the kubeconfig for this remote. `InCluster` never yields: the ambient
    /// service-account config is always available. The others look up a secret in the host
    /// cluster and yield until it exists (§4.5).
    pub async fn config(&self, host_client: &kube::Client) -> ConfigOutcome {
        let RemoteCluster::InCluster { .. } = self else {
            return self.config_from_secret(host_client).await;
        };
        // The ambient service-account kubeconfig is always present once the pod has started;
        // there's nothing to wait on, unlike the secret-backed variants below.
        match kube::Config::infer().await {
            Ok(config) => ConfigOutcome::Ok(Kubeconfig {
                server: config.cluster_url.to_string(),
                certificate_authority_data: config.root_cert.unwrap_or_default().concat(),
                client_certificate_data: Vec::new(),
                client_key_data: Vec::new(),
            }),
            Err(e) => ConfigOutcome::Err(Error::Kube(kube::Error::InferConfig(e))),
        }
    }

    async fn config_from_secret(&self, host_client: &kube::Client) -> ConfigOutcome {
        let (Some(namespace), Some(secret_name)) = (self.host_namespace(), self.secret_name())
        else {
            unreachable!("InCluster is handled by the caller");
        };

        let api: Api<Secret> = Api::namespaced(host_client.clone(), namespace);
        let secret = match api.get_opt(&secret_name).await {
            Ok(Some(secret)) => secret,
            Ok(None) => {
                debug!(namespace, secret_name, "kubeconfig secret not yet present");
                return ConfigOutcome::Yield;
            }
            Err(e) => return ConfigOutcome::Err(Error::Kube(e)),
        };

        let raw = match secret
            .data
            .as_ref()
            .and_then(|d| d.get("value").or_else(|| d.get("kubeconfig")))
        {
            Some(value) => value.0.clone(),
            None => {
                return ConfigOutcome::Err(Error::MissingSecretKey {
                    namespace: namespace.to_string(),
                    name: secret_name,
                    key: "value".to_string(),
                })
            }
        };

        let mut kubeconfig = match Kubeconfig::from_yaml(&raw) {
            Ok(kubeconfig) => kubeconfig,
            Err(_) => return ConfigOutcome::Yield,
        };

        if let RemoteCluster::VirtualCluster {
            external_server: Some(server),
            ..
        } = self
        {
            kubeconfig.server = server.clone();
        }

        ConfigOutcome::Ok(kubeconfig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> IdentityLabels {
        IdentityLabels {
            organization: "acme".into(),
            project: "payments".into(),
            control_plane: Some("cp1".into()),
            cluster: Some("c1".into()),
        }
    }

    #[test]
    fn in_cluster_id_is_stable() {
        let remote = RemoteCluster::InCluster { identity: identity() };
        assert_eq!(remote.id().name, "in-cluster");
    }

    #[test]
    fn virtual_cluster_secret_name() {
        let remote = RemoteCluster::VirtualCluster {
            host_namespace: "cp1".into(),
            control_plane_name: "cp1".into(),
            external_server: None,
            identity: identity(),
        };
        assert_eq!(remote.secret_name().as_deref(), Some("vc-cp1"));
        assert_eq!(remote.id().name, "vcluster");
    }

    #[test]
    fn workload_cluster_secret_name() {
        let remote = RemoteCluster::WorkloadCluster {
            host_namespace: "cp1".into(),
            release_name: "cluster-a1b2c3d4".into(),
            identity: identity(),
        };
        assert_eq!(
            remote.secret_name().as_deref(),
            Some("cluster-a1b2c3d4-kubeconfig")
        );
        assert_eq!(remote.id().name, "kubernetes");
    }

    #[test]
    fn identity_labels_carry_through_to_id() {
        let remote = RemoteCluster::InCluster { identity: identity() };
        let id = remote.id();
        assert_eq!(id.labels.get("control-plane").map(String::as_str), Some("cp1"));
    }
}
