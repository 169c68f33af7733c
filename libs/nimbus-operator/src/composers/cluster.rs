//! §4.9 Cluster composer: the cluster-api application that produces the workload cluster plus its
//! bootstrap add-ons (CNI, CCM) run concurrently with it once the workload cluster's kubeconfig
//! is discoverable, then the optional autoscaler, then the rest of the add-ons gated by
//! `spec.addons` (§4.9 step 3). `remote_for_gc`/`collect_orphans` wire up the workload-pool orphan
//! GC (§4.10).

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use nimbus_bundle::{unbundle, BundleKind, BundleProvider, BundleRequest};
use nimbus_cd::cluster::hex8;
use nimbus_provisioner::{ApplicationProvisioner, Concurrent, Conditional, OnRemote, Provisioner, ProvisionerExt, RemoteClusterProvisioner, Serial};
use nimbus_remote::{IdentityLabels, RemoteCluster};

use super::control_plane;
use crate::crd::{Addons, Cluster, ClusterSpec, UnitStatus, WorkloadPool};
use crate::error::{Error, Result};
use crate::gc;
use crate::reconcile::Unit;

/// `cluster-<hex8>` per §6, hex8 = `sha256(control_plane_label + ":" + cluster_name)[:8]` (using
/// the same `hex8` helper `nimbus-cd` already treats as load-bearing, rather than a second
/// truncation scheme — see DESIGN.md).
pub fn release_name(control_plane_name: &str, cluster_name: &str) -> String {
    format!("cluster-{}", hex8(format!("{control_plane_name}:{cluster_name}").as_bytes()))
}

fn identity(spec: &ClusterSpec, name: &str) -> IdentityLabels {
    IdentityLabels {
        organization: spec.organization.clone(),
        project: spec.project.clone(),
        control_plane: Some(spec.control_plane.clone()),
        cluster: Some(name.to_string()),
    }
}

fn workload_cluster(spec: &ClusterSpec, name: &str, release_name: &str, identity: IdentityLabels) -> RemoteCluster {
    RemoteCluster::WorkloadCluster {
        host_namespace: control_plane::namespace_name(&spec.control_plane),
        release_name: release_name.to_string(),
        identity,
    }
}

fn addon_app(
    logical_name: &'static str,
    template: nimbus_cd::HelmApplication,
    labels: std::collections::BTreeMap<String, String>,
    namespace: String,
    workload: RemoteCluster,
    enabled: impl Fn() -> bool + Send + Sync + 'static,
) -> Conditional {
    let app = ApplicationProvisioner::new(logical_name, labels, move || template.clone().with_namespace(namespace.clone()))
        .on_remote(workload);
    Conditional::new(logical_name, enabled, app)
}

pub fn build(name: &str, namespace: &str, spec: &ClusterSpec, bundles: &dyn BundleProvider) -> Result<Box<dyn Provisioner>> {
    let identity = identity(spec, name);
    let labels = super::identity_label_map(&identity);
    let release_name = release_name(&spec.control_plane, name);

    let vcluster = control_plane::virtual_cluster(
        &spec.control_plane,
        None,
        IdentityLabels {
            organization: spec.organization.clone(),
            project: spec.project.clone(),
            control_plane: Some(spec.control_plane.clone()),
            cluster: None,
        },
    );
    let workload = workload_cluster(spec, name, &release_name, identity.clone());

    let bundle = bundles
        .get(&spec.bundle)
        .ok_or_else(|| Error::MissingBundle(spec.bundle.clone()))?;
    let resolved = unbundle(
        &bundle,
        BundleKind::Cluster,
        &[
            BundleRequest::required("cluster-api"),
            BundleRequest::required("cni"),
            BundleRequest::required("ccm"),
            BundleRequest::optional("autoscaler"),
            BundleRequest::optional("csi"),
            BundleRequest::optional("metrics"),
            BundleRequest::optional("gpu-operator"),
            BundleRequest::optional("ingress"),
            BundleRequest::optional("cert-manager"),
            BundleRequest::optional("file-storage"),
            BundleRequest::optional("dashboard"),
            BundleRequest::optional("prometheus"),
            BundleRequest::optional("kubernetes-dashboard"),
        ],
    )?;

    let cluster_api_template = resolved["cluster-api"].clone();
    let mut cluster_api_labels = labels.clone();
    cluster_api_labels.insert("application".to_string(), "cluster-api".to_string());
    let cluster_api_release = release_name.clone();
    let cluster_api_app = ApplicationProvisioner::new("cluster-api", cluster_api_labels, move || {
        cluster_api_template
            .clone()
            .with_namespace(namespace.to_string())
            .with_release_name(cluster_api_release.clone())
    })
    .on_remote(vcluster.clone());

    let bootstrap_addons: Vec<Arc<dyn Provisioner>> = vec![
        Arc::new(addon_app("cni", resolved["cni"].clone(), label_for(&labels, "cni"), namespace.to_string(), workload.clone(), || true)),
        Arc::new(addon_app("ccm", resolved["ccm"].clone(), label_for(&labels, "ccm"), namespace.to_string(), workload.clone(), || true)),
    ];
    let workload_bootstrap = Serial::new(
        "workload-bootstrap",
        vec![
            Box::new(RemoteClusterProvisioner::new(workload.clone())),
            Box::new(Concurrent::new("bootstrap-addons", bootstrap_addons)),
        ],
    );

    let bootstrap = Concurrent::new(
        "bootstrap",
        vec![Arc::new(cluster_api_app), Arc::new(workload_bootstrap)],
    );

    let mut children: Vec<Box<dyn Provisioner>> = vec![
        Box::new(RemoteClusterProvisioner::new(vcluster.clone())),
        Box::new(bootstrap),
    ];

    if let Some(autoscaler_template) = resolved.get("autoscaler").cloned() {
        let enabled = spec.autoscaler.is_some();
        let mut autoscaler_labels = labels.clone();
        autoscaler_labels.insert("application".to_string(), "autoscaler".to_string());
        let app = ApplicationProvisioner::new("autoscaler", autoscaler_labels, move || {
            autoscaler_template.clone().with_namespace(namespace.to_string())
        })
        .on_remote(workload.clone());
        children.push(Box::new(Conditional::new("autoscaler", move || enabled, app)));
    }

    children.push(Box::new(Concurrent::new("addons", build_addon_toggles(&resolved, &labels, namespace, workload, &spec.addons))));

    Ok(Box::new(Serial::new("cluster", children)))
}

fn label_for(labels: &std::collections::BTreeMap<String, String>, application: &str) -> std::collections::BTreeMap<String, String> {
    let mut labels = labels.clone();
    labels.insert("application".to_string(), application.to_string());
    labels
}

/// One `Conditional(app.on_remote(workload))` per optional add-on named in `Addons` (§4.9 step
/// 3), skipping any the bundle didn't carry an entry for.
fn build_addon_toggles(
    resolved: &std::collections::HashMap<String, nimbus_cd::HelmApplication>,
    labels: &std::collections::BTreeMap<String, String>,
    namespace: &str,
    workload: RemoteCluster,
    addons: &Addons,
) -> Vec<Arc<dyn Provisioner>> {
    let toggles: Vec<(&'static str, bool)> = vec![
        ("csi", addons.csi),
        ("metrics", addons.metrics),
        ("gpu-operator", addons.gpu_operator),
        ("ingress", addons.ingress),
        ("cert-manager", addons.cert_manager),
        ("file-storage", addons.file_storage),
        ("dashboard", addons.dashboard),
        ("prometheus", addons.prometheus),
        ("kubernetes-dashboard", addons.kubernetes_dashboard),
    ];

    toggles
        .into_iter()
        .filter_map(|(logical_name, enabled)| {
            let template = resolved.get(logical_name)?.clone();
            let app_labels = label_for(labels, logical_name);
            let namespace = namespace.to_string();
            let workload = workload.clone();
            let provisioner: Arc<dyn Provisioner> = Arc::new(addon_app(logical_name, template, app_labels, namespace, workload, move || enabled));
            Some(provisioner)
        })
        .collect()
}

#[async_trait::async_trait]
impl Unit for Cluster {
    const KIND: &'static str = "Cluster";

    fn status(&self) -> Option<&UnitStatus> {
        self.status.as_ref()
    }

    fn timeout(&self) -> Option<Duration> {
        self.spec.timeout_seconds.map(|s| Duration::from_secs(s as u64))
    }

    fn build_tree(&self, bundles: &dyn BundleProvider) -> Result<Box<dyn Provisioner>> {
        let namespace = self.namespace().unwrap_or_default();
        build(&self.name_any(), &namespace, &self.spec, bundles)
    }

    fn remote_for_gc(&self) -> Option<RemoteCluster> {
        let release_name = release_name(&self.spec.control_plane, &self.name_any());
        Some(workload_cluster(&self.spec, &self.name_any(), &release_name, identity(&self.spec, &self.name_any())))
    }

    async fn collect_orphans(&self, client: &kube::Client, namespace: &str) -> Result<()> {
        let expected: Vec<String> = self
            .spec
            .workload_pools
            .iter()
            .map(|pool: &WorkloadPool| pool.name.clone())
            .collect();
        let cluster_uid = self.uid().unwrap_or_default();
        gc::collect_orphans(client, namespace, &cluster_uid, &expected).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_name_is_deterministic_and_bounded() {
        let a = release_name("cp1", "c1");
        let b = release_name("cp1", "c1");
        assert_eq!(a, b);
        assert!(a.starts_with("cluster-"));
    }

    #[test]
    fn release_name_differs_across_clusters() {
        assert_ne!(release_name("cp1", "c1"), release_name("cp1", "c2"));
    }
}
