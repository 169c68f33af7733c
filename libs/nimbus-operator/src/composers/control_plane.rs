//! §4.9 ControlPlane composer: a namespace for the virtual cluster, the vcluster application
//! itself (installed against the host), the vcluster's registration as a remote, and inside it,
//! cert-manager and cluster-api installed concurrently.

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use nimbus_bundle::{unbundle, BundleKind, BundleProvider, BundleRequest};
use nimbus_provisioner::{ApplicationProvisioner, Concurrent, ObjectName, OnRemote, Provisioner, RemoteClusterProvisioner, ResourceProvisioner, Serial};
use nimbus_remote::{IdentityLabels, RemoteCluster};
use serde_json::json;

use super::{identity_label_map, namespace_api_resource};
use crate::crd::{ControlPlane, ControlPlaneSpec, UnitStatus};
use crate::error::{Error, Result};
use crate::reconcile::Unit;

/// `controlplane-<name>` (Open Question resolution, see DESIGN.md): the namespace this control
/// plane provisions for its own virtual cluster and add-ons, distinct from the namespace the
/// `ControlPlane` object itself lives in (its owning `Project`'s namespace).
pub fn namespace_name(control_plane_name: &str) -> String {
    format!("controlplane-{control_plane_name}")
}

fn identity(spec: &ControlPlaneSpec, name: &str) -> IdentityLabels {
    IdentityLabels {
        organization: spec.organization.clone(),
        project: spec.project.clone(),
        control_plane: Some(name.to_string()),
        cluster: None,
    }
}

/// The virtual cluster this control plane registers as a remote, reconstructible from either a
/// `ControlPlane`'s own spec or (for the `Cluster` composer, which needs to target the same
/// vcluster) from a `Cluster`'s parent reference.
pub fn virtual_cluster(
    control_plane_name: &str,
    external_server: Option<String>,
    identity: IdentityLabels,
) -> RemoteCluster {
    RemoteCluster::VirtualCluster {
        host_namespace: namespace_name(control_plane_name),
        control_plane_name: control_plane_name.to_string(),
        external_server,
        identity,
    }
}

pub fn build(name: &str, spec: &ControlPlaneSpec, bundles: &dyn BundleProvider) -> Result<Box<dyn Provisioner>> {
    let identity = identity(spec, name);
    let labels = identity_label_map(&identity);
    let own_namespace = namespace_name(name);

    let bundle = bundles
        .get(&spec.bundle)
        .ok_or_else(|| Error::MissingBundle(spec.bundle.clone()))?;
    let resolved = unbundle(
        &bundle,
        BundleKind::ControlPlane,
        &[
            BundleRequest::required("vcluster"),
            BundleRequest::required("cert-manager"),
            BundleRequest::required("cluster-api"),
        ],
    )?;

    let vcluster_template = resolved["vcluster"].clone();
    let cert_manager_template = resolved["cert-manager"].clone();
    let cluster_api_template = resolved["cluster-api"].clone();

    let namespace_provisioner = ResourceProvisioner::new(
        "namespace",
        namespace_api_resource(),
        ObjectName::Fixed(own_namespace.clone()),
        None,
        labels.clone(),
        json!({}),
    );

    let vcluster_namespace = own_namespace.clone();
    let vcluster_app = ApplicationProvisioner::new("vcluster", labels.clone(), move || {
        vcluster_template.clone().with_namespace(vcluster_namespace.clone())
    });

    let remote = virtual_cluster(name, spec.external_server.clone(), identity.clone());

    let mut cert_manager_labels = labels.clone();
    cert_manager_labels.insert("application".to_string(), "cert-manager".to_string());
    let cert_manager_app = ApplicationProvisioner::new("cert-manager", cert_manager_labels, move || {
        cert_manager_template.clone().with_namespace("cert-manager")
    });

    let mut cluster_api_labels = labels.clone();
    cluster_api_labels.insert("application".to_string(), "cluster-api".to_string());
    let cluster_api_app = ApplicationProvisioner::new("cluster-api", cluster_api_labels, move || {
        cluster_api_template.clone().with_namespace("cluster-api-system")
    });

    let addons: Vec<Arc<dyn Provisioner>> = vec![Arc::new(cert_manager_app), Arc::new(cluster_api_app)];

    let tree = Serial::new(
        "control-plane",
        vec![
            Box::new(namespace_provisioner),
            Box::new(vcluster_app),
            Box::new(RemoteClusterProvisioner::new(remote.clone())),
            Box::new(OnRemote::new(remote, Concurrent::new("control-plane-addons", addons))),
        ],
    );

    Ok(Box::new(tree))
}

#[async_trait::async_trait]
impl Unit for ControlPlane {
    const KIND: &'static str = "ControlPlane";

    fn status(&self) -> Option<&UnitStatus> {
        self.status.as_ref()
    }

    fn timeout(&self) -> Option<Duration> {
        self.spec.timeout_seconds.map(|s| Duration::from_secs(s as u64))
    }

    fn build_tree(&self, bundles: &dyn BundleProvider) -> Result<Box<dyn Provisioner>> {
        build(&self.name_any(), &self.spec, bundles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_name_is_prefixed() {
        assert_eq!(namespace_name("payments-cp"), "controlplane-payments-cp");
    }

    #[test]
    fn virtual_cluster_is_named_for_its_control_plane() {
        let remote = virtual_cluster("cp1", None, IdentityLabels::default());
        assert_eq!(remote.id().name, "vcluster");
    }
}
