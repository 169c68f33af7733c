//! Unit-specific provisioner trees (§4.9): one pure function per unit kind, turning a unit's spec
//! and resolved bundle into a `Box<dyn Provisioner>`. None of these functions talk to the
//! Kubernetes API or the CD driver themselves — that only happens once the reconciler drives the
//! returned tree with a `ProvisionCtx`.

pub mod cluster;
pub mod control_plane;
pub mod project;

use std::collections::BTreeMap;

use nimbus_remote::IdentityLabels;

/// Rebuilds the label map `nimbus_remote::IdentityLabels` would produce, since that type keeps
/// its own `as_label_map` private to its crate (§3, GLOSSARY).
pub(crate) fn identity_label_map(identity: &IdentityLabels) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("organization".to_string(), identity.organization.clone());
    labels.insert("project".to_string(), identity.project.clone());
    if let Some(cp) = &identity.control_plane {
        labels.insert("control-plane".to_string(), cp.clone());
    }
    if let Some(cluster) = &identity.cluster {
        labels.insert("cluster".to_string(), cluster.clone());
    }
    labels
}

pub(crate) fn namespace_api_resource() -> kube::api::ApiResource {
    kube::api::ApiResource::from_gvk(&kube::api::GroupVersionKind {
        group: String::new(),
        version: "v1".to_string(),
        kind: "Namespace".to_string(),
    })
}
