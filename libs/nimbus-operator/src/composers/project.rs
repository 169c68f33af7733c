//! §4.9 Project composer: a single namespace scoping everything the project owns, labeled so its
//! descendants' namespaces can be discovered by selector. Deleted (and waited on) on deprovision.

use std::time::Duration;

use kube::ResourceExt;
use nimbus_provisioner::{ObjectName, Provisioner, ResourceProvisioner};
use serde_json::json;

use super::{identity_label_map, namespace_api_resource};
use crate::crd::{Project, ProjectSpec, UnitStatus};
use crate::error::Result;
use crate::reconcile::Unit;

/// `project-<name>` (Open Question resolution, see DESIGN.md): namespaces are flat in Kubernetes,
/// so the hierarchy the spec describes is expressed entirely through this naming convention plus
/// the identity labels every descendant resource carries.
pub fn namespace_name(project_name: &str) -> String {
    format!("project-{project_name}")
}

pub fn build(name: &str, spec: &ProjectSpec) -> Box<dyn Provisioner> {
    let identity = nimbus_remote::IdentityLabels {
        organization: spec.organization.clone(),
        project: name.to_string(),
        control_plane: None,
        cluster: None,
    };

    Box::new(ResourceProvisioner::new(
        "namespace",
        namespace_api_resource(),
        ObjectName::Fixed(namespace_name(name)),
        None,
        identity_label_map(&identity),
        json!({}),
    ))
}

#[async_trait::async_trait]
impl Unit for Project {
    const KIND: &'static str = "Project";

    fn status(&self) -> Option<&UnitStatus> {
        self.status.as_ref()
    }

    fn timeout(&self) -> Option<Duration> {
        self.spec.timeout_seconds.map(|s| Duration::from_secs(s as u64))
    }

    fn build_tree(&self, _bundles: &dyn nimbus_bundle::BundleProvider) -> Result<Box<dyn Provisioner>> {
        Ok(build(&self.name_any(), &self.spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_name_is_prefixed() {
        assert_eq!(namespace_name("payments"), "project-payments");
    }
}
