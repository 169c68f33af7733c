//! Split-brain upgrade migrations (§4.8): on controller start, walk existing objects of each unit
//! kind and apply version-gated metadata-only migrations. A migration never touches `spec` — only
//! annotations — so it can't race a concurrent reconcile's own spec-driven provisioning, and an
//! object already at or past a migration's version is left untouched.

use std::collections::BTreeMap;

use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::core::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::crd::ControlPlane;
use crate::error::Result;

/// Records which migration generation an object has already received.
pub const MIGRATED_ANNOTATION: &str = "provisioning.nimbus.example.com/migrated-version";

/// One version-gated, metadata-only change. `version` must increase monotonically within a unit
/// kind; `apply` returns the annotations to merge in, or `None` if this particular object needs no
/// change from this migration.
pub trait Migration<U>: Send + Sync {
    fn version(&self) -> u32;
    fn apply(&self, unit: &U) -> Option<BTreeMap<String, String>>;
}

fn migrated_version(meta: &ObjectMeta) -> u32 {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(MIGRATED_ANNOTATION))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Applies every migration in `migrations` (in ascending `version()`) to every object of `U`,
/// across every namespace, that hasn't already reached that version. Run once at controller
/// startup, before the watch loop starts (§4.8).
pub async fn run<U>(client: &kube::Client, migrations: &[Box<dyn Migration<U>>]) -> Result<()>
where
    U: Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    if migrations.is_empty() {
        return Ok(());
    }

    let api: Api<U> = Api::all(client.clone());
    let list = api.list(&ListParams::default()).await?;

    for unit in list.items {
        let current = migrated_version(unit.meta());
        let Some(namespace) = unit.namespace() else {
            continue;
        };
        let name = unit.name_any();
        let namespaced: Api<U> = Api::namespaced(client.clone(), &namespace);

        let mut highest = current;
        let mut merged_annotations = BTreeMap::new();
        for migration in migrations.iter().filter(|m| m.version() > current) {
            if let Some(annotations) = migration.apply(&unit) {
                merged_annotations.extend(annotations);
            }
            highest = highest.max(migration.version());
        }

        if highest == current {
            continue;
        }
        merged_annotations.insert(MIGRATED_ANNOTATION.to_string(), highest.to_string());

        let patch = serde_json::json!({ "metadata": { "annotations": merged_annotations } });
        match namespaced.patch(&name, &PatchParams::default(), &Patch::Merge(&patch)).await {
            Ok(_) => info!(unit = %name, version = highest, "applied split-brain migration"),
            Err(e) => warn!(unit = %name, error = %e, "split-brain migration failed"),
        }
    }

    Ok(())
}

/// Pins the legacy `vc-<name>` secret name onto every pre-existing `ControlPlane` so a future
/// rename of the vcluster secret convention doesn't strand objects reconciled before the rename
/// shipped. Version 1: the only migration this operator currently carries.
pub struct PinLegacyVclusterSecretName;

impl Migration<ControlPlane> for PinLegacyVclusterSecretName {
    fn version(&self) -> u32 {
        1
    }

    fn apply(&self, unit: &ControlPlane) -> Option<BTreeMap<String, String>> {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            "provisioning.nimbus.example.com/legacy-vcluster-secret".to_string(),
            format!("vc-{}", unit.name_any()),
        );
        Some(annotations)
    }
}

/// The migrations this operator applies to `ControlPlane` objects on startup.
pub fn control_plane_migrations() -> Vec<Box<dyn Migration<ControlPlane>>> {
    vec![Box::new(PinLegacyVclusterSecretName)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control_plane(name: &str) -> ControlPlane {
        let mut cp = ControlPlane::new(
            name,
            crate::crd::ControlPlaneSpec {
                organization: "acme".to_string(),
                project: "payments".to_string(),
                bundle: "default".to_string(),
                external_server: None,
                timeout_seconds: None,
            },
        );
        cp.metadata.namespace = Some("project-payments".to_string());
        cp
    }

    #[test]
    fn migrated_version_defaults_to_zero() {
        let cp = control_plane("cp1");
        assert_eq!(migrated_version(&cp.metadata), 0);
    }

    #[test]
    fn migrated_version_reads_existing_annotation() {
        let mut cp = control_plane("cp1");
        let mut annotations = BTreeMap::new();
        annotations.insert(MIGRATED_ANNOTATION.to_string(), "1".to_string());
        cp.metadata.annotations = Some(annotations);
        assert_eq!(migrated_version(&cp.metadata), 1);
    }

    #[test]
    fn pin_legacy_secret_name_produces_expected_annotation() {
        let cp = control_plane("cp1");
        let annotations = PinLegacyVclusterSecretName.apply(&cp).unwrap();
        assert_eq!(
            annotations.get("provisioning.nimbus.example.com/legacy-vcluster-secret"),
            Some(&"vc-cp1".to_string())
        );
    }
}
