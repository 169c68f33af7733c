use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::UnitStatus;

/// The root of the hierarchy (§3): one `Project` owns a namespace that scopes everything below
/// it. Carries no bundle reference — `BundleKind` only covers `ControlPlane` and `Cluster`.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "provisioning.nimbus.example.com",
    version = "v1alpha1",
    kind = "Project",
    plural = "projects",
    singular = "project",
    shortname = "proj",
    namespaced,
    status = "UnitStatus",
    printcolumn = r#"{"name":"Available","type":"string","jsonPath":".status.conditions[?(@.type == 'Available')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#,
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    /// The organization this project belongs to; carried as an identity label (§3, GLOSSARY) on
    /// every resource the project's descendants provision.
    pub organization: String,

    /// Bound on a single provision reconcile, in seconds (§5); the fixed 5-minute deprovision
    /// grace period is not configurable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
}
