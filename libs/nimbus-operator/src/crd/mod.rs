//! The three unit kinds (§3, §4.11): `Project` → `ControlPlane` → `Cluster`, each a
//! `kube::CustomResource` in `provisioning.nimbus.example.com/v1alpha1`, namespaced, with a
//! `status` subresource. Attribute shape grounded on the upstream `kaniop` Kanidm CRD
//! (`#[kube(group, version, kind, ..., printcolumn, derive = "Default")]`); the status conditions
//! list reuses `k8s_openapi`'s `Condition` rather than a hand-rolled struct, the same way
//! `kaniop`'s `KanidmStatus` and `stackabletech-operator-rs`'s `status.rs` do.

pub mod cluster;
pub mod control_plane;
pub mod project;

pub use cluster::{Cluster, ClusterSpec};
pub use control_plane::{ControlPlane, ControlPlaneSpec};
pub use project::{Project, ProjectSpec};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::Conditions;

pub const GROUP: &str = "provisioning.nimbus.example.com";
pub const VERSION: &str = "v1alpha1";

/// Shared status shape for all three unit kinds (§3 "ProvisionerStatus"): the `Available`
/// condition plus the namespace the unit ended up provisioning. One type rather than three
/// near-identical ones, so the reconciler's condition logic (§4.8) runs against a single status
/// type regardless of which unit kind it was called for.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnitStatus {
    /// The namespace this unit provisioned for its children, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Conditions for UnitStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

/// The system finalizer attached to every unit on first reconcile (§4.8), named the way the
/// corpus scopes finalizers to its own API group (e.g. `ph.io/finalizer`).
pub const FINALIZER: &str = "provisioning.nimbus.example.com/finalizer";
