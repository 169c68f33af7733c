use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::UnitStatus;

/// A virtual cluster hosting cluster-api and cert-manager for one or more `Cluster`s below it
/// (§3, §4.9). Namespaced inside its owning `Project`'s provisioned namespace.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "provisioning.nimbus.example.com",
    version = "v1alpha1",
    kind = "ControlPlane",
    plural = "controlplanes",
    singular = "controlplane",
    shortname = "cp",
    namespaced,
    status = "UnitStatus",
    printcolumn = r#"{"name":"Available","type":"string","jsonPath":".status.conditions[?(@.type == 'Available')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#,
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneSpec {
    pub organization: String,
    pub project: String,

    /// The `ApplicationBundle` (kind `ControlPlane`) this control plane resolves its add-ons
    /// against (§3, §4.4).
    pub bundle: String,

    /// Rewrite of the virtual cluster's kubeconfig server address, when the in-secret server
    /// isn't reachable from outside the host cluster's pod network (§4.5
    /// `RemoteCluster::VirtualCluster::external_server`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_server: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
}
