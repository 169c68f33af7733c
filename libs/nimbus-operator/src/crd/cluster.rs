use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::UnitStatus;

/// A workload cluster produced by cluster-api inside a `ControlPlane`'s virtual cluster (§3,
/// §4.9, §4.10). Namespaced inside its owning `ControlPlane`'s provisioned namespace.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "provisioning.nimbus.example.com",
    version = "v1alpha1",
    kind = "Cluster",
    plural = "clusters",
    singular = "cluster",
    shortname = "kc",
    namespaced,
    status = "UnitStatus",
    printcolumn = r#"{"name":"Available","type":"string","jsonPath":".status.conditions[?(@.type == 'Available')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#,
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub organization: String,
    pub project: String,
    pub control_plane: String,

    /// The `ApplicationBundle` (kind `Cluster`) this cluster resolves its add-ons against (§3,
    /// §4.4).
    pub bundle: String,

    #[serde(default)]
    pub workload_pools: Vec<WorkloadPool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaler: Option<AutoscalerSpec>,

    #[serde(default)]
    pub addons: Addons,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
}

/// One node pool rendered into a `MachineDeployment` by the cluster-api application (§4.10): the
/// pool-name annotation the orphan GC matches against is this `name`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadPool {
    pub name: String,
    pub replicas: u32,
    pub machine_flavor: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerSpec {
    pub min_replicas: u32,
    pub max_replicas: u32,
}

/// Predicates gating the rest of the cluster's add-ons (§4.9 step 3); each defaults to disabled
/// so an upgraded CRD with a new field never silently turns an add-on on for existing clusters.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Addons {
    #[serde(default)]
    pub csi: bool,
    #[serde(default)]
    pub metrics: bool,
    #[serde(default)]
    pub gpu_operator: bool,
    #[serde(default)]
    pub ingress: bool,
    #[serde(default)]
    pub cert_manager: bool,
    #[serde(default)]
    pub file_storage: bool,
    #[serde(default)]
    pub dashboard: bool,
    #[serde(default)]
    pub prometheus: bool,
    #[serde(default)]
    pub kubernetes_dashboard: bool,
}
