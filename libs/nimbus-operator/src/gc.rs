//! Workload-pool orphan GC (§4.10): the CD-driver-managed cluster-api chart owns
//! `MachineDeployment`s it renders from `spec.workloadPools`, but a pool removed from the spec is
//! never deleted by the CD driver — it just stops being rendered. This walks the owned
//! `MachineDeployment`s, finds the ones whose pool-name annotation isn't in the expected set, and
//! deletes them along with the `KubeadmConfigTemplate`/`OpenStackMachineTemplate` they reference.

use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams};
use kube::core::ObjectMeta;

use crate::error::Result;

const POOL_NAME_ANNOTATION: &str = "provisioning.nimbus.example.com/pool-name";
const CLUSTER_API_GROUP: &str = "cluster.x-k8s.io";
const CLUSTER_API_VERSION: &str = "v1beta1";
const BOOTSTRAP_GROUP: &str = "bootstrap.cluster.x-k8s.io";
const INFRA_GROUP: &str = "infrastructure.cluster.x-k8s.io";

fn machine_deployment_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind {
        group: CLUSTER_API_GROUP.to_string(),
        version: CLUSTER_API_VERSION.to_string(),
        kind: "MachineDeployment".to_string(),
    })
}

fn kubeadm_config_template_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind {
        group: BOOTSTRAP_GROUP.to_string(),
        version: CLUSTER_API_VERSION.to_string(),
        kind: "KubeadmConfigTemplate".to_string(),
    })
}

fn openstack_machine_template_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind {
        group: INFRA_GROUP.to_string(),
        version: "v1alpha7".to_string(),
        kind: "OpenStackMachineTemplate".to_string(),
    })
}

fn owned_by(meta: &ObjectMeta, cluster_uid: &str) -> bool {
    meta.owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.uid == cluster_uid))
}

fn config_ref_name(deployment: &DynamicObject, pointer: &str) -> Option<String> {
    deployment
        .data
        .pointer(pointer)
        .and_then(|v| v.get("name"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Deletes `MachineDeployment`s owned by `cluster_uid` whose pool-name annotation is not in
/// `expected_pools` (§4.10 steps 1-2), then separately enumerates the `KubeadmConfigTemplate`/
/// `OpenStackMachineTemplate` the *surviving* deployments reference and deletes any owned object
/// of those kinds whose name falls outside that expected set (§4.10 steps 3-4) — a template can
/// be orphaned on its own even when its deployment is already gone, so it must be collected by
/// listing the template kind directly rather than only by walking orphaned deployments' refs.
pub async fn collect_orphans(
    client: &kube::Client,
    namespace: &str,
    cluster_uid: &str,
    expected_pools: &[String],
) -> Result<()> {
    let deployments: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), namespace, &machine_deployment_resource());
    let kubeadm_templates: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), namespace, &kubeadm_config_template_resource());
    let machine_templates: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), namespace, &openstack_machine_template_resource());

    let list = deployments.list(&ListParams::default()).await?;

    let mut expected_bootstrap_names = std::collections::HashSet::new();
    let mut expected_infra_names = std::collections::HashSet::new();

    for deployment in &list.items {
        if !owned_by(&deployment.metadata, cluster_uid) {
            continue;
        }

        let pool_name = deployment
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(POOL_NAME_ANNOTATION));
        let orphaned = match pool_name {
            Some(name) => !expected_pools.iter().any(|p| p == name),
            None => false,
        };

        let bootstrap_name = config_ref_name(deployment, "/spec/template/spec/bootstrap/configRef");
        let infra_name = config_ref_name(deployment, "/spec/template/spec/infrastructureRef");

        if orphaned {
            let name = deployment.metadata.name.clone().unwrap_or_default();
            deployments.delete(&name, &DeleteParams::default()).await?;
        } else {
            expected_bootstrap_names.extend(bootstrap_name);
            expected_infra_names.extend(infra_name);
        }
    }

    let kubeadm_list = kubeadm_templates.list(&ListParams::default()).await?;
    for template in kubeadm_list.items {
        if !owned_by(&template.metadata, cluster_uid) {
            continue;
        }
        let name = template.metadata.name.clone().unwrap_or_default();
        if !expected_bootstrap_names.contains(&name) {
            kubeadm_templates.delete(&name, &DeleteParams::default()).await?;
        }
    }

    let machine_list = machine_templates.list(&ListParams::default()).await?;
    for template in machine_list.items {
        if !owned_by(&template.metadata, cluster_uid) {
            continue;
        }
        let name = template.metadata.name.clone().unwrap_or_default();
        if !expected_infra_names.contains(&name) {
            machine_templates.delete(&name, &DeleteParams::default()).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment(name: &str, cluster_uid: &str, pool_name: Option<&str>) -> DynamicObject {
        let mut obj = DynamicObject::new(name, &machine_deployment_resource());
        obj.metadata.owner_references = Some(vec![k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
            uid: cluster_uid.to_string(),
            name: "cluster1".to_string(),
            kind: "Cluster".to_string(),
            api_version: "provisioning.nimbus.example.com/v1alpha1".to_string(),
            ..Default::default()
        }]);
        if let Some(pool) = pool_name {
            let mut annotations = std::collections::BTreeMap::new();
            annotations.insert(POOL_NAME_ANNOTATION.to_string(), pool.to_string());
            obj.metadata.annotations = Some(annotations);
        }
        obj.data = json!({
            "spec": {
                "template": {
                    "spec": {
                        "bootstrap": {"configRef": {"name": format!("{name}-bootstrap")}},
                        "infrastructureRef": {"name": format!("{name}-infra")}
                    }
                }
            }
        });
        obj
    }

    #[test]
    fn orphan_detection_matches_missing_pool() {
        let d = deployment("pool-b", "uid-1", Some("pool-b"));
        let expected = vec!["pool-a".to_string()];
        let pool_name = d.metadata.annotations.as_ref().and_then(|a| a.get(POOL_NAME_ANNOTATION)).unwrap();
        assert!(!expected.iter().any(|p| p == pool_name));
    }

    #[test]
    fn owned_by_matches_uid() {
        let d = deployment("pool-a", "uid-1", Some("pool-a"));
        assert!(owned_by(&d.metadata, "uid-1"));
        assert!(!owned_by(&d.metadata, "uid-2"));
    }

    #[test]
    fn config_ref_name_follows_pointer() {
        let d = deployment("pool-a", "uid-1", Some("pool-a"));
        assert_eq!(config_ref_name(&d, "/spec/template/spec/bootstrap/configRef"), Some("pool-a-bootstrap".to_string()));
        assert_eq!(config_ref_name(&d, "/spec/template/spec/infrastructureRef"), Some("pool-a-infra".to_string()));
    }

    /// A template whose own deployment has already been deleted is still collected: the expected
    /// set is built only from *surviving* deployments, so a template with no matching survivor
    /// falls outside it regardless of whether its deployment is orphaned or simply gone.
    #[test]
    fn template_with_no_surviving_deployment_is_outside_expected_set() {
        let surviving = deployment("pool-a", "uid-1", Some("pool-a"));
        let expected_bootstrap: std::collections::HashSet<String> =
            [config_ref_name(&surviving, "/spec/template/spec/bootstrap/configRef").unwrap()].into();

        assert!(expected_bootstrap.contains("pool-a-bootstrap"));
        assert!(!expected_bootstrap.contains("pool-b-bootstrap"));
    }
}
