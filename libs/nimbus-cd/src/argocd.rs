//! ArgoCD-backed [`CdDriver`]: Helm applications become ArgoCD `Application` custom resources,
//! cluster registrations become secrets labeled `argocd.argoproj.io/secret-type=cluster` (§4.3,
//! §6). ArgoCD ships no Rust types for its CRDs, so this talks to them through kube's dynamic
//! `Api<DynamicObject>`, the same approach the pack's operators use for out-of-tree CRDs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::cluster::{hex8, ClusterRegistration, Kubeconfig};
use crate::driver::{CdDriver, Outcome};
use crate::error::Error;
use crate::helm_application::{Health, HelmApplication};
use crate::identifier::ResourceIdentifier;

/// Label ArgoCD uses to recognize cluster-credential secrets.
pub const CLUSTER_SECRET_TYPE_LABEL: &str = "argocd.argoproj.io/secret-type";
/// Our own label carrying the hashed cluster identity, per §6.
pub const APPLICATION_ID_LABEL: &str = "application-id";
/// Generated Application names must stay at or under the legacy length limit ArgoCD enforces.
const MAX_GENERATED_NAME_LEN: usize = 63;
const GENERATE_SUFFIX_LEN: usize = 6;

fn application_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind {
        group: "argoproj.io".into(),
        version: "v1alpha1".into(),
        kind: "Application".into(),
    })
}

pub struct ArgoCdDriver {
    client: Client,
    /// Namespace ArgoCD (and its Application/cluster-secret resources) lives in.
    namespace: String,
}

impl ArgoCdDriver {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn applications(&self) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &application_resource())
    }

    fn secrets(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn find_by_identity(&self, id: &ResourceIdentifier) -> Result<Vec<DynamicObject>, Error> {
        let list = self
            .applications()
            .list(&id.list_params())
            .await
            .map_err(Error::Kube)?;
        Ok(list.items)
    }

    fn render_spec(app: &HelmApplication, id: &ResourceIdentifier) -> Value {
        let mut source = json!({
            "repoURL": app.repo_url,
            "targetRevision": app.version,
        });
        if let Some(chart) = &app.chart {
            source["chart"] = json!(chart);
        }
        if let Some(path) = &app.path {
            source["path"] = json!(path);
        }
        let mut helm = json!({});
        if !app.parameters.is_empty() {
            helm["parameters"] = json!(app
                .parameters
                .iter()
                .map(|(k, v)| json!({ "name": k, "value": v }))
                .collect::<Vec<_>>());
        }
        if !matches!(app.values, serde_yaml::Value::Null) {
            helm["values"] = json!(serde_yaml::to_string(&app.values).unwrap_or_default());
        }
        if helm.as_object().map(|o| !o.is_empty()).unwrap_or(false) {
            source["helm"] = helm;
        }

        let mut sync_policy = json!({});
        if app.create_namespace {
            sync_policy["syncOptions"] = json!(["CreateNamespace=true"]);
        }
        if app.server_side_apply {
            let existing = sync_policy["syncOptions"]
                .as_array()
                .cloned()
                .unwrap_or_default();
            let mut opts = existing;
            opts.push(json!("ServerSideApply=true"));
            sync_policy["syncOptions"] = json!(opts);
        }

        json!({
            "project": "default",
            "source": source,
            "destination": {
                "name": app.target_cluster,
                "namespace": app.target_namespace,
            },
            "syncPolicy": sync_policy,
            "ignoreDifferences": app
                .ignore_differences
                .iter()
                .map(|path| json!({ "group": "", "kind": "", "jsonPointers": [path] }))
                .collect::<Vec<_>>(),
        })
    }

    fn labels(id: &ResourceIdentifier) -> BTreeMap<String, String> {
        id.as_label_map()
    }

    fn generated_name(id: &ResourceIdentifier) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATE_SUFFIX_LEN)
            .map(char::from)
            .collect::<String>()
            .to_lowercase();
        let budget = MAX_GENERATED_NAME_LEN - GENERATE_SUFFIX_LEN - 1;
        let base: String = id.name.chars().take(budget).collect();
        format!("{base}-{suffix}")
    }

    fn health_of(obj: &DynamicObject) -> Health {
        obj.data
            .get("status")
            .and_then(|s| s.get("health"))
            .and_then(|h| h.get("status"))
            .and_then(Value::as_str)
            .map(|s| match s {
                "Healthy" => Health::Healthy,
                "Degraded" => Health::Degraded,
                "Progressing" => Health::Progressing,
                "Suspended" => Health::Suspended,
                "Missing" => Health::Missing,
                _ => Health::Unknown,
            })
            .unwrap_or(Health::Unknown)
    }
}

#[async_trait]
impl CdDriver for ArgoCdDriver {
    async fn create_or_update_helm_application(
        &self,
        id: &ResourceIdentifier,
        app: &HelmApplication,
    ) -> Outcome {
        let found = match self.find_by_identity(id).await {
            Ok(found) => found,
            Err(e) => return Outcome::Err(e),
        };

        let existing = match found.len() {
            0 => None,
            1 => Some(found.into_iter().next().expect("len checked")),
            count => {
                return Outcome::Err(Error::AmbiguousIdentity {
                    name: id.name.clone(),
                    count,
                })
            }
        };

        let spec = Self::render_spec(app, id);
        let object = match existing {
            None => {
                let name = app
                    .release_name
                    .clone()
                    .unwrap_or_else(|| Self::generated_name(id));
                let mut object = DynamicObject::new(&name, &application_resource());
                object.metadata.labels = Some(Self::labels(id));
                object.data["spec"] = spec;
                match self.applications().create(&PostParams::default(), &object).await {
                    Ok(created) => created,
                    Err(e) => return Outcome::Err(Error::Kube(e)),
                }
            }
            Some(mut object) => {
                object.metadata.labels = Some(Self::labels(id));
                object.data["spec"] = spec;
                let name = object.name_any();
                match self
                    .applications()
                    .patch(&name, &PatchParams::apply("nimbus-cd").force(), &Patch::Apply(&object))
                    .await
                {
                    Ok(patched) => patched,
                    Err(e) => return Outcome::Err(Error::Kube(e)),
                }
            }
        };

        let health = Self::health_of(&object);
        debug!(application = %object.name_any(), ?health, "evaluated application health");
        if health.satisfies(app.allow_degraded) {
            Outcome::Ok
        } else {
            Outcome::Yield
        }
    }

    async fn delete_helm_application(
        &self,
        id: &ResourceIdentifier,
        background_delete: bool,
    ) -> Outcome {
        let found = match self.find_by_identity(id).await {
            Ok(found) => found,
            Err(e) => return Outcome::Err(e),
        };
        let object = match found.len() {
            0 => return Outcome::Ok,
            1 => found.into_iter().next().expect("len checked"),
            count => {
                return Outcome::Err(Error::AmbiguousIdentity {
                    name: id.name.clone(),
                    count,
                })
            }
        };

        if object.meta().deletion_timestamp.is_some() {
            return if background_delete {
                Outcome::Ok
            } else {
                Outcome::Yield
            };
        }

        let name = object.name_any();
        // Force cascading deletion of child resources and clear the automated-sync policy so
        // ArgoCD doesn't race a sync against the delete (§4.3, §9 open question on orphan
        // finalizers).
        let patch = json!({
            "metadata": { "finalizers": ["resources-finalizer.argocd.argoproj.io"] },
            "spec": { "syncPolicy": null },
        });
        if let Err(e) = self
            .applications()
            .patch(
                &name,
                &PatchParams::apply("nimbus-cd").force(),
                &Patch::Merge(&patch),
            )
            .await
        {
            return Outcome::Err(Error::Kube(e));
        }

        if let Err(e) = self.applications().delete(&name, &Default::default()).await {
            if !matches!(&e, kube::Error::Api(err) if err.code == 404) {
                return Outcome::Err(Error::Kube(e));
            }
        }

        if background_delete {
            Outcome::Ok
        } else {
            Outcome::Yield
        }
    }

    async fn create_or_update_cluster(
        &self,
        id: &ResourceIdentifier,
        kubeconfig: &Kubeconfig,
    ) -> Outcome {
        let registration = ClusterRegistration::from_kubeconfig(kubeconfig, Self::labels(id));
        let secret_name = registration.secret_name();

        let already_registered = self.secrets().get_opt(&secret_name).await;
        let exists = match already_registered {
            Ok(existing) => existing.is_some(),
            Err(e) => return Outcome::Err(Error::Kube(e)),
        };

        if !exists {
            if let Err(e) = probe_reachable(&kubeconfig.server).await {
                warn!(server = %kubeconfig.server, error = %e, "remote cluster not yet reachable");
                return Outcome::Yield;
            }
        }

        let mut labels = registration.labels.clone();
        labels.insert(CLUSTER_SECRET_TYPE_LABEL.to_string(), "cluster".to_string());
        labels.insert(
            APPLICATION_ID_LABEL.to_string(),
            format!("cluster-{}", hex8(id.name.as_bytes())),
        );

        let data = BTreeMap::from([
            ("name".to_string(), id.cluster_destination_name()),
            ("server".to_string(), registration.server.clone()),
            (
                "config".to_string(),
                serde_json::to_string(&json!({
                    "tlsClientConfig": {
                        "caData": base64::engine::general_purpose::STANDARD.encode(&registration.ca_data),
                        "certData": base64::engine::general_purpose::STANDARD.encode(&registration.client_cert_data),
                        "keyData": base64::engine::general_purpose::STANDARD.encode(&registration.client_key_data),
                    }
                }))
                .unwrap_or_default(),
            ),
        ]);

        let secret = Secret {
            metadata: kube::api::ObjectMeta {
                name: Some(secret_name.clone()),
                labels: Some(labels),
                ..Default::default()
            },
            string_data: Some(data),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };

        let result = self
            .secrets()
            .patch(
                &secret_name,
                &PatchParams::apply("nimbus-cd").force(),
                &Patch::Apply(&secret),
            )
            .await;

        match result {
            Ok(_) => Outcome::Ok,
            Err(e) => Outcome::Err(Error::Kube(e)),
        }
    }

    async fn delete_cluster(&self, id: &ResourceIdentifier) -> Outcome {
        let secret_name = format!("cluster-{}", hex8(id.name.as_bytes()));
        match self
            .secrets()
            .list(
                &kube::api::ListParams::default()
                    .labels(&format!("{APPLICATION_ID_LABEL}={secret_name}")),
            )
            .await
        {
            Ok(list) if list.items.is_empty() => Outcome::Ok,
            Ok(list) => {
                for secret in list.items {
                    let name = secret.name_any();
                    if let Err(e) = self.secrets().delete(&name, &Default::default()).await {
                        if !matches!(&e, kube::Error::Api(err) if err.code == 404) {
                            return Outcome::Err(Error::Kube(e));
                        }
                    }
                }
                Outcome::Ok
            }
            Err(e) => Outcome::Err(Error::Kube(e)),
        }
    }
}

/// Probes whether a remote API server is reachable, distinguishing a transient failure (worth
/// yielding on) from anything else the caller should surface (§4.3, §7).
async fn probe_reachable(server: &str) -> Result<(), Error> {
    let config = kube::Config::new(server.parse().map_err(|_| {
        Error::ProbeFailed(format!("invalid server URL: {server}"))
    })?);
    let client = Client::try_from(config).map_err(Error::Kube)?;
    client
        .apiserver_version()
        .await
        .map(|_| ())
        .map_err(|e| Error::ProbeFailed(e.to_string()))
}

use base64::Engine as _;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_name_never_exceeds_legacy_limit() {
        let id = ResourceIdentifier::new("a".repeat(100));
        let name = ArgoCdDriver::generated_name(&id);
        assert!(name.len() <= MAX_GENERATED_NAME_LEN);
    }

    #[test]
    fn health_maps_known_strings() {
        let mut obj = DynamicObject::new("x", &application_resource());
        obj.data["status"] = json!({ "health": { "status": "Degraded" } });
        assert_eq!(ArgoCdDriver::health_of(&obj), Health::Degraded);
    }

    #[test]
    fn health_defaults_to_unknown_when_absent() {
        let obj = DynamicObject::new("x", &application_resource());
        assert_eq!(ArgoCdDriver::health_of(&obj), Health::Unknown);
    }
}
