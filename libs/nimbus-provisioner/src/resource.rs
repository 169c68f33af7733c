//! Create-or-patch / delete of one plain Kubernetes object against the in-scope target cluster
//! (§4.2) — the generic leaf Project/ControlPlane composers use for namespaces, and the orphan GC
//! (§4.10) reuses for deletes. Goes through `kube`'s dynamic `Api<DynamicObject>` so it works for
//! any kind without a typed Rust struct, the same approach `nimbus-cd`'s ArgoCD driver uses for
//! out-of-tree CRDs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams, PostParams};
use kube::{Resource, ResourceExt};
use nimbus_outcome::ValueOutcome;
use serde_json::Value;
use tracing::debug;

use crate::ctx::ProvisionCtx;
use crate::error::Error;
use crate::provisioner::{Outcome, Provisioner};

/// Either a stable name, or a generate-name base resolved by listing on `labels` first (§4.2).
#[derive(Debug, Clone)]
pub enum ObjectName {
    Fixed(String),
    Generated { base: String },
}

/// The target object description §4.2 names: kind, name-or-generate-name, namespace, labels,
/// body.
pub struct ResourceProvisioner {
    display_name: String,
    api_resource: ApiResource,
    name: ObjectName,
    /// `None` for cluster-scoped kinds (e.g. `Namespace` itself).
    namespace: Option<String>,
    labels: BTreeMap<String, String>,
    body: Value,
}

impl ResourceProvisioner {
    pub fn new(
        display_name: impl Into<String>,
        api_resource: ApiResource,
        name: ObjectName,
        namespace: Option<String>,
        labels: BTreeMap<String, String>,
        body: Value,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            api_resource,
            name,
            namespace,
            labels,
            body,
        }
    }

    fn api(&self, client: &kube::Client) -> Api<DynamicObject> {
        match &self.namespace {
            Some(ns) => Api::namespaced_with(client.clone(), ns, &self.api_resource),
            None => Api::all_with(client.clone(), &self.api_resource),
        }
    }

    fn label_selector(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    async fn find_existing(&self, api: &Api<DynamicObject>) -> Result<Option<DynamicObject>, Error> {
        match &self.name {
            ObjectName::Fixed(name) => match api.get_opt(name).await.map_err(Error::Kube)? {
                Some(obj) => Ok(Some(obj)),
                None => Ok(None),
            },
            ObjectName::Generated { .. } => {
                let selector = self.label_selector();
                let list = api
                    .list(&kube::api::ListParams::default().labels(&selector))
                    .await
                    .map_err(Error::Kube)?;
                match list.items.len() {
                    0 => Ok(None),
                    1 => Ok(Some(list.items.into_iter().next().expect("len checked"))),
                    count => Err(Error::AmbiguousIdentity {
                        kind: self.api_resource.kind.clone(),
                        name: self.display_name.clone(),
                        count,
                    }),
                }
            }
        }
    }

    async fn client(&self, ctx: &ProvisionCtx) -> ValueOutcome<kube::Client, Error> {
        ctx.target_client().await
    }
}

#[async_trait]
impl Provisioner for ResourceProvisioner {
    async fn provision(&self, ctx: &ProvisionCtx) -> Outcome {
        let client = match self.client(ctx).await {
            ValueOutcome::Ok(client) => client,
            ValueOutcome::Yield => return Outcome::Yield,
            ValueOutcome::Err(e) => return Outcome::Err(e),
        };
        let api = self.api(&client);

        let existing = match self.find_existing(&api).await {
            Ok(existing) => existing,
            Err(e) => return Outcome::Err(e),
        };

        match existing {
            None => {
                let mut object = match &self.name {
                    ObjectName::Fixed(name) => DynamicObject::new(name, &self.api_resource),
                    ObjectName::Generated { base } => {
                        let mut object = DynamicObject::new("", &self.api_resource);
                        object.metadata.name = None;
                        object.metadata.generate_name = Some(format!("{base}-"));
                        object
                    }
                };
                object.metadata.labels = Some(self.labels.clone());
                merge_body(&mut object.data, &self.body);

                match api.create(&PostParams::default(), &object).await {
                    Ok(_) => Outcome::Ok,
                    // The caller intended idempotent creation; a racing create is success (§4.2).
                    Err(kube::Error::Api(err)) if err.code == 409 => Outcome::Ok,
                    Err(e) => Outcome::Err(Error::Kube(e)),
                }
            }
            Some(mut object) => {
                object.metadata.labels = Some(self.labels.clone());
                merge_body(&mut object.data, &self.body);
                let name = object.name_any();
                match api
                    .patch(&name, &PatchParams::apply("nimbus-provisioner").force(), &Patch::Apply(&object))
                    .await
                {
                    Ok(_) => Outcome::Ok,
                    Err(e) => Outcome::Err(Error::Kube(e)),
                }
            }
        }
    }

    async fn deprovision(&self, ctx: &ProvisionCtx) -> Outcome {
        let client = match self.client(ctx).await {
            ValueOutcome::Ok(client) => client,
            ValueOutcome::Yield => return Outcome::Yield,
            ValueOutcome::Err(e) => return Outcome::Err(e),
        };
        let api = self.api(&client);

        let existing = match self.find_existing(&api).await {
            Ok(existing) => existing,
            Err(e) => return Outcome::Err(e),
        };
        let Some(object) = existing else {
            return Outcome::Ok;
        };

        if object.meta().deletion_timestamp.is_some() {
            return if ctx.background_delete() { Outcome::Ok } else { Outcome::Yield };
        }

        let name = object.name_any();
        debug!(kind = %self.api_resource.kind, name, "deleting resource");
        if let Err(e) = api.delete(&name, &Default::default()).await {
            if !matches!(&e, kube::Error::Api(err) if err.code == 404) {
                return Outcome::Err(Error::Kube(e));
            }
        }

        if ctx.background_delete() {
            Outcome::Ok
        } else {
            Outcome::Yield
        }
    }

    fn name(&self) -> &str {
        &self.display_name
    }
}

/// Shallow-merges `body`'s top-level fields (typically `spec`) into `target`, leaving
/// `apiVersion`/`kind`/`metadata` — which the caller sets separately — untouched.
fn merge_body(target: &mut Value, body: &Value) {
    let (Some(target_obj), Some(body_obj)) = (target.as_object_mut(), body.as_object()) else {
        return;
    };
    for (key, value) in body_obj {
        target_obj.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::GroupVersionKind;
    use serde_json::json;

    fn namespace_resource() -> ApiResource {
        ApiResource::from_gvk(&GroupVersionKind {
            group: "".into(),
            version: "v1".into(),
            kind: "Namespace".into(),
        })
    }

    #[test]
    fn merge_body_preserves_metadata() {
        let mut target = json!({ "metadata": { "name": "x" } });
        merge_body(&mut target, &json!({ "spec": { "finalizers": ["kubernetes"] } }));
        assert_eq!(target["metadata"]["name"], "x");
        assert_eq!(target["spec"]["finalizers"][0], "kubernetes");
    }

    #[test]
    fn label_selector_is_sorted() {
        let mut labels = BTreeMap::new();
        labels.insert("project".to_string(), "payments".to_string());
        labels.insert("organization".to_string(), "acme".to_string());
        let provisioner = ResourceProvisioner::new(
            "project-namespace",
            namespace_resource(),
            ObjectName::Fixed("payments".into()),
            None,
            labels,
            json!({}),
        );
        assert_eq!(provisioner.label_selector(), "organization=acme,project=payments");
    }
}
