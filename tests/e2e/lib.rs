#[cfg(all(test, feature = "e2e-tests"))]
mod test {
    use std::time::Duration;

    use k8s_openapi::api::core::v1::Namespace;
    use kube::api::{Api, Patch, PatchParams, PostParams};
    use kube::client::Client;
    use kube::runtime::wait::{await_condition, conditions, Condition};
    use kube::ResourceExt;
    use nimbus_operator::crd::{Project, ProjectSpec};
    use tokio::time::timeout;

    fn is_available() -> impl Condition<Project> {
        |obj: Option<&Project>| {
            obj.and_then(|p| p.status.as_ref())
                .map(|s| s.conditions.iter().any(|c| c.type_ == "Available" && c.status == "True"))
                .unwrap_or(false)
        }
    }

    async fn wait_for<R, C>(api: Api<R>, name: &str, condition: C)
    where
        R: kube::Resource
            + Clone
            + std::fmt::Debug
            + for<'de> k8s_openapi::serde::Deserialize<'de>
            + 'static
            + Send,
        C: Condition<R>,
    {
        timeout(Duration::from_secs(30), await_condition(api, name, condition))
            .await
            .unwrap()
            .unwrap();
    }

    async fn setup(name: &str) -> (Api<Project>, Api<Namespace>) {
        let project = Project::new(
            name,
            ProjectSpec {
                organization: "acme".to_string(),
                timeout_seconds: None,
            },
        );

        let client = Client::try_default().await.unwrap();
        let project_api = Api::<Project>::namespaced(client.clone(), "default");

        project_api.create(&PostParams::default(), &project).await.unwrap();

        let namespace_api = Api::<Namespace>::all(client.clone());
        wait_for(project_api.clone(), name, is_available()).await;
        (project_api, namespace_api)
    }

    #[tokio::test]
    async fn project_create_provisions_namespace() {
        let name = "test-create";
        let (_project_api, namespace_api) = setup(name).await;

        let ns = namespace_api.get(&format!("project-{name}")).await.unwrap();
        assert_eq!(ns.name_any(), format!("project-{name}"));
    }

    #[tokio::test]
    async fn project_delete_removes_namespace() {
        let name = "test-delete";
        let (project_api, namespace_api) = setup(name).await;

        let ns_name = format!("project-{name}");
        let ns = namespace_api.get(&ns_name).await.unwrap();
        project_api.delete(name, &Default::default()).await.unwrap();

        wait_for(
            namespace_api.clone(),
            &ns_name,
            conditions::is_deleted(&ns.uid().unwrap()),
        )
        .await;

        wait_for(project_api.clone(), name, conditions::is_deleted(name)).await;
    }

    #[tokio::test]
    async fn project_namespace_labeled_with_identity() {
        let name = "test-labels";
        let (_project_api, namespace_api) = setup(name).await;

        let ns = namespace_api.get(&format!("project-{name}")).await.unwrap();
        let labels = ns.labels();
        assert_eq!(labels.get("organization").map(String::as_str), Some("acme"));
        assert_eq!(labels.get("project").map(String::as_str), Some(name));
    }

    #[tokio::test]
    async fn project_reapplying_same_spec_is_idempotent() {
        let name = "test-idempotent";
        let (project_api, namespace_api) = setup(name).await;

        let mut project = project_api.get(name).await.unwrap();
        project.metadata.managed_fields = None;
        project_api
            .patch(name, &PatchParams::apply("e2e-tests").force(), &Patch::Apply(&project))
            .await
            .unwrap();

        wait_for(project_api.clone(), name, is_available()).await;
        let ns = namespace_api.get(&format!("project-{name}")).await.unwrap();
        assert_eq!(ns.name_any(), format!("project-{name}"));
    }
}
