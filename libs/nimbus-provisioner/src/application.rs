//! The leaf that wraps a [`HelmApplication`] template around a CD driver call (§4.7): render
//! parameters/values from the unit's spec, compute its identity, and hand it to the CD driver.

use async_trait::async_trait;
use nimbus_cd::{HelmApplication, ResourceIdentifier};

use crate::ctx::ProvisionCtx;
use crate::error::Error;
use crate::provisioner::{Outcome, Provisioner};

/// Produces the [`HelmApplication`] to install, given the identity labels carried by the owning
/// unit. Kept as a trait object (rather than a plain closure) so customizers can be composed and
/// so composer functions can hold on to one without fighting `Fn` trait-object ergonomics.
pub trait ApplicationGenerator: Send + Sync {
    fn generate(&self) -> HelmApplication;
}

impl<F: Fn() -> HelmApplication + Send + Sync> ApplicationGenerator for F {
    fn generate(&self) -> HelmApplication {
        self()
    }
}

/// A pure post-processor of a generated [`HelmApplication`], e.g. to declare structural diffs the
/// CD driver should ignore (§4.7).
pub trait ApplicationCustomizer: Send + Sync {
    fn customize(&self, app: HelmApplication) -> HelmApplication;
}

impl<F: Fn(HelmApplication) -> HelmApplication + Send + Sync> ApplicationCustomizer for F {
    fn customize(&self, app: HelmApplication) -> HelmApplication {
        self(app)
    }
}

pub struct ApplicationProvisioner {
    /// The logical application name; also the `name` half of the computed [`ResourceIdentifier`].
    logical_name: String,
    identity_labels: std::collections::BTreeMap<String, String>,
    generator: Box<dyn ApplicationGenerator>,
    customizer: Option<Box<dyn ApplicationCustomizer>>,
    background_delete: bool,
}

impl ApplicationProvisioner {
    pub fn new(
        logical_name: impl Into<String>,
        identity_labels: std::collections::BTreeMap<String, String>,
        generator: impl ApplicationGenerator + 'static,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            identity_labels,
            generator: Box::new(generator),
            customizer: None,
            background_delete: false,
        }
    }

    pub fn with_customizer(mut self, customizer: impl ApplicationCustomizer + 'static) -> Self {
        self.customizer = Some(Box::new(customizer));
        self
    }

    /// Allows `deprovision` to return immediately after the delete call lands, without waiting
    /// for the CD driver to finish removing it (§4.3, §4.7). Distinct from the `BackgroundDelete`
    /// decorator on `ProvisionCtx` so a composer can hard-code this for one known-safe
    /// application without wrapping it.
    pub fn background_delete(mut self, background_delete: bool) -> Self {
        self.background_delete = background_delete;
        self
    }

    fn identity(&self) -> ResourceIdentifier {
        let mut labels = self.identity_labels.clone();
        labels.insert("application".to_string(), self.logical_name.clone());
        ResourceIdentifier::new(self.logical_name.clone()).with_labels(labels)
    }

    /// Renders the application, directing it at whichever remote `OnRemote` put in scope — the
    /// host cluster's reserved `in-cluster` alias when there is none (§4.6, §4.7).
    fn render(&self, ctx: &ProvisionCtx) -> HelmApplication {
        let mut app = self.generator.generate();
        app.target_cluster = match ctx.remote() {
            Some(remote) => remote.id().cluster_destination_name(),
            None => "in-cluster".to_string(),
        };
        match &self.customizer {
            Some(customizer) => customizer.customize(app),
            None => app,
        }
    }
}

#[async_trait]
impl Provisioner for ApplicationProvisioner {
    async fn provision(&self, ctx: &ProvisionCtx) -> Outcome {
        let id = self.identity();
        let app = self.render(ctx);
        ctx.cd_driver()
            .create_or_update_helm_application(&id, &app)
            .await
            .map_err(Error::from)
    }

    async fn deprovision(&self, ctx: &ProvisionCtx) -> Outcome {
        let id = self.identity();
        let background_delete = self.background_delete || ctx.background_delete();
        ctx.cd_driver()
            .delete_helm_application(&id, background_delete)
            .await
            .map_err(Error::from)
    }

    fn name(&self) -> &str {
        &self.logical_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, Response};
    use kube::client::Body;
    use nimbus_cd::fake::FakeDriver;
    use nimbus_cd::Health;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn test_client() -> kube::Client {
        let (mock_service, _handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        kube::Client::new(mock_service, "default")
    }

    fn identity_labels() -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("organization".to_string(), "acme".to_string());
        labels.insert("project".to_string(), "payments".to_string());
        labels
    }

    #[tokio::test]
    async fn yields_until_healthy_then_succeeds() {
        let driver = Arc::new(FakeDriver::new());
        let ctx = ProvisionCtx::new(test_client(), driver.clone(), CancellationToken::new());
        let provisioner = ApplicationProvisioner::new("cni", identity_labels(), || {
            HelmApplication::new("https://charts.example.com/cilium", "1.15.0")
        });

        assert!(provisioner.provision(&ctx).await.is_yield());
        driver.set_health("cni", Health::Healthy);
        assert!(provisioner.provision(&ctx).await.is_ok());
    }

    #[tokio::test]
    async fn target_cluster_defaults_to_in_cluster_alias() {
        let driver = Arc::new(FakeDriver::new());
        let ctx = ProvisionCtx::new(test_client(), driver.clone(), CancellationToken::new());
        let provisioner = ApplicationProvisioner::new("cert-manager", identity_labels(), || {
            HelmApplication::new("https://charts.example.com/cert-manager", "1.15.0")
        });

        provisioner.provision(&ctx).await;
        assert_eq!(driver.last_target_cluster("cert-manager").as_deref(), Some("in-cluster"));
    }

    #[tokio::test]
    async fn on_remote_redirects_target_cluster() {
        use crate::provisioner::ProvisionerExt;
        use nimbus_remote::{IdentityLabels, RemoteCluster};

        let driver = Arc::new(FakeDriver::new());
        let ctx = ProvisionCtx::new(test_client(), driver.clone(), CancellationToken::new());
        let remote = RemoteCluster::VirtualCluster {
            host_namespace: "controlplane-cp1".to_string(),
            control_plane_name: "cp1".to_string(),
            external_server: None,
            identity: IdentityLabels::default(),
        };
        let expected = remote.id().cluster_destination_name();
        let provisioner = ApplicationProvisioner::new("cert-manager", identity_labels(), || {
            HelmApplication::new("https://charts.example.com/cert-manager", "1.15.0")
        })
        .on_remote(remote);

        provisioner.provision(&ctx).await;
        assert_eq!(driver.last_target_cluster("cert-manager").as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn customizer_runs_before_driver_call() {
        let driver = Arc::new(FakeDriver::new());
        let ctx = ProvisionCtx::new(test_client(), driver.clone(), CancellationToken::new());
        let provisioner = ApplicationProvisioner::new("cni", identity_labels(), || {
            HelmApplication::new("https://charts.example.com/cilium", "1.15.0")
        })
        .with_customizer(|app: HelmApplication| app.allow_degraded(true));

        assert!(provisioner.provision(&ctx).await.is_yield());
        driver.set_health("cni", Health::Degraded);
        assert!(provisioner.provision(&ctx).await.is_ok());
    }
}
