//! An in-process [`CdDriver`] backed by a `Mutex<HashMap<...>>`, modeled after the teacher's
//! `ApiServerVerifier` fake for the Kubernetes API (its reconcile module's `#[cfg(test)]`
//! helper, per SPEC_FULL §4.15). Exercises the provisioner algebra and reconciler without a live
//! CD backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cluster::Kubeconfig;
use crate::driver::{CdDriver, Outcome};
use crate::helm_application::{Health, HelmApplication};
use crate::identifier::ResourceIdentifier;

#[derive(Debug, Clone)]
struct FakeApplication {
    app: HelmApplication,
    health: Health,
    deleting: bool,
}

#[derive(Debug, Clone)]
struct FakeCluster {
    server: String,
}

/// Scripted CD driver fake. Tests seed [`FakeDriver::set_health`] before calling the provisioner
/// under test, then assert against [`FakeDriver::applications`]/[`FakeDriver::clusters`].
#[derive(Default)]
pub struct FakeDriver {
    applications: Mutex<HashMap<String, FakeApplication>>,
    clusters: Mutex<HashMap<String, FakeCluster>>,
    /// Health newly-created applications start with; defaults to `Missing` so callers see the
    /// "absent health" yield described in §4.3 until a test advances it.
    default_health: Health,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            default_health: Health::Missing,
            ..Default::default()
        }
    }

    /// Sets the health an already-created application identified by `id.name` reports on the
    /// next call. No-op if the application doesn't exist yet.
    pub fn set_health(&self, name: &str, health: Health) {
        if let Some(app) = self.applications.lock().unwrap().get_mut(name) {
            app.health = health;
        }
    }

    pub fn application_count(&self) -> usize {
        self.applications.lock().unwrap().len()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.lock().unwrap().len()
    }

    pub fn has_application(&self, name: &str) -> bool {
        self.applications.lock().unwrap().contains_key(name)
    }

    /// The `target_cluster` the most recent `create_or_update_helm_application` call for `name`
    /// carried, for asserting `OnRemote`/default-routing behavior in tests.
    pub fn last_target_cluster(&self, name: &str) -> Option<String> {
        self.applications
            .lock()
            .unwrap()
            .get(name)
            .map(|entry| entry.app.target_cluster.clone())
    }
}

#[async_trait]
impl CdDriver for FakeDriver {
    async fn create_or_update_helm_application(
        &self,
        id: &ResourceIdentifier,
        app: &HelmApplication,
    ) -> Outcome {
        let mut apps = self.applications.lock().unwrap();
        let entry = apps
            .entry(id.name.clone())
            .or_insert_with(|| FakeApplication {
                app: app.clone(),
                health: self.default_health,
                deleting: false,
            });
        entry.app = app.clone();
        if entry.health.satisfies(app.allow_degraded) {
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
        let mut apps = self.applications.lock().unwrap();
        match apps.get_mut(&id.name) {
            None => Outcome::Ok,
            Some(entry) if entry.deleting => {
                if background_delete {
                    apps.remove(&id.name);
                    Outcome::Ok
                } else {
                    Outcome::Yield
                }
            }
            Some(entry) => {
                entry.deleting = true;
                if background_delete {
                    apps.remove(&id.name);
                    Outcome::Ok
                } else {
                    Outcome::Yield
                }
            }
        }
    }

    async fn create_or_update_cluster(
        &self,
        id: &ResourceIdentifier,
        kubeconfig: &Kubeconfig,
    ) -> Outcome {
        self.clusters.lock().unwrap().insert(
            id.name.clone(),
            FakeCluster {
                server: kubeconfig.server.clone(),
            },
        );
        Outcome::Ok
    }

    async fn delete_cluster(&self, id: &ResourceIdentifier) -> Outcome {
        self.clusters.lock().unwrap().remove(&id.name);
        Outcome::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kubeconfig() -> Kubeconfig {
        Kubeconfig {
            server: "https://example.com:6443".into(),
            certificate_authority_data: vec![],
            client_certificate_data: vec![],
            client_key_data: vec![],
        }
    }

    #[tokio::test]
    async fn missing_health_yields() {
        let driver = FakeDriver::new();
        let id = ResourceIdentifier::new("app-1");
        let app = HelmApplication::new("https://charts.example.com", "1.0.0");
        assert!(driver
            .create_or_update_helm_application(&id, &app)
            .await
            .is_yield());
    }

    #[tokio::test]
    async fn healthy_satisfies() {
        let driver = FakeDriver::new();
        let id = ResourceIdentifier::new("app-1");
        let app = HelmApplication::new("https://charts.example.com", "1.0.0");
        driver.create_or_update_helm_application(&id, &app).await;
        driver.set_health("app-1", Health::Healthy);
        assert!(driver
            .create_or_update_helm_application(&id, &app)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn delete_yields_once_then_completes_in_background() {
        let driver = FakeDriver::new();
        let id = ResourceIdentifier::new("app-1");
        let app = HelmApplication::new("https://charts.example.com", "1.0.0");
        driver.create_or_update_helm_application(&id, &app).await;

        assert!(driver.delete_helm_application(&id, false).await.is_yield());
        assert!(driver.has_application("app-1"));
        assert!(driver.delete_helm_application(&id, true).await.is_ok());
        assert!(!driver.has_application("app-1"));
    }

    #[tokio::test]
    async fn cluster_roundtrip() {
        let driver = FakeDriver::new();
        let id = ResourceIdentifier::new("kubernetes");
        driver.create_or_update_cluster(&id, &kubeconfig()).await;
        assert_eq!(driver.cluster_count(), 1);
        driver.delete_cluster(&id).await;
        assert_eq!(driver.cluster_count(), 0);
    }
}
