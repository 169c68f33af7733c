//! The driver-agnostic contract a continuous-delivery backend must satisfy: CRUD plus
//! health-gated apply of a [`HelmApplication`], and upsert/delete of a cluster registration.
//!
//! Every method returns [`Outcome`] rather than `Result`: "the application isn't healthy yet" and
//! "the secret isn't reachable yet" are not failures, they are reasons to requeue (§4.3, §8).

use async_trait::async_trait;

use crate::cluster::Kubeconfig;
use crate::error::Error;
use crate::helm_application::HelmApplication;
use crate::identifier::ResourceIdentifier;

pub type Outcome = nimbus_outcome::Outcome<Error>;

/// Abstracts the concrete CD system (ArgoCD, or a test fake) behind the four operations the
/// provisioner algebra needs.
#[async_trait]
pub trait CdDriver: Send + Sync {
    /// Ensures a driver-native Application resource exists whose spec matches `app`, identified
    /// by `id`. Returns `Ok` once the application reports a health that satisfies
    /// `app.allow_degraded` (§4.3).
    async fn create_or_update_helm_application(
        &self,
        id: &ResourceIdentifier,
        app: &HelmApplication,
    ) -> Outcome;

    /// Deletes the application identified by `id`. `background_delete` lets the caller return
    /// `Ok` immediately after the delete call lands rather than waiting for it to disappear.
    async fn delete_helm_application(&self, id: &ResourceIdentifier, background_delete: bool)
        -> Outcome;

    /// Registers (or refreshes) a remote cluster's credentials, gated on the remote actually
    /// being reachable the first time it's registered.
    async fn create_or_update_cluster(
        &self,
        id: &ResourceIdentifier,
        kubeconfig: &Kubeconfig,
    ) -> Outcome;

    /// Deregisters a previously-registered cluster. Absent is success.
    async fn delete_cluster(&self, id: &ResourceIdentifier) -> Outcome;
}
