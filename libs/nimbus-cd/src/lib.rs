//! Abstracts a Helm-based continuous-delivery backend (ArgoCD today) behind a narrow contract:
//! create-or-update/delete of a Helm application with health gating, and upsert/delete of a
//! remote cluster registration (§4.3).

pub mod cluster;
pub mod driver;
pub mod error;
pub mod helm_application;
pub mod identifier;

pub mod argocd;
pub mod fake;

pub use cluster::{ClusterRegistration, Kubeconfig};
pub use driver::{CdDriver, Outcome};
pub use error::Error;
pub use helm_application::{Health, HelmApplication};
pub use identifier::ResourceIdentifier;
