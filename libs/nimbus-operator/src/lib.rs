//! The provisioning engine's Kubernetes-facing half: CRD types, the generic reconcile loop, the
//! three units' provisioner-tree composers, workload-pool orphan GC, split-brain migrations, and
//! the ambient observability/bundle-loading stack the binary wires up.

pub mod bundles;
pub mod composers;
pub mod conditions;
pub mod controller;
pub mod crd;
pub mod error;
pub mod gc;
pub mod metrics;
pub mod migrations;
pub mod reconcile;
pub mod telemetry;

pub use error::{Error, Result};
