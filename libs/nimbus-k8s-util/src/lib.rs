//! Shared Kubernetes client plumbing: a metrics-instrumented `kube::Client` constructor and the
//! URL-templating helper that keeps per-endpoint metric cardinality bounded.

pub mod client;
pub mod metrics;
pub mod url;
