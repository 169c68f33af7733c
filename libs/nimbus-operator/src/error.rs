//! The reconciler's own error seam: everything a lower crate can report, plus the handful of
//! failures that only make sense at this layer (missing namespace, a unit with no bundle
//! reference yet). Lower-layer errors are wrapped with `#[from]`, never discarded (§4.13).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Provisioner(#[from] nimbus_provisioner::Error),

    #[error(transparent)]
    Bundle(#[from] nimbus_bundle::Error),

    #[error("finalizer error: {0}")]
    Finalizer(#[from] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("{0} must be namespaced, but has no namespace set")]
    MissingNamespace(String),

    #[error("provision of {0} timed out (timeout exceeded)")]
    TimedOut(String),

    #[error("provision of {0} was cancelled")]
    Cancelled(String),

    #[error("invalid trace id")]
    InvalidTraceId,

    #[error("bundle '{0}' is not known to this operator")]
    MissingBundle(String),

    #[error("could not load bundle configuration from {0}: {1}")]
    BundleConfig(String, String),
}

impl Error {
    /// A short, cardinality-bounded label for the `failures` metric — never the full display
    /// string, which may embed unbounded user input (namespace/name).
    pub fn metric_label(&self) -> String {
        match self {
            Error::Kube(_) => "kube".to_string(),
            Error::Provisioner(_) => "provisioner".to_string(),
            Error::Bundle(_) => "bundle".to_string(),
            Error::Finalizer(_) => "finalizer".to_string(),
            Error::MissingNamespace(_) => "missing_namespace".to_string(),
            Error::TimedOut(_) => "timed_out".to_string(),
            Error::Cancelled(_) => "cancelled".to_string(),
            Error::InvalidTraceId => "invalid_trace_id".to_string(),
            Error::MissingBundle(_) => "missing_bundle".to_string(),
            Error::BundleConfig(_, _) => "bundle_config".to_string(),
        }
    }

    /// The condition `reason` this error classifies to (§4.8, §6, §7).
    pub fn condition_reason(&self) -> &'static str {
        match self {
            Error::TimedOut(_) => "TimedOut",
            Error::Cancelled(_) => "Cancelled",
            _ => "Errored",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
