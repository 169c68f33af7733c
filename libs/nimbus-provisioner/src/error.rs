use thiserror::Error;

/// Errors that can surface out of the provisioner algebra (§4.2, §4.6–§4.9). Lower-layer errors
/// are wrapped rather than discarded so the reconciler can still report a useful message.
#[derive(Debug, Error)]
pub enum Error {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    CdDriver(#[from] nimbus_cd::Error),

    #[error(transparent)]
    Remote(#[from] nimbus_remote::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("bundle resolution error: {0}")]
    Bundle(#[from] nimbus_bundle::Error),

    #[error("{0} has no remote cluster in scope; wrap it in on_remote()")]
    NoRemoteInScope(String),

    #[error("{0} has no target namespace in scope; wrap it in in_namespace()")]
    NoNamespaceInScope(String),

    #[error("could not build a client for the in-scope remote cluster: {0}")]
    InvalidRemoteKubeconfig(String),

    #[error("a concurrent provisioner task panicked: {0}")]
    TaskPanicked(String),

    #[error("{count} resources of kind {kind:?} share identity {name:?}; expected at most one")]
    AmbiguousIdentity {
        kind: String,
        name: String,
        count: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
