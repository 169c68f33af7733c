use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("{count} applications share identity {name:?}; expected at most one")]
    AmbiguousIdentity { name: String, count: usize },

    #[error("cluster secret for {0:?} could not be decoded: {1}")]
    InvalidClusterSecret(String, String),

    #[error("kubeconfig has no current context")]
    MissingCurrentContext,

    #[error("remote API probe failed: {0}")]
    ProbeFailed(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("yaml serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
