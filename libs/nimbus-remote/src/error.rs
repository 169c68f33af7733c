use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("secret {namespace}/{name} has no {key:?} key")]
    MissingSecretKey {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("kubeconfig in secret {namespace}/{name} could not be decoded: {source}")]
    InvalidKubeconfig {
        namespace: String,
        name: String,
        #[source]
        source: base64::DecodeError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
