use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bundle {0:?} not found")]
    NotFound(String),

    #[error("bundle {name:?} is kind {actual:?}, expected {expected:?}")]
    KindMismatch {
        name: String,
        actual: BundleKindName,
        expected: BundleKindName,
    },

    #[error("bundle {bundle:?} has no required application {logical_name:?}")]
    MissingRequiredEntry { bundle: String, logical_name: String },

    #[error("no non-preview, non-end-of-life bundle of kind {0:?} is available")]
    NoDefaultAvailable(BundleKindName),

    #[error("invalid semantic version {0:?}: {1}")]
    InvalidVersion(String, semver::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A `Display`-friendly stand-in for [`crate::BundleKind`] so [`Error`] doesn't need to depend on
/// it directly in its `Debug` output.
pub type BundleKindName = &'static str;
