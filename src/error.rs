use std::path::PathBuf;

use thiserror::Error;

use crate::manifest::ComponentId;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("corrupt bundle '{}': {reason}", path.display())]
    CorruptBundle { path: PathBuf, reason: String },

    #[error("manifest validation failed: {0}")]
    ManifestValidation(String),

    #[error("component '{0}' already exists")]
    DuplicateComponent(ComponentId),

    #[error("component '{0}' does not exist")]
    ComponentNotFound(ComponentId),

    #[error("missing runtime asset '{component}: {role}': {reason}")]
    MissingAsset {
        component: ComponentId,
        role: &'static str,
        reason: String,
    },

    #[error("invalid enclave image: {0}")]
    InvalidEnclaveImage(String),

    #[error("malformed SIGSTRUCT: {0}")]
    MalformedRecord(String),

    #[error("SIGSTRUCT signature is invalid: {0}")]
    SignatureInvalid(String),

    #[error("signature does not match the SIGSTRUCT hash")]
    SignatureMismatch,

    #[error("enclave measurement mismatch: expected {expected}, SIGSTRUCT has {actual}")]
    MeasurementMismatch { expected: String, actual: String },

    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("manifest serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<openssl::error::ErrorStack> for BundleError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        BundleError::CryptoFailure(err.to_string())
    }
}

impl BundleError {
    pub(crate) fn invalid_field(field: &'static str, reason: impl ToString) -> Self {
        BundleError::InvalidField {
            field,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;
