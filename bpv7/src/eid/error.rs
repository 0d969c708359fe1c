use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Malformed EID scheme in '{0}'")]
    MalformedScheme(String),

    #[error("Unknown EID scheme '{0}'")]
    UnknownScheme(String),

    #[error("Malformed {scheme} scheme-specific part: {reason}")]
    MalformedSsp { scheme: String, reason: String },

    #[error("Unknown EID scheme number {0}")]
    UnknownIanaNumber(u64),

    #[error(transparent)]
    InvalidCBOR(#[from] terra_cbor::decode::Error),
}

impl Error {
    pub(crate) fn malformed(scheme: &str, reason: impl core::fmt::Display) -> Self {
        Self::MalformedSsp {
            scheme: scheme.to_string(),
            reason: reason.to_string(),
        }
    }
}
