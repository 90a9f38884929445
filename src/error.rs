use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockvErrorCode {
    InvalidArgument,
    NotFound,
    Conflict,
    Internal,
    Retriable,
    Cancelled,
    Encode,
    Decode,
}

impl DockvErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DockvErrorCode::InvalidArgument => "invalid_argument",
            DockvErrorCode::NotFound => "not_found",
            DockvErrorCode::Conflict => "conflict",
            DockvErrorCode::Internal => "internal",
            DockvErrorCode::Retriable => "retriable",
            DockvErrorCode::Cancelled => "cancelled",
            DockvErrorCode::Encode => "encode",
            DockvErrorCode::Decode => "decode",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DockvError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("transient substrate failure: {0}")]
    Retriable(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl DockvError {
    pub fn code(&self) -> DockvErrorCode {
        match self {
            DockvError::InvalidArgument(_) => DockvErrorCode::InvalidArgument,
            DockvError::NotFound(_) => DockvErrorCode::NotFound,
            DockvError::Conflict(_) => DockvErrorCode::Conflict,
            DockvError::Internal(_) => DockvErrorCode::Internal,
            DockvError::Retriable(_) => DockvErrorCode::Retriable,
            DockvError::Cancelled(_) => DockvErrorCode::Cancelled,
            DockvError::Encode(_) => DockvErrorCode::Encode,
            DockvError::Decode(_) => DockvErrorCode::Decode,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// Whether the failure class permits re-running the whole request
    /// against a fresh transaction.
    pub fn is_retriable(&self) -> bool {
        matches!(self, DockvError::Retriable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{DockvError, DockvErrorCode};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(DockvErrorCode::InvalidArgument.as_str(), "invalid_argument");
        assert_eq!(DockvErrorCode::Retriable.as_str(), "retriable");
        assert_eq!(DockvErrorCode::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn error_code_str_matches_variant_mapping() {
        let err = DockvError::NotFound("index 'by_email'".into());
        assert_eq!(err.code(), DockvErrorCode::NotFound);
        assert_eq!(err.code_str(), "not_found");
        assert!(!err.is_retriable());
        assert!(DockvError::Retriable("commit".into()).is_retriable());
    }
}
