use thiserror::Error;

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Errors raised by the stores and the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Block already exists: {0}")]
    BlockExists(String),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Cycle in block chain of document {document_id} at block {block_id}")]
    ChainCycleDetected {
        document_id: String,
        block_id: String,
    },

    #[error("Block chain of document {document_id} is broken: {reason}")]
    ChainBroken {
        document_id: String,
        reason: String,
    },

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

/// Coarse classification used by transports to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Malformed,
    Conflict,
    ChainCycleDetected,
    ChainBroken,
    PersistenceFailure,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DocumentNotFound(_) | Self::BlockNotFound(_) => ErrorKind::NotFound,
            Self::BlockExists(_) => ErrorKind::Conflict,
            Self::Malformed(_) => ErrorKind::Malformed,
            Self::ChainCycleDetected { .. } => ErrorKind::ChainCycleDetected,
            Self::ChainBroken { .. } => ErrorKind::ChainBroken,
            Self::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(SyncError::DocumentNotFound("d".into()).kind(), ErrorKind::NotFound);
        assert_eq!(SyncError::BlockNotFound("b".into()).kind(), ErrorKind::NotFound);
        assert_eq!(SyncError::BlockExists("b".into()).kind(), ErrorKind::Conflict);
        assert_eq!(SyncError::Malformed("x".into()).kind(), ErrorKind::Malformed);
        assert_eq!(SyncError::persistence("disk").kind(), ErrorKind::PersistenceFailure);
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::ChainCycleDetected {
            document_id: "doc".into(),
            block_id: "b7".into(),
        };
        assert!(err.to_string().contains("Cycle"));
        assert!(err.to_string().contains("b7"));

        let err = SyncError::DocumentNotFound("doc".into());
        assert!(err.to_string().contains("not found"));
    }
}
