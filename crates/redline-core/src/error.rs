use thiserror::Error;

/// Failure to apply a transaction. The document is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("pending edit cannot be changed in place: {0}")]
    PendingEdit(String),
    #[error("normalization did not converge")]
    NormalizeDidNotConverge,
}

impl From<PathError> for ApplyError {
    fn from(value: PathError) -> Self {
        ApplyError::InvalidPath(value.0)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct PathError(pub String);

/// Every failure path of the edit engine. None of them leave a partially
/// applied mutation behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("edit not found: {id}")]
    EditNotFound { id: String },
    #[error("rewrite target is no longer present in the document")]
    StaleTarget,
    #[error("upstream failure: {message}")]
    Upstream { message: String },
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl EditError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        EditError::InvalidInput(message.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        EditError::EditNotFound { id: id.into() }
    }
}
