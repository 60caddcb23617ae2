/// Why a create was refused as a conflict. The two causes share a status family but keep
/// distinct messages so callers can tell a re-post from an id collision.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    #[error("record with id {id} already exists in {collection}")]
    DuplicateId { collection: String, id: String },
    #[error("identical record was already created in {collection} as {id}")]
    DuplicateContent { collection: String, id: String },
}

/// Failure raised by a contract handler. These are never folded into the result envelope by
/// the pipeline; they propagate to whoever invoked the operation.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    #[error("record {id} not found in {collection}")]
    NotFound { collection: String, id: String },
    #[error(transparent)]
    Conflict(#[from] Conflict),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        HandlerError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            HandlerError::NotFound { .. } => 404,
            HandlerError::Conflict(_) => 409,
            HandlerError::Rejected(_) => 400,
            HandlerError::Backend(_) => 500,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            HandlerError::NotFound { .. } => "Not found",
            HandlerError::Conflict(_) => "Conflict",
            HandlerError::Rejected(_) => "Request rejected",
            HandlerError::Backend(_) => "Handler failed",
        }
    }
}
