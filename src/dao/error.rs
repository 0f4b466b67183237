use thiserror::Error;

use crate::{
    address::PathError,
    model::MappingError,
    store::{CodedError, DocumentStore, ErrorCode},
};

#[derive(Debug, Error)]
pub enum DaoError<E> {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("{0} is not compatible with this dao")]
    IncompatibleReference(String),

    #[error("field `{field}` is not declared in model {model}")]
    UnknownField { model: String, field: String },

    #[error("conflict: document {id} already exists")]
    Conflict { id: String },

    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("store error: {0}")]
    Store(#[source] E),
}

impl<E: CodedError> DaoError<E> {
    /// Store error code, when the failure came from the store.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            DaoError::Store(e) => Some(e.code()),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DaoError::Conflict { .. })
    }
}

impl<E> From<serde_json::Error> for DaoError<E> {
    fn from(value: serde_json::Error) -> Self {
        DaoError::Mapping(value.into())
    }
}

pub type DaoResult<V, S> = Result<V, DaoError<<S as DocumentStore>::Error>>;
