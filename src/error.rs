use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    #[error("invalid access level '{0}'")]
    InvalidAccessLevel(String),
    #[error("validity of {0} seconds is out of range")]
    ValidityOutOfRange(u64),
    #[error("not found")]
    NotFound,
    #[error("provided id '{0}' has a wrong format")]
    MalformedId(String),
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("invalid collection name '{0}'")]
    InvalidCollectionName(String),
    #[error("invalid search pattern")]
    Pattern {
        #[from]
        source: regex::Error,
    },
    #[error("database error")]
    Database {
        #[from]
        source: sqlx::Error,
    },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            AppError::InvalidAccessLevel(_) => StatusCode::BAD_REQUEST,
            AppError::ValidityOutOfRange(_) => StatusCode::BAD_REQUEST,
            AppError::MalformedId(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MalformedDocument(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::UnknownCollection(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::UnknownField(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidCollectionName(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Pattern { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status_code, format!("{self}")).into_response()
    }
}
