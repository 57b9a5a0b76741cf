use thiserror::Error;

use crate::entities::{MovieId, UserId};

#[derive(Error, Debug)]
pub enum CinelogError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },
    #[error("Review already exists for user {user_id} and movie {movie_id}")]
    DuplicateReview { user_id: UserId, movie_id: MovieId },
    #[error("Not found: {entity} {id}")]
    NotFound { entity: &'static str, id: i64 },
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },
    #[error("Object store error: {0}")]
    StoreIOError(std::io::Error),
    #[error("Failed to read/write journal file: {0}")]
    DbIOError(std::io::Error),
    #[error("Failed to serialize/deserialize journal operation: {0}")]
    DbSerializationError(serde_json::Error),
}

impl CinelogError {
    pub fn missing_field(field: &str) -> Self {
        CinelogError::MissingField { field: field.to_string() }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        CinelogError::Validation { field: field.to_string(), message: message.into() }
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        CinelogError::NotFound { entity, id }
    }
}
