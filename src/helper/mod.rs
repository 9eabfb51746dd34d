use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::error;
use serde_json::json;
use thiserror::Error;

use crate::{DbConn, DbPool};

pub mod admin_helpers;
pub mod media_helpers;
pub mod public_helpers;
pub mod sanitization_helpers;

/// The one error type every operation helper returns. Client-caused
/// failures carry their message to the response body; everything else is
/// logged and answered with an opaque 500.
#[derive(Error, Debug)]
pub enum OpError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blocking task error: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),
}

impl ResponseError for OpError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
            return HttpResponse::InternalServerError()
                .json(json!({ "success": false, "error": "Internal server error" }));
        }
        HttpResponse::build(status).json(json!({ "success": false, "error": self.to_string() }))
    }
}

// Helper to get a connection from the pool
pub fn get_conn(pool: &DbPool) -> Result<DbConn, OpError> {
    Ok(pool.get()?)
}

/// Turns a UNIQUE constraint hit into a validation error naming the
/// offending field; any other failure stays a database error.
pub fn reject_duplicate(err: rusqlite::Error, what: &str) -> OpError {
    match err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            OpError::Validation(format!("{} already exists", what))
        }
        other => OpError::Database(other),
    }
}
