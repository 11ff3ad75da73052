use thiserror::Error;

/// Core error taxonomy. Everything raised here surfaces to the caller
/// unchanged; the HTTP layer maps variants to status codes.
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced entity absent
    #[error("{0}")]
    NotFound(String),

    /// Authenticated but not authorized for the action
    #[error("{0}")]
    Forbidden(String),

    /// Missing or invalid credentials
    #[error("{0}")]
    Unauthorized(String),

    /// Policy or input constraint violated
    #[error("{0}")]
    BadRequest(String),

    /// Uniqueness violation, e.g. a duplicate approved next-of-kin
    #[error("{0}")]
    Conflict(String),

    /// Persistence-layer failure
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Error::Forbidden(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Error::Unauthorized(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Error::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
