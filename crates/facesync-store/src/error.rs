use facesync_core::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("metadata serialization: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("entry {0} not found")]
    NotFound(i64),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for StoreError {
    fn from(err: Error) -> Self {
        match err {
            Error::Sqlite(e) => StoreError::Sqlite(e.to_string()),
            Error::Json(e) => StoreError::Serialization(e.to_string()),
            Error::Io(e) => StoreError::Unavailable(e.to_string()),
            Error::NotFound(id) => StoreError::NotFound(id),
        }
    }
}
