use crate::lock::LockError;

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Sqlite(rusqlite::Error),
    Pool(r2d2::Error),
    Json(serde_json::Error),
    Lock(LockError),
    InvalidStatus(String),
    InvalidInput(String),
    NotFound(String),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Sqlite(err) => write!(f, "db error: {}", err),
            LibraryError::Pool(err) => write!(f, "db pool error: {}", err),
            LibraryError::Json(err) => write!(f, "json error: {}", err),
            LibraryError::Lock(err) => write!(f, "lock error: {}", err),
            LibraryError::InvalidStatus(value) => write!(f, "invalid status: {}", value),
            LibraryError::InvalidInput(message) => write!(f, "invalid input: {}", message),
            LibraryError::NotFound(value) => write!(f, "not found: {}", value),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<rusqlite::Error> for LibraryError {
    fn from(err: rusqlite::Error) -> Self {
        LibraryError::Sqlite(err)
    }
}

impl From<r2d2::Error> for LibraryError {
    fn from(err: r2d2::Error) -> Self {
        LibraryError::Pool(err)
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(err: serde_json::Error) -> Self {
        LibraryError::Json(err)
    }
}

impl From<LockError> for LibraryError {
    fn from(err: LockError) -> Self {
        LibraryError::Lock(err)
    }
}
