use thiserror::Error;

/// Failure to turn raw fragments into one record. Never fatal for a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("field `{field}` has unexpected format: {raw:?}")]
    Format { field: &'static str, raw: String },
    #[error("required field `{0}` is empty")]
    EmptyField(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Duplicate primary key. The cutoff policy should make this impossible.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref code, ref msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::ConstraintViolation(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            other => StoreError::Sqlite(other),
        }
    }
}

impl StoreError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation(_))
    }
}
