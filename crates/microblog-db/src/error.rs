use rusqlite::ffi;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// A UNIQUE or PRIMARY KEY constraint rejected the write.
    /// `constraint` is the column list SQLite reports, e.g. `users.username`.
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("database lock poisoned: {0}")]
    Poisoned(String),

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl DbError {
    /// True when the violated constraint covers `column` (`"username"`, `"email"`, ...).
    pub fn violates(&self, column: &str) -> bool {
        match self {
            DbError::UniqueViolation { constraint } => constraint
                .split(", ")
                .any(|c| c.rsplit('.').next() == Some(column)),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, Some(message)) = &err {
            if code.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || code.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                // "UNIQUE constraint failed: users.username"
                let constraint = message
                    .split_once(": ")
                    .map(|(_, columns)| columns)
                    .unwrap_or(message.as_str());
                return DbError::UniqueViolation {
                    constraint: constraint.to_string(),
                };
            }
        }
        DbError::Sqlite(err)
    }
}
