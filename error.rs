use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database Pool Error: {0}")]
    DbPool(#[from] r2d2::Error),

    #[error("Database Error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Parse Error at position {position}: {reason}")]
    Parse { position: usize, reason: String },

    #[error("Invalid Session State: {0}")]
    State(String),

    /// The staged change was discarded and the transaction rolled back.
    #[error("Persistence Error during {operation}: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Migration Failed (version {version}): {reason}")]
    Migration { version: i64, reason: String },

    #[error("Corrupt Catalog Row: {0}")]
    Corruption(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn parse(position: usize, reason: impl Into<String>) -> Self {
        Error::Parse {
            position,
            reason: reason.into(),
        }
    }
}
