use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecallError>;

#[derive(Error, Debug)]
pub enum RecallError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Inconsistent schema: {} entry point variants installed: {}", variants.len(), variants.join("; "))]
    InconsistentSchema { variants: Vec<String> },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Corrupt embedding {ref_id}: expected {expected} dimensions, found {actual}")]
    CorruptEmbedding {
        ref_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod schema;
pub mod search;
