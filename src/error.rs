use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Catalog not found: {0}")]
    CatalogNotFound(String),

    #[error("Capability binary not found: {0}")]
    BinaryNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
