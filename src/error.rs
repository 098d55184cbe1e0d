
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SismaError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Adapter error [{code}]: {message} (command: {command})")]
    Adapter { code: String, message: String, command: String },
    #[error("Invalid type: expected {expected}, got {actual}")]
    InvalidType { expected: String, actual: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Property '{property}' of {entity} must be assigned")]
    UnassignedProperty { entity: String, property: String },
    #[error("Hydration error: {0}")]
    Hydration(String),
    #[error("Encryption error: {0}")]
    Encryption(String),
    #[error("Decryption failed for '{property}': {message}")]
    Decryption { property: String, message: String },
    #[error("Cyclic reference: {entity} #{id} was already visited")]
    CyclicReference { entity: String, id: i64 },
    #[error("Tree deeper than {0} levels")]
    DepthExceeded(usize),
    #[error("{entity} #{id} not found")]
    NotFound { entity: String, id: i64 },
    #[error("Entity is detached from any session: {0}")]
    Detached(String),
}

pub type Result<T> = std::result::Result<T, SismaError>;

// Helper conversions
impl From<config::ConfigError> for SismaError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}

impl SismaError {
    /// Wraps a driver failure together with the command that caused it.
    pub fn adapter(error: &rusqlite::Error, command: &str) -> Self {
        let code = match error {
            rusqlite::Error::SqliteFailure(failure, _) => {
                format!("{:?}:{}", failure.code, failure.extended_code)
            }
            _ => String::from("HY000"),
        };
        Self::Adapter {
            code,
            message: error.to_string(),
            command: command.to_string(),
        }
    }
}
