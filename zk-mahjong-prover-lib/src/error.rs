use thiserror::Error;

/// Comprehensive error type for the off-thread prover.
#[derive(Debug, Error)]
pub enum Error {
    // --- Dispatcher / protocol errors ---
    /// Misuse of the dispatcher: double init, submit before ready.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The execution context has been torn down after a transport fault or disposal.
    #[error("Execution context is poisoned: {0}")]
    Poisoned(String),

    #[error("Transport fault: {0}")]
    TransportFault(String),

    // --- Setup artifact errors ---
    #[error("Artifact {key} digest mismatch: expected {expected}, got {actual}")]
    IntegrityError {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Setup failed: {0}")]
    SetupFailure(String),

    #[error("Artifact fetch failed: {0}")]
    FetchError(String),

    // --- Proof computation ---
    #[error("Proof computation failed: {0}")]
    ComputationFault(String),

    // --- Ambient errors ---
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration parsing error (TOML): {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Serialization error (JSON): {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("Serialization error (Bincode): {0}")]
    BincodeError(#[from] Box<bincode::ErrorKind>),

    #[error("Hex decoding error: {0}")]
    HexError(#[from] hex::FromHexError),

    #[error("URL parsing error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("State management error: {0}")]
    StateError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Could not acquire lock: {0}")]
    LockError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::StateError(e.to_string())
    }
}

// Helper for lock errors (std::sync::Mutex)
impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::LockError(format!("Mutex poisoned: {}", e))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Blocking task failed: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
