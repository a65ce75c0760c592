/// Errors raised by durable local key-value storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to create storage directory: {0}")]
    DirCreation(std::io::Error),
    #[error("failed to read stored value: {0}")]
    Read(std::io::Error),
    #[error("failed to write stored value: {0}")]
    Write(std::io::Error),
    #[error("failed to remove stored value: {0}")]
    Remove(std::io::Error),
    #[error("failed to serialize stored value: {0}")]
    Serialization(serde_json::Error),
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors reported by the remote identity provider, site directory and visit store.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("credential is stale or no longer valid")]
    StaleCredential,
    #[error("{0} not found")]
    NotFound(String),
    #[error("{message}")]
    Server { message: String },
    #[error("remote service unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    pub fn server(message: impl Into<String>) -> Self {
        RemoteError::Server {
            message: message.into(),
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Crate-boundary error for configuration and backend setup.
#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("failed to read accounts file: {0}")]
    AccountsRead(std::io::Error),
    #[error("failed to parse accounts file: {0}")]
    AccountsParse(serde_yaml::Error),
    #[error("failed to write accounts file: {0}")]
    AccountsWrite(std::io::Error),
    #[error("failed to serialize accounts file: {0}")]
    AccountsSerialization(serde_yaml::Error),
}

pub type CampaignResult<T> = std::result::Result<T, CampaignError>;
