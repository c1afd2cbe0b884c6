use serde::Serialize;
use thiserror::Error;

/// Auth-category failures (§7): the login/ping surface of the Remote Client.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("two-factor authentication required")]
    TwoFactorRequired,
    #[error("server error ({0})")]
    ServerError(u16),
}

/// API-category failures (§7): anything else the Remote Client surface can return.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid response from server")]
    InvalidResponse,
    #[error("server error ({0})")]
    ServerError(u16),
    #[error("incorrect library password")]
    IncorrectPassword,
    #[error("not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("storage quota exceeded")]
    QuotaExceeded,
}

/// Sync-category failures (§7): cycle-level conditions raised by the Orchestrator.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("library '{0}' is encrypted and needs a password")]
    EncryptedLibraryNeedsPassword(String),
    #[error("a sync cycle is already in progress")]
    SyncInProgress,
}

/// Storage-category failures (§7): state store and secret store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("state store failure: {0}")]
    StateStore(String),
    #[error("secret store failure: {0}")]
    SecretStore(String),
}

/// Top-level error type returned at the crate's public boundary.
///
/// Carries only what's needed for a human-readable message; no variant name
/// is exposed to the UI (§7: "no kind name leaks into the UI").
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl Serialize for CoreError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(StorageError::StateStore(err.to_string()))
    }
}

impl From<keyring::Error> for CoreError {
    fn from(err: keyring::Error) -> Self {
        CoreError::Storage(StorageError::SecretStore(err.to_string()))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Other(err.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        CoreError::Api(ApiError::InvalidResponse).with_context(err.to_string())
    }
}

impl CoreError {
    /// Attach extra context to an error while keeping it in the taxonomy;
    /// used where a low-level `From` impl loses detail worth logging.
    fn with_context(self, detail: String) -> Self {
        CoreError::Other(format!("{self}: {detail}"))
    }

    /// Maps an HTTP status code to the categorized API error per §7/§4.3.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => CoreError::Api(ApiError::IncorrectPassword),
            403 => CoreError::Api(ApiError::PermissionDenied),
            404 => CoreError::Api(ApiError::NotFound),
            443 => CoreError::Api(ApiError::QuotaExceeded),
            code => CoreError::Api(ApiError::ServerError(code)),
        }
    }
}
