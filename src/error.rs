use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum HubError {
    #[error("Realtime database request failed ({status}): {message}")]
    Database { status: u16, message: String },

    #[error("Realtime database stream error: {0}")]
    Stream(String),

    #[error("Invalid database path: {0}")]
    InvalidPath(String),

    #[error("Push gateway error: {0}")]
    PushGateway(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Validation(String),

    #[error("Unknown actuator: {0}")]
    UnknownActuator(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    InstanceLock(#[from] crate::instance_lock::InstanceLockError),

    #[error(transparent)]
    HttpError(#[from] reqwest::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HubError>;
