use std::io;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid target '{0}'")]
    InvalidTarget(String),

    #[error("no resolver registered for scheme '{0}'")]
    UnknownScheme(String),

    #[error("no available endpoint for target '{0}'")]
    NoAvailableEndpoint(String),

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("invalid metadata entry '{0}'")]
    InvalidMetadata(String),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("rpc failed: {}", .0.message())]
    Status(Box<tonic::Status>),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// The structured failure returned by the server, if this is one.
    pub fn status(&self) -> Option<&tonic::Status> {
        match self {
            Error::Status(status) => Some(status.as_ref()),
            _ => None,
        }
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Error::Status(Box::new(status))
    }
}
