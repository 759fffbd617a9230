use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The sink failed earlier; the connection must be torn down.
    #[error("Sink previously failed: {0:?}")]
    SinkFailed(io::ErrorKind),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Kind of the underlying transport failure, if this error came from the sink
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Error::Io(e) => Some(e.kind()),
            Error::SinkFailed(kind) => Some(*kind),
            Error::ConnectionClosed => Some(io::ErrorKind::ConnectionAborted),
            _ => None,
        }
    }
}
