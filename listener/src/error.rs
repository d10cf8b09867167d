use thiserror::Error;

/// Control path errors.
///
/// Data errors never show up here: a datagram that fails to parse or a
/// packet that fails payload type verification is reported through the
/// [`Observer`](crate::Observer) and dropped.
#[derive(Debug, Error)]
pub enum Error {
    #[error("InvalidArgument: {0}")]
    InvalidArgument(&'static str),
    #[error("InvalidState: {0}")]
    InvalidState(&'static str),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
