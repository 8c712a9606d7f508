use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Errors when decoding requests or putting responses on the wire.
#[derive(Debug)]
pub enum Error {
    /// The request head exceeded the configured maximum length.
    HeadTooLarge,
    /// The request body exceeded the configured maximum length.
    BodyTooLarge,
    /// The bytes on the wire do not form a valid HTTP/1.1 request head.
    MalformedHead(&'static str),
    /// A syntactically valid request we cannot serve.
    Unsupported(&'static str),
    /// The underlying transport failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::HeadTooLarge => write!(f, "request head is too large"),
            Error::BodyTooLarge => write!(f, "request body is too large"),
            Error::MalformedHead(detail) => write!(f, "malformed request head: {}", detail),
            Error::Unsupported(detail) => write!(f, "unsupported request: {}", detail),
            Error::Io(err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<httparse::Error> for Error {
    fn from(_: httparse::Error) -> Self {
        Error::MalformedHead("invalid token in request head")
    }
}

/// Peers dropping a connection mid-read is routine, everything else is not.
pub(crate) fn recv_error_level(err: &io::Error) -> log::Level {
    match err.kind() {
        io::ErrorKind::ConnectionReset => log::Level::Warn,
        _ => log::Level::Error,
    }
}

/// Peers going away before the response finished is routine as well.
pub(crate) fn send_error_level(err: &io::Error) -> log::Level {
    match err.kind() {
        io::ErrorKind::BrokenPipe => log::Level::Warn,
        _ => log::Level::Error,
    }
}
