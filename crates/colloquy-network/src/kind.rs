use std::fmt;
use std::io;

/// Classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    Timeout,
    OpenTimeout,
    ReadTimeout,
    ConnectionRefused,
    NetworkUnreachable,
    Connection,
    Tls,
    Parse,
    Validation,
    Other,
}

impl NetworkErrorKind {
    /// Whether a call failing this way is worth attempting again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NetworkErrorKind::Timeout
                | NetworkErrorKind::OpenTimeout
                | NetworkErrorKind::ReadTimeout
                | NetworkErrorKind::ConnectionRefused
                | NetworkErrorKind::NetworkUnreachable
                | NetworkErrorKind::Connection
                | NetworkErrorKind::Tls
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            NetworkErrorKind::Timeout | NetworkErrorKind::OpenTimeout | NetworkErrorKind::ReadTimeout
        )
    }

    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            NetworkErrorKind::ConnectionRefused
                | NetworkErrorKind::NetworkUnreachable
                | NetworkErrorKind::Connection
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            NetworkErrorKind::Timeout => "timeout",
            NetworkErrorKind::OpenTimeout => "open_timeout",
            NetworkErrorKind::ReadTimeout => "read_timeout",
            NetworkErrorKind::ConnectionRefused => "connection_refused",
            NetworkErrorKind::NetworkUnreachable => "network_unreachable",
            NetworkErrorKind::Connection => "connection",
            NetworkErrorKind::Tls => "tls",
            NetworkErrorKind::Parse => "parse",
            NetworkErrorKind::Validation => "validation",
            NetworkErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors that can report which [`NetworkErrorKind`] they belong to.
///
/// The retry controller only consults this trait, so any transport error
/// type can be retried once it knows how to classify itself.
pub trait ClassifyError {
    fn kind(&self) -> NetworkErrorKind;
}

impl ClassifyError for io::Error {
    fn kind(&self) -> NetworkErrorKind {
        match io::Error::kind(self) {
            io::ErrorKind::TimedOut => NetworkErrorKind::Timeout,
            io::ErrorKind::ConnectionRefused => NetworkErrorKind::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable => {
                NetworkErrorKind::NetworkUnreachable
            }
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::UnexpectedEof => NetworkErrorKind::Connection,
            io::ErrorKind::InvalidData => NetworkErrorKind::Parse,
            io::ErrorKind::InvalidInput => NetworkErrorKind::Validation,
            _ => NetworkErrorKind::Other,
        }
    }
}

impl ClassifyError for serde_json::Error {
    fn kind(&self) -> NetworkErrorKind {
        NetworkErrorKind::Parse
    }
}

/// Classify a transport error that only survives as text.
///
/// Checks run most specific first so that "SSL connection timed out" is
/// treated as a TLS failure rather than a plain timeout.
pub fn classify_message(message: &str) -> NetworkErrorKind {
    let lower = message.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("ssl") || has("tls") || has("certificate") {
        NetworkErrorKind::Tls
    } else if has("econnrefused") || has("connection refused") {
        NetworkErrorKind::ConnectionRefused
    } else if has("enetunreach") || has("network unreachable") || has("network is unreachable") {
        NetworkErrorKind::NetworkUnreachable
    } else if has("open timeout") || has("connect timeout") {
        NetworkErrorKind::OpenTimeout
    } else if has("read timeout") {
        NetworkErrorKind::ReadTimeout
    } else if has("etimedout") || has("timed out") || has("timeout") {
        NetworkErrorKind::Timeout
    } else if has("connection") {
        NetworkErrorKind::Connection
    } else if has("json") || has("parse") || has("unexpected token") {
        NetworkErrorKind::Parse
    } else {
        NetworkErrorKind::Other
    }
}

/// A provider call failure carrying an explicit classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    pub kind: NetworkErrorKind,
    pub message: String,
}

impl CallError {
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error whose kind is inferred from the message text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: classify_message(&message),
            message,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(NetworkErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(NetworkErrorKind::Connection, message)
    }

    pub fn tls(message: impl Into<String>) -> Self {
        Self::new(NetworkErrorKind::Tls, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(NetworkErrorKind::Parse, message)
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CallError {}

impl ClassifyError for CallError {
    fn kind(&self) -> NetworkErrorKind {
        self.kind
    }
}
