/// Error type for smartmeter operations
///
/// Failures fall into two classes that callers care about: the device could not be
/// reached or did not answer properly (`is_network()`), and the device answered with
/// a document that could not be parsed (`is_parse()`). A reply with zero samples is
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("A historical fetch is already in progress")]
    FetchInProgress,

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl Error {
    pub(crate) fn network<S: Into<String>>(msg: S) -> Self {
        Error::Network(msg.into())
    }

    pub(crate) fn parse<S: Into<String>>(msg: S) -> Self {
        Error::Parse(msg.into())
    }

    pub(crate) fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Error::InvalidConfig(msg.into())
    }

    pub(crate) fn runtime<S: Into<String>>(msg: S) -> Self {
        Error::Runtime(msg.into())
    }

    /// True for unreachable hosts, timeouts, resets and non-success HTTP replies.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::HttpStatus { .. })
    }

    /// True when the reply body was not a usable profile document.
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::network(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Error::network(format!("connection failed: {err}"))
        } else {
            Error::network(err.to_string())
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        match err {
            // The body stream surfaces transport failures as I/O errors inside the reader.
            quick_xml::Error::Io(io) => Error::network(format!("response body read failed: {io}")),
            other => Error::parse(other.to_string()),
        }
    }
}

/// Result type for smartmeter operations
pub type Result<T> = std::result::Result<T, Error>;
