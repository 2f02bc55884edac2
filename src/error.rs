use thiserror::Error;

/// Malformed position equation text. Recovered locally by re-prompting.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid equation at position {position}: {message}")]
pub struct EquationParseError {
    pub position: usize,
    pub message: String,
}

impl EquationParseError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Operator text that does not match `start <duration>` or `get_one`.
/// Absorbed at the command source, never reaches the dispatcher.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandGrammarError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("start requires exactly one duration argument, got {0:?}")]
    MissingDuration(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

/// Transport failure or unexpected message shape. Fatal to the session.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    #[error("could not decode frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("channel closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
