use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-to-client message carried on a call's response stream.
///
/// A call carries zero or more `Ack`s followed by at most one `Start` or
/// `GetOne`, after which the server closes the stream. "No command pending"
/// is modelled as `Option<Command>::None` and never goes on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Open a new call carrying a burst of `duration` samples.
    Start { duration: u32 },
    /// Open a new call carrying exactly one sample.
    GetOne {},
    /// One per inbound sample.
    Ack {},
}

impl Command {
    pub fn start(duration: u32) -> Self {
        Command::Start { duration }
    }

    pub fn get_one() -> Self {
        Command::GetOne {}
    }

    pub fn ack() -> Self {
        Command::Ack {}
    }

    /// Burst size requested by this command, if it terminates a call.
    pub fn burst_size(&self) -> Option<u32> {
        match self {
            Command::Start { duration } => Some(*duration),
            Command::GetOne {} => Some(1),
            Command::Ack {} => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start { duration } => write!(f, "start {}", duration),
            Command::GetOne {} => write!(f, "get_one"),
            Command::Ack {} => write!(f, "ack"),
        }
    }
}
