//! Bidirectional telemetry streaming between a phone-like client and a
//! dispatcher server.
//!
//! The client opens a call, sends a burst of position samples and reads the
//! server's per-sample acknowledgements followed by one command telling it
//! how many samples to send on the next call. Positions come from an
//! operator-supplied equation integrated over wall-clock time.

pub mod burst;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod equation;
pub mod error;
pub mod input;
pub mod integrator;
pub mod logging;
pub mod server;
pub mod stop;
pub mod transport;
pub mod types;

pub use client::{generate_user_id, ClientStats, TelemetryClient};
pub use config::Config;
pub use dispatcher::CommandDispatcher;
pub use equation::PositionEquation;
pub use error::{ChannelError, CommandGrammarError, ConfigError, EquationParseError};
pub use integrator::{PositionIntegrator, SharedIntegrator};
pub use server::{CallSummary, ServiceStats, TelemetryService};
pub use stop::StopFlag;
pub use types::{Command, Location, TelemetrySample, Timestamp};
