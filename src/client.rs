use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::burst::BurstGenerator;
use crate::config::{ChannelConfig, ClientConfig};
use crate::error::ChannelError;
use crate::integrator::SharedIntegrator;
use crate::stop::StopFlag;
use crate::transport::{Call, TelemetryChannel};
use crate::types::TelemetrySample;

/// Fresh per-process user id: a random UUID rendered as 32 hex digits.
pub fn generate_user_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Client driver states.
pub enum ClientState {
    /// Open the handshake call.
    Connecting,
    /// Open a call carrying a burst of `duration` samples.
    Streaming { duration: u32 },
    /// Read the latest call's responses. `idle_since` is set once that call
    /// has ended without a command.
    AwaitingCommand { call: Call, idle_since: Option<Instant> },
    Stopped,
}

/// Per-run counters, returned by [`TelemetryClient::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub calls: u64,
    pub acks: u64,
    pub bursts: u64,
}

/// Client side of the telemetry stream.
///
/// Sends a handshake, then answers every `Start`/`GetOne` with a new call
/// carrying a burst of that many samples. Runs until the stop flag is set,
/// the channel fails, or the server stays silent past the idle limit.
pub struct TelemetryClient {
    user_id: String,
    integrator: SharedIntegrator,
    stop: StopFlag,
    channel: TelemetryChannel,
    bursts: BurstGenerator,
    idle_pacing: Duration,
    idle_limit: Duration,
}

impl TelemetryClient {
    pub fn new(
        user_id: &str,
        integrator: SharedIntegrator,
        stop: StopFlag,
        channel: ChannelConfig,
        config: &ClientConfig,
    ) -> Self {
        let bursts = BurstGenerator::new(user_id, integrator.clone(), stop.clone())
            .with_pacing(config.pacing());
        Self {
            user_id: user_id.to_string(),
            integrator,
            stop,
            channel: TelemetryChannel::new(channel),
            bursts,
            idle_pacing: config.idle_pacing(),
            idle_limit: config.idle_limit(),
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.bursts = self.bursts.with_pacing(pacing);
        self
    }

    pub fn with_idle(mut self, idle_pacing: Duration, idle_limit: Duration) -> Self {
        self.idle_pacing = idle_pacing;
        self.idle_limit = idle_limit;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn integrator(&self) -> &SharedIntegrator {
        &self.integrator
    }

    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// Drive the session to completion. Always leaves the stop flag set.
    ///
    /// Returns the channel error that ended the session, if any.
    pub async fn run(&self) -> Result<ClientStats, ChannelError> {
        let mut stats = ClientStats::default();
        let mut failure = None;
        let mut state = ClientState::Connecting;

        loop {
            if self.stop.is_set() && !matches!(state, ClientState::Stopped) {
                state = ClientState::Stopped;
            }

            state = match state {
                ClientState::Connecting => {
                    log::info!("Connecting to {} as user {}", self.channel.config().addr(), self.user_id);
                    let handshake = stream::iter([TelemetrySample::handshake(&self.user_id)]);
                    self.open(handshake, &mut stats, &mut failure).await
                }
                ClientState::Streaming { duration } => {
                    log::info!("Starting burst of {} samples", duration);
                    stats.bursts += 1;
                    self.open(self.bursts.generate(duration), &mut stats, &mut failure)
                        .await
                }
                ClientState::AwaitingCommand { mut call, idle_since } => {
                    let response = tokio::select! {
                        _ = self.stop.stopped() => None,
                        response = call.next() => Some(response),
                    };
                    match response {
                        None => ClientState::Stopped,
                        Some(Some(Ok(command))) => match command.burst_size() {
                            Some(duration) => {
                                log::info!("Got command: {}", command);
                                ClientState::Streaming { duration }
                            }
                            None => {
                                log::info!("Got acknowledge");
                                stats.acks += 1;
                                ClientState::AwaitingCommand { call, idle_since: None }
                            }
                        },
                        Some(Some(Err(e))) => {
                            log::error!("Occurred an error: {}", e);
                            failure = Some(e);
                            ClientState::Stopped
                        }
                        Some(None) => self.idle(call, idle_since).await,
                    }
                }
                ClientState::Stopped => break,
            };
        }

        self.stop.set();
        log::info!(
            "Stopped after {} calls, {} bursts and {} acknowledgements",
            stats.calls,
            stats.bursts,
            stats.acks
        );
        match failure {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    async fn open<S>(
        &self,
        requests: S,
        stats: &mut ClientStats,
        failure: &mut Option<ChannelError>,
    ) -> ClientState
    where
        S: futures::Stream<Item = TelemetrySample> + Send + 'static,
    {
        match self.channel.open_call(requests).await {
            Ok(call) => {
                stats.calls += 1;
                ClientState::AwaitingCommand { call, idle_since: None }
            }
            Err(e) => {
                log::error!("Occurred an error: {}", e);
                *failure = Some(e);
                ClientState::Stopped
            }
        }
    }

    /// The latest call ended without a command. Wait one idle interval,
    /// or stop once the idle limit is exceeded.
    async fn idle(&self, call: Call, idle_since: Option<Instant>) -> ClientState {
        let since = idle_since.unwrap_or_else(|| {
            log::debug!("Call #{} ended without a command", call.id());
            Instant::now()
        });
        if since.elapsed() >= self.idle_limit {
            log::warn!("No command from server for {:?}, stopping", self.idle_limit);
            return ClientState::Stopped;
        }

        tokio::select! {
            _ = self.stop.stopped() => ClientState::Stopped,
            _ = tokio::time::sleep(self.idle_pacing) => ClientState::AwaitingCommand {
                call,
                idle_since: Some(since),
            },
        }
    }
}
