use futures::sink::{Sink, SinkExt};
use futures::stream::{Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::dispatcher::CommandDispatcher;
use crate::error::ChannelError;
use crate::input::CommandPrompt;
use crate::stop::StopFlag;
use crate::transport::{frame_reader, frame_writer};
use crate::types::{Command, TelemetrySample};

/// Per-call server state machine. Every call starts fresh at `Ingesting`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    /// Acknowledge each inbound sample until the client half-closes.
    Ingesting,
    /// Wait for the operator's next command.
    Dispatching,
    /// Send the terminating command, if any, then close.
    Emitting(Option<Command>),
    Closed,
}

/// What one call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSummary {
    pub samples: usize,
    pub acks: usize,
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub calls: u64,
    pub samples: u64,
}

/// Server side of the telemetry stream.
///
/// The pending command slot is shared by every call. Dispatching is
/// serialized through the command prompt, so each operator command is handed
/// to exactly one call.
pub struct TelemetryService {
    dispatcher: Arc<CommandDispatcher>,
    prompt: Arc<Mutex<CommandPrompt>>,
    stop: StopFlag,
    idle_timeout: Duration,
    calls: AtomicU64,
    samples: AtomicU64,
}

impl TelemetryService {
    pub fn new(prompt: CommandPrompt, stop: StopFlag, idle_timeout: Duration) -> Self {
        Self {
            dispatcher: Arc::new(CommandDispatcher::new()),
            prompt: Arc::new(Mutex::new(prompt)),
            stop,
            idle_timeout,
            calls: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            calls: self.calls.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
        }
    }

    /// Drive one call from its first inbound sample to the closing of its
    /// response stream.
    pub async fn handle_call<I, O>(&self, mut inbound: I, mut outbound: O) -> Result<CallSummary, ChannelError>
    where
        I: Stream<Item = Result<TelemetrySample, ChannelError>> + Unpin,
        O: Sink<Command, Error = ChannelError> + Unpin,
    {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut summary = CallSummary::default();
        let mut state = CallState::Ingesting;

        loop {
            state = match state {
                CallState::Ingesting => match self.next_inbound(&mut inbound).await? {
                    Some(sample) => {
                        sample.validate(summary.samples == 0)?;
                        log_sample(&sample);
                        summary.samples += 1;
                        self.samples.fetch_add(1, Ordering::Relaxed);

                        outbound.send(Command::ack()).await?;
                        summary.acks += 1;
                        CallState::Ingesting
                    }
                    None => CallState::Dispatching,
                },
                CallState::Dispatching => CallState::Emitting(self.wait_for_command().await),
                CallState::Emitting(command) => {
                    match command {
                        Some(command) => {
                            if let Err(e) = outbound.send(command).await {
                                log::error!("Command \"{}\" could not be delivered: {}", command, e);
                                return Err(e);
                            }
                            summary.command = Some(command);
                        }
                        None => log::info!("Ending call without a command"),
                    }
                    outbound.close().await?;
                    CallState::Closed
                }
                CallState::Closed => return Ok(summary),
            };
        }
    }

    async fn next_inbound<I>(&self, inbound: &mut I) -> Result<Option<TelemetrySample>, ChannelError>
    where
        I: Stream<Item = Result<TelemetrySample, ChannelError>> + Unpin,
    {
        match tokio::time::timeout(self.idle_timeout, inbound.next()).await {
            Ok(next) => next.transpose(),
            Err(_) => Err(ChannelError::Timeout(self.idle_timeout)),
        }
    }

    /// Block on the operator off the async worker threads. The command is
    /// taken from the slot while the prompt is held, so concurrent calls
    /// never see the same command. `None` means the server is stopping.
    async fn wait_for_command(&self) -> Option<Command> {
        let prompt = self.prompt.clone();
        let dispatcher = self.dispatcher.clone();
        let stop = self.stop.clone();

        let waited = tokio::task::spawn_blocking(move || {
            let prompt = prompt.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            prompt.wait_for_command(&dispatcher, &stop)
        })
        .await;

        match waited {
            Ok(command) => command,
            Err(e) => {
                log::error!("Command prompt failed: {}", e);
                self.stop.set();
                None
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
        }
        let (read, write) = stream.into_split();
        let inbound = frame_reader::<TelemetrySample>(read);
        let outbound = frame_writer::<Command>(write);

        match self.handle_call(inbound, outbound).await {
            Ok(summary) => log::info!(
                "Call from {} complete: {} samples, {} acks, command: {}",
                peer,
                summary.samples,
                summary.acks,
                summary
                    .command
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string())
            ),
            Err(e) => log::error!("Call from {} failed: {}", peer, e),
        }
    }

    /// Accept calls until the stop flag is set, handling at most
    /// `max_concurrent_calls` at once. Once stopped, the listener is dropped
    /// and further connections are refused.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, max_concurrent_calls: usize) {
        let limit = Arc::new(Semaphore::new(max_concurrent_calls.max(1)));

        loop {
            let accepted = tokio::select! {
                _ = self.stop.stopped() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            log::debug!("Accepted call from {}", peer);

            let service = self.clone();
            let limit = limit.clone();
            tokio::spawn(async move {
                let Ok(_permit) = limit.acquire_owned().await else {
                    return;
                };
                service.handle_connection(stream, peer).await;
            });
        }

        drop(listener);
        let stats = self.stats();
        log::info!(
            "Server stopped after {} calls and {} samples",
            stats.calls,
            stats.samples
        );
    }
}

fn log_sample(sample: &TelemetrySample) {
    match &sample.location {
        Some(location) => log::info!(
            "Received telemetry from user {}: Location({}, {}) at {} seconds and {} nanoseconds",
            sample.user_id,
            location.latitude,
            location.longitude,
            location.timestamp.seconds,
            location.timestamp.nanos
        ),
        None => log::info!("Received handshake from user {}", sample.user_id),
    }
}
