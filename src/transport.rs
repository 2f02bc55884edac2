//! Wire transport for the telemetry stream.
//!
//! One call is one TCP connection. Each direction carries newline-delimited
//! JSON frames. The client half-closes its write side once its request
//! stream is exhausted, which is how the server learns the burst is over.

use futures::future::{self, FutureExt};
use futures::ready;
use futures::sink::{Sink, SinkExt};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::types::{Command, TelemetrySample};

/// Longest accepted frame, in bytes.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

pub type FrameStream<T> = BoxStream<'static, Result<T, ChannelError>>;

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

pub fn codec() -> LinesCodec {
    LinesCodec::new_with_max_length(MAX_FRAME_LENGTH)
}

pub fn encode_frame<T: Serialize>(item: &T) -> Result<String, ChannelError> {
    Ok(serde_json::to_string(item)?)
}

pub fn decode_frame<T: DeserializeOwned>(line: &str) -> Result<T, ChannelError> {
    Ok(serde_json::from_str(line)?)
}

/// Decode JSON frames from the read half of a connection. The stream is
/// fused: once the peer has closed, it keeps returning `None`.
pub fn frame_reader<T>(read: OwnedReadHalf) -> FrameStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    FramedRead::new(read, codec())
        .map(|line| decode_frame(&line?))
        .fuse()
        .boxed()
}

/// Encode JSON frames onto the write half of a connection. Closing the sink
/// shuts down the write side of the socket.
pub fn frame_writer<T>(write: OwnedWriteHalf) -> impl Sink<T, Error = ChannelError> + Send + Unpin
where
    T: Serialize + Send + 'static,
{
    // LinesCodec encodes several string types; pin the sink to `String`
    SinkExt::<String>::sink_map_err(FramedWrite::new(write, codec()), ChannelError::from)
        .with(|item: T| future::ready(encode_frame(&item)))
}

/// Open a TCP connection using the channel's tuning parameters.
pub async fn connect(config: &ChannelConfig) -> Result<TcpStream, ChannelError> {
    let addr = config.addr();
    let connect_err = |source| ChannelError::Connect {
        addr: addr.clone(),
        source,
    };

    let resolved = tokio::net::lookup_host(&addr)
        .await
        .map_err(connect_err)?
        .next()
        .ok_or_else(|| {
            connect_err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "address did not resolve",
            ))
        })?;

    let socket = if resolved.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(connect_err)?;
    socket.set_keepalive(config.keepalive).map_err(connect_err)?;

    let timeout = config.connect_timeout();
    match tokio::time::timeout(timeout, socket.connect(resolved)).await {
        Ok(Ok(stream)) => {
            stream.set_nodelay(true).map_err(connect_err)?;
            Ok(stream)
        }
        Ok(Err(source)) => Err(connect_err(source)),
        Err(_) => Err(ChannelError::Timeout(timeout)),
    }
}

/// Client-side handle from which calls are opened.
#[derive(Clone, Debug)]
pub struct TelemetryChannel {
    config: ChannelConfig,
}

impl TelemetryChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Open a new call whose request stream is `requests`.
    ///
    /// The requests are pumped by a background task that half-closes the
    /// connection when the stream ends. The returned [`Call`] yields the
    /// server's responses.
    pub async fn open_call<S>(&self, requests: S) -> Result<Call, ChannelError>
    where
        S: Stream<Item = TelemetrySample> + Send + 'static,
    {
        let stream = connect(&self.config).await?;
        let id = NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed);
        let (read, write) = stream.into_split();
        log::debug!("Opened call #{} to {}", id, self.config.addr());

        let writer = tokio::spawn(async move {
            let mut sink = frame_writer::<TelemetrySample>(write);
            let mut requests = Box::pin(requests);
            let mut sent = 0usize;
            while let Some(sample) = requests.next().await {
                if let Err(e) = sink.send(sample).await {
                    log::warn!("Call #{}: failed to send sample {}: {}", id, sent + 1, e);
                    return Err(e);
                }
                sent += 1;
            }
            sink.close().await?;
            log::debug!("Call #{}: request stream finished after {} samples", id, sent);
            Ok(sent)
        });

        Ok(Call {
            id,
            responses: frame_reader(read),
            writer: Some(writer),
        })
    }
}

/// One in-flight call. Dropping it abandons any unread responses and stops
/// the request pump.
///
/// Once the server closes the response stream, the call waits for its
/// request pump and yields the pump's error, if any, before ending. A burst
/// cut off by a broken connection therefore ends in `Err`, not a clean close.
pub struct Call {
    id: u64,
    responses: FrameStream<Command>,
    writer: Option<JoinHandle<Result<usize, ChannelError>>>,
}

impl Call {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Stream for Call {
    type Item = Result<Command, ChannelError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(response) = ready!(self.responses.poll_next_unpin(cx)) {
            return Poll::Ready(Some(response));
        }

        let Some(writer) = self.writer.as_mut() else {
            return Poll::Ready(None);
        };
        let outcome = ready!(writer.poll_unpin(cx));
        self.writer = None;

        match outcome {
            Ok(Ok(_)) => Poll::Ready(None),
            Ok(Err(e)) => Poll::Ready(Some(Err(e))),
            Err(e) if e.is_cancelled() => Poll::Ready(None),
            Err(e) => Poll::Ready(Some(Err(ChannelError::Io(io::Error::new(
                io::ErrorKind::Other,
                e,
            ))))),
        }
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        if let Some(writer) = &self.writer {
            writer.abort();
        }
    }
}
