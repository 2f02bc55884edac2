use chrono::Utc;
use futures::stream::{self, Stream};
use std::time::Duration;

use crate::integrator::SharedIntegrator;
use crate::stop::StopFlag;
use crate::types::{TelemetrySample, Timestamp, NANOS_PER_SECOND};

/// Sub-second precision kept on outgoing timestamps, in nanoseconds (1 µs).
pub const TIMESTAMP_RESOLUTION_NANOS: u64 = 1_000;

pub const DEFAULT_PACING: Duration = Duration::from_secs(1);

/// Split a wall-clock reading into whole seconds and nanos rounded to the
/// microsecond. A rounding carry (or a leap-second reading) rolls into the
/// seconds so `nanos` always stays in `[0, 1e9)`.
pub fn split_timestamp(seconds: i64, subsec_nanos: u32) -> Timestamp {
    let half = TIMESTAMP_RESOLUTION_NANOS / 2;
    let mut nanos =
        (subsec_nanos as u64 + half) / TIMESTAMP_RESOLUTION_NANOS * TIMESTAMP_RESOLUTION_NANOS;
    let mut seconds = seconds;
    while nanos >= NANOS_PER_SECOND as u64 {
        nanos -= NANOS_PER_SECOND as u64;
        seconds += 1;
    }
    Timestamp::new(seconds, nanos as i32)
}

pub fn now_timestamp() -> Timestamp {
    let now = Utc::now();
    split_timestamp(now.timestamp(), now.timestamp_subsec_nanos())
}

/// Produces the telemetry bursts sent on each outbound call.
#[derive(Clone, Debug)]
pub struct BurstGenerator {
    user_id: String,
    integrator: SharedIntegrator,
    stop: StopFlag,
    pacing: Duration,
}

impl BurstGenerator {
    pub fn new(user_id: &str, integrator: SharedIntegrator, stop: StopFlag) -> Self {
        Self {
            user_id: user_id.to_string(),
            integrator,
            stop,
            pacing: DEFAULT_PACING,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Lazy, finite sequence of `duration` samples, one per pacing interval.
    ///
    /// Each element reads the clock and evaluates the integrator only when
    /// polled. Ends early once the stop flag is observed between elements.
    /// A fresh stream is needed for every burst.
    pub fn generate(&self, duration: u32) -> impl Stream<Item = TelemetrySample> + Send + 'static {
        let generator = self.clone();
        stream::unfold(0u32, move |index| {
            let generator = generator.clone();
            async move {
                if index >= duration {
                    return None;
                }
                if index > 0 {
                    tokio::time::sleep(generator.pacing).await;
                }
                if generator.stop.is_set() {
                    log::debug!("Burst cut short after {} of {} samples", index, duration);
                    return None;
                }
                Some((generator.sample(), index + 1))
            }
        })
    }

    fn sample(&self) -> TelemetrySample {
        let timestamp = now_timestamp();
        let (latitude, longitude) = self.integrator.evaluate(timestamp.as_nanos_f64());
        log::info!(
            "Sending my position: latitude: {}, longitude: {}",
            latitude,
            longitude
        );
        TelemetrySample::with_location(&self.user_id, latitude, longitude, timestamp)
    }
}
