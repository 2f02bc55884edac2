use crossbeam::channel::{self, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Terminal, one-way stop signal shared by every thread of control in a session.
///
/// Checked cheaply with [`StopFlag::is_set`], awaited from async code with
/// [`StopFlag::stopped`], and selectable from blocking threads through
/// [`StopFlag::gate`], which disconnects once the flag is set.
#[derive(Clone, Debug)]
pub struct StopFlag {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    stopped: AtomicBool,
    watch: watch::Sender<bool>,
    gate_tx: Mutex<Option<Sender<()>>>,
    gate_rx: Receiver<()>,
}

impl StopFlag {
    pub fn new() -> Self {
        let (watch, _) = watch::channel(false);
        let (gate_tx, gate_rx) = channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                stopped: AtomicBool::new(false),
                watch,
                gate_tx: Mutex::new(Some(gate_tx)),
                gate_rx,
            }),
        }
    }

    /// Set the flag. Returns `true` only for the call that actually set it.
    pub fn set(&self) -> bool {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.watch.send_replace(true);
        // dropping the only sender disconnects every gate receiver
        self.inner
            .gate_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        true
    }

    pub fn is_set(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Resolves once the flag is set (immediately if it already is).
    pub async fn stopped(&self) {
        let mut rx = self.inner.watch.subscribe();
        // the sender lives in `inner`, so this only errors if it is dropped
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Receiver that never yields a value and disconnects when the flag is set.
    /// Use inside `crossbeam::select!` next to a blocking input channel.
    pub fn gate(&self) -> &Receiver<()> {
        &self.inner.gate_rx
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}
