//! The transfer event channel adapter.
//!
//! The cryptographic engagement and the secure channel live in an external engine, seen here
//! through the [TransferChannel] trait. [TransferAdapter] wraps one session of that engine
//! behind a stable interface: it starts the engagement once, hands out the event stream once,
//! and guarantees the stream ends when the session is stopped. It never retries, every failure
//! reaches the session as a [TransferEvent::Error].

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::{
    cancel::CancellationToken,
    config::SessionConfig,
    core::{event::TransferEvent, selection::DisclosureSelection},
    error::SessionError,
};

pub mod memory;

/// The external secure-messaging engine.
///
/// Calls issue a command and return without waiting for its result. Results are observed
/// through the events.
pub trait TransferChannel: Debug + Send + Sync {
    /// Configure the next engagement. `config` is passed through unmodified.
    fn set_config(&self, config: &SessionConfig);

    /// Start advertising the engagement, e.g. generate the QR code.
    fn start_engagement(&self) -> Result<()>;

    /// Take the event stream of the current session.
    ///
    /// The stream ends after [TransferChannel::stop].
    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<TransferEvent>>;

    /// Send the confirmed disclosure to the verifier.
    fn update_selection(&self, selection: &DisclosureSelection) -> Result<()>;

    /// Tear down the engagement and the secure channel.
    fn stop(&self);
}

/// Enables the secondary engagement mode, e.g. NFC, which depends on a platform handle the
/// session does not know about.
pub trait AlternateEngagementToggle: Debug + Send + Sync {
    fn toggle(&self, enable: bool) -> Result<()>;
}

/// Wraps one session of a [TransferChannel].
#[derive(Debug)]
pub struct TransferAdapter {
    channel: Arc<dyn TransferChannel>,
    alternate_engagement: Option<Arc<dyn AlternateEngagementToggle>>,
    started: AtomicBool,
    subscribed: AtomicBool,
    stopped: CancellationToken,
    faults_tx: mpsc::UnboundedSender<TransferEvent>,
    faults_rx: Mutex<Option<mpsc::UnboundedReceiver<TransferEvent>>>,
}

impl TransferAdapter {
    pub fn new(
        channel: Arc<dyn TransferChannel>,
        alternate_engagement: Option<Arc<dyn AlternateEngagementToggle>>,
    ) -> Self {
        let (faults_tx, faults_rx) = mpsc::unbounded_channel();
        Self {
            channel,
            alternate_engagement,
            started: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
            stopped: CancellationToken::new(),
            faults_tx,
            faults_rx: Mutex::new(Some(faults_rx)),
        }
    }

    pub fn set_config(&self, config: &SessionConfig) {
        self.channel.set_config(config)
    }

    /// Start the engagement. Does nothing if it was already started.
    pub fn start_engagement(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("engagement already started");
            return;
        }
        if let Err(e) = self.channel.start_engagement() {
            self.fault(SessionError::Engagement(format!("{e:#}")));
        }
    }

    /// Enable or disable the secondary engagement mode.
    pub fn toggle_alternate_engagement(&self, enable: bool) {
        let Some(toggle) = &self.alternate_engagement else {
            warn!(enable, "no alternate engagement available");
            return;
        };
        if let Err(e) = toggle.toggle(enable) {
            self.fault(SessionError::Engagement(format!("{e:#}")));
        }
    }

    /// Subscribe to the session's events. Only one subscription is allowed.
    pub fn events(&self) -> Result<TransferEvents, SessionError> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadySubscribed);
        }

        let faults = self
            .faults_rx
            .try_lock()
            .ok()
            .and_then(|mut faults| faults.take())
            .ok_or(SessionError::AlreadySubscribed)?;

        let upstream = self
            .channel
            .subscribe()
            .map_err(|e| SessionError::Engagement(format!("{e:#}")))?;

        Ok(TransferEvents {
            upstream,
            faults,
            stopped: self.stopped.clone(),
        })
    }

    /// Push the confirmed disclosure to the verifier.
    pub fn update_selection(&self, selection: &DisclosureSelection) {
        if self.stopped.is_cancelled() {
            warn!("session stopped, selection not sent");
            return;
        }
        if let Err(e) = self.channel.update_selection(selection) {
            self.fault(SessionError::Processing(e));
        }
    }

    /// Stop the session and end the event stream. Safe to call any number of times.
    pub fn stop(&self) {
        if self.stopped.cancel() {
            debug!("stopping transfer channel");
            self.channel.stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    fn fault(&self, error: SessionError) {
        warn!(%error, "transfer channel failure");
        let message = match error {
            SessionError::Engagement(message) | SessionError::Protocol(message) => message,
            other => other.to_string(),
        };
        // The receiver is only gone once the stream is dropped, nobody is listening then.
        let _ = self.faults_tx.send(TransferEvent::Error { message });
    }
}

/// The ordered event stream of one session.
#[derive(Debug)]
pub struct TransferEvents {
    upstream: mpsc::UnboundedReceiver<TransferEvent>,
    faults: mpsc::UnboundedReceiver<TransferEvent>,
    stopped: CancellationToken,
}

impl TransferEvents {
    /// Wait for the next event. Returns `None` once the session is stopped or the channel
    /// closed the stream.
    pub async fn next(&mut self) -> Option<TransferEvent> {
        if self.stopped.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.stopped.cancelled() => None,
            Some(event) = self.faults.recv() => Some(event),
            event = self.upstream.recv() => event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{memory::MemoryTransferChannel, *};

    fn adapter(channel: &MemoryTransferChannel) -> TransferAdapter {
        TransferAdapter::new(
            Arc::new(channel.clone()),
            Some(Arc::new(channel.clone())),
        )
    }

    #[tokio::test]
    async fn engagement_starts_once() {
        let channel = MemoryTransferChannel::new();
        let adapter = adapter(&channel);

        adapter.set_config(&SessionConfig::proximity_qr());
        adapter.start_engagement();
        adapter.start_engagement();

        assert_eq!(channel.start_count(), 1);
        assert_eq!(channel.config(), Some(SessionConfig::proximity_qr()));
    }

    #[tokio::test]
    async fn events_subscribe_once() {
        let channel = MemoryTransferChannel::new();
        let adapter = adapter(&channel);

        let _events = adapter.events().unwrap();
        assert!(matches!(
            adapter.events(),
            Err(SessionError::AlreadySubscribed)
        ));
    }

    #[tokio::test]
    async fn stop_ends_the_stream_and_is_idempotent() {
        let channel = MemoryTransferChannel::new();
        let adapter = adapter(&channel);
        let mut events = adapter.events().unwrap();

        channel.emit(TransferEvent::Connected);
        assert_eq!(events.next().await, Some(TransferEvent::Connected));

        adapter.stop();
        adapter.stop();
        channel.emit(TransferEvent::Disconnected);

        assert_eq!(events.next().await, None);
        assert_eq!(channel.stop_count(), 1);
        assert!(adapter.is_stopped());
    }

    #[tokio::test]
    async fn engagement_failure_surfaces_as_error_event() {
        let channel = MemoryTransferChannel::new().failing_engagement("bluetooth is off");
        let adapter = adapter(&channel);
        let mut events = adapter.events().unwrap();

        adapter.start_engagement();

        assert_eq!(
            events.next().await,
            Some(TransferEvent::Error {
                message: "bluetooth is off".into()
            })
        );
    }

    #[tokio::test]
    async fn alternate_engagement_is_forwarded() {
        let channel = MemoryTransferChannel::new();
        let adapter = adapter(&channel);

        adapter.toggle_alternate_engagement(true);
        adapter.toggle_alternate_engagement(false);

        assert_eq!(channel.alternate_engagement_toggles(), [true, false]);

        // Without the capability the toggle is ignored.
        TransferAdapter::new(Arc::new(channel.clone()), None).toggle_alternate_engagement(true);
        assert_eq!(channel.alternate_engagement_toggles().len(), 2);
    }

    #[tokio::test]
    async fn selection_is_not_sent_after_stop() {
        let channel = MemoryTransferChannel::new();
        let adapter = adapter(&channel);

        adapter.update_selection(&DisclosureSelection::default());
        adapter.stop();
        adapter.update_selection(&DisclosureSelection::default());

        assert_eq!(channel.selections().len(), 1);
    }
}
