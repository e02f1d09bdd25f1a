//! The session controller.
//!
//! A [SessionController] sequences one presentation session at a time:
//!
//! ```text
//! Idle -> Engaging -> AwaitingRequest -> PresentingDisclosure -> AwaitingResponse -> Terminal
//! ```
//!
//! Transfer events are consumed by a single background worker per session, user actions
//! (`toggle`, `confirm`, `cancel`) come from the presentation layer. Both go through the same
//! state lock, and every path into `Terminal` stops the transfer adapter.

use std::sync::{Arc, PoisonError};

use anyhow::{anyhow, bail};
use presentment_frontend::{SessionOutcome, Status};
use tokio::{
    sync::{watch, Mutex, MutexGuard},
    task::{AbortHandle, JoinHandle},
};
use tracing::{debug, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

use crate::{
    config::{DisclosureLabels, SessionConfig},
    core::{
        disclosure::{DisclosureTransformer, ItemId, RequestDisclosure},
        document::DocumentStore,
        event::{RequestedDocument, TransferEvent, VerifierInfo},
        outcome::interpret,
        selection::{DisclosureSelection, SelectionTracker},
    },
    error::SessionError,
    transfer::{AlternateEngagementToggle, TransferAdapter, TransferChannel, TransferEvents},
};

/// Orchestrates presentation sessions against a transfer channel and a document store.
#[derive(Debug)]
pub struct SessionController {
    channel: Arc<dyn TransferChannel>,
    alternate_engagement: Option<Arc<dyn AlternateEngagementToggle>>,
    transformer: DisclosureTransformer,
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SessionState>,
    status_tx: watch::Sender<Status>,
    /// The running session, reachable without the state lock so dropping the controller
    /// always stops it.
    running: std::sync::Mutex<Option<Running>>,
}

#[derive(Debug)]
struct Running {
    adapter: Arc<TransferAdapter>,
    worker: AbortHandle,
}

impl Running {
    fn stop(self) {
        self.adapter.stop();
        self.worker.abort();
    }
}

#[derive(Debug)]
struct SessionState {
    id: Option<Uuid>,
    status: Status,
    config: Option<SessionConfig>,
    adapter: Option<Arc<TransferAdapter>>,
    engagement_payload: Option<String>,
    verifier: Option<VerifierInfo>,
    tracker: Option<SelectionTracker>,
}

impl SessionState {
    fn new(config: Option<SessionConfig>) -> Self {
        Self {
            id: None,
            status: Status::Idle,
            config,
            adapter: None,
            engagement_payload: None,
            verifier: None,
            tracker: None,
        }
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            status: self.status.to_string(),
        }
    }

    fn is_current(&self, id: Uuid) -> bool {
        self.id == Some(id) && !self.status.is_terminal()
    }
}

impl SessionController {
    pub fn builder() -> SessionControllerBuilder {
        SessionControllerBuilder::default()
    }

    /// The current status.
    pub fn status(&self) -> Status {
        self.shared.status_tx.borrow().clone()
    }

    /// Observe every status transition.
    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.shared.status_tx.subscribe()
    }

    /// Wait for the outcome of the current session.
    pub fn subscribe_outcome(&self) -> OutcomeSubscription {
        OutcomeSubscription {
            status_rx: self.subscribe_status(),
        }
    }

    /// Set the configuration of the next engagement.
    pub async fn set_config(&self, config: SessionConfig) -> Result<(), SessionError> {
        let mut state = self.shared.state.lock().await;
        if state.status != Status::Idle {
            return Err(state.invalid("set_config"));
        }
        debug!(mode = ?config.mode, "session configured");
        state.config = Some(config);
        Ok(())
    }

    /// Start the engagement and the session worker.
    ///
    /// Starting requires a configuration and is only possible once per session, see
    /// [SessionController::reset] to run another session.
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut state = self.shared.state.lock().await;
        match state.status {
            Status::Idle => {}
            Status::Terminal(_) => return Err(state.invalid("start")),
            _ => return Err(SessionError::AlreadyStarted),
        }
        let config = state.config.clone().ok_or(SessionError::MissingConfig)?;

        let id = Uuid::new_v4();
        let adapter = Arc::new(TransferAdapter::new(
            self.channel.clone(),
            self.alternate_engagement.clone(),
        ));
        adapter.set_config(&config);
        state.id = Some(id);
        state.adapter = Some(adapter.clone());

        let events = adapter.events();
        self.shared.publish(&mut state, Status::Engaging);
        let events = match events {
            Ok(events) => events,
            Err(error) => {
                warn!(session_id = %id, %error, "unable to subscribe to transfer events");
                self.shared.finish(&mut state, error.outcome());
                return Err(error);
            }
        };

        info!(session_id = %id, mode = ?config.mode, "starting engagement");
        let worker = tokio::spawn(
            run_worker(self.shared.clone(), self.transformer.clone(), events, id)
                .instrument(info_span!("presentment.session", session_id = %id)),
        );
        *self.shared.running() = Some(Running {
            adapter: adapter.clone(),
            worker: worker.abort_handle(),
        });
        tokio::spawn(supervise(self.shared.clone(), id, worker));

        adapter.start_engagement();
        Ok(())
    }

    /// Enable or disable the secondary engagement mode of the running session.
    pub async fn toggle_alternate_engagement(&self, enable: bool) -> Result<(), SessionError> {
        let state = self.shared.state.lock().await;
        match (&state.adapter, &state.status) {
            (Some(adapter), status) if !status.is_terminal() => {
                adapter.toggle_alternate_engagement(enable);
                Ok(())
            }
            _ => Err(state.invalid("toggle_alternate_engagement")),
        }
    }

    /// The latest engagement payload, e.g. the QR code contents.
    pub async fn engagement_payload(&self) -> Option<String> {
        self.shared.state.lock().await.engagement_payload.clone()
    }

    /// The verifier of the received request.
    pub async fn verifier(&self) -> Option<VerifierInfo> {
        self.shared.state.lock().await.verifier.clone()
    }

    pub async fn session_id(&self) -> Option<Uuid> {
        self.shared.state.lock().await.id
    }

    /// The disclosure under review, or the "no data" signal if the verifier requested
    /// nothing. `None` before a request is received and once the disclosure is discarded.
    pub async fn disclosure_items(&self) -> Option<RequestDisclosure> {
        let state = self.shared.state.lock().await;
        if let Some(tracker) = &state.tracker {
            return Some(RequestDisclosure::Present(tracker.disclosure().clone()));
        }
        match (&state.status, &state.verifier) {
            (Status::Terminal(SessionOutcome::NoRequestedData), Some(verifier)) => {
                Some(RequestDisclosure::NoData {
                    verifier: verifier.clone(),
                })
            }
            _ => None,
        }
    }

    /// Flip the selection of a disclosure item and return whether it is now selected.
    pub async fn toggle(&self, id: &ItemId) -> Result<bool, SessionError> {
        let mut state = self.shared.state.lock().await;
        if state.status != Status::PresentingDisclosure {
            return Err(state.invalid("toggle"));
        }
        let tracker = state
            .tracker
            .as_mut()
            .ok_or_else(|| SessionError::Processing(anyhow!("disclosure is missing")))?;
        let selected = tracker.toggle(id)?;
        trace!(%id, selected, "item toggled");
        Ok(selected)
    }

    /// Send the current selection to the verifier.
    pub async fn confirm(&self) -> Result<DisclosureSelection, SessionError> {
        let mut state = self.shared.state.lock().await;
        if state.status != Status::PresentingDisclosure {
            return Err(state.invalid("confirm"));
        }
        let (Some(tracker), Some(adapter)) = (&state.tracker, &state.adapter) else {
            return Err(SessionError::Processing(anyhow!("disclosure is missing")));
        };
        let selection = tracker.current_selection();
        let adapter = adapter.clone();

        info!(items = selection.len(), "disclosure confirmed");
        self.shared.publish(&mut state, Status::AwaitingResponse);
        adapter.update_selection(&selection);
        Ok(selection)
    }

    /// End the session as disconnected. Does nothing once the session is over.
    pub async fn cancel(&self) {
        let mut state = self.shared.state.lock().await;
        if state.status.is_terminal() {
            trace!("session already over, nothing to cancel");
            return;
        }
        info!("{}", SessionError::Cancelled);
        self.shared.finish(&mut state, SessionError::Cancelled.outcome());
    }

    /// Return a finished controller to `Idle` so another session can be started.
    pub async fn reset(&self) -> Result<(), SessionError> {
        let mut state = self.shared.state.lock().await;
        if !state.status.is_terminal() {
            return Err(state.invalid("reset"));
        }
        let running = self.shared.running().take();
        if let Some(running) = running {
            running.stop();
        }
        *state = SessionState::new(None);
        self.shared.status_tx.send_replace(Status::Idle);
        debug!("session reset");
        Ok(())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        let running = self.shared.running().take();
        if let Some(running) = running {
            running.stop();
        }
    }
}

impl Shared {
    fn running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &mut SessionState, status: Status) {
        if status.stage() < state.status.stage() {
            warn!(from = %state.status, to = %status, "refusing to move the session backwards");
            return;
        }
        debug!(from = %state.status, to = %status, "status changed");
        state.status = status.clone();
        self.status_tx.send_replace(status);
    }

    /// Move to `Terminal`, discard the disclosure and stop the adapter. A session that is
    /// already over keeps its outcome.
    fn finish(&self, state: &mut SessionState, outcome: SessionOutcome) {
        if let Status::Terminal(current) = &state.status {
            trace!(%current, ignored = %outcome, "session already over");
            return;
        }
        state.tracker = None;
        if let Some(adapter) = &state.adapter {
            adapter.stop();
        }
        info!(%outcome, "session finished");
        self.publish(state, Status::Terminal(outcome));
    }

    /// Apply one transfer event. Returns `false` once the session is over.
    async fn handle_event(
        &self,
        transformer: &DisclosureTransformer,
        id: Uuid,
        event: TransferEvent,
    ) -> bool {
        let mut state = self.state.lock().await;
        if !state.is_current(id) {
            return false;
        }

        match event {
            TransferEvent::Error { .. } | TransferEvent::Disconnected => {
                if let Some(outcome) = interpret(&event) {
                    self.finish(&mut state, outcome);
                }
            }
            TransferEvent::EngagementReady { payload } => {
                debug!("engagement ready");
                state.engagement_payload = Some(payload);
                if state.status == Status::Engaging {
                    self.publish(&mut state, Status::AwaitingRequest);
                }
            }
            TransferEvent::Connected => {
                debug!("verifier connected");
                if state.status == Status::Engaging {
                    self.publish(&mut state, Status::AwaitingRequest);
                }
            }
            TransferEvent::RequestReceived {
                requested_documents,
                verifier_name,
                verifier_is_trusted,
            } => {
                let verifier = VerifierInfo {
                    name: verifier_name,
                    is_trusted: verifier_is_trusted,
                };
                return self
                    .handle_request(state, transformer, id, requested_documents, verifier)
                    .await;
            }
            event if state.status == Status::AwaitingResponse => match interpret(&event) {
                Some(outcome) => self.finish(&mut state, outcome),
                None => trace!(event = event.name(), "no outcome yet"),
            },
            event => {
                trace!(event = event.name(), status = %state.status, "ignoring event");
            }
        }

        !state.status.is_terminal()
    }

    async fn handle_request(
        &self,
        state: MutexGuard<'_, SessionState>,
        transformer: &DisclosureTransformer,
        id: Uuid,
        requested_documents: Vec<RequestedDocument>,
        verifier: VerifierInfo,
    ) -> bool {
        let mut state = state;
        if !matches!(state.status, Status::Engaging | Status::AwaitingRequest) {
            warn!(status = %state.status, "request already received, ignoring it");
            return true;
        }
        debug!(
            documents = requested_documents.len(),
            verifier = ?verifier.name,
            trusted = verifier.is_trusted,
            "request received"
        );
        state.verifier = Some(verifier.clone());

        // The lock is released while the store is read so a cancel is not held up.
        drop(state);
        let disclosure = transformer.transform(&requested_documents, verifier).await;
        let mut state = self.state.lock().await;
        if !state.is_current(id) {
            debug!("session ended while the request was processed");
            return false;
        }

        match disclosure {
            Ok(RequestDisclosure::NoData { .. }) => {
                info!("verifier requested no data");
                self.finish(&mut state, SessionOutcome::NoRequestedData);
            }
            Ok(RequestDisclosure::Present(disclosure)) => {
                info!(
                    items = disclosure.items().len(),
                    documents = disclosure.document_count(),
                    "presenting disclosure"
                );
                state.tracker = Some(SelectionTracker::new(disclosure));
                self.publish(&mut state, Status::PresentingDisclosure);
            }
            Err(e) => {
                self.finish(&mut state, SessionError::Processing(e).outcome());
            }
        }

        !state.status.is_terminal()
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    transformer: DisclosureTransformer,
    mut events: TransferEvents,
    id: Uuid,
) {
    debug!("session worker started");
    while let Some(event) = events.next().await {
        trace!(event = event.name(), "transfer event");
        if !shared.handle_event(&transformer, id, event).await {
            break;
        }
    }

    let mut state = shared.state.lock().await;
    if state.is_current(id) {
        debug!("transfer events ended without an outcome");
        shared.finish(&mut state, SessionOutcome::Disconnected);
    }
    debug!("session worker stopped");
}

/// Turn a worker panic into a failed session.
async fn supervise(shared: Arc<Shared>, id: Uuid, worker: JoinHandle<()>) {
    let Err(e) = worker.await else {
        return;
    };
    if !e.is_panic() {
        trace!(session_id = %id, "session worker aborted");
        return;
    }
    let mut state = shared.state.lock().await;
    if state.is_current(id) {
        warn!(session_id = %id, "session worker panicked");
        let error = SessionError::Processing(anyhow!("session worker panicked"));
        shared.finish(&mut state, error.outcome());
    }
}

/// A one-time subscription to the outcome of a session.
#[derive(Debug)]
pub struct OutcomeSubscription {
    status_rx: watch::Receiver<Status>,
}

impl OutcomeSubscription {
    /// Wait for the session to end.
    ///
    /// Resolves immediately if the session is already over, and with `None` if the
    /// controller was dropped first.
    pub async fn recv(mut self) -> Option<SessionOutcome> {
        let status = self.status_rx.wait_for(Status::is_terminal).await.ok()?;
        status.outcome().cloned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionControllerBuilder {
    channel: Option<Arc<dyn TransferChannel>>,
    alternate_engagement: Option<Arc<dyn AlternateEngagementToggle>>,
    store: Option<Arc<dyn DocumentStore>>,
    labels: DisclosureLabels,
    config: Option<SessionConfig>,
}

impl SessionControllerBuilder {
    pub fn with_transfer_channel(mut self, channel: Arc<dyn TransferChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Support a secondary engagement mode, e.g. NFC.
    pub fn with_alternate_engagement(
        mut self,
        toggle: Arc<dyn AlternateEngagementToggle>,
    ) -> Self {
        self.alternate_engagement = Some(toggle);
        self
    }

    pub fn with_document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Headers of the required and optional sections of a disclosure.
    pub fn with_labels(mut self, labels: DisclosureLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Configuration of the first session.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> anyhow::Result<SessionController> {
        let Self {
            channel,
            alternate_engagement,
            store,
            labels,
            config,
        } = self;

        let Some(channel) = channel else {
            bail!("transfer channel is required, see `with_transfer_channel`")
        };

        let Some(store) = store else {
            bail!("document store is required, see `with_document_store`")
        };

        let (status_tx, _status_rx) = watch::channel(Status::Idle);

        Ok(SessionController {
            channel,
            alternate_engagement,
            transformer: DisclosureTransformer::new(store, labels),
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState::new(config)),
                status_tx,
                running: std::sync::Mutex::new(None),
            }),
        })
    }
}
