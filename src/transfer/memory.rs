use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::debug;

use super::{AlternateEngagementToggle, TransferChannel};
use crate::{
    config::SessionConfig,
    core::{event::TransferEvent, selection::DisclosureSelection},
};

/// A scripted in-memory transfer channel.
///
/// # Warning
/// There is no secure channel behind this type, it replays the events it is given and records
/// the commands it receives. It should only be used for tests and headless sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransferChannel {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    config: Option<SessionConfig>,
    events_tx: Option<mpsc::UnboundedSender<TransferEvent>>,
    engagement_events: Vec<TransferEvent>,
    response_events: Vec<TransferEvent>,
    engagement_failure: Option<String>,
    start_count: usize,
    stop_count: usize,
    alternate_engagement_toggles: Vec<bool>,
    selections: Vec<DisclosureSelection>,
}

impl MemoryTransferChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events emitted when the engagement starts.
    pub fn with_engagement_events(self, events: impl IntoIterator<Item = TransferEvent>) -> Self {
        self.state().engagement_events.extend(events);
        self
    }

    /// Events emitted when a selection is sent.
    pub fn with_response_events(self, events: impl IntoIterator<Item = TransferEvent>) -> Self {
        self.state().response_events.extend(events);
        self
    }

    /// Make every engagement start fail with `message`.
    pub fn failing_engagement(self, message: impl Into<String>) -> Self {
        self.state().engagement_failure = Some(message.into());
        self
    }

    /// Emit an event on the current session's stream.
    ///
    /// Returns `false` if nobody is subscribed or the session was stopped.
    pub fn emit(&self, event: TransferEvent) -> bool {
        let state = self.state();
        let Some(events_tx) = &state.events_tx else {
            debug!(event = event.name(), "no subscriber, dropping event");
            return false;
        };
        events_tx.send(event).is_ok()
    }

    pub fn config(&self) -> Option<SessionConfig> {
        self.state().config.clone()
    }

    pub fn start_count(&self) -> usize {
        self.state().start_count
    }

    pub fn stop_count(&self) -> usize {
        self.state().stop_count
    }

    pub fn alternate_engagement_toggles(&self) -> Vec<bool> {
        self.state().alternate_engagement_toggles.clone()
    }

    /// Every selection sent, oldest first.
    pub fn selections(&self) -> Vec<DisclosureSelection> {
        self.state().selections.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_all(state: &State, events: &[TransferEvent]) {
        let Some(events_tx) = &state.events_tx else {
            debug!(count = events.len(), "no subscriber, dropping scripted events");
            return;
        };
        for event in events {
            let _ = events_tx.send(event.clone());
        }
    }
}

impl TransferChannel for MemoryTransferChannel {
    fn set_config(&self, config: &SessionConfig) {
        self.state().config = Some(config.clone());
    }

    fn start_engagement(&self) -> Result<()> {
        let mut state = self.state();
        state.start_count += 1;
        if let Some(message) = &state.engagement_failure {
            bail!("{message}")
        }
        Self::emit_all(&state, &state.engagement_events);
        Ok(())
    }

    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<TransferEvent>> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.state().events_tx = Some(events_tx);
        Ok(events_rx)
    }

    fn update_selection(&self, selection: &DisclosureSelection) -> Result<()> {
        let mut state = self.state();
        state.selections.push(selection.clone());
        Self::emit_all(&state, &state.response_events);
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.state();
        state.stop_count += 1;
        state.events_tx = None;
    }
}

impl AlternateEngagementToggle for MemoryTransferChannel {
    fn toggle(&self, enable: bool) -> Result<()> {
        self.state().alternate_engagement_toggles.push(enable);
        Ok(())
    }
}
