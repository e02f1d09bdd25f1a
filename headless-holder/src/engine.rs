//! A holder that reviews requests without a user.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use presentment::{
    core::disclosure::{Disclosure, RequestDisclosure},
    session::SessionController,
    SessionOutcome, Status, ValueKind,
};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Confirm every disclosure as presented. When disabled every request is declined.
    pub auto_consent: bool,
    /// Artificial delay before answering a request.
    pub response_delay_ms: u64,
    /// How long to wait for a request before giving up on the session.
    pub timeout_ms: u64,
    /// Enable the secondary engagement mode once the session started.
    pub alternate_engagement: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            auto_consent: true,
            response_delay_ms: 0,
            timeout_ms: 30_000,
            alternate_engagement: false,
        }
    }
}

#[derive(Debug)]
pub struct HeadlessEngine {
    config: HeadlessConfig,
    controller: Arc<SessionController>,
}

impl HeadlessEngine {
    pub fn new(config: HeadlessConfig, controller: Arc<SessionController>) -> Self {
        Self { config, controller }
    }

    /// Run one session to its outcome.
    pub async fn run(&self) -> Result<SessionOutcome> {
        let outcome = self.controller.subscribe_outcome();
        self.controller.start().await?;
        if self.config.alternate_engagement {
            self.controller.toggle_alternate_engagement(true).await?;
        }

        let mut status = self.controller.subscribe_status();
        let reached = tokio::time::timeout(
            Duration::from_millis(self.config.timeout_ms),
            status.wait_for(|status| {
                *status == Status::PresentingDisclosure || status.is_terminal()
            }),
        )
        .await
        .map(|reached| reached.is_ok());

        match reached {
            Err(_) => {
                warn!(timeout_ms = self.config.timeout_ms, "no request received, giving up");
                self.controller.cancel().await;
            }
            Ok(false) => return Err(anyhow!("session status is no longer published")),
            Ok(true) => self.review().await?,
        }

        outcome
            .recv()
            .await
            .ok_or_else(|| anyhow!("session ended without an outcome"))
    }

    async fn review(&self) -> Result<()> {
        match self.controller.disclosure_items().await {
            Some(RequestDisclosure::Present(disclosure)) => print_disclosure(&disclosure),
            Some(RequestDisclosure::NoData { verifier }) => {
                info!(verifier = ?verifier.name, "verifier requested no data");
                return Ok(());
            }
            None => return Ok(()),
        }

        if self.config.response_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.response_delay_ms)).await;
        }

        if self.config.auto_consent {
            let selection = self.controller.confirm().await?;
            info!(items = selection.len(), "disclosure confirmed");
        } else {
            info!("declining the request");
            self.controller.cancel().await;
        }
        Ok(())
    }
}

fn print_disclosure(disclosure: &Disclosure) {
    let verifier = disclosure.verifier.name.as_deref().unwrap_or("Unknown verifier");
    let trust = if disclosure.verifier.is_trusted {
        "trusted"
    } else {
        "not trusted"
    };
    println!();
    println!("{verifier} ({trust}) requests:");
    if disclosure.is_empty() {
        println!("  none of the requested documents are stored");
    }
    for section in disclosure.sections() {
        println!();
        println!(
            "  {} / {}",
            section.document_name.unwrap_or(section.document_id),
            section.header
        );
        for item in section.items {
            let mark = if item.selected() { "x" } else { " " };
            let value = match item.kind {
                ValueKind::Text => item.value.clone(),
                ValueKind::Image => format!("<image, {} base64 chars>", item.value.len()),
                ValueKind::Signature => format!("<signature, {} base64 chars>", item.value.len()),
            };
            println!("    [{mark}] {}: {value}", item.display_label());
        }
    }
    println!();
}
