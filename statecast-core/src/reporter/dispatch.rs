//! Background dispatch loop
//!
//! Sole consumer of the mailbox and sole owner of the last sent snapshot.
//! Each cycle waits for a new snapshot or a heartbeat timeout, posts the
//! chosen snapshot, applies the response to the status machine, then sleeps
//! the throttle floor. Nothing in here returns an error: every failure ends
//! as a log record and the loop carries on, except a 404 which stops it for
//! good.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::auth::Authenticator;
use crate::cadence::CadencePolicy;
use crate::collector::{CollectorClient, CollectorResponse, StatePayload};
use crate::state::StateSnapshot;
use crate::status::ResponseOutcome;

use super::Shared;

/// How a delivery attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cycle {
    /// An HTTP exchange was attempted; throttle before the next one
    Sent,
    /// Nothing was sent (no token yet); still throttled
    Skipped,
    /// The collector does not know the game; stop permanently
    Halt,
}

pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    auth: Arc<dyn Authenticator>,
    client: CollectorClient,
    cadence: CadencePolicy,
    /// Last snapshot that completed an HTTP exchange, re-sent on heartbeat
    last_sent: Option<StateSnapshot>,
    /// Snapshot that still has to go out (no token yet, or transport failure)
    unsent: Option<StateSnapshot>,
    /// Set while `unsent` is held back for lack of a token
    awaiting_token: bool,
    /// Last token reported as forbidden
    forbidden_token: Option<String>,
}

impl Dispatcher {
    pub(crate) fn new(
        shared: Arc<Shared>,
        auth: Arc<dyn Authenticator>,
        client: CollectorClient,
        cadence: CadencePolicy,
    ) -> Self {
        Self {
            shared,
            auth,
            client,
            cadence,
            last_sent: None,
            unsent: None,
            awaiting_token: false,
            forbidden_token: None,
        }
    }

    /// Run until `shutdown` fires (or its sender is dropped) or the
    /// collector answers 404.
    pub(crate) async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(url = %self.client.state_url(), "State dispatch started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = self.next_wait(Instant::now());
            let taken = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                taken = self.shared.mailbox.take_or_timeout(wait) => taken,
            };

            // Every cycle ends in the throttle sleep, including ones that
            // had nothing to send or no token to send it with
            if let Some(snapshot) = self.next_candidate(taken) {
                if self.deliver(snapshot).await == Cycle::Halt {
                    self.shared.status.mark_halted();
                    break;
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.cadence.throttle) => {}
            }
        }

        tracing::info!(halted = self.shared.status.is_halted(), "State dispatch stopped");
    }

    fn next_wait(&self, now: Instant) -> Duration {
        if self.awaiting_token && self.unsent.is_some() {
            return self.cadence.token_poll();
        }
        self.cadence
            .next_wait(self.auth.connection_attempt_started_at(), now)
    }

    /// Pick what to send this cycle
    ///
    /// A fresh snapshot supersedes anything held back. On timeout the held
    /// snapshot is retried first, otherwise the last sent one is repeated as
    /// a heartbeat. With neither, there is nothing to say yet.
    pub(crate) fn next_candidate(&mut self, taken: Option<StateSnapshot>) -> Option<StateSnapshot> {
        match taken {
            Some(snapshot) => {
                self.unsent = None;
                Some(snapshot)
            }
            None => self.unsent.take().or_else(|| self.last_sent.clone()),
        }
    }

    async fn deliver(&mut self, snapshot: StateSnapshot) -> Cycle {
        let Some(token) = self.auth.current_token() else {
            if !self.awaiting_token {
                tracing::debug!("No identity token yet; holding state until one is available");
            }
            self.awaiting_token = true;
            self.unsent = Some(snapshot);
            return Cycle::Skipped;
        };
        self.awaiting_token = false;

        let Some(game_id) = self.shared.game.get().map(|g| g.id) else {
            self.unsent = Some(snapshot);
            return Cycle::Skipped;
        };

        let payload = StatePayload::new(&token, game_id, &snapshot);
        match self.client.send_state(&payload).await {
            Ok(response) => self.handle_response(snapshot, &token, response),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to deliver state; retrying on next heartbeat");
                self.unsent = Some(snapshot);
                Cycle::Sent
            }
        }
    }

    /// Apply a collector response to the status machine and worker state
    pub(crate) fn handle_response(
        &mut self,
        snapshot: StateSnapshot,
        token: &str,
        response: CollectorResponse,
    ) -> Cycle {
        let outcome = ResponseOutcome::interpret(response.status);

        if let Some(next) = outcome.next_status() {
            let previous = self.shared.status.set(next);
            if previous != next {
                tracing::info!(from = %previous, to = %next, "Delivery status changed");
            }
        }

        match outcome {
            ResponseOutcome::Delivered => {
                self.auth.connection_established();
                tracing::trace!(keys = snapshot.len(), "State delivered");
            }
            ResponseOutcome::Forbidden => {
                self.auth.invalidate_authentication_cache();
                if self.note_forbidden(token) {
                    tracing::warn!(
                        "Collector rejected the identity token (403); the player has not authorized this game"
                    );
                }
            }
            ResponseOutcome::UnknownGame => {
                tracing::error!(
                    game = ?self.shared.game.get().map(|g| g.id),
                    url = %self.client.state_url(),
                    "Collector does not know this game (404); check the configured game id. State reporting stopped"
                );
                return Cycle::Halt;
            }
            ResponseOutcome::Rejected => {
                tracing::warn!(
                    status = %response.status,
                    body = %response.body,
                    "Collector rejected state update"
                );
            }
        }

        self.last_sent = Some(snapshot);
        Cycle::Sent
    }

    /// Whether `token` is newly forbidden and worth a log line
    fn note_forbidden(&mut self, token: &str) -> bool {
        if self.forbidden_token.as_deref() == Some(token) {
            return false;
        }
        self.forbidden_token = Some(token.to_string());
        true
    }

    #[cfg(test)]
    pub(crate) fn last_sent(&self) -> Option<&StateSnapshot> {
        self.last_sent.as_ref()
    }
}
