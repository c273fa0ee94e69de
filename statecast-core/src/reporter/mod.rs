//! Public state reporting facade
//!
//! [`StateReporter`] is what a host embeds. Producer calls
//! ([`StateReporter::set_state`], [`StateReporter::merge_state`]) only touch
//! the state store and the mailbox, so they return in bounded time no matter
//! what the network is doing. A dedicated `statecast-dispatch` thread runs
//! the [`dispatch`] loop on its own current-thread tokio runtime and does all
//! the HTTP work.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use statecast_core::{GameIdentity, ReporterConfig, StateReporter, TokenStore};
//!
//! let auth = Arc::new(TokenStore::with_token("3f1c9e"));
//! let reporter = StateReporter::new(
//!     &ReporterConfig::for_server("https://presence.example.com"),
//!     auth,
//! )
//! .expect("invalid reporter config");
//! reporter
//!     .initialize(GameIdentity::new(42, "Orbital").expect("invalid game"))
//!     .expect("already initialized");
//!
//! // Every frame, as often as you like:
//! reporter.merge_state([("level", "3"), ("scene", "boss")]);
//! ```

mod dispatch;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use tokio::sync::watch;

use crate::auth::Authenticator;
use crate::cadence::CadencePolicy;
use crate::collector::CollectorClient;
use crate::config::ReporterConfig;
use crate::error::{Error, Result};
use crate::game::GameIdentity;
use crate::mailbox::CoalescingMailbox;
use crate::state::{StateSnapshot, StateStore};
use crate::status::{DeliveryStatus, StatusCell};

use dispatch::Dispatcher;

const WORKER_THREAD_NAME: &str = "statecast-dispatch";

/// State shared between producers and the dispatch worker
pub(crate) struct Shared {
    pub(crate) mailbox: Arc<CoalescingMailbox>,
    pub(crate) store: StateStore,
    pub(crate) status: StatusCell,
    pub(crate) game: OnceLock<GameIdentity>,
    warned_uninitialized: AtomicBool,
    diagnostics: bool,
}

impl Shared {
    pub(crate) fn new(diagnostics: bool) -> Self {
        let mailbox = Arc::new(CoalescingMailbox::new());
        Self {
            store: StateStore::new(Arc::clone(&mailbox)),
            mailbox,
            status: StatusCell::default(),
            game: OnceLock::new(),
            warned_uninitialized: AtomicBool::new(false),
            diagnostics,
        }
    }
}

/// Non-blocking reporter of key/value game state
pub struct StateReporter {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl StateReporter {
    /// Validate `config`, build the HTTP client and start the worker thread
    ///
    /// This is the only fallible step; after it returns, nothing the
    /// reporter does raises into the caller.
    pub fn new(config: &ReporterConfig, auth: Arc<dyn Authenticator>) -> Result<Self> {
        let client = CollectorClient::new(config)?;
        let shared = Arc::new(Shared::new(config.diagnostics));
        let dispatcher = Dispatcher::new(
            Arc::clone(&shared),
            auth,
            client,
            CadencePolicy::from_config(config),
        );

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("failed to create runtime: {}", e)))?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(dispatcher.run(shutdown_rx)))?;

        Ok(Self {
            shared,
            shutdown,
            worker: Some(worker),
        })
    }

    /// Hand over the game identity once bootstrap completed
    ///
    /// State set before this call is discarded.
    pub fn initialize(&self, game: GameIdentity) -> Result<()> {
        let (id, name) = (game.id, game.name.clone());
        if let Err(rejected) = self.shared.game.set(game) {
            let current = self.shared.game.get().map(|g| g.id).unwrap_or(rejected.id);
            return Err(Error::AlreadyInitialized(current));
        }
        tracing::info!(game = id, name = %name, "State reporter initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.game.get().is_some()
    }

    pub fn game(&self) -> Option<&GameIdentity> {
        self.shared.game.get()
    }

    /// Replace the whole reported state
    ///
    /// Never blocks on the network and never fails. Calls made before
    /// [`initialize`](Self::initialize) are ignored with a one-time warning.
    ///
    /// # Panics
    ///
    /// When `diagnostics` is enabled in the config, calling this before
    /// initialization panics instead of warning.
    pub fn set_state<I, K, V>(&self, state: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if !self.check_initialized("set_state") {
            return;
        }
        self.shared.store.set_full(StateSnapshot::from_pairs(state));
    }

    /// Upsert `updates` into the current state and republish it
    ///
    /// Same contract as [`set_state`](Self::set_state).
    ///
    /// # Panics
    ///
    /// When `diagnostics` is enabled in the config, calling this before
    /// initialization panics instead of warning.
    pub fn merge_state<I, K, V>(&self, updates: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if !self.check_initialized("merge_state") {
            return;
        }
        self.shared.store.merge_partial(updates);
    }

    /// Best-effort view of the delivery state machine
    pub fn current_status(&self) -> DeliveryStatus {
        self.shared.status.get()
    }

    /// Full state as last set by producers
    pub fn current_state(&self) -> StateSnapshot {
        self.shared.store.current()
    }

    /// Whether the worker stopped for good after the collector answered 404
    pub fn is_halted(&self) -> bool {
        self.shared.status.is_halted()
    }

    /// Stop the worker and wait for it to exit
    ///
    /// An in-flight request is bounded by the configured request timeout.
    /// Dropping the reporter stops the worker too, without waiting.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("State dispatch worker panicked");
            }
        }
    }

    fn check_initialized(&self, operation: &'static str) -> bool {
        if self.shared.game.get().is_some() {
            return true;
        }
        if self.shared.diagnostics {
            panic!("StateReporter::{} called before initialize()", operation);
        }
        if !self.shared.warned_uninitialized.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                operation,
                "State reported before the reporter was initialized; ignoring until initialize() is called"
            );
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenStore;

    fn reporter(diagnostics: bool) -> StateReporter {
        let config = ReporterConfig {
            diagnostics,
            ..ReporterConfig::for_server("http://127.0.0.1:9")
        };
        StateReporter::new(&config, Arc::new(TokenStore::in_memory())).unwrap()
    }

    #[test]
    fn test_invalid_config_fails_construction() {
        let result = StateReporter::new(
            &ReporterConfig::default(),
            Arc::new(TokenStore::in_memory()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_initialize_once() {
        let reporter = reporter(false);
        assert!(!reporter.is_initialized());

        reporter
            .initialize(GameIdentity::new(3, "First").unwrap())
            .unwrap();
        assert!(reporter.is_initialized());

        let err = reporter
            .initialize(GameIdentity::new(4, "Second").unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized(3)));
        assert_eq!(reporter.game().map(|g| g.id), Some(3));
        reporter.shutdown();
    }

    #[test]
    fn test_uninitialized_calls_are_ignored() {
        let reporter = reporter(false);
        reporter.set_state([("a", "1")]);
        reporter.merge_state([("b", "2")]);
        assert!(reporter.current_state().is_empty());
        assert_eq!(reporter.current_status(), DeliveryStatus::Uninitialized);
        reporter.shutdown();
    }

    #[test]
    #[should_panic(expected = "called before initialize")]
    fn test_uninitialized_call_panics_in_diagnostics_mode() {
        let reporter = reporter(true);
        reporter.set_state([("a", "1")]);
    }

    #[test]
    fn test_state_accumulates_after_initialize() {
        let reporter = reporter(false);
        reporter
            .initialize(GameIdentity::new(3, "Game").unwrap())
            .unwrap();

        reporter.set_state([("A", "1")]);
        reporter.merge_state([("B", "2")]);
        assert_eq!(
            reporter.current_state(),
            StateSnapshot::from_pairs([("A", "1"), ("B", "2")])
        );
        reporter.shutdown();
    }
}
