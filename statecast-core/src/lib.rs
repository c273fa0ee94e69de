//! # statecast-core
//!
//! Core library for statecast - live game state reporting.
//!
//! This library provides:
//! - A non-blocking [`StateReporter`] a game loop can call every frame
//! - Coalescing delivery: only the latest state is ever sent
//! - Heartbeats and a throttle floor so the collector sees a bounded,
//!   steady request stream
//! - The authentication collaborator ([`TokenStore`]) and configuration
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! State flows through four stages:
//! - **Producers** call `set_state`/`merge_state`; the [`state::StateStore`]
//!   keeps the full mapping
//! - **Mailbox:** a single overwrite-on-write slot hands the newest snapshot
//!   to the worker
//! - **Dispatch:** a background thread waits on the mailbox or a heartbeat
//!   timeout and posts the snapshot
//! - **Status:** the collector's answer drives the [`DeliveryStatus`] machine
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use statecast_core::{Config, GameIdentity, StateReporter, TokenStore};
//!
//! let config = Config::load().expect("failed to load config");
//! let auth = Arc::new(TokenStore::load(Config::token_path()).expect("failed to load token"));
//!
//! let reporter = StateReporter::new(&config.reporter, auth).expect("invalid config");
//! reporter
//!     .initialize(GameIdentity::new(42, "Orbital").expect("invalid game"))
//!     .expect("already initialized");
//! reporter.set_state([("scene", "main_menu")]);
//! ```

// Re-export commonly used items at the crate root
pub use auth::{Authenticator, TokenStore};
pub use config::{Config, ReporterConfig};
pub use error::{Error, Result};
pub use game::GameIdentity;
pub use reporter::StateReporter;
pub use state::{StateMap, StateSnapshot};
pub use status::DeliveryStatus;

// Public modules
pub mod auth;
pub mod cadence;
pub mod collector;
pub mod config;
pub mod error;
pub mod game;
pub mod logging;
pub mod mailbox;
pub mod reporter;
pub mod state;
pub mod status;
