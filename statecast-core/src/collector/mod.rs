//! State collector client
//!
//! Transport layer for the reporter: builds the JSON payload and performs
//! the HTTP exchange. Response interpretation lives in [`crate::status`];
//! scheduling lives in [`crate::reporter`].
//!
//! ## Configuration
//!
//! ```toml
//! [reporter]
//! server_url = "https://presence.example.com"
//! state_path = "/state"
//! request_timeout_ms = 5000
//! ```

mod client;
mod payload;

pub use client::{CollectorClient, CollectorResponse};
pub use payload::StatePayload;
