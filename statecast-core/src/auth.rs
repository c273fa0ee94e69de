//! Authentication collaborator
//!
//! The dispatch worker only needs four things from authentication: the
//! current token, when the last authorization attempt started (to pick the
//! heartbeat cadence), a hook for a confirmed connection, and a hook for a
//! 403. [`Authenticator`] captures exactly that; [`TokenStore`] is the
//! file-backed implementation the CLI uses.
//!
//! ## Authorization flow
//!
//! 1. [`TokenStore::begin_authorization`] generates a token if none exists,
//!    persists it, stamps the attempt marker and returns a browser URL.
//! 2. The player opens the URL and approves the token server-side.
//! 3. The worker fast-polls while the attempt is recent; the first 2xx
//!    clears the marker through [`Authenticator::connection_established`].

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::game::GameIdentity;

/// Interface the dispatch worker consumes from authentication
pub trait Authenticator: Send + Sync {
    /// Current identity token, `None` while the player has not opted in
    fn current_token(&self) -> Option<String>;

    /// When the most recent authorization attempt started, if one is pending
    fn connection_attempt_started_at(&self) -> Option<Instant>;

    /// The collector accepted a delivery: clear the attempt marker
    fn connection_established(&self);

    /// The collector answered 403: forget any cached "authenticated" result
    fn invalidate_authentication_cache(&self);
}

/// On-disk token record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenFile {
    token: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TokenState {
    token: Option<TokenFile>,
    attempt_started_at: Option<Instant>,
    authenticated: Option<bool>,
}

/// Token holder, optionally persisted as JSON
#[derive(Debug, Default)]
pub struct TokenStore {
    state: Mutex<TokenState>,
    path: Option<PathBuf>,
}

impl TokenStore {
    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// In-memory store seeded with `token`
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::in_memory();
        store.lock_state().token = Some(TokenFile {
            token: token.into(),
            created_at: Utc::now(),
        });
        store
    }

    /// Load the token persisted at `path`
    ///
    /// A missing file yields an empty store that will write to `path` once
    /// a token is created.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let token = read_token_file(&path)?;
        if let Some(file) = &token {
            tracing::debug!(path = %path.display(), created_at = %file.created_at, "Loaded token");
        }

        Ok(Self {
            state: Mutex::new(TokenState {
                token,
                ..TokenState::default()
            }),
            path: Some(path),
        })
    }

    /// Path the token is persisted to, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// When the current token was created
    pub fn token_created_at(&self) -> Option<DateTime<Utc>> {
        self.lock_state().token.as_ref().map(|t| t.created_at)
    }

    /// Replace the token and persist it
    pub fn set_token(&self, token: impl Into<String>) -> Result<()> {
        let file = TokenFile {
            token: token.into(),
            created_at: Utc::now(),
        };
        self.persist(Some(&file))?;
        let mut state = self.lock_state();
        state.token = Some(file);
        state.authenticated = None;
        Ok(())
    }

    /// Forget the token (player opted out)
    pub fn clear_token(&self) -> Result<()> {
        self.persist(None)?;
        let mut state = self.lock_state();
        state.token = None;
        state.attempt_started_at = None;
        state.authenticated = None;
        Ok(())
    }

    /// Start a browser authorization attempt
    ///
    /// Creates a token if there is none yet, marks the attempt as started
    /// (which switches the worker to fast heartbeats) and returns the URL the
    /// player must open.
    pub fn begin_authorization(&self, server_url: &str, game: &GameIdentity) -> Result<String> {
        let token = match self.current_token() {
            Some(token) => token,
            None => {
                let token = uuid::Uuid::new_v4().simple().to_string();
                self.set_token(token.clone())?;
                tracing::info!(game = game.id, "Generated new identity token");
                token
            }
        };

        self.lock_state().attempt_started_at = Some(Instant::now());
        Ok(authorization_url(server_url, &token, game))
    }

    /// Cached authentication result: `Some(true)` after a confirmed
    /// delivery, `None` when unknown or invalidated
    pub fn is_authenticated(&self) -> Option<bool> {
        self.lock_state().authenticated
    }

    /// Pick up a token another process wrote to `path` since we loaded
    ///
    /// Only consulted while no token is held in memory. Read errors are
    /// logged and treated as "still no token".
    fn reload(&self) -> Option<TokenFile> {
        let path = self.path.as_deref()?;
        let file = match read_token_file(path) {
            Ok(file) => file?,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Ignoring unreadable token file");
                return None;
            }
        };

        let mut state = self.lock_state();
        if state.token.is_none() {
            tracing::info!(path = %path.display(), "Picked up identity token from disk");
            state.token = Some(file);
            state.authenticated = None;
        }
        state.token.clone()
    }

    fn persist(&self, file: Option<&TokenFile>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        match file {
            Some(file) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, serde_json::to_string_pretty(file)?)?;
            }
            None => {
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
            }
        }
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Authenticator for TokenStore {
    fn current_token(&self) -> Option<String> {
        let cached = self.lock_state().token.clone();
        cached
            .or_else(|| self.reload())
            .map(|t| t.token)
            .filter(|t| !t.is_empty())
    }

    fn connection_attempt_started_at(&self) -> Option<Instant> {
        self.lock_state().attempt_started_at
    }

    fn connection_established(&self) {
        let mut state = self.lock_state();
        state.attempt_started_at = None;
        state.authenticated = Some(true);
    }

    fn invalidate_authentication_cache(&self) {
        self.lock_state().authenticated = None;
    }
}

fn read_token_file(path: &Path) -> Result<Option<TokenFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Browser URL that lets the player approve `token` for `game`
pub fn authorization_url(server_url: &str, token: &str, game: &GameIdentity) -> String {
    format!(
        "{}/authorize?token={}&game={}&name={}",
        server_url.trim_end_matches('/'),
        urlencoding::encode(token),
        game.id,
        urlencoding::encode(&game.name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn game() -> GameIdentity {
        GameIdentity::new(17, "Space Race").unwrap()
    }

    #[test]
    fn test_empty_store_has_no_token() {
        let store = TokenStore::in_memory();
        assert!(store.current_token().is_none());
        assert!(store.connection_attempt_started_at().is_none());
        assert!(store.is_authenticated().is_none());
    }

    #[test]
    fn test_empty_token_counts_as_missing() {
        let store = TokenStore::with_token("");
        assert!(store.current_token().is_none());
    }

    #[test]
    fn test_begin_authorization_generates_token_and_marks_attempt() {
        let store = TokenStore::in_memory();
        let url = store
            .begin_authorization("https://presence.example.com/", &game())
            .unwrap();

        let token = store.current_token().expect("token generated");
        assert_eq!(token.len(), 32);
        assert_eq!(
            url,
            format!(
                "https://presence.example.com/authorize?token={}&game=17&name=Space%20Race",
                token
            )
        );
        assert!(store.connection_attempt_started_at().is_some());

        // Second attempt reuses the token
        store
            .begin_authorization("https://presence.example.com", &game())
            .unwrap();
        assert_eq!(store.current_token(), Some(token));
    }

    #[test]
    fn test_connection_hooks() {
        let store = TokenStore::with_token("abc");
        store
            .begin_authorization("http://localhost", &game())
            .unwrap();

        store.connection_established();
        assert!(store.connection_attempt_started_at().is_none());
        assert_eq!(store.is_authenticated(), Some(true));

        store.invalidate_authentication_cache();
        assert!(store.is_authenticated().is_none());
        assert_eq!(store.current_token().as_deref(), Some("abc"));
    }

    #[test]
    fn test_token_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");

        let store = TokenStore::load(&path).unwrap();
        assert!(store.current_token().is_none());
        store.set_token("persisted-token").unwrap();
        assert!(path.exists());

        let reloaded = TokenStore::load(&path).unwrap();
        assert_eq!(reloaded.current_token().as_deref(), Some("persisted-token"));
        assert!(reloaded.token_created_at().is_some());

        reloaded.clear_token().unwrap();
        assert!(!path.exists());
        assert!(TokenStore::load(&path).unwrap().current_token().is_none());
    }

    #[test]
    fn test_token_written_by_another_process_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");

        let running = TokenStore::load(&path).unwrap();
        assert!(running.current_token().is_none());

        // e.g. `statecast authorize` in a second process
        let other = TokenStore::load(&path).unwrap();
        other.set_token("fresh").unwrap();

        assert_eq!(running.current_token().as_deref(), Some("fresh"));
        assert!(running.token_created_at().is_some());

        // Once held, the in-memory token wins over later edits on disk
        other.set_token("newer").unwrap();
        assert_eq!(running.current_token().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_unreadable_token_file_on_reload_means_no_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");

        let running = TokenStore::load(&path).unwrap();
        std::fs::write(&path, "{ half written").unwrap();
        assert!(running.current_token().is_none());

        std::fs::write(
            &path,
            r#"{"token":"ok","created_at":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(running.current_token().as_deref(), Some("ok"));
    }

    #[test]
    fn test_corrupt_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(TokenStore::load(&path), Err(Error::Json(_))));
    }
}
