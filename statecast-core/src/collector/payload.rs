//! Wire payload for the collector state endpoint

use serde::Serialize;

use crate::state::{StateMap, StateSnapshot};

/// Request body for `POST {state_path}`
///
/// ```json
/// {"token": "3f1c...", "game": 42, "state": {"level": "3"}}
/// ```
#[derive(Debug, Serialize)]
pub struct StatePayload<'a> {
    pub token: &'a str,
    pub game: u64,
    pub state: &'a StateMap,
}

impl<'a> StatePayload<'a> {
    pub fn new(token: &'a str, game: u64, snapshot: &'a StateSnapshot) -> Self {
        Self {
            token,
            game,
            state: snapshot.as_map(),
        }
    }
}
