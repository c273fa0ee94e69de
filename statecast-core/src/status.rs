//! Delivery status state machine and collector response classification

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use reqwest::StatusCode;

/// Observable delivery state
///
/// `Uninitialized` until the first meaningful response, then `Sending` after
/// any 2xx and `Unauthenticated` after a 403. Other responses leave it as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    Uninitialized,
    Sending,
    Unauthenticated,
}

impl DeliveryStatus {
    fn as_u8(self) -> u8 {
        match self {
            DeliveryStatus::Uninitialized => 0,
            DeliveryStatus::Sending => 1,
            DeliveryStatus::Unauthenticated => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => DeliveryStatus::Sending,
            2 => DeliveryStatus::Unauthenticated,
            _ => DeliveryStatus::Uninitialized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Uninitialized => "uninitialized",
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Unauthenticated => "unauthenticated",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a collector response means for the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// 2xx: state accepted
    Delivered,
    /// 403: the token is not (or no longer) authorized
    Forbidden,
    /// 404: the configured game does not exist on the collector
    UnknownGame,
    /// Any other status: logged and otherwise ignored
    Rejected,
}

impl ResponseOutcome {
    pub fn interpret(status: StatusCode) -> Self {
        if status.is_success() {
            ResponseOutcome::Delivered
        } else if status == StatusCode::FORBIDDEN {
            ResponseOutcome::Forbidden
        } else if status == StatusCode::NOT_FOUND {
            ResponseOutcome::UnknownGame
        } else {
            ResponseOutcome::Rejected
        }
    }

    /// Status transition caused by this outcome, if any
    pub fn next_status(&self) -> Option<DeliveryStatus> {
        match self {
            ResponseOutcome::Delivered => Some(DeliveryStatus::Sending),
            ResponseOutcome::Forbidden => Some(DeliveryStatus::Unauthenticated),
            ResponseOutcome::UnknownGame | ResponseOutcome::Rejected => None,
        }
    }
}

/// Status shared between the dispatch worker (writer) and callers (readers)
#[derive(Debug)]
pub struct StatusCell {
    status: AtomicU8,
    halted: AtomicBool,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self {
            status: AtomicU8::new(DeliveryStatus::Uninitialized.as_u8()),
            halted: AtomicBool::new(false),
        }
    }
}

impl StatusCell {
    pub fn get(&self) -> DeliveryStatus {
        DeliveryStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Store `status`, returning the previous value
    pub fn set(&self, status: DeliveryStatus) -> DeliveryStatus {
        DeliveryStatus::from_u8(self.status.swap(status.as_u8(), Ordering::AcqRel))
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn mark_halted(&self) {
        self.halted.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_status_codes() {
        assert_eq!(
            ResponseOutcome::interpret(StatusCode::OK),
            ResponseOutcome::Delivered
        );
        assert_eq!(
            ResponseOutcome::interpret(StatusCode::NO_CONTENT),
            ResponseOutcome::Delivered
        );
        assert_eq!(
            ResponseOutcome::interpret(StatusCode::FORBIDDEN),
            ResponseOutcome::Forbidden
        );
        assert_eq!(
            ResponseOutcome::interpret(StatusCode::NOT_FOUND),
            ResponseOutcome::UnknownGame
        );
        assert_eq!(
            ResponseOutcome::interpret(StatusCode::UNAUTHORIZED),
            ResponseOutcome::Rejected
        );
        assert_eq!(
            ResponseOutcome::interpret(StatusCode::SERVICE_UNAVAILABLE),
            ResponseOutcome::Rejected
        );
    }

    #[test]
    fn test_transitions() {
        assert_eq!(
            ResponseOutcome::Delivered.next_status(),
            Some(DeliveryStatus::Sending)
        );
        assert_eq!(
            ResponseOutcome::Forbidden.next_status(),
            Some(DeliveryStatus::Unauthenticated)
        );
        assert_eq!(ResponseOutcome::UnknownGame.next_status(), None);
        assert_eq!(ResponseOutcome::Rejected.next_status(), None);
    }

    #[test]
    fn test_status_cell() {
        let cell = StatusCell::default();
        assert_eq!(cell.get(), DeliveryStatus::Uninitialized);
        assert!(!cell.is_halted());

        assert_eq!(
            cell.set(DeliveryStatus::Unauthenticated),
            DeliveryStatus::Uninitialized
        );
        assert_eq!(cell.set(DeliveryStatus::Sending), DeliveryStatus::Unauthenticated);
        assert_eq!(cell.get(), DeliveryStatus::Sending);

        cell.mark_halted();
        assert!(cell.is_halted());
    }

    #[test]
    fn test_display() {
        assert_eq!(DeliveryStatus::Sending.to_string(), "sending");
    }
}
