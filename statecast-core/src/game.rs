//! Game identity handed over by process bootstrap

use crate::error::{Error, Result};

/// Identifier and display name of the game whose state is reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameIdentity {
    /// Numeric id registered with the collector
    pub id: u64,
    /// Human-readable name, used in logs and the authorization URL
    pub name: String,
}

impl GameIdentity {
    pub fn new(id: u64, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidIdentity(format!(
                "game {} has an empty name",
                id
            )));
        }
        Ok(Self { id, name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_identity() {
        let game = GameIdentity::new(42, "Orbital").unwrap();
        assert_eq!(game.id, 42);
        assert_eq!(game.name, "Orbital");
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(matches!(
            GameIdentity::new(7, "  "),
            Err(Error::InvalidIdentity(_))
        ));
    }
}
