use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown ownership action: {0}")]
    UnknownAction(String),

    #[error("unknown cosmetic slot: {0}")]
    UnknownSlot(String),

    #[error("unknown rarity: {0}")]
    UnknownRarity(String),

    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(u32),

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
}
