//! Custom error types for the protocol runner.
//!
//! `ViscometerError` is the domain error of the crate. Hardware capability
//! traits return `anyhow::Result`, so backends raise these variants through
//! `anyhow` and callers can recover the concrete kind with `downcast_ref`.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: semantic errors in the run configuration that pass
//!   parsing but are logically invalid (empty flow-rate list, too few sample
//!   assignments, non-monotonic delay tiers).
//! - **`Figment`**: wraps errors from loading the layered configuration.
//! - **`Labware*`** / **`UnknownWell`** / **`SlotOccupied`**: deck and labware
//!   lookups that cannot be satisfied.
//! - **`NoTipAttached`** / **`TipAlreadyAttached`** / **`TipUnavailable`**: the
//!   single pipette tip was used out of order.
//! - **`VolumeExceeded`**: an aspiration would overfill the pipette.
//! - **`Io`** / **`Json`**: file and serialization failures.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, ViscometerError>;

/// Domain errors raised by configuration, labware handling and the robot backend.
#[derive(Error, Debug)]
pub enum ViscometerError {
    /// Layered configuration could not be extracted.
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// Configuration parsed but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A labware definition could not be parsed or is inconsistent.
    #[error("Invalid labware definition '{name}': {reason}")]
    LabwareDefinition {
        /// Load name or path of the definition
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// No built-in definition exists for this load name.
    #[error("Unknown labware load name: {0}")]
    UnknownLabware(String),

    /// A well name was malformed or absent from the labware.
    #[error("Well '{well}' does not exist in labware '{labware}'")]
    UnknownWell {
        /// Labware load name
        labware: String,
        /// Requested well
        well: String,
    },

    /// Labware referenced a slot that was never loaded.
    #[error("No labware loaded in deck slot {0}")]
    EmptySlot(u8),

    /// Two labware items were loaded into the same deck slot.
    #[error("Deck slot {slot} is already occupied by '{occupant}'")]
    SlotOccupied {
        /// Deck slot number
        slot: u8,
        /// Load name of the labware already there
        occupant: String,
    },

    /// Deck slot number outside the robot deck.
    #[error("Deck slot {0} is out of range (1-11)")]
    InvalidSlot(u8),

    /// Unknown pipette model.
    #[error("Unknown pipette model: {0}")]
    UnknownInstrument(String),

    /// A liquid-handling command was issued without a tip.
    #[error("Pipette has no tip attached")]
    NoTipAttached,

    /// Tip pickup attempted while already holding a tip.
    #[error("Pipette already has a tip attached")]
    TipAlreadyAttached,

    /// Tip rack position is empty or not an assigned tip rack.
    #[error("No tip available at {0}")]
    TipUnavailable(String),

    /// Target position cannot be reached by the pipette.
    #[error("Unreachable position {location}: {reason}")]
    Unreachable {
        /// Requested location
        location: String,
        /// Why it cannot be reached
        reason: String,
    },

    /// Touch-tip without a location and no previous well to touch.
    #[error("No current well for location-less command '{0}'")]
    NoCurrentWell(&'static str),

    /// Aspiration would exceed the pipette capacity.
    #[error("Aspirating {requested_ul:.1} uL exceeds pipette capacity ({held_ul:.1}/{max_ul:.1} uL held)")]
    VolumeExceeded {
        /// Volume requested
        requested_ul: f64,
        /// Volume already in the tip
        held_ul: f64,
        /// Pipette maximum
        max_ul: f64,
    },

    /// Command arguments are out of range (negative volume, zero rate).
    #[error("Invalid command argument: {0}")]
    InvalidCommand(String),

    /// Operator interaction failed.
    #[error("Operator interaction failed: {0}")]
    Operator(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for ViscometerError {
    fn from(value: figment::Error) -> Self {
        ViscometerError::Figment(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_error_message_contains_amounts() {
        let err = ViscometerError::VolumeExceeded {
            requested_ul: 400.0,
            held_ul: 700.0,
            max_ul: 1000.0,
        };
        let message = err.to_string();
        assert!(message.contains("400.0"));
        assert!(message.contains("700.0/1000.0"));
    }

    #[test]
    fn domain_error_survives_anyhow_round_trip() {
        let err: anyhow::Error = ViscometerError::NoTipAttached.into();
        assert!(matches!(
            err.downcast_ref::<ViscometerError>(),
            Some(ViscometerError::NoTipAttached)
        ));
    }
}
