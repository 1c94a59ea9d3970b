pub mod config;
pub mod error;
pub mod types;

pub use error::{BeaconError, BeaconResult};
pub use types::{
    ActionId, ActionKind, ActionPayload, ChatMessage, IncidentReport, IncidentSeverity,
    LocationPing, PendingAction, DEFAULT_MAX_RETRIES,
};
