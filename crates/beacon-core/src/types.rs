use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BeaconError, BeaconResult};

/// Retry budget applied when the caller does not pick one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Opaque identifier assigned to a pending action at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Generate a fresh random (UUID v4) identifier.
    pub fn generate() -> Self {
        ActionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<String> for ActionId {
    fn from(s: String) -> Self {
        ActionId(s)
    }
}

impl From<&str> for ActionId {
    fn from(s: &str) -> Self {
        ActionId(s.to_string())
    }
}

/// The closed set of mutations the offline queue knows how to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    LocationUpdate,
    IncidentCreate,
    MessageSend,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [
        ActionKind::LocationUpdate,
        ActionKind::IncidentCreate,
        ActionKind::MessageSend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::LocationUpdate => "location_update",
            ActionKind::IncidentCreate => "incident_create",
            ActionKind::MessageSend => "message_send",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| BeaconError::InvalidRecord(format!("unknown action kind: {s}")))
    }
}

/// A guard's position report from the location-tracking loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPing {
    pub guard_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in metres, when the platform reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// An incident filed from the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub site_id: String,
    pub title: String,
    pub description: String,
    pub severity: IncidentSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub reported_at: DateTime<Utc>,
}

/// A chat message composed while possibly offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Kind-specific payload. The variant fixes both the kind and the shape.
///
/// Serialized adjacently tagged: `{"kind": "location_update", "payload": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ActionPayload {
    LocationUpdate(LocationPing),
    IncidentCreate(IncidentReport),
    MessageSend(ChatMessage),
}

impl ActionPayload {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionPayload::LocationUpdate(_) => ActionKind::LocationUpdate,
            ActionPayload::IncidentCreate(_) => ActionKind::IncidentCreate,
            ActionPayload::MessageSend(_) => ActionKind::MessageSend,
        }
    }

    /// Rebuild a payload from a stored kind tag and its untyped body.
    pub fn from_parts(kind: ActionKind, body: serde_json::Value) -> BeaconResult<Self> {
        let payload = match kind {
            ActionKind::LocationUpdate => ActionPayload::LocationUpdate(serde_json::from_value(body)?),
            ActionKind::IncidentCreate => ActionPayload::IncidentCreate(serde_json::from_value(body)?),
            ActionKind::MessageSend => ActionPayload::MessageSend(serde_json::from_value(body)?),
        };
        Ok(payload)
    }

    /// The untyped body, without the kind tag.
    pub fn body(&self) -> serde_json::Value {
        let body = match self {
            ActionPayload::LocationUpdate(p) => serde_json::to_value(p),
            ActionPayload::IncidentCreate(p) => serde_json::to_value(p),
            ActionPayload::MessageSend(p) => serde_json::to_value(p),
        };
        // Plain structs with string keys always serialize.
        body.unwrap_or(serde_json::Value::Null)
    }
}

/// A queued, not-yet-confirmed mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ActionRecord", into = "ActionRecord")]
pub struct PendingAction {
    pub id: ActionId,
    pub payload: ActionPayload,
    pub enqueued_at: DateTime<Utc>,
    /// Failed attempts so far; only the drain pass changes this
    pub retry_count: u32,
    pub max_retries: u32,
}

impl PendingAction {
    /// Create a new action with a fresh id. A retry budget of zero is raised to one.
    pub fn new(payload: ActionPayload, max_retries: u32) -> Self {
        PendingAction {
            id: ActionId::generate(),
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
            max_retries: max_retries.max(1),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.payload.kind()
    }

    /// Count one failed attempt. Returns true when the retry budget is spent.
    pub fn record_failure(&mut self) -> bool {
        self.retry_count = (self.retry_count + 1).min(self.max_retries);
        self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Durable wire shape of a pending action:
/// `{id, kind, payload, enqueuedAt, retryCount, maxRetries}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionRecord {
    id: String,
    kind: ActionKind,
    payload: serde_json::Value,
    enqueued_at: DateTime<Utc>,
    retry_count: u32,
    max_retries: u32,
}

impl TryFrom<ActionRecord> for PendingAction {
    type Error = BeaconError;

    fn try_from(record: ActionRecord) -> Result<Self, Self::Error> {
        if record.max_retries == 0 {
            return Err(BeaconError::InvalidRecord(format!(
                "action {} has maxRetries = 0",
                record.id
            )));
        }
        if record.retry_count > record.max_retries {
            return Err(BeaconError::InvalidRecord(format!(
                "action {} has retryCount {} above maxRetries {}",
                record.id, record.retry_count, record.max_retries
            )));
        }
        let payload = ActionPayload::from_parts(record.kind, record.payload)?;
        Ok(PendingAction {
            id: ActionId(record.id),
            payload,
            enqueued_at: record.enqueued_at,
            retry_count: record.retry_count,
            max_retries: record.max_retries,
        })
    }
}

impl From<PendingAction> for ActionRecord {
    fn from(action: PendingAction) -> Self {
        ActionRecord {
            kind: action.kind(),
            payload: action.payload.body(),
            id: action.id.0,
            enqueued_at: action.enqueued_at,
            retry_count: action.retry_count,
            max_retries: action.max_retries,
        }
    }
}
