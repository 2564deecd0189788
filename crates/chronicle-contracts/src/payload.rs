//! Typed views over event payloads.
//!
//! The stored payload is always a plain JSON object so that its canonical
//! bytes survive a read/write cycle untouched.  `AuditPayload` is the typed
//! lens: known event types get a schema, everything else (and any object
//! that does not match its schema exactly) is kept as `Other`.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event type tags with a known payload schema.
pub mod event_types {
    pub const LOGIN: &str = "LOGIN";
    pub const LOGOUT: &str = "LOGOUT";
    pub const FILE_UPLOAD: &str = "FILE_UPLOAD";
    pub const ROLE_GRANTED: &str = "ROLE_GRANTED";
    pub const ROLE_REVOKED: &str = "ROLE_REVOKED";
    pub const LOGS_CLEARED: &str = "LOGS_CLEARED";
    pub const RETENTION_PRUNED: &str = "RETENTION_PRUNED";
    pub const RECORD_TOMBSTONED: &str = "RECORD_TOMBSTONED";
}

/// A user signed in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// A user signed out.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogoutDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// A file was uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileUploadDetails {
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// A role was granted to or revoked from a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleChangeDetails {
    pub role: String,
    pub target_user: String,
}

/// A log scope was wiped.  Recorded to a different chain than the one cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogsClearedDetails {
    /// The subject or chain whose logs were cleared.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_cleared: Option<u64>,
    /// Terminal hash of the cleared chain, committing to what was wiped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_hash: Option<String>,
}

/// Old segments of a chain were removed by retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RetentionPrunedDetails {
    pub target: String,
    pub segments_deleted: u64,
    pub events_deleted: u64,
    pub older_than_days: u32,
    /// Index of the first retained event, if any remain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_sequence: Option<u64>,
}

/// A logical record was withdrawn.  The original event stays in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TombstoneDetails {
    pub target_sequence: u64,
    pub reason: String,
}

/// A payload interpreted against its event type.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditPayload {
    Login(LoginDetails),
    Logout(LogoutDetails),
    FileUpload(FileUploadDetails),
    RoleGranted(RoleChangeDetails),
    RoleRevoked(RoleChangeDetails),
    LogsCleared(LogsClearedDetails),
    RetentionPruned(RetentionPrunedDetails),
    RecordTombstoned(TombstoneDetails),
    /// Unknown type, or an object that does not fit the known schema.
    Other {
        event_type: String,
        fields: Map<String, Value>,
    },
}

impl AuditPayload {
    /// The event type tag this payload is recorded under.
    pub fn event_type(&self) -> &str {
        use event_types::*;
        match self {
            Self::Login(_) => LOGIN,
            Self::Logout(_) => LOGOUT,
            Self::FileUpload(_) => FILE_UPLOAD,
            Self::RoleGranted(_) => ROLE_GRANTED,
            Self::RoleRevoked(_) => ROLE_REVOKED,
            Self::LogsCleared(_) => LOGS_CLEARED,
            Self::RetentionPruned(_) => RETENTION_PRUNED,
            Self::RecordTombstoned(_) => RECORD_TOMBSTONED,
            Self::Other { event_type, .. } => event_type,
        }
    }

    /// Render the payload as the JSON object that gets stored.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Login(d) => serde_json::to_value(d),
            Self::Logout(d) => serde_json::to_value(d),
            Self::FileUpload(d) => serde_json::to_value(d),
            Self::RoleGranted(d) | Self::RoleRevoked(d) => serde_json::to_value(d),
            Self::LogsCleared(d) => serde_json::to_value(d),
            Self::RetentionPruned(d) => serde_json::to_value(d),
            Self::RecordTombstoned(d) => serde_json::to_value(d),
            Self::Other { fields, .. } => Ok(Value::Object(fields.clone())),
        }
    }

    /// Interpret a stored payload object.
    pub fn from_parts(event_type: &str, fields: &Map<String, Value>) -> Self {
        use event_types::*;
        let typed = match event_type {
            LOGIN => parse(fields).map(Self::Login),
            LOGOUT => parse(fields).map(Self::Logout),
            FILE_UPLOAD => parse(fields).map(Self::FileUpload),
            ROLE_GRANTED => parse(fields).map(Self::RoleGranted),
            ROLE_REVOKED => parse(fields).map(Self::RoleRevoked),
            LOGS_CLEARED => parse(fields).map(Self::LogsCleared),
            RETENTION_PRUNED => parse(fields).map(Self::RetentionPruned),
            RECORD_TOMBSTONED => parse(fields).map(Self::RecordTombstoned),
            _ => None,
        };
        typed.unwrap_or_else(|| Self::Other {
            event_type: event_type.to_string(),
            fields: fields.clone(),
        })
    }
}

fn parse<T: DeserializeOwned>(fields: &Map<String, Value>) -> Option<T> {
    serde_json::from_value(Value::Object(fields.clone())).ok()
}
