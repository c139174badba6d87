//! Line protocol messages for the write and read ports.
//!
//! Both ports speak newline-delimited UTF-8 JSON. Errors are reported as a single
//! plain-text line.

use geodb_types::event::{ChangeEvent, ChangeKind};
use serde::{Deserialize, Serialize};

/// Sent for a line that is not valid JSON of the expected shape.
pub const ERR_PARSE: &str = "Error parsing command";
/// Sent on the write port when the index rejects a well-formed command.
pub const ERR_SAVE: &str = "Error saving location";
/// Sent on the read port for a grid name that can never hold records.
pub const ERR_GRID_NOT_FOUND: &str = "Grid not found";

/// Write port command: `{"loc_id": "...", "lat": 1.0, "lon": 2.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteCommand {
    pub loc_id: String,
    pub lat: f64,
    pub lon: f64,
}

impl WriteCommand {
    pub fn new(loc_id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            loc_id: loc_id.into(),
            lat,
            lon,
        }
    }
}

/// Read port command: `{"gridName": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeCommand {
    #[serde(rename = "gridName")]
    pub grid_name: String,
}

impl SubscribeCommand {
    pub fn new(grid_name: impl Into<String>) -> Self {
        Self {
            grid_name: grid_name.into(),
        }
    }
}

/// A change event as streamed on the read port.
///
/// Variants are distinguished by their fields alone: updates carry the previous
/// coordinates, deletions carry only the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireEvent {
    #[serde(rename_all = "PascalCase")]
    Updated {
        loc_id: String,
        lat: f64,
        lon: f64,
        prev_lat: f64,
        prev_lon: f64,
    },
    #[serde(rename_all = "PascalCase")]
    Added { loc_id: String, lat: f64, lon: f64 },
    #[serde(rename_all = "PascalCase")]
    Deleted { loc_id: String },
}

impl WireEvent {
    pub fn loc_id(&self) -> &str {
        match self {
            WireEvent::Updated { loc_id, .. }
            | WireEvent::Added { loc_id, .. }
            | WireEvent::Deleted { loc_id } => loc_id,
        }
    }
}

impl From<&ChangeEvent> for WireEvent {
    fn from(event: &ChangeEvent) -> Self {
        let loc_id = event.record_id.clone();
        match event.kind {
            ChangeKind::Added => WireEvent::Added {
                loc_id,
                lat: event.latitude,
                lon: event.longitude,
            },
            ChangeKind::Updated {
                prev_latitude,
                prev_longitude,
            } => WireEvent::Updated {
                loc_id,
                lat: event.latitude,
                lon: event.longitude,
                prev_lat: prev_latitude,
                prev_lon: prev_longitude,
            },
            ChangeKind::Deleted => WireEvent::Deleted { loc_id },
        }
    }
}

/// Encode a message as one line, newline excluded.
pub fn encode_line<T: Serialize>(msg: &T) -> serde_json::Result<String> {
    serde_json::to_string(msg)
}

pub fn decode_write(line: &str) -> geodb::Result<WriteCommand> {
    Ok(serde_json::from_str(line.trim())?)
}

pub fn decode_subscribe(line: &str) -> geodb::Result<SubscribeCommand> {
    Ok(serde_json::from_str(line.trim())?)
}
