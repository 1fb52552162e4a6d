//! Config deserialization helpers.
//!
//! Realms configs and permissions database snapshots are read from JSON.

use crate::db::StaticPermissionsDb;
use crate::types::RealmsConfig;

/// Parse a realms config from a JSON string.
pub fn parse_realms_config(json: &str) -> Result<RealmsConfig, serde_json::Error> {
    serde_json::from_str(json)
}

/// Parse a permissions database snapshot from a JSON string.
pub fn parse_permissions_db(json: &str) -> Result<StaticPermissionsDb, serde_json::Error> {
    serde_json::from_str(json)
}
