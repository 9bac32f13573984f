//! Snapshot blob encoding: base64 over JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::{RemoteError, RemoteResult};
use crate::models::Snapshot;

/// Encode a snapshot into the opaque blob stored remotely.
pub fn encode_snapshot(snapshot: &Snapshot) -> RemoteResult<String> {
    let json = serde_json::to_vec(snapshot)
        .map_err(|error| RemoteError::Decode(format!("failed to encode snapshot: {error}")))?;
    Ok(STANDARD.encode(json))
}

/// Decode a remote blob back into a snapshot.
pub fn decode_snapshot(blob: &str) -> RemoteResult<Snapshot> {
    let bytes = STANDARD
        .decode(blob.trim())
        .map_err(|error| RemoteError::Decode(format!("invalid base64 payload: {error}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|error| RemoteError::Decode(format!("invalid snapshot JSON: {error}")))
}
