//! Stable per-installation device identity.

use std::sync::Arc;

use uuid::Uuid;

use crate::storage::{keys, KeyValueStore};
use crate::Result;

/// Opaque identifier for this installation, used only as tombstone provenance.
#[derive(Clone)]
pub struct DeviceIdentity {
    kv: Arc<dyn KeyValueStore>,
}

impl DeviceIdentity {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Return the persisted device id, generating and storing it on first use.
    pub async fn device_id(&self) -> Result<String> {
        if let Some(existing) = self.kv.get(keys::DEVICE_ID).await? {
            let existing = existing.trim();
            if !existing.is_empty() {
                return Ok(existing.to_string());
            }
        }

        let generated = generate_device_id();
        self.kv.set(keys::DEVICE_ID, &generated).await?;
        tracing::info!("Assigned new device id {}", generated);
        Ok(generated)
    }
}

/// `<unix-ms base36>-<random>-<platform>`, e.g. `lq2k8v1c-4f9a1b2c-linux`.
fn generate_device_id() -> String {
    let millis = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        to_base36(millis),
        &random[..8],
        std::env::consts::OS
    )
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
