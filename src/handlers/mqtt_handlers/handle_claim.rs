use crate::store;
use crate::validation::validate_claim;
use log::info;
use mongodb::Database;
use serde_json::Value;

/// One claim message off the broker: establishes or overwrites the device's
/// owner. Store errors propagate to the dispatcher — an unclaimed device
/// silently drops all of its future telemetry, so a failed claim has to be
/// visible.
pub async fn handle_claim(db: &Database, device_id: &str, payload: &[u8]) -> Result<(), String> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| format!("invalid JSON: {}", e))?;
    let claim = validate_claim(&value).map_err(|e| e.to_string())?;

    store::device::claim_device(db, &claim.uid, device_id, &claim)
        .await
        .map_err(|e| format!("claim write failed: {}", e))?;

    info!("[MQTT] device {} claimed by uid={}", device_id, claim.uid);
    Ok(())
}
