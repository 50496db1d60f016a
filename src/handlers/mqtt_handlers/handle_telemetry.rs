use crate::idempotency::mqtt_doc_id;
use crate::normalize::normalize;
use crate::store;
use crate::validation::validate_telemetry;
use chrono::Utc;
use log::{info, warn};
use mongodb::Database;
use serde_json::Value;

/// One telemetry message off the broker. The device id comes from the topic;
/// a payload-supplied uid wins over the index lookup. A device nobody has
/// claimed yet is an expected condition: the reading is skipped with a
/// warning, not an error.
pub async fn handle_telemetry(
    db: &Database,
    device_id: &str,
    payload: &[u8],
) -> Result<(), String> {
    let received_at = Utc::now();

    let value: Value =
        serde_json::from_slice(payload).map_err(|e| format!("invalid JSON: {}", e))?;
    let message = validate_telemetry(&value).map_err(|e| e.to_string())?;

    // the topic names the device; a differing payload deviceId loses
    if let Some(payload_device) = &message.device_id {
        if payload_device != device_id {
            warn!(
                "[MQTT] payload deviceId={} differs from topic deviceId={}",
                payload_device, device_id
            );
        }
    }

    let uid = match &message.uid {
        Some(uid) => uid.clone(),
        None => match store::device::resolve_uid_by_device_id(db, device_id).await {
            Some(uid) => uid,
            None => {
                warn!(
                    "[MQTT] uid not found for deviceId={}. Telemetry skipped until device is claimed.",
                    device_id
                );
                return Ok(());
            }
        },
    };

    let record = normalize(&uid, device_id, received_at, message.ts, None, &message.payload);
    // per-device topics at a bounded rate: the measurement timestamp is the
    // natural dedup key on this path
    let doc_id = mqtt_doc_id(&uid, device_id, record.ts);

    store::telemetry::save_telemetry(db, &doc_id, &record)
        .await
        .map_err(|e| format!("store write failed: {}", e))?;

    info!(
        "[MQTT] stored telemetry uid={} device={} ts={}",
        uid, device_id, record.ts
    );
    Ok(())
}
