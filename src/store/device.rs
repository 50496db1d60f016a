use crate::models::{ClaimPayload, Device, DeviceIndexEntry};
use bson::{doc, Document};
use chrono::Utc;
use log::{error, info};
use mongodb::options::{FindOneOptions, UpdateOptions};
use mongodb::{Collection, Database};

pub const DEFAULT_MODEL: &str = "HydroESP32";

/// Looks up the owning uid for a device. The `deviceIndex` collection is the
/// fast path; on a miss the device documents are scanned for a matching
/// `deviceId` (ownership is unique, first match wins) and the index entry is
/// backfilled for next time. Store errors collapse to `None`: a reading for
/// an unresolvable device is skipped, never fatal to the pipeline.
pub async fn resolve_uid_by_device_id(db: &Database, device_id: &str) -> Option<String> {
    let index: Collection<DeviceIndexEntry> = db.collection("deviceIndex");

    match index.find_one(doc! { "_id": device_id }, None).await {
        Ok(Some(entry)) => return Some(entry.uid),
        Ok(None) => {}
        Err(e) => {
            error!("deviceIndex lookup failed for {}: {}", device_id, e);
            return None;
        }
    }

    let devices: Collection<Document> = db.collection("devices");
    let found = devices
        .find_one(
            doc! { "deviceId": device_id },
            FindOneOptions::builder()
                .projection(doc! { "uid": 1 })
                .build(),
        )
        .await;

    match found {
        Ok(Some(device)) => {
            let uid = device.get_str("uid").ok()?.to_string();

            // backfill the index so the next lookup is O(1)
            let now = Utc::now().timestamp_millis();
            let backfill = index
                .update_one(
                    doc! { "_id": device_id },
                    doc! {
                        "$set": { "uid": &uid, "updatedAt": now },
                        "$setOnInsert": { "createdAt": now },
                    },
                    UpdateOptions::builder().upsert(true).build(),
                )
                .await;
            if let Err(e) = backfill {
                error!("deviceIndex backfill failed for {}: {}", device_id, e);
            }

            Some(uid)
        }
        Ok(None) => None,
        Err(e) => {
            error!("device scan failed for {}: {}", device_id, e);
            None
        }
    }
}

/// Establishes (or overwrites) ownership of a device: merges the device
/// document and points the index entry at `uid`. Last claim wins;
/// re-claiming by the same owner is a no-op in effect. Errors propagate —
/// an unclaimed device silently drops all future telemetry, so the caller
/// must get the chance to retry or alert.
pub async fn claim_device(
    db: &Database,
    uid: &str,
    device_id: &str,
    claim: &ClaimPayload,
) -> mongodb::error::Result<()> {
    let now = Utc::now().timestamp_millis();
    let devices: Collection<Device> = db.collection("devices");
    let index: Collection<DeviceIndexEntry> = db.collection("deviceIndex");

    let mut set = doc! {
        "uid": uid,
        "deviceId": device_id,
        "model": claim.model.as_deref().unwrap_or(DEFAULT_MODEL),
        "lastSeen": now,
        "isOnline": true,
        "updatedAt": now,
    };
    if let Some(fw) = &claim.fw {
        set.insert("fw", fw);
    }

    devices
        .update_one(
            doc! { "uid": uid, "deviceId": device_id },
            doc! { "$set": set, "$setOnInsert": { "firstSeen": now } },
            UpdateOptions::builder().upsert(true).build(),
        )
        .await?;

    index
        .update_one(
            doc! { "_id": device_id },
            doc! {
                "$set": { "uid": uid, "updatedAt": now },
                "$setOnInsert": { "createdAt": now },
            },
            UpdateOptions::builder().upsert(true).build(),
        )
        .await?;

    info!("device {} claimed by uid={}", device_id, uid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{from_document, Bson};

    #[test]
    fn claimed_device_document_deserializes_into_the_typed_shape() {
        // the fields claim_device and the snapshot merge write
        let doc = doc! {
            "uid": "u1",
            "deviceId": "esp-42",
            "model": DEFAULT_MODEL,
            "fw": "1.4.2",
            "lastSeen": 1_700_000_000_000i64,
            "lastRssi": -71i64,
            "isOnline": true,
            "firstSeen": 1_699_999_000_000i64,
            "latest": Bson::Null,
        };

        let device: Device = from_document(doc).unwrap();
        assert_eq!(device.uid, "u1");
        assert_eq!(device.device_id, "esp-42");
        assert_eq!(device.model, DEFAULT_MODEL);
        assert_eq!(device.fw.as_deref(), Some("1.4.2"));
        assert_eq!(device.last_rssi, Some(-71));
        assert!(device.is_online);
        assert!(device.latest.is_none());
    }
}
