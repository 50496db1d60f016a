use crate::models::{TelemetryPayload, TelemetryRecord};
use chrono::{DateTime, Utc};

const BUCKET_MS: i64 = 15 * 60 * 1000;

/// Floors an epoch-ms instant to the nearest 15-minute boundary
/// (:00/:15/:30/:45). Attached to records as roll-up metadata.
pub fn bucket_ts(epoch_ms: i64) -> i64 {
    epoch_ms - epoch_ms.rem_euclid(BUCKET_MS)
}

/// Builds the canonical stored shape for one reading. The measurement time
/// falls back to the server receipt time when the device did not supply one;
/// absent numeric/string sensors become explicit nulls so every document has
/// the same fields; the boolean level flags stay absent unless the source
/// was strictly boolean.
pub fn normalize(
    uid: &str,
    device_id: &str,
    received_at: DateTime<Utc>,
    ts: Option<i64>,
    msg_id: Option<String>,
    payload: &TelemetryPayload,
) -> TelemetryRecord {
    let received_at_ms = received_at.timestamp_millis();

    TelemetryRecord {
        uid: uid.to_string(),
        device_id: device_id.to_string(),
        ts: ts.unwrap_or(received_at_ms),
        received_at: received_at_ms,
        bucket_ts: bucket_ts(received_at_ms),
        ph: payload.ph,
        ec: payload.ec,
        water_temp_c: payload.water_temp_c,
        air_temp_c: payload.air_temp_c,
        humidity: payload.humidity,
        level_min: payload.level_min,
        level_max: payload.level_max,
        rssi: payload.rssi,
        fw: payload.fw.clone(),
        msg_id,
        extra: payload.extra.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn received() -> DateTime<Utc> {
        // 2023-11-14 22:13:20 UTC
        Utc.timestamp_millis_opt(1700000000000).unwrap()
    }

    #[test]
    fn ts_defaults_to_received_at() {
        let record = normalize("u1", "d1", received(), None, None, &TelemetryPayload::default());
        assert_eq!(record.ts, 1700000000000);
        assert_eq!(record.received_at, 1700000000000);

        let record = normalize(
            "u1",
            "d1",
            received(),
            Some(1699999990000),
            None,
            &TelemetryPayload::default(),
        );
        assert_eq!(record.ts, 1699999990000);
        assert_eq!(record.received_at, 1700000000000);
    }

    #[test]
    fn absent_sensors_serialize_as_null_but_level_flags_vanish() {
        let record = normalize("u1", "d1", received(), None, None, &TelemetryPayload::default());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json.get("ph"), Some(&json!(null)));
        assert_eq!(json.get("humidity"), Some(&json!(null)));
        assert_eq!(json.get("fw"), Some(&json!(null)));
        assert!(json.get("levelMin").is_none());
        assert!(json.get("levelMax").is_none());
    }

    #[test]
    fn boolean_level_flags_are_kept() {
        let payload = TelemetryPayload {
            level_min: Some(false),
            ..Default::default()
        };
        let record = normalize("u1", "d1", received(), None, None, &payload);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json.get("levelMin"), Some(&json!(false)));
        assert!(json.get("levelMax").is_none());
    }

    #[test]
    fn bucket_floors_to_quarter_hour() {
        // 2023-11-14 22:13:20 UTC -> 22:00:00
        assert_eq!(bucket_ts(1700000000000), 1699999200000);
        // exact boundary stays put
        assert_eq!(bucket_ts(1699999200000), 1699999200000);
        // one ms before the boundary falls into the previous bucket
        assert_eq!(bucket_ts(1699999199999), 1699998300000);
    }

    #[test]
    fn normalize_is_idempotent_on_sensor_fields() {
        let payload = TelemetryPayload {
            ph: Some(6.1),
            ec: Some(1.9),
            level_max: Some(true),
            rssi: Some(-66),
            fw: Some("2.0.1".to_string()),
            ..Default::default()
        };
        let first = normalize("u1", "d1", received(), Some(1700000000000), None, &payload);

        let renormalized_payload = TelemetryPayload {
            ph: first.ph,
            ec: first.ec,
            water_temp_c: first.water_temp_c,
            air_temp_c: first.air_temp_c,
            humidity: first.humidity,
            level_min: first.level_min,
            level_max: first.level_max,
            rssi: first.rssi,
            fw: first.fw.clone(),
            extra: first.extra.clone(),
        };
        let second = normalize(
            "u1",
            "d1",
            received(),
            Some(first.ts),
            None,
            &renormalized_payload,
        );

        assert_eq!(first, second);
    }
}
