use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};

/// Sensor fields as a device reports them. Everything is optional; unknown
/// fields survive in `extra` so a firmware update can ship new sensors
/// without a server release.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    pub ph: Option<f64>,
    pub ec: Option<f64>,
    pub water_temp_c: Option<f64>,
    pub air_temp_c: Option<f64>,
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_min: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_max: Option<bool>,
    pub rssi: Option<i64>,
    pub fw: Option<String>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

/// Body of `POST /webhook/telemetry`.
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookBody {
    pub uid: String,
    pub device_id: String,
    pub msg_id: Option<String>,
    pub ts: Option<i64>,
    pub payload: TelemetryPayload,
}

/// A telemetry message as delivered on `devices/{deviceId}/telemetry`.
/// `uid`, `deviceId` and `ts` ride alongside the sensor fields.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MqttTelemetryMessage {
    pub uid: Option<String>,
    pub device_id: Option<String>,
    pub ts: Option<i64>,
    #[serde(flatten)]
    pub payload: TelemetryPayload,
}

/// A claim message as delivered on `devices/{deviceId}/claim`. Establishes
/// the device's owner.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ClaimPayload {
    pub uid: String,
    pub model: Option<String>,
    pub fw: Option<String>,
}

/// The canonical stored shape of a single reading. Absent numeric/string
/// sensors serialize as explicit nulls so every history document has the
/// same fields; the level flags are the one exception (a missing level
/// sensor and "not triggered" must stay distinguishable).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub uid: String,
    pub device_id: String,
    /// Measurement time, epoch millis.
    pub ts: i64,
    /// Server ingestion time, epoch millis.
    pub received_at: i64,
    /// `received_at` floored to the 15-minute boundary. Roll-up metadata,
    /// never an identifier.
    pub bucket_ts: i64,
    pub ph: Option<f64>,
    pub ec: Option<f64>,
    pub water_temp_c: Option<f64>,
    pub air_temp_c: Option<f64>,
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_min: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_max: Option<bool>,
    pub rssi: Option<i64>,
    pub fw: Option<String>,
    pub msg_id: Option<String>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

/// History row as persisted: a [`TelemetryRecord`] keyed by its dedup id.
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct StoredTelemetry {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub record: TelemetryRecord,
}

/// One document per (uid, deviceId); always merged, never versioned.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub uid: String,
    pub device_id: String,
    pub model: String,
    pub fw: Option<String>,
    pub last_seen: i64,
    pub last_rssi: Option<i64>,
    pub is_online: bool,
    pub first_seen: Option<i64>,
    pub latest: Option<TelemetryRecord>,
}

/// deviceIndex entry: deviceId -> owning uid. Last writer wins.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIndexEntry {
    #[serde(rename = "_id")]
    pub device_id: String,
    pub uid: String,
    pub created_at: Option<i64>,
    pub updated_at: i64,
}

// Query for /api/telemetry/latest and /api/telemetry/list
#[derive(Debug, Serialize, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub uid: String,
    pub device_id: String,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

// Query for /api/telemetry/stream
#[derive(Debug, Serialize, Deserialize, Clone, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    pub uid: Option<String>,
    pub device_id: Option<String>,
    pub exp: Option<i64>,
    pub sig: Option<String>,
    pub limit: Option<i64>,
}

// Body for /api/telemetry/stream-url
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamUrlBody {
    pub uid: String,
    pub device_id: String,
    /// Seconds the signed link stays valid. Defaults to one hour.
    pub ttl: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamUrlResponse {
    pub url: String,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LatestResponse {
    pub items: Vec<StoredTelemetry>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub items: Vec<StoredTelemetry>,
    /// `null` once the history is exhausted.
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookResponse {
    pub ok: bool,
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn latest_response_carries_no_cursor_field() {
        let json = serde_json::to_value(LatestResponse { items: vec![] }).unwrap();
        assert_eq!(json, json!({ "items": [] }));
    }

    #[test]
    fn list_response_reports_exhaustion_as_an_explicit_null() {
        let exhausted = serde_json::to_value(ListResponse {
            items: vec![],
            next_cursor: None,
        })
        .unwrap();
        assert_eq!(exhausted, json!({ "items": [], "nextCursor": null }));

        let more = serde_json::to_value(ListResponse {
            items: vec![],
            next_cursor: Some("a1b2".to_string()),
        })
        .unwrap();
        assert_eq!(more["nextCursor"], json!("a1b2"));
    }
}
