use crate::models::{ClaimPayload, MqttTelemetryMessage, TelemetryPayload, WebhookBody};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// One offending field, named by its JSON path.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Collects every offending field, not just the first one.
#[derive(Debug, Serialize, Clone, PartialEq, Default)]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    fn push(&mut self, field: &str, message: &str) {
        self.fields.push(FieldError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    fn into_result<T>(self, value: T) -> Result<T, ValidationError> {
        if self.fields.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields.iter().map(|e| e.field.as_str()).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

// JSON null counts as absent: a device that knows a sensor is missing may
// report it as null, and re-validating an already-normalized record must
// succeed.
fn num_field(obj: &Map<String, Value>, field: &str, errs: &mut ValidationError) -> Option<f64> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => {
            errs.push(field, "expected a number");
            None
        }
    }
}

fn int_field(obj: &Map<String, Value>, field: &str, errs: &mut ValidationError) -> Option<i64> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Some(i),
            None => {
                errs.push(field, "expected an integer");
                None
            }
        },
        Some(_) => {
            errs.push(field, "expected an integer");
            None
        }
    }
}

fn bool_field(obj: &Map<String, Value>, field: &str, errs: &mut ValidationError) -> Option<bool> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => {
            errs.push(field, "expected a boolean");
            None
        }
    }
}

fn str_field(obj: &Map<String, Value>, field: &str, errs: &mut ValidationError) -> Option<String> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errs.push(field, "expected a string");
            None
        }
    }
}

fn required_str(obj: &Map<String, Value>, field: &str, errs: &mut ValidationError) -> String {
    match obj.get(field) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::String(_)) => {
            errs.push(field, "must not be empty");
            String::new()
        }
        None | Some(Value::Null) => {
            errs.push(field, "is required");
            String::new()
        }
        Some(_) => {
            errs.push(field, "expected a string");
            String::new()
        }
    }
}

fn as_object<'a>(value: &'a Value, errs: &mut ValidationError) -> Option<&'a Map<String, Value>> {
    match value.as_object() {
        Some(obj) => Some(obj),
        None => {
            errs.push("$", "expected a JSON object");
            None
        }
    }
}

const SENSOR_FIELDS: &[&str] = &[
    "ph", "ec", "waterTempC", "airTempC", "humidity", "levelMin", "levelMax", "rssi", "fw",
];

/// Pulls the typed sensor fields out of `obj`; anything not in `reserved`
/// and not a known sensor field is carried along untouched.
fn sensor_payload(
    obj: &Map<String, Value>,
    reserved: &[&str],
    errs: &mut ValidationError,
) -> TelemetryPayload {
    let mut payload = TelemetryPayload {
        ph: num_field(obj, "ph", errs),
        ec: num_field(obj, "ec", errs),
        water_temp_c: num_field(obj, "waterTempC", errs),
        air_temp_c: num_field(obj, "airTempC", errs),
        humidity: num_field(obj, "humidity", errs),
        level_min: bool_field(obj, "levelMin", errs),
        level_max: bool_field(obj, "levelMax", errs),
        rssi: int_field(obj, "rssi", errs),
        fw: str_field(obj, "fw", errs),
        extra: Map::new(),
    };

    for (key, value) in obj {
        if !SENSOR_FIELDS.contains(&key.as_str()) && !reserved.contains(&key.as_str()) {
            payload.extra.insert(key.clone(), value.clone());
        }
    }

    payload
}

/// Validates a telemetry message off the broker: optional routing fields
/// (`uid`, `deviceId`, `ts`) alongside the sensor fields.
pub fn validate_telemetry(value: &Value) -> Result<MqttTelemetryMessage, ValidationError> {
    let mut errs = ValidationError::default();
    let obj = match as_object(value, &mut errs) {
        Some(obj) => obj,
        None => return Err(errs),
    };

    let message = MqttTelemetryMessage {
        uid: str_field(obj, "uid", &mut errs),
        device_id: str_field(obj, "deviceId", &mut errs),
        ts: int_field(obj, "ts", &mut errs),
        payload: sensor_payload(obj, &["uid", "deviceId", "ts"], &mut errs),
    };

    errs.into_result(message)
}

/// Validates a claim message: `uid` is mandatory, metadata optional.
pub fn validate_claim(value: &Value) -> Result<ClaimPayload, ValidationError> {
    let mut errs = ValidationError::default();
    let obj = match as_object(value, &mut errs) {
        Some(obj) => obj,
        None => return Err(errs),
    };

    let claim = ClaimPayload {
        uid: required_str(obj, "uid", &mut errs),
        model: str_field(obj, "model", &mut errs),
        fw: str_field(obj, "fw", &mut errs),
    };

    errs.into_result(claim)
}

/// Validates the webhook body `{uid, deviceId, msgId?, ts?, payload:{...}}`.
pub fn validate_webhook_body(value: &Value) -> Result<WebhookBody, ValidationError> {
    let mut errs = ValidationError::default();
    let obj = match as_object(value, &mut errs) {
        Some(obj) => obj,
        None => return Err(errs),
    };

    let payload = match obj.get("payload") {
        Some(Value::Object(payload)) => sensor_payload(payload, &[], &mut errs),
        Some(_) => {
            errs.push("payload", "expected a JSON object");
            TelemetryPayload::default()
        }
        None => {
            errs.push("payload", "is required");
            TelemetryPayload::default()
        }
    };

    let body = WebhookBody {
        uid: required_str(obj, "uid", &mut errs),
        device_id: required_str(obj, "deviceId", &mut errs),
        msg_id: str_field(obj, "msgId", &mut errs),
        ts: int_field(obj, "ts", &mut errs),
        payload,
    };

    errs.into_result(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn telemetry_accepts_minimal_message() {
        let msg = validate_telemetry(&json!({})).unwrap();
        assert!(msg.uid.is_none());
        assert!(msg.payload.ph.is_none());
    }

    #[test]
    fn telemetry_coerces_known_fields() {
        let msg = validate_telemetry(&json!({
            "uid": "u1",
            "ts": 1700000000000i64,
            "ph": 6.1,
            "ec": 2,
            "levelMin": true,
            "rssi": -71,
            "fw": "1.4.2"
        }))
        .unwrap();
        assert_eq!(msg.uid.as_deref(), Some("u1"));
        assert_eq!(msg.ts, Some(1700000000000));
        assert_eq!(msg.payload.ph, Some(6.1));
        assert_eq!(msg.payload.ec, Some(2.0));
        assert_eq!(msg.payload.level_min, Some(true));
        assert_eq!(msg.payload.rssi, Some(-71));
        assert_eq!(msg.payload.fw.as_deref(), Some("1.4.2"));
    }

    #[test]
    fn telemetry_reports_every_bad_field() {
        let err = validate_telemetry(&json!({
            "ph": "acid",
            "levelMax": 1,
            "ts": "later"
        }))
        .unwrap_err();
        let mut fields: Vec<&str> = err.fields.iter().map(|e| e.field.as_str()).collect();
        fields.sort();
        assert_eq!(fields, vec!["levelMax", "ph", "ts"]);
    }

    #[test]
    fn telemetry_preserves_unknown_fields() {
        let msg = validate_telemetry(&json!({
            "ph": 6.0,
            "co2Ppm": 850,
            "pumpState": "on"
        }))
        .unwrap();
        assert_eq!(msg.payload.extra.get("co2Ppm"), Some(&json!(850)));
        assert_eq!(msg.payload.extra.get("pumpState"), Some(&json!("on")));
    }

    #[test]
    fn telemetry_treats_null_as_absent() {
        let msg = validate_telemetry(&json!({ "ph": null, "humidity": 55.0 })).unwrap();
        assert!(msg.payload.ph.is_none());
        assert_eq!(msg.payload.humidity, Some(55.0));
    }

    #[test]
    fn claim_requires_uid() {
        let err = validate_claim(&json!({ "model": "HydroESP32" })).unwrap_err();
        assert_eq!(err.fields.len(), 1);
        assert_eq!(err.fields[0].field, "uid");

        let claim = validate_claim(&json!({ "uid": "u1", "fw": "1.0.0" })).unwrap();
        assert_eq!(claim.uid, "u1");
        assert_eq!(claim.fw.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn webhook_body_requires_identity_and_payload() {
        let err = validate_webhook_body(&json!({ "payload": {} })).unwrap_err();
        let mut fields: Vec<&str> = err.fields.iter().map(|e| e.field.as_str()).collect();
        fields.sort();
        assert_eq!(fields, vec!["deviceId", "uid"]);

        let err = validate_webhook_body(&json!({ "uid": "u1", "deviceId": "d1" })).unwrap_err();
        assert_eq!(err.fields[0].field, "payload");
    }

    #[test]
    fn webhook_body_rejects_non_object_root() {
        assert!(validate_webhook_body(&json!([1, 2, 3])).is_err());
        assert!(validate_telemetry(&json!("nope")).is_err());
    }
}
