use serde_json::Value;
use sha2::{Digest, Sha256};

/// Renders a JSON value with object keys sorted at every level, so the hash
/// below does not depend on the order a producer happened to emit fields in.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    let key = Value::String(k.clone());
                    format!("{}:{}", key, canonical_json(&map[k]))
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

/// Content-addressed id for a webhook delivery. Retried deliveries of the
/// same reading hash to the same id and collapse onto one history row.
pub fn derive_doc_id(
    uid: &str,
    device_id: &str,
    ts: i64,
    msg_id: Option<&str>,
    payload: &Value,
) -> String {
    let input = format!(
        "{}:{}:{}:{}:{}",
        uid,
        device_id,
        ts,
        msg_id.unwrap_or(""),
        canonical_json(payload)
    );

    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..40].to_string()
}

/// The MQTT path keys history by the measurement timestamp instead: each
/// device publishes on its own topic at a bounded rate, so (uid, deviceId,
/// ts) already identifies a reading.
pub fn mqtt_doc_id(uid: &str, device_id: &str, ts: i64) -> String {
    format!("{}:{}:{}", uid, device_id, ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derive_is_deterministic() {
        let payload = json!({ "ph": 6.2, "ec": 1.8 });
        let a = derive_doc_id("u1", "d1", 1700000000000, Some("m-1"), &payload);
        let b = derive_doc_id("u1", "d1", 1700000000000, Some("m-1"), &payload);
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
    }

    #[test]
    fn derive_ignores_field_order() {
        let a = derive_doc_id("u1", "d1", 1, None, &json!({ "ph": 6.2, "ec": 1.8 }));
        let b = derive_doc_id("u1", "d1", 1, None, &json!({ "ec": 1.8, "ph": 6.2 }));
        assert_eq!(a, b);
    }

    #[test]
    fn any_differing_input_changes_the_key() {
        let payload = json!({ "ph": 6.2 });
        let base = derive_doc_id("u1", "d1", 1700000000000, Some("m-1"), &payload);

        assert_ne!(base, derive_doc_id("u2", "d1", 1700000000000, Some("m-1"), &payload));
        assert_ne!(base, derive_doc_id("u1", "d2", 1700000000000, Some("m-1"), &payload));
        assert_ne!(base, derive_doc_id("u1", "d1", 1700000000001, Some("m-1"), &payload));
        assert_ne!(base, derive_doc_id("u1", "d1", 1700000000000, Some("m-2"), &payload));
        assert_ne!(base, derive_doc_id("u1", "d1", 1700000000000, None, &payload));
        assert_ne!(
            base,
            derive_doc_id("u1", "d1", 1700000000000, Some("m-1"), &json!({ "ph": 6.3 }))
        );
    }

    #[test]
    fn mqtt_id_is_the_timestamp_key() {
        assert_eq!(mqtt_doc_id("u1", "d1", 42), "u1:d1:42");
    }
}
