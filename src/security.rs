use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::StreamQuery;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use warp::Filter;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_STREAM_TTL_SECS: i64 = 3600;

/// Shared-secret check on the `x-hydroiot-token` header. Guards ingestion
/// and the plain history queries.
pub fn with_token(
    cfg: AppConfig,
) -> impl Filter<Extract = (), Error = warp::Rejection> + Clone {
    warp::header::<String>("x-hydroiot-token")
        .and(warp::any().map(move || cfg.clone()))
        .and_then(|token: String, cfg: AppConfig| async move {
            if token == cfg.hydroiot_token {
                Ok(())
            } else {
                Err(warp::reject::custom(AppError::unauthorized("Unauthorized")))
            }
        })
        .untuple_one()
}

/// Signature over `"uid:deviceId:exp"` for the stream capability.
pub fn sign_sse_query(secret: &str, uid: &str, device_id: &str, exp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(format!("{}:{}:{}", uid, device_id, exp).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Checks a signed stream query: all four components present, `exp` still in
/// the future, signature matching the recomputation exactly. How the caller
/// obtained the values never matters. Returns the verified (uid, deviceId).
pub fn verify_sse_query(secret: &str, query: &StreamQuery) -> Result<(String, String), AppError> {
    let (uid, device_id, exp, sig) = match (
        query.uid.as_deref(),
        query.device_id.as_deref(),
        query.exp,
        query.sig.as_deref(),
    ) {
        (Some(uid), Some(device_id), Some(exp), Some(sig))
            if !uid.is_empty() && !device_id.is_empty() && !sig.is_empty() =>
        {
            (uid, device_id, exp, sig)
        }
        _ => return Err(AppError::bad_request("Bad query")),
    };

    if Utc::now().timestamp() > exp {
        return Err(AppError::unauthorized("Expired"));
    }

    if sig != sign_sse_query(secret, uid, device_id, exp) {
        return Err(AppError::unauthorized("Invalid signature"));
    }

    Ok((uid.to_string(), device_id.to_string()))
}

/// Issues a signed stream URL valid for `ttl` seconds (one hour when unset).
pub fn build_stream_url(secret: &str, uid: &str, device_id: &str, ttl: Option<i64>) -> (String, i64) {
    let exp = Utc::now().timestamp() + ttl.unwrap_or(DEFAULT_STREAM_TTL_SECS);
    let sig = sign_sse_query(secret, uid, device_id, exp);
    let url = format!(
        "/api/telemetry/stream?uid={}&deviceId={}&exp={}&sig={}",
        uid, device_id, exp, sig
    );
    (url, exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "s3cr3t";

    fn signed_query(exp: i64) -> StreamQuery {
        StreamQuery {
            uid: Some("demo".to_string()),
            device_id: Some("dev1".to_string()),
            exp: Some(exp),
            sig: Some(sign_sse_query(SECRET, "demo", "dev1", exp)),
            limit: None,
        }
    }

    #[test]
    fn accepts_a_valid_signature() {
        assert!(verify_sse_query(SECRET, &signed_query(9999999999)).is_ok());
    }

    #[test]
    fn signature_is_the_hex_hmac_digest() {
        let sig = sign_sse_query(SECRET, "demo", "dev1", 9999999999);
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        // deterministic across calls
        assert_eq!(sig, sign_sse_query(SECRET, "demo", "dev1", 9999999999));
    }

    #[test]
    fn rejects_any_mutated_signature() {
        let mut query = signed_query(9999999999);
        let sig = query.sig.unwrap();
        let flipped = if sig.as_bytes()[0] == b'0' { '1' } else { '0' };
        query.sig = Some(format!("{}{}", flipped, &sig[1..]));

        let err = verify_sse_query(SECRET, &query).unwrap_err();
        assert_eq!(err.message, "Invalid signature");
    }

    #[test]
    fn rejects_signature_under_wrong_secret() {
        let query = signed_query(9999999999);
        let err = verify_sse_query("other", &query).unwrap_err();
        assert_eq!(err.message, "Invalid signature");
    }

    #[test]
    fn rejects_expired_capability_before_checking_the_signature() {
        let err = verify_sse_query(SECRET, &signed_query(1000)).unwrap_err();
        assert_eq!(err.message, "Expired");
    }

    #[test]
    fn rejects_missing_components() {
        let mut query = signed_query(9999999999);
        query.exp = None;
        let err = verify_sse_query(SECRET, &query).unwrap_err();
        assert_eq!(err.message, "Bad query");

        let mut query = signed_query(9999999999);
        query.uid = Some(String::new());
        let err = verify_sse_query(SECRET, &query).unwrap_err();
        assert_eq!(err.message, "Bad query");
    }

    #[test]
    fn built_url_verifies() {
        let (url, exp) = build_stream_url(SECRET, "demo", "dev1", None);
        assert!(url.starts_with("/api/telemetry/stream?uid=demo&deviceId=dev1&exp="));
        assert!(exp > Utc::now().timestamp());

        let sig = url.rsplit("sig=").next().unwrap().to_string();
        let query = StreamQuery {
            uid: Some("demo".to_string()),
            device_id: Some("dev1".to_string()),
            exp: Some(exp),
            sig: Some(sig),
            limit: None,
        };
        assert!(verify_sse_query(SECRET, &query).is_ok());
    }
}
