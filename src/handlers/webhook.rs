use crate::errors::{AppError, ErrorType, MongoRejection, ValidationRejection};
use crate::idempotency::derive_doc_id;
use crate::models::{WebhookBody, WebhookResponse};
use crate::normalize::normalize;
use crate::store;
use crate::validation::validate_webhook_body;
use chrono::Utc;
use log::info;
use mongodb::Database;
use serde_json::Value;
use warp::http::StatusCode;

/// HTTP ingress for at-least-once webhook deliveries. The idempotency key is
/// derived from the normalized body, so a retried delivery lands on the same
/// history row instead of duplicating it.
#[utoipa::path(
        post,
        path = "/webhook/telemetry",
        request_body = WebhookBody,
        responses(
            (status = 201, description = "Telemetry stored", body = WebhookResponse),
            (status = 400, description = "Malformed body, every offending field listed"),
            (status = 401, description = "Missing or invalid ingestion token"),
            (status = 500, description = "Store write failed"),
        )
    )
]
pub async fn webhook_telemetry_handler(
    body: Value,
    db: Database,
) -> Result<impl warp::Reply, warp::Rejection> {
    let body: WebhookBody = validate_webhook_body(&body)
        .map_err(|e| warp::reject::custom(ValidationRejection(e)))?;

    let received_at = Utc::now();
    let record = normalize(
        &body.uid,
        &body.device_id,
        received_at,
        body.ts,
        body.msg_id.clone(),
        &body.payload,
    );

    let payload_value = serde_json::to_value(&body.payload).map_err(|e| {
        warp::reject::custom(AppError {
            message: format!("payload re-serialization failed: {}", e),
            err_type: ErrorType::Internal,
        })
    })?;
    let doc_id = derive_doc_id(
        &body.uid,
        &body.device_id,
        record.ts,
        body.msg_id.as_deref(),
        &payload_value,
    );

    store::telemetry::save_telemetry(&db, &doc_id, &record)
        .await
        .map_err(|e| warp::reject::custom(MongoRejection(e)))?;

    info!(
        "telemetry stored + status updated uid={} device={} id={}",
        body.uid, body.device_id, doc_id
    );

    let response = WebhookResponse {
        ok: true,
        id: doc_id,
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&response),
        StatusCode::CREATED,
    ))
}
