use crate::config::AppConfig;
use crate::errors::MongoRejection;
use crate::models::{
    LatestResponse, ListQuery, ListResponse, StreamQuery, StreamUrlBody, StreamUrlResponse,
};
use crate::security::{build_stream_url, verify_sse_query};
use crate::store;
use async_stream::stream;
use futures::{Stream, StreamExt};
use log::{error, warn};
use mongodb::Database;
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_stream::wrappers::IntervalStream;
use warp::sse::Event;
use warp_rate_limit::RateLimitInfo;

const PING_PERIOD: Duration = Duration::from_secs(25);
const DEFAULT_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;
const MAX_STREAM_LIMIT: i64 = 200;

fn clamp_limit(limit: Option<i64>, max: i64) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, max)
}

/// `limit` most recent readings, newest first.
#[utoipa::path(
        get,
        path = "/api/telemetry/latest",
        params(ListQuery),
        responses(
            (status = 200, description = "Most recent readings", body = LatestResponse),
            (status = 401, description = "Missing or invalid token"),
        )
    )
]
pub async fn telemetry_latest_handler(
    query: ListQuery,
    db: Database,
) -> Result<impl warp::Reply, warp::Rejection> {
    let limit = clamp_limit(query.limit, MAX_LIST_LIMIT);
    let items = store::telemetry::latest(&db, &query.uid, &query.device_id, limit)
        .await
        .map_err(|e| warp::reject::custom(MongoRejection(e)))?;

    Ok(warp::reply::json(&LatestResponse { items }))
}

/// Cursor-paginated history, stable under concurrent ingestion.
#[utoipa::path(
        get,
        path = "/api/telemetry/list",
        params(ListQuery),
        responses(
            (status = 200, description = "One page of readings plus nextCursor", body = ListResponse),
            (status = 401, description = "Missing or invalid token"),
        )
    )
]
pub async fn telemetry_list_handler(
    query: ListQuery,
    db: Database,
) -> Result<impl warp::Reply, warp::Rejection> {
    let limit = clamp_limit(query.limit, MAX_LIST_LIMIT);
    let (items, next_cursor) = store::telemetry::list(
        &db,
        &query.uid,
        &query.device_id,
        limit,
        query.cursor.as_deref(),
    )
    .await
    .map_err(|e| warp::reject::custom(MongoRejection(e)))?;

    Ok(warp::reply::json(&ListResponse { items, next_cursor }))
}

/// Live stream behind the signed capability. The connection is upgraded to
/// an event stream only after the signature checks out; an expired or
/// malformed capability gets a plain JSON error instead.
pub async fn telemetry_stream_handler(
    query: StreamQuery,
    cfg: AppConfig,
    db: Database,
) -> Result<Box<dyn warp::Reply>, warp::Rejection> {
    let (uid, device_id) =
        verify_sse_query(&cfg.sse_hmac_secret, &query).map_err(warp::reject::custom)?;
    let limit = clamp_limit(query.limit, MAX_STREAM_LIMIT);

    let changes = store::telemetry::watch_device(&db, &uid, &device_id)
        .await
        .map_err(|e| warp::reject::custom(MongoRejection(e)))?;

    let stream = live_updates(db, uid, device_id, limit, Box::pin(changes));
    Ok(Box::new(warp::sse::reply(stream)))
}

/// Issues a signed, expiring stream URL. Token-guarded and rate-limited;
/// this is the only place capabilities come from.
#[utoipa::path(
        post,
        path = "/api/telemetry/stream-url",
        request_body = StreamUrlBody,
        responses(
            (status = 200, description = "Signed stream URL", body = StreamUrlResponse),
            (status = 401, description = "Missing or invalid token"),
        )
    )
]
pub async fn stream_url_handler(
    _rate_limit_info: RateLimitInfo,
    body: StreamUrlBody,
    cfg: AppConfig,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (url, exp) = build_stream_url(&cfg.sse_hmac_secret, &body.uid, &body.device_id, body.ttl);
    Ok(warp::reply::json(&StreamUrlResponse { url, exp }))
}

fn ping_event() -> Event {
    Event::default().event("ping").data("{}")
}

fn error_event(message: &str) -> Event {
    Event::default()
        .event("error")
        .data(serde_json::json!({ "message": message }).to_string())
}

async fn data_event(db: &Database, uid: &str, device_id: &str, limit: i64) -> Event {
    match store::telemetry::latest(db, uid, device_id, limit).await {
        Ok(items) => match serde_json::to_string(&items) {
            Ok(json) => Event::default().event("data").data(json),
            Err(e) => {
                error!("stream serialization failed for {}/{}: {}", uid, device_id, e);
                error_event(&e.to_string())
            }
        },
        // transient query failures surface as an error event, the session
        // itself stays up
        Err(e) => {
            warn!("stream query failed for {}/{}: {}", uid, device_id, e);
            error_event(&e.to_string())
        }
    }
}

/// The event stream for one live session. Owns both the change subscription
/// and the ping timer, so a client disconnect drops them together. Pushes
/// the current top-`limit` window on open and after every change, and a
/// ping every 25 seconds to defeat idle-timeout middleboxes.
fn live_updates(
    db: Database,
    uid: String,
    device_id: String,
    limit: i64,
    mut changes: impl Stream<
            Item = mongodb::error::Result<
                mongodb::change_stream::event::ChangeStreamEvent<mongodb::bson::Document>,
            >,
        > + Unpin,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream! {
        let mut ping = IntervalStream::new(interval_at(Instant::now() + PING_PERIOD, PING_PERIOD));
        let mut changes_open = true;

        yield Ok(data_event(&db, &uid, &device_id, limit).await);

        loop {
            tokio::select! {
                _ = ping.next() => {
                    yield Ok(ping_event());
                }
                change = changes.next(), if changes_open => match change {
                    Some(Ok(_)) => {
                        yield Ok(data_event(&db, &uid, &device_id, limit).await);
                    }
                    Some(Err(e)) => {
                        warn!("change stream error for {}/{}: {}", uid, device_id, e);
                        yield Ok(error_event(&e.to_string()));
                    }
                    None => {
                        warn!("change stream closed for {}/{}", uid, device_id);
                        changes_open = false;
                        yield Ok(error_event("change stream closed"));
                    }
                },
            }
        }
    }
}
