use crate::models::{Device, StoredTelemetry, TelemetryRecord};
use crate::store::device::DEFAULT_MODEL;
use chrono::Utc;
use log::{debug, error};
use mongodb::bson::{doc, to_bson, Document};
use mongodb::change_stream::{event::ChangeStreamEvent, ChangeStream};
use mongodb::options::{ChangeStreamOptions, FindOptions, ReplaceOptions, UpdateOptions};
use mongodb::{Collection, Database};
use futures::TryStreamExt;

fn history(db: &Database) -> Collection<StoredTelemetry> {
    db.collection("telemetry")
}

/// Durable write for one reading: the immutable history row first, then the
/// device's latest-snapshot merge. Both are per-document upserts, so a
/// retried write with identical content is a no-op rather than a duplicate.
/// The snapshot update is best effort — once the history row (the source of
/// truth) is down, a transient failure there must not undo it.
pub async fn save_telemetry(
    db: &Database,
    doc_id: &str,
    record: &TelemetryRecord,
) -> mongodb::error::Result<()> {
    let stored = StoredTelemetry {
        id: doc_id.to_string(),
        record: record.clone(),
    };

    history(db)
        .replace_one(
            doc! { "_id": doc_id },
            &stored,
            ReplaceOptions::builder().upsert(true).build(),
        )
        .await?;

    if let Err(e) = update_device_snapshot(db, record).await {
        error!(
            "snapshot update failed for {}/{} after durable history write: {}",
            record.uid, record.device_id, e
        );
    }

    debug!(
        "saved telemetry uid={} device={} ts={}",
        record.uid, record.device_id, record.ts
    );
    Ok(())
}

async fn update_device_snapshot(
    db: &Database,
    record: &TelemetryRecord,
) -> mongodb::error::Result<()> {
    let devices: Collection<Device> = db.collection("devices");
    let now = Utc::now().timestamp_millis();

    let mut set = doc! {
        "uid": &record.uid,
        "deviceId": &record.device_id,
        "lastSeen": record.received_at,
        "isOnline": true,
        "updatedAt": now,
        "latest": to_bson(record)?,
    };
    // never clobber a known firmware/signal value with a missing one
    if let Some(fw) = &record.fw {
        set.insert("fw", fw);
    }
    if let Some(rssi) = record.rssi {
        set.insert("lastRssi", rssi);
    }

    devices
        .update_one(
            doc! { "uid": &record.uid, "deviceId": &record.device_id },
            doc! {
                "$set": set,
                "$setOnInsert": { "firstSeen": now, "model": DEFAULT_MODEL },
            },
            UpdateOptions::builder().upsert(true).build(),
        )
        .await?;

    Ok(())
}

/// The `limit` most recent readings for one device, newest first. `_id` is
/// the tiebreak so equal timestamps still order deterministically.
pub async fn latest(
    db: &Database,
    uid: &str,
    device_id: &str,
    limit: i64,
) -> mongodb::error::Result<Vec<StoredTelemetry>> {
    let options = FindOptions::builder()
        .sort(doc! { "ts": -1, "_id": 1 })
        .limit(limit)
        .build();

    history(db)
        .find(doc! { "uid": uid, "deviceId": device_id }, options)
        .await?
        .try_collect()
        .await
}

/// Same ordering as [`latest`], resuming strictly after the row named by
/// `cursor` (its `_id`). New rows arriving at the head never shift or
/// duplicate later pages. Returns the items plus the cursor for the next
/// page, `None` once a page comes back empty.
pub async fn list(
    db: &Database,
    uid: &str,
    device_id: &str,
    limit: i64,
    cursor: Option<&str>,
) -> mongodb::error::Result<(Vec<StoredTelemetry>, Option<String>)> {
    let mut filter = doc! { "uid": uid, "deviceId": device_id };

    if let Some(cursor) = cursor {
        if let Some(last) = history(db).find_one(doc! { "_id": cursor }, None).await? {
            filter.insert("$or", resume_clauses(last.record.ts, cursor));
        }
    }

    let options = FindOptions::builder()
        .sort(doc! { "ts": -1, "_id": 1 })
        .limit(limit)
        .build();

    let items: Vec<StoredTelemetry> = history(db).find(filter, options).await?.try_collect().await?;
    let next_cursor = items.last().map(|item| item.id.clone());

    Ok((items, next_cursor))
}

/// Everything strictly after the row named by the cursor, in the order the
/// `{ts: -1, _id: 1}` page sort produces: older timestamps, or equal
/// timestamps with a greater `_id`.
fn resume_clauses(last_ts: i64, cursor: &str) -> Vec<Document> {
    vec![
        doc! { "ts": { "$lt": last_ts } },
        doc! { "ts": last_ts, "_id": { "$gt": cursor } },
    ]
}

/// Change-notification subscription over one device's history: yields an
/// event whenever a row for (uid, deviceId) is written. The consumer re-runs
/// its bounded query per event rather than reading the event body.
pub async fn watch_device(
    db: &Database,
    uid: &str,
    device_id: &str,
) -> mongodb::error::Result<ChangeStream<ChangeStreamEvent<Document>>> {
    let pipeline = [doc! {
        "$match": {
            "operationType": { "$in": ["insert", "update", "replace"] },
            "fullDocument.uid": uid,
            "fullDocument.deviceId": device_id,
        }
    }];

    db.collection::<Document>("telemetry")
        .watch(
            pipeline,
            ChangeStreamOptions::builder()
                .full_document(Some(mongodb::options::FullDocumentType::UpdateLookup))
                .build(),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::Bson;

    // Evaluates the resume clauses against one (ts, _id) row the way the
    // server evaluates the $or filter.
    fn row_matches(clauses: &[Document], ts: i64, id: &str) -> bool {
        clauses.iter().any(|clause| {
            let ts_ok = match clause.get("ts") {
                Some(Bson::Document(cond)) => cond.get_i64("$lt").map(|b| ts < b).unwrap_or(false),
                Some(Bson::Int64(eq)) => ts == *eq,
                _ => false,
            };
            let id_ok = match clause.get("_id") {
                Some(Bson::Document(cond)) => cond.get_str("$gt").map(|c| id > c).unwrap_or(false),
                None => true,
                _ => false,
            };
            ts_ok && id_ok
        })
    }

    #[test]
    fn resume_picks_up_exactly_after_an_equal_timestamp_boundary() {
        // three rows share one timestamp; the cursor is parked on the middle
        // one, so only its successors within the tie may match
        let clauses = resume_clauses(500, "b");
        assert!(!row_matches(&clauses, 500, "a"));
        assert!(!row_matches(&clauses, 500, "b"));
        assert!(row_matches(&clauses, 500, "c"));
        // older rows always match, newer ones never do
        assert!(row_matches(&clauses, 499, "a"));
        assert!(!row_matches(&clauses, 501, "z"));
    }

    #[test]
    fn paging_120_rows_with_ties_yields_no_duplicates_or_gaps() {
        // 40 timestamps, three rows each; ids deliberately out of insertion
        // order so the _id tiebreak is doing real work
        let mut rows: Vec<(i64, String)> = Vec::new();
        for ts in 0..40i64 {
            for id in ["r2", "r0", "r1"] {
                rows.push((1_700_000_000_000 + ts * 1000, format!("{}-{:02}", id, ts)));
            }
        }
        // the {ts: -1, _id: 1} page sort
        rows.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        // page size 9 never divides 40 evenly, so ties straddle page edges
        let mut collected: Vec<(i64, String)> = Vec::new();
        let mut cursor: Option<(i64, String)> = None;
        loop {
            let page: Vec<(i64, String)> = rows
                .iter()
                .filter(|(ts, id)| match &cursor {
                    Some((last_ts, last_id)) => {
                        row_matches(&resume_clauses(*last_ts, last_id), *ts, id)
                    }
                    None => true,
                })
                .take(9)
                .cloned()
                .collect();
            if page.is_empty() {
                break;
            }
            cursor = page.last().cloned();
            collected.extend(page);
        }

        assert_eq!(collected.len(), 120);
        assert_eq!(collected, rows);
    }
}
