use std::path::Path;

use chrono::Local;
use serde_json::Value as Json;

use crate::api::{ChangeFeed, RemoteClient};
use crate::config::Config;
use crate::error::Result;
use crate::storage::{repository, Database};
use crate::sync::{entities, watermark, EntityReport, SyncReport, SyncStatus};

/// Run one inbound sync pass: probe connectivity, fetch the change feed
/// since the lead-adjusted watermark, apply every bucket in dispatch
/// order, then persist the new watermark.
///
/// The watermark candidate is captured BEFORE the fetch, so anything the
/// remote writes while this pass runs lands inside the next window.
pub async fn sync_once(db: &Database, client: &RemoteClient, config: &Config) -> Result<SyncReport> {
    let timeout = config.connectivity_timeout();
    if !client
        .check_connectivity(&config.server.connectivity_url, timeout)
        .await
    {
        log::warn!("remote unreachable, skipping sync pass");
        return Ok(SyncReport::offline());
    }

    let status_file = &config.server.status_file;
    let last = watermark::load_last_sync(status_file);
    let next_watermark = Local::now().naive_local();

    let since = last.map(|wm| watermark::since_param(wm, config.server.lead_interval_minutes));
    match &since {
        Some(since) => log::info!("fetching changes since {since}"),
        None => log::info!("no previous sync, fetching full dataset"),
    }
    let feed = client.fetch_changes(since.as_deref()).await?;

    if !feed.has_changes() {
        log::info!("remote reported no changes");
        return Ok(SyncReport::no_changes());
    }

    // Image prefetch is best-effort; a missing picture never fails a pass.
    if let Some(assets_dir) = &config.server.assets_dir {
        prefetch_account_images(client, &feed, assets_dir).await;
    }

    let device_id = config.server.device_id.clone();
    let entities = apply_feed(db, feed, device_id).await?;

    let mut report = SyncReport::from_entities(entities, false);
    if report.status != SyncStatus::Failed {
        watermark::save_last_sync(status_file, next_watermark, Local::now().naive_local())?;
        report.watermark_advanced = true;
    }
    log::info!(
        "sync pass finished: {:?}, {} entity bucket(s)",
        report.status,
        report.entities.len()
    );
    Ok(report)
}

/// Apply one change feed against the local database. All buckets run on
/// the single writer connection, in the fixed dispatch order. Deletions
/// in the feed are reported by the remote but never applied locally.
pub async fn apply_feed(
    db: &Database,
    feed: ChangeFeed,
    device_id: Option<String>,
) -> Result<Vec<EntityReport>> {
    let reports = db
        .writer()
        .call(move |conn| {
            let mut reports = Vec::new();
            for mapping in entities::DISPATCH_ORDER {
                let Some(bucket) = feed.bucket(mapping.payload_key) else {
                    continue;
                };
                if !bucket.deleted().is_empty() {
                    log::warn!(
                        "{}: ignoring {} deleted record(s), local deletes are not applied",
                        mapping.entity,
                        bucket.deleted().len()
                    );
                }
                if bucket.is_empty() {
                    continue;
                }

                if mapping.payload_key == "local_with_room" {
                    // Each local record may carry its rooms nested under
                    // "rooms"; locals land first, then the flattened rooms.
                    let created_rooms = nested_rooms(bucket.created());
                    let updated_rooms = nested_rooms(bucket.updated());
                    reports.push(EntityReport {
                        entity: entities::LOCAL.entity,
                        created: repository::insert_records(conn, &entities::LOCAL, bucket.created()),
                        updated: repository::update_records(
                            conn,
                            &entities::LOCAL,
                            bucket.updated(),
                            device_id.as_deref(),
                        ),
                    });
                    reports.push(EntityReport {
                        entity: entities::ROOM.entity,
                        created: repository::insert_records(conn, &entities::ROOM, &created_rooms),
                        updated: repository::update_records(
                            conn,
                            &entities::ROOM,
                            &updated_rooms,
                            device_id.as_deref(),
                        ),
                    });
                    continue;
                }

                reports.push(EntityReport {
                    entity: mapping.entity,
                    created: repository::insert_records(conn, mapping, bucket.created()),
                    updated: repository::update_records(
                        conn,
                        mapping,
                        bucket.updated(),
                        device_id.as_deref(),
                    ),
                });
            }
            Ok::<_, rusqlite::Error>(reports)
        })
        .await?;
    Ok(reports)
}

fn nested_rooms(records: &[Json]) -> Vec<Json> {
    records
        .iter()
        .filter_map(|r| r.get("rooms"))
        .filter_map(Json::as_array)
        .flatten()
        .cloned()
        .collect()
}

async fn prefetch_account_images(client: &RemoteClient, feed: &ChangeFeed, dir: &Path) {
    let Some(bucket) = feed.bucket("account") else {
        return;
    };
    for record in bucket.created().iter().chain(bucket.updated()) {
        let Some(name) = record.get("image").and_then(Json::as_str) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        if let Err(e) = client.download_image(name, dir).await {
            log::warn!("image {name} download failed: {e}");
        }
    }
}

/// Run inbound sync passes forever at the configured interval. A failed
/// pass is logged and retried next tick.
pub async fn run_continuous(db: &Database, client: &RemoteClient, config: &Config) {
    let interval = config.sync_interval();
    loop {
        if let Err(e) = sync_once(db, client, config).await {
            log::error!("sync pass failed: {e}");
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, ServerConfig};
    use crate::sync::testserver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    fn feed(value: Json) -> ChangeFeed {
        serde_json::from_value(value).unwrap()
    }

    fn test_config(base_url: &str, status_file: std::path::PathBuf) -> Config {
        Config {
            server: ServerConfig {
                base_url: base_url.to_string(),
                token: "token".into(),
                sync_interval_minutes: 5,
                audit_interval_seconds: 20,
                status_file,
                connectivity_url: format!("{base_url}/ping"),
                connectivity_timeout_seconds: 5,
                lead_interval_minutes: 60,
                device_id: None,
                assets_dir: None,
            },
            database: DatabaseConfig { path: None },
        }
    }

    #[tokio::test]
    async fn test_new_attendance_lands_as_one_row() {
        let db = Database::open_memory().await.unwrap();
        let feed = feed(json!({
            "attendance": {
                "created": [{
                    "id": 5,
                    "userId": 1,
                    "note": "late",
                    "present": true
                }],
                "updated": [],
                "deleted": []
            }
        }));

        let reports = apply_feed(&db, feed, None).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].entity, "attendance");
        assert_eq!(reports[0].created.success, 1);
        assert_eq!(reports[0].errors(), 0);

        let (count, note): (i64, String) = db
            .reader()
            .call(|conn| {
                let count =
                    conn.query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))?;
                let note = conn.query_row(
                    "SELECT note FROM attendance WHERE id = 5",
                    [],
                    |row| row.get(0),
                )?;
                Ok::<_, rusqlite::Error>((count, note))
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(note, "late");
    }

    #[tokio::test]
    async fn test_watermark_comes_from_time_before_the_fetch() {
        let db = Database::open_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let status_file = dir.path().join("status.json");

        let fetches = AtomicUsize::new(0);
        let server = testserver::spawn(move |path| {
            if path == "/slc/get-whats-news" {
                if fetches.fetch_add(1, Ordering::SeqCst) == 0 {
                    return r#"{"account": {"created": [{"id": 1, "name": "Alpha"}]}}"#.into();
                }
                return "{}".into();
            }
            String::new()
        })
        .await;
        let client = RemoteClient::new(&server.base_url, "token").unwrap();
        let config = test_config(&server.base_url, status_file.clone());

        let before = Local::now().naive_local();
        let report = sync_once(&db, &client, &config).await.unwrap();
        let after = Local::now().naive_local();

        assert_eq!(report.status, SyncStatus::Success);
        assert!(report.watermark_advanced);

        // The persisted watermark is the wall-clock time captured before
        // the fetch (stored at second precision).
        let wm = watermark::load_last_sync(&status_file).unwrap();
        assert!(wm >= before - chrono::Duration::seconds(1));
        assert!(wm <= after);

        // First pass sends no date filter at all.
        let first: Vec<_> = server
            .requests()
            .into_iter()
            .filter(|r| r.path == "/slc/get-whats-news")
            .collect();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].body, "");

        // Second pass asks for changes since that watermark minus the
        // lead interval, at minute precision.
        let report = sync_once(&db, &client, &config).await.unwrap();
        assert_eq!(report.status, SyncStatus::NoChanges);
        assert!(!report.watermark_advanced);

        let all: Vec<_> = server
            .requests()
            .into_iter()
            .filter(|r| r.path == "/slc/get-whats-news")
            .collect();
        assert_eq!(all.len(), 2);
        let expected = watermark::since_param(wm, config.server.lead_interval_minutes)
            .replace(' ', "+")
            .replace(':', "%3A");
        assert_eq!(all[1].body, format!("date={expected}"));

        // A no-change pass leaves the watermark untouched.
        assert_eq!(watermark::load_last_sync(&status_file), Some(wm));

        let count: i64 = db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>(conn.query_row(
                    "SELECT COUNT(*) FROM account",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_buckets_apply_in_dispatch_order() {
        let db = Database::open_memory().await.unwrap();
        let feed = feed(json!({
            "attendance": {"created": [{"id": 1, "userId": 9}]},
            "user": {"created": [{"userId": 9, "username": "amel"}]}
        }));

        let reports = apply_feed(&db, feed, None).await.unwrap();
        let order: Vec<_> = reports.iter().map(|r| r.entity).collect();
        assert_eq!(order, vec!["user", "attendance"]);
    }

    #[tokio::test]
    async fn test_local_bucket_flattens_nested_rooms() {
        let db = Database::open_memory().await.unwrap();
        let feed = feed(json!({
            "local_with_room": {
                "created": [{
                    "id": 3,
                    "name": "Main Campus",
                    "rooms": [
                        {"id": 31, "local_id": 3, "name": "Lab A"},
                        {"id": 32, "local_id": 3, "name": "Lab B"}
                    ]
                }]
            }
        }));

        let reports = apply_feed(&db, feed, None).await.unwrap();
        let order: Vec<_> = reports.iter().map(|r| r.entity).collect();
        assert_eq!(order, vec!["local", "room"]);
        assert_eq!(reports[0].created.success, 1);
        assert_eq!(reports[1].created.success, 2);

        let rooms: i64 = db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>(conn.query_row(
                    "SELECT COUNT(*) FROM room WHERE local_id = 3",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(rooms, 2);
    }

    #[tokio::test]
    async fn test_deleted_records_are_ignored_locally() {
        let db = Database::open_memory().await.unwrap();
        let seed = feed(json!({
            "account": {"created": [{"id": 1, "name": "Alpha"}]}
        }));
        apply_feed(&db, seed, None).await.unwrap();

        let deletions = feed(json!({
            "account": {"deleted": [{"id": 1}]}
        }));
        // Nothing to apply: the bucket produces no report at all.
        let reports = apply_feed(&db, deletions, None).await.unwrap();
        assert!(reports.is_empty());

        let count: i64 = db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>(conn.query_row(
                    "SELECT COUNT(*) FROM account",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_bad_record_does_not_poison_its_bucket() {
        let db = Database::open_memory().await.unwrap();
        let feed = feed(json!({
            "account": {"created": [
                {"name": "missing id"},
                {"id": 2, "name": "Beta"}
            ]}
        }));

        let reports = apply_feed(&db, feed, None).await.unwrap();
        assert_eq!(reports[0].created.errors, 1);
        assert_eq!(reports[0].created.success, 1);
    }
}
