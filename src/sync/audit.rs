use std::time::Duration;

use serde_json::Value as Json;

use crate::api::RemoteClient;
use crate::error::Result;
use crate::storage::repository::{self, AuditEntry};
use crate::storage::Database;
use crate::sync::AuditDrainReport;

/// What one audit row asks the remote to change. Snapshots are the local
/// attendance row as JSON, written by the tablet application.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditChange {
    Note(Option<String>),
    Presence(bool),
    /// Neither note nor presence differs; the row is marked synced so it
    /// never clogs the queue.
    NoRelevantChange,
}

/// Diff the before/after snapshots of one audit row. When both the note
/// and the presence flag changed, the note wins and the presence edit
/// rides along in the next full sync.
pub fn detect_change(old: &Json, new: &Json) -> AuditChange {
    let old_note = old.get("note").and_then(Json::as_str);
    let new_note = new.get("note").and_then(Json::as_str);
    if old_note != new_note {
        return AuditChange::Note(new_note.map(str::to_string));
    }

    let old_present = presence_flag(old);
    let new_present = presence_flag(new);
    if old_present != new_present {
        return AuditChange::Presence(new_present.unwrap_or(false));
    }

    AuditChange::NoRelevantChange
}

// Tablets have written both boolean and 0/1 forms over time.
fn presence_flag(snapshot: &Json) -> Option<bool> {
    match snapshot.get("is_present") {
        Some(Json::Bool(b)) => Some(*b),
        Some(Json::Number(n)) => n.as_i64().map(|i| i != 0),
        _ => None,
    }
}

/// Drain the outbound audit queue once. Each row is handled on its own:
/// a row is marked synced only after the remote confirms with HTTP 200,
/// so failures stay queued and retry on the next poll, indefinitely.
pub async fn drain_queue(db: &Database, client: &RemoteClient) -> Result<AuditDrainReport> {
    let entries = db
        .reader()
        .call(|conn| repository::unsynced_audit_entries(conn))
        .await?;

    let mut report = AuditDrainReport::default();
    if entries.is_empty() {
        return Ok(report);
    }
    log::info!("draining {} pending audit entr(ies)", entries.len());

    for entry in entries {
        match replay_entry(db, client, &entry).await {
            Ok(ReplayOutcome::Sent) => report.sent += 1,
            Ok(ReplayOutcome::Skipped) => report.skipped += 1,
            Ok(ReplayOutcome::Rejected) => {
                log::warn!(
                    "remote rejected audit entry {} (attendance {}), will retry",
                    entry.audit_id,
                    entry.attendance_id
                );
                report.failed += 1;
            }
            Err(e) => {
                log::warn!(
                    "audit entry {} (attendance {}) failed: {e}, will retry",
                    entry.audit_id,
                    entry.attendance_id
                );
                report.failed += 1;
            }
        }
    }

    log::info!(
        "audit drain: sent {}, skipped {}, failed {}",
        report.sent,
        report.skipped,
        report.failed
    );
    Ok(report)
}

enum ReplayOutcome {
    Sent,
    Skipped,
    Rejected,
}

async fn replay_entry(
    db: &Database,
    client: &RemoteClient,
    entry: &AuditEntry,
) -> Result<ReplayOutcome> {
    if entry.action_type.as_deref() == Some("delete") {
        let accepted = client.delete_attendance(entry.attendance_id).await?;
        if accepted {
            mark_synced(db, entry.audit_id).await?;
            return Ok(ReplayOutcome::Sent);
        }
        return Ok(ReplayOutcome::Rejected);
    }

    let old = parse_snapshot(entry.old_data.as_deref())?;
    let new = parse_snapshot(entry.new_data.as_deref())?;

    let accepted = match detect_change(&old, &new) {
        AuditChange::Note(note) => {
            client
                .update_attendance_note(entry.attendance_id, note.as_deref().unwrap_or(""))
                .await?
        }
        AuditChange::Presence(present) => {
            client
                .update_attendance_status(entry.attendance_id, present)
                .await?
        }
        AuditChange::NoRelevantChange => {
            log::debug!(
                "audit entry {}: no note/presence change, marking synced",
                entry.audit_id
            );
            mark_synced(db, entry.audit_id).await?;
            return Ok(ReplayOutcome::Skipped);
        }
    };

    if accepted {
        mark_synced(db, entry.audit_id).await?;
        Ok(ReplayOutcome::Sent)
    } else {
        Ok(ReplayOutcome::Rejected)
    }
}

fn parse_snapshot(raw: Option<&str>) -> Result<Json> {
    match raw {
        None => Ok(Json::Object(Default::default())),
        Some(raw) => Ok(serde_json::from_str(raw)?),
    }
}

async fn mark_synced(db: &Database, audit_id: i64) -> Result<()> {
    db.writer()
        .call(move |conn| repository::mark_audit_synced(conn, audit_id))
        .await?;
    Ok(())
}

/// Poll the audit queue forever at a fixed interval. A failed drain is
/// logged and retried next tick.
pub async fn run_audit_loop(db: &Database, client: &RemoteClient, interval: Duration) {
    loop {
        if let Err(e) = drain_queue(db, client).await {
            log::error!("audit drain failed: {e}");
        }
        tokio::time::sleep(interval).await;
    }
}
