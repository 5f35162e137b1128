use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as Json;

use crate::sync::mapping::{rows_identical, EntityMapping, FieldValue};
use crate::sync::BatchSummary;

// ── Generic entity upsert engine ───────────────────────────────────
//
// One insert routine and one update routine, driven by the declarative
// per-entity mappings in `sync::entities`. A record's failure never
// aborts its batch: each record is its own atomic unit.

pub fn record_exists(
    conn: &Connection,
    mapping: &EntityMapping,
    id: i64,
) -> Result<bool, rusqlite::Error> {
    let sql = format!("SELECT id FROM {} WHERE id = ?1", mapping.table);
    let found: Option<i64> = conn.query_row(&sql, params![id], |row| row.get(0)).optional()?;
    Ok(found.is_some())
}

/// Insert path: skip records whose primary key already exists locally,
/// insert the rest with mapped + normalized fields.
pub fn insert_records(
    conn: &Connection,
    mapping: &EntityMapping,
    records: &[Json],
) -> BatchSummary {
    let mut summary = BatchSummary {
        total: records.len() as u32,
        ..Default::default()
    };
    if records.is_empty() {
        return summary;
    }
    log::info!(
        "processing {} new {} record(s)",
        records.len(),
        mapping.entity
    );

    let columns = mapping.insert_columns();
    let placeholders: Vec<String> = (2..=columns.len() + 1).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} (id, {}) VALUES (?1, {})",
        mapping.table,
        columns.join(", "),
        placeholders.join(", ")
    );

    for record in records {
        let id = match mapping.primary_key(record) {
            Some(id) => id,
            None => {
                summary.record_failure(
                    None,
                    format!("missing required field: {}", mapping.pk_remote),
                );
                continue;
            }
        };

        let result = (|| -> Result<bool, rusqlite::Error> {
            if record_exists(conn, mapping, id)? {
                return Ok(false);
            }
            let mut values = vec![FieldValue::Int(id)];
            values.extend(mapping.map_record(record).into_iter().map(|(_, v)| v));
            conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
            Ok(true)
        })();

        match result {
            Ok(true) => {
                summary.record_success();
                log::debug!("{} id {id} inserted", mapping.entity);
            }
            Ok(false) => {
                summary.record_skip();
                log::debug!("{} id {id} already exists, skipping insert", mapping.entity);
            }
            Err(e) => {
                log::warn!("error inserting {} id {id}: {e}", mapping.entity);
                summary.record_failure(Some(id), e.to_string());
            }
        }
    }

    log::info!(
        "{}: inserted {}, skipped {}, errors {}",
        mapping.entity,
        summary.success,
        summary.skipped,
        summary.errors
    );
    summary
}

/// Update path: fetch the existing row, compare field-by-field, and write
/// only when something actually changed. A remote "updated" record the
/// local store has never seen is skipped with a warning, not an error.
pub fn update_records(
    conn: &Connection,
    mapping: &EntityMapping,
    records: &[Json],
    device_id: Option<&str>,
) -> BatchSummary {
    let mut summary = BatchSummary {
        total: records.len() as u32,
        ..Default::default()
    };
    if records.is_empty() {
        return summary;
    }
    log::info!(
        "updating {} {} record(s)",
        records.len(),
        mapping.entity
    );

    let columns = mapping.update_columns();
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{c} = ?{}", i + 1))
        .collect();
    let update_sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        mapping.table,
        assignments.join(", "),
        columns.len() + 1
    );
    let select_sql = format!(
        "SELECT {} FROM {} WHERE id = ?1",
        columns.join(", "),
        mapping.table
    );

    for record in records {
        let id = match mapping.primary_key(record) {
            Some(id) => id,
            None => {
                summary.record_failure(
                    None,
                    format!("missing required field: {}", mapping.pk_remote),
                );
                continue;
            }
        };

        // Release-token guard: a row claimed for editing by this very
        // device must not be overwritten by the incoming copy.
        if mapping.guard_release_token && is_claimed_by(record, device_id) {
            log::warn!(
                "{} id {id} is claimed by this device, skipping remote update",
                mapping.entity
            );
            summary.record_skip();
            continue;
        }

        let result = (|| -> Result<UpdateOutcome, rusqlite::Error> {
            let existing: Option<Vec<FieldValue>> = conn
                .query_row(&select_sql, params![id], |row| {
                    (0..columns.len())
                        .map(|i| row.get_ref(i).map(FieldValue::from_sql_ref))
                        .collect()
                })
                .optional()?;

            let existing = match existing {
                Some(row) => row,
                None => return Ok(UpdateOutcome::NotFound),
            };

            let incoming: Vec<FieldValue> = mapping
                .map_update_record(record)
                .into_iter()
                .map(|(_, v)| v)
                .collect();

            if rows_identical(&existing, &incoming) {
                return Ok(UpdateOutcome::Unchanged);
            }

            let mut values = incoming;
            values.push(FieldValue::Int(id));
            let affected = conn.execute(&update_sql, rusqlite::params_from_iter(values.iter()))?;
            Ok(UpdateOutcome::Written(affected))
        })();

        match result {
            Ok(UpdateOutcome::NotFound) => {
                log::warn!(
                    "{} id {id} not found locally, skipping update",
                    mapping.entity
                );
                summary.record_skip();
            }
            Ok(UpdateOutcome::Unchanged) => {
                log::debug!("{} id {id}: no changes detected, skipped", mapping.entity);
                summary.record_skip();
            }
            Ok(UpdateOutcome::Written(affected)) if affected > 0 => {
                summary.record_success();
                log::debug!("{} id {id} updated", mapping.entity);
            }
            Ok(UpdateOutcome::Written(_)) => {
                log::warn!(
                    "{} id {id}: update executed but no row was written",
                    mapping.entity
                );
                summary.record_skip();
            }
            Err(e) => {
                log::warn!("error updating {} id {id}: {e}", mapping.entity);
                summary.record_failure(Some(id), e.to_string());
            }
        }
    }

    log::info!(
        "{}: updated {}, skipped {}, errors {}",
        mapping.entity,
        summary.success,
        summary.skipped,
        summary.errors
    );
    summary
}

enum UpdateOutcome {
    NotFound,
    Unchanged,
    Written(usize),
}

fn is_claimed_by(record: &Json, device_id: Option<&str>) -> bool {
    let Some(device_id) = device_id else {
        return false;
    };
    let claimed = match record.get("releaseToken") {
        Some(Json::Bool(b)) => *b,
        Some(Json::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Json::String(s)) => !s.is_empty(),
        _ => false,
    };
    claimed && record.get("useToken").and_then(Json::as_str) == Some(device_id)
}

// ── Audit queue ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub audit_id: i64,
    pub attendance_id: i64,
    pub action_type: Option<String>,
    pub old_data: Option<String>,
    pub new_data: Option<String>,
}

pub fn unsynced_audit_entries(conn: &Connection) -> Result<Vec<AuditEntry>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT audit_id, id_attendance, action_type, old_data, new_data
         FROM attendance_audit
         WHERE is_synced = 0
         ORDER BY audit_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(AuditEntry {
            audit_id: row.get(0)?,
            attendance_id: row.get(1)?,
            action_type: row.get(2)?,
            old_data: row.get(3)?,
            new_data: row.get(4)?,
        })
    })?;
    rows.collect()
}

pub fn mark_audit_synced(conn: &Connection, audit_id: i64) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "UPDATE attendance_audit SET is_synced = 1 WHERE audit_id = ?1",
        params![audit_id],
    )
}

// ── Status ─────────────────────────────────────────────────────────

pub fn table_count(conn: &Connection, table: &str) -> Result<i64, rusqlite::Error> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
}

pub fn unsynced_audit_count(conn: &Connection) -> Result<i64, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) FROM attendance_audit WHERE is_synced = 0",
        [],
        |row| row.get(0),
    )
}
