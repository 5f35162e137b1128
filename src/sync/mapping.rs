use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::ToSql;
use serde_json::Value as Json;

use crate::date_util::normalize_datetime;

/// A value on its way into (or read back out of) a SQL column.
///
/// Incoming JSON and the SQLite driver produce different native types for
/// the same logical value (boolean vs 0/1, integer vs real), so every
/// comparison goes through `canonical()` rather than structural equality.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    /// Stringified form used by the row differencer. `None` is the
    /// canonical "no value" marker shared by SQL NULL and absent fields.
    pub fn canonical(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Int(i) => Some(i.to_string()),
            FieldValue::Real(r) => Some(r.to_string()),
            FieldValue::Text(s) => Some(s.clone()),
        }
    }

    pub fn from_sql_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => FieldValue::Null,
            ValueRef::Integer(i) => FieldValue::Int(i),
            ValueRef::Real(r) => FieldValue::Real(r),
            ValueRef::Text(t) => FieldValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => FieldValue::Text(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(SqlValue::Null),
            FieldValue::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            FieldValue::Real(r) => ToSqlOutput::Owned(SqlValue::Real(*r)),
            FieldValue::Text(s) => ToSqlOutput::Owned(SqlValue::Text(s.clone())),
        })
    }
}

/// How one remote field becomes one local column value.
#[derive(Debug, Clone, Copy)]
pub enum Transform {
    /// Text column; absent falls back to `default` (or NULL when `None`).
    Text { default: Option<&'static str> },
    /// 0/1 column from a JSON truthiness test; absent falls back to `default`.
    Bool { default: bool },
    /// 0/1 column that stays NULL when the field is absent or null.
    OptBool,
    /// Numeric column; absent falls back to `default` (or NULL when `None`).
    Int { default: Option<i64> },
    /// Datetime column through the normalizer; malformed becomes NULL.
    DateTime,
    /// JSON-serialized column (e.g. a roles array); absent becomes `[]`.
    JsonArray,
    /// Static default, ignoring the payload entirely.
    ConstInt(i64),
    ConstText(&'static str),
    ConstNull,
}

/// One column of an entity mapping.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    /// Remote (camelCase) field name. Unused by `Const*` transforms.
    pub remote: &'static str,
    /// Local (snake_case) column name.
    pub column: &'static str,
    pub transform: Transform,
    /// Whether the update path writes and compares this column.
    pub on_update: bool,
}

/// Declarative description of one entity type: where its bucket lives in
/// the remote payload, which table it lands in, and how each field maps.
#[derive(Debug, Clone, Copy)]
pub struct EntityMapping {
    pub entity: &'static str,
    pub payload_key: &'static str,
    pub table: &'static str,
    /// Remote field carrying the shared primary key (usually `id`).
    pub pk_remote: &'static str,
    pub columns: &'static [ColumnSpec],
    /// Honor the release-token claim on the update path.
    pub guard_release_token: bool,
}

impl EntityMapping {
    /// Extract the shared primary key. Accepts a JSON number or a numeric
    /// string; anything else means the record fails on its own.
    pub fn primary_key(&self, record: &Json) -> Option<i64> {
        match record.get(self.pk_remote) {
            Some(Json::Number(n)) => n.as_i64(),
            Some(Json::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Map a remote record to the full insert column set, applying
    /// per-column defaults and date normalization.
    pub fn map_record(&self, record: &Json) -> Vec<(&'static str, FieldValue)> {
        self.columns
            .iter()
            .map(|spec| (spec.column, apply_transform(spec, record)))
            .collect()
    }

    /// Map only the columns the update path writes, in declaration order.
    pub fn map_update_record(&self, record: &Json) -> Vec<(&'static str, FieldValue)> {
        self.columns
            .iter()
            .filter(|spec| spec.on_update)
            .map(|spec| (spec.column, apply_transform(spec, record)))
            .collect()
    }

    pub fn update_columns(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|spec| spec.on_update)
            .map(|spec| spec.column)
            .collect()
    }

    pub fn insert_columns(&self) -> Vec<&'static str> {
        self.columns.iter().map(|spec| spec.column).collect()
    }
}

fn apply_transform(spec: &ColumnSpec, record: &Json) -> FieldValue {
    let field = record.get(spec.remote);
    match spec.transform {
        Transform::Text { default } => match field {
            None => default.map_or(FieldValue::Null, |d| FieldValue::Text(d.to_string())),
            Some(Json::Null) => FieldValue::Null,
            Some(Json::String(s)) => FieldValue::Text(s.clone()),
            Some(Json::Number(n)) => FieldValue::Text(n.to_string()),
            Some(other) => FieldValue::Text(other.to_string()),
        },
        Transform::Bool { default } => {
            let truthy = field.map_or(default, json_truthy);
            FieldValue::Int(truthy as i64)
        }
        Transform::OptBool => match field {
            None | Some(Json::Null) => FieldValue::Null,
            Some(v) => FieldValue::Int(json_truthy(v) as i64),
        },
        Transform::Int { default } => match field {
            None => default.map_or(FieldValue::Null, FieldValue::Int),
            Some(Json::Null) => FieldValue::Null,
            Some(Json::Number(n)) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => n.as_f64().map_or(FieldValue::Null, FieldValue::Real),
            },
            Some(Json::String(s)) => s.trim().parse().map_or(FieldValue::Null, FieldValue::Int),
            Some(_) => FieldValue::Null,
        },
        Transform::DateTime => match field.and_then(Json::as_str) {
            Some(s) => normalize_datetime(Some(s)).map_or(FieldValue::Null, FieldValue::Text),
            None => FieldValue::Null,
        },
        Transform::JsonArray => match field {
            None | Some(Json::Null) => FieldValue::Text("[]".to_string()),
            Some(v) => FieldValue::Text(v.to_string()),
        },
        Transform::ConstInt(i) => FieldValue::Int(i),
        Transform::ConstText(s) => FieldValue::Text(s.to_string()),
        Transform::ConstNull => FieldValue::Null,
    }
}

fn json_truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Json::String(s) => !s.is_empty(),
        Json::Array(a) => !a.is_empty(),
        Json::Object(o) => !o.is_empty(),
    }
}

/// Field-by-field "identical" verdict between the persisted row and the
/// freshly mapped record, over the same column set in the same order.
/// Values are compared by canonical string; short-circuits on the first
/// mismatch. Intentionally approximate — a false "changed" verdict only
/// costs an idempotent update.
pub fn rows_identical(existing: &[FieldValue], incoming: &[FieldValue]) -> bool {
    existing.len() == incoming.len()
        && existing
            .iter()
            .zip(incoming)
            .all(|(old, new)| old.canonical() == new.canonical())
}
