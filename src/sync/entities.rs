//! Declarative field mappings for every synced entity type.
//!
//! Each table lists remote (camelCase) field → local (snake_case) column,
//! the transform applied on the way in, and whether the update path writes
//! the column. Defaults live here, named and testable, instead of being
//! scattered through per-table handlers.

use super::mapping::{ColumnSpec, EntityMapping, Transform};

macro_rules! col {
    ($remote:literal => $column:literal, $t:expr, upd) => {
        ColumnSpec {
            remote: $remote,
            column: $column,
            transform: $t,
            on_update: true,
        }
    };
    ($remote:literal => $column:literal, $t:expr) => {
        ColumnSpec {
            remote: $remote,
            column: $column,
            transform: $t,
            on_update: false,
        }
    };
}

const TEXT_EMPTY: Transform = Transform::Text { default: Some("") };
const TEXT_OPT: Transform = Transform::Text { default: None };
const INT_OPT: Transform = Transform::Int { default: None };
const BOOL_TRUE: Transform = Transform::Bool { default: true };
const BOOL_FALSE: Transform = Transform::Bool { default: false };
const DATE: Transform = Transform::DateTime;

/// Placeholder stored until the user resets their password locally.
pub const TEMP_PASSWORD: &str = "TEMP_PASSWORD_NEEDS_RESET";

pub const USER: EntityMapping = EntityMapping {
    entity: "user",
    payload_key: "user",
    table: "user",
    pk_remote: "userId",
    guard_release_token: false,
    columns: &[
        col!("" => "account_id", Transform::ConstNull),
        col!("username" => "username", TEXT_EMPTY, upd),
        col!("email" => "email", TEXT_EMPTY, upd),
        col!("fullName" => "full_name", TEXT_OPT, upd),
        col!("roles" => "roles", Transform::JsonArray, upd),
        col!("image" => "img_link", TEXT_OPT),
        col!("" => "reset_token", Transform::ConstNull),
        col!("status" => "status", BOOL_FALSE),
        col!("" => "created_by", Transform::ConstInt(0)),
        col!("" => "password", Transform::ConstText(TEMP_PASSWORD)),
        col!("" => "birth_date", Transform::ConstNull),
        col!("" => "birth_place", Transform::ConstNull),
        col!("phone" => "phone", TEXT_OPT, upd),
        col!("address" => "address", TEXT_OPT, upd),
        col!("grand" => "grand", TEXT_OPT),
        col!("" => "access_type", Transform::ConstNull),
        col!("" => "access_type_date", Transform::ConstNull),
        col!("enabled" => "enabled", BOOL_TRUE),
        col!("createdAt" => "created_at", DATE),
        col!("timestamp" => "timestamp", DATE),
        col!("updatedAt" => "updated_at", DATE),
        col!("uuid" => "uuid", TEXT_OPT, upd),
        col!("" => "facebook_id", Transform::ConstNull),
        col!("" => "google_id", Transform::ConstNull),
        col!("" => "mastodon_access_token", Transform::ConstNull),
        col!("" => "general_notification", Transform::ConstInt(1)),
        col!("" => "message_notification", Transform::ConstInt(1)),
        col!("" => "calendar_notification", Transform::ConstInt(1)),
        col!("" => "sms_notification", Transform::ConstInt(1)),
        col!("" => "login_notification", Transform::ConstInt(1)),
        col!("" => "horsline", Transform::ConstInt(0)),
        col!("" => "ref_slc", Transform::ConstNull),
        col!("" => "apple_id", Transform::ConstNull),
        col!("" => "open_source_user_name", Transform::ConstNull),
        col!("" => "rocket_chat_user_id", Transform::ConstNull),
        col!("" => "fcm_web", Transform::ConstNull),
        col!("" => "fcm_android", Transform::ConstNull),
        col!("" => "fcm_ios", Transform::ConstNull),
        col!("releaseToken" => "releaseToken", BOOL_FALSE),
        col!("useToken" => "useToken", TEXT_OPT),
    ],
};

pub const ACCOUNT: EntityMapping = EntityMapping {
    entity: "account",
    payload_key: "account",
    table: "account",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("name" => "name", TEXT_EMPTY, upd),
        col!("image" => "file_link", TEXT_EMPTY, upd),
        col!("status" => "status", BOOL_TRUE, upd),
        col!("createdAt" => "created_at", DATE, upd),
        col!("updatedAt" => "updated_at", DATE, upd),
        col!("timestamp" => "timestamp", DATE, upd),
    ],
};

pub const SUBJECT: EntityMapping = EntityMapping {
    entity: "subject",
    payload_key: "subject",
    table: "subject_config",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("name" => "name", TEXT_EMPTY, upd),
        col!("status" => "status", BOOL_TRUE, upd),
        col!("description" => "description", TEXT_EMPTY, upd),
        col!("enabled" => "enabled", BOOL_TRUE, upd),
        col!("releaseToken" => "releaseToken", BOOL_FALSE, upd),
        col!("useToken" => "useToken", TEXT_OPT, upd),
        col!("createdAt" => "created_at", DATE),
        col!("updatedAt" => "updated_at", DATE, upd),
        col!("timestamp" => "timestamp", DATE, upd),
    ],
};

pub const ACCOUNT_SUBJECT: EntityMapping = EntityMapping {
    entity: "account-subject",
    payload_key: "accountSubject",
    table: "account_subject",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("accountId" => "account_id", INT_OPT, upd),
        col!("subjectConfigId" => "subject_config_id", INT_OPT, upd),
        col!("otherSubject" => "other_subject", TEXT_OPT, upd),
        col!("status" => "status", BOOL_TRUE, upd),
        col!("description" => "description", TEXT_EMPTY, upd),
        col!("enabled" => "enabled", BOOL_TRUE, upd),
        col!("releaseToken" => "releaseToken", BOOL_FALSE, upd),
        col!("useToken" => "useToken", TEXT_OPT, upd),
        col!("createdAt" => "created_at", DATE),
        col!("updatedAt" => "updated_at", DATE, upd),
        col!("timestamp" => "timestamp", DATE, upd),
    ],
};

pub const SESSION: EntityMapping = EntityMapping {
    entity: "session",
    payload_key: "session",
    table: "session",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("uuid" => "uuid", TEXT_OPT, upd),
        col!("accountId" => "account_id", INT_OPT, upd),
        col!("formationId" => "formation_id", INT_OPT, upd),
        col!("name" => "name", TEXT_EMPTY, upd),
        col!("description" => "description", TEXT_OPT, upd),
        col!("status" => "status", BOOL_TRUE, upd),
        col!("image" => "img_link", TEXT_OPT, upd),
        col!("startDate" => "start_date", DATE, upd),
        col!("endDate" => "end_date", DATE, upd),
        col!("capacity" => "capacity", Transform::Int { default: Some(0) }, upd),
        col!("price" => "price", Transform::Int { default: Some(0) }, upd),
        col!("currency" => "currency", TEXT_OPT, upd),
        col!("typePay" => "type_pay", TEXT_OPT, upd),
        col!("requestChangeGroup" => "request_change_group", BOOL_FALSE, upd),
        col!("maxGroupChange" => "max_group_change", Transform::Int { default: Some(0) }, upd),
        col!("specialGroup" => "special_group", BOOL_FALSE, upd),
        col!("enabled" => "enabled", BOOL_TRUE, upd),
        col!("releaseToken" => "releaseToken", BOOL_FALSE, upd),
        col!("useToken" => "useToken", TEXT_OPT, upd),
        col!("createdAt" => "created_at", DATE, upd),
        col!("updatedAt" => "updated_at", DATE, upd),
        col!("timestamp" => "timestamp", DATE, upd),
    ],
};

pub const ATTENDANCE: EntityMapping = EntityMapping {
    entity: "attendance",
    payload_key: "attendance",
    table: "attendance",
    pk_remote: "id",
    // The only entity honoring the release-token claim on updates.
    guard_release_token: true,
    columns: &[
        col!("userId" => "user_id", INT_OPT, upd),
        col!("accountId" => "account_id", INT_OPT, upd),
        col!("calenderId" => "calander_id", INT_OPT),
        col!("sessionId" => "session_id", INT_OPT, upd),
        col!("groupId" => "group_session_id", INT_OPT, upd),
        col!("present" => "is_present", BOOL_FALSE, upd),
        col!("day" => "day", DATE, upd),
        col!("note" => "note", TEXT_OPT, upd),
        col!("editable" => "is_editable", BOOL_TRUE, upd),
        col!("enabled" => "enabled", BOOL_TRUE, upd),
        col!("releaseToken" => "releaseToken", BOOL_FALSE),
        col!("useToken" => "useToken", TEXT_OPT),
        col!("createdAt" => "created_at", DATE),
        col!("updatedAt" => "updated_at", DATE, upd),
        col!("timestamp" => "timestamp", DATE, upd),
        col!("" => "slc_edit", Transform::ConstInt(0)),
    ],
};

pub const CALENDAR: EntityMapping = EntityMapping {
    entity: "calendar",
    payload_key: "calendar",
    table: "relation_calander_group_session",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("sessionId" => "session_id", INT_OPT, upd),
        col!("accountId" => "account_id", INT_OPT, upd),
        col!("localId" => "local_id", INT_OPT, upd),
        col!("groupId" => "group_session_id", INT_OPT, upd),
        col!("roomId" => "room_id", INT_OPT, upd),
        col!("teacherId" => "teacher_id", INT_OPT, upd),
        col!("subjectId" => "subject_id", INT_OPT, upd),
        col!("color" => "color", TEXT_OPT, upd),
        col!("status" => "status", BOOL_TRUE, upd),
        col!("description" => "description", TEXT_OPT, upd),
        col!("start_time" => "start_time", DATE, upd),
        col!("end_time" => "end_time", DATE, upd),
        col!("ref" => "ref", TEXT_OPT, upd),
        col!("date" => "date", DATE, upd),
        col!("refresh" => "refresh", BOOL_FALSE, upd),
        col!("title" => "title", TEXT_EMPTY, upd),
        col!("enabled" => "enabled", BOOL_TRUE, upd),
        col!("type" => "type", TEXT_OPT, upd),
        col!("teacher_present" => "teacher_present", BOOL_FALSE, upd),
        col!("force_teacher_present" => "force_teacher_present", BOOL_FALSE, upd),
        col!("createdAt" => "created_at", DATE, upd),
        col!("updatedAt" => "updated_at", DATE, upd),
        col!("timestamp" => "timestamp", DATE, upd),
        col!("releaseToken" => "releaseToken", BOOL_FALSE, upd),
        col!("useToken" => "useToken", TEXT_OPT, upd),
    ],
};

pub const LOCAL: EntityMapping = EntityMapping {
    entity: "local",
    payload_key: "local_with_room",
    table: "local",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("accountId" => "account_id", INT_OPT, upd),
        col!("name" => "name", TEXT_EMPTY, upd),
        col!("address" => "address", TEXT_EMPTY, upd),
        col!("gps" => "gps", TEXT_EMPTY, upd),
        col!("status" => "status", BOOL_TRUE, upd),
        col!("enabled" => "enabled", BOOL_TRUE, upd),
        col!("default" => "default_local", BOOL_FALSE, upd),
        col!("createdAt" => "created_at", DATE),
        col!("updatedAt" => "updated_at", DATE, upd),
    ],
};

/// Rooms arrive nested inside `local_with_room` records; the dispatcher
/// flattens them into their own batch against this mapping.
pub const ROOM: EntityMapping = EntityMapping {
    entity: "room",
    payload_key: "local_with_room",
    table: "room",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("localId" => "local_id", INT_OPT, upd),
        col!("name" => "name", TEXT_EMPTY, upd),
        col!("capacity" => "capacity", TEXT_EMPTY, upd),
        col!("createdAt" => "created_at", DATE),
        col!("updatedAt" => "updated_at", DATE, upd),
    ],
};

pub const GROUP: EntityMapping = EntityMapping {
    entity: "group",
    payload_key: "group",
    table: "relation_group_local_session",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("sessionId" => "session_id", INT_OPT, upd),
        col!("localId" => "local_id", INT_OPT, upd),
        col!("accountId" => "account_id", INT_OPT, upd),
        col!("name" => "name", TEXT_EMPTY, upd),
        col!("capacity" => "capacity", INT_OPT, upd),
        col!("status" => "status", BOOL_TRUE, upd),
        col!("enabled" => "enabled", BOOL_TRUE, upd),
        col!("special_group" => "special_group", Transform::OptBool, upd),
        col!("access_type" => "access_type", Transform::OptBool, upd),
        col!("releaseToken" => "releaseToken", BOOL_FALSE, upd),
        col!("useToken" => "useToken", TEXT_OPT, upd),
        col!("createdAt" => "created_at", DATE, upd),
        col!("updatedAt" => "updated_at", DATE, upd),
        col!("timestamp" => "timestamp", DATE, upd),
    ],
};

pub const TABLET: EntityMapping = EntityMapping {
    entity: "tablet",
    payload_key: "slcTablet",
    table: "tablet",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("slcId" => "slc_id", INT_OPT, upd),
        col!("roomId" => "room_id", INT_OPT, upd),
        col!("name" => "name", TEXT_EMPTY, upd),
        col!("mac_id" => "mac_id", TEXT_EMPTY, upd),
        col!("password" => "password", TEXT_EMPTY, upd),
        col!("status" => "status", Transform::Text { default: Some("Active") }, upd),
        col!("enabled" => "enabled", BOOL_TRUE, upd),
        col!("timestamp" => "timestamp", DATE, upd),
        col!("createdAt" => "created_at", DATE),
        col!("updatedAt" => "updated_at", DATE, upd),
    ],
};

pub const CAMERA: EntityMapping = EntityMapping {
    entity: "camera",
    payload_key: "camera",
    table: "camera",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("slcId" => "slc_id", INT_OPT, upd),
        col!("roomId" => "room_id", INT_OPT, upd),
        col!("name" => "name", TEXT_EMPTY, upd),
        col!("mac_id" => "mac_id", TEXT_EMPTY, upd),
        col!("username" => "username", TEXT_EMPTY, upd),
        col!("password" => "password", TEXT_EMPTY, upd),
        col!("type" => "type", Transform::Text { default: Some("webcam") }, upd),
        col!("status" => "status", Transform::Text { default: Some("Active") }, upd),
        col!("enabled" => "enabled", BOOL_TRUE, upd),
        col!("timestamp" => "timestamp", DATE, upd),
        col!("createdAt" => "created_at", DATE, upd),
        col!("updatedAt" => "updated_at", DATE, upd),
    ],
};

pub const SLC: EntityMapping = EntityMapping {
    entity: "slc",
    payload_key: "slc",
    table: "slc",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("uuid" => "uuid", TEXT_OPT, upd),
        col!("username" => "username", TEXT_OPT, upd),
        col!("slc_username" => "slc_username", TEXT_OPT, upd),
        col!("slc_password" => "slc_password", TEXT_OPT, upd),
        col!("timestamp" => "timestamp", DATE, upd),
        col!("createdAt" => "created_at", DATE, upd),
        col!("updatedAt" => "updated_at", DATE, upd),
    ],
};

pub const SLC_LOCAL: EntityMapping = EntityMapping {
    entity: "slc-local",
    payload_key: "slcLocal",
    table: "slc_local",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("slcId" => "slc_id", INT_OPT, upd),
        col!("accountId" => "account_id", INT_OPT, upd),
        col!("localId" => "local_id", INT_OPT, upd),
        col!("enabled" => "enabled", BOOL_FALSE, upd),
        col!("timestamp" => "timestamp", DATE, upd),
        col!("createdAt" => "created_at", DATE, upd),
        col!("updatedAt" => "updated_at", DATE, upd),
    ],
};

pub const RELATION_USER_SESSION: EntityMapping = EntityMapping {
    entity: "relation-user-session",
    payload_key: "relationUserSession",
    table: "relation_user_session",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("userId" => "user_id", INT_OPT, upd),
        col!("sessionId" => "session_id", INT_OPT, upd),
        col!("relationGroup" => "relation_group_local_session_id", INT_OPT, upd),
        col!("ref" => "ref", TEXT_OPT, upd),
        col!("enabled" => "enabled", BOOL_TRUE, upd),
        col!("releaseToken" => "releaseToken", BOOL_FALSE),
        col!("useToken" => "useToken", TEXT_OPT),
        col!("createdAt" => "created_at", DATE, upd),
        col!("updatedAt" => "updated_at", DATE, upd),
        col!("timestamp" => "timestamp", DATE, upd),
    ],
};

pub const RELATION_TEACHER_SUBJECT: EntityMapping = EntityMapping {
    entity: "relation-teacher-subject",
    payload_key: "relationTeacherAndSubjectData",
    table: "relation_teacher_to_subject_group",
    pk_remote: "id",
    guard_release_token: false,
    columns: &[
        col!("groupId" => "group_id", INT_OPT, upd),
        col!("subjectId" => "subject_id", INT_OPT, upd),
        col!("teacherId" => "teacher_id", INT_OPT, upd),
        col!("enabled" => "enabled", BOOL_TRUE, upd),
        col!("releaseToken" => "releaseToken", BOOL_FALSE),
        col!("useToken" => "useToken", TEXT_OPT),
        col!("timestamp" => "timestamp", DATE, upd),
        col!("createdAt" => "created_at", DATE, upd),
        col!("updatedAt" => "updated_at", DATE, upd),
    ],
};

/// Dispatch order for one pass. Referenced entities come before their
/// dependents; `local_with_room` is flattened into `local` + `room`
/// batches by the dispatcher.
pub const DISPATCH_ORDER: &[&EntityMapping] = &[
    &USER,
    &TABLET,
    &SUBJECT,
    &SLC_LOCAL,
    &SLC,
    &SESSION,
    &LOCAL,
    &RELATION_USER_SESSION,
    &RELATION_TEACHER_SUBJECT,
    &ACCOUNT,
    &ACCOUNT_SUBJECT,
    &GROUP,
    &CALENDAR,
    &CAMERA,
    &ATTENDANCE,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::mapping::FieldValue;
    use serde_json::json;

    #[test]
    fn test_user_pk_comes_from_user_id_field() {
        assert_eq!(USER.primary_key(&json!({"userId": 3, "id": 99})), Some(3));
    }

    #[test]
    fn test_user_static_defaults() {
        let mapped = USER.map_record(&json!({"userId": 1, "username": "amel"}));
        let get = |col: &str| {
            mapped
                .iter()
                .find(|(c, _)| *c == col)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("password"), FieldValue::Text(TEMP_PASSWORD.into()));
        assert_eq!(get("created_by"), FieldValue::Int(0));
        assert_eq!(get("general_notification"), FieldValue::Int(1));
        assert_eq!(get("horsline"), FieldValue::Int(0));
        assert_eq!(get("roles"), FieldValue::Text("[]".into()));
        assert_eq!(get("account_id"), FieldValue::Null);
    }

    #[test]
    fn test_tablet_status_defaults_to_active() {
        let mapped = TABLET.map_record(&json!({"id": 1}));
        let status = mapped.iter().find(|(c, _)| *c == "status").unwrap();
        assert_eq!(status.1, FieldValue::Text("Active".into()));
    }

    #[test]
    fn test_camera_type_defaults_to_webcam() {
        let mapped = CAMERA.map_record(&json!({"id": 1}));
        let ty = mapped.iter().find(|(c, _)| *c == "type").unwrap();
        assert_eq!(ty.1, FieldValue::Text("webcam".into()));
    }

    #[test]
    fn test_attendance_is_the_only_guarded_mapping() {
        assert!(ATTENDANCE.guard_release_token);
        let guarded: Vec<_> = DISPATCH_ORDER
            .iter()
            .filter(|m| m.guard_release_token)
            .map(|m| m.entity)
            .collect();
        assert_eq!(guarded, vec!["attendance"]);
    }

    #[test]
    fn test_dispatch_order_is_fixed() {
        let head: Vec<_> = DISPATCH_ORDER.iter().take(9).map(|m| m.entity).collect();
        assert_eq!(
            head,
            vec![
                "user",
                "tablet",
                "subject",
                "slc-local",
                "slc",
                "session",
                "local",
                "relation-user-session",
                "relation-teacher-subject",
            ]
        );
    }

    #[test]
    fn test_payload_keys_are_unique_per_mapping() {
        let mut keys: Vec<_> = DISPATCH_ORDER.iter().map(|m| m.payload_key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), DISPATCH_ORDER.len());
    }

    #[test]
    fn test_group_optional_booleans_stay_null_when_absent() {
        let mapped = GROUP.map_record(&json!({"id": 1}));
        let get = |col: &str| mapped.iter().find(|(c, _)| *c == col).unwrap().1.clone();
        assert_eq!(get("special_group"), FieldValue::Null);
        assert_eq!(get("access_type"), FieldValue::Null);

        let mapped = GROUP.map_record(&json!({"id": 1, "special_group": false}));
        let sg = mapped.iter().find(|(c, _)| *c == "special_group").unwrap();
        assert_eq!(sg.1, FieldValue::Int(0));
    }
}
