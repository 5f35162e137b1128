use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value as Json;

use crate::error::{Error, Result};

/// Thin client over the remote attendance API. All endpoints live under
/// the `/slc/` prefix and authenticate with a bearer token.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        let base_url = base_url.into();
        Ok(RemoteClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Quick reachability probe. Anything other than a timely HTTP 200
    /// counts as offline; this never errors.
    pub async fn check_connectivity(&self, url: &str, timeout: Duration) -> bool {
        match self.http.get(url).timeout(timeout).send().await {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                log::debug!("connectivity probe failed: {e}");
                false
            }
        }
    }

    /// Fetch the change feed. `since` is the lead-adjusted watermark in
    /// `YYYY-MM-DD HH:MM` form; omitting it asks for everything.
    pub async fn fetch_changes(&self, since: Option<&str>) -> Result<ChangeFeed> {
        let url = format!("{}/slc/get-whats-news", self.base_url);
        let mut form: HashMap<&str, &str> = HashMap::new();
        if let Some(since) = since {
            form.insert("date", since);
        }
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .form(&form)
            .send()
            .await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(Error::Api {
                endpoint: "get-whats-news".into(),
                status: resp.status().as_u16(),
            });
        }
        Ok(resp.json().await?)
    }

    /// Push a locally edited note. Returns whether the remote accepted it;
    /// transport failures bubble up as errors.
    pub async fn update_attendance_note(&self, attendance_id: i64, note: &str) -> Result<bool> {
        let url = format!(
            "{}/slc/update-attendance-note/{attendance_id}",
            self.base_url
        );
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .form(&[("note", note)])
            .send()
            .await?;
        Ok(resp.status() == reqwest::StatusCode::OK)
    }

    /// Push a locally edited presence flag (1 = present, 0 = absent).
    pub async fn update_attendance_status(
        &self,
        attendance_id: i64,
        present: bool,
    ) -> Result<bool> {
        let url = format!(
            "{}/slc/update-attendance-status/{attendance_id}",
            self.base_url
        );
        let status = if present { "true" } else { "false" };
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .form(&[("status", status)])
            .send()
            .await?;
        Ok(resp.status() == reqwest::StatusCode::OK)
    }

    pub async fn delete_attendance(&self, attendance_id: i64) -> Result<bool> {
        let url = format!("{}/slc/delete-attendance/{attendance_id}", self.base_url);
        let resp = self
            .http
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(resp.status() == reqwest::StatusCode::OK)
    }

    /// Download one account image into `dest_dir`, keyed by its remote
    /// file name. Already-present files are left alone.
    pub async fn download_image(&self, name: &str, dest_dir: &Path) -> Result<PathBuf> {
        let dest = dest_dir.join(name);
        if dest.exists() {
            log::debug!("image {name} already present, skipping download");
            return Ok(dest);
        }
        let url = format!("{}/slc/public-image-server/{name}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(Error::Api {
                endpoint: "public-image-server".into(),
                status: resp.status().as_u16(),
            });
        }
        let bytes = resp.bytes().await?;
        std::fs::create_dir_all(dest_dir)?;
        std::fs::write(&dest, &bytes)?;
        log::info!("downloaded image {name} ({} bytes)", bytes.len());
        Ok(dest)
    }
}

/// One entity's slice of the change feed. The remote usually sends the
/// three-way object, but some deployments return a bare list of records,
/// which is treated as created-only.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EntityBucket {
    Split {
        #[serde(default)]
        created: Vec<Json>,
        #[serde(default)]
        updated: Vec<Json>,
        #[serde(default)]
        deleted: Vec<Json>,
    },
    Bare(Vec<Json>),
}

impl EntityBucket {
    pub fn created(&self) -> &[Json] {
        match self {
            EntityBucket::Split { created, .. } => created,
            EntityBucket::Bare(records) => records,
        }
    }

    pub fn updated(&self) -> &[Json] {
        match self {
            EntityBucket::Split { updated, .. } => updated,
            EntityBucket::Bare(_) => &[],
        }
    }

    pub fn deleted(&self) -> &[Json] {
        match self {
            EntityBucket::Split { deleted, .. } => deleted,
            EntityBucket::Bare(_) => &[],
        }
    }

    /// A bucket counts as empty when it carries nothing to apply. Deleted
    /// items are reported but never applied, so they do not make a bucket
    /// non-empty and never advance the watermark on their own.
    pub fn is_empty(&self) -> bool {
        self.created().is_empty() && self.updated().is_empty()
    }
}

/// Full change-feed payload, one optional bucket per entity type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeFeed {
    pub user: Option<EntityBucket>,
    pub account: Option<EntityBucket>,
    pub subject: Option<EntityBucket>,
    #[serde(rename = "accountSubject")]
    pub account_subject: Option<EntityBucket>,
    pub session: Option<EntityBucket>,
    pub attendance: Option<EntityBucket>,
    pub calendar: Option<EntityBucket>,
    pub local_with_room: Option<EntityBucket>,
    pub group: Option<EntityBucket>,
    #[serde(rename = "slcTablet")]
    pub slc_tablet: Option<EntityBucket>,
    pub camera: Option<EntityBucket>,
    pub slc: Option<EntityBucket>,
    #[serde(rename = "slcLocal")]
    pub slc_local: Option<EntityBucket>,
    #[serde(rename = "relationUserSession")]
    pub relation_user_session: Option<EntityBucket>,
    #[serde(rename = "relationTeacherAndSubjectData")]
    pub relation_teacher_subject: Option<EntityBucket>,
}

impl ChangeFeed {
    pub fn bucket(&self, payload_key: &str) -> Option<&EntityBucket> {
        match payload_key {
            "user" => self.user.as_ref(),
            "account" => self.account.as_ref(),
            "subject" => self.subject.as_ref(),
            "accountSubject" => self.account_subject.as_ref(),
            "session" => self.session.as_ref(),
            "attendance" => self.attendance.as_ref(),
            "calendar" => self.calendar.as_ref(),
            "local_with_room" => self.local_with_room.as_ref(),
            "group" => self.group.as_ref(),
            "slcTablet" => self.slc_tablet.as_ref(),
            "camera" => self.camera.as_ref(),
            "slc" => self.slc.as_ref(),
            "slcLocal" => self.slc_local.as_ref(),
            "relationUserSession" => self.relation_user_session.as_ref(),
            "relationTeacherAndSubjectData" => self.relation_teacher_subject.as_ref(),
            _ => None,
        }
    }

    pub fn has_changes(&self) -> bool {
        const KEYS: &[&str] = &[
            "user",
            "account",
            "subject",
            "accountSubject",
            "session",
            "attendance",
            "calendar",
            "local_with_room",
            "group",
            "slcTablet",
            "camera",
            "slc",
            "slcLocal",
            "relationUserSession",
            "relationTeacherAndSubjectData",
        ];
        KEYS.iter()
            .filter_map(|k| self.bucket(k))
            .any(|b| !b.is_empty())
    }
}
