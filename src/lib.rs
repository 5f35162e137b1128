pub mod api;
pub mod config;
pub mod date_util;
pub mod error;
pub mod storage;
pub mod sync;

pub use api::RemoteClient;
pub use config::Config;
pub use error::{Error, Result};
pub use storage::Database;
pub use sync::{AuditDrainReport, BatchSummary, EntityReport, SyncReport, SyncStatus};

use sync::{audit, syncer};

/// Main entry point: the local database, the remote client, and the
/// configuration, bundled for the CLI and for embedding.
pub struct AttSync {
    db: Database,
    client: RemoteClient,
    config: Config,
}

impl AttSync {
    /// Open the configured database and build the remote client.
    pub async fn connect(config: Config) -> Result<Self> {
        let db = match &config.database.path {
            Some(path) => Database::open_at(path).await?,
            None => Database::open().await?,
        };
        let client = RemoteClient::new(&config.server.base_url, &config.server.token)?;
        Ok(Self { db, client, config })
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one inbound sync pass.
    pub async fn sync_once(&self) -> Result<SyncReport> {
        syncer::sync_once(&self.db, &self.client, &self.config).await
    }

    /// Drain the outbound attendance audit queue once.
    pub async fn drain_audit(&self) -> Result<AuditDrainReport> {
        audit::drain_queue(&self.db, &self.client).await
    }

    /// Poll the audit queue forever at the configured interval.
    pub async fn run_audit_loop(&self) {
        audit::run_audit_loop(&self.db, &self.client, self.config.audit_interval()).await
    }

    /// Run both directions forever: periodic inbound sync passes and the
    /// outbound audit poll, concurrently on the same database.
    pub async fn run(&self) {
        tokio::join!(
            syncer::run_continuous(&self.db, &self.client, &self.config),
            self.run_audit_loop(),
        );
    }
}
