use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use assetmap_core::admin::AdminConsole;
use assetmap_core::assembler::BlockValidation;
use assetmap_core::audit::AuditSink;
use assetmap_core::catalog::AssetCatalog;
use assetmap_core::finalize::SubmissionFinalizer;
use assetmap_core::schema::FieldSchemas;
use assetmap_core::storage::{IdentityStore, SubmissionStore};
use assetmap_core::upload::ImageUploader;
use assetmap_core::wizard::Wizard;

pub type WizardHandle = Arc<Mutex<Wizard>>;

struct OpenWizard {
    handle: WizardHandle,
    last_touched: Instant,
}

impl OpenWizard {
    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_touched)
    }
}

/// Everything the HTTP handlers share. Wizard sessions live only in memory and are dropped
/// once idle for `idle_timeout`.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<AssetCatalog>,
    pub schemas: Arc<FieldSchemas>,
    pub block_validation: BlockValidation,
    pub uploader: ImageUploader,
    pub finalizer: SubmissionFinalizer,
    pub admin: Arc<AdminConsole>,
    pub audit_sink: Arc<dyn AuditSink>,
    idle_timeout: Duration,
    sessions: Arc<RwLock<HashMap<Uuid, OpenWizard>>>,
}

pub struct StateParts {
    pub catalog: Arc<AssetCatalog>,
    pub schemas: Arc<FieldSchemas>,
    pub block_validation: BlockValidation,
    pub uploader: ImageUploader,
    pub submissions: Arc<dyn SubmissionStore>,
    pub identity: Arc<dyn IdentityStore>,
    pub audit_sink: Arc<dyn AuditSink>,
    pub idle_timeout: Duration,
}

impl AppState {
    pub fn new(parts: StateParts) -> Self {
        let finalizer =
            SubmissionFinalizer::new(Arc::clone(&parts.submissions), Arc::clone(&parts.catalog));
        let admin = AdminConsole::new(
            parts.submissions,
            parts.identity,
            Arc::clone(&parts.catalog),
            Arc::clone(&parts.audit_sink),
        );
        Self {
            catalog: parts.catalog,
            schemas: parts.schemas,
            block_validation: parts.block_validation,
            uploader: parts.uploader,
            finalizer,
            admin: Arc::new(admin),
            audit_sink: parts.audit_sink,
            idle_timeout: parts.idle_timeout,
            sessions: Arc::default(),
        }
    }

    pub async fn open_wizard(&self) -> (Uuid, WizardHandle) {
        let id = Uuid::new_v4();
        let wizard = Wizard::new(
            id.to_string(),
            Arc::clone(&self.catalog),
            Arc::clone(&self.schemas),
            self.block_validation,
            Arc::clone(&self.audit_sink),
        );
        let handle = Arc::new(Mutex::new(wizard));
        let entry = OpenWizard { handle: Arc::clone(&handle), last_touched: Instant::now() };
        self.sessions.write().await.insert(id, entry);
        (id, handle)
    }

    /// Looks up an open wizard and marks it as touched. A wizard idle past the timeout is
    /// dropped instead.
    pub async fn wizard(&self, id: &Uuid) -> Option<WizardHandle> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        if entry.idle_for(now) >= self.idle_timeout {
            sessions.remove(id);
            info!(event_name = "wizard.expired", wizard_id = %id, "idle wizard dropped on access");
            return None;
        }
        entry.last_touched = now;
        Some(Arc::clone(&entry.handle))
    }

    /// Drops every wizard idle past the timeout. Returns how many were dropped.
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.idle_for(now) < self.idle_timeout);
        before - sessions.len()
    }

    /// Sweeps idle wizards on a fixed period until the task is aborted.
    pub fn spawn_idle_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = state.evict_idle().await;
                if evicted > 0 {
                    info!(
                        event_name = "wizard.idle_sweep",
                        correlation_id = "sweeper",
                        evicted,
                        "idle wizards dropped"
                    );
                }
            }
        })
    }

    pub async fn close_wizard(&self, id: &Uuid) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn open_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::state::testing::app;

    #[tokio::test(start_paused = true)]
    async fn idle_wizards_expire_on_access() {
        let test = app();
        let (active, _) = test.state.open_wizard().await;
        let (abandoned, _) = test.state.open_wizard().await;

        tokio::time::advance(Duration::from_secs(3000)).await;
        assert!(test.state.wizard(&active).await.is_some());

        tokio::time::advance(Duration::from_secs(1000)).await;
        assert!(test.state.wizard(&active).await.is_some(), "access refreshes the idle clock");
        assert!(test.state.wizard(&abandoned).await.is_none());
        assert_eq!(test.state.open_sessions().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_drops_abandoned_wizards() {
        let test = app();
        let (abandoned, _) = test.state.open_wizard().await;
        let sweeper = test.state.spawn_idle_sweeper(Duration::from_secs(600));

        tokio::time::sleep(Duration::from_secs(3500)).await;
        assert_eq!(test.state.open_sessions().await, 1);

        tokio::time::sleep(Duration::from_secs(700)).await;
        assert_eq!(test.state.open_sessions().await, 0);
        assert!(test.state.wizard(&abandoned).await.is_none());
        sweeper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn evict_idle_keeps_recent_wizards() {
        let test = app();
        test.state.open_wizard().await;
        tokio::time::advance(Duration::from_secs(3600)).await;
        let (fresh, _) = test.state.open_wizard().await;

        assert_eq!(test.state.evict_idle().await, 1);
        assert!(test.state.wizard(&fresh).await.is_some());
    }
}
