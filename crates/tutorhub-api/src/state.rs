//! Application state shared by the CLI and the REST API.
//!
//! Holds the configured draft backend and Submission Gateway, plus the live
//! wizard sessions. Each session owns its own auto-save coordinator; the
//! backend and gateway are shared.
//!
//! Sessions leave memory when closed, after a successful submission, or when
//! idle longer than `server.session_idle_secs`. Their drafts stay in storage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use tutorhub_core::autosave::AutoSaveCoordinator;
use tutorhub_core::draft::DraftStore;
use tutorhub_core::event::SaveEventBus;
use tutorhub_core::form::{INSTITUTION_SIGNUP_FORM, institution_signup_form};
use tutorhub_core::wizard::{WizardController, WizardSettings};
use tutorhub_infra::backend::DraftBackend;
use tutorhub_infra::config::load_config;
use tutorhub_infra::filesystem::resolve_data_dir;
use tutorhub_infra::gateway::Gateway;
use tutorhub_types::config::TutorhubConfig;
use tutorhub_types::event::SaveEvent;

/// Wizard controller pinned to the infra implementations.
pub type WizardSession = WizardController<Arc<DraftBackend>, Arc<Gateway>>;

/// How often the idle-session sweeper runs.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TutorhubConfig>,
    pub data_dir: PathBuf,
    pub drafts: Arc<DraftBackend>,
    pub gateway: Arc<Gateway>,
    pub events: SaveEventBus,
    pub sessions: Arc<DashMap<Uuid, Arc<Mutex<WizardSession>>>>,
    /// Last request time per live session.
    pub last_seen: Arc<DashMap<Uuid, Instant>>,
}

impl AppState {
    /// Resolve the data directory, load config, open storage and the gateway.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config(&data_dir).await;
        Self::from_parts(config, data_dir).await
    }

    /// Build state from an already loaded config.
    pub async fn from_parts(config: TutorhubConfig, data_dir: PathBuf) -> anyhow::Result<Self> {
        let drafts = DraftBackend::open(&config.storage, &data_dir).await?;
        let gateway = Gateway::from_config(&config.gateway)?;

        tracing::info!(
            data_dir = %data_dir.display(),
            storage = ?drafts.kind(),
            gateway = gateway.name(),
            "application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            data_dir,
            drafts: Arc::new(drafts),
            gateway: Arc::new(gateway),
            events: SaveEventBus::default(),
            sessions: Arc::new(DashMap::new()),
            last_seen: Arc::new(DashMap::new()),
        })
    }

    /// Storage identity of a session's form.
    pub fn form_identity(id: &Uuid) -> String {
        format!("{INSTITUTION_SIGNUP_FORM}/{id}")
    }

    /// A fresh draft store over the shared backend.
    pub fn draft_store(&self) -> DraftStore<Arc<DraftBackend>> {
        DraftStore::new(self.drafts.clone(), self.events.clone())
    }

    /// Return the live session `id`, or create and mount it. Mounting restores
    /// any drafts stored under the session's identity.
    pub async fn open_session(&self, id: Uuid) -> Arc<Mutex<WizardSession>> {
        self.touch(id);
        if let Some(existing) = self.sessions.get(&id) {
            return existing.value().clone();
        }

        let form = institution_signup_form();
        let coordinator =
            AutoSaveCoordinator::from_config(self.draft_store(), &self.config.autosave, &form);
        let mut controller = WizardController::new(
            form,
            Self::form_identity(&id),
            coordinator,
            self.gateway.clone(),
            WizardSettings::from_config(&self.config.wizard),
        );
        controller.mount().await;

        let session = Arc::new(Mutex::new(controller));
        self.sessions
            .entry(id)
            .or_insert(session)
            .value()
            .clone()
    }

    pub fn session(&self, id: &Uuid) -> Option<Arc<Mutex<WizardSession>>> {
        let session = self.sessions.get(id).map(|s| s.value().clone())?;
        self.touch(*id);
        Some(session)
    }

    fn touch(&self, id: Uuid) {
        self.last_seen.insert(id, Instant::now());
    }

    /// Drop session `id` from memory, flushing its pending saves first.
    /// Returns the number of drafts written, or `None` if it was not live.
    pub async fn close_session(&self, id: &Uuid) -> Option<usize> {
        self.last_seen.remove(id);
        let (_, session) = self.sessions.remove(id)?;
        let flushed = session.lock().await.save_now().await;
        Some(flushed)
    }

    /// Close every session idle for at least `idle`. Returns how many closed.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let stale: Vec<Uuid> = self
            .last_seen
            .iter()
            .filter(|entry| entry.value().elapsed() >= idle)
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for id in stale {
            if self
                .last_seen
                .remove_if(&id, |_, seen| seen.elapsed() >= idle)
                .is_none()
            {
                continue;
            }
            if let Some(flushed) = self.close_session(&id).await {
                tracing::info!(%id, flushed, "idle wizard session unloaded");
                evicted += 1;
            }
        }
        evicted
    }

    /// Periodically unload sessions idle longer than the configured limit.
    pub fn spawn_session_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let state = self.clone();
        let idle = Duration::from_secs(self.config.server.session_idle_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL.min(idle).max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                state.evict_idle(idle).await;
            }
        })
    }

    /// Forward save events to the log until the bus closes.
    pub fn spawn_event_logger(&self) -> tokio::task::JoinHandle<()> {
        let mut events = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => log_save_event(&event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "save event logger lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

fn log_save_event(event: &SaveEvent) {
    match event {
        SaveEvent::StorageUnavailable { reason } => {
            tracing::warn!(%reason, "draft storage unavailable, drafts kept in memory only");
        }
        SaveEvent::SaveFailed { key, reason } => tracing::warn!(%key, %reason, "draft save failed"),
        SaveEvent::ClearFailed { key, reason } => tracing::warn!(%key, %reason, "draft clear failed"),
        SaveEvent::RestoreDiscarded { key, reason } => {
            tracing::info!(%key, %reason, "stored draft discarded");
        }
        SaveEvent::Saved { key, .. } => tracing::trace!(%key, "draft saved"),
        SaveEvent::Cleared { key } => tracing::debug!(%key, "draft cleared"),
    }
}
