//! Sync coordinator
//!
//! Every mutating operation is queued on one mailbox and executed by a
//! single worker task, so at most one request talks to the remote at a
//! time and requests run in the order they were made.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::config::ProviderConfig;
use super::connectivity::ConnectivityChecker;
use super::provider::SyncProvider;
use super::result::{SyncError, SyncOutcome};
use super::SyncPrefs;
use crate::db::IdMappingRepository;
use crate::models::{BackgroundSync, CloudService, Note};
use crate::preferences::PreferenceRepository;

#[derive(Debug)]
enum Command {
    Sync,
    Create(Note),
    Update(Note),
    UpdateOrCreate(Note),
    Delete(Note),
    MoveToBin(Note),
    Restore(Note),
    Authenticate,
    IsServerCompatible,
}

struct Message {
    command: Command,
    provider: CloudService,
    config: ProviderConfig,
    reply: oneshot::Sender<SyncOutcome>,
}

/// Entry point for all sync operations
#[derive(Clone)]
pub struct SyncManager {
    preferences: PreferenceRepository,
    connectivity: Arc<dyn ConnectivityChecker>,
    prefs: watch::Receiver<SyncPrefs>,
    config: watch::Receiver<Option<ProviderConfig>>,
    mailbox: mpsc::UnboundedSender<Message>,
}

impl SyncManager {
    /// Start the preference watcher and the sync worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<P, M>(
        preferences: PreferenceRepository,
        mappings: M,
        connectivity: Arc<dyn ConnectivityChecker>,
        providers: HashMap<CloudService, P>,
    ) -> Self
    where
        P: SyncProvider,
        M: IdMappingRepository + 'static,
    {
        let mut snapshots = preferences.subscribe();
        let initial = SyncPrefs::from_snapshot(&snapshots.borrow_and_update());
        let (config_tx, config) = watch::channel(initial.config.clone());
        let (prefs_tx, prefs) = watch::channel(initial);

        tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let derived = SyncPrefs::from_snapshot(&snapshots.borrow_and_update());
                tracing::debug!(
                    "Sync preferences changed: enabled={}, provider={:?}",
                    derived.enabled,
                    derived.provider
                );

                config_tx.send_if_modified(|current| {
                    if *current == derived.config {
                        false
                    } else {
                        current.clone_from(&derived.config);
                        true
                    }
                });
                if prefs_tx.send(derived).is_err() {
                    break;
                }
            }
        });

        let (mailbox, inbox) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(inbox, providers, mappings));

        Self {
            preferences,
            connectivity,
            prefs,
            config,
            mailbox,
        }
    }

    /// Active provider config, `None` while sync is disabled or incomplete
    #[must_use]
    pub fn config(&self) -> watch::Receiver<Option<ProviderConfig>> {
        self.config.clone()
    }

    #[must_use]
    pub fn prefs(&self) -> watch::Receiver<SyncPrefs> {
        self.prefs.clone()
    }

    pub async fn sync(&self) -> SyncOutcome {
        self.submit(Command::Sync).await
    }

    pub async fn create_note(&self, note: Note) -> SyncOutcome {
        self.submit(Command::Create(note)).await
    }

    pub async fn update_note(&self, note: Note) -> SyncOutcome {
        self.submit(Command::Update(note)).await
    }

    /// Update the remote copy if the note is mapped, otherwise create it
    pub async fn update_or_create(&self, note: Note) -> SyncOutcome {
        self.submit(Command::UpdateOrCreate(note)).await
    }

    pub async fn delete_note(&self, note: Note) -> SyncOutcome {
        self.submit(Command::Delete(note)).await
    }

    pub async fn move_note_to_bin(&self, note: Note) -> SyncOutcome {
        self.submit(Command::MoveToBin(note)).await
    }

    pub async fn restore_note(&self, note: Note) -> SyncOutcome {
        self.submit(Command::Restore(note)).await
    }

    /// Check credentials of the configured account, or of `custom` instead
    pub async fn authenticate(&self, custom: Option<ProviderConfig>) -> SyncOutcome {
        self.submit_with(Command::Authenticate, custom).await
    }

    pub async fn is_server_compatible(&self, custom: Option<ProviderConfig>) -> SyncOutcome {
        self.submit_with(Command::IsServerCompatible, custom).await
    }

    /// Run `sync` every `period` while background sync is enabled
    pub fn spawn_background_sync(&self, period: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if manager.preferences.get_app_preferences().background_sync
                    == BackgroundSync::Disabled
                {
                    continue;
                }

                match manager.sync().await {
                    SyncOutcome::Success => tracing::debug!("Background sync finished"),
                    outcome @ (SyncOutcome::SyncingNotEnabled
                    | SyncOutcome::InvalidConfig
                    | SyncOutcome::NoConnectivity) => {
                        tracing::debug!("Background sync skipped: {outcome}");
                    }
                    outcome => tracing::warn!("Background sync failed: {outcome}"),
                }
            }
        })
    }

    async fn submit(&self, command: Command) -> SyncOutcome {
        self.submit_with(command, None).await
    }

    async fn submit_with(&self, command: Command, custom: Option<ProviderConfig>) -> SyncOutcome {
        let (provider, config) = match self.gate(custom) {
            Ok(target) => target,
            Err(outcome) => return outcome,
        };

        let (reply, response) = oneshot::channel();
        let message = Message {
            command,
            provider,
            config,
            reply,
        };
        if self.mailbox.send(message).is_err() {
            return SyncError::WorkerStopped.into();
        }

        response
            .await
            .unwrap_or_else(|_| SyncError::WorkerStopped.into())
    }

    /// Decide whether a request may be queued, and against which account.
    ///
    /// `custom` replaces the stored account but not the enabled check.
    fn gate(
        &self,
        custom: Option<ProviderConfig>,
    ) -> Result<(CloudService, ProviderConfig), SyncOutcome> {
        let prefs = self.prefs.borrow().clone();
        if !prefs.enabled {
            return Err(SyncOutcome::SyncingNotEnabled);
        }

        let target = match (custom, prefs.provider, prefs.config) {
            (Some(config), _, _) => (config.provider(), config),
            (None, Some(provider), Some(config)) => (provider, config),
            _ => return Err(SyncOutcome::InvalidConfig),
        };

        if !self.connectivity.is_connection_available(prefs.mode) {
            return Err(SyncOutcome::NoConnectivity);
        }
        Ok(target)
    }
}

async fn run_worker<P, M>(
    mut inbox: mpsc::UnboundedReceiver<Message>,
    providers: HashMap<CloudService, P>,
    mappings: M,
) where
    P: SyncProvider,
    M: IdMappingRepository,
{
    while let Some(message) = inbox.recv().await {
        let outcome = match providers.get(&message.provider) {
            Some(provider) => {
                execute(provider, &mappings, message.command, message.provider, &message.config)
                    .await
            }
            None => SyncOutcome::InvalidConfig,
        };

        // The caller may have stopped waiting
        let _ = message.reply.send(outcome);
    }
    tracing::debug!("Sync worker stopped");
}

async fn execute<P, M>(
    provider: &P,
    mappings: &M,
    command: Command,
    service: CloudService,
    config: &ProviderConfig,
) -> SyncOutcome
where
    P: SyncProvider,
    M: IdMappingRepository,
{
    match command {
        Command::Sync => provider.sync(config).await,
        Command::Create(note) => provider.create_note(&note, config).await,
        Command::Update(note) => provider.update_note(&note, config).await,
        Command::UpdateOrCreate(note) => {
            match mappings.get_by_local_id_and_provider(note.id, service).await {
                Ok(Some(mapping)) if mapping.remote_note_id.is_some() => {
                    provider.update_note(&note, config).await
                }
                Ok(_) => provider.create_note(&note, config).await,
                Err(error) => SyncError::from(error).into(),
            }
        }
        Command::Delete(note) => provider.delete_note(&note, config).await,
        Command::MoveToBin(note) => provider.move_note_to_bin(&note, config).await,
        Command::Restore(note) => provider.restore_note(&note, config).await,
        Command::Authenticate => provider.authenticate(config).await,
        Command::IsServerCompatible => provider.is_server_compatible(config).await,
    }
}
