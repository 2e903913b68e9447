//! Saving the in-progress report so it survives a restart
//!
//! [DraftSaver] owns a background task that waits for a quiet period after
//! the last change before writing, so a burst of edits is a single write of
//! the newest state.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hazard_report_shared::validation::Step;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, warn};

use crate::error::ClientError;
use crate::wizard::ReportDraft;

/// Fixed name the draft is saved under.
pub const DRAFT_KEY: &str = "hazard-report-draft";

/// Quiet period after the last change before the draft is written.
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSnapshot {
    pub report_data: ReportDraft,
    pub step: Step,
}

#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn load(&self) -> Result<Option<DraftSnapshot>, ClientError>;

    async fn save(&self, snapshot: &DraftSnapshot) -> Result<(), ClientError>;

    /// Removing a draft that isn't there is fine.
    async fn clear(&self) -> Result<(), ClientError>;
}

/// Keeps the draft as `<dir>/hazard-report-draft.json`.
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    path: PathBuf,
}

impl FileDraftStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", DRAFT_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DraftStore for FileDraftStore {
    async fn load(&self) -> Result<Option<DraftSnapshot>, ClientError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice(&contents) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                // an unreadable draft shouldn't stop a new one being started
                warn!("Ignoring unreadable draft {}: {}", self.path.display(), err);
                Ok(None)
            }
        }
    }

    async fn save(&self, snapshot: &DraftSnapshot) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_vec(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Holds the draft in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    draft: Mutex<Option<DraftSnapshot>>,
    saves: Mutex<usize>,
}

impl MemoryDraftStore {
    /// How many writes have happened.
    pub fn saves(&self) -> usize {
        self.saves.lock().map(|saves| *saves).unwrap_or_default()
    }

    pub fn current(&self) -> Option<DraftSnapshot> {
        self.draft.lock().ok().and_then(|draft| draft.clone())
    }
}

#[async_trait]
impl DraftStore for MemoryDraftStore {
    async fn load(&self) -> Result<Option<DraftSnapshot>, ClientError> {
        Ok(self.current())
    }

    async fn save(&self, snapshot: &DraftSnapshot) -> Result<(), ClientError> {
        let mut draft = self
            .draft
            .lock()
            .map_err(|err| ClientError::Io(err.to_string()))?;
        *draft = Some(snapshot.clone());
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        let mut draft = self
            .draft
            .lock()
            .map_err(|err| ClientError::Io(err.to_string()))?;
        *draft = None;
        Ok(())
    }
}

enum SaverCommand {
    Save(Box<DraftSnapshot>),
    /// `None` when nobody waits for the result
    Clear(Option<oneshot::Sender<Result<(), ClientError>>>),
}

/// Handle to the debounced save task.
///
/// The task stops once every handle is dropped, writing any pending draft first.
#[derive(Clone)]
pub struct DraftSaver {
    tx: mpsc::UnboundedSender<SaverCommand>,
    store: Arc<dyn DraftStore>,
}

impl DraftSaver {
    pub fn spawn(store: Arc<dyn DraftStore>) -> (Self, JoinHandle<()>) {
        Self::spawn_with_delay(store, SAVE_DEBOUNCE)
    }

    pub fn spawn_with_delay(store: Arc<dyn DraftStore>, delay: Duration) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_saver(store.clone(), delay, rx));
        (Self { tx, store }, handle)
    }

    /// Replaces whatever is pending and restarts the quiet timer.
    pub fn schedule(&self, snapshot: DraftSnapshot) {
        if self.tx.send(SaverCommand::Save(Box::new(snapshot))).is_err() {
            warn!("Draft saver has stopped, change not saved");
        }
    }

    /// Drops any pending save and removes the stored draft.
    pub async fn clear(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(SaverCommand::Clear(Some(reply))).is_err() {
            return self.store.clear().await;
        }
        rx.await
            .map_err(|_| ClientError::Io("Draft saver stopped before clearing".to_string()))?
    }

    /// Like [DraftSaver::clear] without waiting for the store.
    pub fn discard(&self) {
        if self.tx.send(SaverCommand::Clear(None)).is_err() {
            warn!("Draft saver has stopped, saved draft not removed");
        }
    }

    /// Whatever was last written, pending changes excluded.
    pub async fn saved_draft(&self) -> Result<Option<DraftSnapshot>, ClientError> {
        self.store.load().await
    }

    pub async fn has_saved_draft(&self) -> bool {
        match self.saved_draft().await {
            Ok(draft) => draft.is_some(),
            Err(err) => {
                warn!("Failed to check for a saved draft: {}", err);
                false
            }
        }
    }
}

async fn write_draft(store: &dyn DraftStore, snapshot: &DraftSnapshot) {
    match store.save(snapshot).await {
        Ok(()) => debug!("Saved draft at step {}", snapshot.step.number()),
        Err(err) => error!("Failed to save draft: {}", err),
    }
}

async fn run_saver(
    store: Arc<dyn DraftStore>,
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<SaverCommand>,
) {
    let mut pending: Option<Box<DraftSnapshot>> = None;
    let mut deadline = Instant::now();
    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(SaverCommand::Save(snapshot)) => {
                    pending = Some(snapshot);
                    deadline = Instant::now() + delay;
                }
                Some(SaverCommand::Clear(reply)) => {
                    pending = None;
                    let result = store.clear().await;
                    match reply {
                        Some(reply) => {
                            if reply.send(result).is_err() {
                                debug!("Nobody waiting for the draft clear result");
                            }
                        }
                        None => {
                            if let Err(err) = result {
                                warn!("Failed to remove the saved draft: {}", err);
                            }
                        }
                    }
                }
                None => {
                    if let Some(snapshot) = pending.take() {
                        write_draft(store.as_ref(), &snapshot).await;
                    }
                    break;
                }
            },
            _ = sleep_until(deadline), if pending.is_some() => {
                if let Some(snapshot) = pending.take() {
                    write_draft(store.as_ref(), &snapshot).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::ReportWizard;

    fn snapshot(name: &str, step: Step) -> DraftSnapshot {
        DraftSnapshot {
            report_data: ReportDraft {
                applicant_name: name.to_string(),
                ..Default::default()
            },
            step,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_changes_write_once() {
        let store = Arc::new(MemoryDraftStore::default());
        let (saver, _handle) = DraftSaver::spawn(store.clone());

        saver.schedule(snapshot("S", Step::General));
        tokio::time::sleep(Duration::from_millis(300)).await;
        saver.schedule(snapshot("Sa", Step::General));
        tokio::time::sleep(Duration::from_millis(300)).await;
        saver.schedule(snapshot("Sam", Step::General));
        assert_eq!(store.saves(), 0);

        tokio::time::sleep(SAVE_DEBOUNCE - Duration::from_millis(1)).await;
        assert_eq!(store.saves(), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(store.saves(), 1);
        assert_eq!(store.current(), Some(snapshot("Sam", Step::General)));

        tokio::time::sleep(SAVE_DEBOUNCE * 4).await;
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_pending_save() {
        let store = Arc::new(MemoryDraftStore::default());
        let (saver, _handle) = DraftSaver::spawn(store.clone());

        saver.schedule(snapshot("first", Step::Location));
        tokio::time::sleep(SAVE_DEBOUNCE * 2).await;
        assert!(saver.has_saved_draft().await);

        saver.schedule(snapshot("second", Step::Risk));
        saver.clear().await.expect("clear");
        tokio::time::sleep(SAVE_DEBOUNCE * 2).await;
        assert_eq!(store.saves(), 1);
        assert!(!saver.has_saved_draft().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_draft_written_on_shutdown() {
        let store = Arc::new(MemoryDraftStore::default());
        let (saver, handle) = DraftSaver::spawn(store.clone());

        saver.schedule(snapshot("closing", Step::Review));
        drop(saver);
        handle.await.expect("saver task");
        assert_eq!(store.current(), Some(snapshot("closing", Step::Review)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wizard_changes_reach_the_store() {
        let store = Arc::new(MemoryDraftStore::default());
        let (saver, _handle) = DraftSaver::spawn(store.clone());
        let mut wizard = ReportWizard::new().with_saver(saver.clone());

        wizard.update(|d| d.applicant_name = "N. Perera".to_string());
        wizard.update(|d| d.inspection_date = "2025-01-02".to_string());
        wizard.next().expect("next");
        tokio::time::sleep(SAVE_DEBOUNCE * 2).await;

        assert_eq!(store.saves(), 1);
        let saved = saver.saved_draft().await.expect("load").expect("draft");
        assert_eq!(saved.step, Step::Location);
        assert_eq!(saved.report_data.applicant_name, "N. Perera");

        let mut restored = ReportWizard::new();
        restored.restore(saved);
        assert_eq!(restored.step(), Step::Location);
        assert_eq!(restored.draft(), wizard.draft());
    }

    #[tokio::test]
    async fn test_file_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileDraftStore::new(dir.path().join("drafts"));
        assert!(store.path().ends_with("hazard-report-draft.json"));

        assert_eq!(store.load().await.expect("load"), None);
        store.clear().await.expect("clearing nothing");

        let draft = snapshot("Kamal", Step::Observations);
        store.save(&draft).await.expect("save");
        assert_eq!(store.load().await.expect("load"), Some(draft));

        let raw = std::fs::read_to_string(store.path()).expect("read draft");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["step"], 3);
        assert_eq!(value["reportData"]["applicantName"], "Kamal");

        store.clear().await.expect("clear");
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_file_store_ignores_garbage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileDraftStore::new(dir.path());
        std::fs::write(store.path(), b"{not json").expect("write");
        assert_eq!(store.load().await.expect("load"), None);
    }
}
