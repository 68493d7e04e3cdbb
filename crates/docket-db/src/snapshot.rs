//! On-disk JSON snapshot of all records and the background writer that
//! keeps it current.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use docket_core::{DocumentRecord, Error, RecordSource, Result};

/// A snapshot file: a JSON array of records.
pub struct SnapshotFile {
    path: PathBuf,
    /// Serialises writers so two rewrites never share the temp file.
    write_lock: AsyncMutex<()>,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: AsyncMutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Read the snapshot. `Ok(None)` when the file does not exist.
    pub async fn load(&self) -> Result<Option<Vec<DocumentRecord>>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let records: Vec<DocumentRecord> = serde_json::from_slice(&data)?;
        Ok(Some(records))
    }

    /// Rewrite the snapshot with `records`.
    ///
    /// Writes `<path>.tmp`, syncs it, then renames it over `<path>`, so a
    /// crash mid-write leaves the previous snapshot intact.
    pub async fn write(&self, records: &[DocumentRecord]) -> Result<()> {
        let data = serde_json::to_vec_pretty(records)?;
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "snapshot: create_dir_all failed");
                e
            })?;
        }

        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "snapshot: File::create failed");
            e
        })?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            warn!(
                from = %temp_path.display(),
                to = %self.path.display(),
                error = %e,
                "snapshot: rename failed"
            );
            e
        })?;

        debug!(
            path = %self.path.display(),
            records = records.len(),
            bytes = data.len(),
            "Snapshot written"
        );
        Ok(())
    }
}

/// Coalescing background writer.
///
/// `schedule` only raises a flag; the writer task wakes, takes a fresh copy
/// of every record and rewrites the file. Any number of `schedule` calls
/// made before the task wakes collapse into one write.
pub struct SnapshotWriter {
    file: Arc<SnapshotFile>,
    source: Arc<dyn RecordSource>,
    wake: Arc<Notify>,
    shutdown_tx: mpsc::Sender<()>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotWriter {
    /// Start the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(file: Arc<SnapshotFile>, source: Arc<dyn RecordSource>) -> Self {
        let wake = Arc::new(Notify::new());
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = {
            let file = Arc::clone(&file);
            let source = Arc::clone(&source);
            let wake = Arc::clone(&wake);
            tokio::spawn(async move {
                debug!(path = %file.path().display(), "Snapshot writer started");
                loop {
                    tokio::select! {
                        _ = wake.notified() => {
                            let records = source.snapshot();
                            if let Err(e) = file.write(&records).await {
                                // The next successful write reconciles the file
                                warn!(
                                    path = %file.path().display(),
                                    error = %e,
                                    "Background snapshot write failed"
                                );
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
                debug!(path = %file.path().display(), "Snapshot writer stopped");
            })
        };

        Self {
            file,
            source,
            wake,
            shutdown_tx,
            task: parking_lot::Mutex::new(Some(task)),
        }
    }

    /// Request a rewrite. Returns immediately.
    pub fn schedule(&self) {
        self.wake.notify_one();
    }

    /// Write the current records now and report the outcome.
    pub async fn flush(&self) -> Result<()> {
        let records = self.source.snapshot();
        self.file.write(&records).await
    }

    /// Stop the writer task after a final synchronous flush.
    pub async fn close(&self) -> Result<()> {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return Ok(());
        };

        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = task.await {
            warn!(error = %e, "Snapshot writer task ended abnormally");
        }

        let result = self.flush().await;
        match &result {
            Ok(()) => info!(path = %self.file.path().display(), "Snapshot writer closed"),
            Err(e) => warn!(error = %e, "Final snapshot flush failed"),
        }
        result
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }
}

/// Load records from `file`, degrading to an empty list on any failure.
pub async fn load_or_empty(file: &SnapshotFile) -> Vec<DocumentRecord> {
    match file.load().await {
        Ok(Some(records)) => {
            info!(
                path = %file.path().display(),
                records = records.len(),
                "Loaded record snapshot"
            );
            records
        }
        Ok(None) => {
            info!(path = %file.path().display(), "No snapshot found, starting empty");
            Vec::new()
        }
        Err(Error::Serialization(e)) => {
            warn!(
                path = %file.path().display(),
                error = %e,
                "Snapshot is unparsable, starting empty"
            );
            Vec::new()
        }
        Err(e) => {
            warn!(
                path = %file.path().display(),
                error = %e,
                "Snapshot could not be read, starting empty"
            );
            Vec::new()
        }
    }
}
