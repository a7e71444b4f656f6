//! Durable store - serialized, crash-safe persistence of plans
//!
//! All plans live in one JSON file. A single background thread owns that
//! file and drains a FIFO job queue, so store operations never interleave.
//! Writes go to a fsynced temp file that is then renamed over the canonical
//! path, so the file on disk is always one complete document.

use super::plan::{Plan, PlanSummary, PlanUpdate};
use chrono::Utc;
use std::fs::{self, File};
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Store failure. Validation problems are never reported here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize plans: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("injected fault: write to {0} abandoned before rename")]
    InjectedFault(PathBuf),

    #[error("store worker has shut down")]
    Closed,
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Failure points that can be switched on for crash testing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    /// Stop after the temp file is written and synced, before the rename
    BeforeRename,
    /// Fail the first rename of each write so the retry path runs
    FirstRenameFails,
    /// Fail both the rename and its retry
    RenameAlwaysFails,
}

/// Options for opening a store
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Canonical document path
    pub path: PathBuf,
    pub fault: Option<InjectedFault>,
}

impl StoreOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fault: None,
        }
    }

    pub fn with_fault(mut self, fault: InjectedFault) -> Self {
        self.fault = Some(fault);
        self
    }
}

/// What a `mutate` callback hands back: the caller's result, plus an
/// optional update to commit.
#[derive(Debug)]
pub struct Mutation<T> {
    pub result: T,
    pub update: Option<PlanUpdate>,
}

impl<T> Mutation<T> {
    /// Return `result` and commit `update`
    pub fn commit(result: T, update: PlanUpdate) -> Self {
        Self {
            result,
            update: Some(update),
        }
    }

    /// Return `result` without writing
    pub fn skip(result: T) -> Self {
        Self {
            result,
            update: None,
        }
    }
}

type Job = Box<dyn FnOnce(&mut Backend) + Send>;

/// Handle to the store. Clones share the same queue and file.
#[derive(Clone)]
pub struct DurableStore {
    tx: mpsc::UnboundedSender<Job>,
    path: PathBuf,
}

impl DurableStore {
    /// Open a store backed by `path`
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::open_with(StoreOptions::new(path))
    }

    /// Open a store with explicit options.
    ///
    /// Nothing touches the file system until the first operation. Each call
    /// starts its own queue, so two stores opened on one path are not
    /// serialized against each other. Open a path once and clone the handle.
    pub fn open_with(options: StoreOptions) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let path = options.path.clone();
        let mut backend = Backend::new(options);

        std::thread::Builder::new()
            .name("plan-store".to_string())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    // A panicking callback only fails its own caller
                    if panic::catch_unwind(AssertUnwindSafe(|| job(&mut backend))).is_err() {
                        log::error!("Store job panicked; the backing file was left unchanged");
                    }
                }
                log::debug!("Store queue closed for {}", backend.path.display());
            })
            .map(|_| ())
            .unwrap_or_else(|e| log::error!("Failed to spawn store thread: {}", e));

        Self { tx, path }
    }

    /// Canonical document path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue `f` behind every operation admitted before it
    async fn submit<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Backend) -> Result<T, StoreError> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |backend| {
            let _ = reply_tx.send(f(backend));
        });
        self.tx.send(job).map_err(|_| StoreError::Closed)?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Summaries of every plan, in storage order
    pub async fn list_plans(&self) -> Result<Vec<PlanSummary>, StoreError> {
        self.submit(|backend| Ok(backend.read()?.iter().map(Plan::summary).collect()))
            .await
    }

    pub async fn get_plan(&self, id: &str) -> Result<Option<Plan>, StoreError> {
        let id = id.to_string();
        self.submit(move |backend| Ok(backend.read()?.into_iter().find(|p| p.id == id)))
            .await
    }

    /// Create or merge a plan
    pub async fn upsert_plan(&self, id: &str, update: PlanUpdate) -> Result<Plan, StoreError> {
        let id = id.to_string();
        self.submit(move |backend| {
            let mut plans = backend.read()?;
            let plan = match plans.iter().position(|p| p.id == id) {
                Some(index) => {
                    let merged = plans[index].clone().apply(update);
                    plans[index] = merged.clone();
                    merged
                }
                None => {
                    let created = Plan::create(id, update);
                    plans.push(created.clone());
                    created
                }
            };
            backend.write(&plans)?;
            Ok(plan)
        })
        .await
    }

    /// Remove a plan. Returns whether it existed.
    pub async fn delete_plan(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.submit(move |backend| {
            let mut plans = backend.read()?;
            let before = plans.len();
            plans.retain(|p| p.id != id);
            if plans.len() == before {
                return Ok(false);
            }
            backend.write(&plans)?;
            Ok(true)
        })
        .await
    }

    /// The single write primitive.
    ///
    /// `f` gets the current plan, or a fresh one if `id` is unknown. When it
    /// returns an update, the update is merged into that plan and written
    /// before the result is handed back. Without an update nothing is
    /// written and a fresh plan is not persisted.
    pub async fn mutate<T, F>(&self, id: &str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(Plan) -> Mutation<T> + Send + 'static,
    {
        let id = id.to_string();
        self.submit(move |backend| {
            let mut plans = backend.read()?;
            let index = plans.iter().position(|p| p.id == id);
            let current = match index {
                Some(i) => plans[i].clone(),
                None => Plan::new(id.clone()),
            };

            let Mutation { result, update } = f(current.clone());
            let Some(update) = update else {
                return Ok(result);
            };

            let merged = current.apply(update);
            match index {
                Some(i) => plans[i] = merged,
                None => plans.push(merged),
            }
            backend.write(&plans)?;
            Ok(result)
        })
        .await
    }
}

/// Owner of the backing file. Only ever used from the store thread.
struct Backend {
    path: PathBuf,
    fault: Option<InjectedFault>,
    temp_counter: AtomicU64,
}

impl Backend {
    fn new(options: StoreOptions) -> Self {
        Self {
            path: options.path,
            fault: options.fault,
            temp_counter: AtomicU64::new(0),
        }
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn ensure_dir(&self) -> Result<PathBuf, StoreError> {
        let dir = self.dir();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(dir)
    }

    /// Load every plan. A missing file is empty; so is an unparsable one.
    fn read(&self) -> Result<Vec<Plan>, StoreError> {
        self.ensure_dir()?;
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Vec<Plan>>(&raw) {
            Ok(plans) => Ok(plans),
            Err(e) => {
                log::warn!(
                    "Plan store {} is unreadable, treating as empty: {}",
                    self.path.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    /// Replace the document: temp file, fsync, rename
    fn write(&self, plans: &[Plan]) -> Result<(), StoreError> {
        let dir = self.ensure_dir()?;
        let payload = serde_json::to_string_pretty(plans)?;
        let tmp_path = dir.join(self.temp_name());

        if let Err(e) = write_synced(&tmp_path, payload.as_bytes()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::io(&tmp_path, e));
        }

        if self.fault == Some(InjectedFault::BeforeRename) {
            log::warn!("Injected fault: leaving {} unrenamed", tmp_path.display());
            return Err(StoreError::InjectedFault(self.path.clone()));
        }

        if let Err(first) = self.rename(&tmp_path, 0) {
            log::debug!(
                "Rename onto {} failed ({}), clearing destination and retrying",
                self.path.display(),
                first
            );
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    let _ = fs::remove_file(&tmp_path);
                    return Err(StoreError::io(&self.path, e));
                }
            }
            if let Err(e) = self.rename(&tmp_path, 1) {
                let _ = fs::remove_file(&tmp_path);
                return Err(StoreError::io(&self.path, e));
            }
        }

        sync_dir(&dir);
        log::debug!("Wrote {} plan(s) to {}", plans.len(), self.path.display());
        Ok(())
    }

    fn rename(&self, tmp_path: &Path, attempt: u8) -> io::Result<()> {
        let injected = match self.fault {
            Some(InjectedFault::FirstRenameFails) => attempt == 0,
            Some(InjectedFault::RenameAlwaysFails) => true,
            _ => false,
        };
        if injected {
            log::warn!("Injected fault: rename attempt {} refused", attempt + 1);
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "injected rename failure",
            ));
        }
        fs::rename(tmp_path, &self.path)
    }

    fn temp_name(&self) -> String {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("plans");
        format!(
            "{}.{}.{}.{}.tmp",
            stem,
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            std::process::id(),
            self.temp_counter.fetch_add(1, Ordering::Relaxed)
        )
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Persist the rename itself where the platform allows it
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            log::debug!("Directory sync of {} failed: {}", dir.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}
