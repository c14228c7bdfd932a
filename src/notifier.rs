//! File-watch coordination engine.
//!
//! The OS primitive watches directories, not files, so the notifier keeps one
//! native watch per parent directory and recovers file granularity by name
//! filtering inside the notification loop. A shadow copy of every watched
//! file (see [`ShadowRepository`]) provides the old content for diffs and
//! absorbs notifications that did not actually change anything.
//!
//! Paths are not canonicalized; callers are responsible for passing paths in
//! the same spelling the OS will report them with.

use crate::diff;
use crate::error::{Error, Result};
use crate::event::{ModificationEvent, Observer};
use crate::shadow::ShadowRepository;
use crossbeam_channel::{unbounded, Receiver};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// What happened to a directory entry, as far as the watch reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Created,
    Modified,
    Deleted,
}

/// Notifies registered [`Observer`]s of changes to specific files below a
/// root directory.
///
/// The notifier starts implicitly on the first [`add_observer`] call and
/// stops (deleting all shadow copies) when the last observer is removed or
/// [`stop`] is called explicitly.
///
/// [`add_observer`]: Notifier::add_observer
/// [`stop`]: Notifier::stop
pub struct Notifier {
    root: PathBuf,
    shadow: ShadowRepository,
    /// Parent directory -> per-directory observer bookkeeping. Guarded by
    /// its own mutex so registration and the notification loop never mutate
    /// it concurrently.
    watches: Arc<Mutex<HashMap<PathBuf, DirectoryWatch>>>,
    /// `Some` while the watch service and its notification thread are live.
    /// Doubles as the notifier-wide lock for start/stop transitions.
    engine: Mutex<Option<Engine>>,
}

struct Engine {
    watcher: RecommendedWatcher,
    thread: JoinHandle<()>,
}

impl Notifier {
    /// Create a notifier for files below `root`, mirroring their last-seen
    /// content below `shadow_root`. Only the shadow directory is created at
    /// construction time; the watch service starts with the first observer.
    pub fn new(root: impl Into<PathBuf>, shadow_root: impl Into<PathBuf>) -> Result<Self> {
        let root = normalize(&root.into());
        let shadow = ShadowRepository::create(root.clone(), normalize(&shadow_root.into()))?;
        Ok(Self {
            root,
            shadow,
            watches: Arc::new(Mutex::new(HashMap::new())),
            engine: Mutex::new(None),
        })
    }

    /// Register `observer` for `file`. Relative paths resolve against the
    /// root. The file does not need to exist yet, but its parent directory is
    /// created on demand so it can be watched.
    ///
    /// Adding an observer implicitly starts the notifier. Adding the same
    /// observer (by identity) twice for the same file has no effect; the same
    /// observer may be registered for any number of files.
    pub fn add_observer(&self, file: impl AsRef<Path>, observer: Arc<dyn Observer>) -> Result<()> {
        let file = self.checked_path(file.as_ref())?;
        let dir = match file.parent() {
            Some(dir) if dir.starts_with(&self.root) => dir.to_path_buf(),
            _ => {
                return Err(Error::OutsideRoot {
                    file,
                    root: self.root.clone(),
                })
            }
        };

        let mut engine_guard = self.engine.lock().expect("notifier lock poisoned");
        if engine_guard.is_none() {
            *engine_guard = Some(self.start_engine()?);
        }
        let engine = engine_guard.as_mut().expect("engine installed above");

        if !dir.exists() {
            info!("creating directory {} so that it can be watched", dir.display());
            fs::create_dir_all(&dir)?;
        }
        self.shadow.seed(&file)?;

        let mut table = self.watches.lock().expect("watch table lock poisoned");
        let watch = match table.entry(dir.clone()) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                debug!("registering native watch on {}", dir.display());
                engine.watcher.watch(&dir, RecursiveMode::NonRecursive)?;
                vacant.insert(DirectoryWatch::new(dir))
            }
        };
        watch.add_observer(file, observer);
        Ok(())
    }

    /// Remove `observer` from `file`. Releases the file's shadow copy when
    /// its last observer goes, the directory's native watch when the
    /// directory's last file goes, and stops the notifier when nothing is
    /// watched at all. Unknown files and observers are a no-op.
    pub fn remove_observer(&self, file: impl AsRef<Path>, observer: &Arc<dyn Observer>) -> Result<()> {
        let file = self.checked_path(file.as_ref())?;
        let Some(dir) = file.parent().map(Path::to_path_buf) else {
            return Ok(());
        };

        let mut engine_guard = self.engine.lock().expect("notifier lock poisoned");
        if engine_guard.is_none() {
            return Ok(());
        }

        let mut table = self.watches.lock().expect("watch table lock poisoned");
        let Some(watch) = table.get_mut(&dir) else {
            return Ok(());
        };
        watch.remove_observer(&file, observer);
        if watch.is_empty() {
            debug!("cancelling native watch on {}", dir.display());
            if let Some(engine) = engine_guard.as_mut() {
                if let Err(e) = engine.watcher.unwatch(&dir) {
                    warn!("failed to cancel watch on {}: {e}", dir.display());
                }
            }
            table.remove(&dir);
        }

        let still_watched = table.get(&dir).is_some_and(|w| w.watches_file(&file));
        if !still_watched {
            if let Err(e) = self.shadow.purge(&file) {
                warn!("failed to delete shadow copy of {}: {e}", file.display());
            }
        }

        let table_empty = table.is_empty();
        drop(table);
        if table_empty {
            info!("last observer removed, stopping notifier");
            if let Some(engine) = engine_guard.take() {
                shutdown(engine);
                if let Err(e) = self.shadow.purge_all() {
                    warn!("failed to delete shadow repository: {e}");
                }
            }
        }
        Ok(())
    }

    /// Whether the watch service and its notification loop are live.
    pub fn is_running(&self) -> bool {
        self.engine.lock().expect("notifier lock poisoned").is_some()
    }

    /// Stop notifications, drop all observers, and delete the shadow
    /// repository. Observers must be re-added before the notifier delivers
    /// events again. No-op when already stopped.
    pub fn stop(&self) -> Result<()> {
        let mut engine_guard = self.engine.lock().expect("notifier lock poisoned");
        let Some(engine) = engine_guard.take() else {
            debug!("notifier is not running");
            return Ok(());
        };
        info!("stopping notifier for {}", self.root.display());
        self.watches
            .lock()
            .expect("watch table lock poisoned")
            .clear();
        shutdown(engine);
        self.shadow.purge_all()?;
        Ok(())
    }

    /// Create the watch service and spawn the notification thread.
    fn start_engine(&self) -> Result<Engine> {
        info!("starting notifier for {}", self.root.display());
        let (tx, rx) = unbounded();
        let watcher = notify::recommended_watcher(move |delivery| {
            // The loop ends when this sender is dropped with the watcher.
            let _ = tx.send(delivery);
        })?;
        let watches = Arc::clone(&self.watches);
        let shadow = self.shadow.clone();
        let thread = thread::Builder::new()
            .name("diffwatch-notifier".into())
            .spawn(move || notification_loop(rx, watches, shadow))?;
        Ok(Engine { watcher, thread })
    }

    /// Resolve against the root, reject directories, and normalize away
    /// `.`/`..` components.
    fn checked_path(&self, file: &Path) -> Result<PathBuf> {
        let file = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.root.join(file)
        };
        if file.is_dir() {
            return Err(Error::IsADirectory(file));
        }
        Ok(normalize(&file))
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("failed to stop notifier cleanly: {e}");
        }
    }
}

/// Close the watch service and wait for the notification thread to exit.
/// Dropping the watcher disconnects the event channel, which ends the loop.
fn shutdown(engine: Engine) {
    let Engine { watcher, thread } = engine;
    drop(watcher);
    if thread.join().is_err() {
        warn!("notification thread panicked during shutdown");
    }
}

/// The background notification loop: block on the next raw watch event,
/// correlate it with a directory watch, and let that watch handle it.
fn notification_loop(
    rx: Receiver<notify::Result<notify::Event>>,
    watches: Arc<Mutex<HashMap<PathBuf, DirectoryWatch>>>,
    shadow: ShadowRepository,
) {
    for delivery in rx {
        let event = match delivery {
            Ok(event) => event,
            Err(e) => {
                warn!("watch service error: {e}");
                continue;
            }
        };
        let changes = classify(&event);
        if changes.is_empty() {
            continue;
        }
        let table = watches.lock().expect("watch table lock poisoned");
        for (change, path) in changes {
            let Some(dir) = path.parent() else { continue };
            if let Some(watch) = table.get(dir) {
                watch.handle_change(change, path, &shadow);
            }
        }
    }
    debug!("notification loop terminated");
}

/// Map a raw watch event to per-path changes. Renames surface as a deletion
/// of the old name and a creation of the new one, matching what
/// directory-granular native watches report. Kinds with no bearing on
/// content are skipped.
fn classify(event: &notify::Event) -> Vec<(Change, &Path)> {
    let paths = || event.paths.iter().map(PathBuf::as_path);
    match &event.kind {
        EventKind::Create(_) => paths().map(|p| (Change::Created, p)).collect(),
        EventKind::Remove(_) => paths().map(|p| (Change::Deleted, p)).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths().map(|p| (Change::Deleted, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths().map(|p| (Change::Created, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            vec![
                (Change::Deleted, event.paths[0].as_path()),
                (Change::Created, event.paths[1].as_path()),
            ]
        }
        EventKind::Modify(_) => paths().map(|p| (Change::Modified, p)).collect(),
        EventKind::Access(_) => Vec::new(),
        other => {
            trace!("ignoring file system event kind {other:?}");
            Vec::new()
        }
    }
}

/// Per-directory bookkeeping: the observer sets for all watched files whose
/// parent is `dir`. One instance corresponds to one native watch handle.
struct DirectoryWatch {
    dir: PathBuf,
    observers: HashMap<PathBuf, Vec<Arc<dyn Observer>>>,
}

impl DirectoryWatch {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            observers: HashMap::new(),
        }
    }

    /// Insert into the file's observer set, ignoring duplicates by identity.
    fn add_observer(&mut self, file: PathBuf, observer: Arc<dyn Observer>) {
        let set = self.observers.entry(file).or_default();
        if !set.iter().any(|existing| same_observer(existing, &observer)) {
            set.push(observer);
        }
    }

    /// Remove by identity; empty per-file sets are dropped entirely.
    fn remove_observer(&mut self, file: &Path, observer: &Arc<dyn Observer>) {
        if let Some(set) = self.observers.get_mut(file) {
            set.retain(|existing| !same_observer(existing, observer));
            if set.is_empty() {
                self.observers.remove(file);
            }
        }
    }

    fn watches_file(&self, file: &Path) -> bool {
        self.observers.contains_key(file)
    }

    fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Handle one reported change to an entry of this directory. Only watched
    /// files produce events; content identical to the shadow produces none
    /// (that is what filters spurious wakeups and metadata-only touches).
    /// Failures are logged and must not disturb sibling events.
    fn handle_change(&self, change: Change, file: &Path, shadow: &ShadowRepository) {
        let Some(observers) = self.observers.get(file) else {
            trace!(
                "ignoring change to unwatched entry {} in {}",
                file.display(),
                self.dir.display()
            );
            return;
        };
        if let Err(e) = apply_change(change, file, observers, shadow) {
            warn!(
                "failure while handling {change:?} for {}: {e}",
                file.display()
            );
        }
    }
}

/// Compare the file against its shadow, dispatch an event if they differ,
/// then bring the shadow up to date.
fn apply_change(
    change: Change,
    file: &Path,
    observers: &[Arc<dyn Observer>],
    shadow: &ShadowRepository,
) -> std::io::Result<()> {
    let shadow_file = shadow.shadow_path(file)?;
    if !diff::identical(file, &shadow_file)? {
        let event = ModificationEvent::from_files(file, &shadow_file)?;
        for observer in observers {
            let dispatch = panic::catch_unwind(AssertUnwindSafe(|| observer.file_modified(&event)));
            if dispatch.is_err() {
                warn!("observer panicked while handling event for {}", file.display());
            }
        }
    }
    match change {
        Change::Created | Change::Modified => shadow.refresh(file)?,
        Change::Deleted => shadow.purge(file)?,
    }
    Ok(())
}

/// Observer identity: the same allocation, regardless of how the `Arc` was
/// coerced to a trait object.
fn same_observer(a: &Arc<dyn Observer>, b: &Arc<dyn Observer>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Lexically normalize a path: fold away `.` and `..` components without
/// touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
