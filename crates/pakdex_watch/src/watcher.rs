//! The filesystem watcher and its reconciliation loop

use crate::error::Result;
use crate::scan::{archive_files_in, is_archive_name, subdirectories};
use crate::MIN_ARCHIVE_LEN;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often declared roots are re-checked for existence.
const RECONCILE_INTERVAL: Duration = Duration::from_secs(3);

/// Wait up to 30 seconds for freshly mounted storage to spin up.
const SYNC_ATTEMPT_COUNT: u32 = 30;
const SYNC_ATTEMPT_DELAY: Duration = Duration::from_secs(1);

/// Signal delivered to the consumer. The watcher never touches the index
/// itself; every mutation travels through one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    /// An archive file appeared or changed and should be (re-)ingested.
    Ingest(PathBuf),
    /// An archive file disappeared; drop its record.
    Remove(PathBuf),
    /// A watched directory disappeared; drop every record under it.
    RemoveTree(PathBuf),
    /// A synchronization pass finished over these directories; drop records
    /// whose directory is one of them and whose backing file is gone.
    SyncPrune { dirs: Vec<String> },
}

/// One user-declared watch root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedDirectory {
    pub path: PathBuf,
    pub recursive: bool,
    pub known_to_exist: bool,
}

struct WatchState {
    watcher: Option<RecommendedWatcher>,
    roots: Vec<WatchedDirectory>,
    /// Directories with a live native watch handle.
    registered: Vec<PathBuf>,
}

impl WatchState {
    /// Returns true when a new handle was actually created.
    fn register(&mut self, path: &Path) -> bool {
        if self.registered.iter().any(|p| p == path) {
            return false;
        }
        let Some(watcher) = self.watcher.as_mut() else {
            return false;
        };
        match watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                debug!(path = %path.display(), "registered watch handle");
                self.registered.push(path.to_path_buf());
                true
            }
            // A directory can vanish between the event and the registration.
            Err(error) => {
                debug!(path = %path.display(), %error, "could not register watch handle");
                false
            }
        }
    }

    /// Remove the handle for exactly this path. Returns whether one existed.
    fn deregister(&mut self, path: &Path) -> bool {
        let Some(index) = self.registered.iter().position(|p| p == path) else {
            return false;
        };
        self.registered.remove(index);
        if let Some(watcher) = self.watcher.as_mut() {
            if let Err(error) = watcher.unwatch(path) {
                debug!(path = %path.display(), %error, "could not drop watch handle");
            }
        }
        debug!(path = %path.display(), "deregistered watch handle");
        true
    }

    /// Remove the handles for this path and everything below it.
    fn deregister_tree(&mut self, path: &Path) {
        let doomed: Vec<PathBuf> = self
            .registered
            .iter()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();
        for dir in doomed {
            self.deregister(&dir);
        }
    }
}

/// Maintains watch roots and delivers [`WatchSignal`]s to the consumer.
///
/// Two loops run until [`FsWatcher`] is dropped: the native event-delivery
/// callback and the low-frequency reconciliation loop. Declaring a root does
/// not register it immediately; the next reconciliation pass performs the
/// initial synchronization and registration, the same path a remount takes.
pub struct FsWatcher {
    state: Arc<Mutex<WatchState>>,
    stop: Arc<AtomicBool>,
    reconciler: Option<JoinHandle<()>>,
}

impl FsWatcher {
    pub fn spawn(signals: mpsc::Sender<WatchSignal>) -> Result<Self> {
        Self::with_interval(signals, RECONCILE_INTERVAL)
    }

    pub fn with_interval(signals: mpsc::Sender<WatchSignal>, interval: Duration) -> Result<Self> {
        let state = Arc::new(Mutex::new(WatchState {
            watcher: None,
            roots: Vec::new(),
            registered: Vec::new(),
        }));

        let handler_state = Arc::clone(&state);
        let handler_signals = signals.clone();
        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            handle_event(&handler_state, &handler_signals, result);
        })?;
        if let Ok(mut guard) = state.lock() {
            guard.watcher = Some(watcher);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let loop_state = Arc::clone(&state);
        let loop_stop = Arc::clone(&stop);
        let reconciler = thread::Builder::new()
            .name("pakdex-watch-reconcile".to_string())
            .spawn(move || reconcile_loop(loop_state, signals, loop_stop, interval))?;

        Ok(Self {
            state,
            stop,
            reconciler: Some(reconciler),
        })
    }

    /// Declare a watch root. Re-declaring an existing root updates its
    /// recursive flag and forces a fresh synchronization pass.
    pub fn declare(&self, path: PathBuf, recursive: bool) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Some(existing) = state.roots.iter_mut().find(|r| r.path == path) {
            if existing.recursive != recursive {
                existing.recursive = recursive;
                existing.known_to_exist = false;
            }
            return;
        }
        info!(path = %path.display(), recursive, "declared watch root");
        state.roots.push(WatchedDirectory {
            path,
            recursive,
            known_to_exist: false,
        });
    }

    /// Remove a declared root and its watch handles.
    pub fn undeclare(&self, path: &Path) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.roots.retain(|r| r.path != path);
        state.deregister_tree(path);
        info!(path = %path.display(), "removed watch root");
    }

    /// Snapshot of the declared roots.
    pub fn roots(&self) -> Vec<WatchedDirectory> {
        self.state
            .lock()
            .map(|state| state.roots.clone())
            .unwrap_or_default()
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reconciler.take() {
            let _ = handle.join();
        }
        // Take the native watcher out from under the lock before dropping
        // it: its teardown waits for the event thread, which may itself be
        // waiting on the state lock.
        let watcher = self
            .state
            .lock()
            .ok()
            .and_then(|mut state| state.watcher.take());
        drop(watcher);
    }
}

fn handle_event(
    state: &Arc<Mutex<WatchState>>,
    signals: &mpsc::Sender<WatchSignal>,
    result: notify::Result<Event>,
) {
    let event = match result {
        Ok(event) => event,
        Err(error) => {
            warn!(%error, "watch event error");
            return;
        }
    };

    let removed = matches!(event.kind, EventKind::Remove(_));
    let created = matches!(event.kind, EventKind::Create(_));
    let modified = matches!(event.kind, EventKind::Modify(_));
    if !(removed || created || modified) {
        return;
    }

    for path in &event.paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Renames surface as modify events; a modified path that no longer
        // exists left the tree and counts as a removal.
        if removed || (modified && !path.exists()) {
            if is_archive_name(&name) {
                let _ = signals.send(WatchSignal::Remove(path.clone()));
            } else {
                let had_handle = state
                    .lock()
                    .map(|mut state| state.deregister(path))
                    .unwrap_or(false);
                if had_handle {
                    let _ = signals.send(WatchSignal::RemoveTree(path.clone()));
                }
            }
            continue;
        }

        // Newly created or modified archive files are (re-)added once the
        // header is readable; the index's replace semantics absorb repeats.
        if is_archive_name(&name) && path.is_file() {
            match std::fs::metadata(path) {
                Ok(meta) if meta.len() >= MIN_ARCHIVE_LEN => {
                    let _ = signals.send(WatchSignal::Ingest(path.clone()));
                }
                Ok(_) => debug!(path = %path.display(), "archive header not complete yet"),
                Err(error) => debug!(path = %path.display(), %error, "could not stat created file"),
            }
            continue;
        }

        // Directories renamed into the tree also arrive as modify events.
        if (created || modified) && path.is_dir() {
            let Ok(mut guard) = state.lock() else {
                continue;
            };
            let is_root = guard.roots.iter().any(|r| r.path == *path);
            let under_recursive = guard
                .roots
                .iter()
                .any(|r| r.recursive && path.starts_with(&r.path) && r.path != *path);
            if is_root || under_recursive {
                let newly_watched = guard.register(path);
                if under_recursive {
                    for subdir in subdirectories(path) {
                        guard.register(&subdir);
                    }
                }
                drop(guard);
                // A directory renamed into place arrives with its contents
                // but without per-file events.
                if newly_watched {
                    rescan_for_existing(path, signals);
                }
            }
        }
    }
}

fn rescan_for_existing(path: &Path, signals: &mpsc::Sender<WatchSignal>) {
    let mut files = archive_files_in(path);
    for subdir in subdirectories(path) {
        files.extend(archive_files_in(&subdir));
    }
    for file in files {
        if std::fs::metadata(&file).map(|m| m.len() >= MIN_ARCHIVE_LEN).unwrap_or(false) {
            let _ = signals.send(WatchSignal::Ingest(file));
        }
    }
}

fn reconcile_loop(
    state: Arc<Mutex<WatchState>>,
    signals: mpsc::Sender<WatchSignal>,
    stop: Arc<AtomicBool>,
    interval: Duration,
) {
    loop {
        let roots = match state.lock() {
            Ok(state) => state.roots.clone(),
            Err(_) => return,
        };

        for root in roots {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            let exists = root.path.exists();
            if exists && !root.known_to_exist {
                info!(path = %root.path.display(), "watch root appeared, synchronizing");
                synchronize(&root, &signals, &stop);
                if let Ok(mut guard) = state.lock() {
                    guard.register(&root.path);
                    if root.recursive {
                        for subdir in subdirectories(&root.path) {
                            guard.register(&subdir);
                        }
                    }
                    set_known(&mut guard, &root.path, true);
                }
            } else if !exists && root.known_to_exist {
                info!(path = %root.path.display(), "watch root disappeared");
                if let Ok(mut guard) = state.lock() {
                    guard.deregister_tree(&root.path);
                    set_known(&mut guard, &root.path, false);
                }
            }
        }

        let mut slept = Duration::ZERO;
        while slept < interval {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            let step = interval.min(Duration::from_millis(250));
            thread::sleep(step);
            slept += step;
        }
    }
}

fn set_known(state: &mut WatchState, path: &Path, known: bool) {
    if let Some(root) = state.roots.iter_mut().find(|r| r.path == path) {
        root.known_to_exist = known;
    }
}

/// Full synchronization pass over a root that just (re-)appeared: add every
/// archive file below it, then let the consumer prune records whose backing
/// files are gone. Waits out slow-spinning storage before giving up.
fn synchronize(
    root: &WatchedDirectory,
    signals: &mpsc::Sender<WatchSignal>,
    stop: &Arc<AtomicBool>,
) {
    for _attempt in 0..SYNC_ATTEMPT_COUNT {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        if std::fs::read_dir(&root.path).is_err() {
            thread::sleep(SYNC_ATTEMPT_DELAY);
            continue;
        }

        let mut files = archive_files_in(&root.path);
        let mut dirs = vec![root.path.to_string_lossy().into_owned()];
        if root.recursive {
            for subdir in subdirectories(&root.path) {
                files.extend(archive_files_in(&subdir));
                dirs.push(subdir.to_string_lossy().into_owned());
            }
        }

        let mut ingested = 0usize;
        for file in files {
            if std::fs::metadata(&file).map(|m| m.len() >= MIN_ARCHIVE_LEN).unwrap_or(false) {
                let _ = signals.send(WatchSignal::Ingest(file));
                ingested += 1;
            }
        }
        let _ = signals.send(WatchSignal::SyncPrune { dirs });
        info!(path = %root.path.display(), ingested, "synchronization pass complete");
        return;
    }
    warn!(path = %root.path.display(), "watch root never became readable");
}
