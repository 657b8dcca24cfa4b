// src/watch/watcher.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::fs::{FileSystem, RealFileSystem};
use crate::scheduler::{ConfigUpdate, Scheduler};
use crate::watch::reload::{ScriptChange, ScriptIndex};

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// An entity whose script lives in a file.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub entity_id: String,
    pub path: PathBuf,
}

/// Watch the given script files and push edits into the scheduler through
/// `update_configuration`.
pub fn spawn_watcher(sources: Vec<ScriptSource>, scheduler: Scheduler) -> Result<WatcherHandle> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    let mut index = ScriptIndex::new();
    for source in sources {
        let path = canonical(&source.path);
        // Whatever is on disk now was applied at startup.
        if let Ok(text) = fs.read_to_string(&path) {
            index.seed(path.clone(), text);
        }
        index.insert(path, source.entity_id);
    }

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    eprintln!("tickscript: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("tickscript: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    for dir in index.watched_dirs() {
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!("watching scripts in {:?}", dir);
    }

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !(event.kind.is_modify() || event.kind.is_create()) {
                continue;
            }
            debug!(?event, "received notify event");

            for path in event.paths {
                let path = canonical(&path);
                if !index.contains(&path) {
                    continue;
                }
                match index.reload(fs.as_ref(), &path) {
                    Ok(Some(change)) => apply(&scheduler, change).await,
                    Ok(None) => {}
                    // Mid-save renames can briefly hide the file; the next
                    // event picks it up.
                    Err(err) => debug!(?path, error = %err, "script file not readable yet"),
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}

async fn apply(scheduler: &Scheduler, change: ScriptChange) {
    for entity_id in &change.entity_ids {
        let update = ConfigUpdate {
            script_source: Some(change.source.clone()),
            ..ConfigUpdate::default()
        };
        match scheduler.update_configuration(entity_id, update).await {
            Ok(true) => info!(entity = %entity_id, path = ?change.path, "reloaded script"),
            Ok(false) => {}
            Err(err) => warn!(entity = %entity_id, error = %err, "failed to apply reloaded script"),
        }
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
