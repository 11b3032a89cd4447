//! Corpus ingestion scheduling
//!
//! On startup every corpus file found in the configured directories is
//! ingested and its package converted. Afterwards a file system watcher
//! repeats ingest + convert whenever a corpus file is written, and each corpus
//! directory that is a git checkout gets a [`RepositoryMirror`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::corpus::CorpusName;
use crate::error::{DocError, DocResult};
use crate::mirror::{GitPuller, MirrorExit, RepositoryMirror, RepositoryPuller};
use crate::registry::LanguageRegistry;

/// Kind of change reported for a watched path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOp {
    Write,
    Create,
    Remove,
    Rename,
    Other,
}

impl From<&EventKind> for WatchOp {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                WatchOp::Write
            }
            EventKind::Modify(ModifyKind::Name(_)) => WatchOp::Rename,
            EventKind::Create(_) => WatchOp::Create,
            EventKind::Remove(_) => WatchOp::Remove,
            _ => WatchOp::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub op: WatchOp,
}

impl WatchEvent {
    /// One event per path carried by the notifier event
    pub fn from_notify(event: &Event) -> Vec<WatchEvent> {
        let op = WatchOp::from(&event.kind);
        event
            .paths
            .iter()
            .map(|path| WatchEvent {
                path: path.clone(),
                op,
            })
            .collect()
    }

    /// Writes to files whose name does not start with a dot
    pub fn is_actionable(&self) -> bool {
        let hidden = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .is_none_or(|name| name.starts_with('.'));
        self.op == WatchOp::Write && !hidden
    }
}

/// Why the watch loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchExit {
    Cancelled,
    ChannelClosed,
    Failed(DocError),
}

pub struct IngestionScheduler {
    registry: Arc<LanguageRegistry>,
    corpus_dirs: Vec<PathBuf>,
    pull_interval: Duration,
    puller: Arc<dyn RepositoryPuller>,
    cancel: CancellationToken,
}

impl IngestionScheduler {
    pub fn new(registry: Arc<LanguageRegistry>, config: &Config) -> Self {
        IngestionScheduler {
            registry,
            corpus_dirs: config.corpus_dirs.clone(),
            pull_interval: config.pull_interval(),
            puller: Arc::new(GitPuller::new(&config.pull_program)),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the puller used by repository mirrors
    pub fn with_puller(mut self, puller: Arc<dyn RepositoryPuller>) -> Self {
        self.puller = puller;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &Arc<LanguageRegistry> {
        &self.registry
    }

    /// Ingest one corpus file and convert its package.
    ///
    /// Returns the parsed name, or `None` when the file name is not a corpus
    /// name. Blocking work runs off the async runtime.
    pub async fn process_file(&self, path: &Path) -> DocResult<Option<CorpusName>> {
        let Some(name) = CorpusName::from_path(path) else {
            debug!("{} is not a corpus file", path.display());
            return Ok(None);
        };

        let registry = Arc::clone(&self.registry);
        let path = path.to_path_buf();
        let job_name = name.clone();
        tokio::task::spawn_blocking(move || -> DocResult<()> {
            registry.ingest_file(&job_name.language, &path)?;
            registry.convert_package(&job_name.language, &job_name.package)?;
            Ok(())
        })
        .await
        .map_err(|e| DocError::Corpus(format!("conversion task failed: {}", e)))??;

        Ok(Some(name))
    }

    /// Ingest every corpus file directly inside the corpus directories.
    /// Returns how many files were processed successfully.
    pub async fn initial_scan(&self) -> usize {
        let mut processed = 0;
        for dir in &self.corpus_dirs {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("cannot read corpus directory {}: {}", dir.display(), e);
                    continue;
                }
            };

            let mut files = Vec::new();
            loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => {
                        let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
                        if is_file {
                            files.push(entry.path());
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("error listing {}: {}", dir.display(), e);
                        break;
                    }
                }
            }
            files.sort();

            for file in files {
                if self.cancel.is_cancelled() {
                    return processed;
                }
                match self.process_file(&file).await {
                    Ok(Some(_)) => processed += 1,
                    Ok(None) => {}
                    Err(e) => warn!("skipping corpus file {}: {}", file.display(), e),
                }
            }
        }
        info!("initial corpus scan processed {} files", processed);
        processed
    }

    /// Start a pull loop for each corpus directory that is a repository
    pub fn spawn_mirrors(&self) -> Vec<JoinHandle<MirrorExit>> {
        self.corpus_dirs
            .iter()
            .filter_map(|dir| {
                RepositoryMirror::new(dir, self.pull_interval, Arc::clone(&self.puller))
                    .spawn(self.cancel.child_token())
            })
            .collect()
    }

    /// Watch the corpus directories and re-process written corpus files.
    ///
    /// Fails only if the watcher cannot be created; otherwise runs until
    /// cancelled or the notifier stops.
    pub async fn watch(&self) -> DocResult<WatchExit> {
        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if tx.send(res).is_err() {
                    debug!("watch channel closed, dropping event");
                }
            },
            notify::Config::default(),
        )?;
        for dir in &self.corpus_dirs {
            info!("watching {}", dir.display());
            if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                warn!("cannot watch {}: {}", dir.display(), e);
            }
        }

        let exit = self.handle_events(&mut rx).await;
        drop(watcher);
        match &exit {
            WatchExit::Cancelled => info!("corpus watch cancelled"),
            WatchExit::ChannelClosed => warn!("corpus watch channel closed"),
            WatchExit::Failed(e) => error!("corpus watch error: {}", e),
        }
        Ok(exit)
    }

    /// Process notifier messages until cancellation, the first notifier
    /// error, or the channel closing
    async fn handle_events(
        &self,
        rx: &mut mpsc::UnboundedReceiver<notify::Result<Event>>,
    ) -> WatchExit {
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => return WatchExit::Cancelled,
                message = rx.recv() => message,
            };
            match message {
                None => return WatchExit::ChannelClosed,
                Some(Err(e)) => return WatchExit::Failed(e.into()),
                Some(Ok(event)) => {
                    for change in WatchEvent::from_notify(&event) {
                        if !change.is_actionable() {
                            continue;
                        }
                        info!("corpus file written: {}", change.path.display());
                        if let Err(e) = self.process_file(&change.path).await {
                            warn!("skipping corpus file {}: {}", change.path.display(), e);
                        }
                    }
                }
            }
        }
    }

    /// Initial scan, repository mirrors, then the watch loop
    pub async fn run(self: Arc<Self>) {
        self.initial_scan().await;
        if self.cancel.is_cancelled() {
            return;
        }
        let mirrors = self.spawn_mirrors();
        debug!("started {} repository mirrors", mirrors.len());

        if let Err(e) = self.watch().await {
            error!("cannot start corpus watch: {}", e);
        }
    }

    /// Run in the background. Mirror loops are detached and stop on cancellation.
    pub fn spawn(self) -> SchedulerHandle {
        let cancel = self.cancel.clone();
        let task = tokio::spawn(Arc::new(self).run());
        SchedulerHandle { cancel, task }
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the watch loop and every mirror, then wait for the scheduler task
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("scheduler task failed: {}", e);
        }
    }

    /// Wait for the scheduler to stop on its own
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("scheduler task failed: {}", e);
        }
    }
}
