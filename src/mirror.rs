//! Periodic upstream pulls for corpus directories that are git checkouts
//!
//! Each repository gets its own task that sleeps, pulls, and repeats. The
//! first failed pull ends the task for good.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{DocError, DocResult};

/// Fetches upstream changes into a checked-out directory
#[async_trait]
pub trait RepositoryPuller: Send + Sync {
    async fn pull(&self, directory: &Path) -> DocResult<()>;

    /// Name used in log output
    fn name(&self) -> &str;
}

/// Runs `<program> pull` with the repository as working directory
#[derive(Debug, Clone)]
pub struct GitPuller {
    program: String,
}

impl GitPuller {
    pub fn new(program: &str) -> Self {
        GitPuller {
            program: program.to_string(),
        }
    }
}

impl Default for GitPuller {
    fn default() -> Self {
        GitPuller::new("git")
    }
}

#[async_trait]
impl RepositoryPuller for GitPuller {
    async fn pull(&self, directory: &Path) -> DocResult<()> {
        let output = Command::new(&self.program)
            .arg("pull")
            .current_dir(directory)
            .output()
            .await
            .map_err(|e| {
                DocError::Pull(format!("{} pull in {}: {}", self.program, directory.display(), e))
            })?;
        if !output.status.success() {
            return Err(DocError::Pull(format!(
                "{} pull in {} exited with {}: {}",
                self.program,
                directory.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Why a mirror loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorExit {
    /// The directory has no version-control metadata; no loop was run
    NotARepository,
    Cancelled,
    Failed(DocError),
}

/// Background pull loop for one watched directory
pub struct RepositoryMirror {
    directory: PathBuf,
    interval: Duration,
    puller: Arc<dyn RepositoryPuller>,
}

impl RepositoryMirror {
    pub fn new(directory: &Path, interval: Duration, puller: Arc<dyn RepositoryPuller>) -> Self {
        RepositoryMirror {
            directory: directory.to_path_buf(),
            interval,
            puller,
        }
    }

    pub fn is_repository(directory: &Path) -> bool {
        directory.join(".git").exists()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Sleep and pull until a pull fails or `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> MirrorExit {
        if !Self::is_repository(&self.directory) {
            debug!("{} is not a repository, not mirroring", self.directory.display());
            return MirrorExit::NotARepository;
        }
        info!(
            "mirroring {} every {:?} with {}",
            self.directory.display(),
            self.interval,
            self.puller.name()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return MirrorExit::Cancelled,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return MirrorExit::Cancelled,
                result = self.puller.pull(&self.directory) => result,
            };
            match result {
                Ok(()) => debug!("pulled {}", self.directory.display()),
                Err(e) => {
                    error!("{} pull {} error: {}", self.puller.name(), self.directory.display(), e);
                    return MirrorExit::Failed(e);
                }
            }
        }
    }

    /// Spawn the loop, or return `None` for directories that are not repositories
    pub fn spawn(self, cancel: CancellationToken) -> Option<JoinHandle<MirrorExit>> {
        if !Self::is_repository(&self.directory) {
            return None;
        }
        Some(tokio::spawn(self.run(cancel)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Puller that succeeds a fixed number of times, then fails
    pub(crate) struct MockPuller {
        pub pulls: AtomicUsize,
        pub fail_after: usize,
    }

    impl MockPuller {
        pub(crate) fn new(fail_after: usize) -> Self {
            MockPuller {
                pulls: AtomicUsize::new(0),
                fail_after,
            }
        }
    }

    #[async_trait]
    impl RepositoryPuller for MockPuller {
        async fn pull(&self, _directory: &Path) -> DocResult<()> {
            let count = self.pulls.fetch_add(1, Ordering::SeqCst) + 1;
            if count > self.fail_after {
                return Err(DocError::Pull("remote hung up".to_string()));
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn repository() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_not_a_repository() {
        let dir = TempDir::new().unwrap();
        let puller = Arc::new(MockPuller::new(usize::MAX));
        let mirror = RepositoryMirror::new(dir.path(), Duration::from_millis(1), puller.clone());
        assert_eq!(
            mirror.run(CancellationToken::new()).await,
            MirrorExit::NotARepository
        );
        assert_eq!(puller.pulls.load(Ordering::SeqCst), 0);

        let mirror = RepositoryMirror::new(dir.path(), Duration::from_millis(1), puller);
        assert!(mirror.spawn(CancellationToken::new()).is_none());
    }

    #[tokio::test]
    async fn test_stops_after_first_failure() {
        let dir = repository();
        let puller = Arc::new(MockPuller::new(2));
        let mirror = RepositoryMirror::new(dir.path(), Duration::from_millis(1), puller.clone());

        let exit = mirror.run(CancellationToken::new()).await;
        assert_eq!(exit, MirrorExit::Failed(DocError::Pull("remote hung up".to_string())));
        assert_eq!(puller.pulls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancellation_ends_loop() {
        let dir = repository();
        let puller = Arc::new(MockPuller::new(usize::MAX));
        let mirror = RepositoryMirror::new(dir.path(), Duration::from_secs(3600), puller.clone());
        let cancel = CancellationToken::new();

        let handle = mirror.spawn(cancel.clone()).unwrap();
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), MirrorExit::Cancelled);
        assert_eq!(puller.pulls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_git_puller_reports_failure() {
        let dir = TempDir::new().unwrap();
        let puller = GitPuller::new("false");
        let result = puller.pull(dir.path()).await;
        assert!(matches!(result, Err(DocError::Pull(_))));
    }
}
