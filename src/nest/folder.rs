use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::{Nest, NestCore};
use crate::environment::Environment;
use crate::error::NestError;
use crate::job::Job;

struct FolderInner {
    core: NestCore,
    dir: PathBuf,
    seen: Mutex<HashSet<PathBuf>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

/// A local directory acting as source and sink.
///
/// `load` delivers every entry already present, `watch` polls for new ones,
/// and `take` moves a job's backing file or folder into the directory.
/// Hidden entries (leading `.`) are ignored.
#[derive(Clone)]
pub struct FolderNest {
    inner: Arc<FolderInner>,
}

impl std::fmt::Debug for FolderNest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderNest")
            .field("name", &self.inner.core.name())
            .field("dir", &self.inner.dir)
            .finish()
    }
}

impl FolderNest {
    pub fn new(dir: &Path, env: Environment) -> Self {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        Self {
            inner: Arc::new(FolderInner {
                core: NestCore::new(name, env),
                dir: dir.to_path_buf(),
                seen: Mutex::new(HashSet::new()),
                poller: Mutex::new(None),
            }),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Stops the polling task started by `watch`, if any.
    pub fn stop(&self) {
        if let Some(handle) = self.inner.poller.lock().take() {
            handle.abort();
        }
    }
}

impl FolderInner {
    async fn entries(&self) -> Result<Vec<PathBuf>, NestError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !hidden {
                entries.push(entry.path());
            }
        }
        entries.sort();
        Ok(entries)
    }

    /// Delivers entries not delivered before, forgetting ones that vanished.
    ///
    /// An entry is remembered only once delivered, so one that fails here is
    /// retried on the next sweep.
    async fn sweep(&self) -> Result<usize, NestError> {
        let entries = self.entries().await?;
        let fresh: Vec<PathBuf> = {
            let mut seen = self.seen.lock();
            seen.retain(|p| entries.contains(p));
            entries.into_iter().filter(|p| !seen.contains(p)).collect()
        };

        let mut delivered = 0;
        for path in fresh {
            match self.deliver_entry(&path).await {
                Ok(()) => {
                    self.seen.lock().insert(path);
                    delivered += 1;
                }
                Err(err @ NestError::Unregistered(_)) => return Err(err),
                Err(err) => self.core.env().warning(
                    format!("Skipping {}: {err}", path.display()),
                    &self.core.actor(),
                ),
            }
        }
        Ok(delivered)
    }

    async fn deliver_entry(&self, path: &Path) -> Result<(), NestError> {
        let job = if path.is_dir() {
            Job::folder(path)?
        } else {
            Job::file(path)
        };
        self.core.deliver(job).await
    }
}

#[async_trait]
impl Nest for FolderNest {
    fn core(&self) -> &NestCore {
        &self.inner.core
    }

    async fn load(&self) -> Result<(), NestError> {
        let count = self.inner.sweep().await?;
        self.inner.core.env().debug(
            format!("Loaded {count} job(s) from {}", self.inner.dir.display()),
            &self.inner.core.actor(),
        );
        Ok(())
    }

    async fn watch(&self) -> Result<(), NestError> {
        let period = self.inner.core.env().options().poll_interval();
        {
            let mut poller = self.inner.poller.lock();
            if poller.is_some() {
                return Ok(());
            }
            let inner = Arc::clone(&self.inner);
            *poller = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                // The first tick completes immediately; `load` already covered it.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(err) = inner.sweep().await {
                        inner.core.env().warning(
                            format!("Polling {} failed: {err}", inner.dir.display()),
                            &inner.core.actor(),
                        );
                    }
                }
            }));
        }

        self.inner.core.env().debug(
            format!("Watching {} every {period:?}", self.inner.dir.display()),
            &self.inner.core.actor(),
        );
        Ok(())
    }

    async fn take(&self, job: &mut Job) -> Result<(), NestError> {
        let source = job
            .path()
            .map(Path::to_path_buf)
            .ok_or_else(|| NestError::NoBackingAsset(job.name().to_owned()))?;
        let dest = self.inner.dir.join(job.name());
        if tokio::fs::try_exists(&dest).await? {
            return Err(NestError::DestinationExists(dest.display().to_string()));
        }

        if let Err(err) = tokio::fs::rename(&source, &dest).await {
            // Cross-device moves of plain files fall back to copy + remove.
            if !source.is_file() {
                return Err(err.into());
            }
            tokio::fs::copy(&source, &dest).await?;
            tokio::fs::remove_file(&source).await?;
        }

        job.relocate(&dest);
        self.inner.core.env().info(
            format!("Job \"{}\" moved to {}", job.name(), dest.display()),
            &self.inner.core.actor(),
        );
        Ok(())
    }
}
