use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Nest, NestCore};
use crate::environment::Environment;
use crate::error::NestError;
use crate::job::Job;

struct MemoryInner {
    core: NestCore,
    seeded: Mutex<Vec<Job>>,
    held: Mutex<Vec<Job>>,
}

/// An in-process nest.
///
/// Host code that receives work outside the crate (an HTTP handler, a queue
/// consumer) pushes jobs straight in. As a sink it simply holds what it
/// takes, which makes it a natural terminal nest.
#[derive(Clone)]
pub struct MemoryNest {
    inner: Arc<MemoryInner>,
}

impl std::fmt::Debug for MemoryNest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNest")
            .field("name", &self.inner.core.name())
            .field("held", &self.inner.held.lock().len())
            .finish()
    }
}

impl MemoryNest {
    pub fn new(name: impl Into<String>, env: Environment) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                core: NestCore::new(name, env),
                seeded: Mutex::new(Vec::new()),
                held: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Queues a job to be delivered by the next `load`.
    pub fn seed(&self, job: Job) {
        self.inner.seeded.lock().push(job);
    }

    /// Delivers a job right away.
    pub async fn push(&self, job: Job) -> Result<(), NestError> {
        self.inner.core.deliver(job).await
    }

    /// Jobs taken by this nest, oldest first.
    pub fn held(&self) -> Vec<Job> {
        self.inner.held.lock().clone()
    }
}

#[async_trait]
impl Nest for MemoryNest {
    fn core(&self) -> &NestCore {
        &self.inner.core
    }

    async fn load(&self) -> Result<(), NestError> {
        let seeded = std::mem::take(&mut *self.inner.seeded.lock());
        for job in seeded {
            self.inner.core.deliver(job).await?;
        }
        Ok(())
    }

    async fn watch(&self) -> Result<(), NestError> {
        Ok(())
    }

    async fn take(&self, job: &mut Job) -> Result<(), NestError> {
        self.inner.core.env().info(
            format!("Job \"{}\" taken", job.name()),
            &self.inner.core.actor(),
        );
        self.inner.held.lock().push(job.clone());
        Ok(())
    }
}
