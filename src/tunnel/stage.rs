use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StageError;
use crate::job::Job;
use crate::nest::NestRef;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// An ordered stage. The next stage starts only once `run` has returned.
///
/// Returning `Err` stops the chain and fails the job with the error's reason.
/// A stage may also call [`Job::fail`] itself; the chain stops after it
/// returns and the failure is not dispatched a second time.
#[async_trait]
pub trait SyncStage: Send + Sync {
    async fn run(&self, job: &mut Job, nest: &NestRef) -> Result<(), StageError>;
}

/// Adapts a plain closure into a [`SyncStage`].
pub(crate) struct FnStage<F>(pub(crate) F);

#[async_trait]
impl<F> SyncStage for FnStage<F>
where
    F: Fn(&mut Job, &NestRef) -> Result<(), StageError> + Send + Sync,
{
    async fn run(&self, job: &mut Job, nest: &NestRef) -> Result<(), StageError> {
        (self.0)(job, nest)
    }
}

/// An unordered stage: spawned with its own copy of the job.
pub(crate) type AsyncStage = Arc<dyn Fn(Job, NestRef) -> BoxFuture<Result<(), StageError>> + Send + Sync>;

pub(crate) fn async_stage<F, Fut>(f: F) -> AsyncStage
where
    F: Fn(Job, NestRef) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), StageError>> + Send + 'static,
{
    Arc::new(move |job, nest| Box::pin(f(job, nest)))
}
