//! Sources and sinks of jobs.
//!
//! Every nest variant embeds a [`NestCore`] carrying its identity, the
//! injected [`Environment`] and the single tunnel it is registered to. The
//! [`Nest`] trait is the capability surface tunnels drive.

mod folder;
mod memory;

pub use folder::FolderNest;
pub use memory::MemoryNest;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::environment::Environment;
use crate::error::NestError;
use crate::job::Job;
use crate::tunnel::{Tunnel, TunnelRef};

/// Identity of a nest as seen by jobs and stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NestRef {
    id: String,
    name: String,
}

impl NestRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Stand-in for jobs that reach a tunnel without ever passing through a nest.
    pub fn detached() -> Self {
        Self::new("", "detached")
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_detached(&self) -> bool {
        self.id.is_empty()
    }
}

/// State shared by all nest variants.
#[derive(Debug)]
pub struct NestCore {
    id: String,
    name: String,
    env: Environment,
    tunnel: Mutex<Option<TunnelRef>>,
}

impl NestCore {
    pub fn new(name: impl Into<String>, env: Environment) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            env,
            tunnel: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn to_ref(&self) -> NestRef {
        NestRef::new(self.id.clone(), self.name.clone())
    }

    pub(crate) fn actor(&self) -> String {
        format!("nest:{}", self.name)
    }

    /// The registered tunnel, if it is still alive.
    pub fn tunnel(&self) -> Option<Tunnel> {
        self.tunnel.lock().as_ref().and_then(TunnelRef::upgrade)
    }

    /// Binds this nest to `tunnel`. A nest has at most one tunnel.
    pub fn register(&self, tunnel: &Tunnel) -> Result<(), NestError> {
        let mut slot = self.tunnel.lock();
        if let Some(existing) = slot.as_ref().and_then(TunnelRef::upgrade) {
            if existing.same(tunnel) {
                return Ok(());
            }
            return Err(NestError::AlreadyRegistered {
                nest: self.name.clone(),
                tunnel: existing.name().to_owned(),
            });
        }
        *slot = Some(tunnel.downgrade());
        drop(slot);

        self.env.debug(
            format!("Nest \"{}\" registered to tunnel \"{}\"", self.name, tunnel.name()),
            &self.actor(),
        );
        Ok(())
    }

    /// Default arrival: stamp the job with this nest and its tunnel, then
    /// hand it over.
    pub async fn deliver(&self, mut job: Job) -> Result<(), NestError> {
        let tunnel = self
            .tunnel()
            .ok_or_else(|| NestError::Unregistered(self.name.clone()))?;
        let nest = self.to_ref();
        job.assign_nest(nest.clone());
        job.assign_tunnel(tunnel.downgrade());
        job.assign_env(self.env.clone());

        self.env.log(
            crate::environment::LogLevel::Info,
            format!("Job \"{}\" arrived in nest \"{}\"", job.name(), self.name),
            Some(&self.actor()),
            &[job.id()],
        );
        tunnel.arrive(job, nest).await;
        Ok(())
    }
}

/// Capability surface every nest variant implements.
///
/// `arrive` is not expected to be called concurrently with itself; variants
/// that observe inputs from background tasks serialize their own callbacks.
#[async_trait]
pub trait Nest: Send + Sync {
    fn core(&self) -> &NestCore;

    fn id(&self) -> &str {
        self.core().id()
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn to_ref(&self) -> NestRef {
        self.core().to_ref()
    }

    /// One-shot enumeration of inputs that already exist.
    async fn load(&self) -> Result<(), NestError>;

    /// Starts continuous monitoring.
    async fn watch(&self) -> Result<(), NestError>;

    fn register(&self, tunnel: &Tunnel) -> Result<(), NestError> {
        self.core().register(tunnel)
    }

    async fn arrive(&self, job: Job) -> Result<(), NestError> {
        self.core().deliver(job).await
    }

    /// Accepts a job being moved in. On success the job points at its new
    /// location; on error it is left untouched.
    async fn take(&self, _job: &mut Job) -> Result<(), NestError> {
        Err(NestError::NotASink(self.name().to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_ref_has_no_id() {
        let nest = NestRef::detached();
        assert!(nest.is_detached());
        assert_eq!(nest.name(), "detached");
    }

    #[tokio::test]
    async fn deliver_without_tunnel_is_unregistered() {
        let core = NestCore::new("inbox", Environment::default());
        let err = core.deliver(Job::webhook("x")).await.unwrap_err();
        assert!(matches!(err, NestError::Unregistered(name) if name == "inbox"));
    }

    #[test]
    fn register_is_exclusive() {
        let env = Environment::default();
        let core = NestCore::new("inbox", env.clone());
        let first = env.tunnel("first");
        let second = env.tunnel("second");

        core.register(&first).unwrap();
        core.register(&first).unwrap();
        let err = core.register(&second).unwrap_err();
        assert!(matches!(
            err,
            NestError::AlreadyRegistered { ref tunnel, .. } if tunnel == "first"
        ));
        assert!(core.tunnel().unwrap().same(&first));
    }
}
