//! Named pipelines that watch nests and push arriving jobs through stages.
//!
//! A [`Tunnel`] is configured once, builder-style, before it starts
//! watching: `run_sync` stages run in order, `run` stages are spawned
//! without ordering, `match_jobs` correlates related arrivals and `fail`
//! registers the single failure handler.

pub mod matching;
mod stage;

pub use matching::{MatchEngine, MatchOutcome, ORPHAN_REASON};
pub use stage::{BoxFuture, SyncStage};

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};

use crate::environment::{Environment, LogLevel};
use crate::error::{StageError, TunnelError};
use crate::job::Job;
use crate::nest::{Nest, NestRef};
use matching::{MatchCallback, MatchState};
use stage::{AsyncStage, FnStage};

/// Failure reason for a stage that panicked.
pub const STAGE_PANICKED: &str = "Stage panicked";

pub type FailHandler = Arc<dyn Fn(Job, NestRef, &str) + Send + Sync>;

/// Coarse processing state, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// No nests watched yet.
    Idle,
    Watching,
    /// At least one arrival is running its stages.
    Processing,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelState::Idle => write!(f, "IDLE"),
            TunnelState::Watching => write!(f, "WATCHING"),
            TunnelState::Processing => write!(f, "PROCESSING"),
        }
    }
}

pub(crate) struct TunnelInner {
    name: String,
    env: Environment,
    sync_stages: RwLock<Vec<Arc<dyn SyncStage>>>,
    async_stages: RwLock<Vec<AsyncStage>>,
    fail_handler: RwLock<Option<FailHandler>>,
    nests: Mutex<Vec<Arc<dyn Nest>>>,
    matching: Mutex<Option<MatchState>>,
    arrivals: AtomicU64,
    in_flight: AtomicUsize,
}

/// Cheap-to-clone handle to a tunnel.
#[derive(Clone)]
pub struct Tunnel {
    inner: Arc<TunnelInner>,
}

/// Non-owning back-reference held by jobs and nests.
#[derive(Clone)]
pub struct TunnelRef {
    name: String,
    inner: Weak<TunnelInner>,
}

impl TunnelRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn upgrade(&self) -> Option<Tunnel> {
        self.inner.upgrade().map(|inner| Tunnel { inner })
    }
}

impl fmt::Debug for TunnelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TunnelRef").field(&self.name).finish()
    }
}

impl fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tunnel")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("arrivals", &self.arrivals())
            .finish()
    }
}

/// Decrements the in-flight counter when an arrival finishes, however it ends.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Tunnel {
    pub fn new(name: impl Into<String>, env: Environment) -> Self {
        Self {
            inner: Arc::new(TunnelInner {
                name: name.into(),
                env,
                sync_stages: RwLock::new(Vec::new()),
                async_stages: RwLock::new(Vec::new()),
                fail_handler: RwLock::new(None),
                nests: Mutex::new(Vec::new()),
                matching: Mutex::new(None),
                arrivals: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn env(&self) -> &Environment {
        &self.inner.env
    }

    pub fn downgrade(&self) -> TunnelRef {
        TunnelRef {
            name: self.inner.name.clone(),
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// True if both handles point at the same tunnel.
    pub fn same(&self, other: &Tunnel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of arrivals seen so far.
    pub fn arrivals(&self) -> u64 {
        self.inner.arrivals.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TunnelState {
        if self.inner.in_flight.load(Ordering::SeqCst) > 0 {
            TunnelState::Processing
        } else if self.inner.nests.lock().is_empty() {
            TunnelState::Idle
        } else {
            TunnelState::Watching
        }
    }

    /// Names of the nests this tunnel watches, in registration order.
    pub fn nests(&self) -> Vec<String> {
        self.inner
            .nests
            .lock()
            .iter()
            .map(|n| n.name().to_owned())
            .collect()
    }

    /// Jobs currently waiting for a correlating partner.
    pub fn pending_matches(&self) -> Vec<Job> {
        self.inner
            .matching
            .lock()
            .as_ref()
            .map(|m| m.engine.pending().to_vec())
            .unwrap_or_default()
    }

    fn actor(&self) -> String {
        format!("tunnel:{}", self.inner.name)
    }

    /// Registers on `nest`, loads what it already holds, starts watching it,
    /// then records it.
    pub async fn watch<N: Nest + 'static>(&self, nest: N) -> Result<(), TunnelError> {
        let nest: Arc<dyn Nest> = Arc::new(nest);
        nest.register(self)?;
        nest.load().await?;
        nest.watch().await?;

        self.inner.env.info(
            format!("Tunnel \"{}\" watching nest \"{}\"", self.inner.name, nest.name()),
            &self.actor(),
        );
        self.inner.nests.lock().push(nest);
        Ok(())
    }

    /// Adds an ordered stage built from a closure.
    pub fn run_sync<F>(&self, stage: F) -> &Self
    where
        F: Fn(&mut Job, &NestRef) -> Result<(), StageError> + Send + Sync + 'static,
    {
        self.run_sync_stage(FnStage(stage))
    }

    /// Adds an ordered stage that may await between steps.
    pub fn run_sync_stage<S: SyncStage + 'static>(&self, stage: S) -> &Self {
        self.inner.sync_stages.write().push(Arc::new(stage));
        self
    }

    /// Adds an unordered stage. Each arrival spawns it with a copy of the job.
    pub fn run<F, Fut>(&self, stage: F) -> &Self
    where
        F: Fn(Job, NestRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StageError>> + Send + 'static,
    {
        self.inner.async_stages.write().push(stage::async_stage(stage));
        self
    }

    /// Sets the failure handler. A tunnel has exactly one; setting another
    /// replaces it.
    pub fn fail<F>(&self, handler: F) -> &Self
    where
        F: Fn(Job, NestRef, &str) + Send + Sync + 'static,
    {
        let previous = self.inner.fail_handler.write().replace(Arc::new(handler));
        if previous.is_some() {
            self.inner.env.warning(
                format!("Tunnel \"{}\" failure handler replaced", self.inner.name),
                &self.actor(),
            );
        }
        self
    }

    /// Correlates arrivals whose names match `patterns` and share a base
    /// key, calling `callback` with each complete set. Jobs left unmatched
    /// for `orphan` after the latest arrival are failed.
    pub fn match_jobs<F>(&self, patterns: &[&str], orphan: Duration, callback: F) -> &Self
    where
        F: Fn(Vec<Job>) + Send + Sync + 'static,
    {
        let callback: MatchCallback = Arc::new(callback);
        let engine = MatchEngine::new(patterns.iter().copied());
        *self.inner.matching.lock() = Some(MatchState::new(engine, orphan, callback));
        self
    }

    /// Processes one job: ordered stages, then unordered stages, then
    /// matching. Stage errors end up in the failure handler, never here.
    pub async fn arrive(&self, mut job: Job, nest: NestRef) {
        let count = self.inner.arrivals.fetch_add(1, Ordering::SeqCst) + 1;
        job.assign_tunnel(self.downgrade());
        job.assign_nest(nest.clone());
        job.assign_env(self.inner.env.clone());
        job.clear_failure();

        self.inner.env.log(
            LogLevel::Info,
            format!(
                "Job \"{}\" arrived in tunnel \"{}\" (#{count})",
                job.name(),
                self.inner.name
            ),
            Some(&self.actor()),
            &[job.id()],
        );

        let _in_flight = InFlight::enter(&self.inner.in_flight);
        if !self.run_sync_stages(&mut job, &nest).await {
            return;
        }
        self.spawn_async_stages(&job, &nest);
        self.correlate(job);
    }

    /// Returns false if the chain was cut short by a failure.
    async fn run_sync_stages(&self, job: &mut Job, nest: &NestRef) -> bool {
        let stages = self.inner.sync_stages.read().clone();
        for (index, stage) in stages.iter().enumerate() {
            let result = AssertUnwindSafe(stage.run(job, nest))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(StageError::new(STAGE_PANICKED)));
            match result {
                Ok(()) if !job.is_failed() => continue,
                // The stage called `job.fail` itself; already dispatched.
                Ok(()) => {}
                Err(_) if job.is_failed() => {}
                Err(err) => {
                    job.mark_failed(&err.reason);
                    self.execute_fail(job.clone(), nest.clone(), &err.reason);
                }
            }
            self.inner.env.debug(
                format!(
                    "Stopped \"{}\" after stage {} of {}",
                    job.name(),
                    index + 1,
                    stages.len()
                ),
                &self.actor(),
            );
            return false;
        }
        true
    }

    fn spawn_async_stages(&self, job: &Job, nest: &NestRef) {
        let stages = self.inner.async_stages.read().clone();
        for stage in stages {
            let running = tokio::spawn(stage(job.clone(), nest.clone()));
            let tunnel = self.downgrade();
            let job = job.clone();
            let nest = nest.clone();
            tokio::spawn(async move {
                let reason = match running.await {
                    Ok(Ok(())) => return,
                    Ok(Err(err)) => err.reason,
                    Err(join) if join.is_panic() => STAGE_PANICKED.to_owned(),
                    Err(_) => return,
                };
                if let Some(tunnel) = tunnel.upgrade() {
                    let mut job = job;
                    job.mark_failed(&reason);
                    tunnel.execute_fail(job, nest, &reason);
                }
            });
        }
    }

    fn correlate(&self, job: Job) {
        let mut slot = self.inner.matching.lock();
        let Some(state) = slot.as_mut() else {
            return;
        };

        let name = job.name().to_owned();
        let outcome = state.engine.offer(job);
        let callback = Arc::clone(&state.callback);
        let timer = self.spawn_orphan_timer(state.orphan);
        state.rearm(timer);
        drop(slot);

        match outcome {
            MatchOutcome::Matched(jobs) => {
                let ids: Vec<&str> = jobs.iter().map(Job::id).collect();
                self.inner.env.log(
                    LogLevel::Info,
                    format!("Matched {} job(s) with \"{name}\"", jobs.len()),
                    Some(&self.actor()),
                    &ids,
                );
                callback(jobs);
            }
            MatchOutcome::Queued => {
                self.inner
                    .env
                    .debug(format!("\"{name}\" waiting for a match"), &self.actor());
            }
            MatchOutcome::Ignored => {
                self.inner
                    .env
                    .debug(format!("\"{name}\" fits no match pattern"), &self.actor());
            }
        }
    }

    fn spawn_orphan_timer(&self, orphan: Duration) -> tokio::task::JoinHandle<()> {
        let tunnel = self.downgrade();
        tokio::spawn(async move {
            tokio::time::sleep(orphan).await;
            if let Some(tunnel) = tunnel.upgrade() {
                tunnel.evict_orphans();
            }
        })
    }

    fn evict_orphans(&self) {
        let orphans = match self.inner.matching.lock().as_mut() {
            Some(state) => state.engine.drain(),
            None => return,
        };
        if orphans.is_empty() {
            return;
        }

        self.inner.env.warning(
            format!("Failing {} orphaned job(s)", orphans.len()),
            &self.actor(),
        );
        for mut job in orphans {
            if let Err(err) = job.fail(ORPHAN_REASON) {
                self.inner.env.error(err.to_string(), &self.actor());
            }
        }
    }

    /// Logs the failure and hands the job to the failure handler.
    pub fn execute_fail(&self, job: Job, nest: NestRef, reason: &str) {
        self.inner.env.log(
            LogLevel::Error,
            format!(
                "Job \"{}\" failed in tunnel \"{}\" (nest \"{}\"): {reason}",
                job.name(),
                self.inner.name,
                nest.name()
            ),
            Some(&self.actor()),
            &[job.id()],
        );

        let handler = self.inner.fail_handler.read().clone();
        match handler {
            Some(handler) => handler(job, nest, reason),
            None => self.inner.env.error(
                format!(
                    "Tunnel \"{}\" has no failure handler; \"{}\" dropped",
                    self.inner.name,
                    job.name()
                ),
                &self.actor(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MemorySink;
    use crate::config::Options;
    use tokio::sync::mpsc;

    fn env_with_sink() -> (Environment, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let options = Options {
            log_level: LogLevel::Debug,
            ..Default::default()
        };
        (Environment::with_sink(options, sink.clone()), sink)
    }

    #[tokio::test]
    async fn sync_stages_run_in_registration_order() {
        let env = Environment::default();
        let tunnel = env.tunnel("ordered");
        let log = Arc::new(Mutex::new(Vec::new()));
        for marker in 1..=3 {
            let log = Arc::clone(&log);
            tunnel.run_sync(move |_job, _nest| {
                log.lock().push(marker);
                Ok(())
            });
        }

        for _ in 0..3 {
            tunnel.arrive(Job::webhook("j"), NestRef::detached()).await;
        }
        assert_eq!(*log.lock(), vec![1, 2, 3, 1, 2, 3, 1, 2, 3]);
        assert_eq!(tunnel.arrivals(), 3);
    }

    #[tokio::test]
    async fn failing_stage_short_circuits_chain() {
        let env = Environment::default();
        let tunnel = env.tunnel("short");
        let third_ran = Arc::new(Mutex::new(false));
        let failures = Arc::new(Mutex::new(Vec::new()));

        tunnel.run_sync(|_job, _nest| Ok(()));
        tunnel.run_sync(|_job, _nest| Err(StageError::new("bad header")));
        {
            let third_ran = Arc::clone(&third_ran);
            tunnel.run_sync(move |_job, _nest| {
                *third_ran.lock() = true;
                Ok(())
            });
        }
        {
            let failures = Arc::clone(&failures);
            tunnel.fail(move |job, _nest, reason| {
                failures.lock().push((job.name().to_owned(), reason.to_owned()));
            });
        }

        tunnel.arrive(Job::webhook("bad.csv"), NestRef::detached()).await;
        assert!(!*third_ran.lock());
        assert_eq!(
            *failures.lock(),
            vec![("bad.csv".to_owned(), "bad header".to_owned())]
        );
    }

    #[tokio::test]
    async fn job_fail_inside_stage_dispatches_once() {
        let env = Environment::default();
        let tunnel = env.tunnel("self-fail");
        let calls = Arc::new(AtomicUsize::new(0));
        let later = Arc::new(AtomicUsize::new(0));

        tunnel.run_sync(|job, _nest| {
            job.fail("rejected").map_err(StageError::from)?;
            Err(StageError::new("rejected"))
        });
        {
            let later = Arc::clone(&later);
            tunnel.run_sync(move |_job, _nest| {
                later.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        {
            let calls = Arc::clone(&calls);
            tunnel.fail(move |_job, _nest, reason| {
                assert_eq!(reason, "rejected");
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        tunnel.arrive(Job::webhook("x"), NestRef::detached()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panicking_sync_stage_fails_job_once() {
        let env = Environment::default();
        let tunnel = env.tunnel("fragile");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let later = Arc::new(AtomicUsize::new(0));

        tunnel.run_sync(|_job, _nest| panic!("boom"));
        {
            let later = Arc::clone(&later);
            tunnel.run_sync(move |_job, _nest| {
                later.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        {
            let calls = Arc::clone(&calls);
            tunnel.fail(move |job, _nest, reason| {
                calls.lock().push((job.name().to_owned(), reason.to_owned()));
            });
        }

        let arrival = {
            let tunnel = tunnel.clone();
            tokio::spawn(async move { tunnel.arrive(Job::webhook("x"), NestRef::detached()).await })
        };
        assert!(arrival.await.is_ok());
        assert_eq!(
            *calls.lock(),
            vec![("x".to_owned(), STAGE_PANICKED.to_owned())]
        );
        assert_eq!(later.load(Ordering::SeqCst), 0);
        assert_eq!(tunnel.state(), TunnelState::Idle);
    }

    #[tokio::test]
    async fn missing_failure_handler_is_logged() {
        let (env, sink) = env_with_sink();
        let tunnel = env.tunnel("bare");
        tunnel.run_sync(|_job, _nest| Err("nope".into()));
        tunnel.arrive(Job::webhook("x"), NestRef::detached()).await;
        assert!(sink.contains(LogLevel::Error, "has no failure handler"));
    }

    #[tokio::test]
    async fn async_stage_errors_are_isolated() {
        let env = Environment::default();
        let tunnel = env.tunnel("fanout");
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let (fail_tx, mut fail_rx) = mpsc::unbounded_channel();

        tunnel.run(|_job, _nest| async { Err::<(), _>(StageError::new("upload refused")) });
        tunnel.run(move |job, _nest| {
            let done_tx = done_tx.clone();
            async move {
                done_tx.send(job.name().to_owned()).ok();
                Ok(())
            }
        });
        tunnel.fail(move |job, _nest, reason| {
            fail_tx.send((job.name().to_owned(), reason.to_owned())).ok();
        });

        tunnel.arrive(Job::webhook("doc.pdf"), NestRef::detached()).await;

        assert_eq!(done_rx.recv().await.as_deref(), Some("doc.pdf"));
        assert_eq!(
            fail_rx.recv().await,
            Some(("doc.pdf".to_owned(), "upload refused".to_owned()))
        );
    }

    #[tokio::test]
    async fn panicking_async_stage_is_reported() {
        let env = Environment::default();
        let tunnel = env.tunnel("panicky");
        let (fail_tx, mut fail_rx) = mpsc::unbounded_channel();
        tunnel.run(|_job, _nest| async {
            if true {
                panic!("boom");
            }
            Ok(())
        });
        tunnel.fail(move |_job, _nest, reason| {
            fail_tx.send(reason.to_owned()).ok();
        });

        tunnel.arrive(Job::webhook("x"), NestRef::detached()).await;
        assert_eq!(fail_rx.recv().await.as_deref(), Some(STAGE_PANICKED));
    }

    #[tokio::test]
    async fn watch_loads_and_records_nest() {
        let env = Environment::default();
        let tunnel = env.tunnel("hooks");
        let nest = env.memory_nest("inbox");
        nest.seed(Job::webhook("seeded"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            tunnel.run_sync(move |job, nest| {
                seen.lock().push((job.name().to_owned(), nest.name().to_owned()));
                Ok(())
            });
        }

        assert_eq!(tunnel.state(), TunnelState::Idle);
        tunnel.watch(nest.clone()).await.unwrap();
        assert_eq!(tunnel.state(), TunnelState::Watching);
        assert_eq!(tunnel.nests(), vec!["inbox"]);

        nest.push(Job::webhook("pushed")).await.unwrap();
        assert_eq!(
            *seen.lock(),
            vec![
                ("seeded".to_owned(), "inbox".to_owned()),
                ("pushed".to_owned(), "inbox".to_owned())
            ]
        );
    }

    #[tokio::test]
    async fn nest_cannot_serve_two_tunnels() {
        let env = Environment::default();
        let nest = env.memory_nest("shared");
        env.tunnel("a").watch(nest.clone()).await.unwrap();
        let err = env.tunnel("b").watch(nest).await.unwrap_err();
        assert!(matches!(err, TunnelError::Nest(_)));
    }

    #[tokio::test]
    async fn transfer_reroutes_and_records() {
        let env = Environment::default();
        let first = env.tunnel("first");
        let second = env.tunnel("second");
        let (tx, mut rx) = mpsc::unbounded_channel();
        second.run_sync(move |job, _nest| {
            tx.send(job.clone()).ok();
            Ok(())
        });

        let mut job = Job::webhook("moving");
        job.assign_tunnel(first.downgrade());
        job.transfer(&second).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.tunnel_name(), Some("second"));
        let last = received.life_cycle().last().unwrap();
        assert_eq!(last.statement(), "transfer from first to second");
        assert_eq!(received.life_cycle().len(), 2);
    }

    #[tokio::test]
    async fn failed_job_can_be_transferred_and_processed() {
        let env = Environment::default();
        let main = env.tunnel("main");
        let errors = env.tunnel("errors");
        let (tx, mut rx) = mpsc::unbounded_channel();
        errors.run_sync(move |job, _nest| {
            tx.send(job.name().to_owned()).ok();
            Ok(())
        });
        main.run_sync(|_job, _nest| Err("broken".into()));
        {
            let errors = errors.clone();
            main.fail(move |job, _nest, _reason| {
                let errors = errors.clone();
                tokio::spawn(async move { job.transfer(&errors).await });
            });
        }

        main.arrive(Job::webhook("x"), NestRef::detached()).await;
        assert_eq!(rx.recv().await.as_deref(), Some("x"));
    }

    #[tokio::test(start_paused = true)]
    async fn matched_pair_reaches_callback() {
        let env = Environment::default();
        let tunnel = env.tunnel("invoices");
        let (tx, mut rx) = mpsc::unbounded_channel();
        tunnel.match_jobs(&["*.pdf", "*.xml"], Duration::from_secs(60), move |jobs| {
            let names: Vec<String> = jobs.iter().map(|j| j.name().to_owned()).collect();
            tx.send(names).ok();
        });

        tunnel.arrive(Job::webhook("invoice-001.pdf"), NestRef::detached()).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        tunnel.arrive(Job::webhook("invoice-001.xml"), NestRef::detached()).await;

        assert_eq!(
            rx.recv().await.unwrap(),
            vec!["invoice-001.pdf", "invoice-001.xml"]
        );
        assert!(tunnel.pending_matches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn orphan_timeout_fails_queued_jobs() {
        let env = Environment::default();
        let tunnel = env.tunnel("invoices");
        let (match_tx, mut match_rx) = mpsc::unbounded_channel::<Vec<Job>>();
        let (fail_tx, mut fail_rx) = mpsc::unbounded_channel();
        tunnel.match_jobs(&["*.pdf", "*.xml"], Duration::from_secs(60), move |jobs| {
            match_tx.send(jobs).ok();
        });
        tunnel.fail(move |job, _nest, reason| {
            fail_tx.send((job.name().to_owned(), reason.to_owned())).ok();
        });

        tunnel.arrive(Job::webhook("invoice-001.pdf"), NestRef::detached()).await;
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(
            fail_rx.recv().await,
            Some(("invoice-001.pdf".to_owned(), ORPHAN_REASON.to_owned()))
        );
        assert!(tunnel.pending_matches().is_empty());

        // The late partner finds an empty queue and waits alone.
        tunnel.arrive(Job::webhook("invoice-001.xml"), NestRef::detached()).await;
        let pending = tunnel.pending_matches();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name(), "invoice-001.xml");
        assert!(match_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn arrivals_rearm_shared_orphan_timer() {
        let env = Environment::default();
        let tunnel = env.tunnel("shared-timer");
        let failures = Arc::new(AtomicUsize::new(0));
        tunnel.match_jobs(&["*.pdf", "*.xml"], Duration::from_secs(60), |_jobs| {});
        {
            let failures = Arc::clone(&failures);
            tunnel.fail(move |_job, _nest, _reason| {
                failures.fetch_add(1, Ordering::SeqCst);
            });
        }

        tunnel.arrive(Job::webhook("a.pdf"), NestRef::detached()).await;
        tokio::time::sleep(Duration::from_secs(45)).await;
        // Unrelated traffic pushes the deadline out for `a.pdf` too.
        tunnel.arrive(Job::webhook("b.pdf"), NestRef::detached()).await;
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(failures.load(Ordering::SeqCst), 0);
        assert_eq!(tunnel.pending_matches().len(), 2);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(failures.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn arrival_is_logged_with_job_id() {
        let (env, sink) = env_with_sink();
        let tunnel = env.tunnel("logged");
        let job = Job::webhook("x");
        let id = job.id().to_owned();
        tunnel.arrive(job, NestRef::detached()).await;
        let records = sink.records();
        let arrival = records
            .iter()
            .find(|r| r.message.contains("arrived in tunnel"))
            .unwrap();
        assert_eq!(arrival.related, vec![id]);
        assert_eq!(arrival.actor.as_deref(), Some("tunnel:logged"));
    }
}
