//! Correlation of independently arriving jobs.
//!
//! Jobs whose names share a base key (the name cut at the first occurrence
//! of the matching pattern's literal part) are delivered together. Unpaired
//! jobs wait in an insertion-ordered queue until a partner arrives or the
//! tunnel's orphan timer evicts them.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::glob::Pattern;
use crate::job::Job;

pub const ORPHAN_REASON: &str = "Orphan timeout.";

pub type MatchCallback = Arc<dyn Fn(Vec<Job>) + Send + Sync>;

#[derive(Debug)]
pub enum MatchOutcome {
    /// Queued partners in the order they were pulled, then the arriving job.
    Matched(Vec<Job>),
    Queued,
    /// The job's name fits none of the patterns.
    Ignored,
}

#[derive(Debug, Default)]
pub struct MatchEngine {
    patterns: Vec<Pattern>,
    queue: Vec<Job>,
}

impl MatchEngine {
    pub fn new<I, P>(patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Pattern>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            queue: Vec::new(),
        }
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Base key of `name` under the first pattern it matches.
    pub fn base_key(&self, name: &str) -> Option<String> {
        let pattern = self.patterns.iter().find(|p| p.matches(name))?;
        let literal = pattern.literal();
        let key = match name.find(literal.as_str()) {
            Some(at) if !literal.is_empty() => &name[..at],
            _ => name,
        };
        Some(key.to_owned())
    }

    pub fn offer(&mut self, job: Job) -> MatchOutcome {
        let Some(key) = self.base_key(job.name()) else {
            return MatchOutcome::Ignored;
        };

        // Most recent first.
        let mut matched = Vec::new();
        let mut i = self.queue.len();
        while i > 0 {
            i -= 1;
            if self.base_key(self.queue[i].name()).as_deref() == Some(key.as_str()) {
                matched.push(self.queue.remove(i));
            }
        }

        if matched.is_empty() {
            self.queue.push(job);
            MatchOutcome::Queued
        } else {
            matched.push(job);
            MatchOutcome::Matched(matched)
        }
    }

    pub fn pending(&self) -> &[Job] {
        &self.queue
    }

    pub fn drain(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.queue)
    }
}

/// Per-tunnel matching configuration plus the shared orphan timer.
pub(crate) struct MatchState {
    pub(crate) engine: MatchEngine,
    pub(crate) orphan: Duration,
    pub(crate) callback: MatchCallback,
    pub(crate) timer: Option<JoinHandle<()>>,
}

impl MatchState {
    pub(crate) fn new(engine: MatchEngine, orphan: Duration, callback: MatchCallback) -> Self {
        Self {
            engine,
            orphan,
            callback,
            timer: None,
        }
    }

    /// Replaces the pending deadline, if any, with `timer`.
    pub(crate) fn rearm(&mut self, timer: JoinHandle<()>) {
        if let Some(old) = self.timer.replace(timer) {
            old.abort();
        }
    }
}

impl Drop for MatchState {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(jobs: &[Job]) -> Vec<&str> {
        jobs.iter().map(Job::name).collect()
    }

    #[test]
    fn base_key_cuts_at_literal() {
        let engine = MatchEngine::new(["*.pdf", "*.xml"]);
        assert_eq!(engine.base_key("invoice-001.pdf").as_deref(), Some("invoice-001"));
        assert_eq!(engine.base_key("invoice-001.xml").as_deref(), Some("invoice-001"));
        assert_eq!(engine.base_key("report.v2.pdf").as_deref(), Some("report.v2"));
        assert_eq!(engine.base_key("notes.txt"), None);
    }

    #[test]
    fn catch_all_pattern_keys_on_whole_name() {
        let engine = MatchEngine::new(["*"]);
        assert_eq!(engine.base_key("a.txt").as_deref(), Some("a.txt"));
    }

    #[test]
    fn pairs_are_delivered_together() {
        let mut engine = MatchEngine::new(["*.pdf", "*.xml"]);
        assert!(matches!(engine.offer(Job::webhook("invoice-001.pdf")), MatchOutcome::Queued));
        match engine.offer(Job::webhook("invoice-001.xml")) {
            MatchOutcome::Matched(jobs) => {
                assert_eq!(names(&jobs), vec!["invoice-001.pdf", "invoice-001.xml"]);
            }
            other => panic!("expected a match, got {other:?}"),
        }
        assert!(engine.pending().is_empty());
    }

    #[test]
    fn unrelated_jobs_stay_queued() {
        let mut engine = MatchEngine::new(["*.pdf", "*.xml"]);
        engine.offer(Job::webhook("invoice-001.pdf"));
        assert!(matches!(engine.offer(Job::webhook("invoice-002.xml")), MatchOutcome::Queued));
        assert_eq!(names(engine.pending()), vec!["invoice-001.pdf", "invoice-002.xml"]);
    }

    #[test]
    fn non_matching_names_are_ignored() {
        let mut engine = MatchEngine::new(["*.pdf"]);
        assert!(matches!(engine.offer(Job::webhook("readme.md")), MatchOutcome::Ignored));
        assert!(engine.pending().is_empty());
    }

    #[test]
    fn matched_set_ends_with_arrival() {
        let mut engine = MatchEngine::new(["*.pdf", "*.xml", "*.png"]);
        let first = Job::webhook("scan.pdf");
        let second = Job::webhook("scan.png");
        let (first_id, second_id) = (first.id().to_owned(), second.id().to_owned());
        engine.offer(first);
        // Same key, so the second arrival already matches the first.
        match engine.offer(second) {
            MatchOutcome::Matched(jobs) => {
                assert_eq!(jobs[0].id(), first_id);
                assert_eq!(jobs[1].id(), second_id);
            }
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn lifo_order_when_several_wait() {
        let mut engine = MatchEngine::new(["*.a", "*.b"]);
        // Different keys under the first pattern keep both queued...
        engine.offer(Job::webhook("x.a"));
        engine.offer(Job::webhook("y.a"));
        // ...then a queue holding two same-key jobs pulls the newer one first.
        engine.queue.push(Job::webhook("x.b"));
        match engine.offer(Job::webhook("x.a")) {
            MatchOutcome::Matched(jobs) => {
                assert_eq!(names(&jobs), vec!["x.b", "x.a", "x.a"]);
            }
            other => panic!("expected a match, got {other:?}"),
        }
        assert_eq!(names(engine.pending()), vec!["y.a"]);
    }

    #[test]
    fn drain_empties_queue() {
        let mut engine = MatchEngine::new(["*.pdf"]);
        engine.offer(Job::webhook("a.pdf"));
        engine.offer(Job::webhook("b.pdf"));
        assert_eq!(engine.drain().len(), 2);
        assert!(engine.pending().is_empty());
    }
}
