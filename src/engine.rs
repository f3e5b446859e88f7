//! Probe engine
//!
//! Runs an ordered list of [`Check`]s against a [`TargetSet`] and
//! collects one [`CheckResult`] per check. The engine is the recovery
//! point for every check: errors and panics become `failed` results and
//! never reach the caller of [`ProbeEngine::run`].
//!
//! ```text
//!   register(check) ...        Created
//!       |
//!   run(targets, deadline)     Running   (sequential, or lanes in parallel)
//!       |
//!   ProbeReport                Complete  (registration order)
//! ```

use crate::config::ProbeConfig;
use crate::error::{Error, FailureKind, Result};
use crate::report::{CheckResult, DEADLINE_EXCEEDED, Outcome, ProbeReport};
use crate::target::TargetSet;
use async_trait::async_trait;
use chrono::Utc;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Upper bound on lanes running at once in concurrent mode.
const MAX_CONCURRENT_LANES: usize = 16;

/// What a check sees while it runs.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub targets: &'a TargetSet,
    pub config: &'a ProbeConfig,
}

impl CheckContext<'_> {
    /// The per-check I/O bound.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.config.timeout
    }
}

/// A named, independently runnable unit of diagnostic work.
///
/// Checks hold no per-run state; anything they open must be closed
/// before `run` returns.
#[async_trait]
pub trait Check: Send + Sync {
    /// Unique identifier within an engine.
    fn id(&self) -> &str;

    /// Name of the target in the [`TargetSet`] this check inspects.
    fn target(&self) -> &str;

    /// Checks sharing a group run one after another in registration
    /// order, even in concurrent mode.
    fn group(&self) -> Option<&str> {
        None
    }

    /// Perform the check once.
    ///
    /// # Errors
    ///
    /// Any error is recorded by the engine as a failed result with the
    /// error's [`FailureKind`].
    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Outcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Sequential,
    /// Independent checks overlap; grouped checks keep their order.
    Concurrent,
}

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Created,
    Running,
    Complete,
}

/// Ordered set of checks plus the settings they run with.
pub struct ProbeEngine {
    config: ProbeConfig,
    checks: Vec<Arc<dyn Check>>,
    ids: HashSet<String>,
}

impl ProbeEngine {
    #[must_use]
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            checks: Vec::new(),
            ids: HashSet::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Add a check to the end of the run list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateCheck`] if a check with the same id is
    /// already registered.
    pub fn register<C: Check + 'static>(&mut self, check: C) -> Result<&mut Self> {
        self.register_arc(Arc::new(check))
    }

    /// Add a shared check to the end of the run list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateCheck`] if the id is already registered.
    pub fn register_arc(&mut self, check: Arc<dyn Check>) -> Result<&mut Self> {
        if !self.ids.insert(check.id().to_string()) {
            return Err(Error::DuplicateCheck(check.id().to_string()));
        }
        debug!("Registered check {}", check.id());
        self.checks.push(check);
        Ok(self)
    }

    /// Register several checks in order, stopping at the first duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateCheck`] for the first id already taken;
    /// checks before it stay registered.
    pub fn register_all(
        &mut self,
        checks: impl IntoIterator<Item = Arc<dyn Check>>,
    ) -> Result<&mut Self> {
        for check in checks {
            self.register_arc(check)?;
        }
        Ok(self)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Registered check ids, in run order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(|c| c.id())
    }

    /// Run every registered check once using the configured deadline.
    pub async fn run(&self, targets: &TargetSet) -> ProbeReport {
        self.run_with_deadline(targets, self.config.deadline).await
    }

    /// Run every registered check once.
    ///
    /// Once `deadline` has elapsed since the start of the run, checks
    /// that have not started are recorded as skipped. A check already in
    /// progress is left to finish under its own timeout.
    pub async fn run_with_deadline(
        &self,
        targets: &TargetSet,
        deadline: Option<Duration>,
    ) -> ProbeReport {
        Run::new(self, targets, deadline).execute().await
    }
}

/// One pass over the engine's checks. Consumed by [`Run::execute`], so
/// a completed run cannot be resumed.
struct Run<'a> {
    engine: &'a ProbeEngine,
    targets: &'a TargetSet,
    deadline: Option<Instant>,
    phase: RunPhase,
}

impl<'a> Run<'a> {
    fn new(engine: &'a ProbeEngine, targets: &'a TargetSet, deadline: Option<Duration>) -> Self {
        Self {
            engine,
            targets,
            deadline: deadline.map(|d| Instant::now() + d),
            phase: RunPhase::Created,
        }
    }

    fn advance(&mut self, next: RunPhase) {
        debug!("Probe run {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    async fn execute(mut self) -> ProbeReport {
        let started_at = Utc::now();
        let start = Instant::now();
        self.advance(RunPhase::Running);
        info!(
            "Running {} checks ({:?})",
            self.engine.checks.len(),
            self.engine.config.mode
        );

        let ctx = CheckContext {
            targets: self.targets,
            config: &self.engine.config,
        };
        let secrets = self.targets.secrets();

        let results = match self.engine.config.mode {
            RunMode::Sequential => self.run_sequential(&ctx, &secrets).await,
            RunMode::Concurrent => self.run_concurrent(&ctx, &secrets).await,
        };

        self.advance(RunPhase::Complete);
        let report = ProbeReport {
            started_at,
            elapsed: start.elapsed(),
            targets: self.targets.summaries(),
            results,
        };
        info!(
            "Probe run complete: {} ok, {} failed, {} skipped",
            report.count(crate::report::Status::Ok),
            report.count(crate::report::Status::Failed),
            report.count(crate::report::Status::Skipped),
        );
        report
    }

    async fn run_sequential(&self, ctx: &CheckContext<'_>, secrets: &[&str]) -> Vec<CheckResult> {
        let mut results = Vec::with_capacity(self.engine.checks.len());
        for check in &self.engine.checks {
            results.push(run_one(check.as_ref(), ctx, self.deadline, secrets).await);
        }
        results
    }

    /// Run lanes in parallel and restore registration order afterwards.
    ///
    /// A lane is either one ungrouped check or every check of one group;
    /// checks inside a lane run sequentially.
    async fn run_concurrent(&self, ctx: &CheckContext<'_>, secrets: &[&str]) -> Vec<CheckResult> {
        let lanes = lanes(&self.engine.checks);
        let deadline = self.deadline;

        let mut indexed: Vec<(usize, CheckResult)> = futures::stream::iter(lanes)
            .map(|lane| async move {
                let mut out = Vec::with_capacity(lane.len());
                for index in lane {
                    let check = self.engine.checks[index].as_ref();
                    out.push((index, run_one(check, ctx, deadline, secrets).await));
                }
                out
            })
            .buffer_unordered(MAX_CONCURRENT_LANES)
            .flat_map(futures::stream::iter)
            .collect()
            .await;

        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, result)| result).collect()
    }
}

/// Partition check indices into lanes, preserving registration order
/// within each lane and ordering lanes by their first check.
fn lanes(checks: &[Arc<dyn Check>]) -> Vec<Vec<usize>> {
    let mut lanes: Vec<Vec<usize>> = Vec::new();
    let mut group_lane: Vec<(&str, usize)> = Vec::new();
    for (index, check) in checks.iter().enumerate() {
        match check.group() {
            Some(group) => {
                if let Some((_, lane)) = group_lane.iter().find(|(g, _)| *g == group) {
                    lanes[*lane].push(index);
                } else {
                    group_lane.push((group, lanes.len()));
                    lanes.push(vec![index]);
                }
            }
            None => lanes.push(vec![index]),
        }
    }
    lanes
}

/// Run one check at its boundary: honour the deadline, time it, convert
/// errors and panics into failed outcomes, and scrub secrets.
async fn run_one(
    check: &dyn Check,
    ctx: &CheckContext<'_>,
    deadline: Option<Instant>,
    secrets: &[&str],
) -> CheckResult {
    if deadline.is_some_and(|d| Instant::now() >= d) {
        debug!("Skipping {}: deadline exceeded", check.id());
        return CheckResult::new(
            check.id(),
            check.target(),
            Outcome::skipped(DEADLINE_EXCEEDED),
            Duration::ZERO,
        );
    }

    debug!("Running check {} against {}", check.id(), check.target());
    let start = Instant::now();
    let outcome = match AssertUnwindSafe(check.run(ctx)).catch_unwind().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!("Check {} failed: {}", check.id(), e.kind());
            Outcome::from(&e)
        }
        Err(panic) => {
            warn!("Check {} panicked", check.id());
            Outcome::failed(
                FailureKind::Internal,
                format!("check panicked: {}", panic_message(panic.as_ref())),
            )
        }
    };

    CheckResult::new(check.id(), check.target(), outcome, start.elapsed()).scrubbed(secrets)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
