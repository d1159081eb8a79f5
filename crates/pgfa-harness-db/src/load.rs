//! Connection-saturation load generator.
//!
//! Launches one thread per worker. Each worker opens its own tagged
//! connection, waits on a shared [`StartGate`] (bounded by `gate_timeout`),
//! then runs a blocking hold statement. The gate opens `grace` after launch
//! so that connection setup finishes before any worker starts holding.
//!
//! Workers never share a connection and never talk to each other; the only
//! coordination is the gate and whatever the server makes visible. A worker
//! failure (connect error, gate timeout, hold error, panic) is recorded in
//! its [`WorkerOutcome`] and never propagates.

use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use pgfa_harness_core::HarnessConfig;
use serde::Serialize;

use crate::connection::{ConnectOptions, DbConnection, connect};
use crate::error::DbResult;

// ---------------------------------------------------------------------------
// Start gate
// ---------------------------------------------------------------------------

/// Single-use rendezvous: closed until [`open`](Self::open), then open forever.
#[derive(Debug, Default)]
pub struct StartGate {
    opened: Mutex<bool>,
    signal: Condvar,
}

impl StartGate {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            opened: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    pub fn open(&self) {
        let mut opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner);
        *opened = true;
        drop(opened);
        self.signal.notify_all();
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.opened.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the gate opens or `timeout` elapses. Returns whether the
    /// gate was open.
    #[allow(clippy::significant_drop_tightening)] // guard is consumed by wait_timeout_while
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.opened.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .signal
            .wait_timeout_while(guard, timeout, |opened| !*opened)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

/// One unit of concurrent work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadWorker {
    pub id: usize,
    /// `application_name` used to find the session in `pg_stat_activity`.
    pub tag: String,
    #[serde(with = "duration_secs")]
    pub hold: Duration,
}

impl LoadWorker {
    #[must_use]
    pub fn new(id: usize, tag_prefix: &str, hold: Duration) -> Self {
        Self {
            id,
            tag: format!("{tag_prefix}{id}"),
            hold,
        }
    }
}

/// Why a worker did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerFailure {
    /// The OS refused to start the worker thread.
    Spawn,
    /// Opening the tagged connection failed.
    Connect,
    /// The gate did not open within `gate_timeout`; the hold never ran.
    GateTimeout,
    /// The hold statement failed.
    Hold,
    /// The worker thread panicked.
    Panicked,
}

/// Terminal outcome of one worker: success or a single failure reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerOutcome {
    pub worker_id: usize,
    pub tag: String,
    pub failure: Option<WorkerFailure>,
}

impl WorkerOutcome {
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    fn new(worker: &LoadWorker, failure: Option<WorkerFailure>) -> Self {
        Self {
            worker_id: worker.id,
            tag: worker.tag.clone(),
            failure,
        }
    }
}

/// How workers connect and hold. Implemented for PostgreSQL by
/// [`PgWorkerBackend`]; tests substitute in-process fakes.
pub trait WorkerBackend: Sync {
    type Session;

    fn open(&self, worker: &LoadWorker) -> DbResult<Self::Session>;

    /// Block for `worker.hold` while counting as an active session.
    fn hold(&self, session: &mut Self::Session, worker: &LoadWorker) -> DbResult<()>;
}

/// Tagged PostgreSQL sessions running `pg_sleep`.
#[derive(Debug, Clone, Copy)]
pub struct PgWorkerBackend<'a> {
    config: &'a HarnessConfig,
}

impl<'a> PgWorkerBackend<'a> {
    #[must_use]
    pub const fn new(config: &'a HarnessConfig) -> Self {
        Self { config }
    }
}

impl WorkerBackend for PgWorkerBackend<'_> {
    type Session = DbConnection;

    fn open(&self, worker: &LoadWorker) -> DbResult<DbConnection> {
        connect(self.config, &ConnectOptions::new().tagged(worker.tag.clone()))
    }

    fn hold(&self, session: &mut DbConnection, worker: &LoadWorker) -> DbResult<()> {
        session.execute("SELECT pg_sleep($1)", &[&worker.hold.as_secs_f64()])?;
        Ok(())
    }
}

fn run_worker<B: WorkerBackend>(
    backend: &B,
    worker: &LoadWorker,
    gate: &StartGate,
    gate_timeout: Duration,
) -> WorkerOutcome {
    let failure = match backend.open(worker) {
        Err(e) => {
            tracing::debug!(worker = %worker.tag, error = %e, "worker connect failed");
            Some(WorkerFailure::Connect)
        }
        Ok(mut session) => {
            if !gate.wait(gate_timeout) {
                tracing::debug!(worker = %worker.tag, "worker gave up waiting for start gate");
                Some(WorkerFailure::GateTimeout)
            } else if let Err(e) = backend.hold(&mut session, worker) {
                tracing::debug!(worker = %worker.tag, error = %e, "worker hold failed");
                Some(WorkerFailure::Hold)
            } else {
                None
            }
        }
    };
    WorkerOutcome::new(worker, failure)
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Tunables for one load run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    /// Exactly this many workers are launched.
    pub target: usize,
    pub hold: Duration,
    /// Delay between launch and opening the gate.
    pub grace: Duration,
    /// Bound on each worker's wait for the gate.
    pub gate_timeout: Duration,
}

impl LoadPlan {
    #[must_use]
    pub const fn from_config(config: &HarnessConfig) -> Self {
        Self {
            target: config.active_conn_target,
            hold: config.active_conn_hold,
            grace: config.gate_grace,
            gate_timeout: config.gate_timeout,
        }
    }
}

/// Drained result of a load run.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport<T> {
    pub launched: usize,
    pub outcomes: Vec<WorkerOutcome>,
    pub elapsed_ms: u64,
    /// Whatever the caller observed while the workers were holding.
    pub observed: T,
}

impl<T> LoadReport<T> {
    #[must_use]
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    #[must_use]
    pub fn failures(&self) -> Vec<&WorkerOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded()).collect()
    }
}

pub struct LoadGenerator<'a, B> {
    backend: &'a B,
    plan: LoadPlan,
    tag_prefix: String,
}

impl<'a, B: WorkerBackend> LoadGenerator<'a, B> {
    #[must_use]
    pub fn new(backend: &'a B, plan: LoadPlan, tag_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            plan,
            tag_prefix: tag_prefix.into(),
        }
    }

    #[must_use]
    pub const fn plan(&self) -> &LoadPlan {
        &self.plan
    }

    /// Workers numbered `1..=target`.
    #[must_use]
    pub fn workers(&self) -> Vec<LoadWorker> {
        (1..=self.plan.target)
            .map(|id| LoadWorker::new(id, &self.tag_prefix, self.plan.hold))
            .collect()
    }

    /// Launch every worker, open the gate after the grace period, run
    /// `while_held` on the calling thread, then drain all outcomes.
    ///
    /// Workers are always drained, even when `while_held` fails; its error is
    /// returned afterwards.
    pub fn run<T, F>(&self, while_held: F) -> DbResult<LoadReport<T>>
    where
        F: FnOnce() -> DbResult<T>,
    {
        let workers = self.workers();
        let gate = StartGate::new();
        let started = Instant::now();
        let gate_timeout = self.plan.gate_timeout;
        let backend = self.backend;

        tracing::info!(
            workers = workers.len(),
            hold_secs = self.plan.hold.as_secs_f64(),
            grace_ms = self.plan.grace.as_millis(),
            "launching load workers"
        );

        let (observed, outcomes) = thread::scope(|scope| {
            let handles: Vec<_> = workers
                .iter()
                .map(|worker| {
                    let gate = &gate;
                    let handle = thread::Builder::new()
                        .name(worker.tag.clone())
                        .spawn_scoped(scope, move || {
                            run_worker(backend, worker, gate, gate_timeout)
                        });
                    (worker, handle)
                })
                .collect();

            thread::sleep(self.plan.grace);
            gate.open();
            tracing::debug!("start gate opened");

            let observed = while_held();

            let outcomes: Vec<WorkerOutcome> = handles
                .into_iter()
                .map(|(worker, handle)| match handle {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        tracing::warn!(worker = %worker.tag, "load worker panicked");
                        WorkerOutcome::new(worker, Some(WorkerFailure::Panicked))
                    }),
                    Err(e) => {
                        tracing::warn!(
                            worker = %worker.tag,
                            error = %e,
                            "failed to spawn load worker"
                        );
                        WorkerOutcome::new(worker, Some(WorkerFailure::Spawn))
                    }
                })
                .collect();
            (observed, outcomes)
        });

        let report = LoadReport {
            launched: workers.len(),
            outcomes,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            observed: observed?,
        };
        tracing::info!(
            launched = report.launched,
            successes = report.successes(),
            elapsed_ms = report.elapsed_ms,
            "load workers drained"
        );
        Ok(report)
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
