use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use volley_metrics::{MetricHandle, MetricId, MetricKind, MetricsSnapshot, Registry};

use super::vu::{self, VuJob};
use super::{BroadcastResult, Call, Reply, WorkerError};
use crate::http_client::HttpClient;

pub(crate) const ITERATIONS: &str = "iterations";
pub(crate) const ITERATION_DURATION: &str = "iteration_duration";
pub(crate) const ITERATION_ERRORS: &str = "iteration_errors";
pub(crate) const HTTP_REQS: &str = "http_reqs";
pub(crate) const HTTP_REQ_DURATION: &str = "http_req_duration";
pub(crate) const HTTP_REQ_FAILED: &str = "http_req_failed";
pub(crate) const DATA_SENT: &str = "data_sent";
pub(crate) const DATA_RECEIVED: &str = "data_received";

#[derive(Debug)]
pub(crate) enum Command {
    Call {
        call: Call,
        respond_to: oneshot::Sender<Reply>,
    },
    RunVu {
        job: VuJob,
        respond_to: oneshot::Sender<BroadcastResult<()>>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
struct MetricIds {
    iterations: MetricId,
    iteration_duration: MetricId,
    iteration_errors: MetricId,
    http_reqs: MetricId,
    http_req_duration: MetricId,
    http_req_failed: MetricId,
    data_sent: MetricId,
    data_received: MetricId,
}

impl MetricIds {
    fn register(registry: &Registry) -> Self {
        Self {
            iterations: registry.register(ITERATIONS, MetricKind::Counter),
            iteration_duration: registry.register(ITERATION_DURATION, MetricKind::Histogram),
            iteration_errors: registry.register(ITERATION_ERRORS, MetricKind::Counter),
            http_reqs: registry.register(HTTP_REQS, MetricKind::Counter),
            http_req_duration: registry.register(HTTP_REQ_DURATION, MetricKind::Histogram),
            http_req_failed: registry.register(HTTP_REQ_FAILED, MetricKind::Rate),
            data_sent: registry.register(DATA_SENT, MetricKind::Counter),
            data_received: registry.register(DATA_RECEIVED, MetricKind::Counter),
        }
    }
}

/// Handles for the `scenario`-tagged series a VU writes on every iteration.
#[derive(Debug, Clone)]
pub(crate) struct ScenarioMetrics {
    pub iterations: MetricHandle,
    pub iteration_duration: MetricHandle,
    pub iteration_errors: MetricHandle,
    pub http_req_duration: MetricHandle,
    pub http_req_failed: MetricHandle,
    pub data_sent: MetricHandle,
    pub data_received: MetricHandle,
}

/// State owned by one worker and shared by the VU tasks running on it.
#[derive(Debug)]
pub(crate) struct WorkerContext {
    pub id: usize,
    pub http: HttpClient,
    registry: Registry,
    ids: MetricIds,
    /// `iterations` counter per scenario, for cheap progress reads.
    iterations: Mutex<BTreeMap<String, MetricHandle>>,
}

impl WorkerContext {
    pub(crate) fn new(id: usize) -> Self {
        let registry = Registry::default();
        let ids = MetricIds::register(&registry);
        Self {
            id,
            http: HttpClient::default(),
            registry,
            ids,
            iterations: Mutex::new(BTreeMap::new()),
        }
    }

    fn handle(&self, metric: MetricId, kind: MetricKind, tags: &[(&str, &str)]) -> MetricHandle {
        let tags = self.registry.resolve_tags(tags);
        self.registry
            .handle(metric, tags)
            .unwrap_or_else(|| MetricHandle::detached(kind))
    }

    pub(crate) fn scenario_metrics(&self, scenario: &str) -> ScenarioMetrics {
        let tags = [("scenario", scenario)];
        let iterations = self.handle(self.ids.iterations, MetricKind::Counter, &tags);

        self.iterations
            .lock()
            .entry(scenario.to_string())
            .or_insert_with(|| iterations.clone());

        ScenarioMetrics {
            iterations,
            iteration_duration: self.handle(
                self.ids.iteration_duration,
                MetricKind::Histogram,
                &tags,
            ),
            iteration_errors: self.handle(self.ids.iteration_errors, MetricKind::Counter, &tags),
            http_req_duration: self.handle(
                self.ids.http_req_duration,
                MetricKind::Histogram,
                &tags,
            ),
            http_req_failed: self.handle(self.ids.http_req_failed, MetricKind::Rate, &tags),
            data_sent: self.handle(self.ids.data_sent, MetricKind::Counter, &tags),
            data_received: self.handle(self.ids.data_received, MetricKind::Counter, &tags),
        }
    }

    /// `http_reqs` is tagged by method and status as well, so it is resolved per request.
    pub(crate) fn http_reqs(&self, scenario: &str, method: &str, status: &str) -> MetricHandle {
        self.handle(
            self.ids.http_reqs,
            MetricKind::Counter,
            &[("scenario", scenario), ("method", method), ("status", status)],
        )
    }

    pub(crate) fn iterations_done(&self) -> BTreeMap<String, u64> {
        self.iterations
            .lock()
            .iter()
            .map(|(scenario, h)| (scenario.clone(), h.counter_value()))
            .collect()
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        self.registry.snapshot()
    }

    fn answer(&self, call: Call) -> Reply {
        match call {
            Call::IterationsDone => Reply::IterationsDone(self.iterations_done()),
            Call::Metrics => Reply::Metrics(self.snapshot()),
        }
    }
}

/// Worker actor: answers calls inline and runs each VU job on its own task.
pub(crate) async fn run(id: usize, mut rx: mpsc::UnboundedReceiver<Command>) {
    let ctx = Arc::new(WorkerContext::new(id));
    let mut vus: JoinSet<()> = JoinSet::new();
    let mut pending: HashMap<tokio::task::Id, oneshot::Sender<BroadcastResult<()>>> =
        HashMap::new();

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Call { call, respond_to }) => {
                    let _ = respond_to.send(ctx.answer(call));
                }
                Some(Command::RunVu { job, respond_to }) => {
                    let task = vus.spawn(vu::run(Arc::clone(&ctx), job));
                    pending.insert(task.id(), respond_to);
                }
                Some(Command::Shutdown) | None => break,
            },
            Some(done) = vus.join_next_with_id(), if !vus.is_empty() => {
                let (task, result) = match done {
                    Ok((task, ())) => (task, Ok(())),
                    Err(err) => (
                        err.id(),
                        Err(WorkerError::Failed {
                            worker: id,
                            reason: err.to_string(),
                        }),
                    ),
                };
                if let Some(respond_to) = pending.remove(&task) {
                    let _ = respond_to.send(result);
                }
            }
        }
    }

    // Pending responders are dropped here, which callers see as a disconnect.
    vus.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterations_done_reads_scenario_counters() {
        let ctx = WorkerContext::new(0);
        let a = ctx.scenario_metrics("a");
        let b = ctx.scenario_metrics("b");
        a.iterations.increment(3);
        b.iterations.increment(1);
        a.iterations.increment(2);

        let done = ctx.iterations_done();
        assert_eq!(done.get("a"), Some(&5));
        assert_eq!(done.get("b"), Some(&1));

        let counts = ctx.snapshot().counter_by_tag(ITERATIONS, "scenario");
        assert_eq!(counts, done);
    }

    #[test]
    fn repeated_lookups_share_series() {
        let ctx = WorkerContext::new(0);
        ctx.scenario_metrics("a").iterations.increment(1);
        ctx.scenario_metrics("a").iterations.increment(1);
        assert_eq!(ctx.iterations_done().get("a"), Some(&2));
    }
}
