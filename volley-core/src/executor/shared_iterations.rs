use std::sync::Arc;
use std::time::{Duration, Instant};

use super::gate::IterationGate;
use super::{Plan, share};
use crate::pool::VuWork;

/// VUs draw from one pool of `iterations`, unless `max_duration` cuts it short.
#[derive(Debug)]
pub(super) struct SharedIterations {
    vus: u64,
    iterations: u64,
    gate: Arc<IterationGate>,
}

impl SharedIterations {
    pub(super) fn new(vus: u64, iterations: u64, max_duration: Duration) -> Self {
        Self {
            // More VUs than iterations would only idle.
            vus: vus.min(iterations),
            iterations,
            gate: Arc::new(IterationGate::new(Some(iterations), Some(max_duration))),
        }
    }
}

impl Plan for SharedIterations {
    fn max_vus(&self) -> u64 {
        self.vus
    }

    fn work_for(&self, _vu: u64, started: Instant) -> VuWork {
        self.gate.start_at(started);
        VuWork::Gate(Arc::clone(&self.gate))
    }

    fn percentage(&self, _elapsed: Duration, done: u64) -> f64 {
        share(done as f64, self.iterations as f64)
    }
}
