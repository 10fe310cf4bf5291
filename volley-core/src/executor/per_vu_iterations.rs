use std::sync::Arc;
use std::time::{Duration, Instant};

use super::gate::IterationGate;
use super::{Plan, share};
use crate::pool::VuWork;

/// Every VU runs exactly `iterations` iterations, unless `max_duration` cuts it short.
#[derive(Debug)]
pub(super) struct PerVuIterations {
    vus: u64,
    iterations: u64,
    max_duration: Duration,
}

impl PerVuIterations {
    pub(super) fn new(vus: u64, iterations: u64, max_duration: Duration) -> Self {
        Self {
            vus,
            iterations,
            max_duration,
        }
    }
}

impl Plan for PerVuIterations {
    fn max_vus(&self) -> u64 {
        self.vus
    }

    fn work_for(&self, _vu: u64, started: Instant) -> VuWork {
        let gate = IterationGate::new(Some(self.iterations), Some(self.max_duration));
        gate.start_at(started);
        VuWork::Gate(Arc::new(gate))
    }

    fn percentage(&self, _elapsed: Duration, done: u64) -> f64 {
        let total = self.vus.saturating_mul(self.iterations);
        share(done as f64, total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_vu_gets_its_own_budget() {
        let plan = PerVuIterations::new(2, 3, Duration::from_secs(60));
        let started = Instant::now();
        for vu in 1..=2 {
            let VuWork::Gate(gate) = plan.work_for(vu, started) else {
                panic!("expected gate work");
            };
            assert_eq!((0..10).filter(|_| gate.next()).count(), 3);
        }
        assert_eq!(plan.percentage(Duration::ZERO, 3), 50.0);
    }
}
