use std::sync::Arc;
use std::time::{Duration, Instant};

use super::gate::IterationGate;
use super::{Plan, share};
use crate::pool::VuWork;

/// A fixed number of VUs looping until the duration elapses or the shared iteration budget
/// runs out. With neither bound set, the scenario runs a single iteration.
#[derive(Debug)]
pub(super) struct ConstantVus {
    vus: u64,
    iterations: Option<u64>,
    duration: Option<Duration>,
    gate: Arc<IterationGate>,
}

impl ConstantVus {
    pub(super) fn new(vus: u64, iterations: Option<u64>, duration: Option<Duration>) -> Self {
        Self {
            vus,
            iterations,
            duration,
            gate: Arc::new(IterationGate::new(iterations, duration)),
        }
    }
}

impl Plan for ConstantVus {
    fn max_vus(&self) -> u64 {
        self.vus
    }

    fn work_for(&self, _vu: u64, started: Instant) -> VuWork {
        self.gate.start_at(started);
        VuWork::Gate(Arc::clone(&self.gate))
    }

    fn percentage(&self, elapsed: Duration, done: u64) -> f64 {
        let by_time = self
            .duration
            .map(|d| share(elapsed.as_secs_f64(), d.as_secs_f64()));
        let by_iterations = self.iterations.map(|n| share(done as f64, n as f64));

        match (by_time, by_iterations) {
            (Some(t), Some(i)) => t.max(i),
            (Some(p), None) | (None, Some(p)) => p,
            (None, None) => share(done as f64, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_takes_the_further_bound() {
        let plan = ConstantVus::new(2, Some(100), Some(Duration::from_secs(10)));
        assert_eq!(plan.percentage(Duration::from_secs(5), 10), 50.0);
        assert_eq!(plan.percentage(Duration::from_secs(1), 80), 80.0);
    }

    #[test]
    fn single_iteration_without_bounds() {
        let plan = ConstantVus::new(1, None, None);
        assert_eq!(plan.percentage(Duration::from_secs(3), 0), 0.0);
        assert_eq!(plan.percentage(Duration::from_secs(3), 1), 100.0);
    }
}
