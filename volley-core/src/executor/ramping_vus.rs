use std::sync::Arc;
use std::time::{Duration, Instant};

use super::schedule::RampingSchedule;
use super::{Plan, share};
use crate::definition::Stage;
use crate::pool::VuWork;

/// VUs follow a piecewise-linear target. VU `i` iterates while `i <= target(elapsed)`.
#[derive(Debug)]
pub(super) struct RampingVus {
    schedule: Arc<RampingSchedule>,
}

impl RampingVus {
    pub(super) fn new(start_vus: u64, stages: Vec<Stage>) -> Self {
        Self {
            schedule: Arc::new(RampingSchedule::new(start_vus, stages)),
        }
    }
}

impl Plan for RampingVus {
    fn max_vus(&self) -> u64 {
        self.schedule.peak()
    }

    fn work_for(&self, _vu: u64, started: Instant) -> VuWork {
        VuWork::Ramping {
            schedule: Arc::clone(&self.schedule),
            started,
        }
    }

    fn percentage(&self, elapsed: Duration, _done: u64) -> f64 {
        share(
            elapsed.as_secs_f64(),
            self.schedule.total_duration().as_secs_f64(),
        )
    }
}
