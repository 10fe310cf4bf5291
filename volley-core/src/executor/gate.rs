use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Hands out iterations to the VUs sharing it, until the iteration budget or the deadline is
/// exhausted.
#[derive(Debug)]
pub struct IterationGate {
    claimed: AtomicU64,
    iterations: Option<u64>,
    duration: Option<Duration>,
    deadline: OnceLock<Instant>,
}

impl IterationGate {
    pub fn new(iterations: Option<u64>, duration: Option<Duration>) -> Self {
        Self {
            claimed: AtomicU64::new(0),
            iterations,
            duration,
            deadline: OnceLock::new(),
        }
    }

    /// Fixes the deadline. Only the first call has an effect.
    pub fn start_at(&self, started: Instant) {
        if let Some(duration) = self.duration {
            let _ = self.deadline.set(started + duration);
        }
    }

    /// Claims one iteration. `false` means the VU should stop.
    pub fn next(&self) -> bool {
        if self.duration.is_some() {
            let now = Instant::now();
            if self.deadline.get().is_none() {
                self.start_at(now);
            }
            if let Some(deadline) = self.deadline.get()
                && now >= *deadline
            {
                return false;
            }
        }

        match (self.iterations, self.duration) {
            (Some(total), _) => self.claimed.fetch_add(1, Ordering::Relaxed) < total,
            (None, Some(_)) => true,
            // Neither bound: run once.
            (None, None) => self.claimed.fetch_add(1, Ordering::Relaxed) == 0,
        }
    }
}
