use std::time::Duration;

use crate::definition::Stage;

const RECHECK_CAP: Duration = Duration::from_millis(50);

/// Piecewise-linear VU target over a list of stages, starting from `start`.
#[derive(Debug, Clone)]
pub struct RampingSchedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

/// Where `elapsed` falls within the schedule.
struct Position {
    stage_start: Duration,
    stage_end: Duration,
    from: u64,
    to: u64,
}

impl RampingSchedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let mut acc = Duration::ZERO;
        let cumulative_ends = stages
            .iter()
            .map(|s| {
                acc = acc.saturating_add(s.duration);
                acc
            })
            .collect();

        Self {
            start,
            stages,
            cumulative_ends,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Highest target reached anywhere in the schedule.
    pub fn peak(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start, u64::max)
    }

    fn position(&self, elapsed: Duration) -> Option<Position> {
        if elapsed >= self.total_duration() {
            return None;
        }

        let idx = match self.cumulative_ends.binary_search(&elapsed) {
            // Exactly at a boundary: the next stage starts here.
            Ok(i) => i + 1,
            Err(i) => i,
        };
        let stage_start = idx
            .checked_sub(1)
            .map_or(Duration::ZERO, |prev| self.cumulative_ends[prev]);
        let from = idx
            .checked_sub(1)
            .map_or(self.start, |prev| self.stages[prev].target);

        Some(Position {
            stage_start,
            stage_end: *self.cumulative_ends.get(idx)?,
            from,
            to: self.stages.get(idx)?.target,
        })
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let Some(pos) = self.position(elapsed) else {
            return self.stages.last().map_or(self.start, |s| s.target);
        };

        let stage_duration = pos.stage_end.saturating_sub(pos.stage_start);
        if stage_duration.is_zero() {
            return pos.to;
        }

        let from = i128::from(pos.from);
        let delta = i128::from(pos.to) - from;
        let num = elapsed.saturating_sub(pos.stage_start).as_nanos() as i128;
        let den = (stage_duration.as_nanos() as i128).max(1);

        let cur = from + delta.saturating_mul(num) / den;
        cur.clamp(0, i128::from(u64::MAX)) as u64
    }

    /// How long an inactive (or just-active) VU should wait before checking the target again.
    pub fn next_recheck_in(&self, elapsed: Duration, vu: u64) -> Duration {
        let Some(pos) = self.position(elapsed) else {
            return Duration::ZERO;
        };

        // Active VUs re-check often to pick up ramp-down promptly.
        if vu <= self.target_at(elapsed) {
            return Duration::from_millis(1);
        }

        let until_stage_end = pos.stage_end.saturating_sub(elapsed);
        if pos.to <= pos.from || vu > pos.to {
            return until_stage_end.min(RECHECK_CAP);
        }

        // Solve from + (to - from) * t / stage_duration >= vu for t.
        let stage_ns = pos.stage_end.saturating_sub(pos.stage_start).as_nanos() as i128;
        let elapsed_ns = elapsed.saturating_sub(pos.stage_start).as_nanos() as i128;
        let from = i128::from(pos.from);
        let needed_ns =
            (i128::from(vu) - from).saturating_mul(stage_ns) / (i128::from(pos.to) - from);
        let wait_ns = needed_ns.saturating_sub(elapsed_ns).max(0);

        Duration::from_nanos(wait_ns.min(i128::from(u64::MAX)) as u64).min(RECHECK_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(secs: u64, target: u64) -> Stage {
        Stage {
            duration: Duration::from_secs(secs),
            target,
        }
    }

    #[test]
    fn target_interpolates_linearly() {
        let s = RampingSchedule::new(0, vec![stage(10, 10), stage(10, 0)]);
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(Duration::from_secs(5)), 5);
        assert_eq!(s.target_at(Duration::from_secs(10)), 10);
        assert_eq!(s.target_at(Duration::from_secs(15)), 5);
        assert_eq!(s.target_at(Duration::from_secs(30)), 0);
        assert_eq!(s.total_duration(), Duration::from_secs(20));
        assert_eq!(s.peak(), 10);
    }

    #[test]
    fn zero_length_stage_jumps() {
        let s = RampingSchedule::new(1, vec![stage(0, 4), stage(2, 4)]);
        assert_eq!(s.target_at(Duration::ZERO), 4);
        assert_eq!(s.target_at(Duration::from_secs(1)), 4);
    }

    #[test]
    fn recheck_waits_until_ramp_reaches_vu() {
        let s = RampingSchedule::new(0, vec![stage(10, 10)]);
        assert_eq!(s.next_recheck_in(Duration::from_secs(5), 3), Duration::from_millis(1));
        assert_eq!(
            s.next_recheck_in(Duration::from_secs(5), 6),
            Duration::from_millis(50)
        );
        assert_eq!(
            s.next_recheck_in(Duration::from_millis(5_980), 6),
            Duration::from_millis(20)
        );
        assert_eq!(s.next_recheck_in(Duration::from_secs(10), 6), Duration::ZERO);
    }
}
