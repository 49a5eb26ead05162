use std::time::{Duration, Instant};

use log::{log_enabled, trace, warn, Level};

/// Trace-level span around one pipeline phase. Construction and drop emit
/// paired lines, so a trace log reconstructs where a step spent its time
/// even when the profiler summary is too coarse.
pub struct PhaseTimer {
    phase: &'static str,
    start: Instant,
}

impl PhaseTimer {
    pub fn begin(phase: &'static str) -> Self {
        if log_enabled!(Level::Trace) {
            trace!("phase {phase}: begin");
        }
        Self {
            phase,
            start: Instant::now(),
        }
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            trace!(
                "phase {}: {} µs",
                self.phase,
                self.start.elapsed().as_micros()
            );
        }
    }
}

/// A step that takes longer than the interval it simulates cannot keep up
/// with a real-time caller; flag it once per offending step.
pub fn warn_if_step_fell_behind(elapsed: Duration, dt: f32) {
    let budget_ms = dt * 1000.0;
    let spent_ms = elapsed.as_secs_f32() * 1000.0;
    if spent_ms > budget_ms {
        warn!("step fell behind real time: {spent_ms:.2} ms spent on a {budget_ms:.2} ms interval");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_timer_drops_cleanly_without_a_logger() {
        let timer = PhaseTimer::begin("unit-test");
        drop(timer);
    }

    #[test]
    fn behind_check_tolerates_fast_and_slow_steps() {
        warn_if_step_fell_behind(Duration::from_micros(200), 1.0 / 60.0);
        warn_if_step_fell_behind(Duration::from_millis(30), 1.0 / 60.0);
    }
}
