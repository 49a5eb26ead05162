use std::time::Duration;

use log::debug;

/// Per-step timing and count snapshot, reset at the top of each `step` and
/// emitted as one structured debug line at the end.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepProfiler {
    pub force_time: Duration,
    pub ccd_time: Duration,
    pub broad_phase_time: Duration,
    pub solver_time: Duration,
    pub integrate_time: Duration,
    pub total_step_time: Duration,

    pub dynamic_body_count: usize,
    pub static_body_count: usize,
    pub dynamic_contact_count: usize,
    pub static_contact_count: usize,
    pub ccd_impact_count: usize,
    pub trigger_overlap_count: usize,
}

impl StepProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The one log line the engine emits per step.
    pub fn log_step(&self, dt: f32) {
        debug!(
            "step dt={:.4} bodies={}/{} contacts={}/{} ccd={} triggers={} \
             force={:.0}us ccd_t={:.0}us broad={:.0}us solve={:.0}us integrate={:.0}us total={:.0}us",
            dt,
            self.dynamic_body_count,
            self.static_body_count,
            self.dynamic_contact_count,
            self.static_contact_count,
            self.ccd_impact_count,
            self.trigger_overlap_count,
            self.force_time.as_secs_f64() * 1e6,
            self.ccd_time.as_secs_f64() * 1e6,
            self.broad_phase_time.as_secs_f64() * 1e6,
            self.solver_time.as_secs_f64() * 1e6,
            self.integrate_time.as_secs_f64() * 1e6,
            self.total_step_time.as_secs_f64() * 1e6,
        );
    }
}
