use crate::agent::state::StepOutcome;

/// Tracks the step budget and the consecutive-failure guard for one task.
pub struct LoopController {
    max_steps: u32,
    max_consecutive_failures: u32,
    steps_taken: u32,
    consecutive_failures: u32,
    start_time: std::time::Instant,
}

impl LoopController {
    pub fn new(max_steps: u32, max_consecutive_failures: u32) -> Self {
        Self {
            max_steps,
            max_consecutive_failures,
            steps_taken: 0,
            consecutive_failures: 0,
            start_time: std::time::Instant::now(),
        }
    }

    /// Account for one completed step (success resets the failure streak).
    pub fn record(&mut self, outcome: &StepOutcome) {
        self.steps_taken += 1;
        if outcome.is_ok() {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
    }

    pub fn budget_exhausted(&self) -> bool {
        self.steps_taken >= self.max_steps
    }

    pub fn failure_limit_hit(&self) -> bool {
        self.consecutive_failures >= self.max_consecutive_failures
    }

    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}
