/// Step budget for one task run.
pub struct LoopController {
    max_steps: u32,
    steps_taken: u32,
}

impl LoopController {
    pub fn new(max_steps: u32) -> Self {
        Self {
            max_steps,
            steps_taken: 0,
        }
    }

    /// Count a new step. Returns its 1-based number, or `None` once the budget is spent.
    pub fn begin_step(&mut self) -> Option<u32> {
        if self.should_stop() {
            return None;
        }
        self.steps_taken += 1;
        Some(self.steps_taken)
    }

    pub fn should_stop(&self) -> bool {
        self.steps_taken >= self.max_steps
    }

    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_counts_down_to_stop() {
        let mut ctrl = LoopController::new(2);
        assert_eq!(ctrl.begin_step(), Some(1));
        assert_eq!(ctrl.begin_step(), Some(2));
        assert!(ctrl.should_stop());
        assert_eq!(ctrl.begin_step(), None);
        assert_eq!(ctrl.steps_taken(), 2);
    }

    #[test]
    fn zero_budget_never_starts() {
        let mut ctrl = LoopController::new(0);
        assert_eq!(ctrl.begin_step(), None);
    }
}
