use crate::config::LrScheduleConfig;
use crate::errors::GPResult;

/// Linear warmup from 0 to `lr_init` over `warmup_steps`, then cosine
/// decay to `lr_min` over the remaining steps (§4.7).
pub struct LrSchedule {
    cfg: LrScheduleConfig,
}

impl LrSchedule {
    pub fn new(cfg: LrScheduleConfig) -> GPResult<Self> {
        Ok(Self { cfg: cfg.validate()? })
    }

    /// `step` is 1-indexed (the step number about to be taken), matching
    /// the usual convention of calling this right before `Adam::step`.
    pub fn lr_at(&self, step: u64) -> f32 {
        let step = step as f64;
        let warmup_steps = self.cfg.warmup_steps as f64;

        if warmup_steps > 0.0 && step <= warmup_steps {
            return (self.cfg.lr_init as f64 * (step / warmup_steps)) as f32;
        }

        let decay_steps = (self.cfg.total_steps as f64 - warmup_steps).max(1.0);
        let progress = ((step - warmup_steps) / decay_steps).min(1.0);
        let cosine = 0.5 * (1.0 + (std::f64::consts::PI * progress).cos());
        (self.cfg.lr_min as f64 + (self.cfg.lr_init as f64 - self.cfg.lr_min as f64) * cosine) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LrScheduleConfig {
        LrScheduleConfig { lr_init: 1.0, lr_min: 0.0, warmup_steps: 10, total_steps: 110 }
    }

    #[test]
    fn warmup_ramps_linearly_from_zero() {
        let sched = LrSchedule::new(cfg()).unwrap();
        assert!((sched.lr_at(0) - 0.0).abs() < 1e-6);
        assert!((sched.lr_at(5) - 0.5).abs() < 1e-6);
        assert!((sched.lr_at(10) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn decay_reaches_lr_min_at_total_steps() {
        let sched = LrSchedule::new(cfg()).unwrap();
        let lr_final = sched.lr_at(110);
        assert!((lr_final - 0.0).abs() < 1e-5, "expected ~0, got {lr_final}");
    }

    #[test]
    fn decay_is_monotonically_non_increasing_after_warmup() {
        let sched = LrSchedule::new(cfg()).unwrap();
        let mut prev = sched.lr_at(10);
        for step in 11..=110 {
            let cur = sched.lr_at(step);
            assert!(cur <= prev + 1e-6, "lr increased at step {step}: {prev} -> {cur}");
            prev = cur;
        }
    }
}
