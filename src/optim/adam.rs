use crate::autodiff::Variable;
use crate::config::AdamConfig;
use crate::errors::GPResult;
use crate::tensor::NdArray;

/// Per-parameter first/second moment buffers for one [`Adam`] instance.
struct Moments {
    m: NdArray,
    v: NdArray,
}

/// Adam optimizer (§4.7): tracks first and second moment estimates per
/// parameter and applies a bias-corrected update. Parameters are
/// registered once via [`Adam::new`]; `step` walks them in registration
/// order and skips any with no accumulated gradient.
pub struct Adam {
    cfg: AdamConfig,
    params: Vec<Variable>,
    moments: Vec<Moments>,
    t: u64,
}

impl Adam {
    pub fn new(cfg: AdamConfig, params: Vec<Variable>) -> GPResult<Self> {
        let cfg = cfg.validate()?;
        let moments = params
            .iter()
            .map(|p| Moments { m: NdArray::zeros(p.shape().dims()), v: NdArray::zeros(p.shape().dims()) })
            .collect();
        Ok(Self { cfg, params, moments, t: 0 })
    }

    /// Applies one update step using each parameter's currently
    /// accumulated gradient, then clears it (matching the conventional
    /// `zero_grad` placement at the end of the step, not the start).
    pub fn step(&mut self) -> GPResult<()> {
        self.t += 1;
        let beta1 = self.cfg.beta1;
        let beta2 = self.cfg.beta2;
        let bias_correction1 = 1.0 - beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - beta2.powi(self.t as i32);

        for (param, moments) in self.params.iter().zip(self.moments.iter_mut()) {
            let Some(grad) = param.grad() else { continue };

            moments.m = moments.m.mul_scalar(beta1).add(&grad.mul_scalar(1.0 - beta1))?;
            moments.v = moments.v.mul_scalar(beta2).add(&grad.square().mul_scalar(1.0 - beta2))?;

            let m_hat = moments.m.div_scalar(bias_correction1)?;
            let v_hat = moments.v.div_scalar(bias_correction2)?;

            let denom = v_hat.sqrt()?.add_scalar(self.cfg.eps);
            let update = m_hat.div(&denom)?.mul_scalar(self.cfg.lr);
            param.set_value(param.value().sub(&update)?);
        }
        Ok(())
    }

    pub fn zero_grad(&self) {
        for param in &self.params {
            param.zero_grad();
        }
    }

    pub fn set_lr(&mut self, lr: f32) {
        self.cfg.lr = lr;
    }

    pub fn lr(&self) -> f32 {
        self.cfg.lr
    }

    pub fn step_count(&self) -> u64 {
        self.t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_moves_parameter_toward_negative_gradient() {
        let param = Variable::new_with_grad(NdArray::of(vec![1.0], Some(&[1])).unwrap());
        param.set_grad(NdArray::of(vec![1.0], Some(&[1])).unwrap());
        let mut adam = Adam::new(AdamConfig { lr: 0.1, ..Default::default() }, vec![param.clone()]).unwrap();
        adam.step().unwrap();
        let updated = param.value().get(&[0]).unwrap();
        assert!(updated < 1.0, "expected decrease, got {updated}");
    }

    #[test]
    fn parameters_without_gradient_are_left_unchanged() {
        let param = Variable::new_with_grad(NdArray::of(vec![2.0], Some(&[1])).unwrap());
        let mut adam = Adam::new(AdamConfig::default(), vec![param.clone()]).unwrap();
        adam.step().unwrap();
        assert_eq!(param.value().get(&[0]).unwrap(), 2.0);
    }

    #[test]
    fn zero_grad_clears_accumulated_gradients() {
        let param = Variable::new_with_grad(NdArray::zeros(&[1]));
        param.set_grad(NdArray::ones(&[1]));
        let adam = Adam::new(AdamConfig::default(), vec![param.clone()]).unwrap();
        adam.zero_grad();
        assert!(param.grad().is_none());
    }
}
