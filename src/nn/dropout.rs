use crate::autodiff::{ops, Context, Variable};
use crate::errors::{GPError, GPResult};
use crate::tensor::NdArray;

/// Inverted dropout: in training mode, zeroes each element independently
/// with probability `p` and rescales survivors by `1 / (1 - p)` so the
/// expected activation magnitude is unchanged; a no-op in eval mode.
pub struct Dropout {
    p: f32,
}

impl Dropout {
    pub fn new(p: f32) -> GPResult<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(GPError::argument("dropout probability must be in [0, 1)"));
        }
        Ok(Self { p })
    }

    pub fn forward(&self, x: &Variable, ctx: &Context) -> GPResult<Variable> {
        if !ctx.training() || self.p == 0.0 {
            return Ok(x.clone());
        }
        let keep_prob = 1.0 - self.p;
        let draws = NdArray::random_uniform(0.0, 1.0, x.shape().dims(), None);
        let mask = NdArray::from_array(draws.as_ndarray().mapv(|v| if v < keep_prob { 1.0 / keep_prob } else { 0.0 }));
        let mask = Variable::new(mask);
        ops::mul(x, &mask, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_mode_is_identity() {
        let dropout = Dropout::new(0.5).unwrap();
        let x = Variable::new_with_grad(NdArray::ones(&[4, 4]));
        let y = dropout.forward(&x, &Context::eval()).unwrap();
        assert_eq!(y.value(), x.value());
    }

    #[test]
    fn zero_probability_is_identity_in_training() {
        let dropout = Dropout::new(0.0).unwrap();
        let x = Variable::new_with_grad(NdArray::ones(&[4, 4]));
        let y = dropout.forward(&x, &Context::train()).unwrap();
        assert_eq!(y.value(), x.value());
    }

    #[test]
    fn rejects_probability_of_one() {
        assert!(Dropout::new(1.0).is_err());
    }
}
