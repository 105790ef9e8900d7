use crate::autodiff::{ops, Context, Variable};
use crate::errors::{GPError, GPResult};
use crate::module::Module;
use crate::tensor::NdArray;

/// Normalizes over the trailing feature axis, then scales by a learned
/// `gamma` and shifts by a learned `beta`. Composed entirely from
/// existing differentiable primitives (no dedicated autodiff `Op`
/// needed): mean, subtract, square, mean, sqrt, divide, affine.
pub struct LayerNorm {
    pub module: Module,
    dim: usize,
    eps: f32,
}

impl LayerNorm {
    pub fn new(dim: usize, eps: f32) -> GPResult<Self> {
        let mut module = Module::new();
        module.register_parameter("gamma", Variable::new_with_grad(NdArray::ones(&[dim])))?;
        module.register_parameter("beta", Variable::new_with_grad(NdArray::zeros(&[dim])))?;
        Ok(Self { module, dim, eps })
    }

    pub fn forward(&self, x: &Variable, ctx: &Context) -> GPResult<Variable> {
        let dims = x.shape().to_vec();
        if dims.last() != Some(&self.dim) {
            return Err(GPError::shape(vec![self.dim], dims));
        }
        let axis = (dims.len() - 1) as isize;

        let mean = ops::mean(x, axis, ctx)?;
        let centered = ops::sub(x, &mean, ctx)?;
        let var = ops::mean(&ops::square(&centered, ctx)?, axis, ctx)?;
        let std = ops::sqrt(&ops::add_scalar(&var, self.eps, ctx)?, ctx)?;
        let normalized = ops::div(&centered, &std, ctx)?;

        let gamma = self.module.parameter("gamma").expect("gamma registered at construction").clone();
        let beta = self.module.parameter("beta").expect("beta registered at construction").clone();
        let scaled = ops::mul(&normalized, &gamma, ctx)?;
        ops::add(&scaled, &beta, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_zero_mean_unit_variance() {
        let ln = LayerNorm::new(4, 1e-5).unwrap();
        let x = Variable::new_with_grad(NdArray::of(vec![1.0, 2.0, 3.0, 4.0], Some(&[1, 4])).unwrap());
        let y = ln.forward(&x, &Context::train()).unwrap();
        let values = y.value().into_ndarray();
        let mean: f32 = values.iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-4);
    }

    #[test]
    fn rejects_mismatched_feature_dim() {
        let ln = LayerNorm::new(4, 1e-5).unwrap();
        let x = Variable::new_with_grad(NdArray::ones(&[1, 5]));
        assert!(ln.forward(&x, &Context::train()).is_err());
    }
}
