use crate::autodiff::{ops, Context, Variable};
use crate::errors::{GPError, GPResult};
use crate::module::Module;
use crate::tensor::NdArray;

/// `y = x / sqrt(mean(x^2) + eps) * w`, a single learned scale with no
/// shift (cheaper than LayerNorm, used by MiniMind/DeepSeek-style
/// blocks). Delegates to the `RmsNorm` autodiff primitive, which
/// includes the variance-coupling correction term in its backward.
pub struct RmsNorm {
    pub module: Module,
    dim: usize,
    eps: f32,
}

impl RmsNorm {
    pub fn new(dim: usize, eps: f32) -> GPResult<Self> {
        let mut module = Module::new();
        module.register_parameter("weight", Variable::new_with_grad(NdArray::ones(&[dim])))?;
        Ok(Self { module, dim, eps })
    }

    pub fn forward(&self, x: &Variable, ctx: &Context) -> GPResult<Variable> {
        let dims = x.shape().to_vec();
        if dims.last() != Some(&self.dim) {
            return Err(GPError::shape(vec![self.dim], dims));
        }
        let weight = self.module.parameter("weight").expect("weight registered at construction").clone();
        ops::rmsnorm(x, &weight, self.eps, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_weight_normalizes_root_mean_square_to_one() {
        let norm = RmsNorm::new(4, 1e-8).unwrap();
        let x = Variable::new_with_grad(NdArray::of(vec![1.0, 2.0, 3.0, 4.0], Some(&[1, 4])).unwrap());
        let y = norm.forward(&x, &Context::train()).unwrap();
        let values = y.value().into_ndarray();
        let ms: f32 = values.iter().map(|v| v * v).sum::<f32>() / 4.0;
        assert!((ms - 1.0).abs() < 1e-3);
    }

    #[test]
    fn gradient_flows_to_weight() {
        let norm = RmsNorm::new(3, 1e-6).unwrap();
        let x = Variable::new_with_grad(NdArray::of(vec![1.0, -2.0, 0.5], Some(&[1, 3])).unwrap());
        let y = norm.forward(&x, &Context::train()).unwrap();
        let loss = ops::sum(&y, 1, &Context::train()).unwrap();
        loss.backward().unwrap();
        assert!(norm.module.parameter("weight").unwrap().grad().is_some());
        assert!(x.grad().is_some());
    }
}
