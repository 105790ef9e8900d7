use crate::autodiff::{ops, Context, Variable};
use crate::errors::{GPError, GPResult};
use crate::init;
use crate::module::Module;
use crate::tensor::NdArray;

/// `y = x · Wᵀ + b`. Weight is `(out, in)`, bias is `(out,)`. Accepts
/// any input rank `>= 2`: leading dims are flattened into a single
/// batch axis before the matmul and restored afterward, so the same
/// layer serves both `(batch, in)` and `(batch, seq, in)` callers.
pub struct Linear {
    pub module: Module,
    in_features: usize,
    out_features: usize,
    use_bias: bool,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize, bias: bool, seed: Option<u64>) -> GPResult<Self> {
        let mut module = Module::new();
        let weight = init::xavier_uniform(&[out_features, in_features], 1.0, seed)?;
        module.register_parameter("weight", Variable::new_with_grad(weight))?;
        if bias {
            module.register_parameter("bias", Variable::new_with_grad(NdArray::zeros(&[out_features])))?;
        }
        Ok(Self { module, in_features, out_features, use_bias: bias })
    }

    pub fn forward(&self, x: &Variable, ctx: &Context) -> GPResult<Variable> {
        let shape = x.shape().to_vec();
        let last = *shape.last().ok_or_else(|| GPError::argument("linear input must have rank >= 1"))?;
        if last != self.in_features {
            return Err(GPError::shape(vec![self.in_features], vec![last]));
        }
        let leading: usize = shape[..shape.len() - 1].iter().product();

        let x2 = ops::reshape(x, &[leading, self.in_features], ctx)?;
        let weight = self.module.parameter("weight").expect("weight registered at construction").clone();
        let weight_t = ops::transpose(&weight, ctx)?;
        let mut y = ops::matmul(&x2, &weight_t, ctx)?;
        if self.use_bias {
            let bias = self.module.parameter("bias").expect("bias registered at construction").clone();
            y = ops::add(&y, &bias, ctx)?;
        }

        let mut out_shape = shape[..shape.len() - 1].to_vec();
        out_shape.push(self.out_features);
        ops::reshape(&y, &out_shape, ctx)
    }
}
