use crate::autodiff::{ops, Context, Variable};
use crate::errors::GPResult;
use crate::module::Module;

use super::linear::Linear;

/// Activation applied between a feed-forward block's two [`Linear`]
/// layers. GPT-family blocks use GELU; MiniMind/DeepSeek-style blocks
/// use SiLU (§4.5).
#[derive(Clone, Copy, Debug)]
pub enum FfnActivation {
    Gelu,
    Silu,
    Relu,
}

impl FfnActivation {
    fn apply(&self, x: &Variable, ctx: &Context) -> GPResult<Variable> {
        match self {
            FfnActivation::Gelu => ops::gelu(x, ctx),
            FfnActivation::Silu => ops::silu(x, ctx),
            FfnActivation::Relu => ops::relu(x, ctx),
        }
    }
}

/// Two [`Linear`] layers with an activation in between. `hidden_dim` is
/// conventionally `4 * d_model` for GPT-family blocks.
pub struct FeedForward {
    pub module: Module,
    fc1: Linear,
    fc2: Linear,
    activation: FfnActivation,
}

impl FeedForward {
    pub fn new(d_model: usize, hidden_dim: usize, activation: FfnActivation, seed: Option<u64>) -> GPResult<Self> {
        let fc1 = Linear::new(d_model, hidden_dim, true, seed)?;
        let fc2 = Linear::new(hidden_dim, d_model, true, seed.map(|s| s + 1))?;

        let mut module = Module::new();
        module.register_module("fc1", fc1.module.clone())?;
        module.register_module("fc2", fc2.module.clone())?;

        Ok(Self { module, fc1, fc2, activation })
    }

    pub fn forward(&self, x: &Variable, ctx: &Context) -> GPResult<Variable> {
        let hidden = self.fc1.forward(x, ctx)?;
        let activated = self.activation.apply(&hidden, ctx)?;
        self.fc2.forward(&activated, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::NdArray;

    #[test]
    fn preserves_feature_dim() {
        let ffn = FeedForward::new(8, 32, FfnActivation::Gelu, Some(1)).unwrap();
        let x = Variable::new_with_grad(NdArray::random_normal(&[2, 5, 8], Some(2)));
        let y = ffn.forward(&x, &Context::train()).unwrap();
        assert_eq!(y.shape().dims(), &[2, 5, 8]);
    }

    #[test]
    fn gradients_flow_through_both_layers() {
        let ffn = FeedForward::new(4, 8, FfnActivation::Silu, Some(1)).unwrap();
        let x = Variable::new_with_grad(NdArray::ones(&[2, 4]));
        let y = ffn.forward(&x, &Context::train()).unwrap();
        let loss = ops::sum(&ops::sum(&y, 0, &Context::train()).unwrap(), 1, &Context::train()).unwrap();
        loss.backward().unwrap();
        assert!(ffn.fc1.module.parameter("weight").unwrap().grad().is_some());
        assert!(ffn.fc2.module.parameter("weight").unwrap().grad().is_some());
    }
}
