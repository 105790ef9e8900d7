use ndarray_rand::rand_distr::{Distribution, Uniform};
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

use crate::autodiff::function::top_k_values_indices;
use crate::autodiff::{ops, Context, Variable};
use crate::config::MoEConfig;
use crate::errors::GPResult;
use crate::module::Module;
use crate::nn::linear::Linear;
use crate::tensor::NdArray;

/// Output of one router pass over a batch of `(batch, d_model)` samples.
pub struct RouterOutput {
    /// `(batch, num_experts)`, differentiable: softmax over every
    /// expert, retained for the load-balance `Importance` term.
    pub all_weights: Variable,
    /// `(batch, num_experts)`, differentiable, zero outside each row's
    /// selected top-`k` experts and renormalized so each row sums to 1.
    pub dispatch_weights: Variable,
    /// Per-sample selected expert indices, largest logit first.
    pub topk_indices: Vec<Vec<usize>>,
}

/// Linear `d_model -> num_experts` gate with noisy top-K selection
/// (§4.6). In training mode, uniform noise of magnitude `noise_factor`
/// is added to each logit before the softmax and top-K selection — a
/// simple approximation of "noisy top-K" gating.
pub struct Router {
    pub module: Module,
    gate: Linear,
    num_experts: usize,
    top_k: usize,
    noise_factor: f32,
    seed: Option<u64>,
}

impl Router {
    pub fn new(cfg: &MoEConfig, seed: Option<u64>) -> GPResult<Self> {
        let gate = Linear::new(cfg.d_model, cfg.num_experts, true, seed)?;
        let mut module = Module::new();
        module.register_module("gate", gate.module.clone())?;
        Ok(Self {
            module,
            gate,
            num_experts: cfg.num_experts,
            top_k: cfg.top_k,
            noise_factor: cfg.noise_factor,
            seed,
        })
    }

    pub fn forward(&self, x: &Variable, ctx: &Context) -> GPResult<RouterOutput> {
        let logits = self.gate.forward(x, ctx)?;
        let noisy_logits = if ctx.training() && self.noise_factor > 0.0 {
            ops::add(&logits, &Variable::new(self.sample_noise(logits.shape().dims())), ctx)?
        } else {
            logits
        };

        let all_weights = ops::softmax(&noisy_logits, -1, ctx)?;

        let (_, topk_indices) = top_k_values_indices(&noisy_logits.value(), self.top_k, -1, true)?;
        let mask = selection_mask(noisy_logits.shape().dims(), &topk_indices);
        let masked = ops::mul(&all_weights, &Variable::new(mask), ctx)?;
        let row_sum = ops::sum(&masked, -1, ctx)?;
        let dispatch_weights = ops::div(&masked, &row_sum, ctx)?;

        Ok(RouterOutput { all_weights, dispatch_weights, topk_indices })
    }

    fn sample_noise(&self, shape: &[usize]) -> NdArray {
        let dist = Uniform::new(-self.noise_factor, self.noise_factor);
        let n: usize = shape.iter().product();
        let data: Vec<f32> = match self.seed {
            Some(s) => {
                let mut rng = ChaChaRng::seed_from_u64(s);
                (0..n).map(|_| dist.sample(&mut rng)).collect()
            }
            None => {
                let mut rng = rand::thread_rng();
                (0..n).map(|_| dist.sample(&mut rng)).collect()
            }
        };
        NdArray::of(data, Some(shape)).expect("shape matches sampled length")
    }

    pub fn num_experts(&self) -> usize {
        self.num_experts
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

/// `(batch, num_experts)` 0/1 mask with a 1 at each sample's selected
/// expert positions.
fn selection_mask(shape: &[usize], topk_indices: &[Vec<usize>]) -> NdArray {
    let num_experts = shape[1];
    let mut data = vec![0.0f32; shape[0] * num_experts];
    for (row, experts) in topk_indices.iter().enumerate() {
        for &e in experts {
            data[row * num_experts + e] = 1.0;
        }
    }
    NdArray::of(data, Some(shape)).expect("mask shape matches logits shape")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> MoEConfig {
        MoEConfig {
            d_model: 4,
            ffn_dim: 8,
            num_experts: 4,
            top_k: 2,
            noise_factor: 0.0,
            load_balance_alpha: 0.01,
            load_balance_beta: 0.01,
        }
    }

    #[test]
    fn dispatch_weights_sum_to_one_per_row() {
        let router = Router::new(&cfg(), Some(0)).unwrap();
        let x = Variable::new_with_grad(NdArray::random_normal(&[5, 4], Some(1)));
        let out = router.forward(&x, &Context::eval()).unwrap();
        let dw = out.dispatch_weights.value();
        for row in 0..5 {
            let sum: f32 = (0..4).map(|e| dw.get(&[row, e]).unwrap()).sum();
            assert!((sum - 1.0).abs() < 1e-5, "row {row} sum {sum}");
        }
    }

    #[test]
    fn each_row_selects_exactly_top_k_experts() {
        let router = Router::new(&cfg(), Some(0)).unwrap();
        let x = Variable::new_with_grad(NdArray::random_normal(&[3, 4], Some(2)));
        let out = router.forward(&x, &Context::eval()).unwrap();
        for experts in &out.topk_indices {
            assert_eq!(experts.len(), 2);
        }
    }
}
