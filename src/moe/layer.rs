use crate::autodiff::{ops, Context, Variable};
use crate::config::MoEConfig;
use crate::errors::GPResult;
use crate::module::Module;
use crate::nn::feedforward::{FeedForward, FfnActivation};
use crate::tensor::NdArray;

use super::router::Router;
use super::usage_stats::UsageStats;

/// Mixture-of-Experts feed-forward layer: a noisy top-K [`Router`]
/// dispatches each sample to `top_k` of `num_experts` two-layer ReLU
/// MLPs, weighted by the router's renormalized gate values (§4.6).
///
/// Dispatch is batched rather than looped per sample (Design Notes §9):
/// every expert runs over the full batch, and its contribution is
/// zeroed for samples that didn't select it via the router's dispatch
/// mask, so the observable output matches per-sample dispatch exactly.
pub struct MoeLayer {
    pub module: Module,
    router: Router,
    experts: Vec<FeedForward>,
    num_experts: usize,
    load_balance_alpha: f32,
    load_balance_beta: f32,
    usage: UsageStats,
}

/// Router output plus the auxiliary load-balance loss, returned
/// alongside the weighted expert output so a trainer can add it
/// (scaled) to the language-model loss.
pub struct MoeOutput {
    pub output: Variable,
    pub load_balance_loss: Variable,
}

impl MoeLayer {
    pub fn new(cfg: &MoEConfig, seed: Option<u64>) -> GPResult<Self> {
        let cfg = cfg.clone().validate()?;
        let router = Router::new(&cfg, seed)?;
        let experts: Vec<FeedForward> = (0..cfg.num_experts)
            .map(|i| FeedForward::new(cfg.d_model, cfg.ffn_dim, FfnActivation::Relu, seed.map(|s| s + 100 + i as u64)))
            .collect::<GPResult<_>>()?;

        let mut module = Module::new();
        module.register_module("router", router.module.clone())?;
        for (i, expert) in experts.iter().enumerate() {
            module.register_module(format!("expert_{i}"), expert.module.clone())?;
        }

        Ok(Self {
            module,
            router,
            experts,
            num_experts: cfg.num_experts,
            load_balance_alpha: cfg.load_balance_alpha,
            load_balance_beta: cfg.load_balance_beta,
            usage: UsageStats::new(cfg.num_experts),
        })
    }

    /// `x` is `(batch, d_model)`.
    #[tracing::instrument(skip(self, x, ctx), name = "kernel_moe_dispatch")]
    pub fn forward(&mut self, x: &Variable, ctx: &Context) -> GPResult<MoeOutput> {
        let routed = self.router.forward(x, ctx)?;
        self.usage.record(&routed.topk_indices);

        let mut output: Option<Variable> = None;
        for (e, expert) in self.experts.iter().enumerate() {
            let expert_out = expert.forward(x, ctx)?;
            let col = one_hot_column(self.num_experts, e);
            let gate_e = ops::matmul(&routed.dispatch_weights, &Variable::new(col), ctx)?; // (batch, 1)
            let weighted = ops::mul(&expert_out, &gate_e, ctx)?;
            output = Some(match output {
                Some(acc) => ops::add(&acc, &weighted, ctx)?,
                None => weighted,
            });
        }
        let output = output.expect("num_experts validated to be > 0");

        let load_balance_loss = self.load_balance_loss(&routed.all_weights, &routed.topk_indices, ctx)?;

        Ok(MoeOutput { output, load_balance_loss })
    }

    fn load_balance_loss(&self, all_weights: &Variable, topk_indices: &[Vec<usize>], ctx: &Context) -> GPResult<Variable> {
        let batch = all_weights.shape().dims()[0] as f32;

        let importance_sum = ops::sum(all_weights, 0, ctx)?; // (1, num_experts)
        let total = ops::sum(&importance_sum, 1, ctx)?; // (1, 1)
        let importance = ops::div(&importance_sum, &total, ctx)?; // (1, num_experts), sums to 1

        let mut load_counts = vec![0.0f32; self.num_experts];
        for experts in topk_indices {
            for &e in experts {
                load_counts[e] += 1.0;
            }
        }
        let load_total: f32 = load_counts.iter().sum();
        let load: Vec<f32> = if load_total > 0.0 {
            load_counts.iter().map(|&c| c / load_total).collect()
        } else {
            vec![1.0 / self.num_experts as f32; self.num_experts]
        };
        let load_array = NdArray::of(load.clone(), Some(&[1, self.num_experts]))?;

        let product = ops::mul(&importance, &Variable::new(load_array), ctx)?;
        let product_sum = ops::sum(&product, 1, ctx)?; // (1, 1)
        let scaled = ops::mul_scalar(&product_sum, self.load_balance_alpha * self.num_experts as f32, ctx)?;

        let mean = load.iter().sum::<f32>() / self.num_experts as f32;
        let var = load.iter().map(|&v| (v - mean).powi(2)).sum::<f32>() / self.num_experts as f32;
        let cv = if mean > 1e-12 { var.sqrt() / mean } else { 0.0 };
        let _ = batch;

        ops::add_scalar(&scaled, self.load_balance_beta * cv, ctx)
    }

    pub fn usage_stats(&self) -> &UsageStats {
        &self.usage
    }

    pub fn reset_usage_stats(&mut self) {
        self.usage.reset();
    }
}

fn one_hot_column(num_experts: usize, e: usize) -> NdArray {
    let mut data = vec![0.0f32; num_experts];
    data[e] = 1.0;
    NdArray::of(data, Some(&[num_experts, 1])).expect("one-hot column shape is always valid")
}
