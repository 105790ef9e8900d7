use crate::autodiff::{ops, Context, Variable};
use crate::config::AttentionConfig;
use crate::errors::GPResult;
use crate::module::Module;

use super::attention::MultiHeadAttention;
use super::feedforward::{FeedForward, FfnActivation};
use super::kv_cache::KvCache;
use super::layernorm::LayerNorm;
use super::rmsnorm::RmsNorm;

/// Either normalization flavor a block can be built with, chosen once at
/// construction (LayerNorm for GPT-family, RMSNorm for MiniMind/DeepSeek-
/// style blocks per §4.5).
enum Norm {
    Layer(LayerNorm),
    Rms(RmsNorm),
}

impl Norm {
    fn forward(&self, x: &Variable, ctx: &Context) -> GPResult<Variable> {
        match self {
            Norm::Layer(n) => n.forward(x, ctx),
            Norm::Rms(n) => n.forward(x, ctx),
        }
    }

    fn module(&self) -> &Module {
        match self {
            Norm::Layer(n) => &n.module,
            Norm::Rms(n) => &n.module,
        }
    }
}

/// Whether the block composes attention and the feed-forward sub-layer
/// sequentially (pre-norm: `y = x + Attn(Norm(x))`, `z = y + FFN(Norm(y))`)
/// or computes both from independent norms of the same input and sums
/// both residual contributions in a single step (the GPT-3-style
/// "parallel" variant named in §4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockLayout {
    PreNorm,
    Parallel,
}

/// One Transformer decoder block: self-attention (causal, optionally
/// RoPE'd, optionally KV-cached) plus a feed-forward sub-layer, each
/// behind its own pre-norm and residual connection.
pub struct TransformerBlock {
    pub module: Module,
    layout: BlockLayout,
    attn_norm: Norm,
    attn: MultiHeadAttention,
    ffn_norm: Norm,
    ffn: FeedForward,
}

pub struct TransformerBlockConfig {
    pub attention: AttentionConfig,
    pub ffn_dim: usize,
    pub ffn_activation: FfnActivation,
    pub layer_norm_eps: f32,
    pub use_rms_norm: bool,
    pub layout: BlockLayout,
}

impl TransformerBlock {
    pub fn new(cfg: &TransformerBlockConfig, seed: Option<u64>) -> GPResult<Self> {
        let d_model = cfg.attention.d_model;

        let attn_norm = Self::build_norm(cfg.use_rms_norm, d_model, cfg.layer_norm_eps)?;
        let attn = MultiHeadAttention::new(&cfg.attention, seed)?;
        let ffn_norm = Self::build_norm(cfg.use_rms_norm, d_model, cfg.layer_norm_eps)?;
        let ffn = FeedForward::new(d_model, cfg.ffn_dim, cfg.ffn_activation, seed.map(|s| s + 10))?;

        let mut module = Module::new();
        module.register_module("attn_norm", attn_norm.module().clone())?;
        module.register_module("attn", attn.module.clone())?;
        module.register_module("ffn_norm", ffn_norm.module().clone())?;
        module.register_module("ffn", ffn.module.clone())?;

        Ok(Self { module, layout: cfg.layout, attn_norm, attn, ffn_norm, ffn })
    }

    fn build_norm(use_rms: bool, dim: usize, eps: f32) -> GPResult<Norm> {
        if use_rms {
            Ok(Norm::Rms(RmsNorm::new(dim, eps)?))
        } else {
            Ok(Norm::Layer(LayerNorm::new(dim, eps)?))
        }
    }

    pub fn forward(
        &self,
        x: &Variable,
        start_pos: usize,
        cache: Option<&mut KvCache>,
        ctx: &Context,
    ) -> GPResult<Variable> {
        match self.layout {
            BlockLayout::PreNorm => {
                let normed = self.attn_norm.forward(x, ctx)?;
                let attn_out = self.attn.forward(&normed, start_pos, cache, ctx)?;
                let y = ops::add(x, &attn_out, ctx)?;

                let normed = self.ffn_norm.forward(&y, ctx)?;
                let ffn_out = self.ffn.forward(&normed, ctx)?;
                ops::add(&y, &ffn_out, ctx)
            }
            BlockLayout::Parallel => {
                let attn_normed = self.attn_norm.forward(x, ctx)?;
                let attn_out = self.attn.forward(&attn_normed, start_pos, cache, ctx)?;

                let ffn_normed = self.ffn_norm.forward(x, ctx)?;
                let ffn_out = self.ffn.forward(&ffn_normed, ctx)?;

                let combined = ops::add(&attn_out, &ffn_out, ctx)?;
                ops::add(x, &combined, ctx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::NdArray;

    fn block_cfg(layout: BlockLayout) -> TransformerBlockConfig {
        TransformerBlockConfig {
            attention: AttentionConfig {
                d_model: 8,
                num_heads: 2,
                causal: true,
                max_seq_len: 16,
                dropout: 0.0,
                use_rope: false,
                rope_base: 10000.0,
            },
            ffn_dim: 16,
            ffn_activation: FfnActivation::Gelu,
            layer_norm_eps: 1e-5,
            use_rms_norm: false,
            layout,
        }
    }

    #[test]
    fn pre_norm_preserves_shape() {
        let block = TransformerBlock::new(&block_cfg(BlockLayout::PreNorm), Some(0)).unwrap();
        let x = Variable::new_with_grad(NdArray::random_normal(&[2, 4, 8], Some(1)));
        let y = block.forward(&x, 0, None, &Context::eval()).unwrap();
        assert_eq!(y.shape().dims(), &[2, 4, 8]);
    }

    #[test]
    fn parallel_layout_preserves_shape() {
        let block = TransformerBlock::new(&block_cfg(BlockLayout::Parallel), Some(0)).unwrap();
        let x = Variable::new_with_grad(NdArray::random_normal(&[2, 4, 8], Some(1)));
        let y = block.forward(&x, 0, None, &Context::eval()).unwrap();
        assert_eq!(y.shape().dims(), &[2, 4, 8]);
    }

    #[test]
    fn rms_norm_variant_builds_and_runs() {
        let mut cfg = block_cfg(BlockLayout::PreNorm);
        cfg.use_rms_norm = true;
        cfg.ffn_activation = FfnActivation::Silu;
        let block = TransformerBlock::new(&cfg, Some(0)).unwrap();
        let x = Variable::new_with_grad(NdArray::random_normal(&[1, 3, 8], Some(1)));
        let y = block.forward(&x, 0, None, &Context::train()).unwrap();
        assert_eq!(y.shape().dims(), &[1, 3, 8]);
    }

    #[test]
    fn gradients_reach_attention_and_ffn_parameters() {
        let block = TransformerBlock::new(&block_cfg(BlockLayout::PreNorm), Some(0)).unwrap();
        let x = Variable::new_with_grad(NdArray::random_normal(&[1, 3, 8], Some(1)));
        let y = block.forward(&x, 0, None, &Context::train()).unwrap();
        let loss = ops::sum(&ops::sum(&ops::sum(&y, 0, &Context::train()).unwrap(), 0, &Context::train()).unwrap(), 0, &Context::train()).unwrap();
        loss.backward().unwrap();
        let params = block.module.named_parameters("", true);
        assert!(params.iter().all(|(_, p)| p.grad().is_some()));
    }
}
