use crate::autodiff::{ops, Context, Variable};
use crate::config::AttentionConfig;
use crate::errors::{GPError, GPResult};
use crate::module::Module;
use crate::tensor::NdArray;

use super::dropout::Dropout;
use super::kv_cache::KvCache;
use super::linear::Linear;

/// Multi-head self-attention with an optional causal mask, optional
/// rotary position embedding, and optional KV-cache for incremental
/// decoding. Projections are plain `d_model x d_model` [`Linear`]
/// layers with no bias, matching common decoder-only practice.
pub struct MultiHeadAttention {
    pub module: Module,
    d_model: usize,
    num_heads: usize,
    head_dim: usize,
    causal: bool,
    use_rope: bool,
    rope_tables: Option<(NdArray, NdArray)>,
    wq: Linear,
    wk: Linear,
    wv: Linear,
    wo: Linear,
    dropout: Dropout,
}

impl MultiHeadAttention {
    pub fn new(cfg: &AttentionConfig, seed: Option<u64>) -> GPResult<Self> {
        let cfg = cfg.clone().validate()?;
        let head_dim = cfg.head_dim();

        let wq = Linear::new(cfg.d_model, cfg.d_model, false, seed)?;
        let wk = Linear::new(cfg.d_model, cfg.d_model, false, seed.map(|s| s + 1))?;
        let wv = Linear::new(cfg.d_model, cfg.d_model, false, seed.map(|s| s + 2))?;
        let wo = Linear::new(cfg.d_model, cfg.d_model, false, seed.map(|s| s + 3))?;

        let mut module = Module::new();
        module.register_module("wq", wq.module.clone())?;
        module.register_module("wk", wk.module.clone())?;
        module.register_module("wv", wv.module.clone())?;
        module.register_module("wo", wo.module.clone())?;

        let rope_tables = if cfg.use_rope {
            let (cos, sin) = ops::rope_tables(cfg.max_seq_len, head_dim, cfg.rope_base)?;
            module.register_buffer("rope_cos", cos.clone())?;
            module.register_buffer("rope_sin", sin.clone())?;
            Some((cos, sin))
        } else {
            None
        };

        let dropout = Dropout::new(cfg.dropout)?;

        Ok(Self {
            module,
            d_model: cfg.d_model,
            num_heads: cfg.num_heads,
            head_dim,
            causal: cfg.causal,
            use_rope: cfg.use_rope,
            rope_tables,
            wq,
            wk,
            wv,
            wo,
            dropout,
        })
    }

    /// `(batch, seq, d_model)` -> `(batch, heads, seq, head_dim)`.
    fn split_heads(&self, x: &Variable, ctx: &Context) -> GPResult<Variable> {
        let dims = x.shape().to_vec();
        let (batch, seq) = (dims[0], dims[1]);
        let reshaped = ops::reshape(x, &[batch, seq, self.num_heads, self.head_dim], ctx)?;
        ops::transpose_perm(&reshaped, &[0, 2, 1, 3], ctx)
    }

    /// Inverse of `split_heads`.
    fn merge_heads(&self, x: &Variable, ctx: &Context) -> GPResult<Variable> {
        let dims = x.shape().to_vec();
        let (batch, seq) = (dims[0], dims[2]);
        let transposed = ops::transpose_perm(x, &[0, 2, 1, 3], ctx)?;
        ops::reshape(&transposed, &[batch, seq, self.d_model], ctx)
    }

    /// `x` is `(batch, seq, d_model)`. `start_pos` is the absolute
    /// position of `x`'s first token (0 for a full forward pass, > 0
    /// when `x` holds only newly generated tokens). When `cache` is
    /// given, K/V for `x`'s positions are appended to it and the full
    /// cached history is attended over; `x` itself still only supplies
    /// the query positions.
    #[tracing::instrument(skip(self, x, cache, ctx), name = "kernel_multi_head_attention")]
    pub fn forward(
        &self,
        x: &Variable,
        start_pos: usize,
        cache: Option<&mut KvCache>,
        ctx: &Context,
    ) -> GPResult<Variable> {
        let dims = x.shape().to_vec();
        if dims.len() != 3 || dims[2] != self.d_model {
            return Err(GPError::shape(vec![0, 0, self.d_model], dims));
        }
        let new_seq = dims[1];

        let q = self.split_heads(&self.wq.forward(x, ctx)?, ctx)?;
        let mut k = self.split_heads(&self.wk.forward(x, ctx)?, ctx)?;
        let mut v = self.split_heads(&self.wv.forward(x, ctx)?, ctx)?;

        let mut q = q;
        if self.use_rope {
            let (cos, sin) = self.rope_tables.as_ref().expect("rope tables built when use_rope is set");
            q = ops::rope(&q, cos, sin, start_pos, ctx)?;
            k = ops::rope(&k, cos, sin, start_pos, ctx)?;
        }

        let total_seq = match cache {
            Some(cache) => {
                let (cached_k, cached_v) = cache.update(&k.value(), &v.value())?;
                k = Variable::new(cached_k);
                v = Variable::new(cached_v);
                cache.current_len()
            }
            None => new_seq,
        };

        let k_t = ops::transpose_perm(&k, &[0, 1, 3, 2], ctx)?;
        let scores = ops::batch_matmul(&q, &k_t, ctx)?;
        let scores = ops::div_scalar(&scores, (self.head_dim as f32).sqrt(), ctx)?;

        let scores = if self.causal {
            let mask = causal_mask(new_seq, total_seq, start_pos);
            ops::masked_fill(&scores, &mask, f32::NEG_INFINITY, ctx)?
        } else {
            scores
        };

        let weights = ops::softmax(&scores, -1, ctx)?;
        let weights = self.dropout.forward(&weights, ctx)?;

        let out = ops::batch_matmul(&weights, &v, ctx)?;
        let merged = self.merge_heads(&out, ctx)?;
        self.wo.forward(&merged, ctx)
    }
}

/// `(new_seq, total_seq)` mask, `1.0` where key position `j` lies
/// strictly beyond query `i`'s absolute position `start_pos + i`.
fn causal_mask(new_seq: usize, total_seq: usize, start_pos: usize) -> NdArray {
    let mut data = vec![0.0f32; new_seq * total_seq];
    for i in 0..new_seq {
        let query_pos = start_pos + i;
        for j in 0..total_seq {
            if j > query_pos {
                data[i * total_seq + j] = 1.0;
            }
        }
    }
    NdArray::of(data, Some(&[new_seq, total_seq])).expect("shape matches data length")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(causal: bool, use_rope: bool) -> AttentionConfig {
        AttentionConfig {
            d_model: 8,
            num_heads: 2,
            causal,
            max_seq_len: 16,
            dropout: 0.0,
            use_rope,
            rope_base: 10000.0,
        }
    }

    #[test]
    fn output_shape_matches_input() {
        let attn = MultiHeadAttention::new(&cfg(true, false), Some(0)).unwrap();
        let x = Variable::new_with_grad(NdArray::random_normal(&[2, 5, 8], Some(1)));
        let y = attn.forward(&x, 0, None, &Context::eval()).unwrap();
        assert_eq!(y.shape().dims(), &[2, 5, 8]);
    }

    #[test]
    fn causal_mask_blocks_future_positions() {
        let mask = causal_mask(3, 3, 0);
        assert_eq!(mask.as_slice().unwrap(), &[0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn incremental_decode_matches_full_forward_mask_window() {
        let attn = MultiHeadAttention::new(&cfg(true, true), Some(3)).unwrap();
        let x = Variable::new_with_grad(NdArray::random_normal(&[1, 4, 8], Some(2)));
        let mut cache = KvCache::new(1, 2, 4, 16);
        for t in 0..4 {
            let single = Variable::new_with_grad(
                NdArray::of(x.value().as_slice().unwrap()[t * 8..(t + 1) * 8].to_vec(), Some(&[1, 1, 8])).unwrap(),
            );
            let _ = attn.forward(&single, t, Some(&mut cache), &Context::eval()).unwrap();
        }
        assert_eq!(cache.current_len(), 4);
    }

    #[test]
    fn rejects_wrong_feature_dim() {
        let attn = MultiHeadAttention::new(&cfg(false, false), Some(0)).unwrap();
        let x = Variable::new_with_grad(NdArray::ones(&[1, 3, 9]));
        assert!(attn.forward(&x, 0, None, &Context::eval()).is_err());
    }

    #[test]
    fn zeroed_output_projection_zeroes_the_output() {
        let attn = MultiHeadAttention::new(&cfg(true, false), Some(0)).unwrap();
        attn.wo.module.parameter("weight").unwrap().set_value(NdArray::zeros(&[8, 8]));
        let x = Variable::new_with_grad(NdArray::random_normal(&[1, 3, 8], Some(1)));
        let y = attn.forward(&x, 0, None, &Context::eval()).unwrap();
        assert!(y.value().as_slice().unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn causal_output_at_a_position_is_independent_of_later_positions() {
        let attn = MultiHeadAttention::new(
            &AttentionConfig {
                d_model: 4,
                num_heads: 1,
                causal: true,
                max_seq_len: 8,
                dropout: 0.0,
                use_rope: false,
                rope_base: 10000.0,
            },
            Some(0),
        )
        .unwrap();
        for proj in [&attn.wq, &attn.wk, &attn.wv, &attn.wo] {
            proj.module.parameter("weight").unwrap().set_value(NdArray::eye(&[4, 4]).unwrap());
        }

        let rows = [vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0], vec![0.0, 0.0, 1.0, 0.0]];
        let make_input = |last_row: &[f32]| {
            let mut data = rows[0].clone();
            data.extend(rows[1].clone());
            data.extend(last_row.iter().copied());
            Variable::new_with_grad(NdArray::of(data, Some(&[1, 3, 4])).unwrap())
        };

        let y1 = attn.forward(&make_input(&rows[2]), 0, None, &Context::eval()).unwrap();
        let y2 = attn.forward(&make_input(&[0.0, 0.0, 0.0, 9.0]), 0, None, &Context::eval()).unwrap();

        for pos in 0..2 {
            for d in 0..4 {
                let a = y1.value().get(&[0, pos, d]).unwrap();
                let b = y2.value().get(&[0, pos, d]).unwrap();
                assert!((a - b).abs() < 1e-5, "position {pos} changed when only position 2 differed");
            }
        }
        let diff_at_2: f32 = (0..4).map(|d| (y1.value().get(&[0, 2, d]).unwrap() - y2.value().get(&[0, 2, d]).unwrap()).abs()).sum();
        assert!(diff_at_2 > 1e-4, "position 2's own output should change");
    }
}
