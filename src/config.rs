//! Plain value configuration structs, validated at construction with
//! named errors per field rather than panics, covering model
//! hyperparameters.

use crate::errors::{GPError, GPResult};

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub max_positions: usize,
    pub d_model: usize,
    pub num_layers: usize,
    pub num_heads: usize,
    pub ffn_dim: usize,
    pub dropout: f32,
    pub attn_dropout: f32,
    pub layer_norm_eps: f32,
    pub initializer_range: f32,
}

impl ModelConfig {
    pub fn validate(self) -> GPResult<Self> {
        if self.vocab_size == 0 {
            return Err(GPError::argument("vocab_size must be > 0"));
        }
        if self.max_positions == 0 {
            return Err(GPError::argument("max_positions must be > 0"));
        }
        if self.d_model == 0 {
            return Err(GPError::argument("d_model must be > 0"));
        }
        if self.num_layers == 0 {
            return Err(GPError::argument("num_layers must be > 0"));
        }
        if self.num_heads == 0 || self.d_model % self.num_heads != 0 {
            return Err(GPError::argument(format!(
                "num_heads={} must divide d_model={} exactly",
                self.num_heads, self.d_model
            )));
        }
        if self.ffn_dim == 0 {
            return Err(GPError::argument("ffn_dim must be > 0"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(GPError::argument("dropout must be in [0, 1)"));
        }
        if !(0.0..1.0).contains(&self.attn_dropout) {
            return Err(GPError::argument("attn_dropout must be in [0, 1)"));
        }
        if self.layer_norm_eps <= 0.0 {
            return Err(GPError::argument("layer_norm_eps must be > 0"));
        }
        if self.initializer_range <= 0.0 {
            return Err(GPError::argument("initializer_range must be > 0"));
        }
        Ok(self)
    }

    pub fn head_dim(&self) -> usize {
        self.d_model / self.num_heads
    }
}

#[derive(Clone, Debug)]
pub struct AttentionConfig {
    pub d_model: usize,
    pub num_heads: usize,
    pub causal: bool,
    pub max_seq_len: usize,
    pub dropout: f32,
    pub use_rope: bool,
    pub rope_base: f32,
}

impl AttentionConfig {
    pub fn validate(self) -> GPResult<Self> {
        if self.num_heads == 0 || self.d_model % self.num_heads != 0 {
            return Err(GPError::argument(format!(
                "num_heads={} must divide d_model={} exactly",
                self.num_heads, self.d_model
            )));
        }
        if self.max_seq_len == 0 {
            return Err(GPError::argument("max_seq_len must be > 0"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(GPError::argument("dropout must be in [0, 1)"));
        }
        if self.use_rope && self.head_dim() % 2 != 0 {
            return Err(GPError::argument("rope requires an even head_dim"));
        }
        Ok(self)
    }

    pub fn head_dim(&self) -> usize {
        self.d_model / self.num_heads
    }
}

#[derive(Clone, Debug)]
pub struct MoEConfig {
    pub d_model: usize,
    pub ffn_dim: usize,
    pub num_experts: usize,
    pub top_k: usize,
    pub noise_factor: f32,
    pub load_balance_alpha: f32,
    pub load_balance_beta: f32,
}

impl MoEConfig {
    pub fn validate(self) -> GPResult<Self> {
        if self.d_model == 0 {
            return Err(GPError::argument("d_model must be > 0"));
        }
        if self.ffn_dim == 0 {
            return Err(GPError::argument("ffn_dim must be > 0"));
        }
        if self.num_experts == 0 {
            return Err(GPError::argument("num_experts must be > 0"));
        }
        if self.top_k == 0 || self.top_k > self.num_experts {
            return Err(GPError::argument("top_k must be in [1, num_experts]"));
        }
        if self.noise_factor < 0.0 {
            return Err(GPError::argument("noise_factor must be >= 0"));
        }
        Ok(self)
    }
}

#[derive(Clone, Debug)]
pub struct AdamConfig {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self { lr: 1e-3, beta1: 0.9, beta2: 0.999, eps: 1e-8 }
    }
}

impl AdamConfig {
    pub fn validate(self) -> GPResult<Self> {
        if self.lr <= 0.0 {
            return Err(GPError::argument("lr must be > 0"));
        }
        if !(0.0..1.0).contains(&self.beta1) || !(0.0..1.0).contains(&self.beta2) {
            return Err(GPError::argument("beta1/beta2 must be in [0, 1)"));
        }
        if self.eps <= 0.0 {
            return Err(GPError::argument("eps must be > 0"));
        }
        Ok(self)
    }
}

#[derive(Clone, Debug)]
pub struct LrScheduleConfig {
    pub lr_init: f32,
    pub lr_min: f32,
    pub warmup_steps: usize,
    pub total_steps: usize,
}

impl LrScheduleConfig {
    pub fn validate(self) -> GPResult<Self> {
        if self.lr_init <= 0.0 {
            return Err(GPError::argument("lr_init must be > 0"));
        }
        if self.lr_min < 0.0 || self.lr_min > self.lr_init {
            return Err(GPError::argument("lr_min must be in [0, lr_init]"));
        }
        if self.total_steps <= self.warmup_steps {
            return Err(GPError::argument("total_steps must exceed warmup_steps"));
        }
        Ok(self)
    }
}
