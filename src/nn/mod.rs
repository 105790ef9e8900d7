//! Parameterized layers built on top of the autodiff engine: the linear
//! algebra primitives (`Linear`, norms, dropout), the Transformer
//! operator library (attention, RoPE, KV-cache), and the embedding/
//! feed-forward/block layers that compose them (§4.4, §4.5).

pub mod attention;
pub mod dropout;
pub mod embedding;
pub mod feedforward;
pub mod kv_cache;
pub mod layernorm;
pub mod linear;
pub mod rmsnorm;
pub mod transformer_block;

pub use attention::MultiHeadAttention;
pub use dropout::Dropout;
pub use embedding::Embedding;
pub use feedforward::{FeedForward, FfnActivation};
pub use kv_cache::KvCache;
pub use layernorm::LayerNorm;
pub use linear::Linear;
pub use rmsnorm::RmsNorm;
pub use transformer_block::{BlockLayout, TransformerBlock, TransformerBlockConfig};
