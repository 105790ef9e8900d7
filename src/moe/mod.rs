//! Mixture-of-Experts feed-forward layer: noisy top-K routing over a
//! bank of per-expert MLPs, with usage tracking and an auxiliary
//! load-balance loss (§4.6).

pub mod layer;
pub mod router;
pub mod usage_stats;

pub use layer::{MoeLayer, MoeOutput};
pub use router::{Router, RouterOutput};
pub use usage_stats::UsageStats;
