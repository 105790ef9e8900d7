//! Parameter optimization: Adam with per-parameter moment buffers,
//! global-L2-norm gradient clipping, and a linear-warmup/cosine-decay
//! learning-rate schedule (§4.7).

pub mod adam;
pub mod grad_clip;
pub mod lr_schedule;

pub use adam::Adam;
pub use grad_clip::clip_grad_norm;
pub use lr_schedule::LrSchedule;
