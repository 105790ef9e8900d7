//! Loss functions built on the autodiff operator library.

pub mod cross_entropy;

pub use cross_entropy::{cross_entropy, Labels};
