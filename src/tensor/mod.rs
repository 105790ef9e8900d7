//! The n-dimensional float32 array engine. An [`NdArray`] pairs an
//! immutable [`Shape`] descriptor with a contiguous row-major `f32`
//! buffer. No device enum: GPU backends are out of scope for this crate.

mod creation;
mod elementwise;
mod indexing;
mod logical;
mod matrix;
mod reduction;
mod shape_ops;
mod softmax;

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::errors::{GPError, GPResult};
use crate::shape::Shape;

/// A contiguous, row-major, float32 n-dimensional array.
///
/// Value-typed for read APIs: every op in this module allocates a fresh
/// `NdArray` unless its name says otherwise (`set`, `add_at`, `add_to`
/// mutate in place and are documented as such).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NdArray {
    data: ArrayD<f32>,
}

impl NdArray {
    pub(crate) fn from_array(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.data.shape().to_vec())
    }

    pub fn rank(&self) -> usize {
        self.data.ndim()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn as_ndarray(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn as_ndarray_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    pub fn into_ndarray(self) -> ArrayD<f32> {
        self.data
    }

    pub fn as_slice(&self) -> GPResult<&[f32]> {
        self.data
            .as_slice()
            .ok_or_else(|| GPError::Other("array is not contiguous".into()))
    }

    fn check_shape_eq(&self, other: &NdArray, op: &str) -> GPResult<()> {
        if self.data.shape() != other.data.shape() {
            return Err(GPError::Other(format!(
                "{op}: shape mismatch, expected {:?}, found {:?}",
                self.data.shape().to_vec(),
                other.data.shape().to_vec(),
            )));
        }
        Ok(())
    }

    pub(crate) fn ix(shape: &[usize]) -> IxDyn {
        IxDyn(shape)
    }
}

impl From<ArrayD<f32>> for NdArray {
    fn from(data: ArrayD<f32>) -> Self {
        Self { data }
    }
}
