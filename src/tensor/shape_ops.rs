use ndarray::{ArrayD, Axis, IxDyn};

use crate::errors::{GPError, GPResult};
use crate::shape::Shape;

use super::NdArray;

impl NdArray {
    pub fn reshape(&self, shape: &[usize]) -> GPResult<NdArray> {
        let new_size: usize = shape.iter().product();
        if new_size != self.data.len() {
            return Err(GPError::shape(shape.to_vec(), self.data.shape().to_vec()));
        }
        let reshaped = self
            .data
            .clone()
            .into_shape(IxDyn(shape))
            .map_err(|_| GPError::shape(shape.to_vec(), self.data.shape().to_vec()))?;
        Ok(NdArray::from_array(reshaped))
    }

    /// Reverses the axes of a 2-D array.
    pub fn transpose(&self) -> GPResult<NdArray> {
        if self.data.ndim() != 2 {
            return Err(GPError::NotSupported(
                "transpose() with no permutation requires rank 2; use transpose_perm".into(),
            ));
        }
        Ok(NdArray::from_array(self.data.t().to_owned()))
    }

    pub fn transpose_perm(&self, perm: &[usize]) -> GPResult<NdArray> {
        if !Shape::is_permutation(perm, self.data.ndim()) {
            return Err(GPError::argument(format!(
                "{perm:?} is not a valid permutation of rank {}",
                self.data.ndim()
            )));
        }
        Ok(NdArray::from_array(
            self.data.clone().permuted_axes(IxDyn(perm)).as_standard_layout().to_owned(),
        ))
    }

    pub fn flatten(&self) -> NdArray {
        let n = self.data.len();
        NdArray::from_array(
            self.data
                .clone()
                .into_shape(IxDyn(&[1, n]))
                .expect("flatten is always a valid reshape"),
        )
    }

    pub fn broadcast_to(&self, shape: &[usize]) -> GPResult<NdArray> {
        let target = Shape::new(shape.to_vec());
        if !self.shape().is_broadcast_compatible(&target) {
            return Err(GPError::shape(shape.to_vec(), self.data.shape().to_vec()));
        }
        let view = self
            .data
            .broadcast(IxDyn(shape))
            .ok_or_else(|| GPError::shape(shape.to_vec(), self.data.shape().to_vec()))?;
        Ok(NdArray::from_array(view.to_owned()))
    }

    /// The inverse of `broadcast_to`: sums this array down to `shape`,
    /// collapsing axes that were broadcast from size 1 (or from
    /// nonexistence, for leading axes).
    pub fn sum_to(&self, shape: &[usize]) -> GPResult<NdArray> {
        let src_dims = self.data.ndim();
        let dst_dims = shape.len();
        if dst_dims > src_dims {
            return Err(GPError::shape(shape.to_vec(), self.data.shape().to_vec()));
        }

        let mut result: ArrayD<f32> = self.data.clone();

        let leading = src_dims - dst_dims;
        for _ in 0..leading {
            result = result.sum_axis(Axis(0));
        }

        for (i, &target_dim) in shape.iter().enumerate() {
            if target_dim == 1 && result.shape()[i] != 1 {
                result = result.sum_axis(Axis(i)).insert_axis(Axis(i));
            }
        }

        if result.shape() != shape {
            return Err(GPError::shape(shape.to_vec(), result.shape().to_vec()));
        }
        Ok(NdArray::from_array(result))
    }
}
