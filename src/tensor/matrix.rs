use ndarray::{ArrayD, Axis, IxDyn};

use crate::errors::{GPError, GPResult};

use super::NdArray;

impl NdArray {
    /// Batched matrix product: all but the trailing two axes are treated
    /// as matching "batch" dims, and a 2-D `dot` runs independently per
    /// batch slice. Needed for multi-head attention's per-(batch,head)
    /// `Q·Kᵀ` and `attn·V`, which plain `dot` cannot express.
    #[tracing::instrument(skip(self, other), name = "kernel_batched_matmul")]
    pub fn batched_dot(&self, other: &NdArray) -> GPResult<NdArray> {
        let a_shape = self.shape().to_vec();
        let b_shape = other.shape().to_vec();
        if a_shape.len() < 2 || b_shape.len() < 2 {
            return Err(GPError::NotSupported("batched_dot requires rank >= 2".into()));
        }
        let batch_a = &a_shape[..a_shape.len() - 2];
        let batch_b = &b_shape[..b_shape.len() - 2];
        if batch_a != batch_b {
            return Err(GPError::shape(batch_a.to_vec(), batch_b.to_vec()));
        }
        let (m, k) = (a_shape[a_shape.len() - 2], a_shape[a_shape.len() - 1]);
        let (k2, n) = (b_shape[b_shape.len() - 2], b_shape[b_shape.len() - 1]);
        if k != k2 {
            return Err(GPError::shape(vec![m, k], vec![k2, n]));
        }
        let batch: usize = batch_a.iter().product::<usize>().max(1);
        let a2 = self
            .as_ndarray()
            .clone()
            .into_shape(IxDyn(&[batch, m, k]))
            .map_err(|e| GPError::Other(e.to_string()))?;
        let b2 = other
            .as_ndarray()
            .clone()
            .into_shape(IxDyn(&[batch, k, n]))
            .map_err(|e| GPError::Other(e.to_string()))?;
        let mut out = ArrayD::<f32>::zeros(IxDyn(&[batch, m, n]));
        for i in 0..batch {
            let av = a2
                .index_axis(Axis(0), i)
                .into_dimensionality::<ndarray::Ix2>()
                .map_err(|e| GPError::Other(e.to_string()))?;
            let bv = b2
                .index_axis(Axis(0), i)
                .into_dimensionality::<ndarray::Ix2>()
                .map_err(|e| GPError::Other(e.to_string()))?;
            out.index_axis_mut(Axis(0), i).assign(&av.dot(&bv));
        }
        let mut out_shape = batch_a.to_vec();
        out_shape.push(m);
        out_shape.push(n);
        let out = out
            .into_shape(IxDyn(&out_shape))
            .map_err(|e| GPError::Other(e.to_string()))?;
        Ok(NdArray::from_array(out))
    }

    /// 2-D matrix product. Inner dimensions must match.
    #[tracing::instrument(skip(self, other), name = "kernel_matmul")]
    pub fn dot(&self, other: &NdArray) -> GPResult<NdArray> {
        if self.data.ndim() != 2 || other.data.ndim() != 2 {
            return Err(GPError::NotSupported("dot requires rank-2 arrays".into()));
        }
        let a = self
            .data
            .view()
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|e| GPError::Other(e.to_string()))?;
        let b = other
            .data
            .view()
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|e| GPError::Other(e.to_string()))?;
        if a.shape()[1] != b.shape()[0] {
            return Err(GPError::shape(vec![a.shape()[0], b.shape()[1]], vec![a.shape()[1], b.shape()[0]]));
        }
        Ok(NdArray::from_array(a.dot(&b).into_dyn()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_computes_matrix_product() {
        let a = NdArray::ones(&[2, 3]);
        let b = NdArray::ones(&[3, 4]);
        let c = a.dot(&b).unwrap();
        assert_eq!(c.shape().dims(), &[2, 4]);
        assert!(c.as_slice().unwrap().iter().all(|&v| v == 3.0));
    }

    #[test]
    fn dot_rejects_mismatched_inner_dims() {
        let a = NdArray::ones(&[2, 3]);
        let b = NdArray::ones(&[4, 5]);
        assert!(a.dot(&b).is_err());
    }

    #[test]
    fn batched_dot_runs_per_batch_slice() {
        let a = NdArray::ones(&[2, 3, 4]);
        let b = NdArray::ones(&[2, 4, 5]);
        let c = a.batched_dot(&b).unwrap();
        assert_eq!(c.shape().dims(), &[2, 3, 5]);
        assert!(c.as_slice().unwrap().iter().all(|&v| v == 4.0));
    }

    #[test]
    fn batched_dot_rejects_mismatched_batch_dims() {
        let a = NdArray::ones(&[2, 3, 4]);
        let b = NdArray::ones(&[3, 4, 5]);
        assert!(a.batched_dot(&b).is_err());
    }
}
