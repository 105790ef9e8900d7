use ndarray::{Array, ArrayD, Axis};

use crate::errors::GPResult;

use super::NdArray;

/// Reduces `axis`, keeping it as a size-1 dimension (so results broadcast
/// back against the input without a reshape), applying `fold` to combine
/// elements and `finish` to post-process the fold (e.g. divide by count
/// for a mean).
fn reduce_axis_keepdims(
    data: &ArrayD<f32>,
    axis: usize,
    init: f32,
    fold: impl Fn(f32, f32) -> f32,
    finish: impl Fn(f32, usize) -> f32,
) -> ArrayD<f32> {
    let n = data.shape()[axis];
    let folded = data.fold_axis(Axis(axis), init, |acc, &v| fold(*acc, v));
    let finished = folded.mapv(|v| finish(v, n));
    finished.insert_axis(Axis(axis))
}

impl NdArray {
    pub fn sum_all(&self) -> f32 {
        self.data.sum()
    }

    pub fn sum(&self, axis: isize) -> GPResult<NdArray> {
        let ax = self.shape().resolve_axis(axis)?;
        Ok(NdArray::from_array(reduce_axis_keepdims(
            &self.data,
            ax,
            0.0,
            |a, v| a + v,
            |v, _n| v,
        )))
    }

    pub fn mean(&self, axis: isize) -> GPResult<NdArray> {
        let ax = self.shape().resolve_axis(axis)?;
        Ok(NdArray::from_array(reduce_axis_keepdims(
            &self.data,
            ax,
            0.0,
            |a, v| a + v,
            |v, n| v / n as f32,
        )))
    }

    /// Population variance (divisor = N) along `axis`.
    pub fn var(&self, axis: isize) -> GPResult<NdArray> {
        let ax = self.shape().resolve_axis(axis)?;
        let mean = reduce_axis_keepdims(&self.data, ax, 0.0, |a, v| a + v, |v, n| v / n as f32);
        let n = self.data.shape()[ax];
        let centered_sq = {
            let mut out = self.data.clone();
            ndarray::Zip::from(&mut out)
                .and_broadcast(&mean)
                .for_each(|o, &m| *o = (*o - m) * (*o - m));
            out
        };
        Ok(NdArray::from_array(reduce_axis_keepdims(
            &centered_sq,
            ax,
            0.0,
            |a, v| a + v,
            |v, _n| v / n as f32,
        )))
    }

    pub fn max_all(&self) -> f32 {
        self.data.fold(f32::NEG_INFINITY, |a, &v| a.max(v))
    }

    pub fn max(&self, axis: isize) -> GPResult<NdArray> {
        let ax = self.shape().resolve_axis(axis)?;
        Ok(NdArray::from_array(reduce_axis_keepdims(
            &self.data,
            ax,
            f32::NEG_INFINITY,
            |a, v| a.max(v),
            |v, _n| v,
        )))
    }

    pub fn min(&self, axis: isize) -> GPResult<NdArray> {
        let ax = self.shape().resolve_axis(axis)?;
        Ok(NdArray::from_array(reduce_axis_keepdims(
            &self.data,
            ax,
            f32::INFINITY,
            |a, v| a.min(v),
            |v, _n| v,
        )))
    }

    /// Index (as f32) of the maximal element along `axis`, axis kept as size 1.
    pub fn argmax(&self, axis: isize) -> GPResult<NdArray> {
        let ax = self.shape().resolve_axis(axis)?;
        let n = self.data.shape()[ax];
        let mut out_shape = self.data.shape().to_vec();
        out_shape[ax] = 1;
        let mut out: ArrayD<f32> = Array::zeros(out_shape);

        for (mut out_lane, in_lane) in out
            .lanes_mut(Axis(ax))
            .into_iter()
            .zip(self.data.lanes(Axis(ax)))
        {
            let mut best_idx = 0usize;
            let mut best_val = f32::NEG_INFINITY;
            for i in 0..n {
                let v = in_lane[i];
                if v > best_val {
                    best_val = v;
                    best_idx = i;
                }
            }
            out_lane[0] = best_idx as f32;
        }
        Ok(NdArray::from_array(out))
    }
}
