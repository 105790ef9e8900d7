use ndarray::Axis;

use crate::errors::GPResult;

use super::NdArray;

impl NdArray {
    /// Numerically stable softmax along `axis` (negative axes resolve as
    /// `rank + axis`). Each reduced slice sums to 1.
    pub fn softmax(&self, axis: isize) -> GPResult<NdArray> {
        let ax = self.shape().resolve_axis(axis)?;
        let max = self.data.fold_axis(Axis(ax), f32::NEG_INFINITY, |a, &v| a.max(v));
        let max = max.insert_axis(Axis(ax));
        let mut shifted = self.data.clone();
        ndarray::Zip::from(&mut shifted)
            .and_broadcast(&max)
            .for_each(|o, &m| *o = (*o - m).exp());
        let sum = shifted.sum_axis(Axis(ax)).insert_axis(Axis(ax));
        ndarray::Zip::from(&mut shifted)
            .and_broadcast(&sum)
            .for_each(|o, &s| *o /= s);
        Ok(NdArray::from_array(shifted))
    }

    pub fn log_softmax(&self, axis: isize) -> GPResult<NdArray> {
        let ax = self.shape().resolve_axis(axis)?;
        let max = self.data.fold_axis(Axis(ax), f32::NEG_INFINITY, |a, &v| a.max(v));
        let max_kd = max.insert_axis(Axis(ax));
        let mut shifted = self.data.clone();
        ndarray::Zip::from(&mut shifted)
            .and_broadcast(&max_kd)
            .for_each(|o, &m| *o -= m);
        let log_sum_exp = shifted.mapv(f32::exp).sum_axis(Axis(ax)).mapv(f32::ln).insert_axis(Axis(ax));
        ndarray::Zip::from(&mut shifted)
            .and_broadcast(&log_sum_exp)
            .for_each(|o, &l| *o -= l);
        Ok(NdArray::from_array(shifted))
    }
}
