use ndarray::Zip;

use crate::errors::{GPError, GPResult};

use super::NdArray;

impl NdArray {
    pub fn eq(&self, other: &NdArray) -> GPResult<NdArray> {
        self.check_shape_eq(other, "eq")?;
        let mut out = self.data.clone();
        Zip::from(&mut out)
            .and(&other.data)
            .for_each(|o, &b| *o = if *o == b { 1.0 } else { 0.0 });
        Ok(NdArray::from_array(out))
    }

    pub fn gt(&self, other: &NdArray) -> GPResult<NdArray> {
        self.check_shape_eq(other, "gt")?;
        let mut out = self.data.clone();
        Zip::from(&mut out)
            .and(&other.data)
            .for_each(|o, &b| *o = if *o > b { 1.0 } else { 0.0 });
        Ok(NdArray::from_array(out))
    }

    pub fn lt(&self, other: &NdArray) -> GPResult<NdArray> {
        self.check_shape_eq(other, "lt")?;
        let mut out = self.data.clone();
        Zip::from(&mut out)
            .and(&other.data)
            .for_each(|o, &b| *o = if *o < b { 1.0 } else { 0.0 });
        Ok(NdArray::from_array(out))
    }

    /// 0/1 mask of elements strictly greater than `threshold`.
    pub fn mask(&self, threshold: f32) -> NdArray {
        NdArray::from_array(self.data.mapv(|v| if v > threshold { 1.0 } else { 0.0 }))
    }

    pub fn maximum(&self, threshold: f32) -> NdArray {
        NdArray::from_array(self.data.mapv(|v| v.max(threshold)))
    }

    pub fn clip(&self, lo: f32, hi: f32) -> GPResult<NdArray> {
        if lo > hi {
            return Err(GPError::argument(format!("clip lo={lo} > hi={hi}")));
        }
        Ok(NdArray::from_array(self.data.mapv(|v| v.clamp(lo, hi))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_rejects_inverted_bounds() {
        let a = NdArray::zeros(&[2]);
        assert!(a.clip(1.0, 0.0).is_err());
    }

    #[test]
    fn mask_is_strict_gt() {
        let a = NdArray::of(vec![0.0, 1.0, 2.0], None).unwrap();
        let m = a.mask(1.0);
        assert_eq!(m.as_slice().unwrap(), &[0.0, 0.0, 1.0]);
    }
}
