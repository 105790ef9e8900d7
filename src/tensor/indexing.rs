use ndarray::{Array2, Axis, IxDyn};

use crate::errors::{GPError, GPResult};

use super::NdArray;

impl NdArray {
    pub fn get(&self, indices: &[usize]) -> GPResult<f32> {
        self.data
            .get(IxDyn(indices))
            .copied()
            .ok_or_else(|| GPError::index(indices.last().map(|&i| i as isize).unwrap_or(0), 0))
    }

    pub fn set(&mut self, value: f32, indices: &[usize]) -> GPResult<()> {
        let slot = self
            .data
            .get_mut(IxDyn(indices))
            .ok_or_else(|| GPError::index(indices.last().map(|&i| i as isize).unwrap_or(0), 0))?;
        *slot = value;
        Ok(())
    }

    /// Selects a subset of rows and/or columns of a 2-D array. `None`
    /// on either axis means "keep everything on that axis".
    pub fn get_item(&self, row_ids: Option<&[usize]>, col_ids: Option<&[usize]>) -> GPResult<NdArray> {
        if self.data.ndim() != 2 {
            return Err(GPError::NotSupported("get_item requires a rank-2 array".into()));
        }
        let a2 = self
            .data
            .view()
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|e| GPError::Other(e.to_string()))?;
        let (nrows, ncols) = a2.dim();

        let rows: Vec<usize> = match row_ids {
            Some(ids) => ids.to_vec(),
            None => (0..nrows).collect(),
        };
        let cols: Vec<usize> = match col_ids {
            Some(ids) => ids.to_vec(),
            None => (0..ncols).collect(),
        };

        let mut out = Array2::<f32>::zeros((rows.len(), cols.len()));
        for (oi, &ri) in rows.iter().enumerate() {
            if ri >= nrows {
                return Err(GPError::index(ri as isize, nrows));
            }
            for (oj, &ci) in cols.iter().enumerate() {
                if ci >= ncols {
                    return Err(GPError::index(ci as isize, ncols));
                }
                out[[oi, oj]] = a2[[ri, ci]];
            }
        }
        Ok(NdArray::from_array(out.into_dyn()))
    }

    /// Slices a rectangular block out of a rank-2 array (half-open ranges).
    pub fn slice_block(&self, row_lo: usize, row_hi: usize, col_lo: usize, col_hi: usize) -> GPResult<NdArray> {
        if self.data.ndim() != 2 {
            return Err(GPError::NotSupported("slice_block requires a rank-2 array".into()));
        }
        let a2 = self
            .data
            .view()
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|e| GPError::Other(e.to_string()))?;
        let (nrows, ncols) = a2.dim();
        if row_hi > nrows || col_hi > ncols || row_lo > row_hi || col_lo > col_hi {
            return Err(GPError::index(row_hi as isize, nrows));
        }
        let view = a2.slice(ndarray::s![row_lo..row_hi, col_lo..col_hi]);
        Ok(NdArray::from_array(view.to_owned().into_dyn()))
    }

    /// Scatter-add `delta`'s rows into `self` at `row_ids` (duplicates
    /// accumulate). `self` must be rank-2; `delta` must have
    /// `row_ids.len()` rows. If `col_ids` is given, only those columns
    /// of each row receive the add.
    pub fn add_at(&mut self, row_ids: &[usize], col_ids: Option<&[usize]>, delta: &NdArray) -> GPResult<()> {
        if self.data.ndim() != 2 || delta.data.ndim() != 2 {
            return Err(GPError::NotSupported("add_at requires rank-2 arrays".into()));
        }
        let ncols_self = self.data.shape()[1];
        let delta2 = delta
            .data
            .view()
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|e| GPError::Other(e.to_string()))?;
        if delta2.nrows() != row_ids.len() {
            return Err(GPError::shape(vec![row_ids.len()], vec![delta2.nrows()]));
        }
        let cols: Vec<usize> = match col_ids {
            Some(ids) => ids.to_vec(),
            None => (0..ncols_self).collect(),
        };
        let mut a2 = self
            .data
            .view_mut()
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|e| GPError::Other(e.to_string()))?;
        for (di, &ri) in row_ids.iter().enumerate() {
            if ri >= a2.nrows() {
                return Err(GPError::index(ri as isize, a2.nrows()));
            }
            for (dj, &cj) in cols.iter().enumerate() {
                a2[[ri, cj]] += delta2[[di, dj]];
            }
        }
        Ok(())
    }

    /// In-place block add: `self[row_off.., col_off..] += other`.
    pub fn add_to(&mut self, row_off: usize, col_off: usize, other: &NdArray) -> GPResult<()> {
        if self.data.ndim() != 2 || other.data.ndim() != 2 {
            return Err(GPError::NotSupported("add_to requires rank-2 arrays".into()));
        }
        let other2 = other
            .data
            .view()
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|e| GPError::Other(e.to_string()))?;
        let (oh, ow) = other2.dim();
        let mut a2 = self
            .data
            .view_mut()
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|e| GPError::Other(e.to_string()))?;
        if row_off + oh > a2.nrows() || col_off + ow > a2.ncols() {
            return Err(GPError::shape(
                vec![a2.nrows(), a2.ncols()],
                vec![row_off + oh, col_off + ow],
            ));
        }
        let mut dest = a2.slice_mut(ndarray::s![row_off..row_off + oh, col_off..col_off + ow]);
        dest += &other2;
        Ok(())
    }

    pub fn axis_len(&self, axis: usize) -> usize {
        self.data.shape().get(axis).copied().unwrap_or(0)
    }

    pub(crate) fn select_axis0(&self, indices: &[usize]) -> GPResult<NdArray> {
        let n = self.data.shape()[0];
        for &i in indices {
            if i >= n {
                return Err(GPError::index(i as isize, n));
            }
        }
        let views: Vec<_> = indices
            .iter()
            .map(|&i| self.data.index_axis(Axis(0), i))
            .collect();
        let stacked = ndarray::stack(Axis(0), &views).map_err(|e| GPError::Other(e.to_string()))?;
        Ok(NdArray::from_array(stacked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_roundtrip() {
        let mut a = NdArray::zeros(&[2, 2]);
        a.set(5.0, &[1, 1]).unwrap();
        assert_eq!(a.get(&[1, 1]).unwrap(), 5.0);
    }

    #[test]
    fn add_at_accumulates_duplicates() {
        let mut buf = NdArray::zeros(&[3, 2]);
        let delta = NdArray::of(vec![1.0, 1.0, 2.0, 2.0], Some(&[2, 2])).unwrap();
        buf.add_at(&[0, 0], None, &delta).unwrap();
        assert_eq!(buf.get(&[0, 0]).unwrap(), 3.0);
    }

    #[test]
    fn add_to_writes_block() {
        let mut buf = NdArray::zeros(&[4, 2]);
        let block = NdArray::ones(&[2, 2]);
        buf.add_to(1, 0, &block).unwrap();
        assert_eq!(buf.get(&[1, 0]).unwrap(), 1.0);
        assert_eq!(buf.get(&[0, 0]).unwrap(), 0.0);
    }
}
