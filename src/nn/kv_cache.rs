use ndarray::{Axis, Slice};

use crate::errors::{GPError, GPResult};
use crate::tensor::NdArray;

/// Per-layer key/value cache for incremental decoding. Pre-allocates
/// `(batch, heads, max_len, head_dim)` buffers and writes into a moving
/// window instead of rebuilding the full history each step (Design
/// Notes' guidance against `O(L^2)` concatenation cost).
pub struct KvCache {
    batch: usize,
    heads: usize,
    head_dim: usize,
    max_len: usize,
    current_len: usize,
    k: NdArray,
    v: NdArray,
}

impl KvCache {
    pub fn new(batch: usize, heads: usize, head_dim: usize, max_len: usize) -> Self {
        Self {
            batch,
            heads,
            head_dim,
            max_len,
            current_len: 0,
            k: NdArray::zeros(&[batch, heads, max_len, head_dim]),
            v: NdArray::zeros(&[batch, heads, max_len, head_dim]),
        }
    }

    pub fn current_len(&self) -> usize {
        self.current_len
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn clear(&mut self) {
        self.current_len = 0;
        self.k = NdArray::zeros(&[self.batch, self.heads, self.max_len, self.head_dim]);
        self.v = NdArray::zeros(&[self.batch, self.heads, self.max_len, self.head_dim]);
    }

    /// Appends `new_k`/`new_v` (each `(batch, heads, s, head_dim)`) and
    /// returns the valid `(K, V)` prefix afterward, shape
    /// `(batch, heads, current_len', head_dim)`. If the append would
    /// overflow `max_len`, the oldest cached positions are dropped first.
    pub fn update(&mut self, new_k: &NdArray, new_v: &NdArray) -> GPResult<(NdArray, NdArray)> {
        let dims = new_k.shape().to_vec();
        if dims.len() != 4 || dims[0] != self.batch || dims[1] != self.heads || dims[3] != self.head_dim {
            return Err(GPError::shape(vec![self.batch, self.heads, 0, self.head_dim], dims));
        }
        if new_v.shape().dims() != new_k.shape().dims() {
            return Err(GPError::shape(new_k.shape().to_vec(), new_v.shape().to_vec()));
        }
        let s = dims[2];

        if s >= self.max_len {
            let src_start = s - self.max_len;
            self.write_window(new_k, new_v, 0, src_start, self.max_len);
            self.current_len = self.max_len;
        } else if self.current_len + s > self.max_len {
            let overflow = self.current_len + s - self.max_len;
            let kept = self.current_len - overflow;
            self.shift_left(overflow, kept);
            self.write_window(new_k, new_v, kept, 0, s);
            self.current_len = self.max_len;
        } else {
            self.write_window(new_k, new_v, self.current_len, 0, s);
            self.current_len += s;
        }

        Ok((self.valid_prefix(&self.k), self.valid_prefix(&self.v)))
    }

    fn valid_prefix(&self, buf: &NdArray) -> NdArray {
        let view = buf.as_ndarray().slice_axis(Axis(2), Slice::from(0..self.current_len));
        NdArray::from_array(view.to_owned())
    }

    fn write_window(&mut self, new_k: &NdArray, new_v: &NdArray, dst_start: usize, src_start: usize, len: usize) {
        let k_src = new_k.as_ndarray().slice_axis(Axis(2), Slice::from(src_start..src_start + len)).to_owned();
        self.k.as_ndarray_mut().slice_axis_mut(Axis(2), Slice::from(dst_start..dst_start + len)).assign(&k_src);
        let v_src = new_v.as_ndarray().slice_axis(Axis(2), Slice::from(src_start..src_start + len)).to_owned();
        self.v.as_ndarray_mut().slice_axis_mut(Axis(2), Slice::from(dst_start..dst_start + len)).assign(&v_src);
    }

    fn shift_left(&mut self, by: usize, kept: usize) {
        if kept == 0 {
            return;
        }
        let k_src = self.k.as_ndarray().slice_axis(Axis(2), Slice::from(by..by + kept)).to_owned();
        self.k.as_ndarray_mut().slice_axis_mut(Axis(2), Slice::from(0..kept)).assign(&k_src);
        let v_src = self.v.as_ndarray().slice_axis(Axis(2), Slice::from(by..by + kept)).to_owned();
        self.v.as_ndarray_mut().slice_axis_mut(Axis(2), Slice::from(0..kept)).assign(&v_src);
    }
}
