use ndarray::{Array2, ArrayD};
use ndarray_rand::rand_distr::{Normal, Uniform};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::errors::{GPError, GPResult};

use super::NdArray;

impl NdArray {
    pub fn zeros(shape: &[usize]) -> Self {
        Self::from_array(ArrayD::zeros(Self::ix(shape)))
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::from_array(ArrayD::ones(Self::ix(shape)))
    }

    /// Identity matrix. `shape` must be a 2-D square shape.
    pub fn eye(shape: &[usize]) -> GPResult<Self> {
        if shape.len() != 2 || shape[0] != shape[1] {
            return Err(GPError::argument("eye requires a square 2-D shape"));
        }
        let arr: Array2<f32> = Array2::eye(shape[0]);
        Ok(Self::from_array(arr.into_dyn()))
    }

    /// Builds an array from flat `data` laid out row-major for `shape`.
    /// If `shape` is omitted, `data` is treated as a 1-D vector.
    pub fn of(data: Vec<f32>, shape: Option<&[usize]>) -> GPResult<Self> {
        let dims: Vec<usize> = match shape {
            Some(s) => s.to_vec(),
            None => vec![data.len()],
        };
        let expected: usize = dims.iter().product();
        if expected != data.len() {
            return Err(GPError::shape(dims, vec![data.len()]));
        }
        let arr = ArrayD::from_shape_vec(Self::ix(&dims), data)
            .map_err(|e| GPError::Other(e.to_string()))?;
        Ok(Self::from_array(arr))
    }

    pub fn from_vec1(data: Vec<f32>) -> Self {
        Self::from_array(ArrayD::from_shape_vec(Self::ix(&[data.len()]), data).unwrap())
    }

    pub fn from_vec2(data: Vec<Vec<f32>>) -> GPResult<Self> {
        let rows = data.len();
        let cols = data.first().map(|r| r.len()).unwrap_or(0);
        if data.iter().any(|r| r.len() != cols) {
            return Err(GPError::argument("ragged 2-D literal"));
        }
        let flat: Vec<f32> = data.into_iter().flatten().collect();
        Self::of(flat, Some(&[rows, cols]))
    }

    /// `n` evenly spaced values in `[start, end]`, inclusive. `n` must be >= 1.
    pub fn linspace(start: f32, end: f32, n: usize) -> GPResult<Self> {
        if n == 0 {
            return Err(GPError::argument("linspace requires n >= 1"));
        }
        if n == 1 {
            return Self::of(vec![start], Some(&[1]));
        }
        let step = (end - start) / ((n - 1) as f32);
        let data: Vec<f32> = (0..n).map(|i| start + step * i as f32).collect();
        Self::of(data, Some(&[n]))
    }

    pub fn random_normal(shape: &[usize], seed: Option<u64>) -> Self {
        let dist = Normal::new(0.0f32, 1.0).unwrap();
        let arr = match seed {
            Some(s) => {
                let mut rng = StdRng::seed_from_u64(s);
                ArrayD::random_using(Self::ix(shape), dist, &mut rng)
            }
            None => ArrayD::random(Self::ix(shape), dist),
        };
        Self::from_array(arr)
    }

    pub fn random_uniform(min: f32, max: f32, shape: &[usize], seed: Option<u64>) -> Self {
        let dist = Uniform::new(min, max);
        let arr = match seed {
            Some(s) => {
                let mut rng = StdRng::seed_from_u64(s);
                ArrayD::random_using(Self::ix(shape), dist, &mut rng)
            }
            None => ArrayD::random(Self::ix(shape), dist),
        };
        Self::from_array(arr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_and_ones_have_correct_size() {
        let z = NdArray::zeros(&[2, 3]);
        assert_eq!(z.shape().dims(), &[2, 3]);
        assert_eq!(z.size(), 6);
        let o = NdArray::ones(&[2, 3]);
        assert_eq!(o.as_slice().unwrap(), &[1.0; 6]);
    }

    #[test]
    fn linspace_rejects_zero_n() {
        assert!(NdArray::linspace(0.0, 1.0, 0).is_err());
        let l = NdArray::linspace(0.0, 4.0, 5).unwrap();
        assert_eq!(l.as_slice().unwrap(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn of_rejects_mismatched_size() {
        assert!(NdArray::of(vec![1.0, 2.0, 3.0], Some(&[2, 2])).is_err());
    }
}
