//! Named weight initializers: a small registry covering zeros/ones,
//! Xavier, Kaiming, and orthogonal init.

use ndarray::Array2;

use crate::errors::{GPError, GPResult};
use crate::tensor::NdArray;

/// Linear weights are stored `(out, in)`, so `fan_in` is the trailing
/// dim and `fan_out` the leading one.
fn fan_in_out(shape: &[usize]) -> GPResult<(usize, usize)> {
    if shape.len() != 2 {
        return Err(GPError::NotSupported("fan_in/fan_out require a rank-2 shape".into()));
    }
    Ok((shape[1], shape[0]))
}

pub fn zeros(shape: &[usize]) -> NdArray {
    NdArray::zeros(shape)
}

pub fn ones(shape: &[usize]) -> NdArray {
    NdArray::ones(shape)
}

pub fn xavier_uniform(shape: &[usize], gain: f32, seed: Option<u64>) -> GPResult<NdArray> {
    let (fan_in, fan_out) = fan_in_out(shape)?;
    let bound = gain * (6.0 / (fan_in + fan_out) as f32).sqrt();
    Ok(NdArray::random_uniform(-bound, bound, shape, seed))
}

pub fn xavier_normal(shape: &[usize], gain: f32, seed: Option<u64>) -> GPResult<NdArray> {
    let (fan_in, fan_out) = fan_in_out(shape)?;
    let std = gain * (2.0 / (fan_in + fan_out) as f32).sqrt();
    Ok(scaled_normal(shape, std, seed))
}

fn scaled_normal(shape: &[usize], std: f32, seed: Option<u64>) -> NdArray {
    NdArray::random_normal(shape, seed).mul_scalar(std)
}

#[derive(Clone, Copy, Debug)]
pub enum FanMode {
    FanIn,
    FanOut,
}

#[derive(Clone, Copy, Debug)]
pub enum Nonlinearity {
    ReLU,
    Linear,
}

fn gain_for(nonlinearity: Nonlinearity, a: f32) -> f32 {
    match nonlinearity {
        Nonlinearity::ReLU => (2.0 / (1.0 + a * a)).sqrt(),
        Nonlinearity::Linear => 1.0,
    }
}

pub fn kaiming_uniform(
    shape: &[usize],
    a: f32,
    mode: FanMode,
    nonlinearity: Nonlinearity,
    seed: Option<u64>,
) -> GPResult<NdArray> {
    let (fan_in, fan_out) = fan_in_out(shape)?;
    let fan = match mode {
        FanMode::FanIn => fan_in,
        FanMode::FanOut => fan_out,
    };
    let gain = gain_for(nonlinearity, a);
    let bound = 3f32.sqrt() * gain / (fan as f32).sqrt();
    Ok(NdArray::random_uniform(-bound, bound, shape, seed))
}

pub fn kaiming_normal(
    shape: &[usize],
    a: f32,
    mode: FanMode,
    nonlinearity: Nonlinearity,
    seed: Option<u64>,
) -> GPResult<NdArray> {
    let (fan_in, fan_out) = fan_in_out(shape)?;
    let fan = match mode {
        FanMode::FanIn => fan_in,
        FanMode::FanOut => fan_out,
    };
    let gain = gain_for(nonlinearity, a);
    let std = gain / (fan as f32).sqrt();
    Ok(scaled_normal(shape, std, seed))
}

/// Orthogonal init via Gram-Schmidt QR on a random Gaussian square
/// matrix, trimmed to the requested rectangle. Falls back to
/// `xavier_normal` for non-2-D shapes, where orthogonality is undefined
/// (documented per the call site, not a silent shortcut).
pub fn orthogonal(shape: &[usize], gain: f32, seed: Option<u64>) -> GPResult<NdArray> {
    if shape.len() != 2 {
        return xavier_normal(shape, gain, seed);
    }
    let (rows, cols) = (shape[0], shape[1]);
    let n = rows.max(cols);
    let gaussian = NdArray::random_normal(&[n, n], seed)
        .into_ndarray()
        .into_dimensionality::<ndarray::Ix2>()
        .map_err(|e| GPError::Other(e.to_string()))?;
    let q = gram_schmidt_qr(&gaussian);
    let trimmed = q.slice(ndarray::s![0..rows, 0..cols]).to_owned();
    Ok(NdArray::from_array(trimmed.into_dyn()).mul_scalar(gain))
}

fn gram_schmidt_qr(a: &Array2<f32>) -> Array2<f32> {
    let n = a.nrows();
    let mut q = Array2::<f32>::zeros((n, n));
    for j in 0..n {
        let mut v = a.column(j).to_owned();
        for i in 0..j {
            let qi = q.column(i).to_owned();
            let proj = qi.dot(&a.column(j));
            v -= &(&qi * proj);
        }
        let norm = v.dot(&v).sqrt();
        if norm > 1e-8 {
            v /= norm;
        }
        q.column_mut(j).assign(&v);
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xavier_uniform_has_correct_shape() {
        let w = xavier_uniform(&[4, 8], 1.0, Some(7)).unwrap();
        assert_eq!(w.shape().dims(), &[4, 8]);
    }

    #[test]
    fn orthogonal_rows_are_unit_and_mutually_perpendicular() {
        let w = orthogonal(&[4, 4], 1.0, Some(11)).unwrap().into_ndarray();
        let w2 = w.clone().into_dimensionality::<ndarray::Ix2>().unwrap();
        for i in 0..4 {
            let row = w2.row(i);
            let norm = row.dot(&row).sqrt();
            assert!((norm - 1.0).abs() < 1e-3, "row {i} norm {norm}");
            for j in (i + 1)..4 {
                let dot = row.dot(&w2.row(j));
                assert!(dot.abs() < 1e-3, "rows {i},{j} dot {dot}");
            }
        }
    }

    #[test]
    fn orthogonal_falls_back_for_non_2d_shape() {
        let w = orthogonal(&[2, 3, 4], 1.0, Some(1)).unwrap();
        assert_eq!(w.shape().dims(), &[2, 3, 4]);
    }
}
