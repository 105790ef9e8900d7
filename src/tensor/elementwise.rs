use ndarray::{ArrayD, Zip};

use crate::errors::{GPError, GPResult};
use crate::shape::Shape;

use super::NdArray;

fn broadcast_binary(
    a: &ArrayD<f32>,
    b: &ArrayD<f32>,
    f: impl Fn(f32, f32) -> f32 + Sync,
) -> GPResult<ArrayD<f32>> {
    let out_shape = Shape::new(a.shape().to_vec()).broadcast_with(&Shape::new(b.shape().to_vec()))?;
    let dims = out_shape.dims();
    let a_view = a
        .broadcast(dims)
        .ok_or_else(|| GPError::shape(dims.to_vec(), a.shape().to_vec()))?;
    let b_view = b
        .broadcast(dims)
        .ok_or_else(|| GPError::shape(dims.to_vec(), b.shape().to_vec()))?;
    let mut out = ArrayD::zeros(a_view.raw_dim());
    Zip::from(&mut out)
        .and(&a_view)
        .and(&b_view)
        .for_each(|o, &x, &y| *o = f(x, y));
    Ok(out)
}

#[cfg(feature = "rayon")]
fn map_unary(a: &ArrayD<f32>, f: impl Fn(f32) -> f32 + Sync) -> ArrayD<f32> {
    let mut out = a.clone();
    Zip::from(&mut out).par_for_each(|v| *v = f(*v));
    out
}

#[cfg(not(feature = "rayon"))]
fn map_unary(a: &ArrayD<f32>, f: impl Fn(f32) -> f32) -> ArrayD<f32> {
    a.mapv(f)
}

impl NdArray {
    pub fn add(&self, other: &NdArray) -> GPResult<NdArray> {
        Ok(NdArray::from_array(broadcast_binary(&self.data, &other.data, |x, y| x + y)?))
    }

    pub fn sub(&self, other: &NdArray) -> GPResult<NdArray> {
        Ok(NdArray::from_array(broadcast_binary(&self.data, &other.data, |x, y| x - y)?))
    }

    pub fn mul(&self, other: &NdArray) -> GPResult<NdArray> {
        Ok(NdArray::from_array(broadcast_binary(&self.data, &other.data, |x, y| x * y)?))
    }

    pub fn div(&self, other: &NdArray) -> GPResult<NdArray> {
        if other.data.iter().any(|&v| v == 0.0) {
            return Err(GPError::Arithmetic("division by zero".into()));
        }
        Ok(NdArray::from_array(broadcast_binary(&self.data, &other.data, |x, y| x / y)?))
    }

    pub fn add_scalar(&self, scalar: f32) -> NdArray {
        NdArray::from_array(map_unary(&self.data, move |x| x + scalar))
    }

    pub fn mul_scalar(&self, scalar: f32) -> NdArray {
        NdArray::from_array(map_unary(&self.data, move |x| x * scalar))
    }

    pub fn div_scalar(&self, scalar: f32) -> GPResult<NdArray> {
        if scalar == 0.0 {
            return Err(GPError::Arithmetic("division by zero scalar".into()));
        }
        Ok(NdArray::from_array(map_unary(&self.data, move |x| x / scalar)))
    }

    pub fn neg(&self) -> NdArray {
        NdArray::from_array(map_unary(&self.data, |x| -x))
    }

    pub fn abs(&self) -> NdArray {
        NdArray::from_array(map_unary(&self.data, f32::abs))
    }

    pub fn exp(&self) -> NdArray {
        NdArray::from_array(map_unary(&self.data, f32::exp))
    }

    pub fn log(&self) -> GPResult<NdArray> {
        if self.data.iter().any(|&v| v <= 0.0) {
            return Err(GPError::Arithmetic("log of non-positive value".into()));
        }
        Ok(NdArray::from_array(map_unary(&self.data, f32::ln)))
    }

    pub fn sqrt(&self) -> GPResult<NdArray> {
        if self.data.iter().any(|&v| v < 0.0) {
            return Err(GPError::Arithmetic("sqrt of negative value".into()));
        }
        Ok(NdArray::from_array(map_unary(&self.data, f32::sqrt)))
    }

    pub fn pow(&self, exponent: f32) -> NdArray {
        NdArray::from_array(map_unary(&self.data, move |x| x.powf(exponent)))
    }

    pub fn square(&self) -> NdArray {
        NdArray::from_array(map_unary(&self.data, |x| x * x))
    }

    pub fn sin(&self) -> NdArray {
        NdArray::from_array(map_unary(&self.data, f32::sin))
    }

    pub fn cos(&self) -> NdArray {
        NdArray::from_array(map_unary(&self.data, f32::cos))
    }

    pub fn tanh(&self) -> NdArray {
        NdArray::from_array(map_unary(&self.data, f32::tanh))
    }

    pub fn sigmoid(&self) -> NdArray {
        NdArray::from_array(map_unary(&self.data, |x| 1.0 / (1.0 + (-x).exp())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_broadcasts_row_vector() {
        let a = NdArray::ones(&[2, 3]);
        let b = NdArray::of(vec![1.0, 2.0, 3.0], Some(&[1, 3])).unwrap();
        let c = a.add(&b).unwrap();
        assert_eq!(c.as_slice().unwrap(), &[2.0, 3.0, 4.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn div_by_zero_errors() {
        let a = NdArray::ones(&[2]);
        let b = NdArray::zeros(&[2]);
        assert!(a.div(&b).is_err());
    }

    #[test]
    fn log_of_non_positive_errors() {
        let a = NdArray::of(vec![1.0, -1.0], None).unwrap();
        assert!(a.log().is_err());
    }

    #[test]
    fn sqrt_of_negative_errors() {
        let a = NdArray::of(vec![4.0, -1.0], None).unwrap();
        assert!(a.sqrt().is_err());
    }
}
