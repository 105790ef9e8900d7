use crate::autodiff::Variable;

/// Clips gradients in place by global L2 norm (§4.7): computes
/// `G = sqrt(sum of squared gradients across every parameter)`, and if
/// `G > max_norm`, rescales every gradient by `max_norm / G`. Returns
/// the observed global norm before clipping, for logging.
pub fn clip_grad_norm(params: &[Variable], max_norm: f32) -> f32 {
    let mut total_sq = 0.0f32;
    for param in params {
        if let Some(grad) = param.grad() {
            total_sq += grad.as_ndarray().iter().map(|g| g * g).sum::<f32>();
        }
    }
    let global_norm = total_sq.sqrt();

    if global_norm > max_norm && global_norm > 0.0 {
        let scale = max_norm / global_norm;
        for param in params {
            if let Some(grad) = param.grad() {
                param.set_grad(grad.mul_scalar(scale));
            }
        }
    }
    global_norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::NdArray;

    #[test]
    fn leaves_gradients_untouched_when_under_max_norm() {
        let param = Variable::new_with_grad(NdArray::zeros(&[2]));
        param.set_grad(NdArray::of(vec![0.3, 0.4], Some(&[2])).unwrap());
        let norm = clip_grad_norm(&[param.clone()], 10.0);
        assert!((norm - 0.5).abs() < 1e-6);
        let grad = param.grad().unwrap();
        assert_eq!(grad.get(&[0]).unwrap(), 0.3);
    }

    #[test]
    fn rescales_gradients_to_max_norm_when_exceeded() {
        let param = Variable::new_with_grad(NdArray::zeros(&[2]));
        param.set_grad(NdArray::of(vec![3.0, 4.0], Some(&[2])).unwrap());
        let norm = clip_grad_norm(&[param.clone()], 1.0);
        assert!((norm - 5.0).abs() < 1e-6);
        let grad = param.grad().unwrap();
        assert!((grad.get(&[0]).unwrap() - 0.6).abs() < 1e-5);
        assert!((grad.get(&[1]).unwrap() - 0.8).abs() < 1e-5);
    }

    #[test]
    fn global_norm_spans_multiple_parameters() {
        let a = Variable::new_with_grad(NdArray::zeros(&[1]));
        a.set_grad(NdArray::of(vec![3.0], Some(&[1])).unwrap());
        let b = Variable::new_with_grad(NdArray::zeros(&[1]));
        b.set_grad(NdArray::of(vec![4.0], Some(&[1])).unwrap());
        let norm = clip_grad_norm(&[a, b], 100.0);
        assert!((norm - 5.0).abs() < 1e-6);
    }
}
