use crate::autodiff::{Context, Variable};
use crate::errors::GPResult;
use crate::tensor::NdArray;

/// Result of comparing one parameter's analytic and numeric gradients.
#[derive(Debug, Clone)]
pub struct GradCheckReport {
    pub max_abs_diff: f32,
    pub num_elements: usize,
}

impl GradCheckReport {
    pub fn within_tolerance(&self, tol: f32) -> bool {
        self.max_abs_diff <= tol
    }
}

/// Numerically estimates `d loss / d param[i]` for every element of
/// `param` via central differences, and compares it against the
/// analytic gradient already accumulated on `param` by a prior
/// `loss.backward()` call (§8: "numerical perturbation agrees with
/// analytic gradient to within 1e-3").
///
/// `forward` rebuilds the loss graph from scratch given the current
/// value of `param` (it should read `param`'s value, not reuse cached
/// Variables from a previous forward pass) and must return a
/// scalar-valued `Variable`.
pub fn grad_check<F>(param: &Variable, forward: F, epsilon: f32) -> GPResult<GradCheckReport>
where
    F: Fn(&Variable) -> GPResult<Variable>,
{
    let dims = param.shape().dims().to_vec();
    let analytic = param.grad().unwrap_or_else(|| NdArray::zeros(&dims));
    let num_elements: usize = dims.iter().product();

    let mut max_abs_diff = 0.0f32;
    let mut index = vec![0usize; dims.len()];

    for _ in 0..num_elements {
        let original = param.value().get(&index)?;

        let mut plus_value = param.value();
        plus_value.set(original + epsilon, &index)?;
        let plus_loss = scalar_value(&forward(&Variable::new(plus_value))?)?;

        let mut minus_value = param.value();
        minus_value.set(original - epsilon, &index)?;
        let minus_loss = scalar_value(&forward(&Variable::new(minus_value))?)?;

        let numeric = (plus_loss - minus_loss) / (2.0 * epsilon);
        let analytic_value = analytic.get(&index)?;
        max_abs_diff = max_abs_diff.max((numeric - analytic_value).abs());

        increment_index(&mut index, &dims);
    }

    Ok(GradCheckReport { max_abs_diff, num_elements })
}

fn scalar_value(loss: &Variable) -> GPResult<f32> {
    loss.value().as_slice().map(|s| s[0])
}

fn increment_index(index: &mut [usize], dims: &[usize]) {
    for axis in (0..dims.len()).rev() {
        index[axis] += 1;
        if index[axis] < dims[axis] {
            return;
        }
        index[axis] = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::ops;

    #[test]
    fn matches_analytic_gradient_for_cubic_loss() {
        let x = Variable::new_with_grad(NdArray::of(vec![2.0, -1.5], Some(&[2])).unwrap());
        let ctx = Context::train();
        let cubed = ops::mul(&ops::mul(&x, &x, &ctx).unwrap(), &x, &ctx).unwrap();
        let loss = ops::sum(&cubed, 0, &ctx).unwrap();
        loss.backward().unwrap();

        let report = grad_check(
            &x,
            |v| {
                let ctx = Context::train();
                let cubed = ops::mul(&ops::mul(v, v, &ctx)?, v, &ctx)?;
                ops::sum(&cubed, 0, &ctx)
            },
            1e-3,
        )
        .unwrap();

        assert!(report.within_tolerance(1e-2), "max diff {}", report.max_abs_diff);
    }
}
