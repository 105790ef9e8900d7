use crate::autodiff::{ops, Context, Variable};
use crate::errors::{GPError, GPResult};
use crate::tensor::NdArray;

/// Label input accepted by [`cross_entropy`] (§4.7): either per-row
/// class indices `(N,)` or a dense one-hot matrix `(N, V)`.
pub enum Labels<'a> {
    Indices(&'a [usize]),
    OneHot(&'a NdArray),
}

/// Softmax-fused cross-entropy (§4.7): `logits` is `(N, V)`, `labels`
/// is either per-row class indices or a one-hot `(N, V)` matrix.
/// Forward takes the numerically stable log-softmax and averages the
/// negative log-likelihood of each row's labeled class; backward
/// therefore flows through log-softmax's own gradient, which reduces
/// to `(softmax(logits) - one_hot(labels)) / N`.
pub fn cross_entropy(logits: &Variable, labels: Labels, ctx: &Context) -> GPResult<Variable> {
    let dims = logits.shape().dims().to_vec();
    if dims.len() != 2 {
        return Err(GPError::NotSupported(format!("cross_entropy expects rank-2 logits, got rank {}", dims.len())));
    }
    let (n, vocab) = (dims[0], dims[1]);

    let one_hot = match labels {
        Labels::Indices(indices) => {
            if indices.len() != n {
                return Err(GPError::argument(format!("labels length {} must match batch size {n}", indices.len())));
            }
            for &label in indices {
                if label >= vocab {
                    return Err(GPError::index(label as isize, vocab));
                }
            }
            one_hot_rows(indices, vocab)
        }
        Labels::OneHot(one_hot) => {
            if one_hot.shape().dims() != &[n, vocab] {
                return Err(GPError::shape(vec![n, vocab], one_hot.shape().to_vec()));
            }
            one_hot.clone()
        }
    };

    let log_probs = ops::log_softmax(logits, -1, ctx)?;
    let picked = ops::mul(&log_probs, &Variable::new(one_hot), ctx)?;
    let row_log_likelihood = ops::sum(&picked, -1, ctx)?;
    let mean_log_likelihood = ops::mean(&row_log_likelihood, 0, ctx)?;
    ops::mul_scalar(&mean_log_likelihood, -1.0, ctx)
}

fn one_hot_rows(labels: &[usize], vocab: usize) -> NdArray {
    let mut data = vec![0.0f32; labels.len() * vocab];
    for (row, &label) in labels.iter().enumerate() {
        data[row * vocab + label] = 1.0;
    }
    NdArray::of(data, Some(&[labels.len(), vocab])).expect("shape matches labels length and vocab")
}
