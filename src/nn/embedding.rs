use crate::autodiff::{ops, Context, Variable};
use crate::errors::{GPError, GPResult};
use crate::init;
use crate::module::Module;
use crate::tensor::NdArray;

/// Token embedding table: `(vocab_size, dim)`, looked up by row index via
/// the `Gather` autodiff primitive. `indices` are plain `usize`s rather
/// than a `Variable` (§4.2's "non-differentiable inputs" — an index list
/// carries no gradient).
pub struct Embedding {
    pub module: Module,
    vocab_size: usize,
    dim: usize,
}

impl Embedding {
    pub fn new(vocab_size: usize, dim: usize, seed: Option<u64>) -> GPResult<Self> {
        if vocab_size == 0 {
            return Err(GPError::argument("vocab_size must be > 0"));
        }
        if dim == 0 {
            return Err(GPError::argument("embedding dim must be > 0"));
        }
        let mut module = Module::new();
        let table = init::xavier_uniform(&[vocab_size, dim], 1.0, seed)?;
        module.register_parameter("weight", Variable::new_with_grad(table))?;
        Ok(Self { module, vocab_size, dim })
    }

    /// `indices` is a flat list of token ids; `index_shape` is the shape
    /// those ids are laid out in (typically `(batch, seq)`). Output is
    /// `index_shape + (dim,)`.
    pub fn forward(&self, indices: &[usize], index_shape: &[usize], ctx: &Context) -> GPResult<Variable> {
        let expected: usize = index_shape.iter().product();
        if expected != indices.len() {
            return Err(GPError::shape(vec![expected], vec![indices.len()]));
        }
        for &idx in indices {
            if idx >= self.vocab_size {
                return Err(GPError::index(idx as isize, self.vocab_size));
            }
        }
        let table = self.module.parameter("weight").expect("weight registered at construction").clone();
        ops::gather(&table, indices, index_shape, ctx)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_shape_is_index_shape_plus_dim() {
        let emb = Embedding::new(10, 4, Some(0)).unwrap();
        let y = emb.forward(&[1, 2, 3, 4], &[2, 2], &Context::eval()).unwrap();
        assert_eq!(y.shape().dims(), &[2, 2, 4]);
    }

    #[test]
    fn out_of_range_index_errors() {
        let emb = Embedding::new(4, 4, Some(0)).unwrap();
        assert!(emb.forward(&[10], &[1], &Context::eval()).is_err());
    }

    #[test]
    fn gradient_scatters_back_into_table_rows() {
        let emb = Embedding::new(3, 2, Some(0)).unwrap();
        let y = emb.forward(&[0, 0, 1], &[3], &Context::train()).unwrap();
        let loss = ops::sum(&y, 0, &Context::train()).unwrap();
        let loss = ops::sum(&loss, 0, &Context::train()).unwrap();
        loss.backward().unwrap();
        let grad = emb.module.parameter("weight").unwrap().grad().unwrap();
        // row 0 was selected twice, row 2 never selected.
        assert_eq!(grad.shape().dims(), &[3, 2]);
        assert_eq!(grad.get(&[2, 0]).unwrap(), 0.0);
    }
}
