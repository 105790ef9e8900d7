//! Ergonomic free functions over [`Variable`]: build an [`Op`], run its
//! forward pass eagerly, and wrap the result as a graph node via
//! [`Variable::from_op`]. This is the layer the rest of the crate
//! (`nn`, `moe`, `optim`) actually calls.

use crate::errors::GPResult;
use crate::tensor::NdArray;

use super::function::{rope_tables as rope_tables_impl, top_k_values_indices};
use super::{Context, Op, Variable};

fn unary(op: Op, x: &Variable, ctx: &Context) -> GPResult<Variable> {
    let out = op.forward(&[x.value()])?;
    Ok(Variable::from_op(op, vec![x.clone()], out, ctx))
}

fn binary(op: Op, a: &Variable, b: &Variable, ctx: &Context) -> GPResult<Variable> {
    let out = op.forward(&[a.value(), b.value()])?;
    Ok(Variable::from_op(op, vec![a.clone(), b.clone()], out, ctx))
}

pub fn add(a: &Variable, b: &Variable, ctx: &Context) -> GPResult<Variable> {
    binary(Op::Add, a, b, ctx)
}
pub fn sub(a: &Variable, b: &Variable, ctx: &Context) -> GPResult<Variable> {
    binary(Op::Sub, a, b, ctx)
}
pub fn mul(a: &Variable, b: &Variable, ctx: &Context) -> GPResult<Variable> {
    binary(Op::Mul, a, b, ctx)
}
pub fn div(a: &Variable, b: &Variable, ctx: &Context) -> GPResult<Variable> {
    binary(Op::Div, a, b, ctx)
}
pub fn add_scalar(x: &Variable, s: f32, ctx: &Context) -> GPResult<Variable> {
    unary(Op::AddScalar(s), x, ctx)
}
pub fn mul_scalar(x: &Variable, s: f32, ctx: &Context) -> GPResult<Variable> {
    unary(Op::MulScalar(s), x, ctx)
}
pub fn div_scalar(x: &Variable, s: f32, ctx: &Context) -> GPResult<Variable> {
    unary(Op::DivScalar(s), x, ctx)
}
pub fn matmul(a: &Variable, b: &Variable, ctx: &Context) -> GPResult<Variable> {
    binary(Op::MatMul, a, b, ctx)
}
pub fn batch_matmul(a: &Variable, b: &Variable, ctx: &Context) -> GPResult<Variable> {
    binary(Op::BatchMatMul, a, b, ctx)
}
pub fn transpose(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Transpose, x, ctx)
}
pub fn transpose_perm(x: &Variable, perm: &[usize], ctx: &Context) -> GPResult<Variable> {
    unary(Op::TransposePerm(perm.to_vec()), x, ctx)
}
pub fn reshape(x: &Variable, shape: &[usize], ctx: &Context) -> GPResult<Variable> {
    unary(Op::Reshape(shape.to_vec()), x, ctx)
}
pub fn broadcast_to(x: &Variable, shape: &[usize], ctx: &Context) -> GPResult<Variable> {
    unary(Op::Broadcast(shape.to_vec()), x, ctx)
}
pub fn sum_to(x: &Variable, shape: &[usize], ctx: &Context) -> GPResult<Variable> {
    unary(Op::SumTo(shape.to_vec()), x, ctx)
}
pub fn exp(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Exp, x, ctx)
}
pub fn log(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Log, x, ctx)
}
pub fn sqrt(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Sqrt, x, ctx)
}
pub fn pow(x: &Variable, exponent: f32, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Pow(exponent), x, ctx)
}
pub fn square(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Square, x, ctx)
}
pub fn abs(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Abs, x, ctx)
}
pub fn neg(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Neg, x, ctx)
}
pub fn sin(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Sin, x, ctx)
}
pub fn cos(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Cos, x, ctx)
}
pub fn relu(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::ReLU, x, ctx)
}
pub fn leaky_relu(x: &Variable, slope: f32, ctx: &Context) -> GPResult<Variable> {
    unary(Op::LeakyReLU(slope), x, ctx)
}
pub fn sigmoid(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Sigmoid, x, ctx)
}
pub fn tanh(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Tanh, x, ctx)
}
pub fn silu(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::SiLU, x, ctx)
}
pub fn gelu(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::GELU, x, ctx)
}
pub fn softmax(x: &Variable, axis: isize, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Softmax(axis), x, ctx)
}
pub fn log_softmax(x: &Variable, axis: isize, ctx: &Context) -> GPResult<Variable> {
    unary(Op::LogSoftmax(axis), x, ctx)
}
pub fn sum(x: &Variable, axis: isize, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Sum(axis), x, ctx)
}
pub fn mean(x: &Variable, axis: isize, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Mean(axis), x, ctx)
}
pub fn max(x: &Variable, axis: isize, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Max(axis), x, ctx)
}
pub fn min(x: &Variable, axis: isize, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Min(axis), x, ctx)
}
pub fn eq(a: &Variable, b: &Variable, ctx: &Context) -> GPResult<Variable> {
    binary(Op::Eq, a, b, ctx)
}
pub fn gt(a: &Variable, b: &Variable, ctx: &Context) -> GPResult<Variable> {
    binary(Op::Gt, a, b, ctx)
}
pub fn lt(a: &Variable, b: &Variable, ctx: &Context) -> GPResult<Variable> {
    binary(Op::Lt, a, b, ctx)
}
pub fn clone_var(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::CloneOp, x, ctx)
}
pub fn detach(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Detach, x, ctx)
}
pub fn ones_like(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::OnesLike, x, ctx)
}
pub fn zeros_like(x: &Variable, ctx: &Context) -> GPResult<Variable> {
    unary(Op::ZerosLike, x, ctx)
}

/// Embedding-table lookup: `table` is `(vocab, dim)`, `indices` selects
/// `index_shape`-many rows, output is `index_shape + [dim]`. The index
/// list itself carries no gradient (it is not a `Variable`).
pub fn gather(table: &Variable, indices: &[usize], index_shape: &[usize], ctx: &Context) -> GPResult<Variable> {
    let op = Op::Gather { indices: indices.to_vec(), index_shape: index_shape.to_vec() };
    unary(op, table, ctx)
}

/// Scatters `src` rows (`n, dim`) additively into a fresh `(vocab, dim)`
/// output at `indices`.
pub fn scatter_add(src: &Variable, indices: &[usize], vocab: usize, ctx: &Context) -> GPResult<Variable> {
    let op = Op::ScatterAdd { indices: indices.to_vec(), vocab };
    unary(op, src, ctx)
}

pub fn masked_fill(x: &Variable, mask: &NdArray, fill: f32, ctx: &Context) -> GPResult<Variable> {
    let op = Op::MaskedFill { mask: mask.clone(), fill };
    unary(op, x, ctx)
}

pub fn tril(x: &Variable, k: i64, ctx: &Context) -> GPResult<Variable> {
    unary(Op::Tril { k }, x, ctx)
}

pub fn where_op(cond: &NdArray, x: &Variable, y: &Variable, ctx: &Context) -> GPResult<Variable> {
    binary(Op::Where { cond: cond.clone() }, x, y, ctx)
}

pub fn rmsnorm(x: &Variable, weight: &Variable, eps: f32, ctx: &Context) -> GPResult<Variable> {
    binary(Op::RmsNorm { eps }, x, weight, ctx)
}

pub fn rope(x: &Variable, cos: &NdArray, sin: &NdArray, start_pos: usize, ctx: &Context) -> GPResult<Variable> {
    let op = Op::Rope { cos: cos.clone(), sin: sin.clone(), start_pos };
    unary(op, x, ctx)
}

pub fn rope_tables(max_seq_len: usize, dim: usize, base: f32) -> GPResult<(NdArray, NdArray)> {
    rope_tables_impl(max_seq_len, dim, base)
}

/// Top-k values (differentiable w.r.t. nothing downstream — backward is
/// zero) along `axis`, plus the per-slice winning indices.
pub fn top_k(x: &Variable, k: usize, axis: isize, largest: bool, ctx: &Context) -> GPResult<(Variable, Vec<Vec<usize>>)> {
    let (values, indices) = top_k_values_indices(&x.value(), k, axis, largest)?;
    let var = Variable::from_op(Op::TopK, vec![x.clone()], values, ctx);
    Ok((var, indices))
}

macro_rules! impl_var_operator {
    ($trait_name:ident, $method:ident, $op_fn:ident) => {
        impl std::ops::$trait_name<&Variable> for &Variable {
            type Output = Variable;
            fn $method(self, rhs: &Variable) -> Variable {
                $op_fn(self, rhs, &Context::train()).unwrap_or_else(|e| panic!("{e}"))
            }
        }
    };
}

impl_var_operator!(Add, add, add);
impl_var_operator!(Sub, sub, sub);
impl_var_operator!(Mul, mul, mul);

impl std::ops::Neg for &Variable {
    type Output = Variable;
    fn neg(self) -> Variable {
        neg(self, &Context::train()).unwrap_or_else(|e| panic!("{e}"))
    }
}
