//! The primitive-operator set. Each [`Op`] variant is a stateless-per-call
//! primitive: `forward` computes its output from raw tensors, `backward`
//! computes one gradient per differentiable input (or `None` for a
//! non-differentiable position) given the upstream gradient.
//!
//! Modeled as a tagged enum rather than a `dyn Trait` object (Design
//! Notes §9): this crate never needs to serialize an operator, so the
//! dynamic-dispatch-avoidance case applies cleanly. Auxiliary
//! non-differentiable data an op needs (index lists, masks, RoPE tables)
//! lives on the variant itself rather than as a second graph input, since
//! this engine has no integer-tensor type to carry such data as a
//! `Variable`.

use ndarray::{Array2, ArrayD, Axis, IxDyn};

use crate::errors::{GPError, GPResult};
use crate::tensor::NdArray;

const GELU_COEFF: f32 = 0.7978845608028654; // sqrt(2/pi)

#[derive(Clone, Debug)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    AddScalar(f32),
    MulScalar(f32),
    DivScalar(f32),
    MatMul,
    BatchMatMul,
    Transpose,
    TransposePerm(Vec<usize>),
    Reshape(Vec<usize>),
    Broadcast(Vec<usize>),
    SumTo(Vec<usize>),
    Exp,
    Log,
    Sqrt,
    Pow(f32),
    Square,
    Abs,
    Neg,
    Sin,
    Cos,
    ReLU,
    LeakyReLU(f32),
    Sigmoid,
    Tanh,
    SiLU,
    GELU,
    Softmax(isize),
    LogSoftmax(isize),
    Sum(isize),
    Mean(isize),
    Max(isize),
    Min(isize),
    Eq,
    Gt,
    Lt,
    CloneOp,
    Detach,
    OnesLike,
    ZerosLike,
    Gather { indices: Vec<usize>, index_shape: Vec<usize> },
    ScatterAdd { indices: Vec<usize>, vocab: usize },
    MaskedFill { mask: NdArray, fill: f32 },
    Tril { k: i64 },
    TopK,
    Where { cond: NdArray },
    RmsNorm { eps: f32 },
    Rope { cos: NdArray, sin: NdArray, start_pos: usize },
}

impl Op {
    pub(crate) fn forward(&self, inputs: &[NdArray]) -> GPResult<NdArray> {
        use Op::*;
        match self {
            Add => inputs[0].add(&inputs[1]),
            Sub => inputs[0].sub(&inputs[1]),
            Mul => inputs[0].mul(&inputs[1]),
            Div => inputs[0].div(&inputs[1]),
            AddScalar(s) => Ok(inputs[0].add_scalar(*s)),
            MulScalar(s) => Ok(inputs[0].mul_scalar(*s)),
            DivScalar(s) => inputs[0].div_scalar(*s),
            MatMul => inputs[0].dot(&inputs[1]),
            BatchMatMul => inputs[0].batched_dot(&inputs[1]),
            Transpose => inputs[0].transpose(),
            TransposePerm(perm) => inputs[0].transpose_perm(perm),
            Reshape(shape) => inputs[0].reshape(shape),
            Broadcast(shape) => inputs[0].broadcast_to(shape),
            SumTo(shape) => inputs[0].sum_to(shape),
            Exp => Ok(inputs[0].exp()),
            Log => inputs[0].log(),
            Sqrt => inputs[0].sqrt(),
            Pow(e) => Ok(inputs[0].pow(*e)),
            Square => Ok(inputs[0].square()),
            Abs => Ok(inputs[0].abs()),
            Neg => Ok(inputs[0].neg()),
            Sin => Ok(inputs[0].sin()),
            Cos => Ok(inputs[0].cos()),
            ReLU => Ok(NdArray::from_array(inputs[0].as_ndarray().mapv(|x| x.max(0.0)))),
            LeakyReLU(a) => Ok(NdArray::from_array(
                inputs[0].as_ndarray().mapv(|x| if x > 0.0 { x } else { a * x }),
            )),
            Sigmoid => Ok(inputs[0].sigmoid()),
            Tanh => Ok(inputs[0].tanh()),
            SiLU => Ok(NdArray::from_array(
                inputs[0].as_ndarray().mapv(|x| x * (1.0 / (1.0 + (-x).exp()))),
            )),
            GELU => Ok(NdArray::from_array(inputs[0].as_ndarray().mapv(gelu_scalar))),
            Softmax(axis) => inputs[0].softmax(*axis),
            LogSoftmax(axis) => inputs[0].log_softmax(*axis),
            Sum(axis) => inputs[0].sum(*axis),
            Mean(axis) => inputs[0].mean(*axis),
            Max(axis) => inputs[0].max(*axis),
            Min(axis) => inputs[0].min(*axis),
            Eq => inputs[0].eq(&inputs[1]),
            Gt => inputs[0].gt(&inputs[1]),
            Lt => inputs[0].lt(&inputs[1]),
            CloneOp => Ok(inputs[0].clone()),
            Detach => Ok(inputs[0].clone()),
            OnesLike => Ok(NdArray::ones(inputs[0].shape().dims())),
            ZerosLike => Ok(NdArray::zeros(inputs[0].shape().dims())),
            Gather { indices, index_shape } => gather_forward(&inputs[0], indices, index_shape),
            ScatterAdd { indices, vocab } => scatter_add_forward(&inputs[0], indices, *vocab),
            MaskedFill { mask, fill } => masked_fill_forward(&inputs[0], mask, *fill),
            Tril { k } => tril_forward(&inputs[0], *k),
            TopK => Err(GPError::NotSupported(
                "top_k forward runs through top_k_values_indices, not Op::forward".into(),
            )),
            Where { cond } => where_forward(cond, &inputs[0], &inputs[1]),
            RmsNorm { eps } => rmsnorm_forward(&inputs[0], &inputs[1], *eps),
            Rope { cos, sin, start_pos } => rope_forward(&inputs[0], cos, sin, *start_pos),
        }
    }

    pub(crate) fn backward(
        &self,
        inputs: &[NdArray],
        output: &NdArray,
        grad_output: &NdArray,
    ) -> GPResult<Vec<Option<NdArray>>> {
        use Op::*;
        match self {
            Add => Ok(vec![
                Some(grad_output.sum_to(inputs[0].shape().dims())?),
                Some(grad_output.sum_to(inputs[1].shape().dims())?),
            ]),
            Sub => Ok(vec![
                Some(grad_output.sum_to(inputs[0].shape().dims())?),
                Some(grad_output.neg().sum_to(inputs[1].shape().dims())?),
            ]),
            Mul => {
                let da = grad_output.mul(&inputs[1])?.sum_to(inputs[0].shape().dims())?;
                let db = grad_output.mul(&inputs[0])?.sum_to(inputs[1].shape().dims())?;
                Ok(vec![Some(da), Some(db)])
            }
            Div => {
                let da = grad_output.div(&inputs[1])?.sum_to(inputs[0].shape().dims())?;
                let y2 = inputs[1].mul(&inputs[1])?;
                let db = grad_output
                    .mul(&inputs[0])?
                    .neg()
                    .div(&y2)?
                    .sum_to(inputs[1].shape().dims())?;
                Ok(vec![Some(da), Some(db)])
            }
            AddScalar(_) => Ok(vec![Some(grad_output.clone())]),
            MulScalar(s) => Ok(vec![Some(grad_output.mul_scalar(*s))]),
            DivScalar(s) => Ok(vec![Some(grad_output.div_scalar(*s)?)]),
            MatMul => {
                let b_t = inputs[1].transpose()?;
                let a_t = inputs[0].transpose()?;
                let grad_a = grad_output.dot(&b_t)?;
                let grad_b = a_t.dot(grad_output)?;
                Ok(vec![Some(grad_a), Some(grad_b)])
            }
            BatchMatMul => {
                let perm_b = swap_last_two(inputs[1].rank());
                let b_t = inputs[1].transpose_perm(&perm_b)?;
                let grad_a = grad_output.batched_dot(&b_t)?;
                let perm_a = swap_last_two(inputs[0].rank());
                let a_t = inputs[0].transpose_perm(&perm_a)?;
                let grad_b = a_t.batched_dot(grad_output)?;
                Ok(vec![Some(grad_a), Some(grad_b)])
            }
            Transpose => Ok(vec![Some(grad_output.transpose()?)]),
            TransposePerm(perm) => {
                let mut inverse = vec![0usize; perm.len()];
                for (i, &p) in perm.iter().enumerate() {
                    inverse[p] = i;
                }
                Ok(vec![Some(grad_output.transpose_perm(&inverse)?)])
            }
            Reshape(_) => Ok(vec![Some(grad_output.reshape(inputs[0].shape().dims())?)]),
            Broadcast(_) => Ok(vec![Some(grad_output.sum_to(inputs[0].shape().dims())?)]),
            SumTo(_) => Ok(vec![Some(grad_output.broadcast_to(inputs[0].shape().dims())?)]),
            Exp => Ok(vec![Some(grad_output.mul(output)?)]),
            Log => Ok(vec![Some(grad_output.div(&inputs[0])?)]),
            Sqrt => {
                let two_sqrt = output.mul_scalar(2.0);
                Ok(vec![Some(grad_output.div(&two_sqrt)?)])
            }
            Pow(e) => {
                let deriv = inputs[0].pow(e - 1.0).mul_scalar(*e);
                Ok(vec![Some(grad_output.mul(&deriv)?)])
            }
            Square => {
                let deriv = inputs[0].mul_scalar(2.0);
                Ok(vec![Some(grad_output.mul(&deriv)?)])
            }
            Abs => {
                let sgn = NdArray::from_array(inputs[0].as_ndarray().mapv(f32::signum));
                Ok(vec![Some(grad_output.mul(&sgn)?)])
            }
            Neg => Ok(vec![Some(grad_output.neg())]),
            Sin => {
                let deriv = inputs[0].cos();
                Ok(vec![Some(grad_output.mul(&deriv)?)])
            }
            Cos => {
                let deriv = inputs[0].sin().neg();
                Ok(vec![Some(grad_output.mul(&deriv)?)])
            }
            ReLU => {
                let mask = NdArray::from_array(inputs[0].as_ndarray().mapv(|x| if x > 0.0 { 1.0 } else { 0.0 }));
                Ok(vec![Some(grad_output.mul(&mask)?)])
            }
            LeakyReLU(a) => {
                let mask = NdArray::from_array(inputs[0].as_ndarray().mapv(|x| if x > 0.0 { 1.0 } else { *a }));
                Ok(vec![Some(grad_output.mul(&mask)?)])
            }
            Sigmoid => {
                let deriv = output.mul(&output.neg().add_scalar(1.0))?;
                Ok(vec![Some(grad_output.mul(&deriv)?)])
            }
            Tanh => {
                let deriv = output.square().neg().add_scalar(1.0);
                Ok(vec![Some(grad_output.mul(&deriv)?)])
            }
            SiLU => {
                let sig = inputs[0].sigmoid();
                let deriv = sig.mul(&inputs[0].mul(&sig.neg().add_scalar(1.0))?.add_scalar(1.0))?;
                Ok(vec![Some(grad_output.mul(&deriv)?)])
            }
            GELU => {
                let deriv = NdArray::from_array(inputs[0].as_ndarray().mapv(gelu_deriv_scalar));
                Ok(vec![Some(grad_output.mul(&deriv)?)])
            }
            Softmax(axis) => {
                let ax = inputs[0].shape().resolve_axis(*axis)?;
                let dot = grad_output.mul(output)?.sum(ax as isize)?;
                let inner = grad_output.sub(&dot)?;
                Ok(vec![Some(output.mul(&inner)?)])
            }
            LogSoftmax(axis) => {
                let ax = inputs[0].shape().resolve_axis(*axis)?;
                let sum_g = grad_output.sum(ax as isize)?;
                let softmax = inputs[0].softmax(ax as isize)?;
                let correction = softmax.mul(&sum_g.broadcast_to(output.shape().dims())?)?;
                Ok(vec![Some(grad_output.sub(&correction)?)])
            }
            Sum(axis) => {
                let ax = inputs[0].shape().resolve_axis(*axis)?;
                let _ = ax;
                Ok(vec![Some(grad_output.broadcast_to(inputs[0].shape().dims())?)])
            }
            Mean(axis) => {
                let ax = inputs[0].shape().resolve_axis(*axis)?;
                let n = inputs[0].shape().dims()[ax] as f32;
                let broadcasted = grad_output.broadcast_to(inputs[0].shape().dims())?;
                Ok(vec![Some(broadcasted.div_scalar(n)?)])
            }
            Max(axis) => Ok(vec![Some(extremum_backward(&inputs[0], output, grad_output, *axis)?)]),
            Min(axis) => Ok(vec![Some(extremum_backward(&inputs[0], output, grad_output, *axis)?)]),
            Eq | Gt | Lt => Ok(vec![
                Some(NdArray::zeros(inputs[0].shape().dims())),
                Some(NdArray::zeros(inputs[1].shape().dims())),
            ]),
            CloneOp => Ok(vec![Some(grad_output.clone())]),
            Detach => Ok(vec![Some(NdArray::zeros(inputs[0].shape().dims()))]),
            OnesLike | ZerosLike => Ok(vec![Some(NdArray::zeros(inputs[0].shape().dims()))]),
            Gather { indices, index_shape } => {
                let vocab = inputs[0].shape().dims()[0];
                let dim = inputs[0].shape().dims()[1];
                Ok(vec![Some(gather_backward(grad_output, indices, index_shape, vocab, dim)?)])
            }
            ScatterAdd { indices, .. } => {
                let index_shape = vec![indices.len()];
                Ok(vec![Some(gather_forward(grad_output, indices, &index_shape)?)])
            }
            MaskedFill { mask, .. } => {
                let keep = NdArray::from_array(mask.as_ndarray().mapv(|m| if m > 0.5 { 0.0 } else { 1.0 }));
                let broadcast_keep = keep.broadcast_to(grad_output.shape().dims())?;
                Ok(vec![Some(grad_output.mul(&broadcast_keep)?)])
            }
            Tril { k } => {
                let mask = tril_mask(inputs[0].shape().dims(), *k)?;
                Ok(vec![Some(grad_output.mul(&mask)?)])
            }
            TopK => Ok(vec![Some(NdArray::zeros(inputs[0].shape().dims()))]),
            Where { cond } => {
                let cond_b = cond.broadcast_to(grad_output.shape().dims())?;
                let inv = NdArray::from_array(cond_b.as_ndarray().mapv(|c| 1.0 - c));
                let dx = grad_output.mul(&cond_b)?.sum_to(inputs[0].shape().dims())?;
                let dy = grad_output.mul(&inv)?.sum_to(inputs[1].shape().dims())?;
                Ok(vec![Some(dx), Some(dy)])
            }
            RmsNorm { eps } => rmsnorm_backward(&inputs[0], &inputs[1], *eps, grad_output),
            Rope { cos, sin, start_pos } => Ok(vec![Some(rope_backward(grad_output, cos, sin, *start_pos)?)]),
        }
    }
}

fn swap_last_two(rank: usize) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..rank).collect();
    perm.swap(rank - 2, rank - 1);
    perm
}

fn gelu_scalar(x: f32) -> f32 {
    let u = GELU_COEFF * (x + 0.044715 * x.powi(3));
    0.5 * x * (1.0 + u.tanh())
}

fn gelu_deriv_scalar(x: f32) -> f32 {
    let u = GELU_COEFF * (x + 0.044715 * x.powi(3));
    let t = u.tanh();
    let du_dx = GELU_COEFF * (1.0 + 3.0 * 0.044715 * x * x);
    0.5 * (1.0 + t) + 0.5 * x * (1.0 - t * t) * du_dx
}

fn extremum_backward(input: &NdArray, output: &NdArray, grad_output: &NdArray, axis: isize) -> GPResult<NdArray> {
    let ax = input.shape().resolve_axis(axis)?;
    let mask = NdArray::from_array({
        let mut m = input.as_ndarray().clone();
        ndarray::Zip::from(&mut m)
            .and_broadcast(output.as_ndarray())
            .for_each(|v, &o| *v = if *v == o { 1.0 } else { 0.0 });
        m
    });
    // Ties: split the gradient evenly across matching positions so the
    // scattered total still equals grad_output exactly.
    let counts = mask.sum(ax as isize)?;
    let counts_b = counts.broadcast_to(input.shape().dims())?;
    let share = mask.div(&counts_b)?;
    let grad_b = grad_output.broadcast_to(input.shape().dims())?;
    share.mul(&grad_b)
}

fn gather_forward(table: &NdArray, indices: &[usize], index_shape: &[usize]) -> GPResult<NdArray> {
    if table.rank() != 2 {
        return Err(GPError::NotSupported("gather requires a rank-2 table".into()));
    }
    let dim = table.shape().dims()[1];
    let rows = table.select_axis0(indices)?;
    let mut out_shape = index_shape.to_vec();
    out_shape.push(dim);
    rows.reshape(&out_shape)
}

fn gather_backward(
    grad_output: &NdArray,
    indices: &[usize],
    index_shape: &[usize],
    vocab: usize,
    dim: usize,
) -> GPResult<NdArray> {
    let mut flat_shape = vec![indices.len()];
    flat_shape.push(dim);
    let _ = index_shape;
    let grad_flat = grad_output.reshape(&flat_shape)?;
    let mut table_grad = NdArray::zeros(&[vocab, dim]);
    table_grad.add_at(indices, None, &grad_flat)?;
    Ok(table_grad)
}

fn scatter_add_forward(src: &NdArray, indices: &[usize], vocab: usize) -> GPResult<NdArray> {
    if src.rank() != 2 {
        return Err(GPError::NotSupported("scatter_add requires a rank-2 source".into()));
    }
    let dim = src.shape().dims()[1];
    let mut out = NdArray::zeros(&[vocab, dim]);
    out.add_at(indices, None, src)?;
    Ok(out)
}

fn masked_fill_forward(value: &NdArray, mask: &NdArray, fill: f32) -> GPResult<NdArray> {
    let mask_b = mask.broadcast_to(value.shape().dims())?;
    let mut out = value.as_ndarray().clone();
    ndarray::Zip::from(&mut out)
        .and(mask_b.as_ndarray())
        .for_each(|v, &m| {
            if m > 0.5 {
                *v = fill;
            }
        });
    Ok(NdArray::from_array(out))
}

fn tril_mask(shape: &[usize], k: i64) -> GPResult<NdArray> {
    if shape.len() != 2 {
        return Err(GPError::NotSupported("tril requires a rank-2 array".into()));
    }
    let (rows, cols) = (shape[0], shape[1]);
    let mut out = Array2::<f32>::ones((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            if (c as i64) - (r as i64) > k {
                out[[r, c]] = 0.0;
            }
        }
    }
    Ok(NdArray::from_array(out.into_dyn()))
}

fn tril_forward(x: &NdArray, k: i64) -> GPResult<NdArray> {
    let mask = tril_mask(x.shape().dims(), k)?;
    x.mul(&mask)
}

fn where_forward(cond: &NdArray, x: &NdArray, y: &NdArray) -> GPResult<NdArray> {
    let out_shape = x.shape().broadcast_with(&y.shape())?.broadcast_with(&cond.shape())?;
    let dims = out_shape.dims();
    let cond_b = cond.broadcast_to(dims)?;
    let x_b = x.broadcast_to(dims)?;
    let y_b = y.broadcast_to(dims)?;
    let mut out = x_b.as_ndarray().clone();
    ndarray::Zip::from(&mut out)
        .and(cond_b.as_ndarray())
        .and(y_b.as_ndarray())
        .for_each(|o, &c, &yv| {
            if c <= 0.5 {
                *o = yv;
            }
        });
    Ok(NdArray::from_array(out))
}

fn rmsnorm_forward(x: &NdArray, w: &NdArray, eps: f32) -> GPResult<NdArray> {
    let rank = x.rank();
    let last = rank - 1;
    let ms = x.square().mean(last as isize)?;
    let inv = ms.add_scalar(eps).sqrt()?.as_ndarray().mapv(|v| 1.0 / v);
    let inv = NdArray::from_array(inv);
    let inv_b = inv.broadcast_to(x.shape().dims())?;
    let normalized = x.mul(&inv_b)?;
    normalized.mul(&w.broadcast_to(x.shape().dims())?)
}

fn rmsnorm_backward(x: &NdArray, w: &NdArray, eps: f32, grad_output: &NdArray) -> GPResult<Vec<Option<NdArray>>> {
    let rank = x.rank();
    let last = rank - 1;
    let n = x.shape().dims()[last] as f32;
    let ms = x.square().mean(last as isize)?;
    let inv = NdArray::from_array(ms.add_scalar(eps).sqrt()?.as_ndarray().mapv(|v| 1.0 / v));
    let inv_b = inv.broadcast_to(x.shape().dims())?;
    let xhat = x.mul(&inv_b)?;

    let w_b = w.broadcast_to(x.shape().dims())?;
    let dw = grad_output.mul(&xhat)?.sum_to(w.shape().dims())?;

    let g = grad_output.mul(&w_b)?; // dL/dxhat
    let dot = g.mul(x)?.sum(last as isize)?; // sum_i g_i * x_i, keepdims
    let dot_b = dot.broadcast_to(x.shape().dims())?;
    let inv3 = NdArray::from_array(inv.as_ndarray().mapv(|v| v.powi(3)));
    let inv3_b = inv3.broadcast_to(x.shape().dims())?;

    let term1 = g.mul(&inv_b)?;
    let term2 = x.mul(&inv3_b)?.mul(&dot_b)?.div_scalar(n)?;
    let dx = term1.sub(&term2)?;

    Ok(vec![Some(dx), Some(dw)])
}

fn collapse_to_3d(x: &NdArray) -> GPResult<(ArrayD<f32>, usize, usize, usize)> {
    let dims = x.shape().dims().to_vec();
    if dims.len() < 2 {
        return Err(GPError::NotSupported("rope requires rank >= 2".into()));
    }
    let dim = *dims.last().unwrap();
    let seq = dims[dims.len() - 2];
    let batch: usize = dims[..dims.len() - 2].iter().product::<usize>().max(1);
    if dim % 2 != 0 {
        return Err(GPError::argument("rope requires an even feature dimension"));
    }
    let reshaped = x
        .as_ndarray()
        .clone()
        .into_shape(IxDyn(&[batch, seq, dim]))
        .map_err(|e| GPError::Other(e.to_string()))?;
    Ok((reshaped, batch, seq, dim))
}

fn rope_forward(x: &NdArray, cos: &NdArray, sin: &NdArray, start_pos: usize) -> GPResult<NdArray> {
    let original_shape = x.shape().to_vec();
    let (input, batch, seq, dim) = collapse_to_3d(x)?;
    let half = dim / 2;
    let cos = cos.as_ndarray();
    let sin = sin.as_ndarray();

    let mut out = ArrayD::<f32>::zeros(IxDyn(&[batch, seq, dim]));
    for b in 0..batch {
        for s in 0..seq {
            let pos = start_pos + s;
            for i in 0..half {
                let c = cos[[pos, i]];
                let sn = sin[[pos, i]];
                let x0 = input[[b, s, 2 * i]];
                let x1 = input[[b, s, 2 * i + 1]];
                out[[b, s, 2 * i]] = x0 * c - x1 * sn;
                out[[b, s, 2 * i + 1]] = x0 * sn + x1 * c;
            }
        }
    }
    let reshaped = out
        .into_shape(IxDyn(&original_shape))
        .map_err(|e| GPError::Other(e.to_string()))?;
    Ok(NdArray::from_array(reshaped))
}

fn rope_backward(grad_output: &NdArray, cos: &NdArray, sin: &NdArray, start_pos: usize) -> GPResult<NdArray> {
    let original_shape = grad_output.shape().to_vec();
    let (grad, batch, seq, dim) = collapse_to_3d(grad_output)?;
    let half = dim / 2;
    let cos = cos.as_ndarray();
    let sin = sin.as_ndarray();

    let mut out = ArrayD::<f32>::zeros(IxDyn(&[batch, seq, dim]));
    for b in 0..batch {
        for s in 0..seq {
            let pos = start_pos + s;
            for i in 0..half {
                let c = cos[[pos, i]];
                let sn = sin[[pos, i]];
                let g0 = grad[[b, s, 2 * i]];
                let g1 = grad[[b, s, 2 * i + 1]];
                out[[b, s, 2 * i]] = g0 * c + g1 * sn;
                out[[b, s, 2 * i + 1]] = -g0 * sn + g1 * c;
            }
        }
    }
    let reshaped = out
        .into_shape(IxDyn(&original_shape))
        .map_err(|e| GPError::Other(e.to_string()))?;
    Ok(NdArray::from_array(reshaped))
}

/// Precomputes the `cos`/`sin` rotation tables for RoPE: shape
/// `(max_seq_len, dim/2)`, frequency `1 / base^(2i/dim)`.
pub fn rope_tables(max_seq_len: usize, dim: usize, base: f32) -> GPResult<(NdArray, NdArray)> {
    if dim % 2 != 0 {
        return Err(GPError::argument("rope dim must be even"));
    }
    let half = dim / 2;
    let mut cos = Array2::<f32>::zeros((max_seq_len, half));
    let mut sin = Array2::<f32>::zeros((max_seq_len, half));
    for pos in 0..max_seq_len {
        for i in 0..half {
            let freq = 1.0f32 / base.powf((2 * i) as f32 / dim as f32);
            let angle = pos as f32 * freq;
            cos[[pos, i]] = angle.cos();
            sin[[pos, i]] = angle.sin();
        }
    }
    Ok((NdArray::from_array(cos.into_dyn()), NdArray::from_array(sin.into_dyn())))
}

/// Top-K values (and their axis-indices, returned as plain data since
/// indices are non-differentiable) along `axis`.
pub fn top_k_values_indices(x: &NdArray, k: usize, axis: isize, largest: bool) -> GPResult<(NdArray, Vec<Vec<usize>>)> {
    if k == 0 {
        return Err(GPError::argument("top_k requires k >= 1"));
    }
    let ax = x.shape().resolve_axis(axis)?;
    let n = x.shape().dims()[ax];
    if k > n {
        return Err(GPError::argument(format!("top_k k={k} exceeds axis length {n}")));
    }
    let mut out_shape = x.shape().to_vec();
    out_shape[ax] = k;
    let mut values = ArrayD::<f32>::zeros(IxDyn(&out_shape));
    let mut all_indices = Vec::new();

    for (out_lane, in_lane) in values.lanes_mut(Axis(ax)).into_iter().zip(x.as_ndarray().lanes(Axis(ax))) {
        let mut order: Vec<usize> = (0..n).collect();
        if largest {
            order.sort_by(|&a, &b| in_lane[b].partial_cmp(&in_lane[a]).unwrap());
        } else {
            order.sort_by(|&a, &b| in_lane[a].partial_cmp(&in_lane[b]).unwrap());
        }
        let top = &order[..k];
        let mut out_lane = out_lane;
        for (j, &idx) in top.iter().enumerate() {
            out_lane[j] = in_lane[idx];
        }
        all_indices.push(top.to_vec());
    }

    Ok((NdArray::from_array(values), all_indices))
}
