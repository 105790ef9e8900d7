use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::errors::{GPError, GPResult};
use crate::tensor::NdArray;

use super::function::Op;
use super::Context;

/// One primitive-op application recorded while building the graph: the
/// operator, the input `Variable`s it closed over, and the output value
/// it produced (cached so ops whose backward needs the forward output,
/// e.g. Sigmoid, don't have to recompute it).
pub(crate) struct Creator {
    pub(crate) op: Op,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) output_value: NdArray,
}

pub(crate) struct VarInner {
    pub(crate) value: NdArray,
    pub(crate) grad: Option<NdArray>,
    pub(crate) creator: Option<Creator>,
    pub(crate) generation: usize,
    pub(crate) requires_grad: bool,
    pub(crate) name: Option<String>,
}

/// A node in the reverse-mode autodiff graph. Cheaply cloneable (it is a
/// reference-counted handle over shared interior-mutable state), so the
/// same `Variable` can be an input to many downstream ops.
#[derive(Clone)]
pub struct Variable(pub(crate) Rc<RefCell<VarInner>>);

impl Variable {
    /// Constructs a leaf variable (no creator), generation 0.
    pub fn new(value: NdArray) -> Self {
        Self::new_named(value, None, false)
    }

    pub fn new_with_grad(value: NdArray) -> Self {
        Self::new_named(value, None, true)
    }

    pub fn named(value: NdArray, name: impl Into<String>) -> Self {
        Self::new_named(value, Some(name.into()), false)
    }

    fn new_named(value: NdArray, name: Option<String>, requires_grad: bool) -> Self {
        Variable(Rc::new(RefCell::new(VarInner {
            value,
            grad: None,
            creator: None,
            generation: 0,
            requires_grad,
            name,
        })))
    }

    pub(crate) fn from_op(op: Op, inputs: Vec<Variable>, output_value: NdArray, ctx: &Context) -> Self {
        let requires_grad = ctx.training() && inputs.iter().any(|v| v.requires_grad());
        if !requires_grad {
            return Self::new_named(output_value, None, false);
        }
        let generation = inputs.iter().map(|v| v.generation()).max().unwrap_or(0) + 1;
        Variable(Rc::new(RefCell::new(VarInner {
            value: output_value.clone(),
            grad: None,
            creator: Some(Creator { op, inputs, output_value }),
            generation,
            requires_grad: true,
            name: None,
        })))
    }

    pub fn value(&self) -> NdArray {
        self.0.borrow().value.clone()
    }

    pub fn grad(&self) -> Option<NdArray> {
        self.0.borrow().grad.clone()
    }

    pub fn requires_grad(&self) -> bool {
        self.0.borrow().requires_grad
    }

    pub fn generation(&self) -> usize {
        self.0.borrow().generation
    }

    pub fn name(&self) -> Option<String> {
        self.0.borrow().name.clone()
    }

    pub fn has_creator(&self) -> bool {
        self.0.borrow().creator.is_some()
    }

    pub fn set_grad(&self, grad: NdArray) {
        self.0.borrow_mut().grad = Some(grad);
    }

    /// Overwrites this variable's value in place, detached from any
    /// creator. Used by optimizers to apply a parameter update without
    /// allocating a new leaf `Variable` (which would drop the registry's
    /// reference to it).
    pub fn set_value(&self, value: NdArray) {
        self.0.borrow_mut().value = value;
    }

    pub fn zero_grad(&self) {
        self.0.borrow_mut().grad = None;
    }

    pub fn shape(&self) -> crate::shape::Shape {
        self.0.borrow().value.shape()
    }

    fn accumulate_grad(&self, grad: NdArray) -> GPResult<()> {
        let mut inner = self.0.borrow_mut();
        match &inner.grad {
            Some(existing) => {
                let summed = existing.add(&grad)?;
                inner.grad = Some(summed);
            }
            None => inner.grad = Some(grad),
        }
        Ok(())
    }

    /// Runs reverse-mode backward from `self` (must be scalar-valued, or
    /// the gradient is seeded with ones matching its shape per §4.2).
    pub fn backward(&self) -> GPResult<()> {
        if self.0.borrow().grad.is_none() {
            let ones = NdArray::ones(self.0.borrow().value.shape().dims());
            self.0.borrow_mut().grad = Some(ones);
        }

        // Max-heap by generation, implemented as a sorted insertion queue
        // (graphs here are small enough that O(n) insertion beats pulling
        // in a BinaryHeap-with-custom-Ord dependency); ties keep FIFO
        // insertion order for determinism per §5.
        let mut pending: VecDeque<Variable> = VecDeque::new();
        let mut seen_creator_ptrs: std::collections::HashSet<usize> = std::collections::HashSet::new();

        let push = |pending: &mut VecDeque<Variable>, seen: &mut std::collections::HashSet<usize>, v: &Variable| {
            if !v.has_creator() {
                return;
            }
            let ptr = v.0.as_ptr() as usize;
            if seen.contains(&ptr) {
                return;
            }
            seen.insert(ptr);
            let gen = v.generation();
            let pos = pending.iter().position(|p| p.generation() < gen).unwrap_or(pending.len());
            pending.insert(pos, v.clone());
        };

        push(&mut pending, &mut seen_creator_ptrs, self);

        while let Some(var) = pending.pop_front() {
            let (op, inputs, output_value, grad_output) = {
                let inner = var.0.borrow();
                let creator = inner.creator.as_ref().expect("queued variable always has a creator");
                let grad_output = inner
                    .grad
                    .clone()
                    .ok_or_else(|| GPError::NullInput("missing gradient at backward visit".into()))?;
                (
                    creator.op.clone(),
                    creator.inputs.clone(),
                    creator.output_value.clone(),
                    grad_output,
                )
            };

            let input_values: Vec<NdArray> = inputs.iter().map(|v| v.value()).collect();
            let input_grads = op.backward(&input_values, &output_value, &grad_output)?;

            for (input, grad) in inputs.iter().zip(input_grads.into_iter()) {
                if let Some(g) = grad {
                    if input.requires_grad() {
                        input.accumulate_grad(g)?;
                        push(&mut pending, &mut seen_creator_ptrs, input);
                    }
                }
            }
        }
        Ok(())
    }

    /// Breadth-first detaches the creator chain reachable from `self`,
    /// dropping input references so the underlying buffers can be freed
    /// between training steps.
    pub fn unchain_backward(&self) {
        let mut queue: VecDeque<Variable> = VecDeque::new();
        queue.push_back(self.clone());
        while let Some(v) = queue.pop_front() {
            let creator = v.0.borrow_mut().creator.take();
            if let Some(creator) = creator {
                for input in creator.inputs {
                    queue.push_back(input);
                }
            }
        }
    }
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("Variable")
            .field("shape", &inner.value.shape())
            .field("generation", &inner.generation)
            .field("requires_grad", &inner.requires_grad)
            .field("name", &inner.name)
            .finish()
    }
}
