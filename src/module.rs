//! Hierarchical composition of named parameters, buffers, and child
//! modules: a small registry so attention/MoE/block layers can nest
//! uniformly and an optimizer can walk every parameter in the tree by
//! dotted name.

use crate::autodiff::Variable;
use crate::errors::{GPError, GPResult};
use crate::tensor::NdArray;

/// Cloning a `Module` aliases rather than copies: `Variable` is an
/// `Rc`-backed handle, so a clone used for tree traversal (e.g. a parent
/// layer pulling a child's module in via [`Module::register_module`])
/// still shares the same underlying storage the child forwards through.
#[derive(Default, Clone)]
pub struct Module {
    parameters: Vec<(String, Variable)>,
    buffers: Vec<(String, NdArray)>,
    children: Vec<(String, Module)>,
    training: bool,
}

impl Module {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
            buffers: Vec::new(),
            children: Vec::new(),
            training: true,
        }
    }

    pub fn register_parameter(&mut self, name: impl Into<String>, value: Variable) -> GPResult<()> {
        let name = name.into();
        if self.parameters.iter().any(|(n, _)| *n == name) {
            return Err(GPError::argument(format!("duplicate parameter name '{name}'")));
        }
        self.parameters.push((name, value));
        Ok(())
    }

    pub fn register_buffer(&mut self, name: impl Into<String>, value: NdArray) -> GPResult<()> {
        let name = name.into();
        if self.buffers.iter().any(|(n, _)| *n == name) {
            return Err(GPError::argument(format!("duplicate buffer name '{name}'")));
        }
        self.buffers.push((name, value));
        Ok(())
    }

    pub fn register_module(&mut self, name: impl Into<String>, child: Module) -> GPResult<()> {
        let name = name.into();
        if self.children.iter().any(|(n, _)| *n == name) {
            return Err(GPError::argument(format!("duplicate sub-module name '{name}'")));
        }
        self.children.push((name, child));
        Ok(())
    }

    /// Sets the training flag on this module and every descendant.
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
        for (_, child) in self.children.iter_mut() {
            child.set_training(training);
        }
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn parameter(&self, name: &str) -> Option<&Variable> {
        self.parameters.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn buffer(&self, name: &str) -> Option<&NdArray> {
        self.buffers.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn buffer_mut(&mut self, name: &str) -> Option<&mut NdArray> {
        self.buffers.iter_mut().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn child(&self, name: &str) -> Option<&Module> {
        self.children.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.children.iter_mut().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Pre-order, dot-joined parameter names: this module's own
    /// parameters first, then each child's (recursively, if `recurse`).
    pub fn named_parameters(&self, prefix: &str, recurse: bool) -> Vec<(String, Variable)> {
        let mut out: Vec<(String, Variable)> = self
            .parameters
            .iter()
            .map(|(name, param)| (join(prefix, name), param.clone()))
            .collect();
        if recurse {
            for (name, child) in &self.children {
                out.extend(child.named_parameters(&join(prefix, name), true));
            }
        }
        out
    }

    pub fn named_buffers(&self, prefix: &str, recurse: bool) -> Vec<(String, NdArray)> {
        let mut out: Vec<(String, NdArray)> = self
            .buffers
            .iter()
            .map(|(name, buf)| (join(prefix, name), buf.clone()))
            .collect();
        if recurse {
            for (name, child) in &self.children {
                out.extend(child.named_buffers(&join(prefix, name), true));
            }
        }
        out
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_parameter_name_rejected() {
        let mut m = Module::new();
        m.register_parameter("w", Variable::new(NdArray::zeros(&[1]))).unwrap();
        assert!(m.register_parameter("w", Variable::new(NdArray::zeros(&[1]))).is_err());
    }

    #[test]
    fn named_parameters_are_dot_joined_preorder() {
        let mut child = Module::new();
        child.register_parameter("weight", Variable::new(NdArray::zeros(&[1]))).unwrap();
        let mut root = Module::new();
        root.register_parameter("bias", Variable::new(NdArray::zeros(&[1]))).unwrap();
        root.register_module("linear", child).unwrap();

        let names: Vec<String> = root.named_parameters("", true).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["bias".to_string(), "linear.weight".to_string()]);
    }

    #[test]
    fn set_training_propagates_to_children() {
        let mut child = Module::new();
        child.set_training(true);
        let mut root = Module::new();
        root.register_module("child", child).unwrap();
        root.set_training(false);
        assert!(!root.child("child").unwrap().is_training());
    }
}
