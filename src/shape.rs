use serde::{Deserialize, Serialize};

use crate::errors::{GPError, GPResult};

/// An ordered sequence of non-negative dimension sizes.
///
/// Two shapes are broadcast-compatible if, right-aligned, every dim pair
/// is either equal or one of the two is 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn size(&self) -> usize {
        self.0.iter().product()
    }

    /// Resolves a possibly-negative axis (`-1` == last axis) against this
    /// shape's rank.
    pub fn resolve_axis(&self, axis: isize) -> GPResult<usize> {
        let rank = self.rank() as isize;
        let resolved = if axis < 0 { rank + axis } else { axis };
        if resolved < 0 || resolved >= rank {
            return Err(GPError::argument(format!(
                "axis {axis} out of range for rank {rank}"
            )));
        }
        Ok(resolved as usize)
    }

    pub fn is_broadcast_compatible(&self, other: &Shape) -> bool {
        let a = &self.0;
        let b = &other.0;
        let n = a.len().max(b.len());
        for i in 0..n {
            let da = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
            let db = if i < b.len() { b[b.len() - 1 - i] } else { 1 };
            if da != db && da != 1 && db != 1 {
                return false;
            }
        }
        true
    }

    /// The shape resulting from broadcasting `self` and `other` together,
    /// or an error if they are not broadcast-compatible.
    pub fn broadcast_with(&self, other: &Shape) -> GPResult<Shape> {
        if !self.is_broadcast_compatible(other) {
            return Err(GPError::shape(self.0.clone(), other.0.clone()));
        }
        let a = &self.0;
        let b = &other.0;
        let n = a.len().max(b.len());
        let mut out = vec![0usize; n];
        for i in 0..n {
            let da = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
            let db = if i < b.len() { b[b.len() - 1 - i] } else { 1 };
            out[n - 1 - i] = da.max(db);
        }
        Ok(Shape(out))
    }

    pub fn is_permutation(perm: &[usize], rank: usize) -> bool {
        if perm.len() != rank {
            return false;
        }
        let mut seen = vec![false; rank];
        for &p in perm {
            if p >= rank || seen[p] {
                return false;
            }
            seen[p] = true;
        }
        true
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.0.clone()
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_compatible_matches_right_alignment() {
        let a = Shape::new(vec![1, 3]);
        let b = Shape::new(vec![2, 3]);
        assert!(a.is_broadcast_compatible(&b));
        assert_eq!(a.broadcast_with(&b).unwrap().dims(), &[2, 3]);
    }

    #[test]
    fn broadcast_incompatible_rejected() {
        let a = Shape::new(vec![2, 3]);
        let b = Shape::new(vec![4, 3]);
        assert!(!a.is_broadcast_compatible(&b));
        assert!(a.broadcast_with(&b).is_err());
    }

    #[test]
    fn resolve_negative_axis() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.resolve_axis(-1).unwrap(), 2);
        assert_eq!(s.resolve_axis(0).unwrap(), 0);
        assert!(s.resolve_axis(3).is_err());
    }
}
