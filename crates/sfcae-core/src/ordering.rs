//! Space-filling-curve orderings.
//!
//! An SFC ordering is an integer permutation of a mesh's node indices,
//! generated externally from mesh connectivity and treated as immutable
//! here. The ordering and its inverse are applied to the last axis of a
//! node-ordered tensor via index select, which keeps the operation
//! differentiable and backend-agnostic.

use burn::prelude::*;

use crate::error::{CoreError, Result};

/// A node permutation paired with its inverse.
///
/// Applying `forward` then `inverse` (or vice versa) on the last axis of a
/// tensor is an exact identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SfcOrdering {
    forward: Vec<i64>,
    inverse: Vec<i64>,
}

impl SfcOrdering {
    /// Build an ordering from a permutation of `0..perm.len()`.
    ///
    /// The inverse permutation is derived here; the input is validated to be
    /// a true permutation (each index present exactly once).
    pub fn new(perm: Vec<usize>) -> Result<Self> {
        let n = perm.len();
        if n == 0 {
            return Err(CoreError::permutation("empty ordering"));
        }
        let mut inverse = vec![usize::MAX; n];
        for (pos, &node) in perm.iter().enumerate() {
            if node >= n {
                return Err(CoreError::permutation(format!(
                    "index {node} out of range for {n} nodes"
                )));
            }
            if inverse[node] != usize::MAX {
                return Err(CoreError::permutation(format!("index {node} appears twice")));
            }
            inverse[node] = pos;
        }
        Ok(Self {
            forward: perm.into_iter().map(|i| i as i64).collect(),
            inverse: inverse.into_iter().map(|i| i as i64).collect(),
        })
    }

    /// Number of nodes covered by this ordering.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether the ordering is empty (never true for a validated ordering).
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Reorder the last axis of `input` into SFC order.
    pub fn apply<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        select_last(input, &self.forward)
    }

    /// Undo [`SfcOrdering::apply`] on the last axis of `input`.
    pub fn invert<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        select_last(input, &self.inverse)
    }

    /// The forward permutation as gather indices.
    pub fn forward_indices(&self) -> &[i64] {
        &self.forward
    }

    /// The inverse permutation as gather indices.
    pub fn inverse_indices(&self) -> &[i64] {
        &self.inverse
    }
}

/// Gather `indices` along the last axis of `input`.
pub fn select_last<B: Backend, const D: usize>(input: Tensor<B, D>, indices: &[i64]) -> Tensor<B, D> {
    let device = input.device();
    let index_tensor = Tensor::from_data(indices, &device);
    input.select(D - 1, index_tensor)
}

/// Reverse the last axis of `input` via reversed-index select.
pub fn flip_last<B: Backend, const D: usize>(input: Tensor<B, D>) -> Tensor<B, D> {
    let len = input.dims()[D - 1];
    let indices: Vec<i64> = (0..len).map(|i| (len - 1 - i) as i64).collect();
    select_last(input, &indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_ordering_round_trip() {
        let device = Default::default();
        let ordering = SfcOrdering::new(vec![2, 0, 3, 1]).unwrap();
        let x = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0, 2.0, 3.0]], &device);

        let reordered = ordering.apply(x.clone());
        let expected: Vec<f32> = vec![2.0, 0.0, 3.0, 1.0];
        assert_eq!(reordered.clone().into_data().to_vec::<f32>().unwrap(), expected);

        let restored = ordering.invert(reordered);
        assert_eq!(
            restored.into_data().to_vec::<f32>().unwrap(),
            x.into_data().to_vec::<f32>().unwrap()
        );
    }

    #[test]
    fn test_rejects_non_permutation() {
        assert!(SfcOrdering::new(vec![0, 0, 1]).is_err());
        assert!(SfcOrdering::new(vec![0, 3]).is_err());
        assert!(SfcOrdering::new(vec![]).is_err());
    }

    #[test]
    fn test_flip_last() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0]], &device);
        let flipped = flip_last(x);
        assert_eq!(flipped.into_data().to_vec::<f32>().unwrap(), vec![3.0, 2.0, 1.0]);
    }
}
