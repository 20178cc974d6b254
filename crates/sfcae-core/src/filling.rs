//! Backward-forward length adaptation.
//!
//! Adaptive meshes produce a different node count per snapshot, while the
//! convolutional stack needs a fixed working length. The backward-forward
//! scheme reconciles the two by tiling the SFC-ordered sequence in
//! alternating forward/backward passes (an accordion fold), e.g.
//! `[1, 2, 3] -> [1, 2, 3, 2, 1, 2, 3, 2]`; contraction folds the long
//! sequence back by accumulating each pass onto the short buffer, weighting
//! every contribution by the inverse of how often its slot was written.
//!
//! The mean contraction is lossy in general; the truncate strategy takes the
//! leading `short` elements of the expanded sequence, which is always an
//! exact inverse of the expansion.

use burn::prelude::*;

use crate::error::{CoreError, Result};
use crate::ordering::{flip_last, select_last};

/// How a long sequence is folded back onto the short one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReduceStrategy {
    /// Occurrence-weighted accumulation over all passes.
    Mean,
    /// Keep the leading `short` elements (exact inverse of the expansion).
    #[default]
    Truncate,
}

/// Deterministic length adapter between a short and a long sequence length.
///
/// Constructed once per `(length_a, length_b)` pair observed in the dataset
/// and reused for every snapshot sharing that pair. Both transforms operate
/// on the last axis of a `[batch, channels, len]` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct BackwardForwardConnecting {
    short: usize,
    long: usize,
    /// Pass lengths; full passes are `short - 1` long, the final pass may be
    /// shorter to hit the target exactly.
    groups: Vec<usize>,
    /// How many passes write each slot of the short buffer.
    occurrence: Vec<f64>,
    /// Precomputed gather indices realizing the whole expansion in one select.
    expand_indices: Vec<i64>,
}

impl BackwardForwardConnecting {
    /// Build the adapter for an unordered pair of lengths.
    ///
    /// The shorter length must be at least 2 since full passes are
    /// `short - 1` elements long.
    pub fn new(length_a: usize, length_b: usize) -> Result<Self> {
        let short = length_a.min(length_b);
        let long = length_a.max(length_b);
        if short < 2 {
            return Err(CoreError::length(format!(
                "backward-forward filling needs at least 2 nodes, got {short}"
            )));
        }

        let step = short - 1;
        let mut groups = Vec::new();
        let mut nodes = 0;
        while nodes < long {
            let group = step.min(long - nodes);
            groups.push(group);
            nodes += group;
        }

        let total_re = long / step;
        let even_re = total_re / 2;
        let odd_re = total_re - even_re;
        let remainder = long % step;
        let mut occurrence = vec![0.0f64; short];
        for slot in occurrence[..short - 1].iter_mut() {
            *slot += odd_re as f64;
        }
        for slot in occurrence[1..].iter_mut() {
            *slot += even_re as f64;
        }
        if odd_re == even_re {
            for slot in occurrence[..remainder].iter_mut() {
                *slot += 1.0;
            }
        } else {
            for slot in occurrence[short - remainder - 1..].iter_mut() {
                *slot += 1.0;
            }
        }

        let mut expand_indices = Vec::with_capacity(long);
        for (pass, &group) in groups.iter().enumerate() {
            if pass % 2 == 0 {
                expand_indices.extend((0..group as i64).collect::<Vec<_>>());
            } else {
                expand_indices.extend((0..group).map(|j| (short - 1 - j) as i64));
            }
        }

        Ok(Self {
            short,
            long,
            groups,
            occurrence,
            expand_indices,
        })
    }

    /// The shorter of the two lengths.
    pub fn short(&self) -> usize {
        self.short
    }

    /// The longer of the two lengths.
    pub fn long(&self) -> usize {
        self.long
    }

    /// Slot write counts used by the mean contraction.
    pub fn occurrence(&self) -> &[f64] {
        &self.occurrence
    }

    /// Expand `[batch, channels, short]` to `[batch, channels, long]` by
    /// accordion tiling.
    pub fn expand<B: Backend>(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        debug_assert_eq!(input.dims()[2], self.short);
        select_last(input, &self.expand_indices)
    }

    /// Fold `[batch, channels, long]` back to `[batch, channels, short]`.
    pub fn contract<B: Backend>(
        &self,
        input: Tensor<B, 3>,
        strategy: ReduceStrategy,
    ) -> Tensor<B, 3> {
        debug_assert_eq!(input.dims()[2], self.long);
        match strategy {
            ReduceStrategy::Truncate => input.narrow(2, 0, self.short),
            ReduceStrategy::Mean => self.contract_mean(input),
        }
    }

    fn contract_mean<B: Backend>(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, channels, _] = input.dims();
        let device = input.device();
        let mut acc = Tensor::zeros([batch, channels, self.short], &device);

        let mut cursor = 0;
        for (pass, &group) in self.groups.iter().enumerate() {
            let segment = input.clone().narrow(2, cursor, group);
            cursor += group;

            // Forward passes write the head of the buffer, backward passes
            // (reversed) write the tail.
            let (segment, slots) = if pass % 2 == 0 {
                (segment, &self.occurrence[..group])
            } else {
                (flip_last(segment), &self.occurrence[self.short - group..])
            };

            let inv: Vec<f32> = slots.iter().map(|&o| (1.0 / o) as f32).collect();
            let weights =
                Tensor::<B, 1>::from_floats(inv.as_slice(), &device).reshape([1, 1, group]);
            let contribution = segment * weights;

            let padded = if group == self.short {
                contribution
            } else {
                let padding =
                    Tensor::zeros([batch, channels, self.short - group], &device);
                if pass % 2 == 0 {
                    Tensor::cat(vec![contribution, padding], 2)
                } else {
                    Tensor::cat(vec![padding, contribution], 2)
                }
            };
            acc = acc + padded;
        }
        acc
    }
}
