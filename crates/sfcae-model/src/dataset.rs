//! Per-batch mesh data: snapshots, their SFC orderings and length adapters.
//!
//! Adaptive simulations change the mesh between time steps, so every
//! snapshot carries its own node count, its own set of SFC orderings and,
//! when the node count differs from the model's working size, a length
//! adapter reconciling the two. The batch owns all of that; the model only
//! consumes it.

use burn::prelude::*;
use tracing::debug;

use sfcae_core::{BackwardForwardConnecting, InterpolationWeights, ReduceStrategy, SfcOrdering};

use crate::error::{ModelError, Result};

/// Forward/inverse length adaptation for one `(node count, working size)`
/// pair.
#[derive(Debug, Clone)]
pub enum LengthAdapter {
    /// Backward-forward accordion tiling (the default).
    Filling(BackwardForwardConnecting),
    /// Linear interpolation up plus back-mapped interpolation down.
    Interpolation {
        expand: InterpolationWeights,
        reduce: InterpolationWeights,
    },
}

impl LengthAdapter {
    /// Tiling adapter from `nodes` to `working` samples.
    pub fn filling(nodes: usize, working: usize) -> Result<Self> {
        if nodes > working {
            return Err(ModelError::batch(format!(
                "snapshot has {nodes} nodes but the working size is only {working}; \
                 use interpolation for oversized snapshots"
            )));
        }
        Ok(LengthAdapter::Filling(BackwardForwardConnecting::new(
            nodes, working,
        )?))
    }

    /// Interpolation adapter between `nodes` and `working` samples, with
    /// back-mapping on the reduction direction when it applies.
    pub fn interpolation(nodes: usize, working: usize) -> Result<Self> {
        Ok(LengthAdapter::Interpolation {
            expand: InterpolationWeights::compute(nodes, working, false)?,
            reduce: InterpolationWeights::compute(working, nodes, true)?,
        })
    }

    /// Bring a `[batch, channels, nodes]` tensor up to the working size.
    pub fn expand<B: Backend>(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        match self {
            LengthAdapter::Filling(filling) => filling.expand(input),
            LengthAdapter::Interpolation { expand, .. } => expand.apply(input),
        }
    }

    /// Bring a `[batch, channels, working]` tensor back to the node count.
    pub fn restore<B: Backend>(
        &self,
        input: Tensor<B, 3>,
        strategy: ReduceStrategy,
    ) -> Tensor<B, 3> {
        match self {
            LengthAdapter::Filling(filling) => filling.contract(input, strategy),
            LengthAdapter::Interpolation { reduce, .. } => reduce.apply(input),
        }
    }
}

/// A batch of adaptive-mesh snapshots ready for the autoencoder.
#[derive(Debug, Clone)]
pub struct SnapshotBatch<B: Backend> {
    fields: Vec<Tensor<B, 2>>,
    /// Per snapshot: one ordering per SFC curve.
    orderings: Vec<Vec<SfcOrdering>>,
    adapters: Vec<Option<LengthAdapter>>,
    coords: Option<Vec<Tensor<B, 2>>>,
    shuffle: Option<Vec<usize>>,
    reduce: ReduceStrategy,
}

impl<B: Backend> SnapshotBatch<B> {
    /// Assemble a batch from `[channels, nodes]` snapshots and their SFC
    /// orderings.
    ///
    /// Every snapshot must carry the same number of curves and the same
    /// channel count; each ordering must cover its snapshot's nodes.
    pub fn new(fields: Vec<Tensor<B, 2>>, orderings: Vec<Vec<SfcOrdering>>) -> Result<Self> {
        if fields.is_empty() {
            return Err(ModelError::batch("batch contains no snapshots"));
        }
        if fields.len() != orderings.len() {
            return Err(ModelError::batch(format!(
                "{} snapshots but {} ordering sets",
                fields.len(),
                orderings.len()
            )));
        }
        let channels = fields[0].dims()[0];
        let curves = orderings[0].len();
        if curves == 0 {
            return Err(ModelError::batch("each snapshot needs at least one SFC ordering"));
        }
        for (k, (field, curve_set)) in fields.iter().zip(&orderings).enumerate() {
            let [c, nodes] = field.dims();
            if c != channels {
                return Err(ModelError::batch(format!(
                    "snapshot {k} has {c} channels, expected {channels}"
                )));
            }
            if curve_set.len() != curves {
                return Err(ModelError::batch(format!(
                    "snapshot {k} has {} orderings, expected {curves}",
                    curve_set.len()
                )));
            }
            for (i, ordering) in curve_set.iter().enumerate() {
                if ordering.len() != nodes {
                    return Err(ModelError::batch(format!(
                        "snapshot {k} curve {i}: ordering covers {} nodes, field has {nodes}",
                        ordering.len()
                    )));
                }
            }
        }
        let adapters = vec![None; fields.len()];
        Ok(Self {
            fields,
            orderings,
            adapters,
            coords: None,
            shuffle: None,
            reduce: ReduceStrategy::default(),
        })
    }

    /// Attach per-snapshot coordinate channels (same node layout as the
    /// fields).
    pub fn with_coords(mut self, coords: Vec<Tensor<B, 2>>) -> Result<Self> {
        if coords.len() != self.fields.len() {
            return Err(ModelError::batch(format!(
                "{} coordinate sets for {} snapshots",
                coords.len(),
                self.fields.len()
            )));
        }
        for (k, (field, coord)) in self.fields.iter().zip(&coords).enumerate() {
            if field.dims()[1] != coord.dims()[1] {
                return Err(ModelError::batch(format!(
                    "snapshot {k}: coordinates cover {} nodes, field has {}",
                    coord.dims()[1],
                    field.dims()[1]
                )));
            }
        }
        self.coords = Some(coords);
        Ok(self)
    }

    /// Remap which curve each branch consumes.
    ///
    /// The shuffle must name a curve for every branch, so its length must
    /// match the batch's curve count.
    pub fn with_shuffle(mut self, shuffle: Vec<usize>) -> Result<Self> {
        let curves = self.num_curves();
        if shuffle.len() != curves {
            return Err(ModelError::batch(format!(
                "shuffle names {} curves but the batch carries {curves}",
                shuffle.len()
            )));
        }
        if shuffle.iter().any(|&i| i >= curves) {
            return Err(ModelError::batch(format!(
                "shuffle index out of range for {curves} curves"
            )));
        }
        self.shuffle = Some(shuffle);
        Ok(self)
    }

    /// Choose how filling adapters fold reconstructions back down.
    pub fn with_reduce(mut self, reduce: ReduceStrategy) -> Self {
        self.reduce = reduce;
        self
    }

    /// Strategy used when contracting expanded sequences.
    pub fn reduce_strategy(&self) -> ReduceStrategy {
        self.reduce
    }

    /// Build a length adapter for every snapshot whose node count differs
    /// from `working`; `interpolated` selects interpolation over tiling.
    ///
    /// Adapter construction is cached by node count within the batch since
    /// consecutive snapshots frequently share a mesh.
    pub fn with_working_size(mut self, working: usize, interpolated: bool) -> Result<Self> {
        let mut cache: Vec<(usize, LengthAdapter)> = Vec::new();
        for (k, field) in self.fields.iter().enumerate() {
            let nodes = field.dims()[1];
            if nodes == working {
                self.adapters[k] = None;
                continue;
            }
            let cached = cache.iter().find(|(n, _)| *n == nodes).map(|(_, a)| a.clone());
            let adapter = match cached {
                Some(adapter) => adapter,
                None => {
                    debug!(nodes, working, interpolated, "building length adapter");
                    let adapter = if interpolated {
                        LengthAdapter::interpolation(nodes, working)?
                    } else {
                        LengthAdapter::filling(nodes, working)?
                    };
                    cache.push((nodes, adapter.clone()));
                    adapter
                }
            };
            self.adapters[k] = Some(adapter);
        }
        Ok(self)
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the batch is empty (never true for a validated batch).
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Channels per snapshot.
    pub fn channels(&self) -> usize {
        self.fields[0].dims()[0]
    }

    /// Curves available per snapshot.
    pub fn num_curves(&self) -> usize {
        self.orderings[0].len()
    }

    /// Field tensor of snapshot `k`.
    pub fn field(&self, k: usize) -> &Tensor<B, 2> {
        &self.fields[k]
    }

    /// Coordinate tensor of snapshot `k`, if any.
    pub fn coords(&self, k: usize) -> Option<&Tensor<B, 2>> {
        self.coords.as_ref().map(|c| &c[k])
    }

    /// The curve index branch `branch` consumes, honoring any shuffle.
    pub fn curve_for_branch(&self, branch: usize) -> usize {
        match &self.shuffle {
            Some(shuffle) => shuffle[branch],
            None => branch,
        }
    }

    /// Ordering of snapshot `k` for the given curve.
    pub fn ordering(&self, k: usize, curve: usize) -> &SfcOrdering {
        &self.orderings[k][curve]
    }

    /// Expand snapshot row `input` (`[1, channels, nodes]`) to the working
    /// size.
    pub fn expand(&self, k: usize, input: Tensor<B, 3>) -> Tensor<B, 3> {
        match &self.adapters[k] {
            Some(adapter) => adapter.expand(input),
            None => input,
        }
    }

    /// Fold a working-size row back to snapshot `k`'s node count.
    pub fn restore(&self, k: usize, input: Tensor<B, 3>) -> Tensor<B, 3> {
        match &self.adapters[k] {
            Some(adapter) => adapter.restore(input, self.reduce),
            None => input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn identity_ordering(n: usize) -> SfcOrdering {
        SfcOrdering::new((0..n).collect()).unwrap()
    }

    fn random_field(channels: usize, nodes: usize) -> Tensor<TestBackend, 2> {
        let device = Default::default();
        Tensor::random([channels, nodes], burn::tensor::Distribution::Default, &device)
    }

    #[test]
    fn test_batch_validation() {
        let batch = SnapshotBatch::new(
            vec![random_field(2, 10), random_field(2, 14)],
            vec![vec![identity_ordering(10)], vec![identity_ordering(14)]],
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.channels(), 2);
        assert_eq!(batch.num_curves(), 1);

        // Ordering length must match the field's node count.
        assert!(SnapshotBatch::new(
            vec![random_field(2, 10)],
            vec![vec![identity_ordering(9)]],
        )
        .is_err());
        // Channel counts must agree across the batch.
        assert!(SnapshotBatch::new(
            vec![random_field(2, 10), random_field(3, 10)],
            vec![vec![identity_ordering(10)], vec![identity_ordering(10)]],
        )
        .is_err());
    }

    #[test]
    fn test_adapters_built_only_where_needed() {
        let batch = SnapshotBatch::new(
            vec![random_field(1, 16), random_field(1, 12)],
            vec![vec![identity_ordering(16)], vec![identity_ordering(12)]],
        )
        .unwrap()
        .with_working_size(16, false)
        .unwrap();

        assert!(batch.adapters[0].is_none());
        assert!(matches!(batch.adapters[1], Some(LengthAdapter::Filling(_))));

        let row = batch.field(1).clone().unsqueeze::<3>();
        let expanded = batch.expand(1, row);
        assert_eq!(expanded.dims(), [1, 1, 16]);
        let restored = batch.restore(1, expanded);
        assert_eq!(restored.dims(), [1, 1, 12]);
    }

    #[test]
    fn test_filling_rejects_oversized_snapshot() {
        let batch = SnapshotBatch::new(
            vec![random_field(1, 20)],
            vec![vec![identity_ordering(20)]],
        )
        .unwrap();
        assert!(batch.clone().with_working_size(16, false).is_err());
        // Interpolation handles reduction fine.
        assert!(batch.with_working_size(16, true).is_ok());
    }

    #[test]
    fn test_shuffle_bounds() {
        let batch = SnapshotBatch::new(
            vec![random_field(1, 8)],
            vec![vec![identity_ordering(8), identity_ordering(8)]],
        )
        .unwrap();
        assert!(batch.clone().with_shuffle(vec![1, 0]).is_ok());
        assert!(batch.clone().with_shuffle(vec![2, 0]).is_err());
        // A shuffle shorter than the curve count would leave branches
        // without a curve; reject it up front.
        assert!(batch.with_shuffle(vec![1]).is_err());
    }
}
