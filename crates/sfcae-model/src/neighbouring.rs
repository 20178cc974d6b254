//! Learned nearest-neighbouring aggregation.
//!
//! A pure 1D reordering hides most of the mesh connectivity from the
//! convolutions. This layer restores it: for every node it takes the
//! already-gathered `[self, neighbour_1, ...]` values (see
//! `sfcae_core::NeighbourTable::stack`) and mixes them with a learned
//! per-node, per-neighbour weight plus a per-node bias. Weights start at
//! `1 / num_neigh`, so an untrained layer is an unweighted neighbourhood
//! average.

use burn::module::Param;
use burn::prelude::*;

/// Configuration for [`NearestNeighbouring`].
#[derive(Config, Debug)]
pub struct NearestNeighbouringConfig {
    /// Output channels.
    pub channels: usize,
    /// Nodes in the (possibly structured) working grid.
    pub nodes: usize,
    /// Neighbourhood entries per node, including self and any
    /// self-concatenated duplicates.
    pub num_neigh: usize,
    /// Initial weight value; defaults to `1 / num_neigh`.
    pub initial_weight: Option<f64>,
}

impl NearestNeighbouringConfig {
    /// Initialize the layer.
    pub fn init<B: Backend>(&self, device: &B::Device) -> NearestNeighbouring<B> {
        let initial = self
            .initial_weight
            .unwrap_or(1.0 / self.num_neigh as f64);
        let weights = Tensor::ones([self.channels, self.nodes, self.num_neigh], device)
            .mul_scalar(initial);
        let bias = Tensor::zeros([self.nodes], device);
        NearestNeighbouring {
            weights: Param::from_tensor(weights),
            bias: Param::from_tensor(bias),
        }
    }
}

/// Per-node weighted neighbourhood sum with a per-node bias.
#[derive(Module, Debug)]
pub struct NearestNeighbouring<B: Backend> {
    /// `[channels, nodes, num_neigh]`
    weights: Param<Tensor<B, 3>>,
    /// `[nodes]`
    bias: Param<Tensor<B, 1>>,
}

impl<B: Backend> NearestNeighbouring<B> {
    /// Aggregate `[batch, channels, nodes, num_neigh]` into
    /// `[batch, channels, nodes]`.
    pub fn forward(&self, stacked: Tensor<B, 4>) -> Tensor<B, 3> {
        let [_, _, nodes, _] = stacked.dims();
        let weighted = stacked * self.weights.val().unsqueeze::<4>();
        let summed = weighted.sum_dim(3).squeeze(3);
        summed + self.bias.val().reshape([1, 1, nodes])
    }
}
