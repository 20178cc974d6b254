//! Multi-SFC convolutional decoder.
//!
//! Mirrors the encoder: the latent vector expands through the
//! fully-connected stack, splits into one slab per branch, runs the
//! transposed convolutions back up to the working length, undoes the
//! structuring SFC and the per-snapshot length adaptation, and finally
//! inverts each snapshot's curve ordering. Branch reconstructions are
//! summed and passed through the activation once more.

use std::sync::Arc;

use burn::module::Ignored;
use burn::nn::Linear;
use burn::prelude::*;
use sfcae_core::ReduceStrategy;

use crate::branch::{BranchDeconvs, BranchSmoothing, DeconvBlock};
use crate::dataset::SnapshotBatch;
use crate::encoder::linear;
use crate::neighbouring::NearestNeighbouringConfig;
use crate::plan::ModelPlan;

/// Decoder half of the autoencoder.
#[derive(Module, Debug)]
pub struct SfcCaeDecoder<B: Backend> {
    fcs: Vec<Linear<B>>,
    deconvs: BranchDeconvs<B>,
    smoothing: Option<BranchSmoothing<B>>,
    plan: Ignored<Arc<ModelPlan>>,
}

fn deconv_stack<B: Backend>(plan: &ModelPlan, device: &B::Device) -> Vec<DeconvBlock<B>> {
    let channels = &plan.layers.channels;
    let last = channels.len() - 1;
    (0..plan.layers.num_conv_layers())
        .map(|j| {
            DeconvBlock::new(
                plan.ndim,
                channels[last - j],
                channels[last - j - 1],
                &plan.conv,
                plan.layers.output_paddings[j],
                plan.config.init_range,
                device,
            )
        })
        .collect()
}

impl<B: Backend> SfcCaeDecoder<B> {
    /// Build the decoder from the shared plan.
    pub fn new(plan: Arc<ModelPlan>, device: &B::Device) -> Self {
        let config = &plan.config;

        let fc_sizes = &plan.layers.fc_sizes;
        let fcs = (0..fc_sizes.len() - 1)
            .rev()
            .map(|i| linear(fc_sizes[i + 1], fc_sizes[i], config.init_range, device))
            .collect();

        let deconvs = if config.share_conv_weights {
            BranchDeconvs::Shared(deconv_stack(&plan, device))
        } else {
            BranchDeconvs::PerBranch(
                (0..config.sfc_nums).map(|_| deconv_stack(&plan, device)).collect(),
            )
        };

        let smoothing = plan.neigh_table.as_ref().map(|table| {
            let layer_config = NearestNeighbouringConfig::new(
                plan.components_total,
                table.total(),
                table.num_with_self() * config.self_concat,
            );
            if config.share_sp_weights {
                BranchSmoothing::Shared(layer_config.init(device))
            } else {
                BranchSmoothing::PerBranch(
                    (0..config.sfc_nums).map(|_| layer_config.init(device)).collect(),
                )
            }
        });

        Self {
            fcs,
            deconvs,
            smoothing,
            plan: Ignored(plan),
        }
    }

    /// Working-length reconstruction of one branch, `[batch, comp, working]`.
    fn backward_branch(
        &self,
        slab: Tensor<B, 2>,
        branch: usize,
        reduce: ReduceStrategy,
    ) -> Tensor<B, 3> {
        let plan = &self.plan;
        let activation = plan.config.activation;
        let conv_sizes = &plan.layers.conv_sizes;

        let [snapshots, _] = slab.dims();
        let mut a = slab.reshape([
            snapshots,
            plan.layers.deepest_channels(),
            plan.layers.flatten_size,
        ]);

        let depth = conv_sizes.len() - 1;
        for (j, deconv) in self.deconvs.layers(branch).iter().enumerate() {
            let side = conv_sizes[depth - j];
            a = activation.apply(deconv.forward(a, side));
        }

        if let (Some(smoothing), Some(table)) = (&self.smoothing, plan.neigh_table.as_ref()) {
            // Folding self_concat back into the neighbourhood axis sums the
            // duplicated copies through the smoothing weights.
            let stacked = table.stack(a, plan.config.self_concat);
            a = activation.apply(smoothing.layer(branch).forward(stacked));
        } else if plan.config.self_concat > 1 {
            let [snapshots, channels, nodes] = a.dims();
            let folded = a
                .reshape([snapshots, plan.config.self_concat, plan.components_total, nodes]);
            a = folded.sum_dim(1).squeeze(1);
        }

        if let Some(mapping) = &plan.structuring {
            a = mapping.filling.contract(mapping.ordering.invert(a), reduce);
        }
        a
    }

    /// Decode latent vectors into per-snapshot fields, each `[comp, n_k]`.
    pub fn forward(&self, latent: Tensor<B, 2>, batch: &SnapshotBatch<B>) -> Vec<Tensor<B, 2>> {
        let plan = &self.plan;
        let activation = plan.config.activation;

        let mut x = latent;
        for fc in &self.fcs {
            x = activation.apply(fc.forward(x));
        }

        let slabs = if plan.config.sfc_nums > 1 {
            x.chunk(plan.config.sfc_nums, 1)
        } else {
            vec![x]
        };

        let branch_fields: Vec<Tensor<B, 3>> = slabs
            .into_iter()
            .enumerate()
            .map(|(branch, slab)| self.backward_branch(slab, branch, batch.reduce_strategy()))
            .collect();

        (0..batch.len())
            .map(|k| {
                let restored = |branch: usize| {
                    let curve = batch.curve_for_branch(branch);
                    let row = branch_fields[branch].clone().narrow(0, k, 1);
                    // Coordinate channels never leave the network.
                    let row = row.narrow(1, 0, plan.config.components);
                    batch.ordering(k, curve).invert(batch.restore(k, row))
                };
                let mut merged = restored(0);
                for branch in 1..branch_fields.len() {
                    merged = merged + restored(branch);
                }
                activation.apply(merged).squeeze(0)
            })
            .collect()
    }
}
