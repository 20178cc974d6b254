//! Multi-SFC convolutional encoder.
//!
//! Each branch reorders the batch along its own space-filling curve, brings
//! every snapshot to the working length, optionally smooths with the
//! nearest-neighbouring layer, and runs the shared strided-convolution
//! stack down to a flat feature vector. Branch vectors are concatenated in
//! branch order and projected through fully-connected layers to the latent
//! vector; the variational variant splits the head into mean/log-sigma,
//! reparameterizes and reports the KL divergence alongside.

use std::sync::Arc;

use burn::module::Ignored;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::Distribution;

use crate::branch::{BranchConvs, BranchSmoothing, ConvBlock};
use crate::dataset::SnapshotBatch;
use crate::neighbouring::NearestNeighbouringConfig;
use crate::plan::ModelPlan;

/// Latent output, with the KL term when the bottleneck is variational.
#[derive(Debug, Clone)]
pub struct EncoderOutput<B: Backend> {
    /// `[batch, latent_dim]`
    pub latent: Tensor<B, 2>,
    /// Scalar KL divergence for the batch.
    pub kl: Option<Tensor<B, 1>>,
}

/// Encoder half of the autoencoder.
#[derive(Module, Debug)]
pub struct SfcCaeEncoder<B: Backend> {
    convs: BranchConvs<B>,
    smoothing: Option<BranchSmoothing<B>>,
    fcs: Vec<Linear<B>>,
    layer_mu: Option<Linear<B>>,
    layer_sigma: Option<Linear<B>>,
    plan: Ignored<Arc<ModelPlan>>,
}

pub(crate) fn linear<B: Backend>(
    d_input: usize,
    d_output: usize,
    init_range: Option<[f64; 2]>,
    device: &B::Device,
) -> Linear<B> {
    let mut config = LinearConfig::new(d_input, d_output);
    if let Some([min, max]) = init_range {
        config = config.with_initializer(Initializer::Uniform { min, max });
    }
    config.init(device)
}

fn conv_stack<B: Backend>(plan: &ModelPlan, device: &B::Device) -> Vec<ConvBlock<B>> {
    (0..plan.layers.num_conv_layers())
        .map(|j| {
            ConvBlock::new(
                plan.ndim,
                plan.layers.channels[j],
                plan.layers.channels[j + 1],
                &plan.conv,
                plan.config.init_range,
                device,
            )
        })
        .collect()
}

impl<B: Backend> SfcCaeEncoder<B> {
    /// Build the encoder from the shared plan.
    pub fn new(plan: Arc<ModelPlan>, device: &B::Device) -> Self {
        let config = &plan.config;

        let convs = if config.share_conv_weights {
            BranchConvs::Shared(conv_stack(&plan, device))
        } else {
            BranchConvs::PerBranch(
                (0..config.sfc_nums).map(|_| conv_stack(&plan, device)).collect(),
            )
        };

        let smoothing = plan.neigh_table.as_ref().map(|table| {
            let layer_config = NearestNeighbouringConfig::new(
                plan.input_channel,
                table.total(),
                table.num_with_self(),
            );
            if config.share_sp_weights {
                BranchSmoothing::Shared(layer_config.init(device))
            } else {
                BranchSmoothing::PerBranch(
                    (0..config.sfc_nums).map(|_| layer_config.init(device)).collect(),
                )
            }
        });

        let fc_sizes = &plan.layers.fc_sizes;
        let fc_pairs = if config.variational {
            fc_sizes.len().saturating_sub(2)
        } else {
            fc_sizes.len() - 1
        };
        let fcs = (0..fc_pairs)
            .map(|i| linear(fc_sizes[i], fc_sizes[i + 1], config.init_range, device))
            .collect();

        let (layer_mu, layer_sigma) = if config.variational {
            let d_in = fc_sizes[fc_sizes.len() - 2];
            let d_out = fc_sizes[fc_sizes.len() - 1];
            (
                Some(linear(d_in, d_out, config.init_range, device)),
                Some(linear(d_in, d_out, config.init_range, device)),
            )
        } else {
            (None, None)
        };

        Self {
            convs,
            smoothing,
            fcs,
            layer_mu,
            layer_sigma,
            plan: Ignored(plan),
        }
    }

    /// Flattened feature vector of one branch, `[batch, features]`.
    fn forward_branch(&self, batch: &SnapshotBatch<B>, branch: usize) -> Tensor<B, 2> {
        let plan = &self.plan;
        let activation = plan.config.activation;
        let curve = batch.curve_for_branch(branch);

        let rows: Vec<Tensor<B, 3>> = (0..batch.len())
            .map(|k| {
                let ordering = batch.ordering(k, curve);
                let mut row = batch.field(k).clone().unsqueeze::<3>();
                if let Some(coords) = batch.coords(k) {
                    row = Tensor::cat(vec![row, coords.clone().unsqueeze::<3>()], 1);
                }
                batch.expand(k, ordering.apply(row))
            })
            .collect();
        let mut a = Tensor::cat(rows, 0);

        if plan.config.self_concat > 1 {
            let copies = vec![a; plan.config.self_concat];
            a = Tensor::cat(copies, 1);
        }

        if let Some(mapping) = &plan.structuring {
            a = mapping.ordering.apply(mapping.filling.expand(a));
        }

        if let (Some(smoothing), Some(table)) = (&self.smoothing, plan.neigh_table.as_ref()) {
            let stacked = table.stack(a, 1);
            a = activation.apply(smoothing.layer(branch).forward(stacked));
        }

        let mut side = plan.layers.conv_sizes[0];
        for (j, conv) in self.convs.layers(branch).iter().enumerate() {
            a = activation.apply(conv.forward(a, side));
            side = plan.layers.conv_sizes[j + 1];
        }

        let [snapshots, channels, len] = a.dims();
        a.reshape([snapshots, channels * len])
    }

    /// Encode a batch into latent vectors.
    pub fn forward(&self, batch: &SnapshotBatch<B>) -> EncoderOutput<B> {
        let plan = &self.plan;
        let activation = plan.config.activation;

        let mut branch_features: Vec<Tensor<B, 2>> = (0..plan.config.sfc_nums)
            .map(|branch| self.forward_branch(batch, branch))
            .collect();
        let mut x = if branch_features.len() > 1 {
            Tensor::cat(branch_features, 1)
        } else {
            branch_features.remove(0)
        };

        for fc in &self.fcs {
            x = activation.apply(fc.forward(x));
        }

        match (&self.layer_mu, &self.layer_sigma) {
            (Some(layer_mu), Some(layer_sigma)) => {
                let mu = layer_mu.forward(x.clone());
                let sigma = layer_sigma.forward(x).exp();
                let sample =
                    Tensor::random(mu.shape(), Distribution::Normal(0.0, 1.0), &mu.device());
                let latent = mu.clone() + sigma.clone() * sample;

                let divisor =
                    (batch.len() * plan.working_size * plan.components_total) as f32;
                let kl = (sigma.clone().powf_scalar(2.0) + mu.powf_scalar(2.0)
                    - sigma.log().mul_scalar(2.0)
                    - 1.0)
                    .mul_scalar(0.5)
                    .sum()
                    .div_scalar(divisor);
                EncoderOutput {
                    latent,
                    kl: Some(kl),
                }
            }
            _ => EncoderOutput { latent: x, kl: None },
        }
    }
}
