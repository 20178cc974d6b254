//! The shared model plan.
//!
//! Encoder and decoder consult one immutable plan built once from the
//! configuration: the convolution hyperparameters, the layer-size plan, the
//! neighbourhood table, and the optional secondary structuring SFC. Sharing
//! one object removes any chance of the two halves drifting apart.

use std::sync::Arc;

use sfcae_core::{
    offset_keys, BackwardForwardConnecting, LayerPlan, NeighbourTable, OffsetScheme, SfcOrdering,
    SizingParams,
};

use crate::config::SfcCaeConfig;
use crate::error::{ModelError, Result};

/// Shared convolution hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvSpec {
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub increase_multi: usize,
}

/// Secondary SFC mapping the working sequence onto a regular N-D grid.
#[derive(Debug, Clone)]
pub struct StructuredMapping {
    /// Permutation from filled sequence order to grid order.
    pub ordering: SfcOrdering,
    /// Length adapter from the working size to the grid's node count.
    pub filling: BackwardForwardConnecting,
    /// Grid side length per axis.
    pub side: usize,
    /// Total grid node count (`side ^ ndim`).
    pub total: usize,
}

/// Everything shape-related that encoder and decoder agree on.
#[derive(Debug)]
pub struct ModelPlan {
    pub config: SfcCaeConfig,
    /// Sequence length every branch works at after length adaptation.
    pub working_size: usize,
    /// Field channels plus coordinate channels.
    pub components_total: usize,
    /// Channels entering the first convolution
    /// (`components_total * self_concat`).
    pub input_channel: usize,
    /// Convolution dimensionality: 1, or the grid dimension when structured.
    pub ndim: usize,
    pub conv: ConvSpec,
    pub layers: LayerPlan,
    pub structuring: Option<StructuredMapping>,
    /// Gather table for the nearest-neighbouring layers, over the structured
    /// grid when one is configured, else a ±1 window on the working length.
    pub neigh_table: Option<NeighbourTable>,
}

impl ModelPlan {
    /// Build the plan, validating the configuration eagerly.
    pub fn build(config: SfcCaeConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let working_size = config.working_size();
        let components_total = config.components_total();
        let input_channel = components_total * config.self_concat;

        let structuring = match &config.structuring_sfc {
            None => None,
            Some(perm) => {
                let total = perm.len();
                let side = (total as f64)
                    .powf(1.0 / config.dimension as f64)
                    .round() as usize;
                if side.pow(config.dimension as u32) != total {
                    return Err(ModelError::config(format!(
                        "structuring SFC length {total} is not a {}-dimensional cube",
                        config.dimension
                    )));
                }
                if total < working_size {
                    return Err(ModelError::config(format!(
                        "structuring grid ({total} nodes) is smaller than the \
                         working size ({working_size})"
                    )));
                }
                Some(StructuredMapping {
                    ordering: SfcOrdering::new(perm.clone())?,
                    filling: BackwardForwardConnecting::new(working_size, total)?,
                    side,
                    total,
                })
            }
        };

        // Defaults follow the mesh dimension for the plain 1D path and a
        // small isotropic kernel on structured grids; any explicit override
        // wins.
        let defaults = match (&structuring, config.dimension) {
            (Some(_), _) => ConvSpec {
                kernel_size: 5,
                stride: 2,
                padding: 2,
                increase_multi: 4,
            },
            (None, 3) => ConvSpec {
                kernel_size: 176,
                stride: 8,
                padding: 88,
                increase_multi: 4,
            },
            (None, _) => ConvSpec {
                kernel_size: 32,
                stride: 4,
                padding: 16,
                increase_multi: 2,
            },
        };
        let kernel_size = config.kernel_size.unwrap_or(defaults.kernel_size);
        let conv = ConvSpec {
            kernel_size,
            stride: config.stride.unwrap_or(defaults.stride),
            padding: config.padding.unwrap_or(kernel_size / 2),
            increase_multi: config.increase_multi.unwrap_or(defaults.increase_multi),
        };

        let (ndim, sizing_input) = match &structuring {
            Some(mapping) => (config.dimension, mapping.side),
            None => (1, working_size),
        };

        let layers = LayerPlan::build(&SizingParams {
            input_size: sizing_input,
            kernel_size: conv.kernel_size,
            padding: conv.padding,
            stride: conv.stride,
            latent_dim: config.latent_dim,
            num_branches: config.sfc_nums,
            input_channels: input_channel,
            channel_growth: conv.increase_multi,
            max_channels: config.num_final_channels,
            ndim,
        })?;

        let neigh_table = if config.nearest_neighbouring {
            Some(match &structuring {
                Some(mapping) => {
                    let scheme = if config.direct_neighbours {
                        OffsetScheme::Direct
                    } else {
                        OffsetScheme::Full {
                            range: config.neighbour_range,
                        }
                    };
                    let offsets = offset_keys(config.dimension, scheme);
                    NeighbourTable::build(&vec![mapping.side; config.dimension], &offsets)?
                }
                None => NeighbourTable::line(working_size)?,
            })
        } else {
            None
        };

        Ok(Arc::new(Self {
            config,
            working_size,
            components_total,
            input_channel,
            ndim,
            conv,
            layers,
            structuring,
            neigh_table,
        }))
    }

    /// Sequence length entering the convolutional stack
    /// (grid total when structured, else the working size).
    pub fn conv_entry_len(&self) -> usize {
        match &self.structuring {
            Some(mapping) => mapping.total,
            None => self.working_size,
        }
    }

    /// Flattened per-branch feature width after the last convolution.
    pub fn branch_feature_len(&self) -> usize {
        self.layers.flatten_size * self.layers.deepest_channels()
    }

    /// Neighbourhood size (including self) seen by the smoothing layers.
    pub fn num_with_self(&self) -> usize {
        self.neigh_table
            .as_ref()
            .map(|t| t.num_with_self())
            .unwrap_or(0)
    }
}
