//! Model configuration.
//!
//! Every option the encoder/decoder pair understands is an explicit named
//! field with a documented default; validation happens once, eagerly, when
//! the model is built.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Activation applied after every learned layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// Bounded activation, the default for fields scaled into `[-1, 1]`.
    Tanh,
    /// Unbounded activation, preferred for structured-grid variants.
    Relu,
}

impl Activation {
    /// Apply the activation elementwise.
    pub fn apply<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Tanh => burn::tensor::activation::tanh(input),
            Activation::Relu => burn::tensor::activation::relu(input),
        }
    }
}

/// Configuration for the multi-SFC convolutional autoencoder.
#[derive(Config, Debug)]
pub struct SfcCaeConfig {
    /// Nominal node count the network is built for. Snapshots with a
    /// different node count are reconciled by a length adapter in the batch.
    pub input_size: usize,
    /// Number of physical field components (channels).
    pub components: usize,
    /// Latent bottleneck width.
    pub latent_dim: usize,
    /// Number of parallel SFC branches.
    #[config(default = "2")]
    pub sfc_nums: usize,
    /// Coordinate dimension of the mesh; selects the 1D convolution
    /// defaults (kernel 32 / stride 4 for 2D meshes, 176 / 8 for 3D).
    #[config(default = "2")]
    pub dimension: usize,
    /// Channel-duplication factor feeding the nearest-neighbouring layer
    /// extra independent weight sets.
    #[config(default = "1")]
    pub self_concat: usize,
    /// Whether the learned nearest-neighbouring smoothing layer is used.
    #[config(default = "true")]
    pub nearest_neighbouring: bool,
    /// Variational bottleneck (reparameterized sampling plus KL term).
    #[config(default = "false")]
    pub variational: bool,
    /// Share convolution weights across branches.
    #[config(default = "true")]
    pub share_conv_weights: bool,
    /// Share nearest-neighbouring weights across branches.
    #[config(default = "true")]
    pub share_sp_weights: bool,
    /// Activation for every learned layer.
    #[config(default = "Activation::Tanh")]
    pub activation: Activation,
    /// Channel ceiling for the convolutional stack.
    #[config(default = "16")]
    pub num_final_channels: usize,
    /// Offset range for N-D neighbourhoods on the structured grid.
    #[config(default = "1")]
    pub neighbour_range: usize,
    /// Use only axis-aligned ±1 neighbours on the structured grid.
    #[config(default = "false")]
    pub direct_neighbours: bool,
    /// Number of coordinate channels appended to the fields, if any.
    pub coords_dim: Option<usize>,
    /// Resample every snapshot to this length with linear interpolation
    /// instead of backward-forward filling; becomes the working size.
    pub interpolate_to: Option<usize>,
    /// Secondary SFC mapping the working sequence onto an N-D regular grid
    /// (`dimension` axes). Length must be a perfect `dimension`-th power no
    /// smaller than the working size.
    pub structuring_sfc: Option<Vec<usize>>,
    /// Override for the convolution kernel size.
    pub kernel_size: Option<usize>,
    /// Override for the convolution stride.
    pub stride: Option<usize>,
    /// Override for the convolution padding.
    pub padding: Option<usize>,
    /// Override for the channel growth factor between layers.
    pub increase_multi: Option<usize>,
    /// Uniform `[min, max]` range to force-initialize layer weights with.
    pub init_range: Option<[f64; 2]>,
}

impl SfcCaeConfig {
    /// Validate the configuration eagerly.
    pub fn validate(&self) -> std::result::Result<(), ModelError> {
        if self.input_size < 2 {
            return Err(ModelError::config("input size must be at least 2 nodes"));
        }
        if self.components == 0 {
            return Err(ModelError::config("at least one field component is required"));
        }
        if self.latent_dim == 0 {
            return Err(ModelError::config("latent dimension must be positive"));
        }
        if self.sfc_nums == 0 {
            return Err(ModelError::config("at least one SFC branch is required"));
        }
        if self.self_concat == 0 {
            return Err(ModelError::config("self_concat must be at least 1"));
        }
        if !(2..=3).contains(&self.dimension) {
            return Err(ModelError::config(format!(
                "mesh dimension must be 2 or 3, got {}",
                self.dimension
            )));
        }
        if let Some(coords) = self.coords_dim {
            if coords == 0 || coords > 3 {
                return Err(ModelError::config(format!(
                    "coordinate dimension must be 1..=3, got {coords}"
                )));
            }
        }
        if let Some(n) = self.interpolate_to {
            if n < 2 {
                return Err(ModelError::config(
                    "interpolation target must be at least 2 samples",
                ));
            }
        }
        if let Some([min, max]) = self.init_range {
            if min >= max {
                return Err(ModelError::config(format!(
                    "weight init range is empty: [{min}, {max}]"
                )));
            }
        }
        if let Some(k) = self.kernel_size {
            if k == 0 {
                return Err(ModelError::config("kernel size must be positive"));
            }
        }
        if let Some(s) = self.stride {
            if s == 0 {
                return Err(ModelError::config("stride must be positive"));
            }
        }
        Ok(())
    }

    /// Working sequence length per branch.
    pub fn working_size(&self) -> usize {
        self.interpolate_to.unwrap_or(self.input_size)
    }

    /// Field channels plus appended coordinate channels.
    pub fn components_total(&self) -> usize {
        self.components + self.coords_dim.unwrap_or(0)
    }
}
