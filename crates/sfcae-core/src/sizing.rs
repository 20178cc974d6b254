//! Layer-size planning for the convolutional stack.
//!
//! Given the working input size and the convolution hyperparameters, derive
//! how many strided convolutions to apply, the channel count of each, the
//! fully-connected widths down to the latent dimension, and the output
//! paddings the decoder's transposed convolutions need to reproduce every
//! spatial size exactly on the way back up.
//!
//! The conv stack keeps shrinking while `size^ndim * channels * branches`
//! exceeds a fixed memory-guard threshold; the FC widths then decay
//! geometrically by the stride until the latent dimension is near.

use crate::error::{CoreError, Result};

/// Flattened-feature budget above which another conv layer is added.
const FC_BUDGET: usize = 4000;

/// Inputs to the sizing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingParams {
    /// Working spatial size per grid axis (nodes for 1D).
    pub input_size: usize,
    /// Convolution kernel size, shared by every layer.
    pub kernel_size: usize,
    /// Convolution padding, shared by every layer.
    pub padding: usize,
    /// Convolution stride, shared by every layer.
    pub stride: usize,
    /// Latent bottleneck width.
    pub latent_dim: usize,
    /// Number of parallel SFC branches.
    pub num_branches: usize,
    /// Channels entering the first convolution.
    pub input_channels: usize,
    /// Channel multiplier between consecutive layers.
    pub channel_growth: usize,
    /// Channel ceiling.
    pub max_channels: usize,
    /// Spatial dimensionality of the convolutions (1 for plain SFC order).
    pub ndim: usize,
}

/// The shared shape plan consumed by both encoder and decoder.
///
/// `conv_sizes[0]` is the working input size and `channels[0]` the input
/// channel count; entry `i + 1` of each describes the output of conv layer
/// `i`. `fc_sizes` runs from the flattened multi-branch width down to the
/// latent dimension. `output_paddings` is listed in decoder order (deepest
/// transposed convolution first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerPlan {
    pub conv_sizes: Vec<usize>,
    pub channels: Vec<usize>,
    pub fc_sizes: Vec<usize>,
    pub output_paddings: Vec<usize>,
    /// Per-branch flattened spatial size after the last conv
    /// (`conv_sizes.last() ^ ndim`).
    pub flatten_size: usize,
}

impl LayerPlan {
    /// Run the sizing algorithm.
    pub fn build(params: &SizingParams) -> Result<Self> {
        params.validate()?;
        let SizingParams {
            kernel_size: kernel,
            padding,
            stride,
            ndim,
            ..
        } = *params;

        let shrink = |size: usize| -> Result<usize> {
            let padded = size + 2 * padding;
            if padded < kernel {
                return Err(CoreError::config(format!(
                    "kernel {kernel} exceeds padded size {padded}"
                )));
            }
            Ok((padded - kernel) / stride + 1)
        };
        let out_pad = |size: usize| (size + 2 * padding - kernel) % stride;

        let mut size = params.input_size;
        let mut conv_sizes = vec![size];
        let mut channels = vec![params.input_channels];
        let mut output_paddings = vec![out_pad(size)];
        let mut grown = params.input_channels;

        while size.pow(ndim as u32) * channels.last().unwrap() * params.num_branches > FC_BUDGET {
            let next = shrink(size)?;
            if next >= size || next == 0 {
                return Err(CoreError::config(format!(
                    "convolution (kernel {kernel}, stride {stride}, padding {padding}) \
                     does not shrink size {size}"
                )));
            }
            size = next;
            conv_sizes.push(size);
            if params.max_channels >= grown * params.channel_growth {
                grown *= params.channel_growth;
                channels.push(grown);
            } else {
                channels.push(params.max_channels);
            }
            output_paddings.push(out_pad(size));
        }

        let flatten_size = size.pow(ndim as u32);
        let mut fc_width = flatten_size * params.num_branches * channels.last().unwrap();
        let mut fc_sizes = vec![fc_width];
        let fc_stride = if stride < 4 { 8 } else { stride };
        let decay = (fc_stride as f64).powf(1.5);
        while (fc_width as f64 / decay).floor() > params.latent_dim as f64 {
            fc_width /= fc_stride;
            if fc_width * fc_stride < 100 && fc_width < 50 {
                break;
            }
            fc_sizes.push(fc_width);
        }
        fc_sizes.push(params.latent_dim);

        // Decoder order: deepest transposed convolution first. The padding
        // recorded for the deepest conv output itself is never consumed.
        output_paddings.reverse();
        output_paddings.remove(0);

        Ok(Self {
            conv_sizes,
            channels,
            fc_sizes,
            output_paddings,
            flatten_size,
        })
    }

    /// Number of convolution layers in the stack.
    pub fn num_conv_layers(&self) -> usize {
        self.channels.len() - 1
    }

    /// Spatial size produced by the deepest convolution.
    pub fn deepest_size(&self) -> usize {
        *self.conv_sizes.last().unwrap()
    }

    /// Channel count produced by the deepest convolution.
    pub fn deepest_channels(&self) -> usize {
        *self.channels.last().unwrap()
    }

    /// Flattened width entering the first fully-connected layer.
    pub fn fc_entry(&self) -> usize {
        self.fc_sizes[0]
    }

    /// Latent width.
    pub fn latent_dim(&self) -> usize {
        *self.fc_sizes.last().unwrap()
    }
}

impl SizingParams {
    fn validate(&self) -> Result<()> {
        if self.input_size < 2 {
            return Err(CoreError::config("input size must be at least 2"));
        }
        if self.latent_dim == 0 {
            return Err(CoreError::config("latent dimension must be positive"));
        }
        if self.num_branches == 0 {
            return Err(CoreError::config("at least one SFC branch is required"));
        }
        if self.input_channels == 0 {
            return Err(CoreError::config("input channel count must be positive"));
        }
        if self.stride == 0 || self.kernel_size == 0 {
            return Err(CoreError::config("kernel size and stride must be positive"));
        }
        if self.kernel_size < self.stride {
            return Err(CoreError::config(format!(
                "kernel size {} must be at least the stride {}",
                self.kernel_size, self.stride
            )));
        }
        if self.channel_growth == 0 || self.max_channels == 0 {
            return Err(CoreError::config("channel growth and ceiling must be positive"));
        }
        if self.ndim == 0 || self.ndim > 3 {
            return Err(CoreError::config("convolution dimensionality must be 1, 2 or 3"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_1d(input_size: usize, latent_dim: usize) -> SizingParams {
        SizingParams {
            input_size,
            kernel_size: 32,
            padding: 16,
            stride: 4,
            latent_dim,
            num_branches: 2,
            input_channels: 2,
            channel_growth: 2,
            max_channels: 16,
            ndim: 1,
        }
    }

    #[test]
    fn test_plan_shapes_consistent() {
        let plan = LayerPlan::build(&params_1d(2000, 16)).unwrap();
        assert_eq!(plan.conv_sizes.len(), plan.channels.len());
        assert_eq!(plan.output_paddings.len(), plan.num_conv_layers());
        assert_eq!(plan.conv_sizes, vec![2000, 501, 126]);
        assert_eq!(plan.channels, vec![2, 4, 8]);
        // FC entry reflects the channels actually reached, not the ceiling.
        assert_eq!(plan.fc_entry(), 126 * 2 * 8);
        assert_eq!(plan.latent_dim(), 16);
    }

    #[test]
    fn test_small_input_yields_no_conv_layers() {
        let mut params = params_1d(64, 2);
        params.num_branches = 1;
        params.input_channels = 1;
        let plan = LayerPlan::build(&params).unwrap();
        assert_eq!(plan.num_conv_layers(), 0);
        assert_eq!(plan.fc_sizes, vec![64, 2]);
        assert!(plan.output_paddings.is_empty());
    }

    #[test]
    fn test_output_paddings_invert_conv_sizes() {
        for (kernel, stride, padding) in [(32, 4, 16), (176, 8, 88), (5, 2, 2), (9, 3, 4)] {
            let params = SizingParams {
                input_size: 3000,
                kernel_size: kernel,
                padding,
                stride,
                latent_dim: 8,
                num_branches: 1,
                input_channels: 4,
                channel_growth: 2,
                max_channels: 32,
                ndim: 1,
            };
            let plan = LayerPlan::build(&params).unwrap();
            assert!(plan.num_conv_layers() >= 1, "kernel {kernel} produced no layers");

            // Walk the transposed stack from the deepest size back up.
            let mut size = plan.deepest_size();
            for (step, &out_pad) in plan.output_paddings.iter().enumerate() {
                size = (size - 1) * stride + kernel - 2 * padding + out_pad;
                let expected = plan.conv_sizes[plan.num_conv_layers() - 1 - step];
                assert_eq!(size, expected, "kernel {kernel} step {step}");
            }
            assert_eq!(size, params.input_size);
        }
    }

    #[test]
    fn test_fc_widths_descend_to_latent() {
        let plan = LayerPlan::build(&params_1d(4000, 4)).unwrap();
        for pair in plan.fc_sizes.windows(2) {
            assert!(pair[0] > pair[1], "fc widths must strictly descend: {:?}", plan.fc_sizes);
        }
        assert_eq!(plan.latent_dim(), 4);
    }

    #[test]
    fn test_rejects_even_smaller_kernel_than_stride() {
        let mut params = params_1d(2000, 16);
        params.kernel_size = 3;
        params.stride = 4;
        assert!(LayerPlan::build(&params).is_err());
    }
}
