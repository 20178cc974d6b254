//! Branch building blocks: dimension-generic convolutions and the tagged
//! weight-sharing wrappers.
//!
//! The autoencoder always moves data as `[batch, channels, len]`; when a
//! structuring SFC maps the sequence onto an N-D grid the conv blocks
//! reshape to the grid internally and flatten back afterwards, so encoder
//! and decoder never branch on dimensionality themselves.
//!
//! Weight sharing across SFC branches is a tagged choice, consulted
//! uniformly by both halves: either one layer stack serves every branch or
//! each branch owns its own.

use burn::nn::conv::{
    Conv1d, Conv1dConfig, Conv2d, Conv2dConfig, Conv3d, Conv3dConfig, ConvTranspose1d,
    ConvTranspose1dConfig, ConvTranspose2d, ConvTranspose2dConfig, ConvTranspose3d,
    ConvTranspose3dConfig,
};
use burn::nn::{Initializer, PaddingConfig1d, PaddingConfig2d, PaddingConfig3d};
use burn::prelude::*;

use crate::neighbouring::NearestNeighbouring;
use crate::plan::ConvSpec;

fn uniform(range: Option<[f64; 2]>) -> Option<Initializer> {
    range.map(|[min, max]| Initializer::Uniform { min, max })
}

/// One strided convolution, 1D to 3D, operating on flattened sequences.
#[derive(Module, Debug)]
pub enum ConvBlock<B: Backend> {
    Line(Conv1d<B>),
    Plane(Conv2d<B>),
    Volume(Conv3d<B>),
}

impl<B: Backend> ConvBlock<B> {
    /// Build a block of the given dimensionality.
    pub fn new(
        ndim: usize,
        in_channels: usize,
        out_channels: usize,
        spec: &ConvSpec,
        init_range: Option<[f64; 2]>,
        device: &B::Device,
    ) -> Self {
        let k = spec.kernel_size;
        match ndim {
            1 => {
                let mut config = Conv1dConfig::new(in_channels, out_channels, k)
                    .with_stride(spec.stride)
                    .with_padding(PaddingConfig1d::Explicit(spec.padding));
                if let Some(init) = uniform(init_range) {
                    config = config.with_initializer(init);
                }
                ConvBlock::Line(config.init(device))
            }
            2 => {
                let mut config = Conv2dConfig::new([in_channels, out_channels], [k, k])
                    .with_stride([spec.stride, spec.stride])
                    .with_padding(PaddingConfig2d::Explicit(spec.padding, spec.padding));
                if let Some(init) = uniform(init_range) {
                    config = config.with_initializer(init);
                }
                ConvBlock::Plane(config.init(device))
            }
            _ => {
                let mut config = Conv3dConfig::new([in_channels, out_channels], [k, k, k])
                    .with_stride([spec.stride; 3])
                    .with_padding(PaddingConfig3d::Explicit(
                        spec.padding,
                        spec.padding,
                        spec.padding,
                    ));
                if let Some(init) = uniform(init_range) {
                    config = config.with_initializer(init);
                }
                ConvBlock::Volume(config.init(device))
            }
        }
    }

    /// Apply the convolution to `[batch, channels, side ^ ndim]`.
    pub fn forward(&self, input: Tensor<B, 3>, side: usize) -> Tensor<B, 3> {
        match self {
            ConvBlock::Line(conv) => conv.forward(input),
            ConvBlock::Plane(conv) => {
                let [batch, channels, _] = input.dims();
                let grid = input.reshape([batch, channels, side, side]);
                let out = conv.forward(grid);
                let [batch, channels, h, w] = out.dims();
                out.reshape([batch, channels, h * w])
            }
            ConvBlock::Volume(conv) => {
                let [batch, channels, _] = input.dims();
                let grid = input.reshape([batch, channels, side, side, side]);
                let out = conv.forward(grid);
                let [batch, channels, d, h, w] = out.dims();
                out.reshape([batch, channels, d * h * w])
            }
        }
    }
}

/// One transposed convolution mirroring a [`ConvBlock`].
#[derive(Module, Debug)]
pub enum DeconvBlock<B: Backend> {
    Line(ConvTranspose1d<B>),
    Plane(ConvTranspose2d<B>),
    Volume(ConvTranspose3d<B>),
}

impl<B: Backend> DeconvBlock<B> {
    /// Build a block; `output_padding` comes from the layer plan and makes
    /// the spatial size inversion exact.
    pub fn new(
        ndim: usize,
        in_channels: usize,
        out_channels: usize,
        spec: &ConvSpec,
        output_padding: usize,
        init_range: Option<[f64; 2]>,
        device: &B::Device,
    ) -> Self {
        let k = spec.kernel_size;
        match ndim {
            1 => {
                let mut config = ConvTranspose1dConfig::new([in_channels, out_channels], k)
                    .with_stride(spec.stride)
                    .with_padding(spec.padding)
                    .with_padding_out(output_padding);
                if let Some(init) = uniform(init_range) {
                    config = config.with_initializer(init);
                }
                DeconvBlock::Line(config.init(device))
            }
            2 => {
                let mut config = ConvTranspose2dConfig::new([in_channels, out_channels], [k, k])
                    .with_stride([spec.stride; 2])
                    .with_padding([spec.padding; 2])
                    .with_padding_out([output_padding; 2]);
                if let Some(init) = uniform(init_range) {
                    config = config.with_initializer(init);
                }
                DeconvBlock::Plane(config.init(device))
            }
            _ => {
                let mut config =
                    ConvTranspose3dConfig::new([in_channels, out_channels], [k, k, k])
                        .with_stride([spec.stride; 3])
                        .with_padding([spec.padding; 3])
                        .with_padding_out([output_padding; 3]);
                if let Some(init) = uniform(init_range) {
                    config = config.with_initializer(init);
                }
                DeconvBlock::Volume(config.init(device))
            }
        }
    }

    /// Apply the transposed convolution to `[batch, channels, side ^ ndim]`.
    pub fn forward(&self, input: Tensor<B, 3>, side: usize) -> Tensor<B, 3> {
        match self {
            DeconvBlock::Line(conv) => conv.forward(input),
            DeconvBlock::Plane(conv) => {
                let [batch, channels, _] = input.dims();
                let grid = input.reshape([batch, channels, side, side]);
                let out = conv.forward(grid);
                let [batch, channels, h, w] = out.dims();
                out.reshape([batch, channels, h * w])
            }
            DeconvBlock::Volume(conv) => {
                let [batch, channels, _] = input.dims();
                let grid = input.reshape([batch, channels, side, side, side]);
                let out = conv.forward(grid);
                let [batch, channels, d, h, w] = out.dims();
                out.reshape([batch, channels, d * h * w])
            }
        }
    }
}

/// Convolution stacks, either shared across branches or owned per branch.
#[derive(Module, Debug)]
pub enum BranchConvs<B: Backend> {
    Shared(Vec<ConvBlock<B>>),
    PerBranch(Vec<Vec<ConvBlock<B>>>),
}

impl<B: Backend> BranchConvs<B> {
    /// The layer stack serving the given branch.
    pub fn layers(&self, branch: usize) -> &[ConvBlock<B>] {
        match self {
            BranchConvs::Shared(stack) => stack,
            BranchConvs::PerBranch(stacks) => &stacks[branch],
        }
    }
}

/// Transposed-convolution stacks with the same sharing choice.
#[derive(Module, Debug)]
pub enum BranchDeconvs<B: Backend> {
    Shared(Vec<DeconvBlock<B>>),
    PerBranch(Vec<Vec<DeconvBlock<B>>>),
}

impl<B: Backend> BranchDeconvs<B> {
    /// The layer stack serving the given branch.
    pub fn layers(&self, branch: usize) -> &[DeconvBlock<B>] {
        match self {
            BranchDeconvs::Shared(stack) => stack,
            BranchDeconvs::PerBranch(stacks) => &stacks[branch],
        }
    }
}

/// Nearest-neighbouring layers with the same sharing choice.
#[derive(Module, Debug)]
pub enum BranchSmoothing<B: Backend> {
    Shared(NearestNeighbouring<B>),
    PerBranch(Vec<NearestNeighbouring<B>>),
}

impl<B: Backend> BranchSmoothing<B> {
    /// The smoothing layer serving the given branch.
    pub fn layer(&self, branch: usize) -> &NearestNeighbouring<B> {
        match self {
            BranchSmoothing::Shared(layer) => layer,
            BranchSmoothing::PerBranch(layers) => &layers[branch],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn spec() -> ConvSpec {
        ConvSpec {
            kernel_size: 5,
            stride: 2,
            padding: 2,
            increase_multi: 2,
        }
    }

    #[test]
    fn test_conv_block_1d_shape() {
        let device = Default::default();
        let block = ConvBlock::<TestBackend>::new(1, 2, 4, &spec(), None, &device);
        let x = Tensor::random([3, 2, 20], burn::tensor::Distribution::Default, &device);
        let out = block.forward(x, 20);
        // (20 + 4 - 5) / 2 + 1 = 10
        assert_eq!(out.dims(), [3, 4, 10]);
    }

    #[test]
    fn test_conv_block_2d_flattens_grid() {
        let device = Default::default();
        let block = ConvBlock::<TestBackend>::new(2, 1, 3, &spec(), None, &device);
        let x = Tensor::random([2, 1, 64], burn::tensor::Distribution::Default, &device);
        let out = block.forward(x, 8);
        // (8 + 4 - 5) / 2 + 1 = 4 per axis
        assert_eq!(out.dims(), [2, 3, 16]);
    }

    #[test]
    fn test_deconv_inverts_conv_shape() {
        let device = Default::default();
        let spec = spec();
        let conv = ConvBlock::<TestBackend>::new(1, 1, 1, &spec, None, &device);
        let x = Tensor::random([1, 1, 21], burn::tensor::Distribution::Default, &device);
        let down = conv.forward(x, 21);
        let down_len = down.dims()[2];

        let output_padding = (21 + 2 * spec.padding - spec.kernel_size) % spec.stride;
        let deconv =
            DeconvBlock::<TestBackend>::new(1, 1, 1, &spec, output_padding, None, &device);
        let up = deconv.forward(down, down_len);
        assert_eq!(up.dims(), [1, 1, 21]);
    }

    #[test]
    fn test_branch_sharing_lookup() {
        let device = Default::default();
        let shared = BranchConvs::Shared(vec![ConvBlock::<TestBackend>::new(
            1, 1, 1, &spec(), None, &device,
        )]);
        assert_eq!(shared.layers(0).len(), shared.layers(3).len());

        let per_branch = BranchConvs::PerBranch(vec![
            vec![ConvBlock::<TestBackend>::new(1, 1, 2, &spec(), None, &device)],
            vec![ConvBlock::<TestBackend>::new(1, 1, 2, &spec(), None, &device)],
        ]);
        assert_eq!(per_branch.layers(1).len(), 1);
    }
}
