//! Framework-level building blocks for space-filling-curve convolutional
//! autoencoders.
//!
//! A space-filling curve (SFC) linearizes an unstructured simulation mesh
//! into a 1D ordering that preserves spatial locality, which lets ordinary
//! strided convolutions operate on mesh fields. This crate holds the
//! deterministic, weight-free machinery that makes that possible:
//!
//! - [`ordering`] - permutation/inverse-permutation application on tensors
//! - [`neighbourhood`] - flattened gather-index tables for N-D neighbour
//!   aggregation with boundary clamping
//! - [`filling`] - boustrophedon length expansion/contraction between a
//!   mesh's node count and a fixed working length
//! - [`interpolate`] - linear-interpolation length adaptation with optional
//!   4-point back-mapping
//! - [`sizing`] - the layer-size plan shared by encoder and decoder
//! - [`scaling`] - channel-wise bounded affine normalization
//!
//! Everything here is constructed once per dataset/model configuration and
//! immutable afterwards; the learned layers live in `sfcae-model`.

pub mod error;
pub mod filling;
pub mod interpolate;
pub mod neighbourhood;
pub mod ordering;
pub mod scaling;
pub mod sizing;

pub use error::{CoreError, Result};
pub use filling::{BackwardForwardConnecting, ReduceStrategy};
pub use interpolate::InterpolationWeights;
pub use neighbourhood::{offset_keys, NeighbourTable, OffsetScheme};
pub use ordering::SfcOrdering;
pub use scaling::ChannelScaler;
pub use sizing::{LayerPlan, SizingParams};
