//! Multi-SFC convolutional autoencoder.
//!
//! Compresses physical-simulation fields on unstructured adaptive meshes by
//! linearizing each mesh with one or more space-filling curves, reconciling
//! per-snapshot node counts against a fixed working length, and running the
//! result through parallel convolutional branches into a shared latent
//! bottleneck. The decoder mirrors every step and merges the branch
//! reconstructions by summation.
//!
//! Entry point: [`SfcCaeConfig`] describes the whole model;
//! [`SfcCae::init`] builds both halves around a single immutable
//! [`ModelPlan`] shared by encoder and decoder. Per-batch mesh data travels
//! in a [`dataset::SnapshotBatch`].

pub mod autoencoder;
pub mod branch;
pub mod config;
pub mod dataset;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod losses;
pub mod neighbouring;
pub mod plan;

pub use autoencoder::{AutoencoderOutput, SfcCae};
pub use config::{Activation, SfcCaeConfig};
pub use dataset::{LengthAdapter, SnapshotBatch};
pub use decoder::SfcCaeDecoder;
pub use encoder::{EncoderOutput, SfcCaeEncoder};
pub use error::{ModelError, Result};
pub use plan::ModelPlan;
