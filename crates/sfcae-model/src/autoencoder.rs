//! The assembled autoencoder.

use std::sync::Arc;

use burn::module::Ignored;
use burn::prelude::*;

use crate::config::SfcCaeConfig;
use crate::dataset::SnapshotBatch;
use crate::decoder::SfcCaeDecoder;
use crate::encoder::SfcCaeEncoder;
use crate::error::Result;
use crate::losses;
use crate::plan::ModelPlan;

/// Full forward-pass result.
#[derive(Debug, Clone)]
pub struct AutoencoderOutput<B: Backend> {
    /// One reconstruction per snapshot, `[components, n_k]`.
    pub reconstructions: Vec<Tensor<B, 2>>,
    /// `[batch, latent_dim]`
    pub latent: Tensor<B, 2>,
    /// KL divergence when the bottleneck is variational.
    pub kl: Option<Tensor<B, 1>>,
}

/// Space-filling-curve convolutional autoencoder.
#[derive(Module, Debug)]
pub struct SfcCae<B: Backend> {
    encoder: SfcCaeEncoder<B>,
    decoder: SfcCaeDecoder<B>,
    plan: Ignored<Arc<ModelPlan>>,
}

impl<B: Backend> SfcCae<B> {
    /// Validate the configuration and build both halves around one plan.
    pub fn init(config: SfcCaeConfig, device: &B::Device) -> Result<Self> {
        let plan = ModelPlan::build(config)?;
        tracing::info!(
            working_size = plan.working_size,
            conv_layers = plan.layers.num_conv_layers(),
            fc_sizes = ?plan.layers.fc_sizes,
            "built autoencoder plan"
        );
        Ok(Self {
            encoder: SfcCaeEncoder::new(plan.clone(), device),
            decoder: SfcCaeDecoder::new(plan.clone(), device),
            plan: Ignored(plan),
        })
    }

    /// The shared shape plan.
    pub fn plan(&self) -> &Arc<ModelPlan> {
        &self.plan
    }

    pub fn encoder(&self) -> &SfcCaeEncoder<B> {
        &self.encoder
    }

    pub fn decoder(&self) -> &SfcCaeDecoder<B> {
        &self.decoder
    }

    /// Encode and decode a batch.
    pub fn forward(&self, batch: &SnapshotBatch<B>) -> AutoencoderOutput<B> {
        let encoded = self.encoder.forward(batch);
        let reconstructions = self.decoder.forward(encoded.latent.clone(), batch);
        AutoencoderOutput {
            reconstructions,
            latent: encoded.latent,
            kl: encoded.kl,
        }
    }

    /// Training loss: mean squared reconstruction error averaged over the
    /// batch, plus the KL term when present.
    pub fn loss(&self, batch: &SnapshotBatch<B>, output: &AutoencoderOutput<B>) -> Tensor<B, 1> {
        let mut total: Option<Tensor<B, 1>> = None;
        for (k, reconstruction) in output.reconstructions.iter().enumerate() {
            let term = losses::mse(reconstruction.clone(), batch.field(k).clone());
            total = Some(match total {
                Some(acc) => acc + term,
                None => term,
            });
        }
        let mut loss = match total {
            Some(sum) => sum.div_scalar(output.reconstructions.len() as f32),
            None => Tensor::zeros([1], &output.latent.device()),
        };
        if let Some(kl) = &output.kl {
            loss = loss + kl.clone();
        }
        loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use sfcae_core::SfcOrdering;

    type TestBackend = NdArray<f32>;

    fn batch(snapshots: usize, nodes: usize) -> SnapshotBatch<TestBackend> {
        let device = Default::default();
        let fields = (0..snapshots)
            .map(|s| {
                let values: Vec<f32> =
                    (0..nodes).map(|i| ((i + s) as f32 * 0.1).sin()).collect();
                Tensor::<TestBackend, 1>::from_floats(values.as_slice(), &device).unsqueeze::<2>()
            })
            .collect();
        let orderings = (0..snapshots)
            .map(|_| vec![SfcOrdering::new((0..nodes).collect()).unwrap()])
            .collect();
        SnapshotBatch::new(fields, orderings).unwrap()
    }

    #[test]
    fn test_forward_and_loss_finite() {
        let device = Default::default();
        let model =
            SfcCae::<TestBackend>::init(SfcCaeConfig::new(64, 1, 2).with_sfc_nums(1), &device)
                .unwrap();
        let b = batch(4, 64);
        let output = model.forward(&b);
        assert_eq!(output.reconstructions.len(), 4);
        assert_eq!(output.latent.dims(), [4, 2]);
        let loss = model.loss(&b, &output).into_scalar();
        assert!(loss.is_finite());
        assert!(loss >= 0.0);
    }

    #[test]
    fn test_variational_adds_kl_to_loss() {
        let device = Default::default();
        let model = SfcCae::<TestBackend>::init(
            SfcCaeConfig::new(64, 1, 2).with_sfc_nums(1).with_variational(true),
            &device,
        )
        .unwrap();
        let b = batch(2, 64);
        let output = model.forward(&b);
        assert!(output.kl.is_some());
        assert!(model.loss(&b, &output).into_scalar().is_finite());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let device: <TestBackend as Backend>::Device = Default::default();
        assert!(SfcCae::<TestBackend>::init(SfcCaeConfig::new(0, 1, 2), &device).is_err());
    }
}
