//! Channel-wise bounded scaling.
//!
//! Field components arrive in physical units with wildly different ranges;
//! the network expects values inside the activation's bounded interval.
//! The scaler maps each channel affinely onto `[lower, upper]` using the
//! channel's min/max over the whole dataset, and can invert the map to
//! recover physical units from reconstructions.

use burn::prelude::*;
use tracing::warn;

use crate::error::{CoreError, Result};

/// Spread below which a channel is treated as constant.
const CONSTANT_EPS: f64 = 1e-8;

/// Per-channel affine map `x -> x * tk + tb` onto a bounded interval.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelScaler {
    tk: Vec<f32>,
    tb: Vec<f32>,
}

impl ChannelScaler {
    /// Fit the map from a set of `[channels, nodes]` snapshots.
    ///
    /// Constant channels cannot be stretched onto the interval; they are
    /// reported through a warning and passed through unchanged rather than
    /// dropped, so channel indices stay stable for the caller.
    pub fn fit<B: Backend>(snapshots: &[Tensor<B, 2>], lower: f32, upper: f32) -> Result<Self> {
        if snapshots.is_empty() {
            return Err(CoreError::config("cannot fit a scaler on an empty dataset"));
        }
        if lower >= upper {
            return Err(CoreError::config(format!(
                "scaling interval is empty: [{lower}, {upper}]"
            )));
        }
        let channels = snapshots[0].dims()[0];

        let mut mins = vec![f64::INFINITY; channels];
        let mut maxs = vec![f64::NEG_INFINITY; channels];
        for snapshot in snapshots {
            let channel_min: Vec<f32> =
                snapshot.clone().min_dim(1).into_data().iter::<f32>().collect();
            let channel_max: Vec<f32> =
                snapshot.clone().max_dim(1).into_data().iter::<f32>().collect();
            for c in 0..channels {
                mins[c] = mins[c].min(channel_min[c] as f64);
                maxs[c] = maxs[c].max(channel_max[c] as f64);
            }
        }

        let mut tk = Vec::with_capacity(channels);
        let mut tb = Vec::with_capacity(channels);
        for c in 0..channels {
            let spread = maxs[c] - mins[c];
            if spread < CONSTANT_EPS {
                warn!(
                    channel = c,
                    value = mins[c],
                    "channel is constant over the dataset; leaving it unscaled"
                );
                tk.push(1.0);
                tb.push(0.0);
            } else {
                tk.push(((upper - lower) as f64 / spread) as f32);
                tb.push(((maxs[c] * lower as f64 - mins[c] * upper as f64) / spread) as f32);
            }
        }

        Ok(Self { tk, tb })
    }

    /// Number of channels the scaler was fitted on.
    pub fn channels(&self) -> usize {
        self.tk.len()
    }

    /// Map a `[channels, nodes]` snapshot into the bounded interval.
    pub fn scale<B: Backend>(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = input.device();
        let channels = self.channels();
        let tk = Tensor::<B, 1>::from_floats(self.tk.as_slice(), &device).reshape([channels, 1]);
        let tb = Tensor::<B, 1>::from_floats(self.tb.as_slice(), &device).reshape([channels, 1]);
        input * tk + tb
    }

    /// Invert [`ChannelScaler::scale`], recovering physical units.
    pub fn unscale<B: Backend>(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = input.device();
        let channels = self.channels();
        let tk = Tensor::<B, 1>::from_floats(self.tk.as_slice(), &device).reshape([channels, 1]);
        let tb = Tensor::<B, 1>::from_floats(self.tb.as_slice(), &device).reshape([channels, 1]);
        (input - tb) / tk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_scale_maps_to_interval() {
        let device = Default::default();
        let snapshot = Tensor::<TestBackend, 2>::from_floats(
            [[0.0, 5.0, 10.0], [-2.0, 0.0, 2.0]],
            &device,
        );
        let scaler = ChannelScaler::fit(&[snapshot.clone()], -1.0, 1.0).unwrap();
        let scaled: Vec<f32> = scaler.scale(snapshot).into_data().to_vec().unwrap();
        assert_eq!(scaled, vec![-1.0, 0.0, 1.0, -1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unscale_round_trip() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 2>::from_floats([[1.0, 3.0], [10.0, 40.0]], &device);
        let b = Tensor::<TestBackend, 2>::from_floats([[2.0, 7.0], [0.0, 90.0]], &device);
        let scaler = ChannelScaler::fit(&[a.clone(), b], -1.0, 1.0).unwrap();
        let restored: Vec<f32> = scaler
            .unscale(scaler.scale(a.clone()))
            .into_data()
            .to_vec()
            .unwrap();
        let original: Vec<f32> = a.into_data().to_vec().unwrap();
        for (got, want) in restored.iter().zip(original) {
            assert!((got - want).abs() < 1e-5, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_constant_channel_passes_through() {
        let device = Default::default();
        let snapshot =
            Tensor::<TestBackend, 2>::from_floats([[4.0, 4.0, 4.0], [0.0, 1.0, 2.0]], &device);
        let scaler = ChannelScaler::fit(&[snapshot.clone()], -1.0, 1.0).unwrap();
        let scaled: Vec<f32> = scaler.scale(snapshot).into_data().to_vec().unwrap();
        assert_eq!(&scaled[..3], &[4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_rejects_bad_interval() {
        let device = Default::default();
        let snapshot = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0]], &device);
        assert!(ChannelScaler::fit(&[snapshot], 1.0, -1.0).is_err());
        assert!(ChannelScaler::fit::<TestBackend>(&[], -1.0, 1.0).is_err());
    }
}
