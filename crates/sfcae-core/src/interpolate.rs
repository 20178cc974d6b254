//! Linear-interpolation length adaptation.
//!
//! The alternative to backward-forward tiling: resample the SFC-ordered
//! sequence between `n_from` and `n_to` samples on a uniform [0, 1] grid
//! with two-point linear interpolation. When reducing a sequence to less
//! than half its length, an optional 4-point "optimal back-mapping" blends
//! the two next-outer neighbours as well, which recovers noticeably more
//! signal on interior points.
//!
//! All weights are precomputed at construction; application is a handful of
//! gathers and multiplies on the last axis.

use burn::prelude::*;

use crate::error::{CoreError, Result};
use crate::ordering::select_last;

const TOLERANCE: f64 = 1e-6;

/// 4-point correction weights for interior points, used when
/// `n_from >= 2 * n_to`.
#[derive(Debug, Clone, PartialEq)]
struct BackMapping {
    prev_inner: Vec<i64>,
    next_inner: Vec<i64>,
    prev_outer: Vec<i64>,
    next_outer: Vec<i64>,
    weight_prev: Vec<f32>,
    weight_next: Vec<f32>,
    weight_prev_outer: Vec<f32>,
    weight_next_outer: Vec<f32>,
}

/// Precomputed interpolation weights from `n_from` to `n_to` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationWeights {
    n_from: usize,
    n_to: usize,
    prev: Vec<i64>,
    next: Vec<i64>,
    weight_prev: Vec<f32>,
    weight_next: Vec<f32>,
    back: Option<BackMapping>,
}

impl InterpolationWeights {
    /// Derive the bracketing indices and linear weights.
    ///
    /// With `map_back` set and `n_from >= 2 * n_to`, interior points
    /// additionally get inverse-distance-weighted 4-point blending; the
    /// first and last points always keep the plain 2-point scheme.
    pub fn compute(n_from: usize, n_to: usize, map_back: bool) -> Result<Self> {
        if n_from < 2 || n_to < 2 {
            return Err(CoreError::length(format!(
                "interpolation needs at least 2 samples on both sides, got {n_from} -> {n_to}"
            )));
        }

        let from_coord = |i: i64| i as f64 / (n_from - 1) as f64;
        let to_coord = |j: usize| j as f64 / (n_to - 1) as f64;

        let mut prev: Vec<i64> = (0..n_to)
            .map(|j| ((n_from - 1) as f64 * to_coord(j)).floor() as i64)
            .collect();
        prev[n_to - 1] = (n_from - 2) as i64;
        let next: Vec<i64> = prev.iter().map(|&p| p + 1).collect();

        let mut weight_next = Vec::with_capacity(n_to);
        for j in 0..n_to {
            let span = from_coord(next[j]) - from_coord(prev[j]);
            let w = ((to_coord(j) - from_coord(prev[j])) / span).clamp(0.0, 1.0);
            weight_next.push(w as f32);
        }
        let weight_prev: Vec<f32> = weight_next.iter().map(|w| 1.0 - w).collect();

        let back = if map_back && n_from >= 2 * n_to {
            let mut mapping = BackMapping {
                prev_inner: prev[1..n_to - 1].to_vec(),
                next_inner: next[1..n_to - 1].to_vec(),
                prev_outer: prev[1..n_to - 1].iter().map(|&p| p - 1).collect(),
                next_outer: next[1..n_to - 1].iter().map(|&n| n + 1).collect(),
                weight_prev: Vec::new(),
                weight_next: Vec::new(),
                weight_prev_outer: Vec::new(),
                weight_next_outer: Vec::new(),
            };
            for j in 1..n_to - 1 {
                let target = to_coord(j);
                let gap_next = (target - from_coord(next[j])).abs().max(TOLERANCE);
                let gap_prev = (target - from_coord(prev[j])).abs().max(TOLERANCE);
                let mut w_next = 1.0 / gap_next;
                let mut w_prev = 1.0 / gap_prev;
                let sum = w_next + w_prev;
                w_next /= sum;
                w_prev /= sum;

                let rate_next = 1.0
                    - (from_coord(next[j]) - target)
                        / (from_coord(next[j]) - from_coord(next[j] + 1));
                let rate_prev = 1.0
                    - (from_coord(prev[j]) - target)
                        / (from_coord(prev[j]) - from_coord(prev[j] - 1));

                mapping.weight_prev.push((w_prev * rate_prev) as f32);
                mapping.weight_next.push((w_next * rate_next) as f32);
                mapping.weight_prev_outer.push((w_prev * (1.0 - rate_prev)) as f32);
                mapping.weight_next_outer.push((w_next * (1.0 - rate_next)) as f32);
            }
            Some(mapping)
        } else {
            None
        };

        Ok(Self {
            n_from,
            n_to,
            prev,
            next,
            weight_prev,
            weight_next,
            back,
        })
    }

    /// Source sample count.
    pub fn n_from(&self) -> usize {
        self.n_from
    }

    /// Target sample count.
    pub fn n_to(&self) -> usize {
        self.n_to
    }

    /// Whether the 4-point back-mapping correction is active.
    pub fn has_back_mapping(&self) -> bool {
        self.back.is_some()
    }

    /// Resample the last axis of `[batch, channels, n_from]` to `n_to`.
    ///
    /// The last output sample is always the exact last input sample.
    pub fn apply<B: Backend>(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        debug_assert_eq!(input.dims()[2], self.n_from);
        let device = input.device();

        let weighted = |indices: &[i64], weights: &[f32]| {
            let w = Tensor::<B, 1>::from_floats(weights, &device).reshape([1, 1, indices.len()]);
            select_last(input.clone(), indices) * w
        };

        let base = weighted(&self.prev, &self.weight_prev)
            + weighted(&self.next, &self.weight_next);
        let last = input.clone().narrow(2, self.n_from - 1, 1);

        match &self.back {
            None => {
                let head = base.narrow(2, 0, self.n_to - 1);
                Tensor::cat(vec![head, last], 2)
            }
            Some(mapping) => {
                let first = base.clone().narrow(2, 0, 1);
                let interior = weighted(&mapping.prev_inner, &mapping.weight_prev)
                    + weighted(&mapping.prev_outer, &mapping.weight_prev_outer)
                    + weighted(&mapping.next_inner, &mapping.weight_next)
                    + weighted(&mapping.next_outer, &mapping.weight_next_outer);
                Tensor::cat(vec![first, interior, last], 2)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn tensor_1x1(values: &[f32]) -> Tensor<TestBackend, 3> {
        let device = Default::default();
        Tensor::<TestBackend, 1>::from_floats(values, &device).reshape([1, 1, values.len()])
    }

    fn to_vec(tensor: Tensor<TestBackend, 3>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_identity_when_sizes_match() {
        let weights = InterpolationWeights::compute(6, 6, false).unwrap();
        let x = tensor_1x1(&[3.0, -1.0, 0.0, 7.5, 2.0, -4.0]);
        let out = weights.apply(x.clone());
        for (got, want) in to_vec(out).iter().zip(to_vec(x)) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_upsample_linear_ramp_exact() {
        // A linear field is reproduced exactly by linear interpolation.
        let weights = InterpolationWeights::compute(3, 5, false).unwrap();
        let out = weights.apply(tensor_1x1(&[0.0, 1.0, 2.0]));
        for (got, want) in to_vec(out).iter().zip([0.0, 0.5, 1.0, 1.5, 2.0]) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_endpoints_preserved_on_downsample() {
        let weights = InterpolationWeights::compute(11, 4, false).unwrap();
        let values: Vec<f32> = (0..11).map(|i| (i as f32).sin()).collect();
        let out = to_vec(weights.apply(tensor_1x1(&values)));
        assert!((out[0] - values[0]).abs() < 1e-6);
        assert!((out[3] - values[10]).abs() < 1e-6);
    }

    #[test]
    fn test_back_mapping_activation_threshold() {
        assert!(!InterpolationWeights::compute(7, 4, true).unwrap().has_back_mapping());
        assert!(InterpolationWeights::compute(8, 4, true).unwrap().has_back_mapping());
        assert!(!InterpolationWeights::compute(8, 4, false).unwrap().has_back_mapping());
    }

    #[test]
    fn test_back_mapping_reproduces_linear_ramp() {
        // The 4-point blend is exact on linear data as well: the pairwise
        // weights are normalized and each pair extrapolates the same line.
        let weights = InterpolationWeights::compute(16, 5, true).unwrap();
        assert!(weights.has_back_mapping());
        let values: Vec<f32> = (0..16).map(|i| 2.0 * i as f32 + 1.0).collect();
        let out = to_vec(weights.apply(tensor_1x1(&values)));
        for (j, got) in out.iter().enumerate() {
            let want = 2.0 * (15.0 * j as f32 / 4.0) + 1.0;
            assert!((got - want).abs() < 1e-3, "sample {j}: got {got}, want {want}");
        }
    }

    #[test]
    fn test_rejects_single_sample() {
        assert!(InterpolationWeights::compute(1, 5, false).is_err());
        assert!(InterpolationWeights::compute(5, 1, false).is_err());
    }
}
