//! Reconstruction metrics.

use burn::prelude::*;

/// Mean squared error over all elements.
pub fn mse<B: Backend, const D: usize>(
    prediction: Tensor<B, D>,
    target: Tensor<B, D>,
) -> Tensor<B, 1> {
    (prediction - target).powf_scalar(2.0).mean()
}

/// Relative mean squared error: `sum((x - y)^2) / sum(y^2)`.
///
/// Scale-free, which makes it comparable across fields with different
/// physical units.
pub fn relative_mse<B: Backend, const D: usize>(
    prediction: Tensor<B, D>,
    target: Tensor<B, D>,
) -> Tensor<B, 1> {
    let residual = (prediction - target.clone()).powf_scalar(2.0).sum();
    let reference = target.powf_scalar(2.0).sum();
    residual / reference
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_zero_for_identical_tensors() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0], [3.0, 4.0]], &device);
        assert!(mse(x.clone(), x.clone()).into_scalar() < 1e-7);
        assert!(relative_mse(x.clone(), x).into_scalar() < 1e-7);
    }

    #[test]
    fn test_relative_mse_is_scale_free() {
        let device = Default::default();
        let y = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0], &device);
        let x = y.clone().mul_scalar(1.1);
        let small = relative_mse(x, y.clone()).into_scalar();

        let y_scaled = y.clone().mul_scalar(1000.0);
        let x_scaled = y_scaled.clone().mul_scalar(1.1);
        let large = relative_mse(x_scaled, y_scaled).into_scalar();
        assert!((small - large).abs() < 1e-6);
    }
}
