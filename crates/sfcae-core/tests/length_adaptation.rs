//! Integration tests for the SFC data-shaping pipeline: ordering, length
//! adaptation and neighbour stacking working together the way the model
//! crate drives them.

use burn::prelude::*;
use burn_ndarray::NdArray;

use sfcae_core::{
    BackwardForwardConnecting, InterpolationWeights, NeighbourTable, ReduceStrategy, SfcOrdering,
};

type TestBackend = NdArray<f32>;

fn snapshot(values: &[f32]) -> Tensor<TestBackend, 3> {
    let device = Default::default();
    Tensor::<TestBackend, 1>::from_floats(values, &device).reshape([1, 1, values.len()])
}

#[test]
fn order_fill_and_restore_is_identity_with_truncate() {
    let ordering = SfcOrdering::new(vec![3, 1, 4, 0, 2, 5]).unwrap();
    let filling = BackwardForwardConnecting::new(6, 16).unwrap();
    let x = snapshot(&[0.5, -1.5, 2.0, 0.0, 3.25, -0.75]);

    let ordered = ordering.apply(x.clone());
    let expanded = filling.expand(ordered);
    assert_eq!(expanded.dims(), [1, 1, 16]);

    let reduced = filling.contract(expanded, ReduceStrategy::Truncate);
    let restored = ordering.invert(reduced);

    assert_eq!(
        restored.into_data().to_vec::<f32>().unwrap(),
        x.into_data().to_vec::<f32>().unwrap()
    );
}

#[test]
fn interpolation_pair_recovers_smooth_field() {
    // Expand a coarse snapshot onto the working length and come back with
    // the back-mapped reduction; a smooth field should survive closely.
    let up = InterpolationWeights::compute(9, 33, false).unwrap();
    let down = InterpolationWeights::compute(33, 9, true).unwrap();
    assert!(down.has_back_mapping());

    let values: Vec<f32> = (0..9).map(|i| 0.25 * i as f32 - 1.0).collect();
    let x = snapshot(&values);
    let round_trip = down.apply(up.apply(x.clone()));

    let got = round_trip.into_data().to_vec::<f32>().unwrap();
    let want = x.into_data().to_vec::<f32>().unwrap();
    for (g, w) in got.iter().zip(want) {
        assert!((g - w).abs() < 1e-3, "got {g}, want {w}");
    }
}

#[test]
fn neighbour_stack_matches_manual_gather_on_grid() {
    let device = Default::default();
    let offsets = sfcae_core::offset_keys(2, sfcae_core::OffsetScheme::Direct);
    let table = NeighbourTable::build(&[2, 3], &offsets).unwrap();

    let x = Tensor::<TestBackend, 1>::from_floats(
        [0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
        &device,
    )
    .reshape([1, 1, 6]);
    let stacked = table.stack(x, 1);
    assert_eq!(stacked.dims(), [1, 1, 6, 5]);

    let flat: Vec<f32> = stacked.into_data().to_vec().unwrap();
    // Node (0, 1) = flat index 1: self, then +row, -row (clamped), +col, -col.
    let node = &flat[5..10];
    assert_eq!(node[0], 1.0);
    assert_eq!(node[1], 4.0); // (1, 1)
    assert_eq!(node[2], 1.0); // clamped to itself
    assert_eq!(node[3], 2.0); // (0, 2)
    assert_eq!(node[4], 0.0); // (0, 0)
}
