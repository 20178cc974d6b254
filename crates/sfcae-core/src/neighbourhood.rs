//! Neighbourhood gather-index tables.
//!
//! A convolution over an SFC-ordered sequence only sees curve neighbours,
//! not mesh neighbours. The nearest-neighbouring layers recover local mesh
//! structure by gathering, for every node of an N-D index grid, the node
//! itself plus its shifted copies along a set of offset vectors. The gather
//! indices are precomputed here into a single flat table usable against a
//! tensor tiled `num_neighbours + 1` times along its last axis.
//!
//! Boundary handling is edge clamping: an offset that leaves the grid along
//! some axis is clamped to the nearest in-range coordinate on that axis.

use burn::prelude::*;

use crate::error::{CoreError, Result};

/// How the offset vectors around each node are enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetScheme {
    /// Every vector in `{-range, ..., range}^ndim` except the zero vector.
    Full { range: usize },
    /// Axis-aligned unit vectors only: `±e_i` for each axis `i`.
    Direct,
}

/// Enumerate neighbour offset vectors for an `ndim`-dimensional grid.
///
/// The zero vector is never included; the self entry is handled separately
/// as the first block of the index table.
pub fn offset_keys(ndim: usize, scheme: OffsetScheme) -> Vec<Vec<isize>> {
    match scheme {
        OffsetScheme::Full { range } => {
            let r = range as isize;
            let mut keys = vec![vec![]];
            for _ in 0..ndim {
                let mut next = Vec::with_capacity(keys.len() * (2 * range + 1));
                for prefix in &keys {
                    for k in -r..=r {
                        let mut key = prefix.clone();
                        key.push(k);
                        next.push(key);
                    }
                }
                keys = next;
            }
            keys.retain(|key| key.iter().any(|&k| k != 0));
            keys
        }
        OffsetScheme::Direct => {
            let mut keys = Vec::with_capacity(2 * ndim);
            for axis in 0..ndim {
                for sign in [1isize, -1] {
                    let mut key = vec![0isize; ndim];
                    key[axis] = sign;
                    keys.push(key);
                }
            }
            keys
        }
    }
}

/// Flattened neighbour-index table for a fixed grid shape and offset set.
///
/// Built once per (shape, offsets) pair and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighbourTable {
    shape: Vec<usize>,
    total: usize,
    num_neighbours: usize,
    /// `(num_neighbours + 1)` blocks of `total` indices; block `i` is offset
    /// by `i * total` so the whole table gathers from a tiled tensor.
    flat: Vec<i64>,
}

impl NeighbourTable {
    /// Build the table for an N-D grid of the given shape.
    ///
    /// Block 0 is the identity (self) gather; block `i >= 1` holds the
    /// clamped shifted indices for `offsets[i - 1]`.
    pub fn build(shape: &[usize], offsets: &[Vec<isize>]) -> Result<Self> {
        if shape.is_empty() || shape.iter().any(|&s| s == 0) {
            return Err(CoreError::config("grid shape must be non-empty and positive"));
        }
        let ndim = shape.len();
        let total: usize = shape.iter().product();

        let mut flat = Vec::with_capacity((offsets.len() + 1) * total);
        flat.extend((0..total as i64).collect::<Vec<_>>());

        let mut coords = vec![0usize; ndim];
        for (block, offset) in offsets.iter().enumerate() {
            if offset.len() != ndim {
                return Err(CoreError::DimensionMismatch {
                    expected: ndim,
                    actual: offset.len(),
                });
            }
            coords.iter_mut().for_each(|c| *c = 0);
            let base = ((block + 1) * total) as i64;
            for _ in 0..total {
                let mut neighbour = 0usize;
                for axis in 0..ndim {
                    let shifted = (coords[axis] as isize + offset[axis])
                        .clamp(0, shape[axis] as isize - 1) as usize;
                    neighbour = neighbour * shape[axis] + shifted;
                }
                flat.push(base + neighbour as i64);

                // Row-major increment of the coordinate counter.
                for axis in (0..ndim).rev() {
                    coords[axis] += 1;
                    if coords[axis] < shape[axis] {
                        break;
                    }
                    coords[axis] = 0;
                }
            }
        }

        Ok(Self {
            shape: shape.to_vec(),
            total,
            num_neighbours: offsets.len(),
            flat,
        })
    }

    /// Convenience 1D table over `len` nodes with a `±1` window.
    pub fn line(len: usize) -> Result<Self> {
        let offsets = offset_keys(1, OffsetScheme::Full { range: 1 });
        Self::build(&[len], &offsets)
    }

    /// Grid shape this table was built for.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total node count of the grid.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of neighbour offsets (excluding self).
    pub fn num_neighbours(&self) -> usize {
        self.num_neighbours
    }

    /// Neighbourhood size including the self entry.
    pub fn num_with_self(&self) -> usize {
        self.num_neighbours + 1
    }

    /// The gather indices of one block, without the tiling offset.
    pub fn block(&self, index: usize) -> impl Iterator<Item = i64> + '_ {
        let base = (index * self.total) as i64;
        self.flat[index * self.total..(index + 1) * self.total]
            .iter()
            .map(move |&i| i - base)
    }

    /// The full flat table, blocks offset for gathering from a tiled tensor.
    pub fn flat_indices(&self) -> &[i64] {
        &self.flat
    }

    /// Gather every node's neighbourhood into a trailing axis.
    ///
    /// `input` is `[batch, channels, total]`; the result is
    /// `[batch, channels / self_concat, total, num_with_self * self_concat]`.
    /// With `self_concat > 1` the duplicated channel groups are folded into
    /// the neighbour axis, giving the aggregation layer independent weight
    /// sets per duplicate.
    pub fn stack<B: Backend>(&self, input: Tensor<B, 3>, self_concat: usize) -> Tensor<B, 4> {
        let [batch, channels, nodes] = input.dims();
        debug_assert_eq!(nodes, self.total);
        let device = input.device();
        let k = self.num_with_self();

        let tiled = input.repeat_dim(2, k);
        let index_tensor = Tensor::from_data(self.flat.as_slice(), &device);
        let gathered = tiled.select(2, index_tensor);

        // Block-major layout to node-major: [b, c, k, n] -> [b, c, n, k].
        let stacked = gathered
            .reshape([batch, channels, k, nodes])
            .permute([0, 1, 3, 2]);

        if self_concat > 1 {
            let chunks = stacked.chunk(self_concat, 1);
            Tensor::cat(chunks, 3)
        } else {
            stacked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_offset_keys_full() {
        let keys = offset_keys(2, OffsetScheme::Full { range: 1 });
        assert_eq!(keys.len(), 8);
        assert!(!keys.contains(&vec![0, 0]));
        assert!(keys.contains(&vec![-1, 1]));

        let keys_3d = offset_keys(3, OffsetScheme::Full { range: 1 });
        assert_eq!(keys_3d.len(), 26);
    }

    #[test]
    fn test_offset_keys_direct() {
        let keys = offset_keys(3, OffsetScheme::Direct);
        assert_eq!(keys.len(), 6);
        assert!(keys.contains(&vec![0, -1, 0]));
    }

    #[test]
    fn test_all_indices_in_range() {
        for shape in [vec![7], vec![4, 5], vec![3, 3, 3]] {
            let offsets = offset_keys(shape.len(), OffsetScheme::Full { range: 1 });
            let table = NeighbourTable::build(&shape, &offsets).unwrap();
            let total = table.total() as i64;
            for block in 0..table.num_with_self() {
                for index in table.block(block) {
                    assert!(
                        (0..total).contains(&index),
                        "block {block} index {index} out of range for {total} nodes"
                    );
                }
            }
        }
    }

    #[test]
    fn test_line_table_clamps_boundaries() {
        let table = NeighbourTable::line(4).unwrap();
        assert_eq!(table.num_with_self(), 3);
        // Offsets are enumerated as [-1, 1] in 1D.
        let minus: Vec<i64> = table.block(1).collect();
        let plus: Vec<i64> = table.block(2).collect();
        assert_eq!(minus, vec![0, 0, 1, 2]);
        assert_eq!(plus, vec![1, 2, 3, 3]);
    }

    #[test]
    fn test_corner_clamps_per_axis() {
        let offsets = vec![vec![-1isize, -1]];
        let table = NeighbourTable::build(&[3, 3], &offsets).unwrap();
        let block: Vec<i64> = table.block(1).collect();
        // Node (0, 0) clamps both axes to itself; node (0, 1) clamps the
        // first axis only, landing on (0, 0).
        assert_eq!(block[0], 0);
        assert_eq!(block[1], 0);
        // Interior node (1, 1) -> (0, 0).
        assert_eq!(block[4], 0);
    }

    #[test]
    fn test_stack_shape_and_self_block() {
        let device = Default::default();
        let table = NeighbourTable::line(5).unwrap();
        let x = Tensor::<TestBackend, 3>::from_floats(
            [[[0.0, 1.0, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0, 9.0]]],
            &device,
        );
        let stacked = table.stack(x.clone(), 1);
        assert_eq!(stacked.dims(), [1, 2, 5, 3]);

        // The first entry of the neighbour axis is the node itself.
        let self_slice = stacked.narrow(3, 0, 1).reshape([1, 2, 5]);
        assert_eq!(
            self_slice.into_data().to_vec::<f32>().unwrap(),
            x.into_data().to_vec::<f32>().unwrap()
        );
    }

    #[test]
    fn test_stack_self_concat_folds_channels() {
        let device = Default::default();
        let table = NeighbourTable::line(4).unwrap();
        let x = Tensor::<TestBackend, 3>::random(
            [2, 6, 4],
            burn::tensor::Distribution::Default,
            &device,
        );
        let stacked = table.stack(x, 2);
        assert_eq!(stacked.dims(), [2, 3, 4, 6]);
    }
}
