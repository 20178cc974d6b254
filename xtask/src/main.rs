use anyhow::Result;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::info;

use burn::prelude::*;
use burn_ndarray::NdArray;

use sfcae_core::{ChannelScaler, SfcOrdering};
use sfcae_model::dataset::SnapshotBatch;
use sfcae_model::losses;
use sfcae_model::{ModelPlan, SfcCae, SfcCaeConfig};

type Cpu = NdArray<f32>;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Development tooling for the sfcae workspace")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the layer plan a configuration produces
    Plan {
        /// Nominal node count
        #[arg(long, default_value_t = 2000)]
        input_size: usize,

        /// Field components per node
        #[arg(long, default_value_t = 2)]
        components: usize,

        /// Latent bottleneck width
        #[arg(long, default_value_t = 16)]
        latent: usize,

        /// Number of SFC branches
        #[arg(long, default_value_t = 2)]
        sfc_nums: usize,

        /// Mesh dimension (2 or 3)
        #[arg(long, default_value_t = 2)]
        dimension: usize,
    },

    /// Run an untrained forward pass over a synthetic adaptive dataset
    Demo {
        /// Number of snapshots to synthesize
        #[arg(long, default_value_t = 8)]
        snapshots: usize,

        /// Nominal node count; adaptive snapshots vary around it
        #[arg(long, default_value_t = 500)]
        nodes: usize,

        /// Latent bottleneck width
        #[arg(long, default_value_t = 8)]
        latent: usize,

        /// Number of SFC branches
        #[arg(long, default_value_t = 2)]
        sfc_nums: usize,

        /// Vary node counts per snapshot (adaptive mesh)
        #[arg(long)]
        adaptive: bool,

        /// Adapt lengths by interpolation instead of tiling
        #[arg(long)]
        interpolate: bool,

        /// Variational bottleneck
        #[arg(long)]
        variational: bool,

        /// RNG seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            input_size,
            components,
            latent,
            sfc_nums,
            dimension,
        } => print_plan(input_size, components, latent, sfc_nums, dimension),
        Commands::Demo {
            snapshots,
            nodes,
            latent,
            sfc_nums,
            adaptive,
            interpolate,
            variational,
            seed,
        } => run_demo(snapshots, nodes, latent, sfc_nums, adaptive, interpolate, variational, seed),
    }
}

fn print_plan(
    input_size: usize,
    components: usize,
    latent: usize,
    sfc_nums: usize,
    dimension: usize,
) -> Result<()> {
    let config = SfcCaeConfig::new(input_size, components, latent)
        .with_sfc_nums(sfc_nums)
        .with_dimension(dimension);
    let plan = ModelPlan::build(config)?;

    println!("working size:     {}", plan.working_size);
    println!("input channels:   {}", plan.input_channel);
    println!("conv layer sizes: {:?}", plan.layers.conv_sizes);
    println!("conv channels:    {:?}", plan.layers.channels);
    println!("output paddings:  {:?}", plan.layers.output_paddings);
    println!("fc sizes:         {:?}", plan.layers.fc_sizes);
    println!("branch features:  {}", plan.branch_feature_len());
    Ok(())
}

/// A smooth per-node field plus a locality-preserving ordering, standing in
/// for a real CFD snapshot and its Hilbert curve.
fn synth_snapshot(
    nodes: usize,
    components: usize,
    rng: &mut StdRng,
    device: &<Cpu as Backend>::Device,
) -> (Tensor<Cpu, 2>, Vec<SfcOrdering>) {
    let mut values = Vec::with_capacity(nodes * components);
    for _ in 0..components {
        let freq: f32 = rng.gen_range(0.5..4.0);
        let phase: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
        let amplitude: f32 = rng.gen_range(0.5..3.0);
        for i in 0..nodes {
            let x = i as f32 / nodes as f32;
            values.push(amplitude * (freq * std::f32::consts::TAU * x + phase).sin());
        }
    }
    let field =
        Tensor::<Cpu, 1>::from_floats(values.as_slice(), device).reshape([components, nodes]);

    // Forward and reversed traversals as the two curve candidates; a real
    // pipeline would feed Hilbert orderings from the mesh here.
    let forward: Vec<usize> = (0..nodes).collect();
    let mut backward: Vec<usize> = (0..nodes).rev().collect();
    // Swap a few interior pairs so the curves are not exact mirrors.
    for _ in 0..nodes / 10 {
        let i = rng.gen_range(1..nodes - 1);
        backward.swap(i - 1, i);
    }
    let orderings = vec![
        SfcOrdering::new(forward).unwrap(),
        SfcOrdering::new(backward).unwrap(),
    ];
    (field, orderings)
}

#[allow(clippy::too_many_arguments)]
fn run_demo(
    snapshots: usize,
    nodes: usize,
    latent: usize,
    sfc_nums: usize,
    adaptive: bool,
    interpolate: bool,
    variational: bool,
    seed: u64,
) -> Result<()> {
    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(seed);
    let components = 2;

    let mut fields = Vec::with_capacity(snapshots);
    let mut orderings = Vec::with_capacity(snapshots);
    for _ in 0..snapshots {
        let n = if adaptive {
            rng.gen_range(nodes * 7 / 10..=nodes)
        } else {
            nodes
        };
        let (field, mut curves) = synth_snapshot(n, components, &mut rng, &device);
        curves.truncate(sfc_nums.min(curves.len()));
        while curves.len() < sfc_nums {
            let mut perm: Vec<usize> = (0..n).collect();
            perm.shuffle(&mut rng);
            curves.push(SfcOrdering::new(perm)?);
        }
        fields.push(field);
        orderings.push(curves);
    }

    let scaler = ChannelScaler::fit(&fields, -1.0, 1.0)?;
    let scaled: Vec<_> = fields.iter().map(|f| scaler.scale(f.clone())).collect();

    let mut batch = SnapshotBatch::new(scaled, orderings)?;
    if adaptive {
        batch = batch.with_working_size(nodes, interpolate)?;
    }

    let config = SfcCaeConfig::new(nodes, components, latent)
        .with_sfc_nums(sfc_nums)
        .with_variational(variational);
    let model = SfcCae::<Cpu>::init(config, &device)?;
    info!(snapshots, nodes, latent, sfc_nums, "running forward pass");

    let output = model.forward(&batch);
    let loss = model.loss(&batch, &output).into_scalar();

    for (k, reconstruction) in output.reconstructions.iter().enumerate() {
        let restored = scaler.unscale(reconstruction.clone());
        let rel = losses::relative_mse(restored, fields[k].clone()).into_scalar();
        println!(
            "snapshot {k:3}: {} nodes, relative MSE {rel:.4}",
            fields[k].dims()[1]
        );
    }
    println!("batch loss (scaled space): {loss:.6}");
    if let Some(kl) = output.kl {
        println!("KL divergence: {:.6}", kl.into_scalar());
    }
    Ok(())
}
