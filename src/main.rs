use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vslam_map::atlas::{Map, MapPersistence, SparseMap};
use vslam_map::bootstrap::Bootstrapper;
use vslam_map::config::BootstrapConfig;
use vslam_map::io::synthetic::{synthetic_intrinsics, two_view_sequence};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let output = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("bootstrap.vsmp"));
    let config = match std::env::args().nth(2) {
        Some(path) => BootstrapConfig::load(path.as_ref())
            .with_context(|| format!("loading config {}", path))?,
        None => BootstrapConfig {
            map_name: "synthetic".to_string(),
            ..BootstrapConfig::default()
        },
    };

    let sequence = two_view_sequence(200, 0.5, 42);
    println!("Bootstrapping from {} synthetic frames", sequence.frames.len());

    let bootstrapper = Bootstrapper::new(config, sequence.frames, sequence.extractor)?;
    bootstrapper.set_camera_parameters(&synthetic_intrinsics(), &[])?;
    let map = bootstrapper.run().context("bootstrap failed")?;

    let stats = map.stats();
    println!(
        "Map {}: {} keyframes, {} points, {} covisibility edges",
        map.uuid_string(),
        stats.num_keyframes,
        stats.num_points,
        stats.num_covisibility_edges
    );

    map.save(&output)
        .with_context(|| format!("saving map to {}", output.display()))?;
    let reloaded = SparseMap::load(&output)?;
    reloaded.check_invariants()?;
    info!("Reloaded map has {} points", reloaded.stats().num_points);

    println!("Saved to {}", output.display());
    Ok(())
}
