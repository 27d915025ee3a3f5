use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use scene_combiner::{
    BatchConfig, BatchRunner, assets::mesh_file::MeshAssetWriter, resources,
    resources::MeshSource,
};

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: scene-combiner <scene.ron> <batch.ron> [out-scene.ron]");
        return Ok(());
    }

    let scene_path = Path::new(&args[1]);
    let batch_path = Path::new(&args[2]);
    let output_path = match args.get(3) {
        Some(path) => PathBuf::from(path),
        None => default_output_path(scene_path),
    };

    let start = std::time::Instant::now();
    let loaded = resources::load_scene(scene_path)
        .with_context(|| format!("Failed to load scene {}", scene_path.display()))?;
    let config = BatchConfig::load(batch_path)
        .with_context(|| format!("Failed to load batch {}", batch_path.display()))?;

    let asset_root = scene_path.parent().unwrap_or(Path::new("")).to_path_buf();
    let mut sources = loaded.sources;
    let mut runner = BatchRunner::new(
        loaded.graph,
        loaded.assets,
        MeshAssetWriter::new(asset_root),
    );
    let report = runner
        .run(&config)
        .with_context(|| format!("Batch {} failed", batch_path.display()))?;

    let (graph, assets, asset_paths) = runner.into_parts();
    sources.extend(
        asset_paths
            .into_iter()
            .map(|(mesh, path)| (mesh, MeshSource::Asset(path))),
    );
    resources::save_scene(&graph, &assets, &sources, &output_path)
        .with_context(|| format!("Failed to save scene {}", output_path.display()))?;

    for skipped in &report.skipped {
        log::debug!("Skipped {:?}: {}", skipped.name, skipped.reason);
    }
    println!(
        "{} -> {}: {} in {:.2}s",
        scene_path.display(),
        output_path.display(),
        report,
        start.elapsed().as_secs_f32()
    );

    Ok(())
}

/// `scenes/level.ron` becomes `scenes/level.combined.ron`.
fn default_output_path(scene: &Path) -> PathBuf {
    let stem = scene
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scene".to_string());
    scene.with_file_name(format!("{}.combined.ron", stem))
}
