use std::path::PathBuf;

use approx::assert_relative_eq;
use cgmath::{InnerSpace, Matrix4, Point3, Transform, Vector3};
use scene_combiner::{
    BatchConfig, BatchRunner,
    assets::mesh_file::{MeshAssetWriter, read_mesh_asset},
    resources::{self, MeshSource},
};

const SCENE: &str = r#"(
    materials: [(name: "iron"), (name: "oak")],
    meshes: [
        (name: "bar", source: Inline(
            positions: [(0.0, 0.0, 0.0), (1.0, 0.0, 0.0), (0.0, 1.0, 0.0)],
            normals: [(0.0, 0.0, 1.0), (0.0, 0.0, 1.0), (0.0, 0.0, 1.0)],
            indices: [0, 1, 2],
        )),
    ],
    prefabs: [
        (name: "chair_small", root: (name: "chair", mesh: Some("bar"), materials: ["oak"])),
    ],
    nodes: [
        (name: "ground"),
        (name: "reja 1", transform: (position: (10.0, 0.0, 0.0), scale: (2.0, 2.0, 2.0)), children: [
            (name: "bar a", mesh: Some("bar"), materials: ["iron"]),
            (name: "bar b", mesh: Some("bar"), transform: (position: (0.0, 0.0, 3.0), scale: (1.0, 4.0, 1.0))),
        ]),
        (name: "Chair#1", transform: (position: (5.0, 0.0, 5.0))),
        (name: "roof"),
    ],
)"#;

const BATCH: &str = r#"(
    combine: [Regex(r"^reja \d+$")],
    replace: [(select: Regex("^Chair#1"), prefab: "chair_small")],
)"#;

struct Workspace {
    _dir: tempfile::TempDir,
    scene: PathBuf,
    output: PathBuf,
}

fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let scene = dir.path().join("level.ron");
    std::fs::write(&scene, SCENE).unwrap();
    let output = dir.path().join("level.combined.ron");
    Workspace {
        scene,
        output,
        _dir: dir,
    }
}

fn world_points(graph: &scene_combiner::SceneGraph, name: &str, local: &[[f32; 3]]) -> Vec<Point3<f32>> {
    let id = graph.find_by_name(name).unwrap();
    let world: Matrix4<f32> = graph.world_matrix(id).unwrap();
    local
        .iter()
        .map(|&p| world.transform_point(Point3::from(p)))
        .collect()
}

#[test]
fn batch_combines_replaces_saves_and_reloads() {
    let ws = workspace();
    let loaded = resources::load_scene(&ws.scene).unwrap();
    let tri = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let mut expected = world_points(&loaded.graph, "bar a", &tri);
    expected.extend(world_points(&loaded.graph, "bar b", &tri));

    let config = BatchConfig::from_ron(BATCH).unwrap();
    let asset_root = ws.scene.parent().unwrap().to_path_buf();
    let mut sources = loaded.sources;
    let mut runner = BatchRunner::new(loaded.graph, loaded.assets, MeshAssetWriter::new(&asset_root));
    let report = runner.run(&config).unwrap();
    assert_eq!(report.combined.len(), 1);
    assert_eq!(report.replaced.len(), 1);
    assert_eq!(report.missing_materials(), 0);

    let (graph, assets, asset_paths) = runner.into_parts();
    let asset = asset_root.join("CombinedMeshes/reja 1_Combined.mesh");
    assert_eq!(asset_paths.values().collect::<Vec<_>>(), vec![&asset]);
    sources.extend(asset_paths.into_iter().map(|(m, p)| (m, MeshSource::Asset(p))));
    resources::save_scene(&graph, &assets, &sources, &ws.output).unwrap();

    let saved = std::fs::read_to_string(&ws.output).unwrap();
    assert!(saved.contains("Asset(\"CombinedMeshes/reja 1_Combined.mesh\")"));

    let reloaded = resources::load_scene(&ws.output).unwrap();
    let graph = &reloaded.graph;
    let names: Vec<_> = graph
        .top_level()
        .iter()
        .map(|&id| graph.node(id).unwrap().name().to_string())
        .collect();
    assert_eq!(names, vec!["ground", "reja 1_Combined", "Chair#1", "roof"]);

    let combined_id = graph.find_by_name("reja 1_Combined").unwrap();
    let combined = graph.node(combined_id).unwrap();
    assert!(graph.children(combined_id).is_empty());
    assert_eq!(combined.local_transform().position, Vector3::new(10.0, 0.0, 0.0));
    let iron = reloaded.assets.material_by_name("iron").unwrap();
    assert_eq!(combined.materials(), &[iron]);

    let geometry = read_mesh_asset(&asset).unwrap();
    assert_eq!(geometry.vertex_count(), 6);
    assert_eq!(geometry.indices.to_u32(), vec![0, 1, 2, 3, 4, 5]);
    let world = graph.world_matrix(combined_id).unwrap();
    for (p, e) in geometry.positions.iter().zip(&expected) {
        let p = world.transform_point(Point3::from(*p));
        assert_relative_eq!(p.x, e.x, epsilon = 1e-4);
        assert_relative_eq!(p.y, e.y, epsilon = 1e-4);
        assert_relative_eq!(p.z, e.z, epsilon = 1e-4);
    }
    for n in &geometry.normals {
        assert_relative_eq!(Vector3::from(*n).magnitude(), 1.0, epsilon = 1e-5);
    }

    let chair_id = graph.find_by_name("Chair#1").unwrap();
    let chair = graph.node(chair_id).unwrap();
    assert!(chair.is_prefab_instance());
    assert_eq!(chair.local_transform().position, Vector3::new(5.0, 0.0, 5.0));
    let oak = reloaded.assets.material_by_name("oak").unwrap();
    assert_eq!(chair.materials(), &[oak]);
}

#[test]
fn second_run_on_the_output_finds_nothing_to_do() {
    let ws = workspace();
    let loaded = resources::load_scene(&ws.scene).unwrap();
    let config = BatchConfig::from_ron(BATCH).unwrap();
    let root = ws.scene.parent().unwrap().to_path_buf();
    let mut runner = BatchRunner::new(loaded.graph, loaded.assets, MeshAssetWriter::new(&root));
    runner.run(&config).unwrap();

    // Combined roots no longer match the pattern; the chair gets replaced again.
    let report = runner.run(&config).unwrap();
    assert!(report.combined.is_empty());
    assert_eq!(report.replaced.len(), 1);
    assert!(report.skipped.is_empty());
}

#[test]
fn undo_restores_the_loaded_scene() {
    let ws = workspace();
    let loaded = resources::load_scene(&ws.scene).unwrap();
    let before = resources::describe_scene(
        &loaded.graph,
        &loaded.assets,
        &loaded.sources,
        ws.scene.parent().unwrap(),
    );
    let root = ws.scene.parent().unwrap().to_path_buf();
    let mut runner = BatchRunner::new(loaded.graph, loaded.assets, MeshAssetWriter::new(&root));
    runner.run(&BatchConfig::from_ron(BATCH).unwrap()).unwrap();

    assert_eq!(runner.undo().as_deref(), Some("Replace Objects"));
    assert_eq!(runner.undo().as_deref(), Some("Combine Meshes"));
    assert_eq!(runner.undo(), None);

    let (graph, assets, _) = runner.into_parts();
    let after = resources::describe_scene(&graph, &assets, &Default::default(), &root);
    assert_eq!(ron::to_string(&before.nodes).unwrap(), ron::to_string(&after.nodes).unwrap());
}
