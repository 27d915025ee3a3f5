//! Loading scenes from RON files, and writing them back.

use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assets::{
    AssetStore, MaterialId, MeshId,
    geometry::{GeometryBuffer, GeometryError},
    mesh_file::{MeshFileError, read_mesh_asset},
    model::{Material, Prefab, PrefabNode},
};
use crate::scene::{
    SceneError, SceneGraph, node::SceneNode, node::SceneNodeId,
    spatial_transform::TransformDescription,
};

/// A whole scene as written in a `.ron` file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    pub materials: Vec<MaterialDescription>,
    pub meshes: Vec<MeshDescription>,
    pub prefabs: Vec<PrefabDescription>,
    pub nodes: Vec<NodeDescription>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterialDescription {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeshDescription {
    pub name: String,
    pub source: MeshSource,
}

/// Where a mesh's geometry comes from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MeshSource {
    /// A Wavefront OBJ file. Without a model name, the file's first model is used.
    Obj {
        path: PathBuf,
        #[serde(default)]
        model: Option<String>,
    },
    /// A binary mesh asset, such as the ones combining writes.
    Asset(PathBuf),
    Inline {
        positions: Vec<[f32; 3]>,
        #[serde(default)]
        normals: Vec<[f32; 3]>,
        #[serde(default)]
        uvs: Vec<[f32; 2]>,
        indices: Vec<u32>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrefabDescription {
    pub name: String,
    pub root: NodeDescription,
}

/// One node and its subtree.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDescription {
    pub name: String,
    pub transform: TransformDescription,
    pub mesh: Option<String>,
    pub materials: Vec<String>,
    pub prefab_instance: bool,
    pub children: Vec<NodeDescription>,
}

/// A scene loaded from disk.
#[derive(Debug)]
pub struct LoadedScene {
    pub graph: SceneGraph,
    pub assets: AssetStore,
    /// The file each mesh was read from; inline meshes have no entry.
    pub sources: FxHashMap<MeshId, MeshSource>,
}

/// Read a scene file, along with every mesh file it references.
///
/// Relative mesh paths are resolved against the scene file's folder and made absolute.
pub fn load_scene(path: &Path) -> Result<LoadedScene, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let description: SceneDescription =
        ron::from_str(&text).map_err(|e| LoadError::Ron(path.to_path_buf(), e.to_string()))?;
    let base = absolute_folder(path)?;
    let loaded = build_scene(&description, &base)?;
    log::info!(
        "Loaded scene {:?}: {} node(s), {} mesh(es)",
        path,
        loaded.graph.len(),
        loaded.assets.meshes().count()
    );
    Ok(loaded)
}

/// Build the graph and asset store for an already parsed scene.
pub fn build_scene(description: &SceneDescription, base: &Path) -> Result<LoadedScene, LoadError> {
    let mut assets = AssetStore::new();
    let mut sources = FxHashMap::default();

    let material_ids = assets.add_materials(
        description
            .materials
            .iter()
            .map(|m| Material {
                name: m.name.clone(),
            })
            .collect(),
    );
    let materials: FxHashMap<&str, MaterialId> = description
        .materials
        .iter()
        .map(|m| m.name.as_str())
        .zip(material_ids)
        .collect();

    let mut meshes: FxHashMap<&str, MeshId> = FxHashMap::default();
    for mesh in &description.meshes {
        let source = mesh.source.resolved(base);
        let geometry = load_geometry(&source)?;
        geometry.validate().map_err(|source| LoadError::InvalidMesh {
            mesh: mesh.name.clone(),
            source,
        })?;
        let id = assets.add_mesh(mesh.name.clone(), geometry);
        if !matches!(source, MeshSource::Inline { .. }) {
            sources.insert(id, source);
        }
        meshes.insert(mesh.name.as_str(), id);
    }

    let names = NameTables {
        meshes: &meshes,
        materials: &materials,
    };
    for prefab in &description.prefabs {
        let root = names.prefab_node(&prefab.root)?;
        assets.add_prefab(Prefab {
            name: prefab.name.clone(),
            root,
        });
    }

    let mut graph = SceneGraph::new();
    for node in &description.nodes {
        names.spawn(&mut graph, None, node)?;
    }

    Ok(LoadedScene {
        graph,
        assets,
        sources,
    })
}

/// Write `graph` to a scene file.
///
/// Meshes with an entry in `sources` are written as file references, relative to the output
/// folder when possible. The rest are written inline. Meshes nothing refers to are left out.
pub fn save_scene(
    graph: &SceneGraph,
    assets: &AssetStore,
    sources: &FxHashMap<MeshId, MeshSource>,
    path: &Path,
) -> Result<(), LoadError> {
    let base = absolute_folder(path)?;
    let description = describe_scene(graph, assets, sources, &base);
    let text = ron::ser::to_string_pretty(&description, ron::ser::PrettyConfig::default())
        .map_err(|e| LoadError::Ron(path.to_path_buf(), e.to_string()))?;
    std::fs::write(path, text).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!(
        "Saved scene {:?}: {} node(s), {} mesh(es)",
        path,
        graph.len(),
        description.meshes.len()
    );
    Ok(())
}

/// The serializable form of a graph and the assets it uses.
pub fn describe_scene(
    graph: &SceneGraph,
    assets: &AssetStore,
    sources: &FxHashMap<MeshId, MeshSource>,
    base: &Path,
) -> SceneDescription {
    let used: FxHashSet<MeshId> = graph
        .all_nodes()
        .into_iter()
        .filter_map(|id| graph.node(id).and_then(SceneNode::mesh))
        .chain(assets.prefabs().flat_map(|(_, p)| prefab_meshes(&p.root)))
        .collect();

    // Combining can produce several meshes with one name.
    let mut taken = FxHashSet::default();
    let mut mesh_names = FxHashMap::default();
    let mut meshes = Vec::new();
    for (id, mesh) in assets.meshes().filter(|(id, _)| used.contains(id)) {
        let mut name = mesh.name.clone();
        let mut n = 1;
        while !taken.insert(name.clone()) {
            n += 1;
            name = format!("{}#{}", mesh.name, n);
        }
        let source = match sources.get(&id) {
            Some(source) => source.relative_to(base),
            None => MeshSource::inline(&mesh.geometry),
        };
        mesh_names.insert(id, name.clone());
        meshes.push(MeshDescription { name, source });
    }

    let describer = Describer {
        assets,
        mesh_names: &mesh_names,
    };
    SceneDescription {
        materials: assets
            .materials()
            .map(|(_, m)| MaterialDescription {
                name: m.name.clone(),
            })
            .collect(),
        meshes,
        prefabs: assets
            .prefabs()
            .map(|(_, p)| PrefabDescription {
                name: p.name.clone(),
                root: describer.prefab_node(&p.root),
            })
            .collect(),
        nodes: graph
            .top_level()
            .iter()
            .map(|&id| describer.scene_node(graph, id))
            .collect(),
    }
}

/// The absolute folder holding `file`.
fn absolute_folder(file: &Path) -> Result<PathBuf, LoadError> {
    let folder = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::path::absolute(folder).map_err(|source| LoadError::Io {
        path: folder.to_path_buf(),
        source,
    })
}

fn prefab_meshes(node: &PrefabNode) -> Vec<MeshId> {
    node.mesh
        .into_iter()
        .chain(node.children.iter().flat_map(prefab_meshes))
        .collect()
}

impl MeshSource {
    fn inline(geometry: &GeometryBuffer) -> Self {
        MeshSource::Inline {
            positions: geometry.positions.clone(),
            normals: geometry.normals.clone(),
            uvs: geometry.uvs.clone(),
            indices: geometry.indices.to_u32(),
        }
    }

    fn path(&self) -> Option<&Path> {
        match self {
            MeshSource::Obj { path, .. } | MeshSource::Asset(path) => Some(path),
            MeshSource::Inline { .. } => None,
        }
    }

    fn with_path(&self, path: PathBuf) -> Self {
        match self {
            MeshSource::Obj { model, .. } => MeshSource::Obj {
                path,
                model: model.clone(),
            },
            MeshSource::Asset(_) => MeshSource::Asset(path),
            inline => inline.clone(),
        }
    }

    fn resolved(&self, base: &Path) -> Self {
        match self.path() {
            Some(path) if path.is_relative() => self.with_path(base.join(path)),
            _ => self.clone(),
        }
    }

    /// The same source with its path relative to `base`, climbing out with `..` if needed.
    fn relative_to(&self, base: &Path) -> Self {
        let Some(path) = self.path() else {
            return self.clone();
        };
        if let Ok(relative) = path.strip_prefix(base) {
            return self.with_path(relative.to_path_buf());
        }
        let absolute = |p: &Path| std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf());
        match pathdiff::diff_paths(absolute(path), absolute(base)) {
            Some(relative) => self.with_path(relative),
            None => self.clone(),
        }
    }
}

fn load_geometry(source: &MeshSource) -> Result<GeometryBuffer, LoadError> {
    match source {
        MeshSource::Obj { path, model } => load_obj(path, model.as_deref()),
        MeshSource::Asset(path) => Ok(read_mesh_asset(path)?),
        MeshSource::Inline {
            positions,
            normals,
            uvs,
            indices,
        } => Ok(GeometryBuffer::new(
            positions.clone(),
            normals.clone(),
            uvs.clone(),
            indices.clone(),
        )),
    }
}

fn load_obj(path: &Path, model: Option<&str>) -> Result<GeometryBuffer, LoadError> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|source| LoadError::Obj {
        path: path.to_path_buf(),
        source,
    })?;

    let found = match model {
        Some(name) => models.iter().find(|m| m.name == name),
        None => models.first(),
    };
    let Some(found) = found else {
        return Err(LoadError::MissingModel {
            path: path.to_path_buf(),
            model: model.unwrap_or_default().to_string(),
        });
    };
    log::debug!(
        "Loaded model {:?} from {:?} ({} of {} in file)",
        found.name,
        path,
        found.mesh.positions.len() / 3,
        models.len()
    );

    let mesh = &found.mesh;
    Ok(GeometryBuffer::from_flat(
        &mesh.positions,
        &mesh.normals,
        &mesh.texcoords,
        &mesh.indices,
    ))
}

struct NameTables<'a> {
    meshes: &'a FxHashMap<&'a str, MeshId>,
    materials: &'a FxHashMap<&'a str, MaterialId>,
}

impl NameTables<'_> {
    fn mesh(&self, node: &NodeDescription) -> Result<Option<MeshId>, LoadError> {
        node.mesh
            .as_deref()
            .map(|name| {
                self.meshes
                    .get(name)
                    .copied()
                    .ok_or_else(|| LoadError::UnknownMesh {
                        node: node.name.clone(),
                        mesh: name.to_string(),
                    })
            })
            .transpose()
    }

    fn materials(&self, node: &NodeDescription) -> Result<Vec<MaterialId>, LoadError> {
        node.materials
            .iter()
            .map(|name| {
                self.materials
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| LoadError::UnknownMaterial {
                        node: node.name.clone(),
                        material: name.clone(),
                    })
            })
            .collect()
    }

    fn prefab_node(&self, node: &NodeDescription) -> Result<PrefabNode, LoadError> {
        Ok(PrefabNode {
            name: node.name.clone(),
            transform: node.transform.into(),
            mesh: self.mesh(node)?,
            materials: self.materials(node)?,
            children: node
                .children
                .iter()
                .map(|child| self.prefab_node(child))
                .collect::<Result<_, _>>()?,
        })
    }

    fn spawn(
        &self,
        graph: &mut SceneGraph,
        parent: Option<SceneNodeId>,
        node: &NodeDescription,
    ) -> Result<SceneNodeId, LoadError> {
        let mut scene_node = SceneNode::new(node.name.clone(), node.transform.into())
            .with_materials(self.materials(node)?);
        if let Some(mesh) = self.mesh(node)? {
            scene_node = scene_node.with_mesh(mesh);
        }
        if node.prefab_instance {
            scene_node = scene_node.as_prefab_instance();
        }
        let id = graph.add_node(parent, scene_node)?;
        for child in &node.children {
            self.spawn(graph, Some(id), child)?;
        }
        Ok(id)
    }
}

struct Describer<'a> {
    assets: &'a AssetStore,
    mesh_names: &'a FxHashMap<MeshId, String>,
}

impl Describer<'_> {
    fn material_names(&self, materials: &[MaterialId]) -> Vec<String> {
        materials
            .iter()
            .filter_map(|&id| self.assets.material(id))
            .map(|m| m.name.clone())
            .collect()
    }

    fn scene_node(&self, graph: &SceneGraph, id: SceneNodeId) -> NodeDescription {
        let Some(node) = graph.node(id) else {
            return NodeDescription::default();
        };
        NodeDescription {
            name: node.name().to_string(),
            transform: node.local_transform().into(),
            mesh: node.mesh().and_then(|m| self.mesh_names.get(&m).cloned()),
            materials: self.material_names(node.materials()),
            prefab_instance: node.is_prefab_instance(),
            children: node
                .children()
                .iter()
                .map(|&child| self.scene_node(graph, child))
                .collect(),
        }
    }

    fn prefab_node(&self, node: &PrefabNode) -> NodeDescription {
        NodeDescription {
            name: node.name.clone(),
            transform: node.transform.into(),
            mesh: node.mesh.and_then(|m| self.mesh_names.get(&m).cloned()),
            materials: self.material_names(&node.materials),
            prefab_instance: false,
            children: node
                .children
                .iter()
                .map(|child| self.prefab_node(child))
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("RON error in {0:?}: {1}")]
    Ron(PathBuf, String),
    #[error("Couldn't load OBJ {path:?}: {source}")]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },
    #[error("No model {model:?} in {path:?}")]
    MissingModel { path: PathBuf, model: String },
    #[error(transparent)]
    MeshFile(#[from] MeshFileError),
    #[error("Mesh {mesh:?}: {source}")]
    InvalidMesh {
        mesh: String,
        #[source]
        source: GeometryError,
    },
    #[error("Node {node:?} uses unknown mesh {mesh:?}")]
    UnknownMesh { node: String, mesh: String },
    #[error("Node {node:?} uses unknown material {material:?}")]
    UnknownMaterial { node: String, material: String },
    #[error(transparent)]
    Scene(#[from] SceneError),
}
