use crate::assets::{MaterialId, MeshId};
use crate::scene::{node::SceneNode, spatial_transform::SpatialTransform};

/// A material; only its name matters to scene cleanup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Material {
    pub name: String,
}

/// A named mesh in the asset store.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub name: String,
    pub geometry: crate::assets::geometry::GeometryBuffer,
}

/// A reusable node template, instantiated as a fresh subtree.
#[derive(Clone, Debug)]
pub struct Prefab {
    pub name: String,
    pub root: PrefabNode,
}

/// One node of a prefab template.
#[derive(Clone, Debug)]
pub struct PrefabNode {
    pub name: String,
    pub transform: SpatialTransform,
    pub mesh: Option<MeshId>,
    pub materials: Vec<MaterialId>,
    pub children: Vec<PrefabNode>,
}

impl PrefabNode {
    /// A detached scene node with this template's data, without its children.
    pub fn to_scene_node(&self) -> SceneNode {
        let node = SceneNode::new(self.name.clone(), self.transform)
            .with_materials(self.materials.clone());
        match self.mesh {
            Some(mesh) => node.with_mesh(mesh),
            None => node,
        }
    }

    /// Number of nodes in this template, including itself.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(PrefabNode::node_count).sum::<usize>()
    }
}
