use crate::assets::{MaterialId, MeshId};
use crate::scene::spatial_transform::SpatialTransform;
use slotmap::new_key_type;

new_key_type! {
    /// Used to reference a `SceneNode`.
    pub struct SceneNodeId;
}

/// A node in the scene graph.
///
/// Holds its place in the hierarchy, its transform relative to the parent,
/// and optionally the mesh and materials rendered at it.
#[derive(Clone, Debug)]
pub struct SceneNode {
    name: String,
    parent: Option<SceneNodeId>,
    children: Vec<SceneNodeId>,
    local_transform: SpatialTransform,
    mesh: Option<MeshId>,
    materials: Vec<MaterialId>,
    prefab_instance: bool,
}

impl SceneNode {
    /// Create a new, detached scene node.
    pub fn new(name: impl Into<String>, local_transform: SpatialTransform) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: vec![],
            local_transform,
            mesh: None,
            materials: vec![],
            prefab_instance: false,
        }
    }

    /// Attach a mesh to the node.
    pub fn with_mesh(mut self, mesh: MeshId) -> Self {
        self.mesh = Some(mesh);
        self
    }

    /// Set the node's materials.
    pub fn with_materials(mut self, materials: Vec<MaterialId>) -> Self {
        self.materials = materials;
        self
    }

    /// Mark the node as the root of a prefab instance.
    pub fn as_prefab_instance(mut self) -> Self {
        self.prefab_instance = true;
        self
    }

    /// Get the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the node.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Get the parent of the node.
    pub fn parent(&self) -> Option<SceneNodeId> {
        self.parent
    }

    /// Get the children.
    pub fn children(&self) -> &[SceneNodeId] {
        &self.children
    }

    /// Get the local transform.
    pub fn local_transform(&self) -> SpatialTransform {
        self.local_transform
    }

    /// Get the attached mesh, if any.
    pub fn mesh(&self) -> Option<MeshId> {
        self.mesh
    }

    /// Get the materials.
    pub fn materials(&self) -> &[MaterialId] {
        &self.materials
    }

    /// Returns `true` if this node is the root of a prefab instance.
    pub fn is_prefab_instance(&self) -> bool {
        self.prefab_instance
    }

    /// Update the node's local transform.
    pub fn update_local_transform<F>(&mut self, mut update: F)
    where
        F: FnMut(&mut SpatialTransform),
    {
        update(&mut self.local_transform);
    }

    /// Set a new parent. Only for the graph to use.
    pub(super) fn set_parent(&mut self, parent: Option<SceneNodeId>) {
        self.parent = parent;
    }

    /// Mutable access to the children. Only for the graph to use.
    pub(super) fn children_mut(&mut self) -> &mut Vec<SceneNodeId> {
        &mut self.children
    }
}
