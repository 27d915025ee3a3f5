use cgmath::{Matrix4, Quaternion, Vector3};

use crate::assets::geometry::GeometryBuffer;
use crate::assets::model::Prefab;
use crate::assets::{MaterialId, MeshId};
use crate::scene::node::SceneNodeId;
use crate::scene::spatial_transform::SpatialTransform;
use crate::scene::SceneError;

/// Read-only access to a hierarchy snapshot.
pub trait HierarchyHost {
    /// Returns `true` if the node exists in this snapshot.
    fn contains(&self, node: SceneNodeId) -> bool;

    /// The node's transform relative to the scene root.
    fn world_transform(&self, node: SceneNodeId) -> Option<Matrix4<f32>>;

    fn local_transform(&self, node: SceneNodeId) -> Option<SpatialTransform>;

    /// Children in sibling order; empty for unknown nodes.
    fn children(&self, node: SceneNodeId) -> &[SceneNodeId];

    /// The geometry attached to the node, if it has a mesh that resolves.
    fn geometry_of(&self, node: SceneNodeId) -> Option<&GeometryBuffer>;

    /// The node's materials; empty if it has none.
    fn materials_of(&self, node: SceneNodeId) -> &[MaterialId];

    /// The node's parent. `None` for top-level nodes.
    fn parent_of(&self, node: SceneNodeId) -> Option<SceneNodeId>;

    fn sibling_index(&self, node: SceneNodeId) -> Option<usize>;

    fn name_of(&self, node: SceneNodeId) -> Option<&str>;
}

/// Where a node sits in the hierarchy.
///
/// Copying a placement onto a new node under the same parent
/// puts it exactly where the original was.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub name: String,
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
    pub parent: Option<SceneNodeId>,
    pub sibling_index: usize,
}

impl Placement {
    /// Capture the placement of `node`.
    pub fn of<H: HierarchyHost + ?Sized>(host: &H, node: SceneNodeId) -> Option<Self> {
        let local = host.local_transform(node)?;
        Some(Self {
            name: host.name_of(node)?.to_string(),
            position: local.position,
            rotation: local.rotation,
            scale: local.scale,
            parent: host.parent_of(node),
            sibling_index: host.sibling_index(node)?,
        })
    }

    /// Same placement under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The local transform described by this placement.
    pub fn local_transform(&self) -> SpatialTransform {
        SpatialTransform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}

/// Write access to a hierarchy, used after a combine to apply its result.
pub trait HierarchyMutator {
    /// Create a node holding `mesh` at `placement`.
    fn instantiate_node(
        &mut self,
        placement: &Placement,
        mesh: MeshId,
        material: Option<MaterialId>,
    ) -> Result<SceneNodeId, SceneError>;

    /// Create a fresh copy of `prefab` at `placement`.
    fn instantiate_prefab(
        &mut self,
        prefab: &Prefab,
        placement: &Placement,
    ) -> Result<SceneNodeId, SceneError>;

    /// Remove the node and everything below it.
    fn remove_node(&mut self, node: SceneNodeId) -> Result<(), SceneError>;

    /// Remember the current state so the next edits can be undone under `label`.
    fn record_undoable_change(&mut self, label: &str);
}
