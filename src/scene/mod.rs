pub mod host;
pub mod node;
pub mod spatial_transform;
pub mod undo;

use cgmath::{Matrix4, SquareMatrix};
use slotmap::SlotMap;
use thiserror::Error;

use crate::assets::geometry::GeometryBuffer;
use crate::assets::{AssetStore, MaterialId};
use crate::scene::{
    host::HierarchyHost,
    node::{SceneNode, SceneNodeId},
    spatial_transform::SpatialTransform,
};

const SCENE_ROOT_NAME: &str = "<scene root>";

/// The node hierarchy of a scene.
///
/// Nodes live in an arena and refer to each other by `SceneNodeId`.
/// A hidden root node parents every top-level node.
#[derive(Clone, Debug)]
pub struct SceneGraph {
    nodes: SlotMap<SceneNodeId, SceneNode>,
    root: SceneNodeId,
}

impl SceneGraph {
    /// Create an empty scene graph.
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(SceneNode::new(SCENE_ROOT_NAME, SpatialTransform::identity()));
        Self { nodes, root }
    }

    /// The hidden root node.
    pub fn root(&self) -> SceneNodeId {
        self.root
    }

    /// Number of nodes, not counting the hidden root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a node as the last child of `parent`, or at the top level if `parent` is `None`.
    pub fn add_node(
        &mut self,
        parent: Option<SceneNodeId>,
        node: SceneNode,
    ) -> Result<SceneNodeId, SceneError> {
        let parent = parent.unwrap_or(self.root);
        let index = self
            .nodes
            .get(parent)
            .ok_or(SceneError::InvalidParent(parent))?
            .children()
            .len();
        self.insert_node_at(Some(parent), index, node)
    }

    /// Add a node as a child of `parent` at `index` among its siblings.
    ///
    /// The index is clamped to the number of existing children.
    pub fn insert_node_at(
        &mut self,
        parent: Option<SceneNodeId>,
        index: usize,
        mut node: SceneNode,
    ) -> Result<SceneNodeId, SceneError> {
        let parent = parent.unwrap_or(self.root);
        if !self.nodes.contains_key(parent) {
            return Err(SceneError::InvalidParent(parent));
        }
        node.set_parent(Some(parent));
        node.children_mut().clear();
        let id = self.nodes.insert(node);
        let siblings = self.nodes[parent].children_mut();
        let index = index.min(siblings.len());
        siblings.insert(index, id);
        Ok(id)
    }

    /// Get the given node.
    pub fn node(&self, id: SceneNodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    /// Get the given node mutably.
    pub fn node_mut(&mut self, id: SceneNodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: SceneNodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes directly under the hidden root.
    pub fn top_level(&self) -> &[SceneNodeId] {
        self.nodes[self.root].children()
    }

    pub fn children(&self, id: SceneNodeId) -> &[SceneNodeId] {
        self.nodes.get(id).map(|n| n.children()).unwrap_or(&[])
    }

    /// The parent of a node. Top-level nodes report `None`.
    pub fn parent_of(&self, id: SceneNodeId) -> Option<SceneNodeId> {
        self.nodes
            .get(id)
            .and_then(|n| n.parent())
            .filter(|&p| p != self.root)
    }

    /// Position of a node among its siblings.
    pub fn sibling_index(&self, id: SceneNodeId) -> Option<usize> {
        let parent = self.nodes.get(id)?.parent()?;
        self.nodes[parent].children().iter().position(|&c| c == id)
    }

    /// Composes the local transforms from the scene root down to the node.
    pub fn world_matrix(&self, id: SceneNodeId) -> Option<Matrix4<f32>> {
        let mut matrix = Matrix4::identity();
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = self.nodes.get(cur)?;
            matrix = node.local_transform().to_matrix() * matrix;
            current = node.parent();
        }
        Some(matrix)
    }

    /// Remove a node and its whole subtree, returning how many nodes were removed.
    pub fn remove_subtree(&mut self, id: SceneNodeId) -> Result<usize, SceneError> {
        if id == self.root {
            return Err(SceneError::CannotRemoveRoot);
        }
        let parent = self
            .nodes
            .get(id)
            .ok_or(SceneError::NodeNotFound(id))?
            .parent();
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children_mut().retain(|&c| c != id);
        }
        let doomed = self.depth_first(id);
        for node in &doomed {
            self.nodes.remove(*node);
        }
        Ok(doomed.len())
    }

    /// Pre-order depth-first listing of the subtree at `from`, children in sibling order.
    pub fn depth_first(&self, from: SceneNodeId) -> Vec<SceneNodeId> {
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(cur) = stack.pop() {
            let Some(node) = self.nodes.get(cur) else {
                continue;
            };
            order.push(cur);
            stack.extend(node.children().iter().rev());
        }
        order
    }

    /// Every node except the hidden root, in depth-first order.
    pub fn all_nodes(&self) -> Vec<SceneNodeId> {
        let mut order = self.depth_first(self.root);
        order.remove(0);
        order
    }

    /// Returns `true` if `id` is `ancestor` or lies somewhere below it.
    pub fn is_descendant_of(&self, id: SceneNodeId, ancestor: SceneNodeId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.nodes.get(cur).and_then(|n| n.parent());
        }
        false
    }

    /// Returns `true` if the node or any of its ancestors is a prefab instance root.
    pub fn is_part_of_prefab_instance(&self, id: SceneNodeId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            let Some(node) = self.nodes.get(cur) else {
                return false;
            };
            if node.is_prefab_instance() {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// First node with the given name, in depth-first order.
    pub fn find_by_name(&self, name: &str) -> Option<SceneNodeId> {
        self.all_nodes()
            .into_iter()
            .find(|&id| self.nodes[id].name() == name)
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// A read-only snapshot pairing the hierarchy with the assets its nodes refer to.
#[derive(Clone, Copy)]
pub struct SceneView<'a> {
    pub graph: &'a SceneGraph,
    pub assets: &'a AssetStore,
}

impl<'a> SceneView<'a> {
    pub fn new(graph: &'a SceneGraph, assets: &'a AssetStore) -> Self {
        Self { graph, assets }
    }
}

impl HierarchyHost for SceneView<'_> {
    fn contains(&self, node: SceneNodeId) -> bool {
        node != self.graph.root() && self.graph.contains(node)
    }

    fn world_transform(&self, node: SceneNodeId) -> Option<Matrix4<f32>> {
        self.graph.world_matrix(node)
    }

    fn local_transform(&self, node: SceneNodeId) -> Option<SpatialTransform> {
        self.graph.node(node).map(|n| n.local_transform())
    }

    fn children(&self, node: SceneNodeId) -> &[SceneNodeId] {
        self.graph.children(node)
    }

    fn geometry_of(&self, node: SceneNodeId) -> Option<&GeometryBuffer> {
        let mesh = self.graph.node(node)?.mesh()?;
        self.assets.mesh(mesh)
    }

    fn materials_of(&self, node: SceneNodeId) -> &[MaterialId] {
        self.graph.node(node).map(|n| n.materials()).unwrap_or(&[])
    }

    fn parent_of(&self, node: SceneNodeId) -> Option<SceneNodeId> {
        self.graph.parent_of(node)
    }

    fn sibling_index(&self, node: SceneNodeId) -> Option<usize> {
        self.graph.sibling_index(node)
    }

    fn name_of(&self, node: SceneNodeId) -> Option<&str> {
        self.graph.node(node).map(|n| n.name())
    }
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Couldn't find scene node of ID {0:?}")]
    NodeNotFound(SceneNodeId),
    #[error("Parent node {0:?} is not part of the scene")]
    InvalidParent(SceneNodeId),
    #[error("The scene root can't be removed")]
    CannotRemoveRoot,
}
