use std::collections::VecDeque;

use crate::assets::model::{Prefab, PrefabNode};
use crate::assets::{MaterialId, MeshId};
use crate::constants::DEFAULT_UNDO_DEPTH;
use crate::scene::{
    SceneError, SceneGraph,
    host::{HierarchyMutator, Placement},
    node::{SceneNode, SceneNodeId},
};

/// A snapshot of the graph taken just before a labelled change.
#[derive(Clone, Debug)]
struct Revision {
    label: String,
    graph: SceneGraph,
}

/// Undo/redo stacks of whole-graph snapshots.
#[derive(Debug)]
pub struct UndoHistory {
    undo: VecDeque<Revision>,
    redo: Vec<Revision>,
    max_depth: usize,
}

impl UndoHistory {
    pub fn new() -> Self {
        Self::with_depth(DEFAULT_UNDO_DEPTH)
    }

    /// History that keeps at most `max_depth` undo steps.
    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Remember `graph` as the state to go back to, under `label`.
    pub fn record(&mut self, label: &str, graph: &SceneGraph) {
        self.redo.clear();
        if self.undo.len() == self.max_depth {
            self.undo.pop_front();
        }
        self.undo.push_back(Revision {
            label: label.to_string(),
            graph: graph.clone(),
        });
    }

    /// Restore the state before the last recorded change, returning its label.
    pub fn undo(&mut self, graph: &mut SceneGraph) -> Option<String> {
        let revision = self.undo.pop_back()?;
        let current = std::mem::replace(graph, revision.graph);
        self.redo.push(Revision {
            label: revision.label.clone(),
            graph: current,
        });
        Some(revision.label)
    }

    /// Re-apply the last undone change, returning its label.
    pub fn redo(&mut self, graph: &mut SceneGraph) -> Option<String> {
        let revision = self.redo.pop()?;
        let current = std::mem::replace(graph, revision.graph);
        self.undo.push_back(Revision {
            label: revision.label.clone(),
            graph: current,
        });
        Some(revision.label)
    }

    /// Put `graph` back to the last recorded state and forget that step.
    ///
    /// For edits that failed part way; unlike `undo`, nothing goes on the redo stack.
    pub fn revert_last(&mut self, graph: &mut SceneGraph) -> Option<String> {
        let revision = self.undo.pop_back()?;
        *graph = revision.graph;
        Some(revision.label)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies hierarchy edits to a graph, recording undo steps as it goes.
pub struct SceneEditor<'a> {
    graph: &'a mut SceneGraph,
    history: &'a mut UndoHistory,
}

impl<'a> SceneEditor<'a> {
    pub fn new(graph: &'a mut SceneGraph, history: &'a mut UndoHistory) -> Self {
        Self { graph, history }
    }

    fn spawn_prefab_node(
        &mut self,
        parent: SceneNodeId,
        template: &PrefabNode,
    ) -> Result<(), SceneError> {
        let id = self.graph.add_node(Some(parent), template.to_scene_node())?;
        for child in &template.children {
            self.spawn_prefab_node(id, child)?;
        }
        Ok(())
    }
}

impl HierarchyMutator for SceneEditor<'_> {
    fn instantiate_node(
        &mut self,
        placement: &Placement,
        mesh: MeshId,
        material: Option<MaterialId>,
    ) -> Result<SceneNodeId, SceneError> {
        let node = SceneNode::new(placement.name.clone(), placement.local_transform())
            .with_mesh(mesh)
            .with_materials(material.into_iter().collect());
        self.graph
            .insert_node_at(placement.parent, placement.sibling_index, node)
    }

    fn instantiate_prefab(
        &mut self,
        prefab: &Prefab,
        placement: &Placement,
    ) -> Result<SceneNodeId, SceneError> {
        let mut root = prefab.root.to_scene_node().as_prefab_instance();
        root.set_name(placement.name.clone());
        root.update_local_transform(|t| *t = placement.local_transform());
        let id = self
            .graph
            .insert_node_at(placement.parent, placement.sibling_index, root)?;
        for child in &prefab.root.children {
            self.spawn_prefab_node(id, child)?;
        }
        Ok(id)
    }

    fn remove_node(&mut self, node: SceneNodeId) -> Result<(), SceneError> {
        self.graph.remove_subtree(node).map(|_| ())
    }

    fn record_undoable_change(&mut self, label: &str) {
        self.history.record(label, self.graph);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::spatial_transform::SpatialTransform;

    fn graph_with(names: &[&str]) -> SceneGraph {
        let mut graph = SceneGraph::new();
        for name in names {
            graph
                .add_node(None, SceneNode::new(*name, SpatialTransform::identity()))
                .unwrap();
        }
        graph
    }

    fn names(graph: &SceneGraph) -> Vec<String> {
        graph
            .all_nodes()
            .into_iter()
            .map(|id| graph.node(id).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn undo_and_redo_swap_snapshots() {
        let mut graph = graph_with(&["a", "b"]);
        let mut history = UndoHistory::new();

        let a = graph.find_by_name("a").unwrap();
        SceneEditor::new(&mut graph, &mut history).record_undoable_change("Remove a");
        graph.remove_subtree(a).unwrap();
        assert_eq!(names(&graph), vec!["b"]);

        assert_eq!(history.undo(&mut graph).as_deref(), Some("Remove a"));
        assert_eq!(names(&graph), vec!["a", "b"]);
        assert!(graph.contains(a));

        assert_eq!(history.redo(&mut graph).as_deref(), Some("Remove a"));
        assert_eq!(names(&graph), vec!["b"]);
        assert!(!history.can_redo());
    }

    #[test]
    fn new_record_clears_redo() {
        let mut graph = graph_with(&["a"]);
        let mut history = UndoHistory::new();
        history.record("first", &graph);
        history.undo(&mut graph);
        assert!(history.can_redo());

        history.record("second", &graph);
        assert!(!history.can_redo());
        assert_eq!(history.undo(&mut graph).as_deref(), Some("second"));
    }

    #[test]
    fn revert_last_restores_graph_without_leaving_a_step() {
        let mut graph = graph_with(&["a", "b"]);
        let mut history = UndoHistory::new();
        history.record("Combine Meshes", &graph);
        let a = graph.find_by_name("a").unwrap();
        graph.remove_subtree(a).unwrap();

        assert_eq!(history.revert_last(&mut graph).as_deref(), Some("Combine Meshes"));
        assert_eq!(names(&graph), vec!["a", "b"]);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert_eq!(history.revert_last(&mut graph), None);
    }

    #[test]
    fn depth_is_capped() {
        let mut graph = graph_with(&[]);
        let mut history = UndoHistory::with_depth(2);
        for label in ["one", "two", "three"] {
            history.record(label, &graph);
        }
        assert_eq!(history.undo(&mut graph).as_deref(), Some("three"));
        assert_eq!(history.undo(&mut graph).as_deref(), Some("two"));
        assert_eq!(history.undo(&mut graph), None);
    }

    #[test]
    fn prefab_instances_get_placement_name_and_flag() {
        let mut graph = graph_with(&["first", "second"]);
        let mut history = UndoHistory::new();
        let prefab = Prefab {
            name: "chair".into(),
            root: PrefabNode {
                name: "chair_root".into(),
                transform: SpatialTransform::identity(),
                mesh: None,
                materials: vec![],
                children: vec![PrefabNode {
                    name: "seat".into(),
                    transform: SpatialTransform::identity(),
                    mesh: None,
                    materials: vec![],
                    children: vec![],
                }],
            },
        };
        let placement = Placement {
            name: "Chair#1".into(),
            position: [1.0, 2.0, 3.0].into(),
            rotation: SpatialTransform::identity().rotation,
            scale: [1.0, 1.0, 1.0].into(),
            parent: None,
            sibling_index: 1,
        };

        let id = SceneEditor::new(&mut graph, &mut history)
            .instantiate_prefab(&prefab, &placement)
            .unwrap();

        assert_eq!(names(&graph), vec!["first", "Chair#1", "seat", "second"]);
        let node = graph.node(id).unwrap();
        assert!(node.is_prefab_instance());
        assert_eq!(node.local_transform().position, placement.position);
    }
}
