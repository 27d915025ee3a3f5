//! Picking the nodes a batch operation should work on.

use regex::Regex;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::scene::{SceneGraph, node::SceneNodeId};

/// How to pick nodes out of a scene.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionCriterion {
    /// Nodes whose name equals the string.
    ExactName(String),
    /// Nodes whose name matches the pattern anywhere.
    Regex(String),
    /// These nodes, in this order.
    ExplicitList(Vec<SceneNodeId>),
}

/// Resolves selection criteria against a scene graph.
pub struct ObjectSelector;

impl ObjectSelector {
    /// The nodes matching `criterion`, without duplicates.
    ///
    /// Name and regex matches come back in depth-first order. Explicit lists keep their
    /// own order and silently drop nodes that are no longer in the graph.
    pub fn resolve(
        graph: &SceneGraph,
        criterion: &SelectionCriterion,
    ) -> Result<Vec<SceneNodeId>, SelectError> {
        let selected = match criterion {
            SelectionCriterion::ExactName(name) => Self::filter(graph, |n| n == name),
            SelectionCriterion::Regex(pattern) => {
                if pattern.is_empty() {
                    return Err(SelectError::EmptyPattern);
                }
                let regex = Regex::new(pattern).map_err(|source| SelectError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
                Self::filter(graph, |n| regex.is_match(n))
            }
            SelectionCriterion::ExplicitList(nodes) => {
                let mut seen = FxHashSet::default();
                nodes
                    .iter()
                    .copied()
                    .filter(|&id| id != graph.root() && graph.contains(id))
                    .filter(|&id| seen.insert(id))
                    .collect()
            }
        };
        log::debug!("{:?} selected {} node(s)", criterion, selected.len());
        Ok(selected)
    }

    fn filter(graph: &SceneGraph, mut matches: impl FnMut(&str) -> bool) -> Vec<SceneNodeId> {
        graph
            .all_nodes()
            .into_iter()
            .filter(|&id| graph.node(id).is_some_and(|n| matches(n.name())))
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("Regex pattern cannot be empty")]
    EmptyPattern,
    #[error("Invalid regex pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{node::SceneNode, spatial_transform::SpatialTransform};

    fn scene(names: &[(&str, Option<usize>)]) -> (SceneGraph, Vec<SceneNodeId>) {
        let mut graph = SceneGraph::new();
        let mut ids: Vec<SceneNodeId> = Vec::new();
        for (name, parent) in names {
            let parent = parent.map(|p| ids[p]);
            let id = graph
                .add_node(parent, SceneNode::new(*name, SpatialTransform::identity()))
                .unwrap();
            ids.push(id);
        }
        (graph, ids)
    }

    #[test]
    fn exact_name_matches_whole_names_in_depth_first_order() {
        let (graph, ids) = scene(&[
            ("reja 1", None),
            ("Chair", Some(0)),
            ("Chair#1", None),
            ("Chair", None),
        ]);
        let selected =
            ObjectSelector::resolve(&graph, &SelectionCriterion::ExactName("Chair".into()))
                .unwrap();
        assert_eq!(selected, vec![ids[1], ids[3]]);
    }

    #[test]
    fn regex_matches_like_the_editor_tool() {
        let (graph, ids) = scene(&[
            ("barandilla metal 3", None),
            ("barandilla metal 3#2 7", None),
            ("reja 12", None),
            ("puerta", None),
            ("reja 4 9", Some(3)),
        ]);
        let pattern = r"^(barandilla metal \d+(#\d+)?(\s+\d+)?)|(reja \d+(\s+\d+)?)$";
        let selected =
            ObjectSelector::resolve(&graph, &SelectionCriterion::Regex(pattern.into())).unwrap();
        assert_eq!(selected, vec![ids[0], ids[1], ids[2], ids[4]]);
    }

    #[test]
    fn bad_patterns_are_errors() {
        let (graph, _) = scene(&[("a", None)]);
        assert!(matches!(
            ObjectSelector::resolve(&graph, &SelectionCriterion::Regex(String::new())),
            Err(SelectError::EmptyPattern)
        ));
        assert!(matches!(
            ObjectSelector::resolve(&graph, &SelectionCriterion::Regex("(unclosed".into())),
            Err(SelectError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn explicit_lists_keep_order_and_drop_stale_ids() {
        let (mut graph, ids) = scene(&[("a", None), ("b", None), ("c", None)]);
        graph.remove_subtree(ids[1]).unwrap();
        let criterion =
            SelectionCriterion::ExplicitList(vec![ids[2], ids[1], graph.root(), ids[0], ids[2]]);
        assert_eq!(
            ObjectSelector::resolve(&graph, &criterion).unwrap(),
            vec![ids[2], ids[0]]
        );
    }
}
