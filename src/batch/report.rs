use std::fmt;

use crate::assets::MeshId;
use crate::assets::mesh_file::AssetHandle;
use crate::combine::CombineWarning;
use crate::scene::node::SceneNodeId;

/// A root that was replaced by its combined mesh.
#[derive(Clone, Debug)]
pub struct CombineOutcome {
    pub original: SceneNodeId,
    pub combined: SceneNodeId,
    pub name: String,
    pub mesh: MeshId,
    pub asset: AssetHandle,
    pub source_count: usize,
    pub warnings: Vec<CombineWarning>,
}

/// A placeholder node that was swapped for a prefab instance.
#[derive(Clone, Debug)]
pub struct ReplaceOutcome {
    pub original: SceneNodeId,
    pub instance: SceneNodeId,
    pub name: String,
    pub prefab: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// An earlier edit in the same batch already removed the node.
    AlreadyRemoved,
    /// The node belongs to a prefab instance and can't be taken apart.
    PrefabInstance,
    /// No mesh with vertices below the node.
    NothingToCombine,
    /// A mesh below the node is malformed.
    InvalidGeometry(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyRemoved => write!(f, "already removed"),
            SkipReason::PrefabInstance => write!(f, "part of a prefab instance"),
            SkipReason::NothingToCombine => write!(f, "nothing to combine"),
            SkipReason::InvalidGeometry(msg) => write!(f, "invalid geometry: {}", msg),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Skipped {
    pub node: SceneNodeId,
    pub name: Option<String>,
    pub reason: SkipReason,
}

/// What a batch run did.
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    pub combined: Vec<CombineOutcome>,
    pub replaced: Vec<ReplaceOutcome>,
    pub skipped: Vec<Skipped>,
}

impl BatchReport {
    /// Append another report's entries to this one.
    pub fn merge(&mut self, other: BatchReport) {
        self.combined.extend(other.combined);
        self.replaced.extend(other.replaced);
        self.skipped.extend(other.skipped);
    }

    /// Number of combined roots that came out without a material.
    pub fn missing_materials(&self) -> usize {
        self.combined
            .iter()
            .filter(|c| {
                c.warnings
                    .iter()
                    .any(|w| matches!(w, CombineWarning::MissingMaterial { .. }))
            })
            .count()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} combined ({} without material), {} replaced, {} skipped",
            self.combined.len(),
            self.missing_materials(),
            self.replaced.len(),
            self.skipped.len()
        )
    }
}
