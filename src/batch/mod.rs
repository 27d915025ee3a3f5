//! Applying combines and replacements to a whole scene, with undo.

pub mod report;

use std::path::PathBuf;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::assets::mesh_file::{AssetSink, MeshFileError};
use crate::assets::{AssetStore, MeshId, PrefabId};
use crate::batch::report::{BatchReport, CombineOutcome, ReplaceOutcome, SkipReason, Skipped};
use crate::combine::{CombineError, CombineWarning, IndexWidthPolicy, MeshCombiner};
use crate::config::BatchConfig;
use crate::constants::{
    COMBINE_UNDO_LABEL, DEFAULT_OUTPUT_FOLDER, MESH_ASSET_EXTENSION, REPLACE_UNDO_LABEL,
};
use crate::scene::{
    SceneError, SceneGraph, SceneView,
    host::{HierarchyMutator, Placement},
    node::SceneNodeId,
    undo::{SceneEditor, UndoHistory},
};
use crate::select::{ObjectSelector, SelectError, SelectionCriterion};

/// Settings shared by every operation of a runner.
#[derive(Clone, Debug)]
pub struct BatchOptions {
    pub output_folder: PathBuf,
    pub index_width: IndexWidthPolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_folder: PathBuf::from(DEFAULT_OUTPUT_FOLDER),
            index_width: IndexWidthPolicy::Auto,
        }
    }
}

/// Owns a scene while batch edits are applied to it.
pub struct BatchRunner<S: AssetSink> {
    graph: SceneGraph,
    assets: AssetStore,
    history: UndoHistory,
    sink: S,
    options: BatchOptions,
    asset_paths: FxHashMap<MeshId, PathBuf>,
    written: FxHashSet<PathBuf>,
}

impl<S: AssetSink> BatchRunner<S> {
    pub fn new(graph: SceneGraph, assets: AssetStore, sink: S) -> Self {
        Self {
            graph,
            assets,
            history: UndoHistory::new(),
            sink,
            options: BatchOptions::default(),
            asset_paths: FxHashMap::default(),
            written: FxHashSet::default(),
        }
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    /// Where each combined mesh was written.
    pub fn asset_paths(&self) -> &FxHashMap<MeshId, PathBuf> {
        &self.asset_paths
    }

    pub fn into_parts(self) -> (SceneGraph, AssetStore, FxHashMap<MeshId, PathBuf>) {
        (self.graph, self.assets, self.asset_paths)
    }

    /// Run every job of a batch file: combines first, then replacements.
    pub fn run(&mut self, config: &BatchConfig) -> Result<BatchReport, BatchError> {
        self.options = BatchOptions {
            output_folder: config.output_folder.clone(),
            index_width: config.index_width,
        };
        // Resolve every prefab up front so a typo doesn't leave the batch half done.
        let prefabs = config
            .replace
            .iter()
            .map(|job| {
                self.assets
                    .prefab_by_name(&job.prefab)
                    .ok_or_else(|| BatchError::UnknownPrefab(job.prefab.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = BatchReport::default();
        for rule in &config.combine {
            let criterion = rule.to_criterion(&self.graph);
            report.merge(self.combine_matching(&criterion)?);
        }
        for (job, prefab) in config.replace.iter().zip(prefabs) {
            let criterion = job.select.to_criterion(&self.graph);
            report.merge(self.replace_matching(&criterion, prefab)?);
        }
        log::info!("Batch finished: {}", report);
        Ok(report)
    }

    /// Combine every root picked by `criterion`, skipping the ones that can't be combined.
    pub fn combine_matching(
        &mut self,
        criterion: &SelectionCriterion,
    ) -> Result<BatchReport, BatchError> {
        let roots = ObjectSelector::resolve(&self.graph, criterion)?;
        let mut report = BatchReport::default();
        for root in roots {
            let name = self.node_name(root);
            let reason = match self.combine_root(root) {
                Ok(outcome) => {
                    report.combined.push(outcome);
                    continue;
                }
                Err(BatchError::PrefabInstance(_)) => SkipReason::PrefabInstance,
                Err(BatchError::Combine(CombineError::InvalidRoot(_))) => {
                    SkipReason::AlreadyRemoved
                }
                Err(BatchError::Combine(CombineError::EmptyInput { .. })) => {
                    SkipReason::NothingToCombine
                }
                Err(BatchError::Combine(err)) => SkipReason::InvalidGeometry(err.to_string()),
                Err(err) => return Err(err),
            };
            match reason {
                SkipReason::AlreadyRemoved => log::debug!("Skipping {:?}: {}", root, reason),
                _ => log::warn!("Skipping {:?}: {}", name.as_deref().unwrap_or("?"), reason),
            }
            report.skipped.push(Skipped {
                node: root,
                name,
                reason,
            });
        }
        Ok(report)
    }

    /// Combine the meshes below `root`, write the result to disk and put it in `root`'s place.
    ///
    /// Nothing in the scene changes unless the asset was written.
    pub fn combine_root(&mut self, root: SceneNodeId) -> Result<CombineOutcome, BatchError> {
        if self.graph.is_part_of_prefab_instance(root) {
            let name = self.node_name(root).unwrap_or_default();
            return Err(BatchError::PrefabInstance(name));
        }

        let combiner = MeshCombiner::with_policy(self.options.index_width);
        let result = combiner.combine(&SceneView::new(&self.graph, &self.assets), root)?;
        let name = result.placement.name.clone();
        for warning in &result.warnings {
            match warning {
                CombineWarning::MissingMaterial { .. } => log::warn!(
                    "No material found below {:?}; {:?} will have none",
                    self.node_name(root).unwrap_or_default(),
                    name
                ),
            }
        }

        let asset_path = self.unused_asset_path(&name);
        let asset = self.sink.create_durable_asset(&result.geometry, &asset_path)?;
        self.written.insert(asset_path);
        let mesh = self.assets.add_mesh(name.clone(), result.geometry);

        let placement = &result.placement;
        let material = result.material;
        let edited = self.edit(COMBINE_UNDO_LABEL, |editor| {
            let combined = editor.instantiate_node(placement, mesh, material)?;
            editor.remove_node(root)?;
            Ok(combined)
        });
        let combined = match edited {
            Ok(combined) => combined,
            Err(err) => {
                self.assets.remove_mesh(mesh);
                log::warn!("{:?} was written but is not used by the scene", asset.path);
                return Err(err.into());
            }
        };
        self.asset_paths.insert(mesh, asset.path.clone());

        log::info!(
            "Combined {} mesh(es) into {:?} ({} vertices, {}-bit indices)",
            result.source_count,
            name,
            self.assets.mesh(mesh).map_or(0, |g| g.vertex_count()),
            self.assets.mesh(mesh).map_or(0, |g| g.indices.format().bits()),
        );

        Ok(CombineOutcome {
            original: root,
            combined,
            name,
            mesh,
            asset,
            source_count: result.source_count,
            warnings: result.warnings,
        })
    }

    /// Replace every node picked by `criterion` with a new instance of `prefab`.
    ///
    /// Replacements keep the original's name, local transform, parent and sibling index.
    pub fn replace_matching(
        &mut self,
        criterion: &SelectionCriterion,
        prefab: PrefabId,
    ) -> Result<BatchReport, BatchError> {
        let template = self
            .assets
            .prefab(prefab)
            .cloned()
            .ok_or_else(|| BatchError::UnknownPrefab(format!("{:?}", prefab)))?;
        let targets = ObjectSelector::resolve(&self.graph, criterion)?;

        let mut report = BatchReport::default();
        for node in targets {
            let placement = Placement::of(&SceneView::new(&self.graph, &self.assets), node);
            let Some(placement) = placement else {
                log::debug!("Skipping {:?}: {}", node, SkipReason::AlreadyRemoved);
                report.skipped.push(Skipped {
                    node,
                    name: None,
                    reason: SkipReason::AlreadyRemoved,
                });
                continue;
            };

            let instance = self.edit(REPLACE_UNDO_LABEL, |editor| {
                editor.remove_node(node)?;
                editor.instantiate_prefab(&template, &placement)
            })?;

            log::info!("Replaced {:?} with prefab {:?}", placement.name, template.name);
            report.replaced.push(ReplaceOutcome {
                original: node,
                instance,
                name: placement.name,
                prefab: template.name.clone(),
            });
        }
        Ok(report)
    }

    /// Undo the last edit, returning its label.
    pub fn undo(&mut self) -> Option<String> {
        self.history.undo(&mut self.graph)
    }

    /// Redo the last undone edit, returning its label.
    pub fn redo(&mut self) -> Option<String> {
        self.history.redo(&mut self.graph)
    }

    /// Run `apply` as one undoable step. If it fails, the graph goes back to how it was and
    /// the step is dropped.
    fn edit<T>(
        &mut self,
        label: &str,
        apply: impl FnOnce(&mut SceneEditor<'_>) -> Result<T, SceneError>,
    ) -> Result<T, SceneError> {
        let mut editor = SceneEditor::new(&mut self.graph, &mut self.history);
        editor.record_undoable_change(label);
        let applied = apply(&mut editor);
        if applied.is_err() {
            self.history.revert_last(&mut self.graph);
        }
        applied
    }

    /// Roots that share a name must not overwrite each other's assets.
    fn unused_asset_path(&self, name: &str) -> PathBuf {
        let stem = asset_file_stem(name);
        let mut path = self
            .options
            .output_folder
            .join(format!("{}.{}", stem, MESH_ASSET_EXTENSION));
        let mut n = 1;
        while self.written.contains(&path) {
            n += 1;
            path = self
                .options
                .output_folder
                .join(format!("{} {}.{}", stem, n, MESH_ASSET_EXTENSION));
        }
        path
    }

    fn node_name(&self, node: SceneNodeId) -> Option<String> {
        self.graph.node(node).map(|n| n.name().to_string())
    }
}

/// Node names may contain characters that are not allowed in file names.
fn asset_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("{0:?} is part of a prefab instance and can't be combined")]
    PrefabInstance(String),
    #[error("Unknown prefab {0:?}")]
    UnknownPrefab(String),
    #[error(transparent)]
    Combine(#[from] CombineError),
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("Couldn't write combined mesh: {0}")]
    Asset(#[from] MeshFileError),
}
