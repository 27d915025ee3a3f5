//! Batch job files (`*.batch.ron`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::combine::IndexWidthPolicy;
use crate::constants::DEFAULT_OUTPUT_FOLDER;
use crate::scene::SceneGraph;
use crate::select::SelectionCriterion;

/// Which nodes a job applies to, as written in a batch file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionRule {
    ExactName(String),
    Regex(String),
    /// Node names; each picks the first node with that name.
    Named(Vec<String>),
}

impl SelectionRule {
    /// Turn the rule into a criterion for `graph`. Names that match nothing are dropped.
    pub fn to_criterion(&self, graph: &SceneGraph) -> SelectionCriterion {
        match self {
            SelectionRule::ExactName(name) => SelectionCriterion::ExactName(name.clone()),
            SelectionRule::Regex(pattern) => SelectionCriterion::Regex(pattern.clone()),
            SelectionRule::Named(names) => SelectionCriterion::ExplicitList(
                names
                    .iter()
                    .filter_map(|name| {
                        let found = graph.find_by_name(name);
                        if found.is_none() {
                            log::warn!("No node named {:?} in the scene", name);
                        }
                        found
                    })
                    .collect(),
            ),
        }
    }
}

/// Swap every node picked by `select` for a fresh instance of `prefab`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceJob {
    pub select: SelectionRule,
    pub prefab: String,
}

/// One batch run: what to combine, what to replace, and where assets go.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Folder for combined mesh assets, relative to the asset root.
    pub output_folder: PathBuf,
    pub index_width: IndexWidthPolicy,
    pub combine: Vec<SelectionRule>,
    pub replace: Vec<ReplaceJob>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            output_folder: PathBuf::from(DEFAULT_OUTPUT_FOLDER),
            index_width: IndexWidthPolicy::Auto,
            combine: vec![],
            replace: vec![],
        }
    }
}

impl BatchConfig {
    /// Read a batch file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron(&text)?;
        log::debug!(
            "Loaded batch {:?}: {} combine job(s), {} replace job(s)",
            path,
            config.combine.len(),
            config.replace.len()
        );
        Ok(config)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(|e| ConfigError::Ron(e.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O while reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("RON parse error: {0}")]
    Ron(String),
}
