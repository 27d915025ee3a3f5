pub mod assets;
pub mod batch;
pub mod combine;
pub mod config;
pub mod constants;
pub mod resources;
pub mod scene;
pub mod select;

pub use batch::{BatchError, BatchOptions, BatchRunner, report::BatchReport};
pub use combine::{CombineError, CombinedResult, IndexWidthPolicy, MeshCombiner};
pub use config::BatchConfig;
pub use scene::{SceneGraph, SceneView};
pub use select::{ObjectSelector, SelectionCriterion};
