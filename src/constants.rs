/// Largest vertex count a 16-bit index buffer can address.
pub const MAX_NARROW_INDEX_VERTICES: usize = u16::MAX as usize;

/// Suffix appended to a root's name when it is replaced by its combined mesh.
pub const COMBINED_SUFFIX: &str = "_Combined";

pub const MESH_ASSET_EXTENSION: &str = "mesh";
pub const DEFAULT_OUTPUT_FOLDER: &str = "CombinedMeshes";

pub const DEFAULT_UNDO_DEPTH: usize = 32;

pub const COMBINE_UNDO_LABEL: &str = "Combine Meshes";
pub const REPLACE_UNDO_LABEL: &str = "Replace Objects";
