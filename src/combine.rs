//! Merging every mesh below a root node into one buffer in the root's local frame.

use cgmath::{InnerSpace, Matrix4, Point3, SquareMatrix, Transform, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assets::MaterialId;
use crate::assets::geometry::{GeometryBuffer, GeometryError, IndexBuffer, IndexFormat};
use crate::constants::COMBINED_SUFFIX;
use crate::scene::host::{HierarchyHost, Placement};
use crate::scene::node::SceneNodeId;
use crate::scene::spatial_transform::{linear_part, normal_matrix};

/// How the merged buffer's index width is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexWidthPolicy {
    /// 16-bit unless the merged vertex count needs more.
    #[default]
    Auto,
    /// Always 32-bit.
    AlwaysWide,
}

/// One mesh to merge, with the matrix taking it into the root's local space.
#[derive(Clone, Copy, Debug)]
pub struct CombineSource<'a> {
    pub node: SceneNodeId,
    pub geometry: &'a GeometryBuffer,
    pub local_to_root: Matrix4<f32>,
}

/// Everything gathered from the hierarchy for one combine.
///
/// Sources are in traversal order, which is also the order of the merged buffer.
#[derive(Clone, Debug)]
pub struct CombineRequest<'a> {
    pub root: SceneNodeId,
    pub sources: Vec<CombineSource<'a>>,
    pub material: Option<MaterialId>,
}

impl CombineRequest<'_> {
    pub fn total_vertices(&self) -> usize {
        self.sources.iter().map(|s| s.geometry.vertex_count()).sum()
    }

    /// Index width for the merged buffer under `policy`.
    pub fn index_format(&self, policy: IndexWidthPolicy) -> IndexFormat {
        match policy {
            IndexWidthPolicy::Auto => IndexFormat::for_vertex_count(self.total_vertices()),
            IndexWidthPolicy::AlwaysWide => IndexFormat::U32,
        }
    }
}

/// Non-fatal findings reported alongside a combined mesh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CombineWarning {
    /// No node under the root carried a material.
    MissingMaterial { root: SceneNodeId },
}

/// The merged mesh, its material, and where it belongs in the hierarchy.
#[derive(Clone, Debug)]
pub struct CombinedResult {
    pub geometry: GeometryBuffer,
    pub material: Option<MaterialId>,
    pub placement: Placement,
    pub source_count: usize,
    pub warnings: Vec<CombineWarning>,
}

/// Merges the meshes of a subtree.
///
/// Reads the hierarchy through `HierarchyHost` and never modifies it.
#[derive(Clone, Copy, Debug, Default)]
pub struct MeshCombiner {
    policy: IndexWidthPolicy,
}

impl MeshCombiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: IndexWidthPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> IndexWidthPolicy {
        self.policy
    }

    /// Merge the meshes below `root` into one buffer expressed in `root`'s local space.
    pub fn combine<H: HierarchyHost + ?Sized>(
        &self,
        host: &H,
        root: SceneNodeId,
    ) -> Result<CombinedResult, CombineError> {
        let request = self.gather(host, root)?;
        let geometry = self.merge(&request)?;

        let placement = Placement::of(host, root).ok_or(CombineError::InvalidRoot(root))?;
        let name = format!("{}{}", placement.name, COMBINED_SUFFIX);

        let mut warnings = Vec::new();
        if request.material.is_none() {
            warnings.push(CombineWarning::MissingMaterial { root });
        }

        Ok(CombinedResult {
            geometry,
            material: request.material,
            placement: placement.renamed(name),
            source_count: request.sources.len(),
            warnings,
        })
    }

    /// Walk the subtree at `root` and collect the meshes to merge.
    pub fn gather<'h, H: HierarchyHost + ?Sized>(
        &self,
        host: &'h H,
        root: SceneNodeId,
    ) -> Result<CombineRequest<'h>, CombineError> {
        if !host.contains(root) {
            return Err(CombineError::InvalidRoot(root));
        }
        let root_to_local = host
            .world_transform(root)
            .ok_or(CombineError::InvalidRoot(root))?
            .invert()
            .ok_or(CombineError::SingularRootTransform(root))?;

        let mut sources = Vec::new();
        let mut material = None;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            stack.extend(host.children(node).iter().rev());

            if material.is_none() {
                material = host.materials_of(node).first().copied();
            }

            let Some(geometry) = host.geometry_of(node) else {
                continue;
            };
            if geometry.is_empty() {
                continue;
            }
            let Some(world) = host.world_transform(node) else {
                continue;
            };
            sources.push(CombineSource {
                node,
                geometry,
                local_to_root: root_to_local * world,
            });
        }

        if sources.is_empty() {
            return Err(CombineError::EmptyInput { root });
        }

        Ok(CombineRequest {
            root,
            sources,
            material,
        })
    }

    /// Concatenate the request's sources into a single buffer.
    pub fn merge(&self, request: &CombineRequest<'_>) -> Result<GeometryBuffer, CombineError> {
        let total_vertices = request.total_vertices();
        let format = request.index_format(self.policy);
        let with_normals = request.sources.iter().any(|s| s.geometry.has_normals());
        let with_uvs = request.sources.iter().any(|s| s.geometry.has_uvs());
        let total_indices = request.sources.iter().map(|s| s.geometry.indices.len()).sum();

        let mut positions = Vec::with_capacity(total_vertices);
        let mut normals = Vec::with_capacity(if with_normals { total_vertices } else { 0 });
        let mut uvs = Vec::with_capacity(if with_uvs { total_vertices } else { 0 });
        let mut indices: Vec<u32> = Vec::with_capacity(total_indices);

        for source in &request.sources {
            let geometry = source.geometry;
            geometry
                .validate()
                .map_err(|err| CombineError::from_geometry(source.node, err))?;

            let offset = positions.len() as u32;
            let matrix = source.local_to_root;

            positions.extend(geometry.positions.iter().map(|&p| {
                let p: [f32; 3] = matrix.transform_point(Point3::from(p)).into();
                p
            }));

            if with_normals {
                if geometry.has_normals() {
                    let to_root = normal_matrix(&matrix);
                    normals.extend(geometry.normals.iter().map(|&n| {
                        let n = to_root * Vector3::from(n);
                        let n = if n.magnitude2() > 0.0 { n.normalize() } else { n };
                        let n: [f32; 3] = n.into();
                        n
                    }));
                } else {
                    normals.extend(std::iter::repeat_n([0.0; 3], geometry.vertex_count()));
                }
            }

            if with_uvs {
                if geometry.has_uvs() {
                    uvs.extend_from_slice(&geometry.uvs);
                } else {
                    uvs.extend(std::iter::repeat_n([0.0; 2], geometry.vertex_count()));
                }
            }

            // A mirroring transform turns front faces around; swap two corners to undo it.
            let mirrored = linear_part(&matrix).determinant() < 0.0;
            let source_indices = geometry.indices.to_u32();
            for tri in source_indices.chunks_exact(3) {
                if mirrored {
                    indices.extend([tri[0] + offset, tri[2] + offset, tri[1] + offset]);
                } else {
                    indices.extend([tri[0] + offset, tri[1] + offset, tri[2] + offset]);
                }
            }
        }

        Ok(GeometryBuffer {
            positions,
            normals,
            uvs,
            indices: IndexBuffer::from_u32(indices, format),
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CombineError {
    #[error("Root node {0:?} is not part of the scene")]
    InvalidRoot(SceneNodeId),
    #[error("Nothing to combine below {root:?}")]
    EmptyInput { root: SceneNodeId },
    #[error("Root node {0:?} has a singular world transform")]
    SingularRootTransform(SceneNodeId),
    #[error("Mesh on {node:?} has index {index} but only {vertex_count} vertices")]
    IndexOutOfRange {
        node: SceneNodeId,
        index: u32,
        vertex_count: usize,
    },
    #[error("Mesh on {node:?} is malformed: {source}")]
    MalformedGeometry {
        node: SceneNodeId,
        #[source]
        source: GeometryError,
    },
}

impl CombineError {
    fn from_geometry(node: SceneNodeId, err: GeometryError) -> Self {
        match err {
            GeometryError::IndexOutOfRange {
                index,
                vertex_count,
            } => CombineError::IndexOutOfRange {
                node,
                index,
                vertex_count,
            },
            source => CombineError::MalformedGeometry { node, source },
        }
    }
}
