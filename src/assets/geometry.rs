use thiserror::Error;

use crate::constants::MAX_NARROW_INDEX_VERTICES;

/// Bit width of the values in an index buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    /// The narrowest format that can address `vertex_count` vertices.
    pub fn for_vertex_count(vertex_count: usize) -> Self {
        if vertex_count > MAX_NARROW_INDEX_VERTICES {
            IndexFormat::U32
        } else {
            IndexFormat::U16
        }
    }

    /// Width of one index, in bits.
    pub fn bits(self) -> u32 {
        match self {
            IndexFormat::U16 => 16,
            IndexFormat::U32 => 32,
        }
    }
}

/// Triangle-list indices, stored at a single width for the whole buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    /// Store `indices` in the given format.
    ///
    /// Indices are never truncated: if one doesn't fit in 16 bits the buffer stays 32-bit,
    /// so `GeometryBuffer::validate` still sees the real value.
    pub fn from_u32(indices: Vec<u32>, format: IndexFormat) -> Self {
        match format {
            IndexFormat::U16 => match indices
                .iter()
                .map(|&i| u16::try_from(i))
                .collect::<Result<Vec<_>, _>>()
            {
                Ok(narrow) => IndexBuffer::U16(narrow),
                Err(_) => IndexBuffer::U32(indices),
            },
            IndexFormat::U32 => IndexBuffer::U32(indices),
        }
    }

    pub fn format(&self) -> IndexFormat {
        match self {
            IndexBuffer::U16(_) => IndexFormat::U16,
            IndexBuffer::U32(_) => IndexFormat::U32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U16(indices) => indices.len(),
            IndexBuffer::U32(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `i`th index, widened to `u32`.
    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            IndexBuffer::U16(indices) => indices.get(i).map(|&v| v as u32),
            IndexBuffer::U32(indices) => indices.get(i).copied(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            IndexBuffer::U16(indices) => Box::new(indices.iter().map(|&v| v as u32)),
            IndexBuffer::U32(indices) => Box::new(indices.iter().copied()),
        }
    }

    pub fn to_u32(&self) -> Vec<u32> {
        self.iter().collect()
    }
}

/// One mesh's vertex and index data.
///
/// Normals and UVs are either absent (empty) or have one entry per position.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryBuffer {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: IndexBuffer,
}

impl GeometryBuffer {
    /// Build a buffer, choosing the narrowest index format that fits.
    pub fn new(
        positions: Vec<[f32; 3]>,
        normals: Vec<[f32; 3]>,
        uvs: Vec<[f32; 2]>,
        indices: Vec<u32>,
    ) -> Self {
        let format = IndexFormat::for_vertex_count(positions.len());
        Self {
            positions,
            normals,
            uvs,
            indices: IndexBuffer::from_u32(indices, format),
        }
    }

    /// Build a buffer from the flat arrays `tobj` produces.
    pub fn from_flat(positions: &[f32], normals: &[f32], uvs: &[f32], indices: &[u32]) -> Self {
        Self::new(
            positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect(),
            normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]).collect(),
            uvs.chunks_exact(2).map(|t| [t[0], t[1]]).collect(),
            indices.to_vec(),
        )
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    pub fn has_uvs(&self) -> bool {
        !self.uvs.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Check that attribute lengths agree and every index addresses a vertex.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let vertex_count = self.vertex_count();
        if self.has_normals() && self.normals.len() != vertex_count {
            return Err(GeometryError::AttributeLength {
                attribute: "normals",
                expected: vertex_count,
                found: self.normals.len(),
            });
        }
        if self.has_uvs() && self.uvs.len() != vertex_count {
            return Err(GeometryError::AttributeLength {
                attribute: "uvs",
                expected: vertex_count,
                found: self.uvs.len(),
            });
        }
        if self.indices.len() % 3 != 0 {
            return Err(GeometryError::PartialTriangle(self.indices.len()));
        }
        if let Some(index) = self.indices.iter().find(|&i| i as usize >= vertex_count) {
            return Err(GeometryError::IndexOutOfRange {
                index,
                vertex_count,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("{attribute} has {found} entries, expected {expected}")]
    AttributeLength {
        attribute: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Index count {0} is not a multiple of 3")]
    PartialTriangle(usize),
    #[error("Index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> GeometryBuffer {
        GeometryBuffer::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            vec![],
            vec![],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn index_format_threshold() {
        assert_eq!(IndexFormat::for_vertex_count(1_000), IndexFormat::U16);
        assert_eq!(IndexFormat::for_vertex_count(65_535), IndexFormat::U16);
        assert_eq!(IndexFormat::for_vertex_count(65_536), IndexFormat::U32);
        assert_eq!(IndexFormat::for_vertex_count(70_000), IndexFormat::U32);
    }

    #[test]
    fn small_meshes_use_narrow_indices() {
        let quad = quad();
        assert_eq!(quad.indices.format(), IndexFormat::U16);
        assert_eq!(quad.triangle_count(), 2);
        assert_eq!(quad.indices.get(5), Some(3));
        assert_eq!(quad.indices.to_u32(), vec![0, 1, 2, 0, 2, 3]);
        assert!(quad.validate().is_ok());
    }

    #[test]
    fn from_flat_groups_components() {
        let mesh = GeometryBuffer::from_flat(
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            &[],
            &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            &[0, 1, 2],
        );
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.uvs[1], [1.0, 0.0]);
        assert!(!mesh.has_normals());
    }

    #[test]
    fn validate_rejects_bad_buffers() {
        let mut mesh = quad();
        mesh.indices = IndexBuffer::U16(vec![0, 1, 4]);
        assert_eq!(
            mesh.validate(),
            Err(GeometryError::IndexOutOfRange {
                index: 4,
                vertex_count: 4
            })
        );

        let mut mesh = quad();
        mesh.indices = IndexBuffer::U32(vec![0, 1]);
        assert_eq!(mesh.validate(), Err(GeometryError::PartialTriangle(2)));

        let mut mesh = quad();
        mesh.normals = vec![[0.0, 0.0, 1.0]];
        assert!(matches!(
            mesh.validate(),
            Err(GeometryError::AttributeLength { attribute: "normals", .. })
        ));
    }

    #[test]
    fn indices_too_wide_for_u16_are_kept_and_rejected() {
        let mesh = GeometryBuffer::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![],
            vec![],
            vec![0, 1, 65_536],
        );
        assert_eq!(mesh.indices.format(), IndexFormat::U32);
        assert_eq!(mesh.indices.to_u32(), vec![0, 1, 65_536]);
        assert_eq!(
            mesh.validate(),
            Err(GeometryError::IndexOutOfRange {
                index: 65_536,
                vertex_count: 3
            })
        );
    }
}
