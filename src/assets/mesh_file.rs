use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable, cast_slice};
use thiserror::Error;

use crate::assets::geometry::{GeometryBuffer, IndexBuffer, IndexFormat};

pub const MESH_FILE_MAGIC: [u8; 4] = *b"SCMB";
pub const MESH_FILE_VERSION: u32 = 1;

const FLAG_NORMALS: u32 = 1 << 0;
const FLAG_UVS: u32 = 1 << 1;

/// Fixed-size header at the start of every mesh asset.
///
/// Followed by positions, normals (if flagged), uvs (if flagged) and indices,
/// with the index block padded to 4 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct MeshFileHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub vertex_count: u32,
    pub index_count: u32,
    pub index_format: u32, // 16 or 32
    pub flags: u32,
    pub _padding: [u32; 2],
}

/// A mesh asset written to disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetHandle {
    pub path: PathBuf,
    pub byte_len: u64,
}

/// Somewhere merged geometry can be made durable.
pub trait AssetSink {
    /// Persist `geometry` at `path`, creating any missing folders first.
    fn create_durable_asset(
        &mut self,
        geometry: &GeometryBuffer,
        path: &Path,
    ) -> Result<AssetHandle, MeshFileError>;
}

/// Writes mesh assets below a root folder.
pub struct MeshAssetWriter {
    root: PathBuf,
}

impl MeshAssetWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSink for MeshAssetWriter {
    fn create_durable_asset(
        &mut self,
        geometry: &GeometryBuffer,
        path: &Path,
    ) -> Result<AssetHandle, MeshFileError> {
        let full_path = self.root.join(path);
        if let Some(folder) = full_path.parent() {
            fs::create_dir_all(folder).map_err(|source| MeshFileError::Io {
                path: folder.to_path_buf(),
                source,
            })?;
        }
        let byte_len = write_mesh_asset(geometry, &full_path)?;
        log::debug!("Wrote {} bytes to {:?}", byte_len, full_path);
        Ok(AssetHandle {
            path: full_path,
            byte_len,
        })
    }
}

/// Serialize `geometry` into the mesh asset format, returning the bytes written.
pub fn write_mesh_asset(geometry: &GeometryBuffer, path: &Path) -> Result<u64, MeshFileError> {
    let io_err = |source| MeshFileError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    let bytes = encode(geometry);
    writer.write_all(&bytes).map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    Ok(bytes.len() as u64)
}

/// Load a mesh asset written by `write_mesh_asset`.
pub fn read_mesh_asset(path: &Path) -> Result<GeometryBuffer, MeshFileError> {
    let bytes = fs::read(path).map_err(|source| MeshFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&bytes)
}

fn encode(geometry: &GeometryBuffer) -> Vec<u8> {
    let mut flags = 0;
    if geometry.has_normals() {
        flags |= FLAG_NORMALS;
    }
    if geometry.has_uvs() {
        flags |= FLAG_UVS;
    }
    let header = MeshFileHeader {
        magic: MESH_FILE_MAGIC,
        version: MESH_FILE_VERSION,
        vertex_count: geometry.vertex_count() as u32,
        index_count: geometry.indices.len() as u32,
        index_format: geometry.indices.format().bits(),
        flags,
        _padding: [0; 2],
    };

    let mut bytes = Vec::new();
    bytes.extend_from_slice(cast_slice(&[header]));
    bytes.extend_from_slice(cast_slice(&geometry.positions));
    bytes.extend_from_slice(cast_slice(&geometry.normals));
    bytes.extend_from_slice(cast_slice(&geometry.uvs));
    match &geometry.indices {
        IndexBuffer::U16(indices) => bytes.extend_from_slice(cast_slice(indices)),
        IndexBuffer::U32(indices) => bytes.extend_from_slice(cast_slice(indices)),
    }
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
}

fn decode(bytes: &[u8]) -> Result<GeometryBuffer, MeshFileError> {
    let header_len = size_of::<MeshFileHeader>();
    if bytes.len() < header_len {
        return Err(MeshFileError::Truncated {
            expected: header_len,
            found: bytes.len(),
        });
    }
    let header: MeshFileHeader = bytemuck::pod_read_unaligned(&bytes[..header_len]);
    if header.magic != MESH_FILE_MAGIC {
        return Err(MeshFileError::BadMagic(header.magic));
    }
    if header.version != MESH_FILE_VERSION {
        return Err(MeshFileError::UnsupportedVersion(header.version));
    }
    let index_format = match header.index_format {
        16 => IndexFormat::U16,
        32 => IndexFormat::U32,
        other => return Err(MeshFileError::BadIndexFormat(other)),
    };

    let vertex_count = header.vertex_count as usize;
    let index_count = header.index_count as usize;
    let normal_count = if header.flags & FLAG_NORMALS != 0 { vertex_count } else { 0 };
    let uv_count = if header.flags & FLAG_UVS != 0 { vertex_count } else { 0 };
    let index_width = (index_format.bits() / 8) as usize;

    let expected = header_len
        + vertex_count * 12
        + normal_count * 12
        + uv_count * 8
        + index_count * index_width;
    if bytes.len() < expected {
        return Err(MeshFileError::Truncated {
            expected,
            found: bytes.len(),
        });
    }

    let mut reader = SectionReader {
        bytes,
        offset: header_len,
    };
    let positions = reader.take::<[f32; 3]>(vertex_count);
    let normals = reader.take::<[f32; 3]>(normal_count);
    let uvs = reader.take::<[f32; 2]>(uv_count);
    let indices = match index_format {
        IndexFormat::U16 => IndexBuffer::U16(reader.take::<u16>(index_count)),
        IndexFormat::U32 => IndexBuffer::U32(reader.take::<u32>(index_count)),
    };

    Ok(GeometryBuffer {
        positions,
        normals,
        uvs,
        indices,
    })
}

/// Reads consecutive Pod arrays out of an unaligned byte slice.
struct SectionReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl SectionReader<'_> {
    fn take<T: Pod>(&mut self, count: usize) -> Vec<T> {
        let len = count * size_of::<T>();
        let section = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        section
            .chunks_exact(size_of::<T>())
            .map(bytemuck::pod_read_unaligned::<T>)
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum MeshFileError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Not a mesh asset (magic {0:?})")]
    BadMagic([u8; 4]),
    #[error("Unsupported mesh asset version {0}")]
    UnsupportedVersion(u32),
    #[error("Unsupported index width {0}")]
    BadIndexFormat(u32),
    #[error("Mesh asset truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> GeometryBuffer {
        GeometryBuffer::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0.0, 0.0, 1.0]; 3],
            vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn header_is_32_bytes() {
        assert_eq!(size_of::<MeshFileHeader>(), 32);
    }

    #[test]
    fn encoded_u16_indices_are_padded() {
        let bytes = encode(&triangle());
        // 32 header + 36 positions + 36 normals + 24 uvs + 6 indices + 2 padding
        assert_eq!(bytes.len(), 136);
        assert_eq!(decode(&bytes).unwrap(), triangle());
    }

    #[test]
    fn wide_indices_survive_decoding() {
        let mut mesh = triangle();
        mesh.indices = IndexBuffer::U32(vec![2, 1, 0]);
        mesh.normals.clear();
        let decoded = decode(&encode(&mesh)).unwrap();
        assert_eq!(decoded.indices, IndexBuffer::U32(vec![2, 1, 0]));
        assert!(!decoded.has_normals());
        assert!(decoded.has_uvs());
    }

    #[test]
    fn rejects_foreign_and_short_files() {
        let mut bytes = encode(&triangle());
        assert!(matches!(
            decode(&bytes[..40]),
            Err(MeshFileError::Truncated { found: 40, .. })
        ));
        assert!(matches!(decode(&bytes[..8]), Err(MeshFileError::Truncated { .. })));
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(MeshFileError::BadMagic(_))));
    }

    #[test]
    fn writer_creates_missing_folders() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MeshAssetWriter::new(dir.path());
        let handle = writer
            .create_durable_asset(&triangle(), Path::new("CombinedMeshes/nested/tri.mesh"))
            .unwrap();

        assert_eq!(handle.path, dir.path().join("CombinedMeshes/nested/tri.mesh"));
        assert_eq!(handle.byte_len, 136);
        assert_eq!(read_mesh_asset(&handle.path).unwrap(), triangle());
    }
}
