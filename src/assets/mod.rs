pub mod geometry;
pub mod mesh_file;
pub mod model;

use slotmap::{SlotMap, new_key_type};

use crate::assets::{
    geometry::GeometryBuffer,
    model::{Material, Mesh, Prefab},
};

new_key_type! {
    pub struct MeshId;
    pub struct MaterialId;
    pub struct PrefabId;
}

/// Holds the meshes, materials and prefabs that scene nodes refer to.
#[derive(Debug, Default)]
pub struct AssetStore {
    meshes: SlotMap<MeshId, Mesh>,
    materials: SlotMap<MaterialId, Material>,
    prefabs: SlotMap<PrefabId, Prefab>,
}

impl AssetStore {
    /// Initialize the asset store.
    pub fn new() -> Self {
        Self {
            meshes: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            prefabs: SlotMap::with_key(),
        }
    }

    /// Add materials to the store.
    pub fn add_materials(&mut self, materials: Vec<Material>) -> Vec<MaterialId> {
        materials
            .into_iter()
            .map(|m| self.materials.insert(m))
            .collect()
    }

    /// Add meshes to the store.
    pub fn add_meshes(&mut self, meshes: Vec<Mesh>) -> Vec<MeshId> {
        meshes.into_iter().map(|m| self.meshes.insert(m)).collect()
    }

    /// Add a single mesh to the store.
    pub fn add_mesh(&mut self, name: impl Into<String>, geometry: GeometryBuffer) -> MeshId {
        self.meshes.insert(Mesh {
            name: name.into(),
            geometry,
        })
    }

    /// Add a prefab to the store.
    pub fn add_prefab(&mut self, prefab: Prefab) -> PrefabId {
        self.prefabs.insert(prefab)
    }

    /// Get a material.
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    /// Get a mesh's geometry.
    pub fn mesh(&self, id: MeshId) -> Option<&GeometryBuffer> {
        self.meshes.get(id).map(|m| &m.geometry)
    }

    /// Take a mesh out of the store.
    pub fn remove_mesh(&mut self, id: MeshId) -> Option<Mesh> {
        self.meshes.remove(id)
    }

    /// Get a prefab.
    pub fn prefab(&self, id: PrefabId) -> Option<&Prefab> {
        self.prefabs.get(id)
    }

    pub fn material_by_name(&self, name: &str) -> Option<MaterialId> {
        self.materials
            .iter()
            .find(|(_, m)| m.name == name)
            .map(|(id, _)| id)
    }

    pub fn prefab_by_name(&self, name: &str) -> Option<PrefabId> {
        self.prefabs
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(id, _)| id)
    }

    /// Every mesh, in insertion order.
    pub fn meshes(&self) -> impl Iterator<Item = (MeshId, &Mesh)> {
        self.meshes.iter()
    }

    /// Every material, in insertion order.
    pub fn materials(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials.iter()
    }

    /// Every prefab, in insertion order.
    pub fn prefabs(&self) -> impl Iterator<Item = (PrefabId, &Prefab)> {
        self.prefabs.iter()
    }
}
