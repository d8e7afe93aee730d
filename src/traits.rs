//! The collaborators the cache drives.
//!
//! A [PackageStore] turns a [Package] into a seekable byte stream.  A [Decoder] knows the byte-level format of each
//! asset kind, both for unpacking into intermediate forms on the decoder thread and for producing final objects on the
//! consumer thread.
use std::io::{Error, Read, Seek};

use crate::*;

/// "open" a package and return a reader over its bytes.
pub trait PackageStore: Send + Sync + 'static {
    type Reader: Read + Seek + Send + 'static;

    fn open(&self, package: &Package) -> Result<Self::Reader, Error>;
}

/// A deserialized material, with the number of textures it pulled in.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialData<M> {
    pub material: M,
    pub texture_count: usize,
    /// Width and height of each texture deserialized along with the material, for anomaly checks.
    pub texture_sizes: Vec<(u32, u32)>,
}

/// Shape of a mesh, for anomaly checks.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshStats {
    pub vertices: usize,
    /// Length of the triangle index list, so three per triangle.
    pub triangle_indices: usize,
}

/// A `Decoder` knows how to get from bytes to objects.
///
/// The `decode_*` methods run on the decoder thread and must not need anything that lives only on the consumer
/// thread.  `build_*` turns their output into the final object cheaply.  The `deserialize_*` methods do the whole job
/// from bytes in one go, and are used on the consumer thread whenever nothing was pre-decoded.
///
/// Every path must produce the same object for the same bytes.
pub trait Decoder: Send + Sync + 'static {
    type Mesh: Send + Sync + 'static;
    /// Cloning produces the independent copy handed out for secondary-quality uses.
    type Texture: Clone + Send + Sync + 'static;
    type Material: Clone + Send + Sync + 'static;
    type MeshData: Send + Sync + 'static;
    type TextureData: Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    fn decode_mesh(&self, package: &Package, bytes: &[u8]) -> Result<Self::MeshData, Self::Error>;

    fn decode_texture(
        &self,
        package: &Package,
        bytes: &[u8],
    ) -> Result<Self::TextureData, Self::Error>;

    fn build_mesh(&self, data: &Self::MeshData) -> Self::Mesh;

    fn build_texture(&self, data: &Self::TextureData) -> Self::Texture;

    fn deserialize_mesh(
        &self,
        package: &Package,
        bytes: &[u8],
        is_main: bool,
    ) -> Result<Self::Mesh, Self::Error>;

    fn deserialize_texture(
        &self,
        package: &Package,
        bytes: &[u8],
        is_main: bool,
    ) -> Result<Self::Texture, Self::Error>;

    fn deserialize_material(
        &self,
        package: &Package,
        bytes: &[u8],
        is_main: bool,
    ) -> Result<MaterialData<Self::Material>, Self::Error>;

    fn mesh_stats(&self, mesh: &Self::Mesh) -> MeshStats;

    /// Width and height in pixels.
    fn texture_size(&self, texture: &Self::Texture) -> (u32, u32);
}
