//! Classification of assets which load fine but are suspiciously big or oddly shaped.
//!
//! Reports are purely observational: the cache hands them to an [AnomalySink] and carries on.
use crate::*;

/// Meshes with more vertices than this get rejected outright by typical LOD pipelines.
pub const EXTREME_MESH_VERTICES: usize = 4062;
pub const LARGE_MESH_TRIANGLE_INDICES: usize = 1800;
pub const LARGE_MESH_VERTICES: usize = 1000;
pub const LARGE_TEXTURE_PIXELS: u64 = 262_144;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Anomaly {
    ExtremeMesh { vertices: usize },
    LargeMeshTriangles { triangles: usize },
    LargeMeshVertices { vertices: usize },
    /// A side which is not a power of two.
    WeirdTexture { width: u32, height: u32 },
    LargeTexture { width: u32, height: u32 },
}

pub trait AnomalySink: Send + Sync {
    fn report(&self, package: &Package, checksum: &Checksum, anomaly: Anomaly);
}

/// At most one report per mesh, the most severe.
pub fn classify_mesh(stats: MeshStats) -> Option<Anomaly> {
    if stats.vertices > EXTREME_MESH_VERTICES {
        Some(Anomaly::ExtremeMesh {
            vertices: stats.vertices,
        })
    } else if stats.triangle_indices >= LARGE_MESH_TRIANGLE_INDICES {
        Some(Anomaly::LargeMeshTriangles {
            triangles: stats.triangle_indices / 3,
        })
    } else if stats.vertices >= LARGE_MESH_VERTICES {
        Some(Anomaly::LargeMeshVertices {
            vertices: stats.vertices,
        })
    } else {
        None
    }
}

/// A texture can be both weird and large.
pub fn classify_texture(width: u32, height: u32) -> Vec<Anomaly> {
    let mut found = vec![];
    if !width.is_power_of_two() || !height.is_power_of_two() {
        found.push(Anomaly::WeirdTexture { width, height });
    }
    if width as u64 * height as u64 >= LARGE_TEXTURE_PIXELS {
        found.push(Anomaly::LargeTexture { width, height });
    }
    found
}

/// Anomalies of the textures a material carries: at most one weird and one large report, for the first such texture.
pub fn classify_material(texture_sizes: &[(u32, u32)]) -> Vec<Anomaly> {
    let mut weird = None;
    let mut large = None;
    for &(w, h) in texture_sizes {
        for a in classify_texture(w, h) {
            match a {
                Anomaly::WeirdTexture { .. } => {
                    weird.get_or_insert(a);
                }
                _ => {
                    large.get_or_insert(a);
                }
            }
        }
    }
    weird.into_iter().chain(large).collect()
}
