//! Diagnostic counters for the retrieval API.  Nothing reads them for correctness.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Metrics {
    texture_hits: AtomicU64,
    material_hits: AtomicU64,
    mesh_hits: AtomicU64,
    texture_pre: AtomicU64,
    material_pre: AtomicU64,
    mesh_pre: AtomicU64,
    texture_loads: AtomicU64,
    material_loads: AtomicU64,
    mesh_loads: AtomicU64,
}

/// How a retrieval was served.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Served {
    /// A promoted, shared object.
    Shared,
    /// Pre-loaded or pre-decoded by the pipeline.
    Prefetched,
    /// Loaded on the spot.
    Loaded,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Counted {
    Texture,
    Material,
    Mesh,
}

impl Metrics {
    pub(crate) fn record(&self, what: Counted, served: Served) {
        self.record_many(what, served, 1);
    }

    pub(crate) fn record_many(&self, what: Counted, served: Served, count: u64) {
        use Counted::*;
        use Served::*;

        let counter = match (what, served) {
            (Texture, Shared) => &self.texture_hits,
            (Texture, Prefetched) => &self.texture_pre,
            (Texture, Loaded) => &self.texture_loads,
            (Material, Shared) => &self.material_hits,
            (Material, Prefetched) => &self.material_pre,
            (Material, Loaded) => &self.material_loads,
            (Mesh, Shared) => &self.mesh_hits,
            (Mesh, Prefetched) => &self.mesh_pre,
            (Mesh, Loaded) => &self.mesh_loads,
        };
        counter.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, max_entries_seen: usize) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            texture_hits: get(&self.texture_hits),
            material_hits: get(&self.material_hits),
            mesh_hits: get(&self.mesh_hits),
            texture_pre: get(&self.texture_pre),
            material_pre: get(&self.material_pre),
            mesh_pre: get(&self.mesh_pre),
            texture_loads: get(&self.texture_loads),
            material_loads: get(&self.material_loads),
            mesh_loads: get(&self.mesh_loads),
            max_entries_seen,
        }
    }
}

/// Counters at a point in time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Served from the shared pools.
    pub texture_hits: u64,
    pub material_hits: u64,
    pub mesh_hits: u64,
    /// Served from something the pipeline prefetched.
    pub texture_pre: u64,
    pub material_pre: u64,
    pub mesh_pre: u64,
    /// Loaded synchronously, or deserialized from raw bytes.
    pub texture_loads: u64,
    pub material_loads: u64,
    pub mesh_loads: u64,
    /// Largest entry count seen at a synchronization point.
    pub max_entries_seen: usize,
}

impl MetricsSnapshot {
    pub fn misses(&self) -> u64 {
        self.texture_loads + self.material_loads + self.mesh_loads
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "textures / materials / meshes shared: {} / {} / {}, pre-loaded: {} / {} / {}, loaded: {} / {} / {}, max cache {}",
            self.texture_hits,
            self.material_hits,
            self.mesh_hits,
            self.texture_pre,
            self.material_pre,
            self.mesh_pre,
            self.texture_loads,
            self.material_loads,
            self.mesh_loads,
            self.max_entries_seen
        )
    }
}
