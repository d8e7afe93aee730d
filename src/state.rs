//! Everything behind the cache lock: streaming entries, their cost and position, the permanent pools, and the
//! admission and pruning policy.
//!
//! Pruning is not plain Lru.  An entry is kept as long as the consumer has not reached the last queue position known to
//! want it, however cold it is, and is dropped soon after the consumer passes that position, however little pressure
//! there is.
use std::collections::HashMap;
use std::sync::Arc;

use crate::*;

pub(crate) type CacheHashMap<V> = HashMap<Checksum, V, ahash::RandomState>;

/// Cost of an entry and the last queue position at which it is still wanted.  Always updated together.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Stamp {
    pub(crate) cost: u64,
    pub(crate) position: usize,
}

pub(crate) enum Payload<D: Decoder> {
    /// Decoding failed; whoever wants it loads it from disk.
    Empty,
    Bytes(Arc<[u8]>),
    Mesh(Arc<D::MeshData>),
    Texture(Arc<D::TextureData>),
}

impl<D: Decoder> Clone for Payload<D> {
    fn clone(&self) -> Self {
        match self {
            Payload::Empty => Payload::Empty,
            Payload::Bytes(b) => Payload::Bytes(b.clone()),
            Payload::Mesh(m) => Payload::Mesh(m.clone()),
            Payload::Texture(t) => Payload::Texture(t.clone()),
        }
    }
}

pub(crate) struct CacheEntry<D: Decoder> {
    pub(crate) payload: Payload<D>,
    pub(crate) stamp: Stamp,
}

/// Materialized objects shared for the rest of the session.
pub(crate) struct Pools<D: Decoder> {
    pub(crate) meshes: CacheHashMap<Arc<D::Mesh>>,
    pub(crate) textures_main: CacheHashMap<Arc<D::Texture>>,
    pub(crate) textures_lod: CacheHashMap<Arc<D::Texture>>,
    pub(crate) materials_main: CacheHashMap<MaterialData<Arc<D::Material>>>,
    pub(crate) materials_lod: CacheHashMap<MaterialData<Arc<D::Material>>>,
}

impl<D: Decoder> Pools<D> {
    fn new() -> Pools<D> {
        Pools {
            meshes: Default::default(),
            textures_main: Default::default(),
            textures_lod: Default::default(),
            materials_main: Default::default(),
            materials_lod: Default::default(),
        }
    }

    pub(crate) fn is_promoted(&self, kind: AssetKind, checksum: &str) -> bool {
        match kind {
            AssetKind::Mesh => self.meshes.contains_key(checksum),
            AssetKind::Texture => {
                self.textures_main.contains_key(checksum) || self.textures_lod.contains_key(checksum)
            }
            AssetKind::Material => {
                self.materials_main.contains_key(checksum)
                    || self.materials_lod.contains_key(checksum)
            }
            AssetKind::Object | AssetKind::Other => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.meshes.clear();
        self.textures_main.clear();
        self.textures_lod.clear();
        self.materials_main.clear();
        self.materials_lod.clear();
    }
}

pub(crate) struct State<D: Decoder> {
    pub(crate) entries: OrderedMap<Checksum, CacheEntry<D>>,
    /// Sum of the cost of everything in `entries`.
    pub(crate) cost: u64,
    pub(crate) loader_position: usize,
    pub(crate) consumer_position: usize,
    pub(crate) max_entries_seen: usize,
    /// Set on disposal; releases a loader waiting for admission.
    pub(crate) closed: bool,
    pub(crate) pools: Pools<D>,
}

impl<D: Decoder> State<D> {
    pub(crate) fn with_capacity(capacity: usize) -> State<D> {
        State {
            entries: OrderedMap::with_capacity(capacity),
            cost: 0,
            loader_position: 0,
            consumer_position: 0,
            max_entries_seen: 0,
            closed: false,
            pools: Pools::new(),
        }
    }

    /// May the loader read more right now?  Some look-ahead is always allowed, so the consumer can't starve.
    pub(crate) fn can_admit(&self, config: &SharingConfig) -> bool {
        (self.cost < config.target_cost && self.entries.len() < config.evict_entries)
            || self
                .loader_position
                .saturating_sub(self.consumer_position)
                < config.min_look_ahead()
    }

    /// Evict from the eldest end until the eldest entry is worth keeping.
    pub(crate) fn prune(&mut self, config: &SharingConfig) {
        let current = self.consumer_position;

        loop {
            let position = match self.entries.eldest() {
                Some(e) => e.stamp.position,
                None => break,
            };

            let recent = position.saturating_add(config.recent_window) > current
                && self.entries.len() < config.evict_entries
                && self.cost < config.evict_cost;
            // Still ahead of the consumer.
            if recent || current <= position {
                break;
            }

            if let Some((_, e)) = self.entries.remove_eldest() {
                self.cost -= e.stamp.cost;
            }
        }
    }

    /// Add a new entry, accounting for its cost.  Returns false, changing nothing, if the key is already present.
    pub(crate) fn insert_new(&mut self, checksum: Checksum, entry: CacheEntry<D>) -> bool {
        let cost = entry.stamp.cost;
        match self.entries.add(checksum, entry) {
            Ok(()) => {
                self.cost += cost;
                true
            }
            Err(_) => false,
        }
    }

    /// Put a decoded form in place of whatever the entry holds, or add the entry if it's gone.
    pub(crate) fn store_decoded(&mut self, asset: &Asset, payload: Payload<D>, stamp: Stamp) {
        if self.pools.is_promoted(asset.kind, &asset.checksum) {
            return;
        }

        match self.entries.get_mut(&asset.checksum) {
            Some(e) => e.payload = payload,
            None => {
                self.insert_new(asset.checksum.clone(), CacheEntry { payload, stamp });
            }
        }
    }

    /// Take an entry out of the streaming cache.
    ///
    /// The second value says whether admission just went from denied to allowed, in which case the loader needs a
    /// wakeup.
    pub(crate) fn retire(
        &mut self,
        checksum: &str,
        config: &SharingConfig,
    ) -> (Option<CacheEntry<D>>, bool) {
        let was_admitting = self.can_admit(config);
        let entry = self.entries.remove(checksum);
        if let Some(e) = &entry {
            self.cost -= e.stamp.cost;
        }
        (entry, !was_admitting && self.can_admit(config))
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.pools.clear();
        self.cost = 0;
    }
}
