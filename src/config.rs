/// Tuning for a [crate::SharingCache].
///
/// The numeric defaults were tuned for level loads of a few thousand assets.  Nothing depends on them for
/// correctness.
#[derive(Clone, Debug, derive_builder::Builder)]
#[builder(default, build_fn(validate = "Self::validate"))]
pub struct SharingConfig {
    /// Keep materialized textures around for reuse.
    pub share_textures: bool,
    /// Keep materialized materials around for reuse.
    pub share_materials: bool,
    /// Keep materialized meshes around for reuse.
    pub share_meshes: bool,
    /// Report oversized or oddly shaped assets to the anomaly sink.
    pub check_assets: bool,
    /// Soft ceiling on the number of cached entries.  Limits how many materials a package may add.
    pub max_entries: usize,
    /// Entry count above which pruning and admission control kick in.
    pub evict_entries: usize,
    /// Most materials prefetched from a single package.
    pub max_materials: usize,
    /// How many positions behind the consumer an entry counts as recently needed.
    pub recent_window: usize,
    /// Running cost below which the loader may keep going.
    pub target_cost: u64,
    /// Running cost above which pruning evicts recently needed entries too.
    pub evict_cost: u64,
    /// Texture and mesh cost is their size shifted right by this.
    pub texture_mesh_cost_shift: u32,
    /// Large object cost is their size, capped at `object_max_size`, shifted right by this.
    pub object_cost_shift: u32,
    pub object_max_size: u64,
    /// Objects bigger than this are read once, through [crate::SharingCache::get_raw_stream], and leave the cache
    /// when read.
    pub stream_threshold: u64,
    /// Objects whose name ends with this are also read once.
    pub container_suffix: String,
    /// The loader may always run this many positions ahead of the consumer, whatever the cost.
    pub look_ahead: usize,
    /// Declared sizes above this are treated as corrupt.
    pub max_asset_size: i64,
}

impl Default for SharingConfig {
    fn default() -> Self {
        SharingConfig {
            share_textures: true,
            share_materials: true,
            share_meshes: true,
            check_assets: false,
            max_entries: 600,
            evict_entries: 500,
            max_materials: 70,
            recent_window: 9,
            target_cost: 600,
            evict_cost: 1000,
            texture_mesh_cost_shift: 16,
            object_cost_shift: 13,
            object_max_size: 409_600,
            stream_threshold: 32768,
            container_suffix: "_Data".to_string(),
            look_ahead: 4,
            max_asset_size: 222_444_000,
        }
    }
}

impl SharingConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.look_ahead == Some(0) {
            return Err("look_ahead must be at least 1".into());
        }
        Ok(())
    }
}

impl SharingConfig {
    /// How far ahead the loader may always get.  Never zero, or a stalled consumer would stall the loader too.
    pub(crate) fn min_look_ahead(&self) -> usize {
        self.look_ahead.max(1)
    }

    /// Whether the consumer has to prune; with everything shared, promotion keeps the cache small on its own.
    pub(crate) fn must_prune(&self) -> bool {
        !(self.share_textures && self.share_materials && self.share_meshes)
    }

    pub(crate) fn cost_of(&self, asset: &crate::Asset) -> u64 {
        let size = asset.size.max(0) as u64;
        match asset.kind {
            crate::AssetKind::Texture | crate::AssetKind::Mesh => {
                size >> self.texture_mesh_cost_shift
            }
            crate::AssetKind::Object if size > self.stream_threshold => {
                size.min(self.object_max_size) >> self.object_cost_shift
            }
            _ => 0,
        }
    }

    /// Whether a raw stream read consumes the cached copy.
    pub(crate) fn is_read_once(&self, asset: &crate::Asset) -> bool {
        asset.size.max(0) as u64 > self.stream_threshold
            || asset.name.ends_with(&self.container_suffix)
    }
}
