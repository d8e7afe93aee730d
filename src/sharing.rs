//! The [SharingCache] drives a [PackageStore] and a [Decoder] from three threads, so that a consumer walking an ordered
//! queue of assets finds most of them already read, and textures and meshes already unpacked, by the time it gets
//! there.
//!
//! The cache holds things at two levels:
//!
//! - A streaming level of raw bytes and decoded intermediates, prefetched ahead of the consumer and bounded by cost.
//!   What leaves it is decided by queue position rather than recency; see [SharingConfig].
//! - Permanent pools of materialized objects.  Once the consumer has built a mesh, texture or material, it is shared
//!   for the rest of the session if sharing is enabled for that kind, and no longer counts against the streaming
//!   budget.
//!
//! Retrieval never depends on prefetching: anything the pipeline didn't get to is loaded synchronously.
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::anomaly::{classify_material, classify_mesh, classify_texture};
use crate::decoder_worker::DecodeJob;
use crate::metrics::{Counted, Metrics, Served};
use crate::state::{CacheEntry, Payload, State};
use crate::store::{open_asset_stream, read_asset};
use crate::*;

/// Everything the worker threads share with the consumer.
pub(crate) struct Shared<S: PackageStore, D: Decoder> {
    pub(crate) config: SharingConfig,
    pub(crate) store: S,
    pub(crate) decoder: D,
    pub(crate) state: Mutex<State<D>>,
    /// Signalled when the loader may be admitted again, or the cache is closing.
    pub(crate) admitted: Condvar,
    pub(crate) jobs: BlockingQueue<DecodeJob>,
    /// Exclusive bound of the positions the decoder has vouched for.
    pub(crate) ready: Handoff<usize>,
}

/// Current size of the streaming cache.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CacheStatus {
    pub entries: usize,
    pub cost: u64,
}

pub struct SharingCache<S: PackageStore, D: Decoder> {
    shared: Arc<Shared<S, D>>,
    metrics: Metrics,
    sink: Option<Arc<dyn AnomalySink>>,
    workers: Vec<JoinHandle<()>>,
    started: bool,
    /// Exclusive bound of the positions known to be ready.  Local to the consumer.
    ready: usize,
}

type Result<T, D> = std::result::Result<T, SharingError<<D as Decoder>::Error>>;

impl<S: PackageStore, D: Decoder> SharingCache<S, D> {
    pub fn new(store: S, decoder: D, config: SharingConfig) -> SharingCache<S, D> {
        SharingCache {
            shared: Arc::new(Shared {
                config,
                store,
                decoder,
                state: Mutex::new(State::with_capacity(300)),
                admitted: Condvar::new(),
                jobs: BlockingQueue::with_capacity(32),
                ready: Handoff::new(),
            }),
            metrics: Default::default(),
            sink: None,
            workers: vec![],
            started: false,
            ready: 0,
        }
    }

    /// Send anomaly reports here when `check_assets` is enabled.
    pub fn with_anomaly_sink(mut self, sink: Arc<dyn AnomalySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &SharingConfig {
        &self.shared.config
    }

    /// Start the loader and decoder threads over the queue.  The consumer must then walk the same queue in order,
    /// calling [SharingCache::await_position] before using each position.
    pub fn start(&mut self, queue: Vec<AssetRef>) -> Result<(), D> {
        if self.started {
            return Err(SharingError::AlreadyStarted);
        }
        self.started = true;

        let queue: Arc<[AssetRef]> = queue.into();
        log::debug!("Starting prefetch of {} queue positions", queue.len());

        let decoder = {
            let shared = self.shared.clone();
            thread::Builder::new()
                .name("asset-decoder".into())
                .spawn(move || shared.run_decoder())
                .map_err(|e| {
                    // Nothing will ever announce readiness; don't let the consumer wait for it.
                    self.shared.ready.set(usize::MAX);
                    SharingError::<D::Error>::Spawn(e)
                })?
        };
        self.workers.push(decoder);

        let loader = {
            let shared = self.shared.clone();
            thread::Builder::new()
                .name("asset-loader".into())
                .spawn(move || shared.run_loader(&queue))
        };
        match loader {
            Ok(h) => {
                self.workers.push(h);
                Ok(())
            }
            Err(e) => {
                // Nothing will feed the decoder; let it finish and vouch for everything.
                self.shared.jobs.set_completed();
                Err(SharingError::Spawn(e))
            }
        }
    }

    /// Block until everything up to and including `position` has been prefetched and decoded.
    ///
    /// This is also where the consumer prunes the cache and lets a waiting loader continue.  Without a started pipeline
    /// it only does the bookkeeping and returns immediately.
    pub fn await_position(&mut self, position: usize) {
        let config = &self.shared.config;
        {
            let mut state = self.shared.state.lock();
            state.consumer_position = position;
            if config.must_prune() {
                state.prune(config);
            }
            state.max_entries_seen = state.max_entries_seen.max(state.entries.len());
            if state.can_admit(config) {
                self.shared.admitted.notify_one();
            }
        }

        if !self.started {
            return;
        }

        while self.ready <= position {
            self.ready = self.ready.max(self.shared.ready.get());
        }
    }

    pub fn get_mesh(
        &self,
        checksum: &Checksum,
        package: &Package,
        is_main: bool,
    ) -> Result<Arc<D::Mesh>, D> {
        let (pooled, payload) = {
            let state = self.shared.state.lock();
            let pooled = state.pools.meshes.get(checksum).cloned();
            let payload = match pooled {
                Some(_) => None,
                None => Self::payload_of(&state, checksum),
            };
            (pooled, payload)
        };

        if let Some(mesh) = pooled {
            self.metrics.record(Counted::Mesh, Served::Shared);
            if !is_main {
                self.check_mesh(package, checksum, &mesh);
            }
            return Ok(mesh);
        }

        let decoder = &self.shared.decoder;
        let mesh = match payload {
            Some(Payload::Mesh(data)) => {
                self.metrics.record(Counted::Mesh, Served::Prefetched);
                decoder.build_mesh(&data)
            }
            Some(Payload::Bytes(bytes)) => {
                self.metrics.record(Counted::Mesh, Served::Loaded);
                decoder
                    .deserialize_mesh(package, &bytes, is_main)
                    .map_err(|e| decode_error(package, checksum, e))?
            }
            _ => {
                self.metrics.record(Counted::Mesh, Served::Loaded);
                let bytes = self.cold_read(package, checksum)?;
                decoder
                    .deserialize_mesh(package, &bytes, is_main)
                    .map_err(|e| decode_error(package, checksum, e))?
            }
        };
        let mesh = Arc::new(mesh);

        if !is_main {
            self.check_mesh(package, checksum, &mesh);
        }

        if self.shared.config.share_meshes {
            let mut state = self.shared.state.lock();
            state.pools.meshes.insert(checksum.clone(), mesh.clone());
            self.retire(&mut state, checksum);
        }
        Ok(mesh)
    }

    /// Get a texture.  Main quality shares one instance; secondary quality always gets its own copy of a shared one.
    pub fn get_texture(
        &self,
        checksum: &Checksum,
        package: &Package,
        is_main: bool,
    ) -> Result<Arc<D::Texture>, D> {
        let (pooled, payload) = {
            let state = self.shared.state.lock();
            let pools = &state.pools;
            let pooled = if is_main {
                pools.textures_main.get(checksum).cloned()
            } else {
                pools
                    .textures_lod
                    .get(checksum)
                    .or_else(|| pools.textures_main.get(checksum))
                    .cloned()
            };
            let payload = match pooled {
                Some(_) => None,
                None => Self::payload_of(&state, checksum),
            };
            (pooled, payload)
        };

        if let Some(texture) = pooled {
            if is_main {
                self.metrics.record(Counted::Texture, Served::Shared);
                return Ok(texture);
            }

            self.metrics.record(Counted::Texture, Served::Prefetched);
            let copy = Arc::new((*texture).clone());
            self.check_texture(package, checksum, &copy);
            return Ok(copy);
        }

        let decoder = &self.shared.decoder;
        let texture = match payload {
            Some(Payload::Texture(data)) => {
                self.metrics.record(Counted::Texture, Served::Prefetched);
                decoder.build_texture(&data)
            }
            Some(Payload::Bytes(bytes)) => {
                self.metrics.record(Counted::Texture, Served::Loaded);
                decoder
                    .deserialize_texture(package, &bytes, is_main)
                    .map_err(|e| decode_error(package, checksum, e))?
            }
            _ => {
                self.metrics.record(Counted::Texture, Served::Loaded);
                let bytes = self.cold_read(package, checksum)?;
                decoder
                    .deserialize_texture(package, &bytes, is_main)
                    .map_err(|e| decode_error(package, checksum, e))?
            }
        };
        let texture = Arc::new(texture);

        if !is_main {
            self.check_texture(package, checksum, &texture);
        }

        if self.shared.config.share_textures {
            let mut state = self.shared.state.lock();
            let pool = if is_main {
                &mut state.pools.textures_main
            } else {
                &mut state.pools.textures_lod
            };
            pool.insert(checksum.clone(), texture.clone());
            self.retire(&mut state, checksum);
        }
        Ok(texture)
    }

    /// Get a material.  Secondary quality gets its own copy of a shared secondary material, which lets it be
    /// retargeted at texture atlases without touching anyone else's.
    pub fn get_material(
        &self,
        checksum: &Checksum,
        package: &Package,
        is_main: bool,
    ) -> Result<Arc<D::Material>, D> {
        let (pooled, payload) = {
            let state = self.shared.state.lock();
            let pool = if is_main {
                &state.pools.materials_main
            } else {
                &state.pools.materials_lod
            };
            let pooled = pool.get(checksum).cloned();
            let payload = match pooled {
                Some(_) => None,
                None => Self::payload_of(&state, checksum),
            };
            (pooled, payload)
        };

        if let Some(mat) = pooled {
            let count = mat.texture_count as u64;
            if is_main {
                self.metrics.record(Counted::Material, Served::Shared);
                self.metrics.record_many(Counted::Texture, Served::Shared, count);
                return Ok(mat.material);
            }

            self.metrics.record(Counted::Material, Served::Prefetched);
            self.metrics.record_many(Counted::Texture, Served::Prefetched, count);
            self.check_material(package, checksum, &mat.texture_sizes);
            return Ok(Arc::new((*mat.material).clone()));
        }

        let decoder = &self.shared.decoder;
        let data = match payload {
            // Materials are never pre-decoded; prefetched bytes are as good as it gets.
            Some(Payload::Bytes(bytes)) => {
                self.metrics.record(Counted::Material, Served::Prefetched);
                decoder
                    .deserialize_material(package, &bytes, is_main)
                    .map_err(|e| decode_error(package, checksum, e))?
            }
            _ => {
                self.metrics.record(Counted::Material, Served::Loaded);
                let bytes = self.cold_read(package, checksum)?;
                decoder
                    .deserialize_material(package, &bytes, is_main)
                    .map_err(|e| decode_error(package, checksum, e))?
            }
        };
        if !is_main {
            self.check_material(package, checksum, &data.texture_sizes);
        }
        let material = Arc::new(data.material);

        if self.shared.config.share_materials {
            let mut state = self.shared.state.lock();
            let pool = if is_main {
                &mut state.pools.materials_main
            } else {
                &mut state.pools.materials_lod
            };
            pool.insert(
                checksum.clone(),
                MaterialData {
                    material: material.clone(),
                    texture_count: data.texture_count,
                    texture_sizes: data.texture_sizes,
                },
            );
            self.retire(&mut state, checksum);
        }
        Ok(material)
    }

    /// Get a stream over the raw bytes of an asset.
    ///
    /// Large assets and containers are read exactly once, so they leave the cache as soon as they are handed out.
    /// Everything else stays.
    pub fn get_raw_stream(&self, asset_ref: &AssetRef) -> Result<AssetStream<S::Reader>, D> {
        let config = &self.shared.config;
        let asset = &asset_ref.asset;

        let payload = {
            let mut state = self.shared.state.lock();
            if config.is_read_once(asset) {
                self.retire(&mut state, &asset.checksum)
                    .map(|e| e.payload)
            } else {
                Self::payload_of(&state, &asset.checksum)
            }
        };

        match payload {
            Some(Payload::Bytes(bytes)) => Ok(AssetStream::Memory(std::io::Cursor::new(bytes))),
            _ => open_asset_stream::<S, D::Error>(
                &self.shared.store,
                &asset_ref.package,
                asset,
                config.max_asset_size,
            ),
        }
    }

    /// Current entry count and running cost of the streaming cache.
    pub fn status(&self) -> CacheStatus {
        let state = self.shared.state.lock();
        CacheStatus {
            entries: state.entries.len(),
            cost: state.cost,
        }
    }

    /// How many positions the loader is ahead of the consumer.
    pub fn loader_ahead(&self) -> i64 {
        let state = self.shared.state.lock();
        state.loader_position as i64 - state.consumer_position as i64
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let max_entries_seen = self.shared.state.lock().max_entries_seen;
        self.metrics.snapshot(max_entries_seen)
    }

    /// Shut the pipeline down, log the counters, and release everything cached or shared.
    pub fn dispose(self) -> MetricsSnapshot {
        let snapshot = self.metrics();
        log::info!("Asset sharing: {}", snapshot);
        snapshot
    }

    fn payload_of(state: &State<D>, checksum: &str) -> Option<Payload<D>> {
        state.entries.get(checksum).map(|e| e.payload.clone())
    }

    /// Remove an entry from the streaming cache, waking the loader if that lets it continue.
    fn retire(&self, state: &mut State<D>, checksum: &str) -> Option<CacheEntry<D>> {
        let (entry, wake) = state.retire(checksum, &self.shared.config);
        if wake {
            self.shared.admitted.notify_one();
        }
        entry
    }

    /// Load an asset synchronously, bypassing the pipeline.
    fn cold_read(&self, package: &Package, checksum: &Checksum) -> Result<Vec<u8>, D> {
        let asset = package
            .find(checksum)
            .ok_or_else(|| SharingError::<D::Error>::NotFound {
                checksum: checksum.clone(),
                package: package.name().to_string(),
            })?;
        let mut reader = self
            .shared
            .store
            .open(package)
            .map_err(|e| SharingError::<D::Error>::io(package, e))?;
        read_asset::<_, D::Error>(&mut reader, package, asset, self.shared.config.max_asset_size)
    }

    fn check_mesh(&self, package: &Package, checksum: &Checksum, mesh: &D::Mesh) {
        if let Some(sink) = self.anomaly_sink() {
            if let Some(a) = classify_mesh(self.shared.decoder.mesh_stats(mesh)) {
                sink.report(package, checksum, a);
            }
        }
    }

    fn check_texture(&self, package: &Package, checksum: &Checksum, texture: &D::Texture) {
        if let Some(sink) = self.anomaly_sink() {
            let (width, height) = self.shared.decoder.texture_size(texture);
            for a in classify_texture(width, height) {
                sink.report(package, checksum, a);
            }
        }
    }

    fn check_material(&self, package: &Package, checksum: &Checksum, texture_sizes: &[(u32, u32)]) {
        if let Some(sink) = self.anomaly_sink() {
            for a in classify_material(texture_sizes) {
                sink.report(package, checksum, a);
            }
        }
    }

    fn anomaly_sink(&self) -> Option<&dyn AnomalySink> {
        if self.shared.config.check_assets {
            self.sink.as_deref()
        } else {
            None
        }
    }
}

fn decode_error<E: std::error::Error + 'static>(
    package: &Package,
    checksum: &Checksum,
    source: E,
) -> SharingError<E> {
    let name = package
        .find(checksum)
        .map(|a| a.name.clone())
        .unwrap_or_else(|| checksum.to_string());
    SharingError::Decode { name, source }
}

impl<S: PackageStore, D: Decoder> Drop for SharingCache<S, D> {
    fn drop(&mut self) {
        self.shared.state.lock().closed = true;
        self.shared.admitted.notify_all();

        for w in self.workers.drain(..) {
            if w.join().is_err() {
                log::warn!("A prefetch worker panicked");
            }
        }

        self.shared.state.lock().clear();
    }
}
