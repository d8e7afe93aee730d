//! A toy decoder and package builder for the tests.
//!
//! Formats, all single-byte fields unless noted:
//!
//! - Texture: `T width height pixels...`, `width * height` pixels.
//! - Mesh: `M vertices:u16le indices:u16le body...`.
//! - Material: `A texture_count (width height)... name...`, one size pair per texture.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::*;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub(crate) struct TestError(String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TestTexture {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) pixels: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TestMesh {
    pub(crate) vertices: u16,
    pub(crate) indices: u16,
    pub(crate) body: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TestMaterial {
    pub(crate) name: String,
}

/// What the decoder has done, shared with the test after the decoder moves into the cache.
#[derive(Debug, Default)]
pub(crate) struct DecodeLog {
    /// Raw bytes of everything decoded on the decoder thread, in order.
    pub(crate) decoded: Mutex<Vec<Vec<u8>>>,
    /// Whole-job deserializations on the consumer thread.
    pub(crate) deserialized: AtomicUsize,
}

impl DecodeLog {
    pub(crate) fn was_decoded(&self, bytes: &[u8]) -> bool {
        self.decoded.lock().iter().any(|b| b == bytes)
    }

    pub(crate) fn deserialized(&self) -> usize {
        self.deserialized.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub(crate) struct TestDecoder {
    pub(crate) delay: Option<Duration>,
    pub(crate) log: Arc<DecodeLog>,
}

impl TestDecoder {
    pub(crate) fn with_delay(delay: Duration) -> TestDecoder {
        TestDecoder {
            delay: Some(delay),
            log: Default::default(),
        }
    }

    fn slow_down(&self) {
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
    }
}

fn parse_texture(bytes: &[u8]) -> Result<TestTexture, TestError> {
    match bytes {
        [b'T', w, h, pixels @ ..] if pixels.len() == *w as usize * *h as usize => Ok(TestTexture {
            width: *w as u32,
            height: *h as u32,
            pixels: pixels.to_vec(),
        }),
        _ => Err(TestError("bad texture".into())),
    }
}

fn parse_mesh(bytes: &[u8]) -> Result<TestMesh, TestError> {
    match bytes {
        [b'M', v0, v1, i0, i1, body @ ..] => Ok(TestMesh {
            vertices: u16::from_le_bytes([*v0, *v1]),
            indices: u16::from_le_bytes([*i0, *i1]),
            body: body.to_vec(),
        }),
        _ => Err(TestError("bad mesh".into())),
    }
}

fn parse_material(bytes: &[u8]) -> Result<MaterialData<TestMaterial>, TestError> {
    match bytes {
        [b'A', count, rest @ ..] if rest.len() >= 2 * *count as usize => {
            let (sizes, name) = rest.split_at(2 * *count as usize);
            Ok(MaterialData {
                material: TestMaterial {
                    name: String::from_utf8_lossy(name).into_owned(),
                },
                texture_count: *count as usize,
                texture_sizes: sizes
                    .chunks(2)
                    .map(|s| (s[0] as u32, s[1] as u32))
                    .collect(),
            })
        }
        _ => Err(TestError("bad material".into())),
    }
}

impl Decoder for TestDecoder {
    type Mesh = TestMesh;
    type Texture = TestTexture;
    type Material = TestMaterial;
    type MeshData = TestMesh;
    type TextureData = TestTexture;
    type Error = TestError;

    fn decode_mesh(&self, _package: &Package, bytes: &[u8]) -> Result<TestMesh, TestError> {
        self.slow_down();
        let m = parse_mesh(bytes)?;
        self.log.decoded.lock().push(bytes.to_vec());
        Ok(m)
    }

    fn decode_texture(&self, _package: &Package, bytes: &[u8]) -> Result<TestTexture, TestError> {
        self.slow_down();
        let t = parse_texture(bytes)?;
        self.log.decoded.lock().push(bytes.to_vec());
        Ok(t)
    }

    fn build_mesh(&self, data: &TestMesh) -> TestMesh {
        data.clone()
    }

    fn build_texture(&self, data: &TestTexture) -> TestTexture {
        data.clone()
    }

    fn deserialize_mesh(
        &self,
        _package: &Package,
        bytes: &[u8],
        _is_main: bool,
    ) -> Result<TestMesh, TestError> {
        self.log.deserialized.fetch_add(1, Ordering::Relaxed);
        parse_mesh(bytes)
    }

    fn deserialize_texture(
        &self,
        _package: &Package,
        bytes: &[u8],
        _is_main: bool,
    ) -> Result<TestTexture, TestError> {
        self.log.deserialized.fetch_add(1, Ordering::Relaxed);
        parse_texture(bytes)
    }

    fn deserialize_material(
        &self,
        _package: &Package,
        bytes: &[u8],
        _is_main: bool,
    ) -> Result<MaterialData<TestMaterial>, TestError> {
        self.log.deserialized.fetch_add(1, Ordering::Relaxed);
        parse_material(bytes)
    }

    fn mesh_stats(&self, mesh: &TestMesh) -> MeshStats {
        MeshStats {
            vertices: mesh.vertices as usize,
            triangle_indices: mesh.indices as usize,
        }
    }

    fn texture_size(&self, texture: &TestTexture) -> (u32, u32) {
        (texture.width, texture.height)
    }
}

pub(crate) fn texture_bytes(width: u8, height: u8, fill: u8) -> Vec<u8> {
    let mut out = vec![b'T', width, height];
    out.resize(3 + width as usize * height as usize, fill);
    out
}

pub(crate) fn mesh_bytes(vertices: u16, indices: u16, body: &[u8]) -> Vec<u8> {
    let mut out = vec![b'M'];
    out.extend_from_slice(&vertices.to_le_bytes());
    out.extend_from_slice(&indices.to_le_bytes());
    out.extend_from_slice(body);
    out
}

pub(crate) fn material_bytes(name: &str, textures: &[(u8, u8)]) -> Vec<u8> {
    let mut out = vec![b'A', textures.len() as u8];
    for &(w, h) in textures {
        out.push(w);
        out.push(h);
    }
    out.extend_from_slice(name.as_bytes());
    out
}

/// Lays assets out back to back in one package file.
pub(crate) struct PackageBuilder {
    name: String,
    bytes: Vec<u8>,
    assets: Vec<Asset>,
}

impl PackageBuilder {
    pub(crate) fn new(name: &str) -> PackageBuilder {
        PackageBuilder {
            name: name.to_string(),
            bytes: vec![],
            assets: vec![],
        }
    }

    /// Add an asset; the checksum is the name prefixed by the package name.
    pub(crate) fn add(mut self, name: &str, kind: AssetKind, bytes: &[u8]) -> Self {
        let offset = self.bytes.len() as u64;
        self.bytes.extend_from_slice(bytes);
        let checksum = format!("{}/{}", self.name, name);
        self.assets
            .push(Asset::new(name, checksum, kind, offset, bytes.len() as i64));
        self
    }

    /// Add a directory entry with no data behind it.
    pub(crate) fn add_raw(mut self, name: &str, kind: AssetKind, offset: u64, size: i64) -> Self {
        let checksum = format!("{}/{}", self.name, name);
        self.assets
            .push(Asset::new(name, checksum, kind, offset, size));
        self
    }

    /// Build the package, storing its file unless `store` is `None`.
    pub(crate) fn build(self, store: Option<&MemoryStore>) -> Arc<Package> {
        let path = format!("{}.crp", self.name);
        if let Some(s) = store {
            s.insert(path.clone(), self.bytes);
        }
        Package::new(self.name, path, 6, self.assets)
    }
}

/// A [MemoryStore] which counts how often each package is opened.
#[derive(Debug, Default)]
pub(crate) struct CountingStore {
    pub(crate) inner: MemoryStore,
    pub(crate) opens: Arc<Mutex<Vec<String>>>,
}

pub(crate) fn count_opens(opens: &Mutex<Vec<String>>, package: &Package) -> usize {
    opens
        .lock()
        .iter()
        .filter(|n| n.as_str() == package.name())
        .count()
}

impl PackageStore for CountingStore {
    type Reader = <MemoryStore as PackageStore>::Reader;

    fn open(&self, package: &Package) -> std::io::Result<Self::Reader> {
        self.opens.lock().push(package.name().to_string());
        self.inner.open(package)
    }
}

pub(crate) fn checksum(package: &Package, name: &str) -> Checksum {
    package
        .find_by_name(name)
        .map(|a| a.checksum.clone())
        .unwrap_or_else(|| panic!("No asset {} in {}", name, package.name()))
}

#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub(crate) reports: Mutex<Vec<(Checksum, Anomaly)>>,
}

impl AnomalySink for RecordingSink {
    fn report(&self, _package: &Package, checksum: &Checksum, anomaly: Anomaly) {
        self.reports.lock().push((checksum.clone(), anomaly));
    }
}

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
