//! [PackageStore] implementations and the bounded reads the cache does through them.
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Error, ErrorKind, Read, Seek, SeekFrom, Take};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::*;

const READ_BUFFER: usize = 8192;

/// A store which resolves package paths against a given root directory.
///
/// This handles the rather tricky path cases around Windows and Linux differences, and makes it so that package paths
/// like `maps/a.crp` work everywhere (behavior with `\` is undefined).  Additionally, it makes a best effort to stop
/// relative paths from escaping the root directory, primarily as a measure to detect bugs.
#[derive(Debug)]
pub struct FilesystemStore {
    root_path: PathBuf,
}

fn conv_path(path: impl AsRef<Path>) -> Result<relative_path::RelativePathBuf, Error> {
    relative_path::RelativePathBuf::from_path(path)
        .map_err(|_| Error::new(ErrorKind::Other, "Invalid path"))
}

impl FilesystemStore {
    pub fn new(root_path: &Path) -> FilesystemStore {
        FilesystemStore {
            root_path: root_path.to_path_buf(),
        }
    }

    /// Resolve and open a file under the root.
    pub fn open_file(&self, path: &Path) -> Result<File, Error> {
        // On Windows, canonicalize is currently very broken when relative path segments appear in the middle of a
        // path, and stdlib doesn't help us out. Go via `RelativePathBuf` to clean it up.
        let absolute = conv_path(path)?.to_logical_path(&self.root_path);
        if !absolute.starts_with(&self.root_path) {
            return Err(Error::new(
                ErrorKind::Other,
                "path is outside the store root directory",
            ));
        }
        File::open(absolute)
    }
}

impl PackageStore for FilesystemStore {
    type Reader = BufReader<File>;

    fn open(&self, package: &Package) -> Result<BufReader<File>, Error> {
        let file = self.open_file(package.path())?;
        Ok(BufReader::with_capacity(READ_BUFFER, file))
    }
}

/// A store keeping whole package files in memory, keyed by package path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<PathBuf, Arc<[u8]>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        Default::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, bytes: Vec<u8>) -> Option<Arc<[u8]>> {
        self.files.write().insert(path.into(), bytes.into())
    }

    pub fn remove(&self, path: &Path) -> Option<Arc<[u8]>> {
        self.files.write().remove(path)
    }
}

impl PackageStore for MemoryStore {
    type Reader = Cursor<Arc<[u8]>>;

    fn open(&self, package: &Package) -> Result<Cursor<Arc<[u8]>>, Error> {
        let bytes = self
            .files
            .read()
            .get(package.path())
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "Package not found"))?;
        Ok(Cursor::new(bytes))
    }
}

/// Check a declared size against the configured bound.
pub(crate) fn checked_size<E: std::error::Error + 'static>(
    asset: &Asset,
    max_size: i64,
) -> Result<usize, SharingError<E>> {
    if asset.size < 0 || asset.size > max_size {
        return Err(SharingError::InvalidSize {
            name: asset.name.clone(),
            size: asset.size,
        });
    }
    Ok(asset.size as usize)
}

/// Read exactly the bytes of one asset from an open package.
pub(crate) fn read_asset<R: Read + Seek, E: std::error::Error + 'static>(
    reader: &mut R,
    package: &Package,
    asset: &Asset,
    max_size: i64,
) -> Result<Vec<u8>, SharingError<E>> {
    let size = checked_size::<E>(asset, max_size)?;
    let pos = reader
        .stream_position()
        .map_err(|e| SharingError::<E>::io(package, e))?;
    if pos != asset.offset {
        reader
            .seek(SeekFrom::Start(asset.offset))
            .map_err(|e| SharingError::<E>::io(package, e))?;
    }

    let mut bytes = vec![0u8; size];
    reader.read_exact(&mut bytes).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            SharingError::<E>::io(
                package,
                Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("unexpected end of file reading {}", asset.name),
                ),
            )
        } else {
            SharingError::<E>::io(package, e)
        }
    })?;
    Ok(bytes)
}

/// Bytes of a single asset, served either from the cache or straight from its package.
pub enum AssetStream<R> {
    Memory(Cursor<Arc<[u8]>>),
    Package(Take<R>),
}

impl<R: Read> AssetStream<R> {
    pub fn is_memory(&self) -> bool {
        matches!(self, AssetStream::Memory(_))
    }

    /// Read the rest of the stream into a vec.
    pub fn into_bytes(mut self) -> Result<Vec<u8>, Error> {
        let mut out = vec![];
        self.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl<R: Read> Read for AssetStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self {
            AssetStream::Memory(c) => c.read(buf),
            AssetStream::Package(t) => t.read(buf),
        }
    }
}

/// Open a package and position a bounded stream over one asset.
pub(crate) fn open_asset_stream<S: PackageStore, E: std::error::Error + 'static>(
    store: &S,
    package: &Package,
    asset: &Asset,
    max_size: i64,
) -> Result<AssetStream<S::Reader>, SharingError<E>> {
    let size = checked_size::<E>(asset, max_size)?;
    let mut reader = store
        .open(package)
        .map_err(|e| SharingError::<E>::io(package, e))?;
    reader
        .seek(SeekFrom::Start(asset.offset))
        .map_err(|e| SharingError::<E>::io(package, e))?;
    Ok(AssetStream::Package(reader.take(size as u64)))
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;

    #[derive(Debug)]
    struct NoError;

    impl fmt::Display for NoError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("no error")
        }
    }

    impl std::error::Error for NoError {}

    type Result<T> = std::result::Result<T, SharingError<NoError>>;

    fn package(path: &str) -> Arc<Package> {
        Package::new(
            "p",
            path,
            1,
            vec![
                Asset::new("a", "ca", AssetKind::Texture, 0, 4),
                Asset::new("b", "cb", AssetKind::Mesh, 4, 4),
                Asset::new("c", "cc", AssetKind::Object, 8, 4),
                Asset::new("neg", "cn", AssetKind::Object, 0, -1),
                Asset::new("past_end", "ce", AssetKind::Object, 10, 4),
            ],
        )
    }

    #[test]
    fn test_filesystem_store() {
        let tmp_dir = tempfile::tempdir().unwrap();

        // Create a directory under the temporary directory so that we can test relative paths.
        let mut root = tmp_dir.path().to_path_buf();
        root.push("actual_dir");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("p.crp"), "aaaabbbbcccc").unwrap();
        // Now, we want to write something outside the root.
        std::fs::write(root.parent().unwrap().join("q.crp"), "dddd").unwrap();

        let store = FilesystemStore::new(&root);
        let p = package("p.crp");
        let mut reader = store.open(&p).unwrap();

        // Out of order reads have to seek back.
        let b: Vec<u8> = read_asset::<_, NoError>(&mut reader, &p, &p.assets()[1], 100).unwrap();
        let a: Vec<u8> = read_asset::<_, NoError>(&mut reader, &p, &p.assets()[0], 100).unwrap();
        let c: Vec<u8> = read_asset::<_, NoError>(&mut reader, &p, &p.assets()[2], 100).unwrap();
        assert_eq!(a, b"aaaa");
        assert_eq!(b, b"bbbb");
        assert_eq!(c, b"cccc");

        let outside = package("../q.crp");
        let e = store.open(&outside).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_invalid_sizes() {
        let store = MemoryStore::new();
        store.insert("p.crp", b"aaaabbbbcccc".to_vec());
        let p = package("p.crp");
        let mut reader = store.open(&p).unwrap();

        let r: Result<Vec<u8>> = read_asset(&mut reader, &p, &p.assets()[3], 100);
        assert!(matches!(r, Err(SharingError::InvalidSize { size: -1, .. })));

        // Bigger than the configured bound.
        let r: Result<Vec<u8>> = read_asset(&mut reader, &p, &p.assets()[0], 3);
        assert!(matches!(r, Err(SharingError::InvalidSize { size: 4, .. })));

        let r: Result<Vec<u8>> = read_asset(&mut reader, &p, &p.assets()[4], 100);
        match r {
            Err(SharingError::Io { source, .. }) => {
                assert_eq!(source.kind(), ErrorKind::UnexpectedEof)
            }
            _ => panic!("Reading past the end should fail"),
        }
    }

    #[test]
    fn test_asset_stream() {
        let store = MemoryStore::new();
        store.insert("p.crp", b"aaaabbbbcccc".to_vec());
        let p = package("p.crp");

        let s: AssetStream<_> =
            open_asset_stream::<_, NoError>(&store, &p, &p.assets()[1], 100).unwrap();
        assert!(!s.is_memory());
        assert_eq!(s.into_bytes().unwrap(), b"bbbb");

        let missing = package("missing.crp");
        let r: Result<AssetStream<_>> = open_asset_stream(&store, &missing, &missing.assets()[0], 100);
        assert!(matches!(r, Err(SharingError::Io { .. })));

        let mem: AssetStream<std::fs::File> = AssetStream::Memory(Cursor::new(Arc::from(&b"xyz"[..])));
        assert!(mem.is_memory());
        assert_eq!(mem.into_bytes().unwrap(), b"xyz");
    }
}
