//! Packages, the assets inside them, and references into the prefetch queue.
//!
//! All of these are immutable once built and shared behind `Arc`.  The cache only ever holds checksums and references.
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::RandomState;

/// Stable content identifier of an asset, used as the cache key.  Clones are cheap.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum(Arc<str>);

impl Checksum {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Checksum {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Checksum {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Checksum {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Checksum {
    fn from(s: &str) -> Self {
        Checksum(s.into())
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Checksum(s.into())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Object,
    Material,
    Texture,
    Mesh,
    /// Anything else a package may carry.  Never cached.
    Other,
}

impl AssetKind {
    pub fn is_supported(self) -> bool {
        !matches!(self, AssetKind::Other)
    }

    /// Textures and meshes get unpacked on the decoder thread.
    pub fn is_decodable(self) -> bool {
        matches!(self, AssetKind::Texture | AssetKind::Mesh)
    }
}

/// One named blob inside a package.
#[derive(Clone, Debug)]
pub struct Asset {
    pub name: String,
    pub checksum: Checksum,
    pub kind: AssetKind,
    pub offset: u64,
    /// Declared size.  Signed because a corrupt directory can declare anything, and the loader has to reject it.
    pub size: i64,
}

impl Asset {
    pub fn new(
        name: impl Into<String>,
        checksum: impl Into<Checksum>,
        kind: AssetKind,
        offset: u64,
        size: i64,
    ) -> Asset {
        Asset {
            name: name.into(),
            checksum: checksum.into(),
            kind,
            offset,
            size,
        }
    }
}

/// A container file holding many assets at known offsets.
#[derive(Debug)]
pub struct Package {
    name: String,
    path: PathBuf,
    version: u32,
    /// In on-disk order.
    assets: Vec<Arc<Asset>>,
    by_checksum: HashMap<Checksum, usize, RandomState>,
}

impl Package {
    /// Build a package from its directory.  `path` is interpreted by the [crate::PackageStore] that opens it.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        version: u32,
        assets: Vec<Asset>,
    ) -> Arc<Package> {
        let assets: Vec<Arc<Asset>> = assets.into_iter().map(Arc::new).collect();
        let mut by_checksum =
            HashMap::with_capacity_and_hasher(assets.len(), RandomState::new());
        for (i, a) in assets.iter().enumerate() {
            // First one wins if a package repeats a checksum.
            by_checksum.entry(a.checksum.clone()).or_insert(i);
        }

        Arc::new(Package {
            name: name.into(),
            path: path.into(),
            version,
            assets,
            by_checksum,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// The assets in on-disk order.
    pub fn assets(&self) -> &[Arc<Asset>] {
        &self.assets
    }

    pub fn find(&self, checksum: &str) -> Option<&Arc<Asset>> {
        self.by_checksum.get(checksum).map(|&i| &self.assets[i])
    }

    /// Find the asset with the given name.  This is a linear scan.
    pub fn find_by_name(&self, name: &str) -> Option<&Arc<Asset>> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// One entry of the prefetch queue.
///
/// Queue entries are matched against package contents by pointer identity, so build them from the assets of the
/// package itself, for example with [AssetRef::by_name].
#[derive(Clone, Debug)]
pub struct AssetRef {
    pub package: Arc<Package>,
    pub asset: Arc<Asset>,
}

impl AssetRef {
    pub fn new(package: Arc<Package>, asset: Arc<Asset>) -> AssetRef {
        AssetRef { package, asset }
    }

    pub fn by_name(package: &Arc<Package>, name: &str) -> Option<AssetRef> {
        let asset = package.find_by_name(name)?.clone();
        Some(AssetRef::new(package.clone(), asset))
    }

    pub fn by_checksum(package: &Arc<Package>, checksum: &str) -> Option<AssetRef> {
        let asset = package.find(checksum)?.clone();
        Some(AssetRef::new(package.clone(), asset))
    }

    pub fn checksum(&self) -> &Checksum {
        &self.asset.checksum
    }

    pub(crate) fn is_same_package(&self, other: &Arc<Package>) -> bool {
        Arc::ptr_eq(&self.package, other)
    }

    pub(crate) fn is_asset(&self, asset: &Arc<Asset>) -> bool {
        Arc::ptr_eq(&self.asset, asset)
    }
}
