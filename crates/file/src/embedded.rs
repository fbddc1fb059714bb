//! Bundled (in-process, read-only) filesystems for `embed://` URIs

use crate::error::{Error, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::marker::PhantomData;

/// A read-only filesystem shipped inside the running binary
///
/// Paths are relative and `/`-separated, without a leading separator.
pub trait BundledFs: Send + Sync + 'static {
    /// Return the full contents of `path`, or `None` if there is no such file
    fn read(&self, path: &str) -> Option<Cow<'static, [u8]>>;
}

/// Map-backed bundled filesystem
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: BTreeMap<String, Cow<'static, [u8]>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<Cow<'static, [u8]>>) {
        let path = path.into();
        self.files
            .insert(path.trim_start_matches('/').to_string(), contents.into());
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl<P, C> FromIterator<(P, C)> for MemoryFs
where
    P: Into<String>,
    C: Into<Cow<'static, [u8]>>,
{
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut fs = MemoryFs::new();
        for (path, contents) in iter {
            fs.insert(path, contents);
        }
        fs
    }
}

impl BundledFs for MemoryFs {
    fn read(&self, path: &str) -> Option<Cow<'static, [u8]>> {
        self.files.get(path).cloned()
    }
}

/// Adapter exposing a [`rust_embed::RustEmbed`] bundle as a [`BundledFs`]
///
/// ```ignore
/// #[derive(rust_embed::RustEmbed)]
/// #[folder = "manifests/"]
/// struct Manifests;
///
/// let fs = EmbeddedAssets::<Manifests>::new();
/// ```
pub struct EmbeddedAssets<E> {
    _bundle: PhantomData<fn() -> E>,
}

impl<E: rust_embed::RustEmbed> EmbeddedAssets<E> {
    pub fn new() -> Self {
        Self {
            _bundle: PhantomData,
        }
    }
}

impl<E: rust_embed::RustEmbed> Default for EmbeddedAssets<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: rust_embed::RustEmbed + 'static> BundledFs for EmbeddedAssets<E> {
    fn read(&self, path: &str) -> Option<Cow<'static, [u8]>> {
        E::get(path).map(|file| file.data)
    }
}

/// Turn the remainder of an `embed:` URI into a bundle-relative path
pub(crate) fn bundle_path(rest: &str) -> &str {
    rest.trim_start_matches('/')
}

/// Read `path` out of the optional bundled filesystem
pub(crate) fn read(fs: Option<&dyn BundledFs>, uri: &str, path: &str) -> Result<Vec<u8>> {
    let Some(fs) = fs else {
        return Err(Error::UnsupportedSource {
            uri: uri.to_string(),
        });
    };

    let contents = fs.read(path).ok_or_else(|| Error::NotFound {
        uri: uri.to_string(),
        source: None,
    })?;

    tracing::debug!("Read {} bytes from embedded file: {}", contents.len(), path);

    Ok(contents.into_owned())
}
