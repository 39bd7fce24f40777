//! Assemblies: named bundles of byte blobs addressed by relative path
//!
//! The store only resolves a name to a stream. Caching is the registry's job.

use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use super::error::ResourceError;
use super::identity::ResourceIdentity;

/// Global counter for generating unique assembly IDs
static NEXT_ASSEMBLY_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a new unique assembly ID
fn next_id() -> AssemblyId {
    AssemblyId(NEXT_ASSEMBLY_ID.fetch_add(1, Ordering::Relaxed))
}

/// Opaque identity of a registered assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssemblyId(u64);

/// Backing storage for an assembly's blobs.
pub trait AssemblySource {
    /// Read the whole blob at `path`.
    ///
    /// Missing blobs must be reported with [`io::ErrorKind::NotFound`].
    fn read(&self, path: &str) -> io::Result<Cow<'static, [u8]>>;

    /// Check whether a blob exists at `path`
    fn contains(&self, path: &str) -> bool;
}

/// Blobs held in memory, usually `include_bytes!` data compiled into the binary
#[derive(Debug, Default)]
pub struct EmbeddedSource {
    blobs: FxHashMap<String, Cow<'static, [u8]>>,
}

impl EmbeddedSource {
    /// Create an empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a static blob
    #[must_use]
    pub fn with(mut self, path: impl Into<String>, bytes: &'static [u8]) -> Self {
        self.blobs.insert(path.into(), Cow::Borrowed(bytes));
        self
    }

    /// Add an owned blob
    #[must_use]
    pub fn with_bytes(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    /// Insert an owned blob, replacing any previous one at `path`
    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.blobs.insert(path.into(), Cow::Owned(bytes.into()));
    }

    /// Number of blobs
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Check if there are no blobs
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl AssemblySource for EmbeddedSource {
    fn read(&self, path: &str) -> io::Result<Cow<'static, [u8]>> {
        self.blobs.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no embedded blob at `{path}`"))
        })
    }

    fn contains(&self, path: &str) -> bool {
        self.blobs.contains_key(path)
    }
}

/// Blobs stored as files below a root directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Create a source rooted at `root`
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative blob path, refusing anything that escapes the root
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("blob path `{path}` must be relative to the assembly root"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl AssemblySource for DirectorySource {
    fn read(&self, path: &str) -> io::Result<Cow<'static, [u8]>> {
        let full = self.resolve(path)?;
        fs::read(full).map(Cow::Owned)
    }

    fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|full| full.is_file())
    }
}

struct AssemblyInner {
    id: AssemblyId,
    name: String,
    source: Box<dyn AssemblySource>,
}

/// Shared handle to a registered assembly.
///
/// Cloning is cheap; all clones refer to the same assembly.
#[derive(Clone)]
pub struct AssemblyHandle {
    inner: Rc<AssemblyInner>,
}

impl AssemblyHandle {
    fn new(name: String, source: Box<dyn AssemblySource>) -> Self {
        Self {
            inner: Rc::new(AssemblyInner {
                id: next_id(),
                name,
                source,
            }),
        }
    }

    /// Get the unique ID of this assembly
    #[must_use]
    pub fn id(&self) -> AssemblyId {
        self.inner.id
    }

    /// Get the registered name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Check whether a blob exists at `path`
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.inner.source.contains(path)
    }

    /// Open the blob at `path` as a stream
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if there is no such blob, `Io` if it
    /// cannot be read
    pub fn open(&self, path: &str) -> Result<ResourceStream, ResourceError> {
        match self.inner.source.read(path) {
            Ok(bytes) => Ok(ResourceStream::new(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(
                ResourceError::ResourceNotFound(ResourceIdentity::new(self, path)),
            ),
            Err(source) => Err(ResourceError::Io {
                identity: ResourceIdentity::new(self, path),
                source,
            }),
        }
    }
}

impl PartialEq for AssemblyHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for AssemblyHandle {}

impl fmt::Debug for AssemblyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

/// Readable stream over one blob
#[derive(Debug)]
pub struct ResourceStream {
    cursor: Cursor<Cow<'static, [u8]>>,
}

impl ResourceStream {
    fn new(bytes: Cow<'static, [u8]>) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    /// Total length of the blob in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    /// Check if the blob is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes not yet read
    #[must_use]
    pub fn remaining(&self) -> usize {
        let position = usize::try_from(self.cursor.position()).unwrap_or(usize::MAX);
        self.len().saturating_sub(position)
    }

    /// Check whether the whole blob has been read
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.remaining() == 0
    }

    /// Read everything that is left
    ///
    /// # Errors
    ///
    /// Propagates read failures
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.remaining());
        self.cursor.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Read everything that is left as UTF-8 text
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the content is not valid UTF-8
    pub fn read_text(&mut self) -> io::Result<String> {
        let mut text = String::with_capacity(self.remaining());
        self.cursor.read_to_string(&mut text)?;
        Ok(text)
    }
}

impl Read for ResourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

/// Registry of the assemblies known to this process
#[derive(Default)]
pub struct AssemblyStore {
    assemblies: FxHashMap<String, AssemblyHandle>,
}

impl AssemblyStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new assembly under `name`
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAssembly` if the name is already taken
    pub fn register(
        &mut self,
        name: impl Into<String>,
        source: impl AssemblySource + 'static,
    ) -> Result<AssemblyHandle, ResourceError> {
        let name = name.into();
        if self.assemblies.contains_key(&name) {
            return Err(ResourceError::DuplicateAssembly(name));
        }

        let handle = AssemblyHandle::new(name.clone(), Box::new(source));
        self.assemblies.insert(name, handle.clone());
        log::debug!("Registered assembly `{}`", handle.name());
        Ok(handle)
    }

    /// Look up an assembly by name
    ///
    /// # Errors
    ///
    /// Returns `AssemblyNotRegistered` if no such assembly exists
    pub fn get(&self, name: &str) -> Result<AssemblyHandle, ResourceError> {
        self.try_get(name)
            .ok_or_else(|| ResourceError::AssemblyNotRegistered(name.to_string()))
    }

    /// Look up an assembly by name
    #[must_use]
    pub fn try_get(&self, name: &str) -> Option<AssemblyHandle> {
        self.assemblies.get(name).cloned()
    }

    /// Open `path` inside `assembly`
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if there is no such blob
    pub fn open(
        &self,
        assembly: &AssemblyHandle,
        path: &str,
    ) -> Result<ResourceStream, ResourceError> {
        assembly.open(path)
    }

    /// Names of all registered assemblies
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.assemblies.keys().map(String::as_str)
    }

    /// Number of registered assemblies
    #[must_use]
    pub fn len(&self) -> usize {
        self.assemblies.len()
    }

    /// Check if no assembly is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assemblies.is_empty()
    }
}
