use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use ocfl_types::{Digest, DigestAlgorithm, IndexedObject, Spec};

use crate::error::{StorageError, StorageResult};
use crate::inventory::{self, Inventory, INVENTORY_FILE};
use crate::layout::StorageLayout;
use crate::traits::{
    ContentReader, ContentSource, InventoryReader, Located, ObjectRoot, RootDescription,
    StorageWalker,
};

const ROOT_DECLARATION_PREFIX: &str = "ocfl_";
const OBJECT_DECLARATION_PREFIX: &str = "ocfl_object_";
const LAYOUT_FILE: &str = "ocfl_layout.json";
const EXTENSIONS_DIR: &str = "extensions";

/// Options for [`FsStorage`].
#[derive(Clone, Debug, Default)]
pub struct FsStorageConfig {
    /// Stat each content file to record its size.
    pub read_sizes: bool,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutFile {
    extension: Option<String>,
    description: Option<String>,
}

/// OCFL storage root on a local filesystem.
pub struct FsStorage {
    root: PathBuf,
    config: FsStorageConfig,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>, config: FsStorageConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a `/`-separated relative path onto the root, refusing anything
    /// that could leave it.
    fn resolve(&self, rel: &str) -> StorageResult<PathBuf> {
        let rel_path = Path::new(rel);
        if rel_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::NotFound(rel.to_string()));
        }
        Ok(self.root.join(rel_path))
    }

    fn read_layout_file(&self) -> StorageResult<LayoutFile> {
        match fs::read(self.root.join(LAYOUT_FILE)) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Layout(format!("{LAYOUT_FILE}: {e}"))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(LayoutFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn layout(&self) -> StorageResult<Option<StorageLayout>> {
        let Some(name) = self.read_layout_file()?.extension else {
            return Ok(None);
        };
        let config_path = self.root.join(EXTENSIONS_DIR).join(&name).join("config.json");
        let config = match fs::read(&config_path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let layout = StorageLayout::from_extension(&name, config.as_deref())?;
        if layout.is_none() {
            debug!(extension = %name, "storage layout not supported; ids resolve via the index only");
        }
        Ok(layout)
    }

    fn sidecar(&self, root: &ObjectRoot) -> StorageResult<(DigestAlgorithm, Digest)> {
        let dir = self.resolve(&root.path)?;
        let prefix = format!("{INVENTORY_FILE}.");
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(alg) = name.to_str().and_then(|n| n.strip_prefix(prefix.as_str())) else {
                continue;
            };
            let Ok(alg) = alg.parse::<DigestAlgorithm>() else {
                continue;
            };
            let contents = fs::read_to_string(entry.path())?;
            let digest = inventory::parse_sidecar(&root.path, &contents)?;
            return Ok((alg, digest));
        }
        Err(StorageError::inventory(&root.path, "missing inventory sidecar"))
    }

    fn relative(&self, path: &Path) -> StorageResult<String> {
        let rel = path
            .strip_prefix(&self.root)
            .map_err(|e| StorageError::Walk(e.to_string()))?;
        let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
        parts
            .map(|p| p.join("/"))
            .ok_or_else(|| StorageError::Walk(format!("non UTF-8 path: {}", path.display())))
    }
}

/// Read the namaste declaration in `dir`, if any.
fn declaration(dir: &Path, prefix: &str) -> io::Result<Option<Spec>> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(spec) = entry
            .file_name()
            .to_str()
            .and_then(|n| Spec::from_declaration(n, prefix))
        {
            return Ok(Some(spec));
        }
    }
    Ok(None)
}

impl StorageWalker for FsStorage {
    fn root_path(&self) -> String {
        self.root.display().to_string()
    }

    fn describe(&self) -> StorageResult<RootDescription> {
        let spec = declaration(&self.root, ROOT_DECLARATION_PREFIX)
            .map_err(|e| StorageError::RootUnavailable {
                path: self.root.clone(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| StorageError::NotAnOcflRoot(self.root.clone()))?;
        let layout = self.read_layout_file()?;
        Ok(RootDescription {
            spec,
            description: layout.description.unwrap_or_default(),
            layout: layout.extension,
        })
    }

    fn walk(&self) -> StorageResult<Box<dyn Iterator<Item = StorageResult<ObjectRoot>> + Send + '_>> {
        self.describe()?;
        let it = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Ok(Box::new(ObjectRoots { storage: self, it }))
    }

    fn locate(&self, id: &str) -> StorageResult<Located> {
        let Some(layout) = self.layout()? else {
            return Ok(Located::Unresolvable);
        };
        let path = layout.path_for(id)?;
        Ok(match self.object_at(&path)? {
            Some(root) => Located::Found(root),
            None => Located::Absent,
        })
    }

    fn object_at(&self, path: &str) -> StorageResult<Option<ObjectRoot>> {
        let dir = self.resolve(path)?;
        match declaration(&dir, OBJECT_DECLARATION_PREFIX) {
            Ok(Some(spec)) => Ok(Some(ObjectRoot {
                path: path.to_string(),
                spec,
            })),
            Ok(None) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Iterator over object roots below the storage root.
struct ObjectRoots<'a> {
    storage: &'a FsStorage,
    it: walkdir::IntoIter,
}

impl Iterator for ObjectRoots<'_> {
    type Item = StorageResult<ObjectRoot>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.it.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(StorageError::Walk(e.to_string()))),
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if entry.depth() == 1 && entry.file_name() == EXTENSIONS_DIR {
                self.it.skip_current_dir();
                continue;
            }
            match declaration(entry.path(), OBJECT_DECLARATION_PREFIX) {
                Ok(Some(spec)) => {
                    self.it.skip_current_dir();
                    return Some(
                        self.storage
                            .relative(entry.path())
                            .map(|path| ObjectRoot { path, spec }),
                    );
                }
                Ok(None) => continue,
                Err(e) => {
                    return Some(Err(StorageError::Walk(format!(
                        "{}: {e}",
                        entry.path().display()
                    ))))
                }
            }
        }
    }
}

impl InventoryReader for FsStorage {
    fn sidecar_digest(&self, root: &ObjectRoot) -> StorageResult<Digest> {
        Ok(self.sidecar(root)?.1)
    }

    fn read(&self, root: &ObjectRoot) -> StorageResult<IndexedObject> {
        let dir = self.resolve(&root.path)?;
        let bytes = fs::read(dir.join(INVENTORY_FILE))
            .map_err(|e| StorageError::inventory(&root.path, e))?;
        let (sidecar_alg, expected) = self.sidecar(root)?;
        let inv = Inventory::from_slice(&root.path, &bytes)?;
        if inv.digest_algorithm != sidecar_alg.as_str() {
            return Err(StorageError::inventory(
                &root.path,
                format!(
                    "sidecar algorithm {sidecar_alg} does not match digestAlgorithm {}",
                    inv.digest_algorithm
                ),
            ));
        }
        let computed = inventory::digest_bytes(sidecar_alg, &bytes)?;
        if computed != expected {
            return Err(StorageError::SidecarMismatch {
                path: root.path.clone(),
                expected: expected.to_string(),
                computed: computed.to_string(),
            });
        }

        let read_sizes = self.config.read_sizes;
        let object = inv.into_object(&root.path, root.spec, |content_path| {
            if !read_sizes {
                return None;
            }
            match fs::metadata(dir.join(content_path)) {
                Ok(meta) if meta.is_file() => Some(meta.len()),
                Ok(_) => None,
                Err(e) => {
                    warn!(object = %root.path, path = content_path, error = %e, "cannot stat content file");
                    None
                }
            }
        })?;
        Ok(object.with_inventory_digest(computed))
    }
}

#[async_trait]
impl ContentSource for FsStorage {
    async fn open(&self, path: &str) -> StorageResult<ContentReader> {
        let full = self.resolve(path)?;
        match tokio::fs::File::open(&full).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
