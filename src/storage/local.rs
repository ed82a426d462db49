use reqwest::Url;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{BlobStore, StorageError};

/// In-flight uploads live here, beside the containers, never inside one.
const UPLOAD_DIR: &str = ".uploads";

static UPLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem-backed store: one directory per container under `root`.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        fs::create_dir_all(root.as_ref())?;
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root })
    }

    /// `<data dir>/docket-scanner/blobs`, or `./blobs` when no data dir is known.
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("docket-scanner").join("blobs"))
            .unwrap_or_else(|| PathBuf::from("blobs"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, container: &str) -> Result<PathBuf, StorageError> {
        if container.is_empty()
            || container.starts_with('.')
            || container.contains(|c| c == '/' || c == '\\')
        {
            return Err(StorageError::Request(format!(
                "invalid container name '{}'",
                container
            )));
        }
        Ok(self.root.join(container))
    }

    fn blob_path(&self, container: &str, name: &str) -> Result<PathBuf, StorageError> {
        let mut path = self.container_dir(container)?;
        for part in name.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(StorageError::Request(format!("invalid blob name '{}'", name)));
            }
            path.push(part);
        }
        Ok(path)
    }

    fn not_found(container: &str, name: &str) -> StorageError {
        StorageError::NotFound {
            container: container.to_string(),
            name: name.to_string(),
        }
    }
}

fn collect_names(dir: &Path, prefix: &str, out: &mut Vec<String>) -> std::io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let name = if prefix.is_empty() {
            file_name
        } else {
            format!("{}/{}", prefix, file_name)
        };
        if entry.file_type()?.is_dir() {
            collect_names(&entry.path(), &name, out)?;
        } else {
            out.push(name);
        }
    }
    Ok(())
}

impl BlobStore for LocalBlobStore {
    fn list(&self, container: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.container_dir(container)?;
        let mut names = Vec::new();
        match collect_names(&dir, "", &mut names) {
            Ok(()) => Ok(names),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, container: &str, name: &str) -> String {
        let path = self.root.join(container).join(name);
        Url::from_file_path(&path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| path.display().to_string())
    }

    fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.blob_path(container, name)?;
        fs::read(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Self::not_found(container, name)
            } else {
                e.into()
            }
        })
    }

    fn put(
        &self,
        container: &str,
        name: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<(), StorageError> {
        let path = self.blob_path(container, name)?;
        if !overwrite && path.exists() {
            return Err(StorageError::AlreadyExists {
                container: container.to_string(),
                name: name.to_string(),
            });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write then rename so a reader never sees half a blob.
        let uploads = self.root.join(UPLOAD_DIR);
        fs::create_dir_all(&uploads)?;
        let temp = uploads.join(format!(
            "{}-{}",
            std::process::id(),
            UPLOAD_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp, bytes)?;
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    fn delete(&self, container: &str, name: &str) -> Result<(), StorageError> {
        let path = self.blob_path(container, name)?;
        fs::remove_file(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Self::not_found(container, name)
            } else {
                e.into()
            }
        })
    }
}
