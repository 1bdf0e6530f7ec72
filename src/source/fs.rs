//! Local filesystem backend.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::decode::{decode_file, probe_file};
use super::{IdentifierResolver, SourceImage, SourceInfo, SourceLoader, SourceLocation};
use crate::error::SourceError;

/// Extensions tried, in order, when an identifier has no file extension.
pub const DEFAULT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "gif", "webp"];

/// Resolves identifiers to files under a root directory.
///
/// `a/b` resolves to `<root>/a/b` if that file exists, otherwise to the
/// first existing `<root>/a/b.<ext>` for the configured extensions.
/// Identifiers that would escape the root are treated as unknown.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_extensions(root, DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()))
    }

    pub fn with_extensions(
        root: impl Into<PathBuf>,
        extensions: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            root: root.into(),
            extensions: extensions.into_iter().collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidates(&self, identifier: &str) -> Option<Vec<PathBuf>> {
        let relative = Path::new(identifier);
        let safe = !identifier.is_empty()
            && !identifier.contains('\0')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return None;
        }

        let base = self.root.join(relative);
        let mut paths = vec![base.clone()];
        for ext in &self.extensions {
            let mut name = base.clone().into_os_string();
            name.push(".");
            name.push(ext);
            paths.push(PathBuf::from(name));
        }
        Some(paths)
    }
}

#[async_trait]
impl IdentifierResolver for DirectoryResolver {
    async fn resolve(&self, identifier: &str) -> Result<SourceLocation, SourceError> {
        let not_found = || SourceError::NotFound(identifier.to_string());
        let candidates = self.candidates(identifier).ok_or_else(not_found)?;

        for path in candidates {
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                if meta.is_file() {
                    debug!(identifier = %identifier, path = %path.display(), "Resolved identifier");
                    return Ok(SourceLocation::new(path.to_string_lossy()));
                }
            }
        }

        Err(not_found())
    }
}

/// Loads images from local paths on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct FsLoader;

impl FsLoader {
    pub fn new() -> Self {
        Self
    }
}

async fn blocking<T, F>(f: F) -> Result<T, SourceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SourceError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SourceError::Io(format!("blocking task failed: {}", e)))?
}

#[async_trait]
impl SourceLoader for FsLoader {
    async fn probe(&self, location: &SourceLocation) -> Result<SourceInfo, SourceError> {
        let path = PathBuf::from(location.as_str());
        let (width, height, mode) = blocking(move || probe_file(&path)).await?;
        Ok(SourceInfo {
            location: location.clone(),
            width,
            height,
            mode,
        })
    }

    async fn load(&self, location: &SourceLocation) -> Result<SourceImage, SourceError> {
        let path = PathBuf::from(location.as_str());
        blocking(move || decode_file(&path)).await
    }
}
