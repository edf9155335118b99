//! Route directory scanning

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;

/// One candidate route file, with the name forms the strategies compare against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteFile {
    pub path: PathBuf,
    /// File name as found on disk
    pub name: String,
    /// Lowercased file name without its extension
    pub stem_lower: String,
    /// Lowercased extension, empty when there is none
    pub extension_lower: String,
}

impl RouteFile {
    pub fn new(path: PathBuf) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        let (stem, extension) = match name.rfind('.') {
            Some(idx) if idx > 0 => (&name[..idx], &name[idx + 1..]),
            _ => (name.as_str(), ""),
        };
        Some(Self {
            stem_lower: stem.to_lowercase(),
            extension_lower: extension.to_lowercase(),
            name,
            path,
        })
    }
}

/// All files under a route directory, in a stable (name-sorted) order
#[derive(Debug, Clone, Default)]
pub struct RouteCatalog {
    root: PathBuf,
    files: Vec<RouteFile>,
}

impl RouteCatalog {
    /// Recursively list the files under `root`.
    ///
    /// A missing directory is not an error: the export simply has no routes,
    /// and every workout will be emitted without coordinates.
    pub fn scan(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            tracing::warn!(
                "Route directory {} does not exist; workouts will have no coordinates",
                root.display()
            );
            return Ok(Self { root, files: Vec::new() });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable route directory entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match RouteFile::new(entry.into_path()) {
                Some(file) => files.push(file),
                None => tracing::debug!("Skipping route file with a non UTF-8 name"),
            }
        }

        files.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));

        tracing::info!("Found {} route files in {}", files.len(), root.display());
        Ok(Self { root, files })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[RouteFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
