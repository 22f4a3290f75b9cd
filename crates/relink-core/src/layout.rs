//! Package layout discovery and precondition checks.
//!
//! [`PackageLayout::resolve`] locates every binary the relocation pass needs
//! and fails before anything is modified if one of them is absent.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::config::RelinkConfig;
use crate::error::{RelinkError, RelinkResult};

/// Extension of staged shared libraries.
pub const DYLIB_EXTENSION: &str = "dylib";

/// Binaries located under a package root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    /// Staging directory holding the bundled shared libraries.
    pub libs_dir: PathBuf,
    /// One loadable module per module directory, in config order.
    pub modules: Vec<PathBuf>,
    /// Largest real file of each library family, in config order.
    pub family_libraries: Vec<PathBuf>,
    /// Exact-named runtime libraries.
    pub runtime_libraries: Vec<PathBuf>,
}

impl PackageLayout {
    /// Locates all required binaries.
    ///
    /// # Errors
    ///
    /// [`RelinkError::NoMatch`], [`RelinkError::AmbiguousModule`] or
    /// [`RelinkError::MissingArtifact`] if any required file is absent.
    pub fn resolve(config: &RelinkConfig) -> RelinkResult<Self> {
        let libs_dir = config.libs_path();

        let modules = config
            .module_paths()
            .map(|dir| find_module(&dir, &config.module_extension))
            .collect::<RelinkResult<Vec<_>>>()?;

        let family_libraries = config
            .library_families
            .iter()
            .map(|pattern| largest_real_file(&libs_dir, pattern))
            .collect::<RelinkResult<Vec<_>>>()?;

        let runtime_libraries: Vec<PathBuf> = config
            .runtime_libraries
            .iter()
            .map(|name| libs_dir.join(name))
            .collect();

        let layout = Self {
            libs_dir,
            modules,
            family_libraries,
            runtime_libraries,
        };
        for path in layout.required() {
            if !path.is_file() {
                return Err(RelinkError::MissingArtifact { path: path.clone() });
            }
        }
        debug!(?layout, "layout resolved");
        Ok(layout)
    }

    /// All required binaries: modules, family libraries, runtime libraries.
    pub fn required(&self) -> impl Iterator<Item = &PathBuf> {
        self.modules
            .iter()
            .chain(&self.family_libraries)
            .chain(&self.runtime_libraries)
    }

    /// Binaries that receive the self-relative search path.
    pub fn loader_targets(&self) -> Vec<PathBuf> {
        self.required().cloned().collect()
    }
}

/// Finds the single `*.<ext>` module in `dir`.
pub fn find_module(dir: &Path, ext: &str) -> RelinkResult<PathBuf> {
    let pattern = format!("*.{}", ext);
    let mut found = matching_files(dir, &pattern)?;
    match found.len() {
        0 => Err(RelinkError::NoMatch {
            pattern,
            dir: dir.to_path_buf(),
        }),
        1 => Ok(found.remove(0)),
        count => Err(RelinkError::AmbiguousModule {
            dir: dir.to_path_buf(),
            count,
        }),
    }
}

/// Largest non-symlink file in `dir` matching `pattern`.
pub fn largest_real_file(dir: &Path, pattern: &str) -> RelinkResult<PathBuf> {
    let mut best: Option<(u64, PathBuf)> = None;
    for path in matching_files(dir, pattern)? {
        let meta = std::fs::symlink_metadata(&path)?;
        if meta.file_type().is_symlink() {
            trace!(path = %path.display(), "skipping symlink");
            continue;
        }
        if best.as_ref().is_none_or(|(size, _)| meta.len() > *size) {
            best = Some((meta.len(), path));
        }
    }
    best.map(|(_, path)| path).ok_or_else(|| RelinkError::NoMatch {
        pattern: pattern.to_string(),
        dir: dir.to_path_buf(),
    })
}

/// Staged `*.dylib` files, sorted.
///
/// Each library is listed once: a symlink is kept only when its resolved
/// target is not already staged under another name. Dangling links are
/// skipped.
pub fn staged_libraries(libs_dir: &Path) -> RelinkResult<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut libs = Vec::new();
    let mut links = Vec::new();

    for path in matching_files(libs_dir, &format!("*.{}", DYLIB_EXTENSION))? {
        if std::fs::symlink_metadata(&path)?.file_type().is_symlink() {
            links.push(path);
            continue;
        }
        seen.insert(std::fs::canonicalize(&path)?);
        libs.push(path);
    }

    for link in links {
        match std::fs::canonicalize(&link) {
            Ok(target) if seen.insert(target.clone()) => {
                debug!(link = %link.display(), target = %target.display(), "staging symlinked library");
                libs.push(link);
            }
            Ok(_) => trace!(path = %link.display(), "skipping symlink to staged library"),
            Err(e) => trace!(path = %link.display(), error = %e, "skipping dangling symlink"),
        }
    }
    libs.sort();
    Ok(libs)
}

/// Entries of `dir` whose file name matches `pattern`, in sorted order.
fn matching_files(dir: &Path, pattern: &str) -> RelinkResult<Vec<PathBuf>> {
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        pattern
    );
    let mut paths: Vec<PathBuf> = glob::glob(&full)?.filter_map(|r| r.ok()).collect();
    paths.sort();
    Ok(paths)
}
