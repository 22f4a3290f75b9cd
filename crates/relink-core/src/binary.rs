//! Binary metadata model and the inspection/mutation boundary.
//!
//! The relocation policy never parses Mach-O itself. It asks a [`BinaryTool`]
//! for the dependency references and search paths of a file and hands back a
//! list of [`Edit`]s to apply. The production backend shells out to
//! `otool`/`install_name_tool` (see [`crate::otool`]); tests substitute an
//! in-memory fake.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::RelinkResult;

/// Marker the dynamic linker expands to the directory of the loading binary.
pub const LOADER_PATH: &str = "@loader_path";

/// Load-time metadata of a single binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryInfo {
    /// Declared dependency references (install names of linked dylibs).
    pub references: Vec<String>,
    /// Declared runtime search-path entries (`LC_RPATH`), in load order.
    pub search_paths: Vec<String>,
}

impl BinaryInfo {
    /// Number of times `token` appears among the search paths.
    pub fn search_path_count(&self, token: &str) -> usize {
        self.search_paths.iter().filter(|p| p.as_str() == token).count()
    }

    /// Applies `edit` the way `install_name_tool` does: every matching
    /// reference is changed, a search path is appended, or the first matching
    /// search path is removed.
    pub fn apply(&mut self, edit: &Edit) {
        match edit {
            Edit::ChangeReference { old, new } => {
                for r in self.references.iter_mut().filter(|r| r.as_str() == old.as_str()) {
                    *r = new.clone();
                }
            }
            Edit::AddSearchPath(p) => self.search_paths.push(p.clone()),
            Edit::DeleteSearchPath(p) => {
                if let Some(idx) = self.search_paths.iter().position(|s| s == p) {
                    self.search_paths.remove(idx);
                }
            }
        }
    }
}

/// A single metadata mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Replace one dependency reference with another.
    ChangeReference {
        /// Reference as currently recorded.
        old: String,
        /// Replacement reference.
        new: String,
    },
    /// Append a search-path entry.
    AddSearchPath(String),
    /// Remove one occurrence of a search-path entry.
    DeleteSearchPath(String),
}

impl fmt::Display for Edit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edit::ChangeReference { old, new } => write!(f, "{} -> {}", old, new),
            Edit::AddSearchPath(p) => write!(f, "+rpath {}", p),
            Edit::DeleteSearchPath(p) => write!(f, "-rpath {}", p),
        }
    }
}

/// Capability to read and rewrite the load metadata of a binary.
pub trait BinaryTool {
    /// Reports declared references and search paths of `path`.
    fn inspect(&self, path: &Path) -> RelinkResult<BinaryInfo>;

    /// Applies `edits` to `path` in place.
    fn mutate(&self, path: &Path, edits: &[Edit]) -> RelinkResult<()>;
}

impl<T: BinaryTool + ?Sized> BinaryTool for &T {
    fn inspect(&self, path: &Path) -> RelinkResult<BinaryInfo> {
        (**self).inspect(path)
    }

    fn mutate(&self, path: &Path, edits: &[Edit]) -> RelinkResult<()> {
        (**self).mutate(path, edits)
    }
}

/// Wrapper that inspects for real but only logs mutations.
///
/// Skipped edits are remembered per path and replayed on later inspections,
/// so multi-step policies see the state they would have produced.
#[derive(Debug)]
pub struct DryRun<T> {
    inner: T,
    pending: RefCell<HashMap<PathBuf, Vec<Edit>>>,
}

impl<T: BinaryTool> DryRun<T> {
    /// Wraps `inner`.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            pending: RefCell::new(HashMap::new()),
        }
    }

    /// Returns the wrapped tool.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: BinaryTool> BinaryTool for DryRun<T> {
    fn inspect(&self, path: &Path) -> RelinkResult<BinaryInfo> {
        let mut info = self.inner.inspect(path)?;
        if let Some(edits) = self.pending.borrow().get(path) {
            edits.iter().for_each(|e| info.apply(e));
        }
        Ok(info)
    }

    fn mutate(&self, path: &Path, edits: &[Edit]) -> RelinkResult<()> {
        for edit in edits {
            info!(path = %path.display(), %edit, "dry run: skipping edit");
        }
        self.pending
            .borrow_mut()
            .entry(path.to_path_buf())
            .or_default()
            .extend_from_slice(edits);
        Ok(())
    }
}

/// Self-relative form of a dependency reference: `@loader_path/<basename>`.
///
/// Returns `None` when the reference has no file name component.
pub fn self_relative(reference: &str) -> Option<String> {
    let name = Path::new(reference).file_name()?.to_str()?;
    Some(format!("{}/{}", LOADER_PATH, name))
}
