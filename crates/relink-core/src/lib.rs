//! # relink-core
//!
//! Post-build relocation for the bundled OpenImageIO/OpenColorIO macOS
//! binaries.
//!
//! After the native build stages its dylibs into `<root>/libs`, their
//! install names still point at build-time locations (`@rpath/...` or
//! absolute paths). This crate rewrites those references to
//! `@loader_path/<name>` and makes sure the extension modules and core
//! libraries carry the `LC_RPATH` entries they need, so the package loads
//! wherever it is installed.
//!
//! ```ignore
//! use relink_core::{relocate, OtoolBackend, RelinkConfig};
//!
//! let config = RelinkConfig::with_root("build/oiio_python");
//! let report = relocate(&OtoolBackend::default(), &config)?;
//! if report.has_failures() {
//!     eprintln!("{} artifacts not fixed", report.failed());
//! }
//! ```
//!
//! ## Crate Structure
//!
//! - [`binary`] - [`BinaryTool`] trait, [`Edit`], [`DryRun`] wrapper
//! - [`otool`] - `otool` / `install_name_tool` backend
//! - [`layout`] - package discovery and precondition checks
//! - [`relocate`](mod@relocate) - reference rewriting and search-path provisioning
//! - [`report`] - per-artifact outcomes
//! - [`config`] - YAML-loadable settings

#![warn(missing_docs)]

pub mod binary;
pub mod config;
pub mod error;
pub mod layout;
pub mod otool;
pub mod relocate;
pub mod report;

pub use binary::{BinaryInfo, BinaryTool, DryRun, Edit, LOADER_PATH};
pub use config::RelinkConfig;
pub use error::{RelinkError, RelinkResult};
pub use layout::PackageLayout;
pub use otool::OtoolBackend;
pub use relocate::{ensure_search_path, relocate, rewrite_references};
pub use report::{ArtifactReport, Outcome, Phase, RelinkReport};
