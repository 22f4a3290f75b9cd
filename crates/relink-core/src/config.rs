//! Relocation configuration.
//!
//! [`RelinkConfig::default`] describes the stock OpenImageIO/OpenColorIO
//! wheel layout. A YAML file can override any field:
//!
//! ```yaml
//! package_root: build/oiio_python
//! libs_dir: libs
//! modules: [OpenImageIO, PyOpenColorIO]
//! runtime_libraries: [libtbb.12.10.dylib]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::binary::LOADER_PATH;
use crate::error::{RelinkError, RelinkResult};

/// Settings for one relocation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelinkConfig {
    /// Package root holding the module directories and the staging directory.
    pub package_root: PathBuf,
    /// Staging directory, relative to `package_root`.
    pub libs_dir: PathBuf,
    /// Extension-module directories, relative to `package_root`.
    pub modules: Vec<PathBuf>,
    /// File extension of loadable modules, without the dot.
    pub module_extension: String,
    /// Versioned library families; the largest real file of each is required.
    pub library_families: Vec<String>,
    /// Exact-named runtime libraries that must be present.
    pub runtime_libraries: Vec<String>,
    /// Name stems of bundled libraries whose references get rewritten.
    pub reference_stems: Vec<String>,
    /// Search path added to every required binary.
    pub loader_search_path: String,
    /// Search path added to the extension modules only.
    pub staging_search_path: String,
}

impl Default for RelinkConfig {
    fn default() -> Self {
        Self {
            package_root: PathBuf::from("oiio_python"),
            libs_dir: PathBuf::from("libs"),
            modules: vec![PathBuf::from("OpenImageIO"), PathBuf::from("PyOpenColorIO")],
            module_extension: "so".into(),
            library_families: vec![
                "libOpenImageIO.*.dylib".into(),
                "libOpenColorIO.*.dylib".into(),
            ],
            runtime_libraries: vec!["libtbb.12.10.dylib".into()],
            reference_stems: [
                "libtbb",
                "libtbbmalloc",
                "libtbbmalloc_proxy",
                "libOpenImageIO",
                "libOpenColorIO",
                "libOpenImageIO_Util",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            loader_search_path: LOADER_PATH.into(),
            staging_search_path: format!("{}/../../.dylibs", LOADER_PATH),
        }
    }
}

impl RelinkConfig {
    /// Default layout rooted at `package_root`.
    pub fn with_root(package_root: impl Into<PathBuf>) -> Self {
        Self {
            package_root: package_root.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// A relative `package_root` is resolved against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> RelinkResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RelinkError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content)?;
        if config.package_root.is_relative() {
            if let Some(dir) = path.parent() {
                config.package_root = dir.join(&config.package_root);
            }
        }
        Ok(config)
    }

    /// Parses configuration from a YAML string; missing fields keep defaults.
    pub fn from_yaml_str(yaml: &str) -> RelinkResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serializes to YAML.
    pub fn to_yaml(&self) -> RelinkResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Staging directory joined onto the package root.
    pub fn libs_path(&self) -> PathBuf {
        self.package_root.join(&self.libs_dir)
    }

    /// Module directories joined onto the package root.
    pub fn module_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.modules.iter().map(|m| self.package_root.join(m))
    }
}
