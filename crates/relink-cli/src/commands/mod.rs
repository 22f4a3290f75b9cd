//! CLI command implementations

pub mod config;
pub mod fix;
pub mod inspect;

use crate::LayoutArgs;
use anyhow::{Context, Result};
use relink_core::RelinkConfig;

/// Builds the effective configuration: config file (if any), then `--root`.
pub fn load_config(args: &LayoutArgs) -> Result<RelinkConfig> {
    let mut config = match &args.config {
        Some(path) => RelinkConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => RelinkConfig::default(),
    };
    if let Some(root) = &args.root {
        config.package_root = root.clone();
    }
    Ok(config)
}
