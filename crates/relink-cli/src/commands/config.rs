//! Config dump command

use crate::ConfigArgs;
use anyhow::{Context, Result};

pub fn run(args: ConfigArgs) -> Result<()> {
    let config = super::load_config(&args.layout)?;
    let yaml = config.to_yaml()?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, yaml)
                .with_context(|| format!("Failed to write: {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => print!("{}", yaml),
    }
    Ok(())
}
