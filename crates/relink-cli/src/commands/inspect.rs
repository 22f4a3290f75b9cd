//! Binary inspection command (like `otool -L` / `otool -l`, filtered)

use crate::InspectArgs;
use anyhow::{bail, Result};
use relink_core::{BinaryTool, OtoolBackend};
use tracing::trace;

/// Prints references and search paths for each input binary.
///
/// Unreadable binaries are reported and skipped; the command fails at the end
/// if any were.
pub fn run(args: InspectArgs, verbose: u8) -> Result<()> {
    let backend = OtoolBackend::new(&args.otool, "install_name_tool");
    let mut failed = 0;

    for (i, path) in args.input.iter().enumerate() {
        trace!(path = %path.display(), "inspect::run");
        if i > 0 {
            println!();
        }

        let info = match backend.inspect(path) {
            Ok(info) => info,
            Err(e) => {
                failed += 1;
                eprintln!("Error: {}: {}", path.display(), e);
                continue;
            }
        };

        println!("{}", path.display());
        println!("  References ({}):", info.references.len());
        for reference in &info.references {
            println!("    {}", reference);
        }
        println!("  Search paths ({}):", info.search_paths.len());
        for search_path in &info.search_paths {
            let dup = info.search_path_count(search_path) > 1;
            if dup && verbose > 0 {
                println!("    {}  (duplicate)", search_path);
            } else {
                println!("    {}", search_path);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} binaries could not be inspected", failed, args.input.len());
    }
    Ok(())
}
