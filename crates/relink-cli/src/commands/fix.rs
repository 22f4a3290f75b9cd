//! Relink command

use crate::FixArgs;
use anyhow::{bail, Context, Result};
use relink_core::{
    relocate, ArtifactReport, DryRun, Edit, OtoolBackend, Outcome, Phase, RelinkReport,
};
use tracing::{info, warn};

/// Runs the relocation pass and prints one line per change.
///
/// Partial failures are reported but only fail the command with `--strict`.
pub fn run(args: FixArgs, verbose: u8) -> Result<()> {
    check_platform(cfg!(target_os = "macos"), args.force)?;

    let config = super::load_config(&args.layout)?;
    let backend = OtoolBackend::new(&args.otool, &args.install_name_tool);
    info!(root = %config.package_root.display(), dry_run = args.dry_run, "fix::run");

    let result = if args.dry_run {
        relocate(&DryRun::new(backend), &config)
    } else {
        relocate(&backend, &config)
    };
    let report = result
        .with_context(|| format!("Failed to relink {}", config.package_root.display()))?;

    for entry in &report.entries {
        if let Outcome::Failed(msg) = &entry.outcome {
            eprintln!("Error processing {}: {}", entry.path.display(), msg);
        }
    }
    for line in report_lines(&report, args.dry_run, verbose) {
        println!("{}", line);
    }
    println!(
        "Processed: {} changed, {} unchanged, {} failed",
        report.changed(),
        report.unchanged(),
        report.failed()
    );

    exit_status(&report, args.strict)?;
    if !report.has_failures() && !args.dry_run {
        println!("Relinking and RPATH configuration completed successfully.");
    }
    Ok(())
}

/// Refuses to run off macOS unless forced.
fn check_platform(is_macos: bool, force: bool) -> Result<()> {
    if !is_macos && !force {
        bail!("Relinking only applies to macOS binaries (use --force to run anyway)");
    }
    Ok(())
}

/// Partial failure is an error only in strict mode.
fn exit_status(report: &RelinkReport, strict: bool) -> Result<()> {
    if report.has_failures() {
        warn!(failed = report.failed(), "some artifacts may remain unfixed");
        if strict {
            bail!("{} artifacts could not be relinked", report.failed());
        }
    }
    Ok(())
}

/// Progress lines for stdout; failures are printed separately to stderr.
fn report_lines(report: &RelinkReport, dry_run: bool, verbose: u8) -> Vec<String> {
    let prefix = if dry_run { "[dry run] " } else { "" };
    report
        .entries
        .iter()
        .flat_map(|entry| entry_lines(entry, verbose))
        .map(|line| format!("{}{}", prefix, line))
        .collect()
}

fn entry_lines(entry: &ArtifactReport, verbose: u8) -> Vec<String> {
    let path = entry.path.display();
    match &entry.outcome {
        Outcome::Changed(edits) => edits
            .iter()
            .map(|edit| match edit {
                Edit::ChangeReference { old, new } => {
                    format!("Updated {} -> {} in {}", old, new, path)
                }
                Edit::AddSearchPath(p) => format!("Added RPATH '{}' to {}", p, path),
                Edit::DeleteSearchPath(p) => {
                    format!("Removed duplicate RPATH '{}' from {}", p, path)
                }
            })
            .collect(),
        Outcome::Unchanged => match &entry.phase {
            Phase::SearchPath(token) => {
                vec![format!("RPATH '{}' already exists in {}", token, path)]
            }
            Phase::References if verbose > 0 => {
                vec![format!("No bundled references to update in {}", path)]
            }
            Phase::References => Vec::new(),
        },
        Outcome::Failed(_) => Vec::new(),
    }
}
