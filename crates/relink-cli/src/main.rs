//! oiio-relink - post-build relocation for bundled OpenImageIO/OpenColorIO dylibs
//!
//! Rewrites install names and LC_RPATH entries so the packaged binaries load
//! from their own directory instead of build-time paths.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "oiio-relink")]
#[command(author, version, about = "Relink bundled macOS dylibs for relocatable packaging")]
#[command(long_about = "
Rewrites dependency references of staged dylibs to @loader_path and makes sure
the extension modules and core libraries carry the LC_RPATH entries they need.

Examples:
  oiio-relink fix                               # Relink ./oiio_python
  oiio-relink fix --root build/oiio_python      # Explicit package root
  oiio-relink fix --dry-run -v                  # Show planned edits only
  oiio-relink fix --config relink.yaml --strict # Fail on partial relinking
  oiio-relink inspect libs/libOpenImageIO.2.5.16.dylib
  oiio-relink config > relink.yaml              # Dump default settings
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write log records to this file
    #[arg(long, global = true)]
    log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Relink staged libraries and provision search paths
    Fix(FixArgs),

    /// Show dependency references and search paths of binaries
    #[command(visible_alias = "i")]
    Inspect(InspectArgs),

    /// Print the effective configuration as YAML
    Config(ConfigArgs),
}

/// Settings shared by commands that read a package layout.
#[derive(Args)]
struct LayoutArgs {
    /// Package root (overrides the config file)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct FixArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    /// Inspect and report, but do not modify any binary
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Exit with an error if any artifact could not be fixed
    #[arg(long)]
    strict: bool,

    /// Run even when not on macOS
    #[arg(long)]
    force: bool,

    /// Inspection tool
    #[arg(long, default_value = "otool")]
    otool: String,

    /// Mutation tool
    #[arg(long, default_value = "install_name_tool")]
    install_name_tool: String,
}

#[derive(Args)]
struct InspectArgs {
    /// Binaries to inspect
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Inspection tool
    #[arg(long, default_value = "otool")]
    otool: String,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    /// Write to file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log.as_deref())?;

    match cli.command {
        Commands::Fix(args) => commands::fix::run(args, cli.verbose),
        Commands::Inspect(args) => commands::inspect::run(args, cli.verbose),
        Commands::Config(args) => commands::config::run(args),
    }
}

/// Installs the tracing subscriber. `RUST_LOG` overrides the `-v` level.
///
/// The returned guard flushes the file writer on drop.
fn init_logging(verbose: u8, log: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match log {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log path: {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fix_flags_parse() {
        let cli = Cli::try_parse_from([
            "oiio-relink", "-vv", "fix", "--root", "pkg", "--dry-run", "--strict",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Fix(args) => {
                assert_eq!(args.layout.root, Some(PathBuf::from("pkg")));
                assert!(args.dry_run);
                assert!(args.strict);
                assert!(!args.force);
                assert_eq!(args.otool, "otool");
            }
            _ => panic!("expected fix"),
        }
    }

    #[test]
    fn inspect_requires_input() {
        assert!(Cli::try_parse_from(["oiio-relink", "inspect"]).is_err());
    }
}
