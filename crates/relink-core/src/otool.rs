//! `otool` / `install_name_tool` backend.
//!
//! Inspection runs `otool -l` and reads the load-command listing:
//!
//! ```text
//! Load command 12
//!           cmd LC_LOAD_DYLIB
//!       cmdsize 56
//!          name @rpath/libtbb.12.dylib (offset 24)
//! Load command 13
//!           cmd LC_RPATH
//!       cmdsize 32
//!          path @loader_path (offset 12)
//! ```
//!
//! Mutation issues a single `install_name_tool` call per binary with one
//! `-change` / `-add_rpath` / `-delete_rpath` option per edit.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Output};

use tracing::{debug, trace};

use crate::binary::{BinaryInfo, BinaryTool, Edit};
use crate::error::{RelinkError, RelinkResult};

/// Load commands whose `name` field is a dependency reference.
const DYLIB_COMMANDS: &[&str] = &[
    "LC_LOAD_DYLIB",
    "LC_LOAD_WEAK_DYLIB",
    "LC_REEXPORT_DYLIB",
    "LC_LAZY_LOAD_DYLIB",
    "LC_LOAD_UPWARD_DYLIB",
];

/// Binary tool backed by the Xcode command-line tools.
#[derive(Debug, Clone)]
pub struct OtoolBackend {
    otool: String,
    install_name_tool: String,
}

impl Default for OtoolBackend {
    fn default() -> Self {
        Self::new("otool", "install_name_tool")
    }
}

impl OtoolBackend {
    /// Creates a backend using the given executables
    /// (e.g. `llvm-otool` / `llvm-install-name-tool`).
    pub fn new(otool: impl Into<String>, install_name_tool: impl Into<String>) -> Self {
        Self {
            otool: otool.into(),
            install_name_tool: install_name_tool.into(),
        }
    }

    fn run(&self, tool: &str, args: Vec<OsString>, path: &Path) -> RelinkResult<Output> {
        trace!(tool, ?args, "spawn");
        let output = Command::new(tool)
            .args(&args)
            .output()
            .map_err(|source| RelinkError::Spawn {
                tool: tool.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(RelinkError::ToolFailed {
                tool: tool.to_string(),
                path: path.to_path_buf(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl BinaryTool for OtoolBackend {
    fn inspect(&self, path: &Path) -> RelinkResult<BinaryInfo> {
        let output = self.run(
            &self.otool,
            vec![OsString::from("-l"), path.as_os_str().to_owned()],
            path,
        )?;
        let text = String::from_utf8_lossy(&output.stdout);
        let info = parse_load_commands(&text);
        debug!(
            path = %path.display(),
            references = info.references.len(),
            search_paths = info.search_paths.len(),
            "inspected"
        );
        Ok(info)
    }

    fn mutate(&self, path: &Path, edits: &[Edit]) -> RelinkResult<()> {
        if edits.is_empty() {
            return Ok(());
        }
        self.run(&self.install_name_tool, mutation_args(path, edits), path)?;
        Ok(())
    }
}

/// Builds the `install_name_tool` argument vector for `edits` on `path`.
pub fn mutation_args(path: &Path, edits: &[Edit]) -> Vec<OsString> {
    let mut args = Vec::with_capacity(edits.len() * 3 + 1);
    for edit in edits {
        match edit {
            Edit::ChangeReference { old, new } => {
                args.push("-change".into());
                args.push(old.into());
                args.push(new.into());
            }
            Edit::AddSearchPath(p) => {
                args.push("-add_rpath".into());
                args.push(p.into());
            }
            Edit::DeleteSearchPath(p) => {
                args.push("-delete_rpath".into());
                args.push(p.into());
            }
        }
    }
    args.push(path.as_os_str().to_owned());
    args
}

/// Parses `otool -l` output into references and search paths.
///
/// Fat binaries list every slice. References are reported once each; search
/// paths come from the first slice only, so duplicates within a slice stay
/// visible.
pub fn parse_load_commands(text: &str) -> BinaryInfo {
    let mut info = BinaryInfo::default();
    let mut cmd: Option<&str> = None;
    let mut slice = 0usize;

    for line in text.lines() {
        let line = line.trim();

        // "foo.dylib (architecture arm64):" starts a new slice
        if line.ends_with(':') && line.contains("(architecture ") {
            slice += 1;
            cmd = None;
            continue;
        }
        if line.starts_with("Load command") {
            cmd = None;
            continue;
        }
        if let Some(rest) = line.strip_prefix("cmd ") {
            cmd = Some(rest.trim());
            continue;
        }

        match cmd {
            Some(c) if DYLIB_COMMANDS.contains(&c) => {
                if let Some(value) = field_value(line, "name") {
                    if !info.references.iter().any(|r| r == value) {
                        info.references.push(value.to_string());
                    }
                }
            }
            Some("LC_RPATH") if slice <= 1 => {
                if let Some(value) = field_value(line, "path") {
                    info.search_paths.push(value.to_string());
                }
            }
            _ => {}
        }
    }
    info
}

/// Extracts `value` from a `key value (offset N)` line.
fn field_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(key)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();
    let value = match rest.rfind(" (offset ") {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OTOOL_DYLIB: &str = "\
/pkg/libs/libOpenImageIO.2.5.16.dylib:
Load command 3
          cmd LC_ID_DYLIB
      cmdsize 64
         name @rpath/libOpenImageIO.2.5.dylib (offset 24)
   time stamp 1 Thu Jan  1 01:00:01 1970
      current version 2.5.16
compatibility version 2.5.0
Load command 12
          cmd LC_LOAD_DYLIB
      cmdsize 56
         name @rpath/libtbb.12.dylib (offset 24)
   time stamp 2 Thu Jan  1 01:00:02 1970
      current version 12.10.0
compatibility version 12.0.0
Load command 13
          cmd LC_LOAD_WEAK_DYLIB
      cmdsize 72
         name /Users/runner/build dir/lib/libOpenImageIO_Util.2.5.dylib (offset 24)
Load command 14
          cmd LC_LOAD_DYLIB
      cmdsize 56
         name /usr/lib/libSystem.B.dylib (offset 24)
Load command 15
          cmd LC_RPATH
      cmdsize 32
         path @loader_path (offset 12)
Load command 16
          cmd LC_RPATH
      cmdsize 48
         path /Users/runner/.conan2/p/lib (offset 12)
";

    #[test]
    fn parses_references_and_rpaths() {
        let info = parse_load_commands(OTOOL_DYLIB);
        assert_eq!(
            info.references,
            vec![
                "@rpath/libtbb.12.dylib",
                "/Users/runner/build dir/lib/libOpenImageIO_Util.2.5.dylib",
                "/usr/lib/libSystem.B.dylib",
            ]
        );
        assert_eq!(
            info.search_paths,
            vec!["@loader_path", "/Users/runner/.conan2/p/lib"]
        );
    }

    #[test]
    fn id_dylib_is_not_a_reference() {
        let info = parse_load_commands(OTOOL_DYLIB);
        assert!(!info.references.iter().any(|r| r.contains("libOpenImageIO.2.5.dylib")));
    }

    #[test]
    fn fat_binary_slices_are_not_duplicated() {
        let text = "\
/pkg/OpenImageIO/OpenImageIO.so (architecture x86_64):
Load command 10
          cmd LC_LOAD_DYLIB
         name @rpath/libOpenImageIO.2.5.dylib (offset 24)
Load command 11
          cmd LC_RPATH
         path @loader_path (offset 12)
/pkg/OpenImageIO/OpenImageIO.so (architecture arm64):
Load command 10
          cmd LC_LOAD_DYLIB
         name @rpath/libOpenImageIO.2.5.dylib (offset 24)
Load command 11
          cmd LC_RPATH
         path @loader_path (offset 12)
";
        let info = parse_load_commands(text);
        assert_eq!(info.references, vec!["@rpath/libOpenImageIO.2.5.dylib"]);
        assert_eq!(info.search_paths, vec!["@loader_path"]);
    }

    #[test]
    fn field_value_requires_key_boundary() {
        assert_eq!(field_value("name foo.dylib (offset 24)", "name"), Some("foo.dylib"));
        assert_eq!(field_value("names foo", "name"), None);
        assert_eq!(field_value("path @loader_path", "path"), Some("@loader_path"));
        assert_eq!(field_value("path ", "path"), None);
    }

    #[test]
    fn mutation_args_single_invocation() {
        let args = mutation_args(
            Path::new("/pkg/libs/libfoo.dylib"),
            &[
                Edit::ChangeReference {
                    old: "@rpath/libtbb.12.dylib".into(),
                    new: "@loader_path/libtbb.12.dylib".into(),
                },
                Edit::AddSearchPath("@loader_path".into()),
                Edit::DeleteSearchPath("@loader_path".into()),
            ],
        );
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-change",
                "@rpath/libtbb.12.dylib",
                "@loader_path/libtbb.12.dylib",
                "-add_rpath",
                "@loader_path",
                "-delete_rpath",
                "@loader_path",
                "/pkg/libs/libfoo.dylib",
            ]
        );
    }

    #[test]
    fn missing_tool_is_spawn_error() {
        let backend = OtoolBackend::new("relink-test-no-such-otool", "relink-test-no-such-int");
        let err = backend.inspect(Path::new("/nonexistent.dylib")).unwrap_err();
        assert!(matches!(err, RelinkError::Spawn { .. }));
    }
}
