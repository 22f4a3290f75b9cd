//! Relocation policy: which references to rewrite, which search paths to add.
//!
//! Every per-binary failure is logged and recorded in the [`RelinkReport`];
//! only [`PackageLayout::resolve`] can abort a [`relocate`] run.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::binary::{self_relative, BinaryInfo, BinaryTool, Edit};
use crate::config::RelinkConfig;
use crate::error::RelinkResult;
use crate::layout::{staged_libraries, PackageLayout};
use crate::report::{Outcome, Phase, RelinkReport};

/// Runs the full relocation pass described by `config`.
///
/// # Errors
///
/// Returns a precondition error if a required binary is missing. In that
/// case no binary has been touched.
pub fn relocate<T: BinaryTool>(tool: &T, config: &RelinkConfig) -> RelinkResult<RelinkReport> {
    let layout = PackageLayout::resolve(config)?;
    info!(
        root = %config.package_root.display(),
        modules = layout.modules.len(),
        "relinking package"
    );

    let mut report = rewrite_references(tool, &layout.libs_dir, &config.reference_stems);
    report.merge(ensure_search_path(
        tool,
        &layout.loader_targets(),
        &config.loader_search_path,
    ));
    report.merge(ensure_search_path(
        tool,
        &layout.modules,
        &config.staging_search_path,
    ));

    info!(
        changed = report.changed(),
        unchanged = report.unchanged(),
        failed = report.failed(),
        "relinking finished"
    );
    Ok(report)
}

/// Rewrites references to bundled libraries as `@loader_path/<basename>` in
/// every staged library under `libs_dir`.
pub fn rewrite_references<T: BinaryTool>(
    tool: &T,
    libs_dir: &Path,
    stems: &[String],
) -> RelinkReport {
    let mut report = RelinkReport::new();

    let libs = match staged_libraries(libs_dir) {
        Ok(libs) => libs,
        Err(e) => {
            error!(dir = %libs_dir.display(), error = %e, "cannot list staged libraries");
            report.push(libs_dir, Phase::References, Outcome::Failed(e.to_string()));
            return report;
        }
    };

    for lib in libs {
        let outcome = match tool.inspect(&lib) {
            Ok(info) => {
                let edits = reference_edits(&info, stems);
                apply(tool, &lib, edits)
            }
            Err(e) => Outcome::Failed(e.to_string()),
        };
        log_outcome(&lib, &outcome);
        report.push(lib, Phase::References, outcome);
    }
    report
}

/// Makes sure every binary in `binaries` carries `token` exactly once.
pub fn ensure_search_path<T: BinaryTool>(
    tool: &T,
    binaries: &[PathBuf],
    token: &str,
) -> RelinkReport {
    let mut report = RelinkReport::new();
    for binary in binaries {
        let outcome = provision(tool, binary, token);
        log_outcome(binary, &outcome);
        report.push(binary, Phase::SearchPath(token.to_string()), outcome);
    }
    report
}

/// Applies search-path edits one invocation at a time, re-inspecting in
/// between, until `token` is present exactly once.
///
/// `install_name_tool` removes a single occurrence per `-delete_rpath`
/// invocation, so duplicates take one call each.
fn provision<T: BinaryTool>(tool: &T, path: &Path, token: &str) -> Outcome {
    let mut applied = Vec::new();
    let mut last_distance: Option<usize> = None;

    loop {
        let info = match tool.inspect(path) {
            Ok(info) => info,
            Err(e) => return Outcome::Failed(e.to_string()),
        };
        let Some(edit) = search_path_edit(&info, token) else {
            break;
        };

        let distance = info.search_path_count(token).abs_diff(1);
        if last_distance.is_some_and(|d| distance >= d) {
            return Outcome::Failed(format!(
                "search path '{}' still present {} times after {}",
                token,
                info.search_path_count(token),
                applied.last().map(ToString::to_string).unwrap_or_default()
            ));
        }
        last_distance = Some(distance);

        if let Err(e) = tool.mutate(path, std::slice::from_ref(&edit)) {
            return Outcome::Failed(e.to_string());
        }
        applied.push(edit);
    }

    if applied.is_empty() {
        Outcome::Unchanged
    } else {
        Outcome::Changed(applied)
    }
}

/// Reference rewrites needed for one binary.
///
/// A reference matches when it contains any stem as a substring. References
/// already in self-relative form are left alone.
pub fn reference_edits(info: &BinaryInfo, stems: &[String]) -> Vec<Edit> {
    info.references
        .iter()
        .filter(|r| stems.iter().any(|s| r.contains(s.as_str())))
        .filter_map(|old| {
            let new = self_relative(old)?;
            (new != *old).then(|| Edit::ChangeReference {
                old: old.clone(),
                new,
            })
        })
        .collect()
}

/// Next search-path edit moving `token` towards exactly one entry.
pub fn search_path_edit(info: &BinaryInfo, token: &str) -> Option<Edit> {
    match info.search_path_count(token) {
        0 => Some(Edit::AddSearchPath(token.to_string())),
        1 => None,
        _ => Some(Edit::DeleteSearchPath(token.to_string())),
    }
}

fn apply<T: BinaryTool>(tool: &T, path: &Path, edits: Vec<Edit>) -> Outcome {
    if edits.is_empty() {
        return Outcome::Unchanged;
    }
    match tool.mutate(path, &edits) {
        Ok(()) => Outcome::Changed(edits),
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

fn log_outcome(path: &Path, outcome: &Outcome) {
    match outcome {
        Outcome::Changed(edits) => {
            for edit in edits {
                info!(path = %path.display(), %edit, "edited");
            }
        }
        Outcome::Unchanged => debug!(path = %path.display(), "already relinked"),
        Outcome::Failed(msg) => {
            error!(path = %path.display(), error = %msg, "artifact not fixed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Single binary; rejects more than one edit per invocation. With
    /// `ignore_deletes` set, `-delete_rpath` succeeds but changes nothing.
    struct OneBinary {
        info: RefCell<BinaryInfo>,
        calls: RefCell<Vec<Vec<Edit>>>,
        ignore_deletes: bool,
    }

    impl OneBinary {
        fn new(search_paths: &[&str], ignore_deletes: bool) -> Self {
            Self {
                info: RefCell::new(BinaryInfo {
                    references: vec![],
                    search_paths: search_paths.iter().map(|s| s.to_string()).collect(),
                }),
                calls: RefCell::new(Vec::new()),
                ignore_deletes,
            }
        }
    }

    impl BinaryTool for OneBinary {
        fn inspect(&self, _path: &Path) -> RelinkResult<BinaryInfo> {
            Ok(self.info.borrow().clone())
        }

        fn mutate(&self, _path: &Path, edits: &[Edit]) -> RelinkResult<()> {
            assert_eq!(edits.len(), 1, "one edit per invocation");
            self.calls.borrow_mut().push(edits.to_vec());
            let skip = self.ignore_deletes && matches!(edits[0], Edit::DeleteSearchPath(_));
            if !skip {
                self.info.borrow_mut().apply(&edits[0]);
            }
            Ok(())
        }
    }

    fn stems() -> Vec<String> {
        RelinkConfig::default().reference_stems
    }

    #[test]
    fn rewrites_absolute_build_path() {
        let info = BinaryInfo {
            references: vec!["/build/tmp/libBar.3.dylib".into()],
            search_paths: vec![],
        };
        let edits = reference_edits(&info, &["libBar".to_string()]);
        assert_eq!(
            edits,
            vec![Edit::ChangeReference {
                old: "/build/tmp/libBar.3.dylib".into(),
                new: "@loader_path/libBar.3.dylib".into(),
            }]
        );
    }

    #[test]
    fn rewrites_every_matching_reference() {
        let info = BinaryInfo {
            references: vec![
                "@rpath/libtbb.12.dylib".into(),
                "/usr/lib/libc++.1.dylib".into(),
                "@rpath/libOpenImageIO_Util.2.5.dylib".into(),
                "@loader_path/libOpenColorIO.2.4.dylib".into(),
                "/usr/lib/libSystem.B.dylib".into(),
            ],
            search_paths: vec![],
        };
        let edits = reference_edits(&info, &stems());
        assert_eq!(edits.len(), 2);
        assert!(edits.contains(&Edit::ChangeReference {
            old: "@rpath/libtbb.12.dylib".into(),
            new: "@loader_path/libtbb.12.dylib".into(),
        }));
        assert!(edits.contains(&Edit::ChangeReference {
            old: "@rpath/libOpenImageIO_Util.2.5.dylib".into(),
            new: "@loader_path/libOpenImageIO_Util.2.5.dylib".into(),
        }));
    }

    #[test]
    fn search_path_edit_moves_towards_one() {
        let mut info = BinaryInfo::default();
        assert_eq!(
            search_path_edit(&info, "@loader_path"),
            Some(Edit::AddSearchPath("@loader_path".into()))
        );

        info.search_paths.push("@loader_path".into());
        assert_eq!(search_path_edit(&info, "@loader_path"), None);

        info.search_paths.push("@loader_path".into());
        info.search_paths.push("@loader_path".into());
        assert_eq!(
            search_path_edit(&info, "@loader_path"),
            Some(Edit::DeleteSearchPath("@loader_path".into()))
        );
    }

    #[test]
    fn similar_token_is_not_a_match() {
        let info = BinaryInfo {
            references: vec![],
            search_paths: vec!["@loader_path/../../.dylibs".into()],
        };
        assert_eq!(
            search_path_edit(&info, "@loader_path"),
            Some(Edit::AddSearchPath("@loader_path".into()))
        );
    }

    #[test]
    fn duplicates_removed_one_call_at_a_time() {
        let tool = OneBinary::new(&["@loader_path", "/opt/lib", "@loader_path", "@loader_path"], false);
        let binaries = vec![PathBuf::from("m.so")];

        let first = ensure_search_path(&tool, &binaries, "@loader_path");
        assert_eq!(first.failed(), 0);
        assert_eq!(first.edit_count(), 2);
        assert_eq!(tool.calls.borrow().len(), 2);
        assert_eq!(tool.info.borrow().search_path_count("@loader_path"), 1);

        let second = ensure_search_path(&tool, &binaries, "@loader_path");
        assert_eq!(second.unchanged(), 1);
        assert_eq!(tool.calls.borrow().len(), 2);
    }

    #[test]
    fn ineffective_delete_is_reported_not_looped() {
        let tool = OneBinary::new(&["@loader_path", "@loader_path", "@loader_path"], true);
        let report = ensure_search_path(&tool, &[PathBuf::from("m.so")], "@loader_path");

        assert_eq!(report.failed(), 1);
        assert_eq!(tool.calls.borrow().len(), 1);
        let msg = match &report.entries[0].outcome {
            Outcome::Failed(msg) => msg.clone(),
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert!(msg.contains("still present 3 times"), "{}", msg);
    }
}
