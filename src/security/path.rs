//! Path resolution for permission checks.
//!
//! Targets are resolved lexically: relative paths are joined onto a base
//! directory and `.` / `..` components are folded away without touching the
//! filesystem, so paths that do not exist yet (new files) resolve too.

use std::path::{Component, Path, PathBuf};

/// Resolve `target` against `base` into an absolute, normalized path.
///
/// A leading `~` expands to the home directory.
///
/// # Example
/// ```
/// use codecli::security::resolve_path;
/// use std::path::Path;
///
/// let resolved = resolve_path(Path::new("/work/project"), "src/../README.md");
/// assert_eq!(resolved, Path::new("/work/project/README.md"));
/// ```
pub fn resolve_path(base: &Path, target: &str) -> PathBuf {
    let target = target.trim();
    let expanded = match target.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => {
            match dirs::home_dir() {
                Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
                None => PathBuf::from(target),
            }
        }
        _ => PathBuf::from(target),
    };

    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };
    normalize(&joined)
}

/// Fold `.` and `..` components. `..` never climbs above the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                );
                if !at_root {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `path` is `root` itself or lies beneath it.
///
/// Comparison is per component, so `/work/app` does not contain
/// `/work/application`.
pub fn is_within(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
}
