//! Path helpers: normalization and the default places WannaCry leaves its
//! temporary files.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Directory WannaCry uses for its scratch copies on non-system volumes.
pub const RECYCLE_DIR_NAME: &str = "$RECYCLE";

/// Resolve a path to an absolute, normalized path.
///
/// Existing paths are canonicalized. Paths that do not exist yet (a recovery
/// destination, say) are made absolute against the CWD and normalized
/// syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

/// Roots searched when the configuration does not name any.
///
/// On Windows this is the per-user temp directory under `%LOCALAPPDATA%` plus
/// the `$RECYCLE` directory on every mounted drive letter. Elsewhere it is the
/// process temp directory. Roots are returned whether or not they exist; the
/// discoverer filters missing ones.
pub fn default_search_roots() -> Vec<PathBuf> {
    #[cfg(windows)]
    {
        let mut roots = Vec::new();
        if let Some(local) = env::var_os("LOCALAPPDATA") {
            roots.push(PathBuf::from(local).join("temp"));
        }
        for letter in b'A'..=b'Z' {
            let drive = PathBuf::from(format!("{}:\\", char::from(letter)));
            if drive.exists() {
                roots.push(drive.join(RECYCLE_DIR_NAME));
            }
        }
        roots
    }
    #[cfg(not(windows))]
    {
        vec![env::temp_dir()]
    }
}

/// Home directory, falling back to `/tmp` when `HOME` is unset.
pub fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map_or_else(
            || {
                eprintln!("[WCFF-CONFIG] WARNING: HOME not set, falling back to /tmp");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        )
}
