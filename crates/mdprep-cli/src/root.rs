use mdprep_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `MDPREP_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `mdprep.yaml` or a `system*` folder
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_project_root(&cwd).unwrap_or(cwd)
}

fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| paths::config_path(dir).is_file() || has_system_dir(dir))
        .map(Path::to_path_buf)
}

fn has_system_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| e.path().is_dir() && paths::is_system_dir_name(&e.file_name().to_string_lossy()))
        })
        .unwrap_or(false)
}
