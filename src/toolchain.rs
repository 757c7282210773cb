use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{BuildGateError, Result};

/// Compiler candidates probed when a variant overrides the default
/// compiler, in discovery order. Ties on version resolve to the earlier
/// entry.
pub const COMPILER_CANDIDATES: &[&str] = &[
    "clang-20", "clang-19", "clang-18", "clang-17", "clang-16", "clang-15", "clang",
];

/// A resolved C/C++ compiler pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub cc: PathBuf,
    pub cxx: PathBuf,
}

/// Locate the best available compiler among `candidates` on `PATH`.
pub fn find_toolchain(candidates: &[&str]) -> Result<Toolchain> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    let dirs: Vec<PathBuf> = std::env::split_paths(&path_var).collect();
    find_toolchain_in(candidates, &dirs)
}

/// Locate the best available compiler among `candidates` in `dirs`.
///
/// "Best" means the highest version suffix under numeric per-component
/// comparison, so `clang-10` beats `clang-9` even though it sorts lower
/// lexically. An unsuffixed candidate ranks below any versioned one.
pub fn find_toolchain_in(candidates: &[&str], dirs: &[PathBuf]) -> Result<Toolchain> {
    let mut best: Option<(Vec<u64>, PathBuf, &str)> = None;
    for &name in candidates {
        let Some(found) = locate(name, dirs) else {
            continue;
        };
        debug!("Compiler candidate found: {}", found.display());
        let key = version_key(name);
        // Strictly-greater keeps discovery order on ties.
        let better = match &best {
            Some((best_key, _, _)) => key > *best_key,
            None => true,
        };
        if better {
            best = Some((key, found, name));
        }
    }

    match best {
        Some((_, cc, name)) => {
            let cxx = cc.with_file_name(name.replacen("clang", "clang++", 1));
            info!("Selected compiler: {}", cc.display());
            Ok(Toolchain { cc, cxx })
        }
        None => Err(BuildGateError::ToolchainNotFound(candidates.join(", "))),
    }
}

fn locate(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Sort key for a versioned tool name: the dash-separated numeric
/// components after the base name, e.g. `clang-18` -> [18].
fn version_key(name: &str) -> Vec<u64> {
    name.split('-')
        .skip(1)
        .flat_map(|part| part.split('.'))
        .filter_map(|part| part.parse().ok())
        .collect()
}
