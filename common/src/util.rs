use std::{
    env,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use thiserror::Error;

/// Scratch files the benchmark executable creates under every mount
pub const SCRATCH_PATTERN: &str = "buffer.bin.*";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgramError {
    #[error("Benchmark program {0} does not exist")]
    NotFound(String),
    #[error("Benchmark program {0} is not executable")]
    NotExecutable(PathBuf),
}

/// Resolves `program` the way a spawn would: paths are checked directly, bare
/// names are looked up on `PATH`.
pub fn resolve_program(program: &str) -> Result<PathBuf, ProgramError> {
    if program.contains('/') {
        return check_executable(Path::new(program));
    }

    let path = env::var_os("PATH").ok_or_else(|| ProgramError::NotFound(program.to_owned()))?;
    env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ProgramError::NotFound(program.to_owned()))
        .and_then(|candidate| check_executable(&candidate))
}

fn check_executable(path: &Path) -> Result<PathBuf, ProgramError> {
    let metadata = path
        .metadata()
        .map_err(|_| ProgramError::NotFound(path.display().to_string()))?;
    if !metadata.is_file() {
        return Err(ProgramError::NotFound(path.display().to_string()));
    }
    if metadata.permissions().mode() & 0o111 == 0 {
        return Err(ProgramError::NotExecutable(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}

/// Individual mount paths of several descriptions, in first-seen order
pub fn unique_mounts<'a>(descriptions: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    descriptions
        .into_iter()
        .flat_map(str::split_whitespace)
        .unique()
        .collect()
}

/// One `find` per mount deleting [`SCRATCH_PATTERN`]; the pattern is matched
/// by `find` so no shell is needed.
pub fn scratch_cleanup_cmds(mounts: &[&str]) -> Vec<String> {
    mounts
        .iter()
        .map(|mount| format!("find {mount} -maxdepth 1 -name {SCRATCH_PATTERN} -delete"))
        .collect()
}
