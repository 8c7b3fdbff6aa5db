//! Project root discovery.

use crate::error::{CoreError, Result};
use crate::loader::PROJECT_FILE;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Environment variable that pins the project root, bypassing the search.
pub const PROJECT_ROOT_ENV: &str = "SKYSTACK_PROJECT_ROOT";

/// Locates the project root.
///
/// Search order:
/// 1. `SKYSTACK_PROJECT_ROOT`, when it points at a directory containing
///    `skystack.yaml`.
/// 2. The current directory, then each parent, until a `skystack.yaml`
///    is found.
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var(PROJECT_ROOT_ENV) {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking SKYSTACK_PROJECT_ROOT");
        if path.join(PROJECT_FILE).exists() {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
    }

    let start_dir = std::env::current_dir()?;
    let mut current = start_dir.clone();
    debug!(start_dir = %start_dir.display(), "Searching for project root");

    loop {
        if current.join(PROJECT_FILE).exists() {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }
        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(CoreError::ProjectRootNotFound(start_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn test_env_override() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PROJECT_FILE), "name: env-test\n").unwrap();

        // SAFETY: guarded by #[serial]; no other thread touches the
        // environment while this test runs.
        unsafe { std::env::set_var(PROJECT_ROOT_ENV, dir.path()) };
        let found = find_project_root().unwrap();
        unsafe { std::env::remove_var(PROJECT_ROOT_ENV) };

        assert_eq!(found, dir.path());
    }

    #[test]
    #[serial]
    fn test_env_override_ignored_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        // No skystack.yaml inside; the variable must not win.
        unsafe { std::env::set_var(PROJECT_ROOT_ENV, dir.path()) };
        let result = find_project_root();
        unsafe { std::env::remove_var(PROJECT_ROOT_ENV) };

        if let Ok(found) = result {
            assert_ne!(found, dir.path());
        }
    }
}
