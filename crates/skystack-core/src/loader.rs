//! Project loading.
//!
//! A project is a directory containing `skystack.yaml` plus two optional
//! subdirectories, `netenvs/` and `dns/`, each holding one YAML document per
//! file. Files are loaded in filename order so configuration order is
//! deterministic and meaningful (it becomes the default stack ordering).

use crate::error::{CoreError, Result};
use crate::model::{NetworkEnvironment, Project, ProjectFile, ZoneSet};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Filename that marks a project root.
pub const PROJECT_FILE: &str = "skystack.yaml";

/// Loads and validates the whole project tree under `root`.
#[tracing::instrument(skip(root), fields(root = %root.as_ref().display()))]
pub fn load_project(root: impl AsRef<Path>) -> Result<Project> {
    let root = root.as_ref();
    let project_file: ProjectFile = parse_file(&root.join(PROJECT_FILE))?;

    let netenvs: Vec<NetworkEnvironment> = parse_dir(&root.join("netenvs"))?;
    let zone_sets: Vec<ZoneSet> = parse_dir(&root.join("dns"))?;

    let project = project_file.into_project(root, netenvs, zone_sets);
    project.validate()?;

    info!(
        name = %project.name,
        accounts = project.accounts.len(),
        netenvs = project.netenvs.len(),
        zone_sets = project.zone_sets.len(),
        "Loaded project"
    );
    Ok(project)
}

fn parse_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|e| CoreError::YamlParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Parses every `.yaml`/`.yml` file directly under `dir`, in filename order.
/// A missing directory is an empty list, not an error.
fn parse_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    files.sort();

    let mut parsed = Vec::with_capacity(files.len());
    for path in files {
        debug!(file = %path.display(), "Parsing configuration file");
        parsed.push(parse_file(&path)?);
    }
    Ok(parsed)
}
