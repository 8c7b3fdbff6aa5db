//! Durable output records.
//!
//! Manages the `outputs.json` file inside the project state directory. It
//! remembers, per stack, the output values of the last successful
//! provision and a digest of the payload that produced them. The digest
//! lets later plans skip a provider round-trip when nothing changed; the
//! values let references resolve across runs and across controllers.

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skystack_cloud::StackIdentity;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STORE_VERSION: u32 = 1;
const OUTPUTS_FILE: &str = "outputs.json";
const OUTPUTS_BACKUP: &str = "outputs.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Digest of a fully resolved desired document.
///
/// `serde_json` keeps object keys sorted, so serializing is canonical and
/// two payloads that differ only in key order digest identically.
pub fn payload_digest(document: &Value) -> String {
    let canonical = document.to_string();
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

/// Everything recorded about one stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackRecord {
    /// Output key -> where it lands and what it was.
    pub outputs: HashMap<String, OutputRecord>,
    /// Digest of the desired document last applied successfully.
    pub applied_digest: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StackRecord {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            applied_digest: None,
            updated_at: Utc::now(),
        }
    }

    pub fn insert_output(
        &mut self,
        key: impl Into<String>,
        path: impl Into<String>,
        value: Value,
    ) {
        self.outputs.insert(
            key.into(),
            OutputRecord {
                path: path.into(),
                value,
            },
        );
        self.updated_at = Utc::now();
    }
}

impl Default for StackRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Reference path the value resolves at.
    pub path: String,
    pub value: Value,
}

/// The whole persisted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredOutputs {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    /// Keyed by stack identity string (`account:region:name`).
    pub stacks: HashMap<String, StackRecord>,
}

impl Default for StoredOutputs {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            updated_at: Utc::now(),
            stacks: HashMap::new(),
        }
    }
}

impl StoredOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, identity: &StackIdentity) -> &mut StackRecord {
        self.updated_at = Utc::now();
        self.stacks.entry(identity.to_string()).or_default()
    }

    pub fn get(&self, identity: &StackIdentity) -> Option<&StackRecord> {
        self.stacks.get(&identity.to_string())
    }

    pub fn remove(&mut self, identity: &StackIdentity) -> Option<StackRecord> {
        let removed = self.stacks.remove(&identity.to_string());
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }

    /// All `(reference path, value)` pairs, for hydrating a resolver.
    pub fn all_values(&self) -> Vec<(String, Value)> {
        self.stacks
            .values()
            .flat_map(|record| {
                record
                    .outputs
                    .values()
                    .map(|o| (o.path.clone(), o.value.clone()))
            })
            .collect()
    }
}

/// Reads and writes the outputs file.
pub struct OutputStore {
    state_dir: PathBuf,
}

impl OutputStore {
    /// `state_dir` is the project's state directory, typically
    /// `<root>/.skystack`.
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    fn outputs_path(&self) -> PathBuf {
        self.state_dir.join(OUTPUTS_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir.join(OUTPUTS_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!(dir = %self.state_dir.display(), "Created state directory");
        }
        Ok(())
    }

    /// Loads the recorded outputs; a missing file is an empty document.
    pub async fn load(&self) -> Result<StoredOutputs> {
        let path = self.outputs_path();
        if !path.exists() {
            tracing::debug!("Outputs file not found, starting empty");
            return Ok(StoredOutputs::new());
        }

        let content = fs::read_to_string(&path).await?;
        let stored: StoredOutputs = serde_json::from_str(&content)?;

        if stored.version > STORE_VERSION {
            return Err(EngineError::StateStore(format!(
                "outputs file version {} is newer than supported version {}",
                stored.version, STORE_VERSION
            )));
        }

        tracing::debug!(stacks = stored.stacks.len(), "Loaded recorded outputs");
        Ok(stored)
    }

    /// Saves the document, keeping the previous file as a backup.
    pub async fn save(&self, stored: &StoredOutputs) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.outputs_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }

        let content = serde_json::to_string_pretty(stored)?;
        fs::write(&path, content).await?;
        tracing::debug!(stacks = stored.stacks.len(), "Saved recorded outputs");
        Ok(())
    }

    /// Takes the run lock. A lock older than an hour is assumed to be left
    /// over from a crashed run and is replaced.
    pub async fn acquire_lock(&self) -> Result<StoreLock> {
        self.ensure_dir().await?;
        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let info: LockInfo = serde_json::from_str(&content)?;

            let age = Utc::now().signed_duration_since(info.acquired_at);
            if age.num_hours() < 1 {
                return Err(EngineError::StateStore(format!(
                    "state is locked by {} since {}",
                    info.holder, info.acquired_at
                )));
            }
            tracing::warn!(holder = %info.holder, "Removing stale state lock");
        }

        let info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StoreLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the run lock.
pub struct StoreLock {
    lock_path: PathBuf,
    released: bool,
}

impl StoreLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            // Synchronous cleanup fallback for early returns and panics.
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
