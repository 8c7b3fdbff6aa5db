//! File-backed provider backend.
//!
//! Persists provider-side stacks as one JSON document per account/region
//! pair, so repeated runs against the same project observe what earlier
//! runs created. This is the default backend for real invocations of the
//! tool; it behaves like a remote provider with zero latency.

use crate::error::{ProviderError, Result};
use crate::provider::{
    ObservedStack, ProviderClient, StackIdentity, StackOutputs, declared_output_keys,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalState {
    version: u32,
    /// Monotonic counter used to mint output values.
    sequence: u64,
    updated_at: DateTime<Utc>,
    stacks: HashMap<String, LocalStack>,
}

impl Default for LocalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            sequence: 0,
            updated_at: Utc::now(),
            stacks: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalStack {
    payload: Value,
    outputs: StackOutputs,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Provider backend that keeps its world in local JSON files.
pub struct LocalProvider {
    dir: PathBuf,
    // One writer at a time per provider instance; load-modify-save must not
    // interleave when stacks execute concurrently.
    write_lock: tokio::sync::Mutex<()>,
}

impl LocalProvider {
    /// `dir` is where the per-account files live, typically
    /// `<state_dir>/provider/`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn file_path(&self, identity: &StackIdentity) -> PathBuf {
        self.dir
            .join(format!("{}-{}.json", identity.account, identity.region))
    }

    async fn load(&self, path: &Path) -> Result<LocalState> {
        if !path.exists() {
            return Ok(LocalState::default());
        }
        let content = fs::read_to_string(path).await?;
        let state: LocalState = serde_json::from_str(&content)?;
        if state.version > STATE_VERSION {
            return Err(ProviderError::State(format!(
                "provider state version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }
        Ok(state)
    }

    async fn save(&self, path: &Path, state: &LocalState) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
        }

        // Keep the previous file around as a backup.
        if path.exists() {
            let backup = path.with_extension("json.backup");
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(path, &backup).await?;
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(path, content).await?;
        Ok(())
    }

    fn mint_outputs(state: &mut LocalState, payload: &Value) -> StackOutputs {
        declared_output_keys(payload)
            .into_iter()
            .map(|key| {
                state.sequence += 1;
                let value = json!(format!("local-{key}-{:04}", state.sequence));
                (key, value)
            })
            .collect()
    }
}

#[async_trait]
impl ProviderClient for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn create(&self, identity: &StackIdentity, payload: &Value) -> Result<StackOutputs> {
        let _guard = self.write_lock.lock().await;
        let path = self.file_path(identity);
        let mut state = self.load(&path).await?;

        if state.stacks.contains_key(&identity.name) {
            return Err(ProviderError::Permanent(format!(
                "stack already exists: {identity}"
            )));
        }

        let outputs = Self::mint_outputs(&mut state, payload);
        let now = Utc::now();
        state.stacks.insert(
            identity.name.clone(),
            LocalStack {
                payload: payload.clone(),
                outputs: outputs.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        state.updated_at = now;
        self.save(&path, &state).await?;
        Ok(outputs)
    }

    async fn update(&self, identity: &StackIdentity, payload: &Value) -> Result<StackOutputs> {
        let _guard = self.write_lock.lock().await;
        let path = self.file_path(identity);
        let mut state = self.load(&path).await?;

        let existing = state
            .stacks
            .get(&identity.name)
            .ok_or_else(|| ProviderError::NotFound(identity.to_string()))?
            .outputs
            .clone();

        let mut outputs = StackOutputs::new();
        for key in declared_output_keys(payload) {
            let value = match existing.get(&key) {
                Some(v) => v.clone(),
                None => {
                    state.sequence += 1;
                    json!(format!("local-{key}-{:04}", state.sequence))
                }
            };
            outputs.insert(key, value);
        }

        let now = Utc::now();
        if let Some(stack) = state.stacks.get_mut(&identity.name) {
            stack.payload = payload.clone();
            stack.outputs = outputs.clone();
            stack.updated_at = now;
        }
        state.updated_at = now;
        self.save(&path, &state).await?;
        Ok(outputs)
    }

    async fn delete(&self, identity: &StackIdentity) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.file_path(identity);
        let mut state = self.load(&path).await?;

        if state.stacks.remove(&identity.name).is_none() {
            return Err(ProviderError::NotFound(identity.to_string()));
        }
        state.updated_at = Utc::now();
        self.save(&path, &state).await?;
        Ok(())
    }

    async fn describe(&self, identity: &StackIdentity) -> Result<Option<ObservedStack>> {
        let path = self.file_path(identity);
        let state = self.load(&path).await?;

        Ok(state.stacks.get(&identity.name).map(|stack| ObservedStack {
            identity: identity.clone(),
            payload: stack.payload.clone(),
            outputs: stack.outputs.clone(),
            updated_at: stack.updated_at,
        }))
    }
}
