//! The classification taxonomy: named tasks (with subtasks) and behaviors.
//!
//! Entries are authored by the user or proposed by the analysis service.

use crate::store::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Who created a taxonomy entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrigin {
    #[default]
    User,
    Proposed,
}

/// Kind of taxonomy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Task,
    Behavior,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub name: String,
    #[serde(default)]
    pub subtasks: Vec<String>,
    #[serde(default)]
    pub origin: EntryOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorEntry {
    pub name: String,
    #[serde(default)]
    pub origin: EntryOrigin,
}

/// The full taxonomy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
    #[serde(default)]
    pub behaviors: Vec<BehaviorEntry>,
}

impl Taxonomy {
    pub fn find_task(&self, name: &str) -> Option<&TaskEntry> {
        self.tasks.iter().find(|t| names_match(&t.name, name))
    }

    pub fn has_behavior(&self, name: &str) -> bool {
        self.behaviors.iter().any(|b| names_match(&b.name, name))
    }

    pub fn has_subtask(&self, task: &str, subtask: &str) -> bool {
        self.find_task(task)
            .map(|t| t.subtasks.iter().any(|s| names_match(s, subtask)))
            .unwrap_or(false)
    }

    /// Add an entry unless one with the same name exists. Returns whether it was added.
    ///
    /// For [`EntryKind::Task`] with a `parent`, `name` is a subtask of that task,
    /// which is created first if missing.
    pub fn insert(&mut self, kind: EntryKind, name: &str, parent: Option<&str>) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }

        match (kind, parent) {
            (EntryKind::Behavior, _) => {
                if self.has_behavior(name) {
                    return false;
                }
                self.behaviors.push(BehaviorEntry {
                    name: name.to_string(),
                    origin: EntryOrigin::Proposed,
                });
                true
            }
            (EntryKind::Task, None) => {
                if self.find_task(name).is_some() {
                    return false;
                }
                self.tasks.push(TaskEntry {
                    name: name.to_string(),
                    subtasks: Vec::new(),
                    origin: EntryOrigin::Proposed,
                });
                true
            }
            (EntryKind::Task, Some(parent)) => {
                if self.has_subtask(parent, name) {
                    return false;
                }
                self.insert(EntryKind::Task, parent, None);
                match self.tasks.iter_mut().find(|t| names_match(&t.name, parent)) {
                    Some(task) => {
                        task.subtasks.push(name.to_string());
                        true
                    }
                    None => false,
                }
            }
        }
    }
}

/// Taxonomy names compare trimmed and case-insensitively.
pub fn names_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Access to the external, mutable taxonomy.
#[async_trait]
pub trait TaxonomyStore: Send + Sync {
    async fn read_taxonomy(&self) -> Result<Taxonomy, StoreError>;

    /// Create an entry (or a subtask when `parent` is given) if it does not exist.
    async fn propose_entry(
        &self,
        kind: EntryKind,
        name: &str,
        parent: Option<&str>,
    ) -> Result<(), StoreError>;
}

/// Taxonomy kept in a single JSON file.
pub struct FileTaxonomyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTaxonomyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Taxonomy, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| StoreError::ParseError(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Taxonomy::default()),
            Err(e) => Err(StoreError::IoError(e.to_string())),
        }
    }

    async fn store(&self, taxonomy: &Taxonomy) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::IoError(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(taxonomy)
            .map_err(|e| StoreError::SerializeError(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| StoreError::IoError(e.to_string()))
    }
}

#[async_trait]
impl TaxonomyStore for FileTaxonomyStore {
    async fn read_taxonomy(&self) -> Result<Taxonomy, StoreError> {
        self.load().await
    }

    async fn propose_entry(
        &self,
        kind: EntryKind,
        name: &str,
        parent: Option<&str>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut taxonomy = self.load().await?;
        if taxonomy.insert(kind, name, parent) {
            self.store(&taxonomy).await?;
        }
        Ok(())
    }
}
