//! Task records on disk: one JSON file per task under `tasks/`.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const TASKS_DIR: &str = "tasks";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub created: DateTime<Utc>,
}

impl Task {
    pub fn new(title: String, author: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            author,
            created: Utc::now(),
        }
    }

    /// Path relative to the storage root.
    pub fn relative_path(&self) -> PathBuf {
        Path::new(TASKS_DIR).join(format!("{}.json", self.id))
    }

    pub fn write(&self, root: &Path) -> Result<PathBuf> {
        let relative = self.relative_path();
        let path = root.join(&relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(relative)
    }

    pub fn remove(&self, root: &Path) -> Result<PathBuf> {
        let relative = self.relative_path();
        fs::remove_file(root.join(&relative))
            .with_context(|| format!("Could not delete task {}", self.id))?;
        Ok(relative)
    }
}

/// All tasks, oldest first.
pub fn list(root: &Path) -> Result<Vec<Task>> {
    let dir = root.join(TASKS_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut tasks = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let raw = fs::read_to_string(&path)?;
        let task: Task = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid task file {}", path.display()))?;
        tasks.push(task);
    }
    tasks.sort_by_key(|t| t.created);
    Ok(tasks)
}

/// Outcome of deleting several tasks. Stops at the first file that cannot be
/// removed; everything before it is already gone from disk.
pub struct Removal {
    pub removed: Vec<(Task, PathBuf)>,
    pub error: Option<anyhow::Error>,
}

pub fn remove_all(root: &Path, tasks: &[Task]) -> Removal {
    let mut removed = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.remove(root) {
            Ok(path) => removed.push((task.clone(), path)),
            Err(e) => {
                return Removal {
                    removed,
                    error: Some(e),
                }
            }
        }
    }
    Removal {
        removed,
        error: None,
    }
}

/// Resolves each id or unique id prefix to a task.
pub fn find(root: &Path, ids: &[String]) -> Result<Vec<Task>> {
    let tasks = list(root)?;
    let mut found = Vec::with_capacity(ids.len());
    for id in ids {
        let matches: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.id.to_string().starts_with(id.as_str()))
            .collect();
        match matches.as_slice() {
            [task] => {
                if !found.iter().any(|t: &Task| t.id == task.id) {
                    found.push((*task).clone());
                }
            }
            [] => bail!("No task matches '{}'", id),
            _ => bail!("'{}' matches {} tasks, use a longer prefix", id, matches.len()),
        }
    }
    Ok(found)
}
