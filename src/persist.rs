//! Durable storage of discovered indices.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Receives `set(section, key, value)` once per auto-lock event.
pub trait PersistenceSink {
    fn set(&mut self, section: &str, key: &str, value: Value) -> Result<()>;
}

/// Writes values into a JSON settings file in place, so a locked index is
/// read back as a configured pin on the next start.
pub struct JsonSettingsFile {
    path: PathBuf,
}

impl JsonSettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Value> {
        if !self.path.exists() {
            return Ok(Value::Object(Map::new()));
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }
}

impl PersistenceSink for JsonSettingsFile {
    fn set(&mut self, section: &str, key: &str, value: Value) -> Result<()> {
        let mut document = self.read_document()?;
        let root = document
            .as_object_mut()
            .context("Settings root is not a JSON object")?;
        let section_value = root
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !section_value.is_object() {
            *section_value = Value::Object(Map::new());
        }
        if let Some(map) = section_value.as_object_mut() {
            map.insert(key.to_string(), value);
        }

        let json = serde_json::to_string_pretty(&document).context("Failed to serialize settings")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Keeps every write in memory.
#[derive(Debug, Default)]
pub struct MemorySettings {
    pub writes: Vec<(String, String, Value)>,
}

impl PersistenceSink for MemorySettings {
    fn set(&mut self, section: &str, key: &str, value: Value) -> Result<()> {
        self.writes.push((section.to_string(), key.to_string(), value));
        Ok(())
    }
}
