//! Filesystem-backed extraction templates with an in-memory cache.
//!
//! A template pairs a JSON schema (`<dir>/<id>.json`) with a natural-language
//! instruction (`<dir>/<id>.txt`). Lookup is total: a missing or unreadable
//! artifact degrades to the generic fallback schema/instruction rather than
//! an error, so an unknown template id still yields a usable extraction
//! prompt. Cached entries are immutable and persist until [`clear`] —
//! editing artifacts on disk does not affect documents already in flight.
//!
//! [`clear`]: TemplateStore::clear

use crate::prompts::{FALLBACK_INSTRUCTION, FALLBACK_SCHEMA};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// One extraction template, immutable once cached.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    /// Schema as literal JSON text, embedded verbatim in the prompt.
    pub schema: String,
    pub instruction: String,
}

impl Template {
    /// Decode the schema as an empty instance of itself.
    ///
    /// Template schemas are written as skeleton objects (empty strings,
    /// empty arrays), so parsing the schema text directly yields the
    /// all-sections-empty mapping used as the extraction fallback. A schema
    /// that does not parse as a JSON object yields `{}`.
    pub fn empty_instance(&self) -> Map<String, Value> {
        match serde_json::from_str::<Value>(&self.schema) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Template registry over a directory of `<id>.json` / `<id>.txt` pairs.
pub struct TemplateStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Template>>>,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a template by id, loading and caching it on first use.
    ///
    /// Concurrent readers share the lock; when two tasks miss on the same id
    /// at once, the first insert wins and both get the same entry.
    pub fn get(&self, id: &str) -> Arc<Template> {
        if let Some(template) = self.cache.read().get(id) {
            return Arc::clone(template);
        }

        let loaded = Arc::new(self.load(id));
        let mut cache = self.cache.write();
        Arc::clone(cache.entry(id.to_string()).or_insert(loaded))
    }

    /// Drop every cached entry; subsequent lookups reload from disk.
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    fn load(&self, id: &str) -> Template {
        if !is_plain_id(id) {
            warn!("Template id '{id}' is not a plain file stem, using fallback template");
            return Template {
                id: id.to_string(),
                schema: FALLBACK_SCHEMA.to_string(),
                instruction: FALLBACK_INSTRUCTION.to_string(),
            };
        }

        let schema_path = self.dir.join(format!("{id}.json"));
        let schema = match fs::read_to_string(&schema_path) {
            Ok(text) if serde_json::from_str::<Value>(&text).is_ok() => text,
            Ok(_) => {
                warn!(
                    "Template schema {} is not valid JSON, using fallback schema",
                    schema_path.display()
                );
                FALLBACK_SCHEMA.to_string()
            }
            Err(e) => {
                warn!(
                    "Template schema {} unavailable ({e}), using fallback schema",
                    schema_path.display()
                );
                FALLBACK_SCHEMA.to_string()
            }
        };

        let instruction_path = self.dir.join(format!("{id}.txt"));
        let instruction = match fs::read_to_string(&instruction_path) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => {
                debug!(
                    "Template instruction {} unavailable, using generic instruction",
                    instruction_path.display()
                );
                FALLBACK_INSTRUCTION.to_string()
            }
        };

        debug!("Loaded template '{id}'");
        Template {
            id: id.to_string(),
            schema,
            instruction,
        }
    }
}

/// A template id must be a bare file stem, never a path.
fn is_plain_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && id != "." && id != ".."
}
