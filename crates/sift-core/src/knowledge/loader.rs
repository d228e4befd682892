//! Loading knowledge tables from YAML or JSON.
//!
//! Loading never silently succeeds on an empty table. The caller always gets
//! a [`LoadOutcome`] that says which tables are in force:
//!
//! | Outcome       | Meaning                                              |
//! |---------------|------------------------------------------------------|
//! | `Builtin`     | No file configured; compiled tables only             |
//! | `Loaded`      | File parsed and merged over the compiled tables      |
//! | `LoadedEmpty` | File parsed but contained no entries                 |
//! | `Absent`      | File could not be used; compiled tables only         |
//!
//! In [`LoadMode::Strict`] an unusable file is an error instead of `Absent`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::{KnowledgeBase, KnowledgeError};

/// How to treat a knowledge file that cannot be used.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Fail loudly. Used in development.
    Strict,
    /// Fall back to built-in tables and record why.
    #[default]
    Degrade,
}

/// Which tables ended up in force.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    Builtin,
    Loaded { path: PathBuf, entries: usize },
    LoadedEmpty { path: PathBuf },
    Absent { path: PathBuf, reason: String },
}

impl LoadOutcome {
    /// Reason the configured file is not in use, if it is not.
    pub fn degradation(&self) -> Option<String> {
        match self {
            LoadOutcome::Absent { path, reason } => {
                Some(format!("{}: {}", path.display(), reason))
            }
            LoadOutcome::LoadedEmpty { path } => {
                Some(format!("{}: file contained no entries", path.display()))
            }
            LoadOutcome::Builtin | LoadOutcome::Loaded { .. } => None,
        }
    }
}

/// Knowledge tables together with how they were obtained.
#[derive(Debug, Clone)]
pub struct LoadedKnowledge {
    pub base: KnowledgeBase,
    pub outcome: LoadOutcome,
}

impl KnowledgeBase {
    /// Parse tables from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, KnowledgeError> {
        let base: KnowledgeBase = serde_yaml::from_str(yaml)?;
        base.validate()?;
        Ok(base)
    }

    /// Parse tables from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, KnowledgeError> {
        let base: KnowledgeBase = serde_json::from_str(json)?;
        base.validate()?;
        Ok(base)
    }

    /// Parse tables from a file, choosing the format by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(KnowledgeError::NotFound(path.display().to_string()));
        }
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Built-in tables, optionally extended from `path`.
    pub fn load(path: Option<&Path>, mode: LoadMode) -> Result<LoadedKnowledge, KnowledgeError> {
        let mut base = Self::builtin();
        let Some(path) = path else {
            return Ok(LoadedKnowledge {
                base,
                outcome: LoadOutcome::Builtin,
            });
        };

        let outcome = match Self::from_file(path) {
            Ok(extra) if extra.is_empty() => {
                tracing::warn!(path = %path.display(), "knowledge file contained no entries");
                LoadOutcome::LoadedEmpty {
                    path: path.to_path_buf(),
                }
            }
            Ok(extra) => {
                let entries = extra.entry_count();
                base.merge(extra);
                tracing::debug!(path = %path.display(), entries, "knowledge tables loaded");
                LoadOutcome::Loaded {
                    path: path.to_path_buf(),
                    entries,
                }
            }
            Err(err) if mode == LoadMode::Strict => return Err(err),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "knowledge file unusable, using built-in tables");
                LoadOutcome::Absent {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                }
            }
        };

        Ok(LoadedKnowledge { base, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dimension;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sift-knowledge-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    const EXTRA_TABLES: &str = r#"
definitions:
  tessellation: "a tiling of a plane with shapes that leave no gaps"
idioms:
  - phrase: "in the weeds"
    meaning: "lost among small details"
frames:
  metaphor:
    - "{Topic} is a tide pool, small but complete."
"#;

    #[test]
    fn test_parse_yaml_tables() {
        let base = KnowledgeBase::from_yaml(EXTRA_TABLES).unwrap();
        assert_eq!(base.idioms.len(), 1);
        assert_eq!(base.frames_for(Dimension::Metaphor).len(), 1);
        assert!(base.definitions.contains_key("tessellation"));
    }

    #[test]
    fn test_no_path_is_builtin() {
        let loaded = KnowledgeBase::load(None, LoadMode::Strict).unwrap();
        assert_eq!(loaded.outcome, LoadOutcome::Builtin);
        assert!(loaded.outcome.degradation().is_none());
    }

    #[test]
    fn test_load_merges_over_builtin() {
        let path = temp_file("extra.yaml", EXTRA_TABLES);
        let loaded = KnowledgeBase::load(Some(&path), LoadMode::Strict).unwrap();
        assert!(matches!(loaded.outcome, LoadOutcome::Loaded { entries: 3, .. }));
        assert!(loaded.base.definitions.contains_key("tessellation"));
        assert!(loaded.base.definitions.contains_key("entropy"));
    }

    #[test]
    fn test_empty_file_is_distinguishable() {
        let path = temp_file("empty.yaml", "{}\n");
        let loaded = KnowledgeBase::load(Some(&path), LoadMode::Degrade).unwrap();
        assert!(matches!(loaded.outcome, LoadOutcome::LoadedEmpty { .. }));
        assert!(loaded.outcome.degradation().is_some());
        assert_eq!(loaded.base, KnowledgeBase::builtin());
    }

    #[test]
    fn test_missing_file_strict_fails() {
        let path = std::env::temp_dir().join("sift-definitely-missing.yaml");
        let result = KnowledgeBase::load(Some(&path), LoadMode::Strict);
        assert!(matches!(result, Err(KnowledgeError::NotFound(_))));
    }

    #[test]
    fn test_missing_file_degrades_with_reason() {
        let path = std::env::temp_dir().join("sift-definitely-missing.yaml");
        let loaded = KnowledgeBase::load(Some(&path), LoadMode::Degrade).unwrap();
        match loaded.outcome {
            LoadOutcome::Absent { reason, .. } => assert!(reason.contains("not found")),
            other => panic!("expected Absent, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_strict_fails() {
        let path = temp_file("broken.json", "{ not json");
        let result = KnowledgeBase::load(Some(&path), LoadMode::Strict);
        assert!(matches!(result, Err(KnowledgeError::JsonError(_))));
    }
}
