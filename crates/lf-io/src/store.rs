use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use lf_rules::{FilterRule, RuleError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rule name {0:?} is not a plain file name")]
    InvalidName(String),
    #[error("rule {0:?} does not exist")]
    NotFound(String),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRule {
    pub name: String,
    pub rule: FilterRule,
}

/// Named filter rules kept as pretty-printed `{name}.json` files in one
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleStore {
    root: PathBuf,
}

impl RuleStore {
    pub const DEFAULT_RULE: &'static str = "default";

    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn default_root() -> PathBuf {
        PathBuf::from("data").join("excel_rules")
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        let trimmed = name.trim();
        if trimmed.is_empty()
            || trimmed.contains(['/', '\\'])
            || trimmed.contains("..")
            || trimmed.starts_with('.')
        {
            return Err(StoreError::InvalidName(name.to_owned()));
        }
        Ok(self.root.join(format!("{trimmed}.json")))
    }

    pub fn save(&self, name: &str, rule: &FilterRule) -> Result<PathBuf, StoreError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.root)?;
        fs::write(&path, serde_json::to_string_pretty(rule)?)?;
        info!(rule = name, path = %path.display(), "saved rule");
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<FilterRule, StoreError> {
        let path = self.path_for(name)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_owned()));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(FilterRule::from_json(&raw)?)
    }

    /// The `default` rule, if one has been saved.
    pub fn load_default(&self) -> Result<Option<FilterRule>, StoreError> {
        match self.load(Self::DEFAULT_RULE) {
            Ok(rule) => Ok(Some(rule)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Every readable rule, sorted by name. Files that fail to parse are
    /// skipped with a warning.
    pub fn list(&self) -> Result<Vec<StoredRule>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut rules = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let parsed = fs::read_to_string(&path)
                .map_err(StoreError::from)
                .and_then(|raw| Ok(FilterRule::from_json(&raw)?));
            match parsed {
                Ok(rule) => rules.push(StoredRule {
                    name: name.to_owned(),
                    rule,
                }),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable rule"),
            }
        }
        rules.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(rules)
    }

    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(rule = name, "deleted rule");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}
