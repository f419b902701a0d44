//! Rule store
//!
//! Rules live in a JSON document (an array of rule objects). The in-memory set
//! is copy-on-write: readers clone an `Arc` and evaluate against it while an
//! update builds, persists and swaps in a fresh set.

use crate::error::EngineError;
use crate::persist;
use protocol::{Rule, RulePatchSet};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

pub struct RuleStore {
    path: PathBuf,
    current: RwLock<Arc<Vec<Rule>>>,
    /// Serialises merge + save; readers only wait for the final swap
    updating: Mutex<()>,
}

impl RuleStore {
    /// Load the rule set; startup must abort if this fails
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let rules = load(&path)?;
        info!("Loaded {} rules from {:?}", rules.len(), path);
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(rules)),
            updating: Mutex::new(()),
        })
    }

    /// Current rule set, in store order
    pub async fn snapshot(&self) -> Arc<Vec<Rule>> {
        self.current.read().await.clone()
    }

    /// Apply `patch`, rewrite the store and publish the new set
    pub async fn update(&self, patch: &RulePatchSet) -> Result<Arc<Vec<Rule>>, EngineError> {
        let _updating = self.updating.lock().await;
        let updated = Arc::new(merge(&self.snapshot().await, patch)?);

        let path = self.path.clone();
        let rules = updated.clone();
        tokio::task::spawn_blocking(move || {
            persist::retry_once("rule store", || save(&path, &rules))
        })
        .await
        .map_err(|e| EngineError::write(self.path.display().to_string(), e))??;

        *self.current.write().await = updated.clone();
        info!("Rule store updated ({} patches)", patch.len());
        Ok(updated)
    }
}

pub fn load(path: &Path) -> Result<Vec<Rule>, EngineError> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => EngineError::ConfigNotFound(path.to_path_buf()),
        _ => EngineError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })?;
    parse(path, &content)
}

pub fn parse(path: &Path, content: &str) -> Result<Vec<Rule>, EngineError> {
    let parse_error = |reason: String| EngineError::ConfigParse {
        path: path.to_path_buf(),
        reason,
    };

    let rules: Vec<Rule> = serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))?;

    let mut titles = HashSet::new();
    for rule in &rules {
        rule.validate().map_err(&parse_error)?;
        if !titles.insert(rule.title.as_str()) {
            return Err(parse_error(format!("duplicate rule title '{}'", rule.title)));
        }
    }
    Ok(rules)
}

pub fn save(path: &Path, rules: &[Rule]) -> Result<(), EngineError> {
    let json = serde_json::to_vec_pretty(rules)
        .map_err(|e| EngineError::write(path.display().to_string(), e))?;
    persist::write_atomic(path, &json)
}

/// Tolerant merge: patched titles get `enabled` and the named thresholds
/// overwritten; unknown titles are ignored.
///
/// A patch naming a variable the rule does not declare appends it.
pub fn merge(existing: &[Rule], patch: &RulePatchSet) -> Result<Vec<Rule>, EngineError> {
    for (title, rule_patch) in patch {
        for (name, threshold) in &rule_patch.variables {
            threshold
                .validate()
                .map_err(|e| EngineError::InvalidPatch(format!("'{}'.'{}': {}", title, name, e)))?;
        }
        if !existing.iter().any(|r| &r.title == title) {
            debug!(title = %title, "Ignoring patch for unknown rule");
        }
    }

    let updated = existing
        .iter()
        .map(|rule| {
            let mut rule = rule.clone();
            if let Some(rule_patch) = patch.get(&rule.title) {
                rule.enabled = rule_patch.enabled;
                for (name, threshold) in &rule_patch.variables {
                    rule.variables.insert(name.clone(), *threshold);
                }
            }
            rule
        })
        .collect();

    Ok(updated)
}
