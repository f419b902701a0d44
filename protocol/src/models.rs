//! Rule and alert data structures

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Acceptable range for one variable; both bounds are in range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub min: f64,
    pub max: f64,
}

impl Threshold {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// True when `value` lies strictly outside `[min, max]`
    pub fn is_violated_by(&self, value: f64) -> bool {
        value < self.min || value > self.max
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(format!("bounds must be finite (min {}, max {})", self.min, self.max));
        }
        if self.min > self.max {
            return Err(format!("min {} is greater than max {}", self.min, self.max));
        }
        Ok(())
    }
}

/// A named set of per-variable acceptable ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique key of the rule
    pub title: String,
    pub description: String,
    pub enabled: bool,
    /// Variable name to threshold, in declaration order
    #[serde(default, deserialize_with = "unique_variables")]
    pub variables: IndexMap<String, Threshold>,
}

impl Rule {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            enabled: true,
            variables: IndexMap::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, min: f64, max: f64) -> Self {
        self.variables.insert(name.into(), Threshold::new(min, max));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("rule title must not be empty".to_string());
        }
        for (name, threshold) in &self.variables {
            threshold
                .validate()
                .map_err(|e| format!("rule '{}', variable '{}': {}", self.title, name, e))?;
        }
        Ok(())
    }
}

/// Partial update of one rule: `enabled` is overwritten, only the named thresholds are replaced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePatch {
    pub enabled: bool,
    #[serde(default, deserialize_with = "unique_variables")]
    pub variables: IndexMap<String, Threshold>,
}

/// Variable map that refuses a name declared twice
fn unique_variables<'de, D>(deserializer: D) -> Result<IndexMap<String, Threshold>, D::Error>
where
    D: Deserializer<'de>,
{
    struct UniqueVariables;

    impl<'de> Visitor<'de> for UniqueVariables {
        type Value = IndexMap<String, Threshold>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of variable name to threshold")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut variables = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, threshold)) = map.next_entry::<String, Threshold>()? {
                if variables.contains_key(&name) {
                    return Err(de::Error::custom(format!("duplicate variable '{}'", name)));
                }
                variables.insert(name, threshold);
            }
            Ok(variables)
        }
    }

    deserializer.deserialize_map(UniqueVariables)
}

/// Patches keyed by rule title
pub type RulePatchSet = IndexMap<String, RulePatch>;

/// How far one variable is out of range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariableViolation {
    pub actual_value: f64,
    pub expected_range: Threshold,
}

/// All out-of-range variables of a single rule for one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationReport {
    pub rule_title: String,
    pub rule_description: String,
    pub variables: IndexMap<String, VariableViolation>,
}

impl ViolationReport {
    /// `"<name>: <actual> (expected <min> - <max>)"` per variable, in rule order
    pub fn report_lines(&self) -> Vec<String> {
        self.variables
            .iter()
            .map(|(name, v)| format_violation(name, v))
            .collect()
    }
}

pub fn format_violation(name: &str, violation: &VariableViolation) -> String {
    format!(
        "{}: {} (expected {} - {})",
        name,
        violation.actual_value,
        violation.expected_range.min,
        violation.expected_range.max
    )
}

/// One persisted alert; immutable once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertLogEntry {
    pub id: Uuid,

    /// Wall-clock time of the append
    pub logged_at: DateTime<Utc>,

    /// `ds` of the record that triggered the evaluation
    pub data_timestamp: String,

    pub title: String,
    pub description: String,

    /// Formatted violation lines, in rule variable order
    pub variables: Vec<String>,
}

impl AlertLogEntry {
    pub fn from_report(
        report: &ViolationReport,
        data_timestamp: &str,
        logged_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            logged_at,
            data_timestamp: data_timestamp.to_string(),
            title: report.rule_title.clone(),
            description: report.rule_description.clone(),
            variables: report.report_lines(),
        }
    }
}
